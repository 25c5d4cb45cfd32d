//! Chain-bootstrap tool integration.
//!
//! The bootstrap tool materialises key material and base configuration:
//! a whole chain tree from topology lines, or single agency, node and SDK
//! certificates when a running chain grows.

mod mock;
mod shell;

pub use mock::MockBootstrapper;
pub use shell::ShellBootstrapper;

use std::path::Path;

use async_trait::async_trait;

use crate::error::DeployResult;
use crate::process::ExecOutput;
use crate::types::EncryptionScheme;

/// Trait for chain-bootstrap tool implementations.
///
/// A tool-reported failure is an `Ok` result with `success == false`;
/// errors are reserved for failures to run the tool at all.
#[async_trait]
pub trait ChainBootstrapper: Send + Sync {
    /// Generate the tree `<out_dir>/<chain_name>/<ip>/node<index>/` for
    /// every topology line.
    async fn build_chain(
        &self,
        scheme: EncryptionScheme,
        lines: &[String],
        chain_name: &str,
        out_dir: &Path,
    ) -> DeployResult<ExecOutput>;

    /// Generate an agency certificate into `out_dir`.
    async fn gen_agency_cert(
        &self,
        scheme: EncryptionScheme,
        chain_name: &str,
        agency_name: &str,
        out_dir: &Path,
    ) -> DeployResult<ExecOutput>;

    /// Generate a node identity and certificate into `node_dir`.
    async fn gen_node_cert(
        &self,
        scheme: EncryptionScheme,
        chain_name: &str,
        agency_name: &str,
        node_dir: &Path,
    ) -> DeployResult<ExecOutput>;

    /// Generate SDK connection material into `sdk_dir`.
    async fn gen_sdk_cert(
        &self,
        scheme: EncryptionScheme,
        chain_name: &str,
        agency_name: &str,
        sdk_dir: &Path,
    ) -> DeployResult<ExecOutput>;
}
