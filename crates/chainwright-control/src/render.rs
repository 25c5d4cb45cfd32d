//! Rendering of generated configuration files.
//!
//! A renderer takes a [`Template`] and an ordered list of key/value pairs.
//! Keys may repeat: list-valued settings such as peers and sealers are
//! passed as one pair per element, in order.

use std::fmt::Write as _;

use crate::error::{DeployError, DeployResult};

/// Files the control plane generates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Template {
    /// Front process config (`application.yml`).
    ///
    /// Keys: `encrypt_type`, `channel_port`, `front_port`, `signer_addr`.
    FrontApplication,
    /// Node process config (`config.ini`).
    ///
    /// Keys: `channel_port`, `rpc_port`, `p2p_port`, `sm_crypto`, repeated `peer`.
    NodeConfig,
    /// Group genesis (`conf/group.<gid>.genesis`).
    ///
    /// Keys: `group_id`, `timestamp`, repeated `sealer`.
    GroupGenesis,
    /// Group runtime config (`conf/group.<gid>.ini`).
    ///
    /// Keys: `group_id`.
    GroupConfig,
}

impl Template {
    /// Template name used in logs and errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::FrontApplication => "front_application",
            Self::NodeConfig => "node_config",
            Self::GroupGenesis => "group_genesis",
            Self::GroupConfig => "group_config",
        }
    }
}

/// Turns a template and its values into file contents.
pub trait ConfigRenderer: Send + Sync {
    /// Render `template` with `values`.
    fn render(&self, template: Template, values: &[(&str, String)]) -> DeployResult<String>;
}

/// Renderer with the four built-in templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinRenderer;

impl BuiltinRenderer {
    /// Create a new renderer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

struct Values<'a> {
    template: Template,
    pairs: &'a [(&'a str, String)],
}

impl<'a> Values<'a> {
    fn one(&self, key: &str) -> DeployResult<&'a str> {
        self.pairs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
            .ok_or_else(|| {
                DeployError::internal(format!(
                    "template {} is missing value {key}",
                    self.template.name()
                ))
            })
    }

    fn all(&self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

fn fmt_err(_: std::fmt::Error) -> DeployError {
    DeployError::internal("formatting failed")
}

impl ConfigRenderer for BuiltinRenderer {
    fn render(&self, template: Template, values: &[(&str, String)]) -> DeployResult<String> {
        let v = Values {
            template,
            pairs: values,
        };
        let mut out = String::new();

        match template {
            Template::FrontApplication => {
                write!(
                    out,
                    "server:\n  port: {front_port}\n\
                     sdk:\n  encryptType: {encrypt_type}\n  ip: 127.0.0.1\n  channelPort: {channel_port}\n\
                     constant:\n  keyServer: {signer_addr}\n  nodePath: /data\n",
                    front_port = v.one("front_port")?,
                    encrypt_type = v.one("encrypt_type")?,
                    channel_port = v.one("channel_port")?,
                    signer_addr = v.one("signer_addr")?,
                )
                .map_err(fmt_err)?;
            }
            Template::NodeConfig => {
                write!(
                    out,
                    "[rpc]\n    listen_ip=0.0.0.0\n    channel_listen_port={channel}\n    \
                     jsonrpc_listen_port={rpc}\n[p2p]\n    listen_ip=0.0.0.0\n    listen_port={p2p}\n",
                    channel = v.one("channel_port")?,
                    rpc = v.one("rpc_port")?,
                    p2p = v.one("p2p_port")?,
                )
                .map_err(fmt_err)?;
                for (i, peer) in v.all("peer").enumerate() {
                    writeln!(out, "    node.{i}={peer}").map_err(fmt_err)?;
                }
                write!(
                    out,
                    "[chain]\n    sm_crypto={sm}\n[log]\n    enable=true\n    log_path=./log\n    level=info\n",
                    sm = v.one("sm_crypto")?,
                )
                .map_err(fmt_err)?;
            }
            Template::GroupGenesis => {
                out.push_str("[consensus]\n    consensus_type=pbft\n    max_trans_num=1000\n");
                for (i, sealer) in v.all("sealer").enumerate() {
                    writeln!(out, "    node.{i}={sealer}").map_err(fmt_err)?;
                }
                write!(
                    out,
                    "[state]\n    type=storage\n[tx]\n    gas_limit=300000000\n\
                     [group]\n    id={group_id}\n    timestamp={timestamp}\n",
                    group_id = v.one("group_id")?,
                    timestamp = v.one("timestamp")?,
                )
                .map_err(fmt_err)?;
            }
            Template::GroupConfig => {
                write!(
                    out,
                    "; group {group_id}\n[consensus]\n    ttl=2\n    min_block_generation_time=500\n\
                     [storage]\n    type=rocksdb\n[tx_pool]\n    limit=150000\n",
                    group_id = v.one("group_id")?,
                )
                .map_err(fmt_err)?;
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn node_config_lists_peers_in_order() {
        let rendered = BuiltinRenderer::new()
            .render(
                Template::NodeConfig,
                &[
                    ("channel_port", "20200".to_owned()),
                    ("rpc_port", "8545".to_owned()),
                    ("p2p_port", "30300".to_owned()),
                    ("sm_crypto", "false".to_owned()),
                    ("peer", "10.0.0.1:30300".to_owned()),
                    ("peer", "10.0.0.2:30300".to_owned()),
                ],
            )
            .unwrap();

        assert!(rendered.contains("listen_port=30300"));
        assert!(rendered.contains("node.0=10.0.0.1:30300\n    node.1=10.0.0.2:30300"));
    }

    #[test]
    fn missing_value_is_an_error() {
        let err = BuiltinRenderer::new()
            .render(Template::GroupConfig, &[])
            .unwrap_err();
        assert!(err.to_string().contains("group_id"));
    }

    #[test]
    fn front_application_embeds_signer() {
        let rendered = BuiltinRenderer::new()
            .render(
                Template::FrontApplication,
                &[
                    ("encrypt_type", "1".to_owned()),
                    ("channel_port", "20201".to_owned()),
                    ("front_port", "5003".to_owned()),
                    ("signer_addr", "10.0.0.9:5004".to_owned()),
                ],
            )
            .unwrap();
        assert!(rendered.contains("port: 5003"));
        assert!(rendered.contains("encryptType: 1"));
        assert!(rendered.contains("keyServer: 10.0.0.9:5004"));
    }
}
