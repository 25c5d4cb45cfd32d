//! PostgreSQL catalog store implementation.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};

use crate::config::DatabaseConfig;
use crate::error::{DeployError, DeployResult};
use crate::status::{ChainStatus, FrontStatus, GroupStatus, NodeStatus};
use crate::types::{
    AgencyId, AgencyRecord, ChainId, ChainRecord, EncryptionScheme, FrontGroupRecord, FrontId,
    FrontRecord, GroupId, GroupRecord, HostId, HostRecord, ImageConfig, NewChain, NewFront,
    NewHost, NodeId, NodeRecord,
};

use super::{CatalogStore, CatalogTx};

const CHAIN_COLUMNS: &str = "id, name, description, version, encryption, status, root_dir, \
     run_mode, signer_addr, created_at, updated_at";

const AGENCY_COLUMNS: &str = "id, name, chain_id, chain_name, created_at";

const HOST_COLUMNS: &str = "id, ip, agency_id, agency_name, chain_id, root_dir, created_at";

const GROUP_COLUMNS: &str =
    "chain_id, group_id, node_count, status, description, created_at, updated_at";

const FRONT_COLUMNS: &str = "id, node_id, ip, front_port, agency_id, agency_name, host_id, \
     host_index, image_tag, run_mode, container_name, rpc_port, p2p_port, channel_port, \
     chain_id, chain_name, status, created_at, updated_at";

const NODE_COLUMNS: &str = "chain_id, node_id, name, group_id, ip, p2p_port, status";

/// PostgreSQL-backed catalog store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to PostgreSQL and create a new store.
    ///
    /// The required tables are created if they don't exist.
    pub async fn new(config: &DatabaseConfig) -> DeployResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await?;

        Self::from_pool(pool).await
    }

    /// Create a store from an existing connection pool.
    pub async fn from_pool(pool: PgPool) -> DeployResult<Self> {
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Ensure the required tables exist.
    async fn ensure_schema(&self) -> DeployResult<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS image_configs (
                id INTEGER PRIMARY KEY,
                config_type TEXT NOT NULL,
                value TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS chains (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL,
                version TEXT NOT NULL,
                encryption TEXT NOT NULL,
                status TEXT NOT NULL,
                root_dir TEXT NOT NULL,
                run_mode TEXT NOT NULL,
                signer_addr TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS agencies (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL,
                chain_id BIGINT NOT NULL REFERENCES chains(id),
                chain_name TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_agencies_chain_name
            ON agencies (chain_id, lower(name))
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS hosts (
                id BIGSERIAL PRIMARY KEY,
                ip TEXT NOT NULL,
                agency_id BIGINT NOT NULL REFERENCES agencies(id),
                agency_name TEXT NOT NULL,
                chain_id BIGINT NOT NULL REFERENCES chains(id),
                root_dir TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (chain_id, ip)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS chain_groups (
                chain_id BIGINT NOT NULL REFERENCES chains(id),
                group_id INTEGER NOT NULL,
                node_count BIGINT NOT NULL,
                status TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (chain_id, group_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS fronts (
                id BIGSERIAL PRIMARY KEY,
                node_id TEXT NOT NULL,
                ip TEXT NOT NULL,
                front_port INTEGER NOT NULL,
                agency_id BIGINT NOT NULL REFERENCES agencies(id),
                agency_name TEXT NOT NULL,
                host_id BIGINT NOT NULL REFERENCES hosts(id),
                host_index BIGINT NOT NULL,
                image_tag TEXT NOT NULL,
                run_mode TEXT NOT NULL,
                container_name TEXT NOT NULL,
                rpc_port INTEGER NOT NULL,
                p2p_port INTEGER NOT NULL,
                channel_port INTEGER NOT NULL,
                chain_id BIGINT NOT NULL REFERENCES chains(id),
                chain_name TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (chain_id, node_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS front_groups (
                front_id BIGINT NOT NULL REFERENCES fronts(id),
                chain_id BIGINT NOT NULL,
                group_id INTEGER NOT NULL,
                status TEXT NOT NULL,
                PRIMARY KEY (front_id, group_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                chain_id BIGINT NOT NULL REFERENCES chains(id),
                node_id TEXT NOT NULL,
                name TEXT NOT NULL,
                group_id INTEGER NOT NULL,
                ip TEXT NOT NULL,
                p2p_port INTEGER NOT NULL,
                status TEXT NOT NULL,
                PRIMARY KEY (chain_id, node_id, group_id)
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_fronts_node_id
            ON fronts (node_id)
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_front_groups_group
            ON front_groups (chain_id, group_id)
            "#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl CatalogStore for PostgresStore {
    async fn begin(&self) -> DeployResult<Box<dyn CatalogTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgCatalogTx { tx }))
    }
}

impl std::fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresStore").finish_non_exhaustive()
    }
}

struct PgCatalogTx {
    tx: Transaction<'static, Postgres>,
}

/// Map a unique-key violation to [`DeployError::Duplicate`].
fn on_conflict(entity: &'static str, key: impl Into<String>) -> impl FnOnce(sqlx::Error) -> DeployError {
    let key = key.into();
    move |e| match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            DeployError::Duplicate { entity, key }
        }
        other => DeployError::Database(other),
    }
}

fn parse_column<T>(row: &PgRow, column: &str) -> DeployResult<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|e: String| DeployError::internal(format!("column {column}: {e}")))
}

fn port_column(row: &PgRow, column: &str) -> DeployResult<u16> {
    let raw: i32 = row.try_get(column)?;
    u16::try_from(raw).map_err(|_| DeployError::internal(format!("column {column}: bad port {raw}")))
}

fn count_column(row: &PgRow, column: &str) -> DeployResult<u32> {
    let raw: i64 = row.try_get(column)?;
    u32::try_from(raw)
        .map_err(|_| DeployError::internal(format!("column {column}: out of range {raw}")))
}

fn row_to_image(row: &PgRow) -> DeployResult<ImageConfig> {
    Ok(ImageConfig {
        id: row.try_get("id")?,
        config_type: row.try_get("config_type")?,
        value: row.try_get("value")?,
    })
}

fn row_to_chain(row: &PgRow) -> DeployResult<ChainRecord> {
    Ok(ChainRecord {
        id: ChainId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        version: row.try_get("version")?,
        encryption: parse_column(row, "encryption")?,
        status: parse_column(row, "status")?,
        root_dir: row.try_get("root_dir")?,
        run_mode: parse_column(row, "run_mode")?,
        signer_addr: row.try_get("signer_addr")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_agency(row: &PgRow) -> DeployResult<AgencyRecord> {
    Ok(AgencyRecord {
        id: AgencyId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        chain_id: ChainId::new(row.try_get("chain_id")?),
        chain_name: row.try_get("chain_name")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_host(row: &PgRow) -> DeployResult<HostRecord> {
    Ok(HostRecord {
        id: HostId::new(row.try_get("id")?),
        ip: row.try_get("ip")?,
        agency_id: AgencyId::new(row.try_get("agency_id")?),
        agency_name: row.try_get("agency_name")?,
        chain_id: ChainId::new(row.try_get("chain_id")?),
        root_dir: row.try_get("root_dir")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_group(row: &PgRow) -> DeployResult<GroupRecord> {
    Ok(GroupRecord {
        chain_id: ChainId::new(row.try_get("chain_id")?),
        group_id: GroupId::new(row.try_get("group_id")?),
        node_count: count_column(row, "node_count")?,
        status: parse_column(row, "status")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_front(row: &PgRow) -> DeployResult<FrontRecord> {
    Ok(FrontRecord {
        id: FrontId::new(row.try_get("id")?),
        node_id: NodeId::new(row.try_get::<String, _>("node_id")?),
        ip: row.try_get("ip")?,
        front_port: port_column(row, "front_port")?,
        agency_id: AgencyId::new(row.try_get("agency_id")?),
        agency_name: row.try_get("agency_name")?,
        host_id: HostId::new(row.try_get("host_id")?),
        host_index: count_column(row, "host_index")?,
        image_tag: row.try_get("image_tag")?,
        run_mode: parse_column(row, "run_mode")?,
        container_name: row.try_get("container_name")?,
        rpc_port: port_column(row, "rpc_port")?,
        p2p_port: port_column(row, "p2p_port")?,
        channel_port: port_column(row, "channel_port")?,
        chain_id: ChainId::new(row.try_get("chain_id")?),
        chain_name: row.try_get("chain_name")?,
        status: parse_column(row, "status")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_front_group(row: &PgRow) -> DeployResult<FrontGroupRecord> {
    Ok(FrontGroupRecord {
        front_id: FrontId::new(row.try_get("front_id")?),
        chain_id: ChainId::new(row.try_get("chain_id")?),
        group_id: GroupId::new(row.try_get("group_id")?),
        status: parse_column(row, "status")?,
    })
}

fn row_to_node(row: &PgRow) -> DeployResult<NodeRecord> {
    Ok(NodeRecord {
        chain_id: ChainId::new(row.try_get("chain_id")?),
        node_id: NodeId::new(row.try_get::<String, _>("node_id")?),
        name: row.try_get("name")?,
        group_id: GroupId::new(row.try_get("group_id")?),
        ip: row.try_get("ip")?,
        p2p_port: port_column(row, "p2p_port")?,
        status: parse_column(row, "status")?,
    })
}

fn expect_affected(rows: u64, missing: impl FnOnce() -> DeployError) -> DeployResult<()> {
    if rows == 0 {
        Err(missing())
    } else {
        Ok(())
    }
}

#[async_trait]
impl CatalogTx for PgCatalogTx {
    async fn commit(self: Box<Self>) -> DeployResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> DeployResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }

    async fn upsert_image_config(&mut self, config: &ImageConfig) -> DeployResult<()> {
        sqlx::query(
            r#"
            INSERT INTO image_configs (id, config_type, value)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET config_type = EXCLUDED.config_type, value = EXCLUDED.value
            "#,
        )
        .bind(config.id)
        .bind(&config.config_type)
        .bind(&config.value)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_image_config(&mut self, id: i32) -> DeployResult<Option<ImageConfig>> {
        let row = sqlx::query("SELECT id, config_type, value FROM image_configs WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_image).transpose()
    }

    async fn insert_chain(&mut self, chain: &NewChain) -> DeployResult<ChainRecord> {
        let sql = format!(
            r#"
            INSERT INTO chains (
                name, description, version, encryption, status, root_dir, run_mode, signer_addr
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {CHAIN_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(&chain.name)
            .bind(&chain.description)
            .bind(&chain.version)
            .bind(chain.encryption.as_str())
            .bind(chain.status.to_string())
            .bind(&chain.root_dir)
            .bind(chain.run_mode.as_str())
            .bind(&chain.signer_addr)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(on_conflict("chain", &chain.name))?;
        row_to_chain(&row)
    }

    async fn get_chain(&mut self, id: ChainId) -> DeployResult<Option<ChainRecord>> {
        let sql = format!("SELECT {CHAIN_COLUMNS} FROM chains WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_chain).transpose()
    }

    async fn get_chain_by_name(&mut self, name: &str) -> DeployResult<Option<ChainRecord>> {
        let sql = format!("SELECT {CHAIN_COLUMNS} FROM chains WHERE name = $1");
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_chain).transpose()
    }

    async fn list_chains(&mut self) -> DeployResult<Vec<ChainRecord>> {
        let sql = format!("SELECT {CHAIN_COLUMNS} FROM chains ORDER BY id");
        let rows = sqlx::query(&sql).fetch_all(&mut *self.tx).await?;
        rows.iter().map(row_to_chain).collect()
    }

    async fn update_chain_version(
        &mut self,
        id: ChainId,
        version: &str,
        encryption: EncryptionScheme,
    ) -> DeployResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE chains
            SET version = $1, encryption = $2, updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(version)
        .bind(encryption.as_str())
        .bind(id.get())
        .execute(&mut *self.tx)
        .await?;
        expect_affected(result.rows_affected(), || {
            DeployError::ChainNotFound(id.to_string())
        })
    }

    async fn update_chain_status(&mut self, id: ChainId, status: ChainStatus) -> DeployResult<()> {
        let result =
            sqlx::query("UPDATE chains SET status = $1, updated_at = NOW() WHERE id = $2")
                .bind(status.to_string())
                .bind(id.get())
                .execute(&mut *self.tx)
                .await?;
        expect_affected(result.rows_affected(), || {
            DeployError::ChainNotFound(id.to_string())
        })
    }

    async fn delete_chain(&mut self, id: ChainId) -> DeployResult<()> {
        let result = sqlx::query("DELETE FROM chains WHERE id = $1")
            .bind(id.get())
            .execute(&mut *self.tx)
            .await?;
        expect_affected(result.rows_affected(), || {
            DeployError::ChainNotFound(id.to_string())
        })
    }

    async fn insert_agency(
        &mut self,
        chain_id: ChainId,
        chain_name: &str,
        name: &str,
    ) -> DeployResult<AgencyRecord> {
        let sql = format!(
            "INSERT INTO agencies (name, chain_id, chain_name) VALUES ($1, $2, $3) \
             RETURNING {AGENCY_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(name)
            .bind(chain_id.get())
            .bind(chain_name)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(on_conflict("agency", name))?;
        row_to_agency(&row)
    }

    async fn get_agency(&mut self, id: AgencyId) -> DeployResult<Option<AgencyRecord>> {
        let sql = format!("SELECT {AGENCY_COLUMNS} FROM agencies WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_agency).transpose()
    }

    async fn get_agency_by_name(
        &mut self,
        chain_id: ChainId,
        name: &str,
    ) -> DeployResult<Option<AgencyRecord>> {
        let sql = format!(
            "SELECT {AGENCY_COLUMNS} FROM agencies \
             WHERE chain_id = $1 AND lower(name) = lower($2)"
        );
        let row = sqlx::query(&sql)
            .bind(chain_id.get())
            .bind(name)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_agency).transpose()
    }

    async fn list_agencies(&mut self, chain_id: ChainId) -> DeployResult<Vec<AgencyRecord>> {
        let sql = format!("SELECT {AGENCY_COLUMNS} FROM agencies WHERE chain_id = $1 ORDER BY id");
        let rows = sqlx::query(&sql)
            .bind(chain_id.get())
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(row_to_agency).collect()
    }

    async fn delete_agency(&mut self, id: AgencyId) -> DeployResult<()> {
        let result = sqlx::query("DELETE FROM agencies WHERE id = $1")
            .bind(id.get())
            .execute(&mut *self.tx)
            .await?;
        expect_affected(result.rows_affected(), || {
            DeployError::AgencyNotFound(id.to_string())
        })
    }

    async fn insert_host(&mut self, host: &NewHost) -> DeployResult<HostRecord> {
        let sql = format!(
            "INSERT INTO hosts (ip, agency_id, agency_name, chain_id, root_dir) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {HOST_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&host.ip)
            .bind(host.agency_id.get())
            .bind(&host.agency_name)
            .bind(host.chain_id.get())
            .bind(&host.root_dir)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(on_conflict("host", &host.ip))?;
        row_to_host(&row)
    }

    async fn get_host(&mut self, id: HostId) -> DeployResult<Option<HostRecord>> {
        let sql = format!("SELECT {HOST_COLUMNS} FROM hosts WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_host).transpose()
    }

    async fn get_host_by_ip(
        &mut self,
        chain_id: ChainId,
        ip: &str,
    ) -> DeployResult<Option<HostRecord>> {
        let sql = format!("SELECT {HOST_COLUMNS} FROM hosts WHERE chain_id = $1 AND ip = $2");
        let row = sqlx::query(&sql)
            .bind(chain_id.get())
            .bind(ip)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_host).transpose()
    }

    async fn list_hosts(&mut self, chain_id: ChainId) -> DeployResult<Vec<HostRecord>> {
        let sql = format!("SELECT {HOST_COLUMNS} FROM hosts WHERE chain_id = $1 ORDER BY id");
        let rows = sqlx::query(&sql)
            .bind(chain_id.get())
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(row_to_host).collect()
    }

    async fn list_hosts_by_agency(
        &mut self,
        agency_id: AgencyId,
    ) -> DeployResult<Vec<HostRecord>> {
        let sql = format!("SELECT {HOST_COLUMNS} FROM hosts WHERE agency_id = $1 ORDER BY id");
        let rows = sqlx::query(&sql)
            .bind(agency_id.get())
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(row_to_host).collect()
    }

    async fn delete_host(&mut self, id: HostId) -> DeployResult<()> {
        let result = sqlx::query("DELETE FROM hosts WHERE id = $1")
            .bind(id.get())
            .execute(&mut *self.tx)
            .await?;
        expect_affected(result.rows_affected(), || {
            DeployError::HostNotFound(id.to_string())
        })
    }

    async fn insert_group(
        &mut self,
        chain_id: ChainId,
        group_id: GroupId,
        node_count: u32,
        status: GroupStatus,
    ) -> DeployResult<GroupRecord> {
        let sql = format!(
            "INSERT INTO chain_groups (chain_id, group_id, node_count, status) \
             VALUES ($1, $2, $3, $4) RETURNING {GROUP_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(chain_id.get())
            .bind(group_id.get())
            .bind(i64::from(node_count))
            .bind(status.to_string())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(on_conflict("group", format!("{chain_id}/{group_id}")))?;
        row_to_group(&row)
    }

    async fn get_group(
        &mut self,
        chain_id: ChainId,
        group_id: GroupId,
    ) -> DeployResult<Option<GroupRecord>> {
        let sql =
            format!("SELECT {GROUP_COLUMNS} FROM chain_groups WHERE chain_id = $1 AND group_id = $2");
        let row = sqlx::query(&sql)
            .bind(chain_id.get())
            .bind(group_id.get())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_group).transpose()
    }

    async fn list_groups(&mut self, chain_id: ChainId) -> DeployResult<Vec<GroupRecord>> {
        let sql = format!(
            "SELECT {GROUP_COLUMNS} FROM chain_groups WHERE chain_id = $1 ORDER BY group_id"
        );
        let rows = sqlx::query(&sql)
            .bind(chain_id.get())
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(row_to_group).collect()
    }

    async fn update_group_count(
        &mut self,
        chain_id: ChainId,
        group_id: GroupId,
        node_count: u32,
    ) -> DeployResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE chain_groups
            SET node_count = $1, updated_at = NOW()
            WHERE chain_id = $2 AND group_id = $3
            "#,
        )
        .bind(i64::from(node_count))
        .bind(chain_id.get())
        .bind(group_id.get())
        .execute(&mut *self.tx)
        .await?;
        expect_affected(result.rows_affected(), || DeployError::GroupNotFound {
            chain_id: chain_id.get(),
            group_id: group_id.get(),
        })
    }

    async fn update_group_status(
        &mut self,
        chain_id: ChainId,
        group_id: GroupId,
        status: GroupStatus,
    ) -> DeployResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE chain_groups
            SET status = $1, updated_at = NOW()
            WHERE chain_id = $2 AND group_id = $3
            "#,
        )
        .bind(status.to_string())
        .bind(chain_id.get())
        .bind(group_id.get())
        .execute(&mut *self.tx)
        .await?;
        expect_affected(result.rows_affected(), || DeployError::GroupNotFound {
            chain_id: chain_id.get(),
            group_id: group_id.get(),
        })
    }

    async fn delete_group(&mut self, chain_id: ChainId, group_id: GroupId) -> DeployResult<()> {
        let result = sqlx::query("DELETE FROM chain_groups WHERE chain_id = $1 AND group_id = $2")
            .bind(chain_id.get())
            .bind(group_id.get())
            .execute(&mut *self.tx)
            .await?;
        expect_affected(result.rows_affected(), || DeployError::GroupNotFound {
            chain_id: chain_id.get(),
            group_id: group_id.get(),
        })
    }

    async fn insert_front(&mut self, front: &NewFront) -> DeployResult<FrontRecord> {
        let sql = format!(
            r#"
            INSERT INTO fronts (
                node_id, ip, front_port, agency_id, agency_name, host_id, host_index,
                image_tag, run_mode, container_name, rpc_port, p2p_port, channel_port,
                chain_id, chain_name, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING {FRONT_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(front.node_id.as_str())
            .bind(&front.ip)
            .bind(i32::from(front.front_port))
            .bind(front.agency_id.get())
            .bind(&front.agency_name)
            .bind(front.host_id.get())
            .bind(i64::from(front.host_index))
            .bind(&front.image_tag)
            .bind(front.run_mode.as_str())
            .bind(&front.container_name)
            .bind(i32::from(front.rpc_port))
            .bind(i32::from(front.p2p_port))
            .bind(i32::from(front.channel_port))
            .bind(front.chain_id.get())
            .bind(&front.chain_name)
            .bind(front.status.to_string())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(on_conflict("front", front.node_id.as_str()))?;
        row_to_front(&row)
    }

    async fn get_front(&mut self, id: FrontId) -> DeployResult<Option<FrontRecord>> {
        let sql = format!("SELECT {FRONT_COLUMNS} FROM fronts WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_front).transpose()
    }

    async fn get_front_by_node_id(
        &mut self,
        node_id: &NodeId,
    ) -> DeployResult<Option<FrontRecord>> {
        let sql = format!("SELECT {FRONT_COLUMNS} FROM fronts WHERE node_id = $1 ORDER BY id LIMIT 1");
        let row = sqlx::query(&sql)
            .bind(node_id.as_str())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_front).transpose()
    }

    async fn list_fronts(&mut self, chain_id: ChainId) -> DeployResult<Vec<FrontRecord>> {
        let sql = format!("SELECT {FRONT_COLUMNS} FROM fronts WHERE chain_id = $1 ORDER BY id");
        let rows = sqlx::query(&sql)
            .bind(chain_id.get())
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(row_to_front).collect()
    }

    async fn list_fronts_by_host(&mut self, host_id: HostId) -> DeployResult<Vec<FrontRecord>> {
        let sql =
            format!("SELECT {FRONT_COLUMNS} FROM fronts WHERE host_id = $1 ORDER BY host_index");
        let rows = sqlx::query(&sql)
            .bind(host_id.get())
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(row_to_front).collect()
    }

    async fn list_fronts_by_group(
        &mut self,
        chain_id: ChainId,
        group_id: GroupId,
    ) -> DeployResult<Vec<FrontRecord>> {
        let sql = format!(
            r#"
            SELECT {FRONT_COLUMNS} FROM fronts
            WHERE id IN (
                SELECT front_id FROM front_groups WHERE chain_id = $1 AND group_id = $2
            )
            ORDER BY id
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(chain_id.get())
            .bind(group_id.get())
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(row_to_front).collect()
    }

    async fn update_front_status(
        &mut self,
        id: FrontId,
        status: FrontStatus,
    ) -> DeployResult<()> {
        let result = sqlx::query("UPDATE fronts SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status.to_string())
            .bind(id.get())
            .execute(&mut *self.tx)
            .await?;
        expect_affected(result.rows_affected(), || {
            DeployError::NodeNotFound(id.to_string())
        })
    }

    async fn update_front_images(&mut self, chain_id: ChainId, image: &str) -> DeployResult<()> {
        sqlx::query("UPDATE fronts SET image_tag = $1, updated_at = NOW() WHERE chain_id = $2")
            .bind(image)
            .bind(chain_id.get())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_front(&mut self, id: FrontId) -> DeployResult<()> {
        let result = sqlx::query("DELETE FROM fronts WHERE id = $1")
            .bind(id.get())
            .execute(&mut *self.tx)
            .await?;
        expect_affected(result.rows_affected(), || {
            DeployError::NodeNotFound(id.to_string())
        })
    }

    async fn insert_front_group(&mut self, link: &FrontGroupRecord) -> DeployResult<()> {
        sqlx::query(
            "INSERT INTO front_groups (front_id, chain_id, group_id, status) VALUES ($1, $2, $3, $4)",
        )
        .bind(link.front_id.get())
        .bind(link.chain_id.get())
        .bind(link.group_id.get())
        .bind(link.status.to_string())
        .execute(&mut *self.tx)
        .await
        .map_err(on_conflict(
            "front_group",
            format!("{}/{}", link.front_id, link.group_id),
        ))?;
        Ok(())
    }

    async fn list_front_groups(
        &mut self,
        front_id: FrontId,
    ) -> DeployResult<Vec<FrontGroupRecord>> {
        let rows = sqlx::query(
            "SELECT front_id, chain_id, group_id, status FROM front_groups \
             WHERE front_id = $1 ORDER BY group_id",
        )
        .bind(front_id.get())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(row_to_front_group).collect()
    }

    async fn update_front_group_status(
        &mut self,
        front_id: FrontId,
        group_id: GroupId,
        status: GroupStatus,
    ) -> DeployResult<()> {
        let result = sqlx::query(
            "UPDATE front_groups SET status = $1 WHERE front_id = $2 AND group_id = $3",
        )
        .bind(status.to_string())
        .bind(front_id.get())
        .bind(group_id.get())
        .execute(&mut *self.tx)
        .await?;
        expect_affected(result.rows_affected(), || {
            DeployError::NodeNotFound(front_id.to_string())
        })
    }

    async fn delete_front_groups(&mut self, front_id: FrontId) -> DeployResult<()> {
        sqlx::query("DELETE FROM front_groups WHERE front_id = $1")
            .bind(front_id.get())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_node(&mut self, node: &NodeRecord) -> DeployResult<()> {
        sqlx::query(
            r#"
            INSERT INTO nodes (chain_id, node_id, name, group_id, ip, p2p_port, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(node.chain_id.get())
        .bind(node.node_id.as_str())
        .bind(&node.name)
        .bind(node.group_id.get())
        .bind(&node.ip)
        .bind(i32::from(node.p2p_port))
        .bind(node.status.to_string())
        .execute(&mut *self.tx)
        .await
        .map_err(on_conflict("node", node.name.clone()))?;
        Ok(())
    }

    async fn list_nodes_by_group(
        &mut self,
        chain_id: ChainId,
        group_id: GroupId,
    ) -> DeployResult<Vec<NodeRecord>> {
        let sql = format!(
            "SELECT {NODE_COLUMNS} FROM nodes WHERE chain_id = $1 AND group_id = $2 ORDER BY node_id"
        );
        let rows = sqlx::query(&sql)
            .bind(chain_id.get())
            .bind(group_id.get())
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(row_to_node).collect()
    }

    async fn list_nodes_by_node_id(
        &mut self,
        chain_id: ChainId,
        node_id: &NodeId,
    ) -> DeployResult<Vec<NodeRecord>> {
        let sql = format!(
            "SELECT {NODE_COLUMNS} FROM nodes WHERE chain_id = $1 AND node_id = $2 ORDER BY group_id"
        );
        let rows = sqlx::query(&sql)
            .bind(chain_id.get())
            .bind(node_id.as_str())
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(row_to_node).collect()
    }

    async fn update_node_status(
        &mut self,
        chain_id: ChainId,
        node_id: &NodeId,
        status: NodeStatus,
    ) -> DeployResult<()> {
        sqlx::query("UPDATE nodes SET status = $1 WHERE chain_id = $2 AND node_id = $3")
            .bind(status.to_string())
            .bind(chain_id.get())
            .bind(node_id.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_nodes_by_node_id(
        &mut self,
        chain_id: ChainId,
        node_id: &NodeId,
    ) -> DeployResult<()> {
        sqlx::query("DELETE FROM nodes WHERE chain_id = $1 AND node_id = $2")
            .bind(chain_id.get())
            .bind(node_id.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunMode;

    fn get_database_url() -> Option<String> {
        std::env::var("DATABASE_URL").ok()
    }

    async fn connect() -> PostgresStore {
        let url = get_database_url().expect("DATABASE_URL not set");
        let config = DatabaseConfig {
            url,
            ..DatabaseConfig::default()
        };
        PostgresStore::new(&config).await.expect("failed to connect")
    }

    fn test_chain(name: &str) -> NewChain {
        NewChain {
            name: name.to_owned(),
            description: "integration".to_owned(),
            version: "fiscoorg/fisco-webase:v2.7.2".to_owned(),
            encryption: EncryptionScheme::Ecdsa,
            status: ChainStatus::Initialized,
            root_dir: "/opt/chains".to_owned(),
            run_mode: RunMode::Docker,
            signer_addr: "10.0.0.9:5004".to_owned(),
        }
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn rollback_discards_chain() {
        let store = connect().await;
        let name = format!("pg-rollback-{}", std::process::id());

        let mut tx = store.begin().await.expect("begin failed");
        tx.insert_chain(&test_chain(&name)).await.expect("insert failed");
        tx.rollback().await.expect("rollback failed");

        let mut tx = store.begin().await.expect("begin failed");
        assert!(tx
            .get_chain_by_name(&name)
            .await
            .expect("get failed")
            .is_none());
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn group_round_trip() {
        let store = connect().await;
        let name = format!("pg-groups-{}", std::process::id());

        let mut tx = store.begin().await.expect("begin failed");
        let chain = tx.insert_chain(&test_chain(&name)).await.expect("insert failed");
        tx.insert_group(chain.id, GroupId::new(1), 3, GroupStatus::Maintaining)
            .await
            .expect("insert failed");
        tx.update_group_count(chain.id, GroupId::new(1), 5)
            .await
            .expect("update failed");

        let group = tx
            .get_group(chain.id, GroupId::new(1))
            .await
            .expect("get failed")
            .expect("group not found");
        assert_eq!(group.node_count, 5);
        assert_eq!(group.status, GroupStatus::Maintaining);

        let err = tx
            .insert_chain(&test_chain(&name))
            .await
            .expect_err("duplicate should fail");
        assert!(matches!(err, DeployError::Duplicate { entity: "chain", .. }));

        tx.rollback().await.expect("rollback failed");
    }
}
