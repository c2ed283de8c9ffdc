use std::str::FromStr;
use std::sync::Arc;

use log::*;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

pub mod lookups;
pub mod router;

pub use router::{AppRouter, DatabaseRouter, DbAlias, ModelKind};

static DEFAULT_MIGRATIONS: Migrator = sqlx::migrate!("./migrations/default");
static SECONDARY_MIGRATIONS: Migrator = sqlx::migrate!("./migrations/secondary");

const MAX_CONNECTIONS: u32 = 5;

/**
 * Both connection pools plus the routers that pick between them
 */
#[derive(Clone)]
pub struct Databases {
    default: SqlitePool,
    secondary: SqlitePool,
    routers: Arc<Vec<Box<dyn DatabaseRouter>>>,
}

impl std::fmt::Debug for Databases {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Databases")
            .field("routers", &self.routers.len())
            .finish()
    }
}

impl Databases {
    pub fn new(default: SqlitePool, secondary: SqlitePool) -> Self {
        Self {
            default,
            secondary,
            routers: Arc::new(vec![Box::new(AppRouter::new())]),
        }
    }

    /**
     * Connect to both databases, creating the files when missing, and bring
     * their schemas up to date.
     */
    pub async fn connect(default_url: &str, secondary_url: &str) -> Result<Self, sqlx::Error> {
        let default = create_pool(default_url).await?;
        let secondary = create_pool(secondary_url).await?;

        info!("Running migrations on the {} database", DbAlias::Default);
        DEFAULT_MIGRATIONS.run(&default).await?;
        info!("Running migrations on the {} database", DbAlias::Secondary);
        SECONDARY_MIGRATIONS.run(&secondary).await?;

        Ok(Self::new(default, secondary))
    }

    pub fn alias(&self, alias: DbAlias) -> &SqlitePool {
        match alias {
            DbAlias::Default => &self.default,
            DbAlias::Secondary => &self.secondary,
        }
    }

    pub fn alias_for_read(&self, model: ModelKind) -> DbAlias {
        self.routers
            .iter()
            .find_map(|r| r.db_for_read(model))
            .unwrap_or(DbAlias::Default)
    }

    pub fn alias_for_write(&self, model: ModelKind) -> DbAlias {
        self.routers
            .iter()
            .find_map(|r| r.db_for_write(model))
            .unwrap_or(DbAlias::Default)
    }

    pub fn reader(&self, model: ModelKind) -> &SqlitePool {
        self.alias(self.alias_for_read(model))
    }

    pub fn writer(&self, model: ModelKind) -> &SqlitePool {
        self.alias(self.alias_for_write(model))
    }
}

async fn create_pool(url: &str) -> Result<SqlitePool, sqlx::Error> {
    debug!("Opening sqlite pool at {}", url);
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await
}
