mod from_row;
pub mod queries;
mod schema;

pub use from_row::FromRow;
pub use schema::init_db;

use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::crypto::MasterKey;
use crate::email::Notifier;
use crate::gateways::GatewayFactory;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub base_url: String,
    pub master_key: MasterKey,
    /// Platform fee ceiling in minor units.
    pub fee_cap_minor: i64,
    pub notifier: Arc<dyn Notifier>,
    pub gateways: Arc<dyn GatewayFactory>,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path).with_init(init_connection);
    Pool::builder().max_size(10).build(manager)
}

/// In-memory pool for tests. max_size(1) so every checkout sees the same
/// database.
pub fn create_memory_pool() -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::memory().with_init(init_connection);
    Pool::builder().max_size(1).build(manager)
}

/// Per-connection pragmas.
///
/// WAL lets the verify and webhook handlers hit the same row from different
/// connections; busy_timeout makes the loser of a write race queue on the
/// BEGIN IMMEDIATE lock instead of failing with SQLITE_BUSY.
fn init_connection(conn: &mut rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        PRAGMA foreign_keys = ON;
        "#,
    )
}
