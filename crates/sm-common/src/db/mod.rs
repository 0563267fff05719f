pub mod memory;
pub mod migrations;
pub mod pool;
pub mod postgres;
pub mod store;
pub mod util;

pub use memory::MemoryStore;
pub use migrations::{MigrationError, run_migrations};
pub use pool::{DbPoolError, PgPool, create_pool_from_url};
pub use postgres::PgStore;
pub use store::{MatchStore, StoreError, UpsertSummary};
