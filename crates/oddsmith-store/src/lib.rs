pub mod error;
pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod store;

pub use error::StoreError;
pub use schema::{MarketRecord, NewAnalysis, PositionRecord, StoredAnalysis};
pub use sqlite::Database;
pub use store::Store;
