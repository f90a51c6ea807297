pub mod schema;
pub mod sqlite;
pub mod traits;

pub use sqlite::SqliteStore;
pub use traits::GraphStore;
