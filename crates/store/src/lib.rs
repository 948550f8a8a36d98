pub mod ingest;
pub mod sqlite_store;
pub mod store;

pub use ingest::*;
pub use sqlite_store::*;
pub use store::*;
