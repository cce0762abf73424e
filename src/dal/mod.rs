//! Data-access layer (§6): repository traits plus one concrete
//! implementation and one in-memory test double.

pub mod memory;
pub mod sqlx_store;
pub mod traits;

pub use memory::MemoryStore;
pub use sqlx_store::SqlxStore;
pub use traits::{AggregateStore, BlobStore, ErrorGroupStore, FindingStore, ProgressSink, SiteStore};
