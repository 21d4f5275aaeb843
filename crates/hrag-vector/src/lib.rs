pub mod cache;
pub mod persist;
pub mod pipeline;
pub mod schema;
pub mod store;
pub mod table;

pub use cache::EmbeddingCache;
pub use pipeline::{Orchestrator, OrchestratorConfig};
pub use store::{IndexStats, IndexStore, ParentFilter};
