//! Persistence: the pipeline store and ingestion checkpoints

pub mod checkpoint;
pub mod repository;

pub use checkpoint::{checkpoint_name, CheckpointManager, CheckpointStats, IngestCheckpoint};
pub use repository::{
    create_memory_store, create_sqlite_store, MemoryPipelineStore, PipelineStore, PostCounts,
    PostRecord, SharedPipelineStore, SqlitePipelineStore, StoreStats,
};
