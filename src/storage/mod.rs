mod blob;
mod collection;
mod service;
mod sqlite_blob;

pub use blob::{BlobStore, MemoryBlobStore};
pub use collection::LocalCollection;
pub use service::{
    Backend, Completion, EntityService, KnowledgeService, NoticeService, RadarService, TaskService,
};
pub use sqlite_blob::SqliteBlobStore;
