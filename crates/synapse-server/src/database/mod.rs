pub mod models;
pub mod pool;
pub mod repository;
pub mod store;

#[cfg(test)]
pub mod memory;

pub use models::*;
pub use pool::DbPool;
pub use repository::{Repository, DOCUMENT_CREATED_CHANNEL};
pub use store::{DocumentStore, MessageStore};

use std::sync::Arc;

pub type DynDocumentStore = Arc<dyn DocumentStore>;
pub type DynMessageStore = Arc<dyn MessageStore>;
