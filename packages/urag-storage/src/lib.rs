pub mod backend;
pub mod chat;
pub mod db;
pub mod memory;
pub mod qdrant;
pub mod schema;

mod error;

pub use backend::{CollectionSchema, LoadState, SearchRequest, VectorBackend};
pub use chat::{ChatStore, MemoryChatStore};
pub use error::{Error, Result};

use std::{future::Future, pin::Pin};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
