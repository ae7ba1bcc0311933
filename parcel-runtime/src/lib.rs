pub mod error;
pub mod config;
pub mod entities;
pub mod path;
pub mod coordinate;
pub mod projection;
pub mod contracts;
pub mod chain;
pub mod adapter;
pub mod repo;
pub mod events;
pub mod reconciler;
pub mod indexer;
pub mod testing;

pub use error::{ChainError, IndexerError};
pub use events::{Event, EventKind, EventMeta};
pub use indexer::{ApplyOutcome, Indexer, InstanceKind, InstanceRegistry, ReplaySummary};
