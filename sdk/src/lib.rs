//! Convodesk SDK
//!
//! Shared library providing the observable cell, task progress records, the
//! conversation engine contract, and the record store contract. The engine
//! crate builds the controller and its adapters on top of these types.

/// Error types and handling
pub mod errors;

/// Observable cells and subscriptions
pub mod observable;

/// Task progress records
pub mod task;

/// Conversation engine adapter contract
pub mod engine;

/// Record store contract
pub mod store;

// Re-export commonly used types
pub use engine::{
    Conversation, ConversationEngine, EngineOptions, Message, RetrievedDocument, Retriever, Role,
};
pub use errors::{ConvoError, ConvoErrorExt, Result};
pub use observable::{DisposeBag, Observable, ReadOnlyObservable, Subscription};
pub use store::RecordStore;
pub use task::{TaskId, TaskList, TaskProgress};
