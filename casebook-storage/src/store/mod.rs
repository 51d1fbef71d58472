//! Store client abstraction
//!
//! The relational store is an external collaborator reached through a single
//! capability: execute one [`StoreRequest`] and hand back a
//! [`StoreResponse`] or a [`TransportError`]. Retry, caching and tenant
//! isolation are layered on top by the callers.

mod memory;
mod request;
mod response;
mod rest;

pub use memory::{Fault, MemoryStore, RpcHandler, Tables};
pub use request::{Order, SelectQuery, StoreRequest, TextSearch};
pub use response::{StoreFailure, StoreResponse, TransportError, TransportErrorKind};
pub use rest::{CredentialProvider, RestStoreClient, StaticCredential};

use async_trait::async_trait;

/// Generic query-execution capability.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Execute one request. Reported failures come back inside the
    /// response; only failures to complete the round trip are errors.
    async fn execute(&self, request: StoreRequest) -> Result<StoreResponse, TransportError>;
}
