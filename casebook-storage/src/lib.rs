//! Casebook Storage Layer
//!
//! Plumbing between the data layer and its external collaborators:
//!
//! - [`store`]: the generic query-execution capability (`StoreClient`) with
//!   REST and in-memory implementations
//! - [`retry`]: timeout, backoff and failure classification around a single
//!   store round trip
//! - [`cache`]: tenant-namespaced cache store over Redis or an in-process map

pub mod cache;
pub mod retry;
pub mod store;

pub use cache::{
    CacheBackend, CacheError, CacheKey, CacheScope, CacheStats, CacheStore, CacheStrategy,
    InMemoryCacheBackend, InvalidationTarget, RedisCacheBackend,
};
pub use retry::{
    classify, AttemptOutcome, AttemptResult, Classification, Failure, RetryContext, RetryError,
    RetryExecutor, RetryPolicy, RetryState,
};
pub use store::{
    CredentialProvider, Fault, MemoryStore, Order, RestStoreClient, RpcHandler, SelectQuery,
    StaticCredential, StoreClient, StoreFailure, StoreRequest, StoreResponse, Tables, TextSearch,
    TransportError, TransportErrorKind,
};
