//! Shared-store state backend.
//!
//! Every decision is delegated to a Lua script evaluated atomically on
//! Redis, so replicas behind the same store observe one serialized history
//! per key. The backend itself owns no limiter state.

mod redis_backend;
pub use redis_backend::*;
