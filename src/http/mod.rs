//! HTTP surface: request validation, key derivation, dispatch, and
//! response mapping.

mod handlers;
pub use handlers::*;

mod routes;
pub use routes::*;

mod types;
pub use types::*;
