//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (assign request ID)
//!     → [echo endpoint answers …/__rpc_error] (chain RPC only)
//!     → catch-all handler buffers the body
//!     → proxy::Relay (rewrite, send upstream, stream back)
//! ```

pub mod request;
pub mod server;

pub use request::{request_id, MakeRequestUuid, X_REQUEST_ID};
pub use server::{BuildError, ProxyServer, ServerBuilder};
