//! Forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request (buffered)
//!     → request.rs (ProxyRequest: read-only inbound + mutable outbound)
//!     → rewrite.rs (active Rewrite mutates outbound)
//!     → headers.rs (hop-by-hop stripping, X-Forwarded-*)
//!     → relay.rs (send outbound as issued, stream response back)
//! ```
//!
//! # Design Decisions
//! - The rewrite is the only extension point; it cannot write a response
//! - No per-request shared state: each request owns its ProxyRequest

pub mod headers;
pub mod relay;
pub mod request;
pub mod rewrite;

pub use headers::{ClientIpResolver, HeaderIp, PeerAddr};
pub use relay::{Relay, RelayError};
pub use request::{Connection, Encrypted, Inbound, ProxyRequest};
pub use rewrite::{Rewrite, TargetRewrite};
