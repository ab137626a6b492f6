//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming POST (JSON-RPC envelope, optional query parameter)
//!     → router.rs (method check, envelope decode, chain ID selection)
//!     → chain_map.rs (chain ID → upstream lookup)
//!     → Return: Route or RoutingFailure
//!
//! Chain map compilation (at startup):
//!     endpoints config
//!     → parse & validate every URL
//!     → freeze as immutable ChainMap
//! ```
//!
//! # Design Decisions
//! - Chain map built at startup, immutable at runtime
//! - One chain ID source per server (body or query), chosen at construction
//! - Explicit failure rather than silent default upstream

pub mod chain_map;
pub mod router;

pub use chain_map::{ChainId, ChainMap, Upstream, UpstreamError};
pub use router::{ChainIdSource, ChainRouter, Route, RoutingError, RoutingFailure};
