//! Programmable reverse proxy with multi-chain JSON-RPC routing.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod proxy;
pub mod routing;
pub mod rpc;

pub use config::schema::ProxyConfig;
pub use http::{BuildError, ProxyServer, ServerBuilder};
pub use lifecycle::{Shutdown, ShutdownListener};
pub use proxy::{ProxyRequest, Relay, Rewrite, TargetRewrite};
pub use routing::{ChainId, ChainIdSource, ChainMap, Upstream};
pub use rpc::MultiChainRpc;
