//! JSON-RPC multi-chain routing.
//!
//! # Data Flow
//! ```text
//! POST {"method":…, "chainId":N}
//!     → multichain.rs (resolve via routing::ChainRouter)
//!         ok   → strip chainId, re-encode, target upstream N
//!         fail → error_channel.rs (redirect to GET …/__rpc_error)
//!     → relay sends whatever outbound now holds
//! ```

pub mod error_channel;
pub mod multichain;
pub mod types;

pub use error_channel::{RPC_ERROR_PATH, ROUTING_ERROR_CODE};
pub use multichain::MultiChainRpc;
pub use types::{RpcError, RpcPayload, RpcRequest, RpcResponse};
