//! # bridge-server
//!
//! Network front-ends of the session bridge:
//!
//! - **Socket**: WebSocket at `GET /ws?clientId=..&clientKind=ide|cli`,
//!   JSON frames (see [`websocket::protocol`])
//! - **RPC**: gRPC `bridge.v1.BridgeService` (see [`rpc`])
//! - **HTTP**: `GET /health` and `GET /metrics`
//!
//! Both transports drive one shared [`bridge_core::Bridge`] through the
//! [`bridge_core::TransportAdapter`] contract.

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod metrics;
pub mod reaper;
pub mod rpc;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::{ServerConfig, bridge_config};
pub use rpc::RpcAdapter;
pub use server::{BridgeServer, ServerError, ServerHandle};
pub use shutdown::{ShutdownCoordinator, ShutdownReport};
pub use websocket::SocketAdapter;
