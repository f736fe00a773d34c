//! Generated protobuf and tonic code for `proto/bridge.proto`.

#![allow(missing_docs, unused_results, clippy::pedantic)]

/// `bridge.v1` package.
pub mod v1 {
    include!("bridge.v1.rs");
    include!("bridge.v1.tonic.rs");
}

pub use v1::bridge_service_client::BridgeServiceClient;
pub use v1::bridge_service_server::{BridgeService, BridgeServiceServer};
