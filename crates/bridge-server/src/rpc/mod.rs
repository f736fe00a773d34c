//! RPC transport: `bridge.v1.BridgeService` over gRPC.

pub mod proto;
pub mod service;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing::info;

pub use service::RpcAdapter;

use proto::BridgeServiceServer;

/// Serve the RPC transport on `listener` until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    adapter: Arc<RpcAdapter>,
    max_message_size: usize,
    shutdown: CancellationToken,
) -> Result<(), tonic::transport::Error> {
    let service = BridgeServiceServer::from_arc(adapter)
        .max_decoding_message_size(max_message_size)
        .max_encoding_message_size(max_message_size);
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "rpc transport listening");
    }
    Server::builder()
        .add_service(service)
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
            shutdown.cancelled().await;
        })
        .await
}
