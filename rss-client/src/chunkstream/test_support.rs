//! In-process gRPC harness for chunk-stream tests, shared across this
//! crate's test modules.

use std::{path::Path, time::Duration};

use tokio::net::{UnixListener, UnixStream};
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::Retry;
use tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::{Channel, Endpoint, Server, Uri};

use super::proto::chunk_stream_service_server::ChunkStreamServiceServer;
use super::server::ChunkStreamServer;

/// Spins up `server` behind a Unix-domain-socket gRPC listener under
/// `tmpdir`, and returns a lazily-connecting [Channel] to it. The caller
/// must keep `tmpdir` alive for as long as the channel is in use.
pub(crate) async fn gen_chunkstream_grpc_client_at(
    tmpdir: &Path,
    server: ChunkStreamServer,
) -> Channel {
    let socket_path = tmpdir.join("socket");

    {
        let socket_path = socket_path.clone();
        tokio::spawn(async move {
            let uds = UnixListener::bind(&socket_path).unwrap();
            let uds_stream = UnixListenerStream::new(uds);

            Server::builder()
                .add_service(ChunkStreamServiceServer::new(server))
                .serve_with_incoming(uds_stream)
                .await
        });
    }

    Retry::spawn(
        ExponentialBackoff::from_millis(20).max_delay(Duration::from_secs(2)),
        || async {
            if socket_path.exists() {
                Ok(())
            } else {
                Err(())
            }
        },
    )
    .await
    .expect("expected socket path to eventually get created, but never happened");

    Endpoint::try_from("http://[::]:50051")
        .unwrap()
        .connect_with_connector_lazy(tower::service_fn(move |_: Uri| {
            UnixStream::connect(socket_path.clone())
        }))
}

/// Convenience wrapper over [gen_chunkstream_grpc_client_at] that creates
/// (and leaks) its own tempdir, for tests that don't need to keep it
/// around for anything else.
pub(crate) async fn gen_chunkstream_grpc_client(server: ChunkStreamServer) -> Channel {
    let tmpdir = tempfile::tempdir().expect("tempdir");
    let path = tmpdir.into_path();
    gen_chunkstream_grpc_client_at(&path, server).await
}
