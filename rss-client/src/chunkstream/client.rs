use super::proto::{
    self, chunk_stream_service_client::ChunkStreamServiceClient, CloseStreamRequest,
    FetchChunkRequest, OpenStreamRequest, StreamHandle,
};
use crate::errors::ChunkStreamError;
use crate::transport;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_stream::StreamExt;
use tonic::transport::Channel;
use tracing::instrument;

/// Thin wrapper around the generated `ChunkStreamServiceClient`, translating
/// [tonic::Status] into [ChunkStreamError] so the reader never has to look
/// at transport-level types.
#[derive(Clone)]
pub struct ChunkStreamClient {
    grpc_client: ChunkStreamServiceClient<Channel>,
}

impl ChunkStreamClient {
    pub fn from_channel(channel: Channel) -> Self {
        Self {
            grpc_client: ChunkStreamServiceClient::new(channel),
        }
    }

    /// Opens a stream for `file_path` within `shuffle_key`, starting at
    /// `init_chunk_index`. Returns the handle the caller must present on
    /// every subsequent `fetch_chunk`/`close_stream` call.
    #[instrument(skip(self), fields(shuffle_key, file_path, init_chunk_index), err)]
    pub async fn open_stream(
        &self,
        shuffle_key: &str,
        file_path: &str,
        init_chunk_index: u64,
    ) -> Result<StreamHandle, ChunkStreamError> {
        self.grpc_client
            .clone()
            .open_stream(OpenStreamRequest {
                shuffle_key: shuffle_key.to_string(),
                file_path: file_path.to_string(),
                init_chunk_index,
            })
            .await
            .map(|resp| resp.into_inner())
            .map_err(|status| ChunkStreamError::StreamOpenFailed {
                shuffle_key: shuffle_key.to_string(),
                file_path: file_path.to_string(),
                source: Box::new(status),
            })
    }

    /// Fetches one chunk's bytes. The response is a gRPC stream purely so a
    /// large chunk can be delivered in more than one frame; the frames are
    /// concatenated before returning.
    #[instrument(skip(self), fields(stream_id, chunk_index), err)]
    pub async fn fetch_chunk(
        &self,
        stream_id: i64,
        chunk_index: u64,
    ) -> Result<Vec<u8>, ChunkStreamError> {
        let mut stream = self
            .grpc_client
            .clone()
            .fetch_chunk(FetchChunkRequest {
                stream_id,
                chunk_index,
            })
            .await
            .map_err(|status| ChunkStreamError::ChunkFetchFailed {
                chunk_index,
                source: Box::new(status),
            })?
            .into_inner();

        let mut data = Vec::new();
        while let Some(frame) = stream.next().await {
            let proto::ChunkData { data: frame_data } =
                frame.map_err(|status| ChunkStreamError::ChunkFetchFailed {
                    chunk_index,
                    source: Box::new(status),
                })?;
            data.extend_from_slice(&frame_data);
        }

        Ok(data)
    }

    /// Releases server-side iterator state for `stream_id`. Idempotent; a
    /// failure here is logged but never surfaced, since the reader has
    /// already delivered (or given up on) the data it cares about.
    #[instrument(skip(self), fields(stream_id))]
    pub async fn close_stream(&self, stream_id: i64) {
        if let Err(status) = self
            .grpc_client
            .clone()
            .close_stream(CloseStreamRequest { stream_id })
            .await
        {
            tracing::debug!(%status, stream_id, "close_stream failed, ignoring");
        }
    }
}

/// Caches one [Channel] per `(host, port)` pair so repeated opens against
/// the same worker reuse a connection. Shared across epoch readers; owned
/// by the caller, outliving any single reader.
#[derive(Clone, Default)]
pub struct ChunkStreamClientPool {
    channels: Arc<Mutex<HashMap<(String, u16), Channel>>>,
}

impl ChunkStreamClientPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pre-built channel for `(host, port)`, bypassing
    /// `client_for`'s normal dialing. Used by tests that spin up
    /// in-process servers behind ephemeral Unix sockets rather than real
    /// `host:port` addresses the real transport could dial.
    #[cfg(test)]
    pub(crate) async fn insert_for_test(&self, host: impl Into<String>, port: u16, channel: Channel) {
        self.channels
            .lock()
            .await
            .insert((host.into(), port), channel);
    }

    pub async fn client_for(
        &self,
        host: &str,
        port: u16,
    ) -> Result<ChunkStreamClient, ChunkStreamError> {
        let mut channels = self.channels.lock().await;
        if let Some(channel) = channels.get(&(host.to_string(), port)) {
            return Ok(ChunkStreamClient::from_channel(channel.clone()));
        }

        let channel = transport::channel_for_host_port(host, port)
            .await
            .map_err(|e| ChunkStreamError::Transport {
                host: host.to_string(),
                port,
                reason: e.to_string(),
            })?;

        channels.insert((host.to_string(), port), channel.clone());
        Ok(ChunkStreamClient::from_channel(channel))
    }
}
