use super::proto::{
    chunk_stream_service_server::ChunkStreamService, ChunkData, CloseStreamRequest,
    CloseStreamResponse, FetchChunkRequest, OpenStreamRequest, StreamHandle,
};
use crate::codec::BlockEncoder;
use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tonic::{async_trait, Request, Response, Status};
use tracing::instrument;

/// A kind of fault a test can inject into a single chunk fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkFault {
    /// The RPC itself fails with `Status::unavailable`.
    FailStatus,
    /// The RPC succeeds but the framed block it returns has a flipped
    /// trailing byte, so the client's checksum check fails.
    CorruptPayload,
}

/// Controls which requests a [ChunkStreamServer] should fail: an explicit,
/// inspectable policy instead of a shared mutable fault counter.
#[derive(Clone, Default)]
pub struct FaultPolicy {
    inner: Arc<FaultPolicyInner>,
}

#[derive(Default)]
struct FaultPolicyInner {
    fail_open_always: std::sync::atomic::AtomicBool,
    fail_open_remaining: std::sync::atomic::AtomicU32,
    chunk_faults: Mutex<HashMap<u64, (ChunkFault, u32)>>,
}

impl FaultPolicy {
    /// No faults at all.
    pub fn never() -> Self {
        Self::default()
    }

    /// `OpenStream` always fails.
    pub fn fail_open_always() -> Self {
        let policy = Self::default();
        policy
            .inner
            .fail_open_always
            .store(true, Ordering::SeqCst);
        policy
    }

    /// `chunk_index` fails `times` times (with `fault`) before succeeding.
    pub fn fail_chunk_n_times(chunk_index: u64, fault: ChunkFault, times: u32) -> Self {
        let policy = Self::default();
        policy
            .inner
            .chunk_faults
            .lock()
            .insert(chunk_index, (fault, times));
        policy
    }

    /// `chunk_index` always fails with `fault`, modeling exhaustion of a
    /// chunk's retry budget.
    pub fn fail_chunk_always(chunk_index: u64, fault: ChunkFault) -> Self {
        Self::fail_chunk_n_times(chunk_index, fault, u32::MAX)
    }

    async fn should_fail_open(&self) -> bool {
        if self.inner.fail_open_always.load(Ordering::SeqCst) {
            return true;
        }
        let remaining = self.inner.fail_open_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.inner
                .fail_open_remaining
                .fetch_sub(1, Ordering::SeqCst);
            return true;
        }
        false
    }

    async fn chunk_fault(&self, chunk_index: u64) -> Option<ChunkFault> {
        let mut faults = self.inner.chunk_faults.lock();
        match faults.get_mut(&chunk_index) {
            Some((fault, remaining)) if *remaining > 0 => {
                *remaining -= 1;
                Some(*fault)
            }
            _ => None,
        }
    }
}

struct StreamState {
    cursor: u64,
}

/// In-process reference implementation of `ChunkStreamService`, backed by
/// an in-memory list of chunks rather than an on-disk partition file.
/// Exists only for tests — the real service lives on the shuffle worker.
pub struct ChunkStreamServer {
    shuffle_key: String,
    file_path: String,
    chunks: Vec<Vec<u8>>,
    fault_policy: FaultPolicy,
    next_stream_id: AtomicI64,
    streams: AsyncMutex<HashMap<i64, StreamState>>,
}

impl ChunkStreamServer {
    pub fn new_with_data(
        shuffle_key: impl Into<String>,
        file_path: impl Into<String>,
        chunks: Vec<Vec<u8>>,
        fault_policy: FaultPolicy,
    ) -> Self {
        Self {
            shuffle_key: shuffle_key.into(),
            file_path: file_path.into(),
            chunks,
            fault_policy,
            next_stream_id: AtomicI64::new(1),
            streams: AsyncMutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ChunkStreamService for ChunkStreamServer {
    type FetchChunkStream =
        Pin<Box<dyn Stream<Item = Result<ChunkData, Status>> + Send + 'static>>;

    #[instrument(skip(self))]
    async fn open_stream(
        &self,
        request: Request<OpenStreamRequest>,
    ) -> Result<Response<StreamHandle>, Status> {
        let rq = request.into_inner();

        if rq.shuffle_key != self.shuffle_key || rq.file_path != self.file_path {
            return Err(Status::not_found(format!(
                "no committed partition for {}/{}",
                rq.shuffle_key, rq.file_path
            )));
        }

        if self.fault_policy.should_fail_open().await {
            return Err(Status::unavailable("injected open_stream failure"));
        }

        let stream_id = self.next_stream_id.fetch_add(1, Ordering::SeqCst);
        self.streams.lock().await.insert(
            stream_id,
            StreamState {
                cursor: rq.init_chunk_index,
            },
        );

        Ok(Response::new(StreamHandle {
            stream_id,
            num_chunks: self.chunks.len() as u64,
        }))
    }

    #[instrument(skip(self))]
    async fn fetch_chunk(
        &self,
        request: Request<FetchChunkRequest>,
    ) -> Result<Response<Self::FetchChunkStream>, Status> {
        let rq = request.into_inner();

        let mut streams = self.streams.lock().await;
        let state = streams
            .get_mut(&rq.stream_id)
            .ok_or_else(|| Status::not_found(format!("unknown stream {}", rq.stream_id)))?;

        if rq.chunk_index != state.cursor {
            return Err(Status::failed_precondition(format!(
                "requested chunk {} but stream cursor is at {}",
                rq.chunk_index, state.cursor
            )));
        }

        if let Some(fault) = self.fault_policy.chunk_fault(rq.chunk_index).await {
            return match fault {
                ChunkFault::FailStatus => {
                    Err(Status::unavailable("injected chunk fetch failure"))
                }
                ChunkFault::CorruptPayload => {
                    let raw = self
                        .chunks
                        .get(rq.chunk_index as usize)
                        .ok_or_else(|| Status::out_of_range("chunk index out of range"))?;
                    let mut framed = BlockEncoder::new().compress(raw).to_vec();
                    let last = framed.len() - 1;
                    framed[last] ^= 0xff;
                    state.cursor += 1;
                    let stream = tokio_stream::once(Ok(ChunkData { data: framed.into() }));
                    Ok(Response::new(Box::pin(stream)))
                }
            };
        }

        let raw = self
            .chunks
            .get(rq.chunk_index as usize)
            .ok_or_else(|| Status::out_of_range("chunk index out of range"))?;
        let framed = BlockEncoder::new().compress(raw).to_vec();
        state.cursor += 1;

        let stream = tokio_stream::once(Ok(ChunkData { data: framed.into() }));
        Ok(Response::new(Box::pin(stream)))
    }

    #[instrument(skip(self))]
    async fn close_stream(
        &self,
        request: Request<CloseStreamRequest>,
    ) -> Result<Response<CloseStreamResponse>, Status> {
        self.streams
            .lock()
            .await
            .remove(&request.into_inner().stream_id);
        Ok(Response::new(CloseStreamResponse {}))
    }
}
