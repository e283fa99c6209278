//! Epoch reader: the orchestrator that streams a logical partition's bytes
//! from one or more shuffle workers, retrying mid-stream chunk failures and
//! failing over between replicas.
//!
//! [EpochReader] is a pull-based iterator (`has_next`/`next`/`close`). It
//! owns at most one open chunk-stream at a time and exclusively owns its
//! internal [State]; pieces are borrowed read-only from the [crate::Epoch]
//! it was built from.

use tracing::{debug, instrument, warn};

use crate::chunkstream::{ChunkStreamClient, ChunkStreamClientPool};
use crate::codec;
use crate::errors::{ChunkStreamError, ReaderError};
use crate::locator::{CommittedPartitionInfo, Epoch};

mod config;
pub use config::{ReaderConfig, ReaderConfigBuilder};

/// Internal state machine backing [EpochReader::next]. A failed-piece state
/// isn't reified as its own variant: it's a transient condition that
/// immediately resolves to either the next piece's `PieceOpen` or
/// `Exhausted`, so [EpochReader::advance_piece] folds it into the
/// transition instead of pausing on it.
enum State {
    /// S0: no piece selected yet.
    Initialized,
    /// S1: actively draining `piece_index`'s chunks `[cursor, num_chunks)`
    /// over `stream_id`. `attempt` is the number of reopens already spent
    /// recovering `cursor` specifically from a chunk failure — it is a
    /// per-chunk budget, reset to 0 every time `cursor` advances to a chunk
    /// that hasn't failed yet (on a successful fetch, or on failover to a
    /// different piece).
    PieceOpen {
        piece_index: usize,
        client: ChunkStreamClient,
        stream_id: i64,
        num_chunks: u64,
        cursor: u64,
        attempt: u32,
    },
    /// S2: `failed_at` just failed on `piece_index`'s stream, which has
    /// already been closed; a replacement stream has not been opened yet.
    Retrying {
        piece_index: usize,
        failed_at: u64,
        attempt: u32,
    },
    /// S4: terminal success — some piece drained in full.
    Drained,
    /// S5: terminal failure — every piece was tried and none drained.
    Exhausted {
        pieces_tried: usize,
        last_error: String,
    },
    /// Post-`close()`. Terminal; `next()` always fails with `ReaderClosed`.
    Closed,
}

/// Streams one reducer's partition ("epoch") from its committed replicas,
/// handling chunk-level retry and piece-level failover.
///
/// Not `Sync`; a single reader is driven by one caller at a time. The
/// underlying [ChunkStreamClientPool] may be shared freely across readers
/// running on other tasks.
pub struct EpochReader {
    shuffle_key: String,
    pieces: Vec<CommittedPartitionInfo>,
    pool: ChunkStreamClientPool,
    config: ReaderConfig,
    state: State,
    pieces_tried: usize,
}

impl EpochReader {
    pub fn new(epoch: Epoch, pool: ChunkStreamClientPool, config: ReaderConfig) -> Self {
        let shuffle_key = epoch.shuffle_key().to_string();
        let pieces = epoch.pieces().to_vec();
        Self {
            shuffle_key,
            pieces,
            pool,
            config,
            state: State::Initialized,
            pieces_tried: 0,
        }
    }

    /// True iff the current piece has more chunks, or a retry/failover is
    /// still pending, or no piece has been tried yet. Inspects local state
    /// only — never performs I/O.
    pub fn has_next(&self) -> bool {
        match &self.state {
            State::Initialized | State::Retrying { .. } => true,
            State::PieceOpen {
                cursor, num_chunks, ..
            } => cursor < num_chunks,
            State::Drained | State::Exhausted { .. } | State::Closed => false,
        }
    }

    /// Returns the next chunk's decoded bytes, blocking on whatever I/O the
    /// retry/failover decision requires. Fails the whole reader only with
    /// [ReaderError::EpochExhausted] or [ReaderError::ReaderClosed]; every
    /// other failure is absorbed into a state transition.
    #[instrument(skip(self), fields(shuffle_key = %self.shuffle_key), err)]
    pub async fn next(&mut self) -> Result<Vec<u8>, ReaderError> {
        loop {
            match std::mem::replace(&mut self.state, State::Closed) {
                State::Closed => {
                    self.state = State::Closed;
                    return Err(ReaderError::ReaderClosed);
                }
                State::Drained => {
                    // The epoch already delivered every chunk of one piece
                    // in full; a caller that ignores `has_next()` and keeps
                    // pulling finds nothing more, same as after `close()`.
                    self.state = State::Drained;
                    return Err(ReaderError::ReaderClosed);
                }
                State::Exhausted {
                    pieces_tried,
                    last_error,
                } => {
                    let err = ReaderError::EpochExhausted {
                        pieces_tried,
                        last_error: last_error.clone(),
                    };
                    self.state = State::Exhausted {
                        pieces_tried,
                        last_error,
                    };
                    return Err(err);
                }
                State::Initialized => {
                    self.pieces_tried += 1;
                    self.state = match self.open_piece_stream(0, 0).await {
                        Ok((client, stream_id, num_chunks)) => {
                            Self::open_result_state(0, client, stream_id, num_chunks, 0, 0).await
                        }
                        Err(e) => {
                            warn!(piece_index = 0, error = %e, "piece failed to open, trying next piece");
                            self.advance_piece(0, e).await
                        }
                    };
                }
                State::Retrying {
                    piece_index,
                    failed_at,
                    attempt,
                } => {
                    if attempt + 1 >= self.config.chunk_fetch_failed_retry_max_times {
                        warn!(
                            piece_index,
                            failed_at, attempt, "chunk retry budget exhausted, failing over"
                        );
                        self.state = self
                            .advance_piece(
                                piece_index,
                                format!("chunk {failed_at} exceeded retry budget on piece {piece_index}"),
                            )
                            .await;
                        continue;
                    }

                    tokio::time::sleep(self.config.chunk_fetch_retry_wait_time).await;

                    self.state = match self.open_piece_stream(piece_index, failed_at).await {
                        Ok((client, stream_id, num_chunks)) => {
                            Self::open_result_state(
                                piece_index,
                                client,
                                stream_id,
                                num_chunks,
                                failed_at,
                                attempt + 1,
                            )
                            .await
                        }
                        Err(e) => {
                            warn!(piece_index, error = %e, "reopen after chunk failure failed, failing over");
                            self.advance_piece(piece_index, e).await
                        }
                    };
                }
                State::PieceOpen {
                    piece_index,
                    client,
                    stream_id,
                    num_chunks,
                    cursor,
                    attempt,
                } => match client.fetch_chunk(stream_id, cursor).await {
                    Ok(raw) => match codec::decode(
                        &raw,
                        self.config.max_compressed_block_length,
                        self.config.max_original_block_length,
                    ) {
                        Ok(decoded) => {
                            let next_cursor = cursor + 1;
                            self.state = if next_cursor == num_chunks {
                                client.close_stream(stream_id).await;
                                State::Drained
                            } else {
                                State::PieceOpen {
                                    piece_index,
                                    client,
                                    stream_id,
                                    num_chunks,
                                    cursor: next_cursor,
                                    // `next_cursor` hasn't failed before, so
                                    // it gets its own fresh retry budget.
                                    attempt: 0,
                                }
                            };
                            return Ok(decoded);
                        }
                        Err(source) => {
                            let err = ChunkStreamError::ChunkIntegrity {
                                chunk_index: cursor,
                                source,
                            };
                            warn!(piece_index, chunk_index = cursor, error = %err, "chunk failed integrity check, retrying");
                            client.close_stream(stream_id).await;
                            self.state = State::Retrying {
                                piece_index,
                                failed_at: cursor,
                                attempt,
                            };
                        }
                    },
                    Err(e) => {
                        debug!(piece_index, chunk_index = cursor, error = %e, "chunk fetch failed, will retry");
                        client.close_stream(stream_id).await;
                        self.state = State::Retrying {
                            piece_index,
                            failed_at: cursor,
                            attempt,
                        };
                    }
                },
            }
        }
    }

    /// Releases the current stream (if any) and transitions to the
    /// terminal `Closed` state. Idempotent; never fails.
    #[instrument(skip(self))]
    pub async fn close(&mut self) {
        if let State::PieceOpen {
            client, stream_id, ..
        } = std::mem::replace(&mut self.state, State::Closed)
        {
            client.close_stream(stream_id).await;
        }
    }

    /// Adapts this reader into a plain [tokio::io::AsyncRead] over the
    /// epoch's decoded bytes, for callers that want to compose it with
    /// `tokio::io` (e.g. `tokio::io::copy` into a downstream deserializer)
    /// instead of driving `has_next`/`next` themselves. `EpochExhausted` and
    /// other reader errors surface as `io::Error` via [ReaderError]'s
    /// `From` impl; the chunk-to-byte-stream adaptation itself is
    /// `tokio_util::io::StreamReader` over a `futures::stream::unfold`.
    pub fn into_async_read(self) -> impl tokio::io::AsyncRead + Unpin {
        let byte_stream = futures::stream::unfold(self, |mut reader| async move {
            if !reader.has_next() {
                return None;
            }
            match reader.next().await {
                Ok(chunk) => Some((Ok(bytes::Bytes::from(chunk)), reader)),
                Err(e) => Some((Err(std::io::Error::from(e)), reader)),
            }
        });
        tokio_util::io::StreamReader::new(byte_stream)
    }

    /// Wraps a freshly (re)opened stream into the right state: `Drained`
    /// immediately if the piece turned out to have zero chunks from
    /// `cursor` onward, `PieceOpen` otherwise.
    async fn open_result_state(
        piece_index: usize,
        client: ChunkStreamClient,
        stream_id: i64,
        num_chunks: u64,
        cursor: u64,
        attempt: u32,
    ) -> State {
        if cursor >= num_chunks {
            client.close_stream(stream_id).await;
            return State::Drained;
        }
        State::PieceOpen {
            piece_index,
            client,
            stream_id,
            num_chunks,
            cursor,
            attempt,
        }
    }

    /// Opens a stream for `piece_index` starting at `chunk_index`, pooling
    /// the underlying transport by `(host, port)`. Both client-pool lookup
    /// and the `OpenStream` RPC are folded into one `StreamOpenFailed`-style
    /// failure for the caller to react to.
    async fn open_piece_stream(
        &self,
        piece_index: usize,
        chunk_index: u64,
    ) -> Result<(ChunkStreamClient, i64, u64), String> {
        let piece = &self.pieces[piece_index];
        let client = self
            .pool
            .client_for(&piece.host, piece.port)
            .await
            .map_err(|e| e.to_string())?;
        let handle = client
            .open_stream(&self.shuffle_key, &piece.file_path, chunk_index)
            .await
            .map_err(|e| e.to_string())?;
        Ok((client, handle.stream_id, handle.num_chunks))
    }

    /// Piece `piece_index` is dead (open or retry-budget failure). Tries
    /// each subsequent piece from chunk 0 in order, counting every attempt
    /// toward the `EpochExhausted` error's tally.
    async fn advance_piece(&mut self, mut piece_index: usize, mut last_error: String) -> State {
        loop {
            piece_index += 1;
            if piece_index >= self.pieces.len() {
                return State::Exhausted {
                    pieces_tried: self.pieces_tried,
                    last_error,
                };
            }
            self.pieces_tried += 1;
            match self.open_piece_stream(piece_index, 0).await {
                Ok((client, stream_id, num_chunks)) => {
                    return Self::open_result_state(piece_index, client, stream_id, num_chunks, 0, 0).await;
                }
                Err(e) => {
                    warn!(piece_index, error = %e, "piece failed to open, trying next piece");
                    last_error = e;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/epoch_reader.rs"]
mod epoch_reader_tests;
