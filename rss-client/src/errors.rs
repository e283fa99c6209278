use thiserror::Error;
use tonic::Status;

/// Errors from the framed-block codec. A codec error is treated by the
/// reader exactly like a chunk-fetch failure (bad replica, try again / fail
/// over) — see [crate::reader].
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CodecError {
    #[error("bad magic prefix")]
    BadMagic,

    #[error("compressed length {0} exceeds configured maximum {1}")]
    BadCompressedLength(u32, u32),

    #[error("original length {0} exceeds configured maximum {1}")]
    BadOriginalLength(u32, u32),

    #[error("unknown compression method {0}")]
    UnknownMethod(u8),

    #[error("lz4 decompression failed: {0}")]
    Lz4Decompress(String),

    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
}

impl From<CodecError> for std::io::Error {
    fn from(value: CodecError) -> Self {
        std::io::Error::new(std::io::ErrorKind::InvalidData, value.to_string())
    }
}

/// Errors surfaced by the chunk-stream client. All variants here are
/// *transport/protocol* level; the epoch reader is the one place that
/// decides whether one of these is retryable.
#[derive(Debug, Error)]
pub enum ChunkStreamError {
    #[error("failed to open stream for {shuffle_key}/{file_path}: {source}")]
    StreamOpenFailed {
        shuffle_key: String,
        file_path: String,
        #[source]
        source: Box<Status>,
    },

    #[error("failed to fetch chunk {chunk_index}: {source}")]
    ChunkFetchFailed {
        chunk_index: u64,
        #[source]
        source: Box<Status>,
    },

    #[error("chunk {chunk_index} failed integrity check: {source}")]
    ChunkIntegrity {
        chunk_index: u64,
        #[source]
        source: CodecError,
    },

    #[error("transport error connecting to {host}:{port}: {reason}")]
    Transport {
        host: String,
        port: u16,
        reason: String,
    },
}

/// Errors surfaced by [crate::locator::PartitionLocator] implementations.
#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("failed to locate partitions for shuffle key {0}: {1}")]
    LookupFailed(String, String),
}

/// Errors the epoch reader surfaces to its caller. Every other failure
/// category (transient transport errors, protocol violations, checksum
/// mismatches) is recovered from internally via retry/failover and never
/// reaches this type.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// A programmer/configuration error caught at construction time: an
    /// empty piece list.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Every piece was tried and none could serve the epoch to completion.
    #[error("epoch exhausted after trying all {pieces_tried} piece(s); last error: {last_error}")]
    EpochExhausted {
        pieces_tried: usize,
        last_error: String,
    },

    /// `next()` (or `has_next()`'s I/O-free checks aside) was called after
    /// `close()`.
    #[error("reader is closed")]
    ReaderClosed,
}

impl From<ReaderError> for std::io::Error {
    fn from(value: ReaderError) -> Self {
        match value {
            ReaderError::InvalidArgument(msg) => {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, msg)
            }
            ReaderError::ReaderClosed => {
                std::io::Error::new(std::io::ErrorKind::NotConnected, value.to_string())
            }
            ReaderError::EpochExhausted { .. } => {
                std::io::Error::new(std::io::ErrorKind::Other, value.to_string())
            }
        }
    }
}
