//! Data model for where a reducer's partition lives, and the interface to
//! the cluster control plane that resolves it. Resolution itself is out
//! of scope here: [PartitionLocator] is a named seam only.

use crate::errors::{LocatorError, ReaderError};
use tonic::async_trait;

/// How a committed partition's bytes are made available. `Disk` (served
/// over the chunk-stream protocol) is the only mode this crate reads;
/// other modes are named for forward compatibility with the control
/// plane's schema but have no reader implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionMode {
    Disk,
}

/// One replica of a committed partition: a worker host/port serving a
/// specific file via the chunk-stream protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedPartitionInfo {
    pub epoch_id: u64,
    pub reduce_id: u64,
    pub host: String,
    pub port: u16,
    pub mode: PartitionMode,
    pub file_path: String,
    pub file_length: u64,
}

/// The full set of replicas a shuffle key's partition was committed to.
/// Always has at least one piece; validated at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Epoch {
    shuffle_key: String,
    pieces: Vec<CommittedPartitionInfo>,
}

impl Epoch {
    pub fn new(
        shuffle_key: impl Into<String>,
        pieces: Vec<CommittedPartitionInfo>,
    ) -> Result<Self, ReaderError> {
        let shuffle_key = shuffle_key.into();
        if shuffle_key.is_empty() {
            return Err(ReaderError::InvalidArgument(
                "shuffle_key must not be empty".to_string(),
            ));
        }
        if pieces.is_empty() {
            return Err(ReaderError::InvalidArgument(
                "an epoch must carry at least one piece".to_string(),
            ));
        }
        Ok(Self {
            shuffle_key,
            pieces,
        })
    }

    pub fn shuffle_key(&self) -> &str {
        &self.shuffle_key
    }

    pub fn pieces(&self) -> &[CommittedPartitionInfo] {
        &self.pieces
    }
}

/// Resolves a shuffle key to its committed partition replicas. Talking to
/// the actual cluster control plane is out of scope for this crate; this
/// trait exists so callers can plug in whatever client that is.
#[async_trait]
pub trait PartitionLocator: Send + Sync {
    async fn locate(&self, shuffle_key: &str) -> Result<Vec<CommittedPartitionInfo>, LocatorError>;
}
