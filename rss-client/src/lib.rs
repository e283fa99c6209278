//! Client library for the remote shuffle service's disk-backed chunk stream.
//!
//! [reader::EpochReader] is the main entry point: given an [locator::Epoch]
//! (the set of replicas a reducer's partition was committed to), it drives
//! a [chunkstream::ChunkStreamClient] through chunk-by-chunk retry and
//! piece-to-piece failover, handing back plain decoded bytes.

pub mod chunkstream;
pub mod codec;
pub mod errors;
pub mod locator;
pub mod reader;
pub mod transport;

pub use errors::{ChunkStreamError, CodecError, LocatorError, ReaderError};
pub use locator::{CommittedPartitionInfo, Epoch, PartitionLocator, PartitionMode};
pub use reader::{EpochReader, ReaderConfig, ReaderConfigBuilder};
