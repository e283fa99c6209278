//! The chunk-stream protocol: open a stream over a committed partition
//! file, then pull its chunks strictly in increasing index order.

mod client;
mod proto;

pub use client::{ChunkStreamClient, ChunkStreamClientPool};
pub use proto::{ChunkData, OpenStreamRequest, StreamHandle};

// The fault-injectable in-process reference server is test-only scaffolding
// (SPEC_FULL.md §3): it backs the reader's retry/failover tests, but has no
// business shipping as part of the production library's public API.
#[cfg(test)]
pub(crate) mod server;
#[cfg(test)]
pub(crate) use server::{ChunkFault, ChunkStreamServer, FaultPolicy};

#[cfg(test)]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/retry_failover.rs"]
mod retry_failover_tests;
