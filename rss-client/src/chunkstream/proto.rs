#![allow(clippy::derive_partial_eq_without_eq)]
// https://github.com/hyperium/tonic/issues/1056

//! Generated types and client/server stubs for `rss.v1`, compiled from
//! `protos/chunkstream.proto` by `build.rs`.

tonic::include_proto!("rss.v1");
