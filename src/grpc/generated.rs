//! Tonic/prost-generated types for the `fleet.v1` package, compiled from
//! `proto/fleet.proto` by `build.rs`.

#![allow(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(missing_docs)]

include!(concat!(env!("OUT_DIR"), "/fleet.v1.rs"));
