//! Host-side rendition of the insight capture pipeline.
//!
//! The kernel programs in `insight-ebpf` run the hook logic of
//! [`insight_common::probe`] against BPF maps. This crate runs the same logic against
//! ordinary concurrent data structures: bounded correlation tables, per-worker scratch
//! records, a per-CPU fixed-slot channel and a reserve/commit ring. It also builds the
//! load-time configuration records from typed values.

pub mod channel;
pub mod config;
pub mod error;
pub mod histogram;
pub mod scratch;
pub mod table;
pub mod task;
pub mod tracer;

pub use error::ConfigError;
