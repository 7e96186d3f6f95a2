//! End-to-end pipeline runs against the mock container engine and storage
//!
//! The archive is really built on disk; containers and buckets are in-memory.

mod compensation;
mod scenarios;
