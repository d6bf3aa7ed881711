//! Adapters that live inside the domain crate.
//!
//! The in-memory store backs unit tests and the `memory` storage mode. The
//! relational store lives in the sqlite-adapter crate.

pub mod memory_repo;
