//! Fixgraph DB - Persistence layer for the fix-relationship graph
//!
//! This crate manages the local sled database: commit nodes, fix edges,
//! the description reverse index, and per-branch watermarks. Node
//! insertion is idempotent and edge insertion is best-effort, which is
//! what makes overlapping or repeated sync runs safe.

mod database;

pub use database::{EdgeOutcome, FixStore, InsertOutcome};
