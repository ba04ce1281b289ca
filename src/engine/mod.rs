//! # engine
//!
//! Deterministic core: everything here is a pure function or a plain state
//! machine, no I/O.

pub mod consensus;
pub mod indicators;
pub mod king_node;
pub mod sizing;
pub mod tracker;
pub mod zone;
