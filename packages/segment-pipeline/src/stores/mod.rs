//! Storage implementations for the segmentation pipeline.
//!
//! Available backends:
//! - `MemoryStore` - In-memory segment records with a write log
//! - `MemoryTextStore` - In-memory segment text

pub mod memory;

pub use memory::{MemoryStore, MemoryTextStore, WriteLogEntry};
