//! Collaborator abstractions for the segmentation pipeline.
//!
//! Applications implement these to provide record storage, text storage
//! and text generation.

pub mod generator;
pub mod store;
