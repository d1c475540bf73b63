//! AI field enrichment.
//!
//! - [`client`] - one field for one segment, with rate-limit retries
//! - [`coordinator`] - bounded worker pool over a whole segment list
//! - [`filter`] - response cleanup before persistence

pub mod client;
pub mod coordinator;
pub mod filter;

pub use client::{EnrichmentClient, FieldFailure, FieldOutcome};
pub use coordinator::{EnrichmentCoordinator, SegmentEnrichment};
pub use filter::filter_response;
