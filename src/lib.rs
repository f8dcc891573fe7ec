//! Photo aggregation for travel attractions with a visual consensus filter.
//!
//! Candidate images from each provider are fetched, perceptually hashed and
//! reduced to the ones that agree with the group's most typical image.

pub mod api;
pub mod attractions;
pub mod cache;
pub mod config;
pub mod consensus;
pub mod distance;
pub mod fetch;
pub mod fingerprint;
pub mod orchestrator;
pub mod providers;
pub mod search;

pub use orchestrator::ConsensusFilter;
