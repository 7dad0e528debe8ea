//! VoiceStack Core - job pipeline orchestration and speaker identity resolution.
//!
//! This crate turns an uploaded media file into a time-aligned,
//! speaker-attributed transcript. It sequences the processing stages,
//! serialises accelerator-bound work behind a leased lock, and matches voice
//! embeddings against a persistent speaker registry.
//!
//! The inference engines themselves are external collaborators reached
//! through the adapter traits in [`stages`].

pub mod config;
pub mod lease;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod process;
pub mod speakers;
pub mod stages;
pub mod store;
pub mod transcript;

pub use orchestrator::{PipelineError, StageError, StageResult};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_returns_value() {
        assert!(!version().is_empty());
    }
}
