//! VibeJudge result store.
//!
//! Embedded SQLite persistence for the VibeJudge podcast-analysis
//! pipeline: uploaded podcasts, per-run analysis results, and the
//! individual bias flags detected in each run. The scoring itself
//! happens elsewhere; this crate only stores and serves the results,
//! enforcing the lifecycle, enumeration, and referential-integrity
//! rules at the write boundary.

pub mod database;
pub mod error;

pub use database::{
    Analysis, BiasCategory, BiasFlag, BiasLevel, Database, NewAnalysis, NewBiasFlag, NewPodcast,
    Podcast, PodcastStatus, Severity, StoreStats,
};
pub use error::StoreError;
