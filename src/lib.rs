//! Library exports for reuse in benchmarks and tests.
/// Application directory helpers.
pub mod app_dirs;
/// Runtime configuration for a verification run.
pub mod config;
/// Platform file copy for unmatched card files.
pub mod copy;
/// Bounded-prefix content digests.
pub mod digest;
/// Matching and verification engine.
pub mod engine;
/// Card and disk tree indices.
pub mod index;
/// Logging setup.
pub mod logging;
/// Unmatched-file report sink and HTML rendering.
pub mod report;
