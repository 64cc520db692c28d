//! Partner Academy - learning and certification progression engine
//!
//! Partners work through a course chapter by chapter. A chapter may ask
//! them to watch a video past a threshold and/or pass a scored quiz with a
//! limited number of attempts; the next chapter opens only once the
//! previous one is completed, and finishing every chapter issues a
//! certificate exactly once.
//!
//! ## Components
//!
//! | Module | Role |
//! |--------|------|
//! | [`catalog`] | Read-only course structure, imported from JSON |
//! | [`gating`] | Pure visible-status rule over stored progress |
//! | [`video`] | Video source union and the watched threshold |
//! | [`db`] | SQLite persistence (Diesel + r2d2) |
//! | [`services`] | Progression tracker, video monitor, assessments, certificates |
//! | [`http`] | hyper HTTP/1 API |
//!
//! ## Storage Layout
//!
//! ```text
//! <storage_dir>/
//! ├── academy.db     # Catalog, progress, attempts, certificates
//! └── config.toml    # Configuration
//! ```

pub mod config;
pub mod error;
pub mod gating;
pub mod video;
pub mod catalog;
pub mod db;
pub mod services;
pub mod http;

// Re-exports
pub use config::Config;
pub use error::LearningError;
pub use gating::ChapterStatus;
pub use video::VideoSource;
pub use catalog::{CourseCatalog, SqliteCatalog};
pub use db::{DbOptions, LearningDb, PartnerContext};
pub use services::{EngineSettings, EventBus, LearningEvent, Services, SubmitOutcome};
pub use http::HttpServer;
