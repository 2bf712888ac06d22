//! coursesync - Local mirror of learning-management-system courses
//!
//! coursesync walks the courses visible to an access token and mirrors their
//! content into a local directory tree. Re-running is cheap: every artifact is
//! stamped with its remote modification time and skipped while that stamp
//! still matches.
//!
//! ## Core Features
//!
//! - **Five Categories**: Files, module items, assignment attachments, wiki pages and announcements
//! - **Freshness Gate**: The local mtime is the only synchronization state
//! - **Best Effort**: Failed items and categories are logged and skipped, never fatal
//! - **Resilient Calls**: Timeouts, bounded retry with backoff and Ctrl-C cancellation
//!
//! ## Modules
//!
//! - [`config`]: Tuning file and immutable runtime configuration
//! - [`api`]: Remote record types and the `LmsApi` collaborator trait
//! - [`canvas`]: REST implementation of `LmsApi`
//! - [`resilient`]: Timeout, retry and cancellation decorator
//! - [`categories`]: Per-category downloaders
//! - [`mirror`]: Course orchestration and run summaries

pub mod api;
pub mod canvas;
pub mod categories;
pub mod config;
pub mod dedup;
pub mod freshness;
pub mod html;
pub mod mirror;
pub mod paths;
pub mod resilient;
pub mod retry;

pub use api::LmsApi;
pub use canvas::CanvasClient;
pub use config::{Config, CourseSelection, Settings};
pub use mirror::{CourseReport, MirrorEngine, MirrorSummary};
pub use resilient::ResilientApi;
