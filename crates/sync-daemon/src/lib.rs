//! sync-daemon: Headless background synchronization.
//!
//! The host scheduler (systemd timer, launchd job, app lifecycle hook)
//! invokes the binary at startup or shutdown. It assembles a silent run
//! against a directory-backed cloud and reports a before/after content
//! fingerprint as JSON on stdout.

pub mod headless;
pub mod setup;

pub use headless::HeadlessUi;
pub use setup::{DaemonPaths, build_context};
