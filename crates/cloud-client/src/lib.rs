//! cloud-client: Storage backend abstraction for the sync workflow.
//!
//! The remote backend is a dumb byte bucket: one well-known file per
//! account, no server-side logic. This crate defines the
//! `CloudStorageClient` seam the workflow talks through, the credential
//! model (including the OAuth2 hand-off types), and two concrete
//! clients:
//! - `MemoryCloud` - in-memory store with failure injection, for tests
//! - `DirectoryCloud` - a local directory as the "cloud", for the daemon
//!   and end-to-end tests
//!
//! The per-provider HTTP clients (WebDAV, FTP, Dropbox, ...) live outside
//! this workspace; each would be one more module implementing the same
//! trait.

pub mod client;
pub mod credentials;
pub mod directory;
pub mod memory;
pub mod oauth;

pub use client::{CloudError, CloudStorageClient, REPOSITORY_FILE_NAME};
pub use credentials::{CredentialRequirements, Credentials, SecretString};
pub use directory::DirectoryCloud;
pub use memory::{InjectedFailure, MemoryCloud, MemoryOAuth};
pub use oauth::{OAuth2Capable, OAuthError, OAuthToken, RedirectParams};
