//! Raindrop.io Tag Cleaner
//!
//! One-shot cleanup of a raindrop.io tag set: authorize via OAuth, list all
//! tags, and delete every tag that is not on an allowlist while staying
//! under the API rate limit.
//!
//! # Overview
//!
//! - **Authorization**: OAuth2 authorization-code flow completed by a local
//!   redirect listener; the access token lives in memory only
//! - **Deletion**: sequential, paced delete calls with per-tag outcomes;
//!   a failed tag is recorded and the run continues
//! - **Dry run**: report what would be deleted without deleting anything
//!
//! # Example Usage
//!
//! ```no_run
//! use raindrop_tag_cleaner::cli::{run_cleanup, Cli, ProgressReporter, RunOutcome};
//! use clap::Parser;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     raindrop_tag_cleaner::client::install_crypto_provider();
//!     let cli = Cli::parse();
//!     let reporter = ProgressReporter::new();
//!
//!     if let RunOutcome::Completed(report) = run_cleanup(&cli, &reporter).await? {
//!         println!("{}", report.summary());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`allowlist`] - Allowlist file parsing
//! - [`auth`] - OAuth2 authorization-code flow and access token
//! - [`cleaner`] - Batch deletion engine, confirmation prompt, and report
//! - [`cli`] - Command-line interface and run orchestration
//! - [`client`] - Raindrop API client and service traits
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases
//! - [`models`] - Wire types and deletion outcomes
//! - [`rate_limiter`] - Fixed-interval request pacing
//! - [`redirect`] - Local OAuth redirect listener

pub mod allowlist;
pub mod auth;
pub mod cleaner;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod rate_limiter;
pub mod redirect;

// Re-export commonly used types for convenience
pub use error::{CleanerError, Result};

pub use allowlist::Allowlist;
pub use auth::{AccessToken, AuthSession, AuthState, Authorizer};
pub use cleaner::{CleanupReport, Confirmation, DeletionPlan, TagCleaner};
pub use client::{OAuthProvider, RaindropClient, TagService};
pub use config::Config;
pub use models::{DeletionOutcome, SkipReason, Tag};
pub use rate_limiter::RequestPacer;
pub use redirect::{CodeSlot, ListenerHandle, RedirectListener};
