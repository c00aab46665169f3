//! # Conference Test Utilities
//!
//! Shared test utilities for the conference coordinator.
//!
//! ## Modules
//!
//! - `fixtures` - Conferences and participants with common configurations
//! - `recording_sink` - Session event sink that keeps every record for assertions
//! - `harness` - Controller, catalog and sink wired together
//! - `client` - `TestClient`, which drives a `ConnectionHandler` without sockets
//!
//! ## Usage
//!
//! ```rust,ignore
//! use conf_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let harness = TestHarness::new();
//!     let mut host = harness.connect(TestParticipant::host("hana")).await;
//!     let mut ann = harness.connect(TestParticipant::new("ann")).await;
//!
//!     host.join("weekly").await;
//!     ann.join("weekly").await;
//!     host.expect_kind("participant_joined").await;
//! }
//! ```

pub mod client;
pub mod fixtures;
pub mod harness;
pub mod recording_sink;

pub use client::*;
pub use fixtures::*;
pub use harness::*;
pub use recording_sink::*;
