//! # Debate Sync Testkit
//!
//! Testing utilities for debate ledger sync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a memory store and memory ledger wired together, plus
//!   deterministic identifiers and event builders
//! - **Generators**: Proptest strategies for block-ordered debate histories
//!   and the at-least-once delivery schedules the sync engine must tolerate
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use debate_sync_testkit::generators::{two_source_delivery, DebateHistory};
//!
//! proptest! {
//!     #[test]
//!     fn deliveries_converge((history, deliveries) in two_source_delivery()) {
//!         // apply `deliveries`, compare with `history.events()` applied in order
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,ignore
//! use debate_sync_testkit::fixtures::TestFixture;
//!
//! let fixture = TestFixture::new();
//! fixture.create_debate(1).await;
//! fixture.ledger.emit(fixture.contract, fixture.joined(1, 0xaa, 100)).await;
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{addr, tx, wait_until, TestFixture};
pub use generators::{interleave, out_of_order_delivery, two_source_delivery, DebateHistory};
