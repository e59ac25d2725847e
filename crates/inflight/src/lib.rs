// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Exactly-once outcome tracking for fanned-out broker writes.
//!
//! # Why
//!
//! A message producer that fans one logical input unit out into several broker writes
//! (one per destination topic) has a bookkeeping problem: the writes resolve
//! concurrently, out of order, on the broker client's own threads, and some of them
//! fail in ways worth retrying while others do not. Whoever owns the unit still wants
//! exactly one answer, exactly once: either "everything was written" or "this is what
//! could not be written, and here is whether restarting the producer would help".
//!
//! This crate is that bookkeeping. It tracks the many-to-one relation between a unit
//! and its in-flight write attempts, classifies failures as transient or permanent
//! through a pluggable [`ErrorCategorizer`], coordinates attempt-level retry across
//! successive producer generations, and reports one terminal outcome per unit to the
//! owning client's [`ClientCallback`].
//!
//! # Core Types
//!
//! - [`UnitTracker`]: The per-unit aggregate; owns the outstanding attempts and decides
//!   completion and retry eligibility.
//! - [`SendAttempt`]: One outstanding write of one record, tagged with the producer
//!   generation it is issued under.
//! - [`ClientCallback`]: The capability set outcomes are reported through.
//! - [`ErrorCategorizer`] / [`ErrorCategory`]: The failure classification policy and
//!   its verdict, re-exported from the `triage` crate.
//!
//! # Two Retry Tiers
//!
//! Retry happens at two decoupled levels, and this crate deliberately keeps them apart:
//!
//! - **Attempt level**: a recoverable failure within the attempt's generation budget
//!   (see [`UnitTrackerBuilder::max_generations_per_attempt`]) surfaces only as
//!   [`ClientCallback::unit_failed_temporarily`]; the attempt stays pending and the
//!   owning client may reissue it, typically after replacing the broker client and
//!   calling [`UnitTracker::advance_generation_cancel_pending`].
//! - **Unit level**: once a unit terminally fails,
//!   [`ClientCallback::unit_failed_finally`] carries a `try_recover` advisory that is
//!   `true` only when some attempt saw a recoverable cause *and* attempts were allowed
//!   exactly one generation each, signalling that a full producer restart (not another
//!   record resend) is the remedy worth trying.
//!
//! # Thread Safety
//!
//! A tracker is shared as an `Arc` and may be driven from any number of broker I/O
//! threads at once. Resolutions for the same unit may arrive concurrently and in any
//! order; duplicate resolutions are logged and ignored. The terminal report is emitted
//! by whichever thread resolves the last outstanding attempt, outside the tracker's
//! internal lock, so callback implementations may freely call back into the tracker.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use inflight::{ClientCallback, ErrorCategory, FailureSummary, TopicRecord, UnitTrackerBuilder};
//!
//! struct Message {
//!     topic: &'static str,
//! }
//!
//! impl TopicRecord for Message {
//!     fn topic(&self) -> &str {
//!         self.topic
//!     }
//! }
//!
//! struct PrintOutcome;
//!
//! impl ClientCallback<String> for PrintOutcome {
//!     fn unit_processed(&self, seq: u64) {
//!         println!("unit #{seq} fully produced");
//!     }
//!     fn unit_failed_finally(&self, seq: u64, failure: FailureSummary<String>, try_recover: bool) {
//!         println!("unit #{seq} failed: {failure}, restart producer: {try_recover}");
//!     }
//!     fn unit_failed_temporarily(&self, seq: u64, cause: &String) {
//!         println!("unit #{seq} will be retried: {cause}");
//!     }
//! }
//!
//! # fn main() -> Result<(), inflight::TrackError> {
//! let tracker = UnitTrackerBuilder::new()
//!     .max_generations_per_attempt(1)
//!     // Broker errors mentioning a timeout are worth retrying, everything else is not.
//!     .categorizer_with(|cause: &String| {
//!         if cause.contains("timeout") {
//!             ErrorCategory::Recoverable
//!         } else {
//!             ErrorCategory::NotRecoverable
//!         }
//!     })
//!     .track(
//!         "tuple #42",
//!         vec![Message { topic: "orders" }, Message { topic: "audit" }],
//!         Arc::new(PrintOutcome) as _,
//!     )?;
//!
//! // The broker client resolves attempts from its I/O threads; here, inline.
//! let attempts = tracker.pending_attempts();
//! attempts[0].complete();
//! attempts[1].fail("delivery timeout exceeded".to_string());
//! # Ok(())
//! # }
//! ```

mod attempt;
mod callback;
mod error;
mod record;
mod tracker;

#[doc(inline)]
pub use triage::{ErrorCategory, ErrorCategorizer, RecoverAllErrors};

pub use attempt::{ProduceFailedHandler, ProducedHandler, SendAttempt, SendHandle};
pub use callback::{ClientCallback, FailureSummary};
pub use error::TrackError;
pub use record::TopicRecord;
pub use tracker::{UnitTracker, UnitTrackerBuilder};
