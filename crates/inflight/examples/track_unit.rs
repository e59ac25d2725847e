// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Tracking one input unit that fans out into three broker writes.
//!
//! A real deployment drives the tracker from a broker client's I/O threads; here a few
//! spawned threads stand in for them.

use std::sync::Arc;
use std::thread;

use inflight::{ClientCallback, ErrorCategory, FailureSummary, TopicRecord, UnitTrackerBuilder};

struct Message {
    topic: &'static str,
    payload: &'static str,
}

impl TopicRecord for Message {
    fn topic(&self) -> &str {
        self.topic
    }
}

struct LogOutcome;

impl ClientCallback<String> for LogOutcome {
    fn unit_processed(&self, seq: u64) {
        println!("unit #{seq}: every record was written");
    }

    fn unit_failed_finally(&self, seq: u64, failure: FailureSummary<String>, try_recover: bool) {
        println!("unit #{seq}: gave up ({failure}); producer restart worthwhile: {try_recover}");
    }

    fn unit_failed_temporarily(&self, seq: u64, cause: &String) {
        println!("unit #{seq}: transient failure, will retry: {cause}");
    }
}

fn main() -> Result<(), inflight::TrackError> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let records = vec![
        Message { topic: "orders", payload: "order 1001" },
        Message { topic: "audit", payload: "order 1001 accepted" },
        Message { topic: "metrics", payload: "orders=1" },
    ];

    let tracker = UnitTrackerBuilder::new()
        .max_generations_per_attempt(2)
        .categorizer_with(|cause: &String| {
            if cause.contains("timeout") {
                ErrorCategory::Recoverable
            } else {
                ErrorCategory::NotRecoverable
            }
        })
        .track("tuple #1", records, Arc::new(LogOutcome) as _)?;

    // The broker client resolves each attempt on its own threads, in no particular order.
    let workers: Vec<_> = tracker
        .pending_attempts()
        .into_iter()
        .map(|attempt| {
            thread::spawn(move || match attempt.topic() {
                "orders" => attempt.complete(),
                "audit" => {
                    // First generation times out; the attempt stays pending.
                    attempt.fail("delivery timeout".to_string());
                }
                _ => attempt.complete(),
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker thread panicked");
    }

    // The connection-level failure made the owning client replace its broker client;
    // pending attempts carry over to the new producer generation and get reissued.
    tracker.advance_generation_cancel_pending();
    for attempt in tracker.pending_attempts() {
        println!(
            "reissuing record '{}' to '{}' under generation {}",
            attempt.record().payload,
            attempt.topic(),
            attempt.generation()
        );
        attempt.complete();
    }

    Ok(())
}
