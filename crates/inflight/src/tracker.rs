// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::{BTreeSet, HashMap};
use std::fmt::{Debug, Display, Formatter};
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use triage::{ErrorCategorizer, RecoverAllErrors};

use crate::attempt::{ProduceFailedHandler, ProducedHandler, SendAttempt};
use crate::{ClientCallback, FailureSummary, TopicRecord, TrackError};

static NEXT_UNIT_SEQ: AtomicU64 = AtomicU64::new(1);

/// Tracks the outstanding record writes of one input unit and reports its outcome
/// exactly once.
///
/// One logical input unit fans out into one write attempt per destination topic. The
/// broker client resolves those attempts concurrently, in arbitrary order, from its own
/// I/O threads; the tracker aggregates the resolutions and, the moment the last attempt
/// resolves, reports exactly one of "processed" or "failed finally" to the
/// [`ClientCallback`] it was given. Failures are classified through a
/// [`triage::ErrorCategorizer`]: a recoverable failure inside the attempt's generation
/// budget only produces a temporary-failure notification, while a non-recoverable cause
/// or an exhausted budget permanently fails the attempt.
///
/// Duplicate resolutions for an already-resolved attempt are tolerated: they are logged
/// and ignored, and can neither skew the counts nor produce a second terminal report.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use inflight::{ClientCallback, FailureSummary, TopicRecord, UnitTrackerBuilder};
///
/// struct Message {
///     topic: String,
/// }
///
/// impl TopicRecord for Message {
///     fn topic(&self) -> &str {
///         &self.topic
///     }
/// }
///
/// #[derive(Default)]
/// struct Outcomes {
///     processed: AtomicU32,
/// }
///
/// impl ClientCallback<String> for Outcomes {
///     fn unit_processed(&self, _seq: u64) {
///         self.processed.fetch_add(1, Ordering::SeqCst);
///     }
///     fn unit_failed_finally(&self, _seq: u64, _failure: FailureSummary<String>, _try_recover: bool) {}
///     fn unit_failed_temporarily(&self, _seq: u64, _cause: &String) {}
/// }
///
/// # fn main() -> Result<(), inflight::TrackError> {
/// let outcomes = Arc::new(Outcomes::default());
/// let records = vec![
///     Message { topic: "orders".into() },
///     Message { topic: "audit".into() },
/// ];
///
/// let tracker = UnitTrackerBuilder::new().track("tuple #1", records, Arc::clone(&outcomes) as _)?;
///
/// // The broker client resolves each attempt as its sends complete.
/// for attempt in tracker.pending_attempts() {
///     attempt.complete();
/// }
///
/// assert_eq!(outcomes.processed.load(Ordering::SeqCst), 1);
/// # Ok(())
/// # }
/// ```
pub struct UnitTracker<U, R, E: 'static> {
    seq_number: u64,
    unit: U,
    initial_attempts: usize,
    max_generations_per_attempt: u32,
    categorizer: Box<dyn ErrorCategorizer<E>>,
    callback: Arc<dyn ClientCallback<E>>,
    state: Mutex<TrackerState<R, E>>,
}

/// The mutation group. Every field in here is read and written under the one lock so
/// that removal of an attempt and the "was that the last one" decision are atomic
/// together.
struct TrackerState<R, E: 'static> {
    pending: HashMap<u64, Arc<SendAttempt<R, E>>>,
    produced_count: usize,
    recoverable_seen: bool,
    last_failure: Option<E>,
    failed_topics: BTreeSet<String>,
}

/// Terminal disposition computed inside the lock, delivered outside it.
enum Terminal<E> {
    Processed,
    FailedFinally {
        failure: FailureSummary<E>,
        try_recover: bool,
    },
}

impl<U, R, E: 'static> UnitTracker<U, R, E> {
    /// The unit's sequence number: process-wide unique, assigned at construction, used
    /// as the correlation key in every callback.
    #[must_use]
    pub fn seq_number(&self) -> u64 {
        self.seq_number
    }

    /// The input payload being processed. Held read-only; the caller owns its meaning.
    #[must_use]
    pub fn unit(&self) -> &U {
        &self.unit
    }

    /// Snapshot of the attempts still outstanding, as a new collection.
    ///
    /// The owning client uses this to reissue surviving attempts on a replacement
    /// broker client after [`advance_generation_cancel_pending`][Self::advance_generation_cancel_pending].
    #[must_use]
    pub fn pending_attempts(&self) -> Vec<Arc<SendAttempt<R, E>>> {
        self.state.lock().pending.values().map(Arc::clone).collect()
    }

    /// Carries every still-pending attempt over to the next producer generation.
    ///
    /// Takes a point-in-time snapshot of the pending attempts, then instructs each to
    /// cancel its in-flight send and retag itself under generation + 1. Membership is
    /// unchanged: the same sequence numbers survive across generations.
    ///
    /// Invoked by the owning client after it has replaced the underlying broker client,
    /// so that already-pending attempts continue under the new client instead of being
    /// silently lost.
    pub fn advance_generation_cancel_pending(&self) {
        let pending = self.pending_attempts();
        tracing::info!(
            unit = self.seq_number,
            attempts = pending.len(),
            "carrying pending attempts over to next producer generation"
        );
        for attempt in pending {
            attempt.advance_generation();
        }
    }

    /// Records a topic the owning client itself failed to write to.
    ///
    /// For failures the broker never saw, such as a synchronous dispatch error.
    pub fn record_failed_topic(&self, topic: impl Into<String>) {
        let _ = self.state.lock().failed_topics.insert(topic.into());
    }

    /// Records a failure cause observed by the owning client itself.
    pub fn record_failure(&self, cause: E) {
        self.state.lock().last_failure = Some(cause);
    }

    /// Snapshot of what has gone wrong for this unit so far.
    pub fn failure(&self) -> FailureSummary<E>
    where
        E: Clone,
    {
        let state = self.state.lock();
        FailureSummary::new(state.failed_topics.clone(), state.last_failure.clone())
    }

    fn take_terminal_failure(&self, state: &mut TrackerState<R, E>) -> Terminal<E> {
        // Generation-level recovery is only offered when each attempt was allowed
        // exactly one generation; a larger budget means attempt-level retry already ran
        // its course under replacement producers.
        let try_recover = state.recoverable_seen && self.max_generations_per_attempt == 1;
        let failure = FailureSummary::new(mem::take(&mut state.failed_topics), state.last_failure.take());
        Terminal::FailedFinally { failure, try_recover }
    }

    fn report(&self, terminal: Terminal<E>) {
        match terminal {
            Terminal::Processed => {
                tracing::debug!(unit = self.seq_number, "unit done, all records produced");
                self.callback.unit_processed(self.seq_number);
            }
            Terminal::FailedFinally { failure, try_recover } => {
                tracing::debug!(unit = self.seq_number, try_recover, "unit done with failed records");
                self.callback.unit_failed_finally(self.seq_number, failure, try_recover);
            }
        }
    }
}

impl<U, R, E: 'static> ProducedHandler for UnitTracker<U, R, E>
where
    U: Send + Sync,
    R: Send + Sync,
    E: Display + Send,
{
    fn attempt_succeeded(&self, seq: u64) {
        let terminal = {
            let mut state = self.state.lock();
            if state.pending.remove(&seq).is_none() {
                tracing::warn!(seq, unit = self.seq_number, "attempt already resolved, ignoring duplicate completion");
                return;
            }
            state.produced_count += 1;
            tracing::debug!(
                seq,
                unit = self.seq_number,
                produced = state.produced_count,
                "record produced"
            );
            if !state.pending.is_empty() {
                None
            } else if state.produced_count == self.initial_attempts {
                Some(Terminal::Processed)
            } else {
                Some(self.take_terminal_failure(&mut state))
            }
        };

        if let Some(terminal) = terminal {
            self.report(terminal);
        }
    }
}

impl<U, R, E: 'static> ProduceFailedHandler<E> for UnitTracker<U, R, E>
where
    U: Send + Sync,
    R: Send + Sync,
    E: Display + Send,
{
    fn attempt_failed(&self, seq: u64, topic: &str, cause: E, generations_used: u32) {
        let recoverable = self.categorizer.categorize(&cause).is_recoverable();
        let finally_failed = !recoverable || generations_used > self.max_generations_per_attempt;
        tracing::warn!(
            seq,
            unit = self.seq_number,
            topic,
            generations_used,
            recoverable,
            cause = %cause,
            "record could not be produced"
        );

        if !finally_failed {
            // Still within the attempt's generation budget; membership untouched, the
            // unit stays pending.
            self.callback.unit_failed_temporarily(self.seq_number, &cause);
            return;
        }

        tracing::error!(
            seq,
            unit = self.seq_number,
            topic,
            generations_used,
            cause = %cause,
            "record finally failed"
        );
        let terminal = {
            let mut state = self.state.lock();
            state.recoverable_seen |= recoverable;
            if state.pending.remove(&seq).is_none() {
                tracing::warn!(seq, unit = self.seq_number, "attempt already resolved, ignoring duplicate failure");
                return;
            }
            state.last_failure = Some(cause);
            let _ = state.failed_topics.insert(topic.to_string());
            state
                .pending
                .is_empty()
                .then(|| self.take_terminal_failure(&mut state))
        };

        if let Some(terminal) = terminal {
            self.report(terminal);
        }
    }
}

impl<U, R, E: 'static> Debug for UnitTracker<U, R, E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitTracker")
            .field("seq_number", &self.seq_number)
            .field("initial_attempts", &self.initial_attempts)
            .field("max_generations_per_attempt", &self.max_generations_per_attempt)
            .finish_non_exhaustive()
    }
}

/// Builder for [`UnitTracker`].
///
/// Carries the per-unit policy knobs; the unit itself, its records, and the reporting
/// callback are supplied to [`track`][Self::track] or [`track_one`][Self::track_one],
/// which hand back the tracker with its attempts already created and bound.
///
/// # Defaults
///
/// | Parameter | Default | Configured By |
/// |-----------|---------|---------------|
/// | Producer generation | `0` | [`producer_generation`][Self::producer_generation] |
/// | Max generations per attempt | `1` | [`max_generations_per_attempt`][Self::max_generations_per_attempt] |
/// | Categorizer | [`RecoverAllErrors`] | [`categorizer`][Self::categorizer] |
pub struct UnitTrackerBuilder<E: 'static> {
    producer_generation: u32,
    max_generations_per_attempt: u32,
    categorizer: Box<dyn ErrorCategorizer<E>>,
}

impl<E: 'static> Default for UnitTrackerBuilder<E> {
    fn default() -> Self {
        Self {
            producer_generation: 0,
            max_generations_per_attempt: 1,
            categorizer: Box::new(RecoverAllErrors),
        }
    }
}

impl<E: 'static> UnitTrackerBuilder<E> {
    /// Creates a builder with the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the producer generation the initial attempts are issued under.
    ///
    /// **Default**: 0
    #[must_use]
    pub fn producer_generation(mut self, generation: u32) -> Self {
        self.producer_generation = generation;
        self
    }

    /// Sets how many producer generations one attempt may be issued under before a
    /// recoverable failure is escalated to a permanent one. Values below 1 are treated
    /// as 1.
    ///
    /// **Default**: 1
    #[must_use]
    pub fn max_generations_per_attempt(mut self, max_generations: u32) -> Self {
        self.max_generations_per_attempt = max_generations.max(1);
        self
    }

    /// Sets the failure classification policy for this unit.
    ///
    /// **Default**: [`RecoverAllErrors`], which never gives up on a write earlier than
    /// the generation budget allows.
    #[must_use]
    pub fn categorizer(mut self, categorizer: impl ErrorCategorizer<E> + 'static) -> Self {
        self.categorizer = Box::new(categorizer);
        self
    }

    /// Sets the failure classification policy from a closure.
    ///
    /// Equivalent to [`categorizer`][Self::categorizer] with a
    /// [`CategorizeFn`][triage::CategorizeFn]-wrapped closure.
    #[must_use]
    pub fn categorizer_with(self, categorize_fn: impl Fn(&E) -> triage::ErrorCategory + Send + Sync + 'static) -> Self {
        self.categorizer(triage::CategorizeFn::new(categorize_fn))
    }

    /// Builds a tracker with a 1-to-N relation between the unit and its records.
    ///
    /// Creates one attempt per record, issued under the configured producer generation,
    /// with the tracker bound as both success and failure handler.
    ///
    /// # Errors
    ///
    /// [`TrackError::EmptyUnit`] if `records` is empty; a unit must fan out into at
    /// least one write.
    pub fn track<U, R>(self, unit: U, records: Vec<R>, callback: Arc<dyn ClientCallback<E>>) -> Result<Arc<UnitTracker<U, R, E>>, TrackError>
    where
        U: Send + Sync + 'static,
        R: TopicRecord + Send + Sync + 'static,
        E: Display + Send,
    {
        if records.is_empty() {
            return Err(TrackError::EmptyUnit);
        }

        let tracker = Arc::new_cyclic(|weak: &Weak<UnitTracker<U, R, E>>| {
            let mut pending = HashMap::with_capacity(records.len());
            for record in records {
                let attempt = Arc::new(SendAttempt::new(record, self.producer_generation));
                let produced: Weak<dyn ProducedHandler> = weak.clone();
                let failed: Weak<dyn ProduceFailedHandler<E>> = weak.clone();
                attempt.bind_handlers(produced, failed);
                let _ = pending.insert(attempt.seq(), attempt);
            }
            UnitTracker {
                seq_number: NEXT_UNIT_SEQ.fetch_add(1, Ordering::Relaxed),
                unit,
                initial_attempts: pending.len(),
                max_generations_per_attempt: self.max_generations_per_attempt,
                categorizer: self.categorizer,
                callback,
                state: Mutex::new(TrackerState {
                    pending,
                    produced_count: 0,
                    recoverable_seen: false,
                    last_failure: None,
                    failed_topics: BTreeSet::new(),
                }),
            }
        });
        Ok(tracker)
    }

    /// Builds a tracker with a 1-to-1 relation between the unit and a single record.
    ///
    /// # Errors
    ///
    /// Infallible today; returns `Result` for signature symmetry with
    /// [`track`][Self::track].
    pub fn track_one<U, R>(self, unit: U, record: R, callback: Arc<dyn ClientCallback<E>>) -> Result<Arc<UnitTracker<U, R, E>>, TrackError>
    where
        U: Send + Sync + 'static,
        R: TopicRecord + Send + Sync + 'static,
        E: Display + Send,
    {
        self.track(unit, vec![record], callback)
    }
}

impl<E: 'static> Debug for UnitTrackerBuilder<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitTrackerBuilder")
            .field("producer_generation", &self.producer_generation)
            .field("max_generations_per_attempt", &self.max_generations_per_attempt)
            .finish_non_exhaustive()
    }
}
