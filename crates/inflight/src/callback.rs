// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

/// The capability set a tracker reports unit outcomes through.
///
/// The owning client supplies one implementation per tracker (usually itself, shared as
/// an `Arc`). For every tracked unit, exactly one of [`unit_processed`][Self::unit_processed]
/// or [`unit_failed_finally`][Self::unit_failed_finally] is invoked, exactly once, after
/// the last outstanding attempt resolves. [`unit_failed_temporarily`][Self::unit_failed_temporarily]
/// may be invoked any number of times before that while attempts are still within their
/// retry budget.
///
/// Callbacks are invoked from the broker client's I/O threads, outside the tracker's
/// internal lock; implementations are free to call back into the tracker.
pub trait ClientCallback<E>: Send + Sync {
    /// Every record write for the unit succeeded.
    fn unit_processed(&self, seq_number: u64);

    /// The unit terminally failed; no attempt remains outstanding.
    ///
    /// `try_recover` advises whether replacing the whole producer generation (a broker
    /// client restart) is warranted, as opposed to surfacing the failure downstream.
    fn unit_failed_finally(&self, seq_number: u64, failure: FailureSummary<E>, try_recover: bool);

    /// An attempt failed but remains retryable within its generation budget.
    ///
    /// The unit stays pending; the cause is borrowed because the tracker does not
    /// record temporary failures.
    fn unit_failed_temporarily(&self, seq_number: u64, cause: &E);
}

/// What went wrong for one unit: the topics that lost records, and the last cause seen.
///
/// Handed to [`ClientCallback::unit_failed_finally`] by value so the client can attach
/// it to its own error output without cloning the cause. A mid-flight snapshot is also
/// available through [`UnitTracker::failure`][crate::UnitTracker::failure].
#[derive(Debug, Clone)]
pub struct FailureSummary<E> {
    failed_topics: BTreeSet<String>,
    last_cause: Option<E>,
}

impl<E> FailureSummary<E> {
    /// Creates a summary from a set of failed topics and the most recent cause.
    #[must_use]
    pub fn new(failed_topics: BTreeSet<String>, last_cause: Option<E>) -> Self {
        Self {
            failed_topics,
            last_cause,
        }
    }

    /// The topics on which at least one write for the unit permanently failed.
    #[must_use]
    pub fn failed_topics(&self) -> &BTreeSet<String> {
        &self.failed_topics
    }

    /// The most recent failure cause recorded for the unit, if any.
    #[must_use]
    pub fn last_cause(&self) -> Option<&E> {
        self.last_cause.as_ref()
    }

    /// Decomposes the summary into its parts.
    #[must_use]
    pub fn into_parts(self) -> (BTreeSet<String>, Option<E>) {
        (self.failed_topics, self.last_cause)
    }
}

impl<E: Display> Display for FailureSummary<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed topics [")?;
        for (i, topic) in self.failed_topics.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{topic}")?;
        }
        write!(f, "]")?;
        if let Some(cause) = &self.last_cause {
            write!(f, ", last cause: {cause}")?;
        }
        Ok(())
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use static_assertions::assert_obj_safe;

    use super::*;

    assert_obj_safe!(ClientCallback<String>);

    fn summary(topics: &[&str], cause: Option<&str>) -> FailureSummary<String> {
        FailureSummary::new(
            topics.iter().map(ToString::to_string).collect(),
            cause.map(ToString::to_string),
        )
    }

    #[test]
    fn accessors_round_trip() {
        let s = summary(&["alpha", "beta"], Some("broker down"));
        assert_eq!(s.failed_topics().len(), 2);
        assert_eq!(s.last_cause().map(String::as_str), Some("broker down"));

        let (topics, cause) = s.into_parts();
        assert!(topics.contains("alpha"));
        assert_eq!(cause.as_deref(), Some("broker down"));
    }

    #[test]
    fn display_lists_topics_and_cause() {
        let s = summary(&["beta", "alpha"], Some("broker down"));
        assert_eq!(s.to_string(), "failed topics [alpha, beta], last cause: broker down");
    }

    #[test]
    fn display_without_cause() {
        let s = summary(&["solo"], None);
        assert_eq!(s.to_string(), "failed topics [solo]");
    }
}
