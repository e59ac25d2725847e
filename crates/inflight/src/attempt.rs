// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{OnceLock, Weak};

use parking_lot::Mutex;

use crate::TopicRecord;

static NEXT_ATTEMPT_SEQ: AtomicU64 = AtomicU64::new(1);

/// Receives the success resolution of an attempt.
///
/// Bound at most once per attempt; the owning tracker binds itself at construction.
pub trait ProducedHandler: Send + Sync {
    /// The record write identified by `seq` reached the broker.
    fn attempt_succeeded(&self, seq: u64);
}

/// Receives the failure resolution of an attempt.
///
/// Bound at most once per attempt; the owning tracker binds itself at construction.
pub trait ProduceFailedHandler<E>: Send + Sync {
    /// The record write identified by `seq` failed on `topic` with `cause`, after having
    /// been issued under `generations_used` producer generations.
    fn attempt_failed(&self, seq: u64, topic: &str, cause: E, generations_used: u32);
}

/// A cancellable in-flight send, installed by the broker client while a write is pending.
pub trait SendHandle: Send {
    /// Abandons the in-flight send. The broker client must not resolve the attempt for
    /// a send it has been asked to cancel.
    fn cancel(&self);
}

/// One outstanding broker write for one record.
///
/// An attempt is identified by a sequence number that never repeats for the life of the
/// process, and carries the producer generation it is currently issued under. The broker
/// client resolves each attempt exactly once by calling [`complete`][Self::complete] or
/// [`fail`][Self::fail]; the resolution is forwarded to the handlers the owning tracker
/// bound at construction time.
///
/// When the owning client replaces its broker client after a connection-level failure,
/// still-pending attempts are carried over rather than lost:
/// [`advance_generation`][Self::advance_generation] cancels the in-flight send and
/// retags the attempt with the next generation so it can be reissued on the new client.
pub struct SendAttempt<R, E: 'static> {
    seq: u64,
    topic: String,
    record: R,
    initial_generation: u32,
    generation: AtomicU32,
    handle: Mutex<Option<Box<dyn SendHandle>>>,
    produced: OnceLock<Weak<dyn ProducedHandler>>,
    failed: OnceLock<Weak<dyn ProduceFailedHandler<E>>>,
}

impl<R: TopicRecord, E: 'static> SendAttempt<R, E> {
    /// Creates an attempt for `record`, issued under `generation`.
    pub(crate) fn new(record: R, generation: u32) -> Self {
        Self {
            seq: NEXT_ATTEMPT_SEQ.fetch_add(1, Ordering::Relaxed),
            topic: record.topic().to_string(),
            record,
            initial_generation: generation,
            generation: AtomicU32::new(generation),
            handle: Mutex::new(None),
            produced: OnceLock::new(),
            failed: OnceLock::new(),
        }
    }
}

impl<R, E: 'static> SendAttempt<R, E> {
    /// The attempt's sequence number, unique for the life of the process.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// The destination topic of the underlying record.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The record to be written.
    #[must_use]
    pub fn record(&self) -> &R {
        &self.record
    }

    /// The producer generation the attempt is currently issued under.
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::Relaxed)
    }

    /// How many producer generations this attempt has been issued under so far.
    #[must_use]
    pub fn generations_used(&self) -> u32 {
        self.generation.load(Ordering::Relaxed) - self.initial_generation + 1
    }

    /// Binds the success and failure handlers. Each binds at most once; later calls are
    /// ignored.
    pub(crate) fn bind_handlers(&self, produced: Weak<dyn ProducedHandler>, failed: Weak<dyn ProduceFailedHandler<E>>) {
        if self.produced.set(produced).is_err() || self.failed.set(failed).is_err() {
            tracing::warn!(seq = self.seq, "attempt handlers already bound, ignoring rebind");
        }
    }

    /// Installs the cancellable handle for the send currently in flight, replacing any
    /// handle left over from a previous generation.
    pub fn install_send_handle(&self, handle: Box<dyn SendHandle>) {
        *self.handle.lock() = Some(handle);
    }

    /// Resolves the attempt as succeeded.
    ///
    /// A resolution arriving after the owning tracker is gone is a no-op.
    pub fn complete(&self) {
        drop(self.handle.lock().take());
        match self.produced.get().and_then(Weak::upgrade) {
            Some(handler) => handler.attempt_succeeded(self.seq),
            None => tracing::debug!(seq = self.seq, "produced handler gone, dropping resolution"),
        }
    }

    /// Resolves the attempt as failed with `cause`.
    ///
    /// A resolution arriving after the owning tracker is gone is a no-op.
    pub fn fail(&self, cause: E) {
        drop(self.handle.lock().take());
        match self.failed.get().and_then(Weak::upgrade) {
            Some(handler) => handler.attempt_failed(self.seq, &self.topic, cause, self.generations_used()),
            None => tracing::debug!(seq = self.seq, "failure handler gone, dropping resolution"),
        }
    }

    /// Cancels the in-flight send and retags the attempt with the next producer
    /// generation.
    ///
    /// The sequence number is unchanged; the attempt stays pending and is expected to be
    /// reissued on the replacement broker client.
    pub fn advance_generation(&self) {
        let next = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            handle.cancel();
        }
        tracing::info!(seq = self.seq, generation = next, "attempt carried over to next producer generation");
    }
}

impl<R, E: 'static> Debug for SendAttempt<R, E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendAttempt")
            .field("seq", &self.seq)
            .field("topic", &self.topic)
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    use static_assertions::assert_impl_all;

    use super::*;

    struct Record(&'static str);

    impl TopicRecord for Record {
        fn topic(&self) -> &str {
            self.0
        }
    }

    assert_impl_all!(SendAttempt<String, String>: Send, Sync, Debug);

    struct FlagHandle(Arc<AtomicBool>);

    impl SendHandle for FlagHandle {
        fn cancel(&self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn attempt() -> SendAttempt<Record, String> {
        SendAttempt::new(Record("events"), 0)
    }

    #[test]
    fn seq_numbers_never_repeat() {
        let a = attempt();
        let b = attempt();
        assert_ne!(a.seq(), b.seq());
    }

    #[test]
    fn generations_used_starts_at_one() {
        let a = SendAttempt::<Record, String>::new(Record("events"), 5);
        assert_eq!(a.generation(), 5);
        assert_eq!(a.generations_used(), 1);
    }

    #[test]
    fn advance_generation_cancels_installed_handle() {
        let a = attempt();
        let cancelled = Arc::new(AtomicBool::new(false));
        a.install_send_handle(Box::new(FlagHandle(Arc::clone(&cancelled))));

        a.advance_generation();

        assert!(cancelled.load(Ordering::SeqCst));
        assert_eq!(a.generation(), 1);
        assert_eq!(a.generations_used(), 2);
    }

    #[test]
    fn advance_generation_without_handle_is_harmless() {
        let a = attempt();
        a.advance_generation();
        a.advance_generation();
        assert_eq!(a.generations_used(), 3);
    }

    #[test]
    fn resolution_without_tracker_is_a_no_op() {
        let a = attempt();
        a.complete();
        a.fail("broker unreachable".to_string());
    }

    #[test]
    fn complete_drops_handle_without_cancelling() {
        let a = attempt();
        let cancelled = Arc::new(AtomicBool::new(false));
        a.install_send_handle(Box::new(FlagHandle(Arc::clone(&cancelled))));

        a.complete();

        assert!(!cancelled.load(Ordering::SeqCst));
    }

    #[test]
    fn topic_comes_from_the_record() {
        let a = attempt();
        assert_eq!(a.topic(), "events");
        assert_eq!(a.record().0, "events");
    }
}
