// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// A record payload that knows which topic it is destined for.
///
/// The tracker treats record payloads as opaque; the only thing it ever asks of them is
/// the destination topic, which it stamps onto the attempt at construction time so that
/// failure reports can name the topics a unit could not be written to.
///
/// # Examples
///
/// ```rust
/// use inflight::TopicRecord;
///
/// struct Message {
///     topic: String,
///     payload: Vec<u8>,
/// }
///
/// impl TopicRecord for Message {
///     fn topic(&self) -> &str {
///         &self.topic
///     }
/// }
/// ```
pub trait TopicRecord {
    /// Returns the destination topic this record is to be written to.
    fn topic(&self) -> &str;
}
