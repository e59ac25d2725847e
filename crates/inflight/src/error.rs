// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Errors raised for caller setup mistakes.
///
/// Runtime conditions (duplicate resolutions, out-of-order callbacks, late deliveries)
/// are absorbed by the tracker and never surface here.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TrackError {
    /// A unit must fan out into at least one record write.
    #[error("a tracked unit requires at least one record to write")]
    EmptyUnit,
}
