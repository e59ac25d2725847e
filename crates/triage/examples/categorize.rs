// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Classifying a broker error taxonomy with a custom categorizer.

use triage::{ErrorCategorizer, ErrorCategory, RecoverAllErrors};

#[derive(Debug)]
enum BrokerError {
    RequestTimedOut,
    NotLeaderForPartition,
    RecordTooLarge,
    TopicAuthorizationFailed,
}

struct BrokerPolicy;

impl ErrorCategorizer<BrokerError> for BrokerPolicy {
    fn categorize(&self, cause: &BrokerError) -> ErrorCategory {
        match cause {
            BrokerError::RequestTimedOut | BrokerError::NotLeaderForPartition => ErrorCategory::Recoverable,
            BrokerError::RecordTooLarge | BrokerError::TopicAuthorizationFailed => ErrorCategory::NotRecoverable,
        }
    }
}

fn main() {
    let causes = [
        BrokerError::RequestTimedOut,
        BrokerError::NotLeaderForPartition,
        BrokerError::RecordTooLarge,
        BrokerError::TopicAuthorizationFailed,
    ];

    for cause in &causes {
        println!("{cause:?} -> policy says {}, default says {}",
            BrokerPolicy.categorize(cause),
            RecoverAllErrors.categorize(cause));
    }
}
