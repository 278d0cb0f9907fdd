// Retrying uploader.
//
// The retry loop is driven by a pure state machine (`RetryState::next`) so
// the policy can be tested without a client. `RetryingUploader` feeds it the
// result of each real attempt and sleeps between retries.

use std::time::Duration;

use tracing::{debug, warn};

use crate::api::{RemoteClient, UploadReceipt, UploadRequest};
use crate::dataset::{Asset, UploadMetadata};
use crate::error::UploadError;

/// Retries after the first attempt unless configured otherwise.
pub const DEFAULT_RETRIES: u32 = 3;

/// How a single attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStatus {
    Success,
    TransientFailure,
    PermanentFailure,
}

/// Events that move the retry state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryEvent {
    Begin,
    Finished(AttemptStatus),
}

/// Retry loop state. Attempt numbers are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Idle,
    Attempting(u32),
    Succeeded(u32),
    Exhausted(u32),
}

impl RetryState {
    /// Pure transition function. `max_attempts` is retries + 1 and at least 1.
    /// Events that make no sense in the current state leave it unchanged.
    pub fn next(self, event: RetryEvent, max_attempts: u32) -> RetryState {
        match (self, event) {
            (RetryState::Idle, RetryEvent::Begin) => RetryState::Attempting(1),
            (RetryState::Attempting(n), RetryEvent::Finished(AttemptStatus::Success)) => {
                RetryState::Succeeded(n)
            }
            (RetryState::Attempting(n), RetryEvent::Finished(AttemptStatus::TransientFailure))
                if n < max_attempts =>
            {
                RetryState::Attempting(n + 1)
            }
            (RetryState::Attempting(n), RetryEvent::Finished(_)) => RetryState::Exhausted(n),
            (state, _) => state,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RetryState::Succeeded(_) | RetryState::Exhausted(_))
    }
}

/// Delay inserted before each retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
}

impl Backoff {
    /// Doubles from `initial` on every retry, capped at `max`.
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Backoff { initial, max }
    }

    pub fn fixed(delay: Duration) -> Self {
        Backoff {
            initial: delay,
            max: delay,
        }
    }

    pub fn none() -> Self {
        Backoff::fixed(Duration::ZERO)
    }

    /// Delay before `attempt` (1-based). The first attempt never waits.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 2);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::exponential(Duration::from_millis(500), Duration::from_secs(8))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff: Backoff,
    /// Stop at the first permanent error (bad key, unreadable file) instead
    /// of spending the remaining attempts.
    pub fail_fast: bool,
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            retries: DEFAULT_RETRIES,
            backoff: Backoff::default(),
            fail_fast: false,
        }
    }
}

/// One try of sending an asset. Lives only inside the retry loop.
#[derive(Debug)]
pub struct UploadAttempt {
    pub number: u32,
    pub result: Result<UploadReceipt, UploadError>,
}

impl UploadAttempt {
    fn status(&self, fail_fast: bool) -> AttemptStatus {
        match &self.result {
            Ok(_) => AttemptStatus::Success,
            Err(e) if fail_fast && e.is_permanent() => AttemptStatus::PermanentFailure,
            Err(_) => AttemptStatus::TransientFailure,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Uploaded,
    Failed,
}

/// Final result for one asset after retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub asset: Asset,
    pub status: OutcomeStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub receipt: Option<UploadReceipt>,
}

impl UploadOutcome {
    pub fn is_uploaded(&self) -> bool {
        self.status == OutcomeStatus::Uploaded
    }
}

/// Uploads one asset at a time against a shared client.
pub struct RetryingUploader<'a, C: ?Sized> {
    client: &'a C,
    policy: RetryPolicy,
}

impl<'a, C: RemoteClient + ?Sized> RetryingUploader<'a, C> {
    pub fn new(client: &'a C, policy: RetryPolicy) -> Self {
        RetryingUploader { client, policy }
    }

    /// Try the upload up to `retries + 1` times and return the final outcome.
    pub fn upload(&self, asset: Asset, metadata: &UploadMetadata) -> UploadOutcome {
        let max_attempts = self.policy.max_attempts();
        let request = UploadRequest::new(&asset, metadata);
        let mut state = RetryState::Idle.next(RetryEvent::Begin, max_attempts);
        let mut last: Option<UploadAttempt> = None;

        while let RetryState::Attempting(number) = state {
            let delay = self.policy.backoff.delay_before(number);
            if !delay.is_zero() {
                debug!(asset = %asset.display_name(), ?delay, "waiting before retry");
                std::thread::sleep(delay);
            }

            let attempt = UploadAttempt {
                number,
                result: self.client.upload(&request),
            };
            let status = attempt.status(self.policy.fail_fast);
            if let Err(e) = &attempt.result {
                warn!(
                    asset = %asset.display_name(),
                    attempt = number,
                    max_attempts,
                    "upload attempt failed: {e}"
                );
            }

            state = state.next(RetryEvent::Finished(status), max_attempts);
            last = Some(attempt);
        }

        let (attempts, result) = match last {
            Some(attempt) => (attempt.number, attempt.result),
            // Attempting(1) always follows Begin, so at least one attempt ran.
            None => (0, Err(UploadError::InvalidResponse("no attempt made".into()))),
        };

        match (state, result) {
            (RetryState::Succeeded(_), Ok(receipt)) => UploadOutcome {
                asset,
                status: OutcomeStatus::Uploaded,
                attempts,
                last_error: None,
                receipt: Some(receipt),
            },
            (_, result) => UploadOutcome {
                asset,
                status: OutcomeStatus::Failed,
                attempts,
                last_error: result.err().map(|e| e.to_string()),
                receipt: None,
            },
        }
    }
}
