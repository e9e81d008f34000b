//! Bounded retry with error classification.
//!
//! Discovery and mirroring both call the renderer through
//! [`run_with_retry`]; they differ only in the policy they pass and in what
//! they do with the final error.

use std::fmt;
use std::future::Future;
use thiserror::Error;

use crate::error::ScanError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Retry,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl RetryPolicy {
    /// At least one attempt is always made.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn single() -> Self {
        Self::new(1)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

#[derive(Error, Debug)]
pub enum RetryError<E: fmt::Display + fmt::Debug> {
    #[error("gave up after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("aborted on attempt {attempt}: {error}")]
    Aborted { attempt: u32, error: E },
}

impl<E: fmt::Display + fmt::Debug> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::Aborted { attempt, .. } => *attempt,
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Aborted { error, .. } => error,
        }
    }
}

/// Default classification for scan errors.
pub fn classify_scan_error(error: &ScanError) -> Verdict {
    if error.is_transient() {
        Verdict::Retry
    } else {
        Verdict::Abort
    }
}

/// Run `op` until it succeeds, the classifier says abort, or the policy's
/// attempt budget is spent. `op` receives the 1-based attempt number and
/// `on_failure` sees every failed attempt before the decision is made.
pub async fn run_with_retry<T, E, Op, Fut, C, F>(
    policy: &RetryPolicy,
    mut op: Op,
    classify: C,
    mut on_failure: F,
) -> Result<T, RetryError<E>>
where
    E: fmt::Display + fmt::Debug,
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> Verdict,
    F: FnMut(u32, &E),
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => {
                on_failure(attempt, &error);
                if classify(&error) == Verdict::Abort {
                    return Err(RetryError::Aborted { attempt, error });
                }
                if attempt >= policy.max_attempts {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: error,
                    });
                }
            }
        }
    }
}
