// Copyright (C) 2022-2024 Webb Technologies Inc.
//
// Tangle is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Tangle is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should receive a copy of the GNU General Public License
// If not, see <http://www.gnu.org/licenses/>.

//! Retry logic for async calls

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures::TryFutureExt;

use crate::{Error, Result};

/// The first delay of [`ExponentialWithMaxRetryCount`].
pub const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_secs(5);
/// The delay cap of [`ExponentialWithMaxRetryCount`].
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(60);
/// How many attempts a loop gets before its error is surfaced.
pub const DEFAULT_MAX_ATTEMPTS: usize = 10;

/// Constant with Max Retry Count is a backoff policy which always returns
/// a constant duration, until it exceeds the maximum retry count.
#[derive(Debug)]
pub struct ConstantWithMaxRetryCount {
    interval: Duration,
    max_retry_count: usize,
    count: usize,
}

impl ConstantWithMaxRetryCount {
    /// Creates a new Constant backoff with `interval` and `max_retry_count`.
    /// `interval` is the duration to wait between retries, and `max_retry_count` is the maximum
    /// number of retries, after which we return `None` to indicate that we should stop retrying.
    pub fn new(interval: Duration, max_retry_count: usize) -> Self {
        Self {
            interval,
            max_retry_count,
            count: 0,
        }
    }
}

impl Backoff for ConstantWithMaxRetryCount {
    fn next_backoff(&mut self) -> Option<Duration> {
        (self.count < self.max_retry_count).then(|| {
            self.count += 1;
            self.interval
        })
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}

/// Exponential backoff with jitter that gives up once `max_attempts`
/// attempts (the first one included) have been made.
#[derive(Debug)]
pub struct ExponentialWithMaxRetryCount {
    inner: ExponentialBackoff,
    max_attempts: usize,
    attempts: usize,
}

impl ExponentialWithMaxRetryCount {
    /// Creates a new policy that starts at `initial_interval`, doubles on
    /// every retry up to `max_interval` and allows `max_attempts` attempts.
    pub fn new(
        initial_interval: Duration,
        max_interval: Duration,
        max_attempts: usize,
    ) -> Self {
        let inner = ExponentialBackoff {
            current_interval: initial_interval,
            initial_interval,
            randomization_factor: 0.1,
            multiplier: 2.0,
            max_interval,
            max_elapsed_time: None,
            ..Default::default()
        };
        Self {
            inner,
            max_attempts,
            attempts: 1,
        }
    }

    /// The 5s to 60s policy used by the loops, with a custom attempt cap.
    pub fn with_max_attempts(max_attempts: usize) -> Self {
        Self::new(
            DEFAULT_INITIAL_INTERVAL,
            DEFAULT_MAX_INTERVAL,
            max_attempts,
        )
    }
}

impl Default for ExponentialWithMaxRetryCount {
    fn default() -> Self {
        Self::with_max_attempts(DEFAULT_MAX_ATTEMPTS)
    }
}

impl Backoff for ExponentialWithMaxRetryCount {
    fn next_backoff(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        self.inner.next_backoff()
    }

    fn reset(&mut self) {
        self.attempts = 1;
        self.inner.reset();
    }
}

/// Runs `step` until it succeeds, the `backoff` policy gives up or `cancel`
/// resolves.
///
/// Every failed attempt is logged at `warn` with the `tag` of the caller and
/// the attempt number. When the policy gives up, the last error is returned.
/// Cancellation wins over everything else and yields [`Error::Cancelled`].
pub async fn retry<T, F, Fut, B, C>(
    tag: &str,
    backoff: B,
    cancel: C,
    mut step: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    B: Backoff,
    C: Future<Output = ()>,
{
    let mut attempt = 0usize;
    let notify = |err: Error, delay: Duration| {
        attempt += 1;
        tracing::warn!(
            %tag,
            attempt,
            retry_in = ?delay,
            error = %err,
            "attempt failed, backing off",
        );
        tracing::event!(
            target: crate::probe::TARGET,
            tracing::Level::DEBUG,
            kind = %crate::probe::Kind::Retry,
            %tag,
            attempt,
            delay_ms = delay.as_millis() as u64,
        );
    };
    let task = backoff::future::retry_notify(
        backoff,
        || {
            step().map_err(|e| match e {
                Error::Cancelled => backoff::Error::permanent(e),
                e => backoff::Error::transient(e),
            })
        },
        notify,
    );
    tokio::select! {
        biased;
        _ = cancel => Err(Error::Cancelled),
        result = task => result.map_err(|e| {
            if !e.is_cancelled() {
                tracing::error!(
                    %tag,
                    error = %e,
                    "giving up after the last attempt"
                );
            }
            e
        }),
    }
}
