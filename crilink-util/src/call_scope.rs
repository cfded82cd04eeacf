// Copyright 2025 The NativeLink Authors. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use core::future::Future;
use core::time::Duration;

use crilink_error::{Code, Error, ErrorKind, make_err};
use tokio::time::Instant;

/// Largest deadline the `grpc-timeout` header can carry: eight digits of
/// hours.
pub const MAX_GRPC_TIMEOUT: Duration = Duration::from_secs(99_999_999 * 60 * 60);

/// Lifetime policy of a single RPC.
///
/// Everything a scope holds (the timer, the in-flight request) is owned by
/// the future returned from [`CallScope::run`], so it is released on every
/// exit path, including when the caller drops the future.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallScope {
    /// The call carries a `grpc-timeout` deadline and fails with
    /// `DeadlineExceeded` once it elapses, even if the backend gave up first
    /// and answered with its own error.
    Bounded(Duration),
    /// No deadline. The call ends only when the backend answers or the
    /// future is dropped.
    Unbounded,
}

impl CallScope {
    pub const fn timeout(self) -> Option<Duration> {
        match self {
            Self::Bounded(timeout) => Some(timeout),
            Self::Unbounded => None,
        }
    }

    /// Wraps `message` in a request carrying this scope's deadline. The
    /// header value is capped at [`MAX_GRPC_TIMEOUT`].
    pub fn request<T>(self, message: T) -> tonic::Request<T> {
        let mut request = tonic::Request::new(message);
        if let Self::Bounded(timeout) = self {
            request.set_timeout(timeout.min(MAX_GRPC_TIMEOUT));
        }
        request
    }

    /// Drives `fut` to completion within this scope.
    pub async fn run<T, F>(self, fut: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        let Self::Bounded(timeout) = self else {
            return fut.await;
        };
        // Too far out to ever elapse.
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return fut.await;
        };
        match tokio::time::timeout_at(deadline, fut).await {
            Ok(Err(err)) if Instant::now() >= deadline => Err(make_err!(
                Code::DeadlineExceeded,
                "Deadline of {timeout:?} elapsed"
            )
            .with_kind(ErrorKind::Backend)
            .merge(err)),
            result => result?,
        }
    }
}
