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

//! Client-side call tracing as a tower layer over the gRPC channel.

use core::fmt;
use core::task::{Context, Poll};
use std::sync::Arc;

use futures::future::BoxFuture;
use opentelemetry::global::{self, BoxedTracer};
use opentelemetry::propagation::{TextMapCompositePropagator, TextMapPropagator};
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer};
use opentelemetry::{Context as OtelContext, KeyValue};
use opentelemetry_http::HeaderInjector;
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};

/// Instrumentation scope used when no tracer is supplied.
pub const TRACER_NAME: &str = "crilink";

const GRPC_STATUS_HEADER: &str = "grpc-status";

/// W3C trace context plus baggage.
pub fn default_propagator() -> TextMapCompositePropagator {
    TextMapCompositePropagator::new(vec![
        Box::new(BaggagePropagator::new()),
        Box::new(TraceContextPropagator::new()),
    ])
}

/// Whether calls on a channel are traced. Chosen once when the channel is
/// built.
#[derive(Clone, Default)]
pub enum CallInstrumentation {
    #[default]
    PassThrough,
    Traced {
        tracer: Arc<BoxedTracer>,
        propagator: Arc<dyn TextMapPropagator + Send + Sync>,
    },
}

impl CallInstrumentation {
    /// Traced mode with the default propagator. Without a tracer, spans go
    /// to the global tracer provider, which is a no-op unless one has been
    /// installed.
    pub fn traced(tracer: Option<BoxedTracer>) -> Self {
        Self::Traced {
            tracer: Arc::new(tracer.unwrap_or_else(|| global::tracer(TRACER_NAME))),
            propagator: Arc::new(default_propagator()),
        }
    }

    /// Replaces the propagator. No effect in pass-through mode.
    #[must_use]
    pub fn with_propagator(
        self,
        propagator: impl TextMapPropagator + Send + Sync + 'static,
    ) -> Self {
        match self {
            Self::PassThrough => Self::PassThrough,
            Self::Traced { tracer, .. } => Self::Traced {
                tracer,
                propagator: Arc::new(propagator),
            },
        }
    }

    pub const fn is_traced(&self) -> bool {
        matches!(self, Self::Traced { .. })
    }

    pub fn layer(&self) -> CallTracingLayer {
        CallTracingLayer::new(self.clone())
    }
}

impl fmt::Debug for CallInstrumentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PassThrough => f.write_str("PassThrough"),
            Self::Traced { propagator, .. } => f
                .debug_struct("Traced")
                .field("propagator", propagator)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CallTracing<S> {
    inner: S,
    instrumentation: CallInstrumentation,
}

impl<S> CallTracing<S> {
    pub const fn new(inner: S, instrumentation: CallInstrumentation) -> Self {
        Self {
            inner,
            instrumentation,
        }
    }
}

impl<S, ReqBody, ResBody> tower::Service<http::Request<ReqBody>> for CallTracing<S>
where
    S: tower::Service<http::Request<ReqBody>, Response = http::Response<ResBody>>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
    S::Error: fmt::Display,
    ReqBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<ReqBody>) -> Self::Future {
        // The service that was driven to readiness is `self.inner`, not a clone.
        let clone = self.inner.clone();
        let mut inner = core::mem::replace(&mut self.inner, clone);

        let CallInstrumentation::Traced { tracer, propagator } = &self.instrumentation else {
            return Box::pin(inner.call(req));
        };

        let method = req.uri().path().trim_start_matches('/').to_string();
        let parent_cx = OtelContext::current();
        let span = tracer
            .span_builder(method.clone())
            .with_kind(SpanKind::Client)
            .with_attributes([
                KeyValue::new("rpc.system", "grpc"),
                KeyValue::new("rpc.method", method),
            ])
            .start_with_context(&**tracer, &parent_cx);
        let cx = parent_cx.with_span(span);

        propagator.inject_context(&cx, &mut HeaderInjector(req.headers_mut()));

        let fut = inner.call(req);
        Box::pin(async move {
            let result = fut.await;
            let span = cx.span();
            match &result {
                Ok(response) => {
                    // Trailers-only responses carry the status in the headers.
                    let code = response
                        .headers()
                        .get(GRPC_STATUS_HEADER)
                        .and_then(|value| value.to_str().ok())
                        .and_then(|value| value.parse::<i64>().ok());
                    if let Some(code) = code {
                        span.set_attribute(KeyValue::new("rpc.grpc.status_code", code));
                        if code != 0 {
                            span.set_status(Status::error(format!("grpc-status {code}")));
                        }
                    }
                }
                Err(err) => span.set_status(Status::error(err.to_string())),
            }
            span.end();
            result
        })
    }
}

/// Produces [`CallTracing`] services for a fixed [`CallInstrumentation`].
#[derive(Debug, Clone)]
pub struct CallTracingLayer {
    instrumentation: CallInstrumentation,
}

impl CallTracingLayer {
    pub const fn new(instrumentation: CallInstrumentation) -> Self {
        Self { instrumentation }
    }
}

impl<S> tower::Layer<S> for CallTracingLayer {
    type Service = CallTracing<S>;

    fn layer(&self, service: S) -> Self::Service {
        CallTracing::new(service, self.instrumentation.clone())
    }
}
