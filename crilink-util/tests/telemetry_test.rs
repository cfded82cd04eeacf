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

use std::collections::HashMap;

use crilink_error::Code;
use crilink_util::init_tracing;
use opentelemetry::global;
use opentelemetry::trace::TraceContextExt;
use pretty_assertions::assert_eq;

// Owns the process-wide subscriber, so it lives alone in this binary.
#[test]
fn init_tracing_installs_once() {
    // SAFETY: this binary has a single test and no other threads.
    unsafe { std::env::set_var("CRILINK_LOG", "json") };

    init_tracing().unwrap();

    let err = init_tracing().unwrap_err();
    assert_eq!(err.code, Code::Internal);
    assert_eq!(err.messages, vec!["Logging already initialized".to_string()]);

    // The global propagator understands W3C trace context.
    let mut headers = HashMap::new();
    headers.insert(
        "traceparent".to_string(),
        "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
    );
    let cx = global::get_text_map_propagator(|propagator| propagator.extract(&headers));
    assert!(cx.span().span_context().is_valid());
    assert!(cx.span().span_context().is_remote());
}
