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

use std::env;
use std::sync::OnceLock;

use crilink_error::{Code, Error, ResultExt, make_err};
use opentelemetry::global;
use tracing::metadata::LevelFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, registry};

use crate::instrumentation::default_propagator;

/// Environment variable selecting the stdout format: `pretty` (default),
/// `compact` or `json`.
pub const LOG_FORMAT_ENV: &str = "CRILINK_LOG";

// Transport crates log every frame at debug; keep them out of the output.
const SILENCED_TARGETS: [&str; 4] = ["hyper=off", "tonic=off", "h2=off", "tower=off"];

fn env_filter() -> Result<EnvFilter, Error> {
    let mut filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    for directive in SILENCED_TARGETS {
        let directive: Directive = directive
            .parse()
            .map_err(|e| make_err!(Code::Internal, "{e}"))
            .err_tip(|| format!("Static directive '{directive}' failed to parse"))?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}

fn tracing_stdout_layer() -> Result<Box<dyn Layer<Registry> + Send + Sync>, Error> {
    let log_format = env::var(LOG_FORMAT_ENV).unwrap_or_else(|_| "pretty".to_string());
    let filter = env_filter()?;

    Ok(match log_format.as_str() {
        "compact" => fmt::layer()
            .compact()
            .with_timer(fmt::time::time())
            .with_filter(filter)
            .boxed(),
        "json" => fmt::layer()
            .json()
            .with_timer(fmt::time::time())
            .with_filter(filter)
            .boxed(),
        _ => fmt::layer()
            .pretty()
            .with_timer(fmt::time::time())
            .with_filter(filter)
            .boxed(),
    })
}

/// Installs the global `tracing` subscriber and the OpenTelemetry text map
/// propagator.
///
/// # Errors
///
/// Returns `Err` if logging was already initialized, by this function or by
/// anything else that set a global subscriber.
pub fn init_tracing() -> Result<(), Error> {
    static INITIALIZED: OnceLock<()> = OnceLock::new();

    if INITIALIZED.get().is_some() {
        return Err(make_err!(Code::Internal, "Logging already initialized"));
    }

    registry()
        .with(tracing_stdout_layer()?)
        .try_init()
        .map_err(|e| make_err!(Code::Internal, "{e}"))
        .err_tip(|| "While installing the global tracing subscriber")?;

    global::set_text_map_propagator(default_propagator());

    INITIALIZED.set(()).unwrap_or(());

    Ok(())
}
