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

use core::time::Duration;

use crilink_error::{Error, ResultExt};
use serde::Deserialize;
use serde_with::serde_as;

use crate::deser::{ShellExpand, ShellExpandBytes, ShellExpandDuration};

/// Default bound on dialing, on the startup probe and on bounded calls.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// Default limit on a single decoded response from the image service.
pub const DEFAULT_MAX_RECV_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Settings for a client of a CRI `runtime.v1.ImageService` backend.
///
/// ```json5
/// {
///   endpoint: "unix:///run/containerd/containerd.sock",
///   connection_timeout: "2m",
///   max_recv_message_size: "16MiB",
///   enable_tracing: false,
/// }
/// ```
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageServiceConfig {
    /// Where the image service listens. Only unix sockets are supported,
    /// e.g. `unix:///run/containerd/containerd.sock`. A bare path is
    /// accepted for compatibility and treated as a unix socket.
    #[serde_as(as = "ShellExpand")]
    pub endpoint: String,

    /// Upper bound on dialing the endpoint and on the startup probe. Also
    /// the default timeout of list, status and remove calls.
    ///
    /// Default: 2m
    #[serde_as(as = "ShellExpandDuration")]
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: Duration,

    /// Largest response message accepted from the backend, in bytes.
    ///
    /// Default: 16MiB
    #[serde_as(as = "ShellExpandBytes")]
    #[serde(default = "default_max_recv_message_size")]
    pub max_recv_message_size: usize,

    /// Attach the call tracing layer to the channel.
    ///
    /// Default: false
    #[serde(default)]
    pub enable_tracing: bool,
}

const fn default_connection_timeout() -> Duration {
    DEFAULT_CONNECTION_TIMEOUT
}

const fn default_max_recv_message_size() -> usize {
    DEFAULT_MAX_RECV_MESSAGE_SIZE
}

impl ImageServiceConfig {
    /// A config for `endpoint` with every other field at its default.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            max_recv_message_size: DEFAULT_MAX_RECV_MESSAGE_SIZE,
            enable_tracing: false,
        }
    }

    /// # Errors
    ///
    /// Will return `Err` if the file can't be read or doesn't parse.
    pub fn try_from_json5_file(config_file: &str) -> Result<Self, Error> {
        let json_contents = std::fs::read_to_string(config_file)
            .err_tip(|| format!("Could not open config file {config_file}"))?;
        serde_json5::from_str(&json_contents)
            .err_tip(|| format!("Could not parse config file {config_file}"))
    }
}
