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

//! Resolution of CRI endpoints into a unix socket address and a dialer.

use core::task::{Context, Poll};
use std::path::PathBuf;
use std::sync::Arc;

use crilink_error::{Code, Error, make_connect_err};
use futures::future::BoxFuture;
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tonic::transport::Uri;
use tracing::warn;

pub const UNIX_PROTOCOL: &str = "unix";
pub const TCP_PROTOCOL: &str = "tcp";

/// The parts of an endpoint URL that matter for dialing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEndpoint {
    pub protocol: String,
    /// Socket path for `unix`, `host:port` for `tcp`.
    pub address: String,
}

/// Splits `endpoint` into its protocol and address.
///
/// `unix://authority/path` keeps only `/path`, `tcp://host:port/...` keeps
/// only `host:port`. An endpoint without a scheme is an error.
pub fn parse_endpoint(endpoint: &str) -> Result<ParsedEndpoint, Error> {
    let Some((scheme, rest)) = endpoint.split_once("://") else {
        return Err(make_connect_err!(
            Code::InvalidArgument,
            "using {endpoint:?} as endpoint is deprecated, please consider using full url format"
        ));
    };
    let (authority, path) = rest
        .find('/')
        .map_or((rest, ""), |slash| rest.split_at(slash));
    match scheme {
        UNIX_PROTOCOL => Ok(ParsedEndpoint {
            protocol: UNIX_PROTOCOL.to_string(),
            address: path.to_string(),
        }),
        TCP_PROTOCOL => Ok(ParsedEndpoint {
            protocol: TCP_PROTOCOL.to_string(),
            address: authority.to_string(),
        }),
        _ => Err(make_connect_err!(
            Code::InvalidArgument,
            "protocol {scheme:?} not supported"
        )),
    }
}

/// Same as [`parse_endpoint`], but an endpoint without a scheme is retried
/// as `unix://<endpoint>`.
pub fn parse_endpoint_with_fallback(endpoint: &str) -> Result<ParsedEndpoint, Error> {
    if endpoint.contains("://") {
        return parse_endpoint(endpoint);
    }
    let fallback = format!("{UNIX_PROTOCOL}://{endpoint}");
    let parsed = parse_endpoint(&fallback)?;
    warn!(
        endpoint,
        url = %fallback,
        "Using this endpoint is deprecated, please consider using full URL format"
    );
    Ok(parsed)
}

/// Resolves `endpoint` into the socket path to dial and a connector for
/// `tonic::transport::Endpoint::connect_with_connector`.
///
/// Only unix sockets are supported.
pub fn address_and_connector(endpoint: &str) -> Result<(PathBuf, UnixConnector), Error> {
    let parsed = parse_endpoint_with_fallback(endpoint)?;
    if parsed.protocol != UNIX_PROTOCOL {
        return Err(make_connect_err!(
            Code::InvalidArgument,
            "only support unix socket endpoint"
        ));
    }
    if parsed.address.is_empty() {
        return Err(make_connect_err!(
            Code::InvalidArgument,
            "endpoint {endpoint:?} has an empty socket path"
        ));
    }
    let path = PathBuf::from(parsed.address);
    Ok((path.clone(), UnixConnector::new(path)))
}

/// Dials a fixed unix socket regardless of the URI tonic asks for.
#[derive(Debug, Clone)]
pub struct UnixConnector {
    path: Arc<PathBuf>,
}

impl UnixConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl tower::Service<Uri> for UnixConnector {
    type Response = TokioIo<UnixStream>;
    type Error = std::io::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _uri: Uri) -> Self::Future {
        let path = self.path.clone();
        Box::pin(async move { UnixStream::connect(path.as_path()).await.map(TokioIo::new) })
    }
}
