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

use std::path::PathBuf;

use crilink_error::{Code, Error};
use crilink_macro::crilink_test;
use crilink_util::endpoint::{
    ParsedEndpoint, UnixConnector, address_and_connector, parse_endpoint,
    parse_endpoint_with_fallback,
};
use pretty_assertions::assert_eq;
use tokio::net::UnixListener;
use tonic::transport::Uri;
use tower::ServiceExt;

#[crilink_test]
async fn unix_endpoint_uses_path() -> Result<(), Error> {
    let (path, connector) = address_and_connector("unix:///run/containerd/containerd.sock")?;
    assert_eq!(path, PathBuf::from("/run/containerd/containerd.sock"));
    assert_eq!(connector.path(), path.as_path());
    Ok(())
}

#[crilink_test]
async fn unix_endpoint_ignores_authority() -> Result<(), Error> {
    let parsed = parse_endpoint("unix://localhost/var/run/crio/crio.sock")?;
    assert_eq!(
        parsed,
        ParsedEndpoint {
            protocol: "unix".to_string(),
            address: "/var/run/crio/crio.sock".to_string(),
        }
    );
    Ok(())
}

#[crilink_test]
async fn bare_path_falls_back_to_unix() -> Result<(), Error> {
    let (path, _connector) = address_and_connector("/run/containerd/containerd.sock")?;
    assert_eq!(path, PathBuf::from("/run/containerd/containerd.sock"));
    assert!(logs_contain(
        "Using this endpoint is deprecated, please consider using full URL format"
    ));
    Ok(())
}

#[crilink_test]
async fn full_url_is_not_deprecated() -> Result<(), Error> {
    parse_endpoint_with_fallback("unix:///run/containerd/containerd.sock")?;
    assert!(!logs_contain("deprecated"));
    Ok(())
}

#[crilink_test]
async fn parse_without_scheme_is_error() -> Result<(), Error> {
    let err = parse_endpoint("/run/containerd/containerd.sock").unwrap_err();
    assert!(err.is_connectivity());
    assert!(err.message_string().contains("please consider using full url format"));
    Ok(())
}

#[crilink_test]
async fn tcp_endpoint_is_rejected() -> Result<(), Error> {
    let parsed = parse_endpoint("tcp://127.0.0.1:3735")?;
    assert_eq!(parsed.protocol, "tcp");
    assert_eq!(parsed.address, "127.0.0.1:3735");

    let err = address_and_connector("tcp://127.0.0.1:3735").unwrap_err();
    assert_eq!(err.code, Code::InvalidArgument);
    assert!(err.is_connectivity());
    assert_eq!(err.message_string(), "only support unix socket endpoint");
    Ok(())
}

#[crilink_test]
async fn unknown_protocol_is_rejected() -> Result<(), Error> {
    let err = address_and_connector("npipe:////./pipe/containerd-containerd").unwrap_err();
    assert!(err.is_connectivity());
    assert_eq!(err.message_string(), "protocol \"npipe\" not supported");
    Ok(())
}

#[crilink_test]
async fn empty_socket_path_is_rejected() -> Result<(), Error> {
    let err = address_and_connector("unix://").unwrap_err();
    assert!(err.is_connectivity());
    assert_eq!(
        err.message_string(),
        "endpoint \"unix://\" has an empty socket path"
    );
    Ok(())
}

#[crilink_test]
async fn connector_dials_configured_socket() -> Result<(), Error> {
    let dir = tempfile::tempdir()?;
    let socket = dir.path().join("cri.sock");
    let listener = UnixListener::bind(&socket)?;

    // The URI is ignored; only the configured path is dialed.
    let connector = UnixConnector::new(&socket);
    let (dialed, accepted) = tokio::join!(
        connector.oneshot(Uri::from_static("http://localhost")),
        listener.accept()
    );
    dialed?;
    accepted?;
    Ok(())
}

#[crilink_test]
async fn connector_reports_missing_socket() -> Result<(), Error> {
    let dir = tempfile::tempdir()?;
    let connector = UnixConnector::new(dir.path().join("missing.sock"));
    let err: Error = connector
        .oneshot(Uri::from_static("http://localhost"))
        .await
        .unwrap_err()
        .into();
    assert_eq!(err.code, Code::NotFound);
    Ok(())
}
