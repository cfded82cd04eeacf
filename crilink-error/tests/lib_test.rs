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

use crilink_error::{
    Code, Error, ErrorKind, ResultExt, make_connect_err, make_contract_err, make_err,
};
use pretty_assertions::assert_eq;
use serde::de::Error as DeError;

#[test]
fn test_serde_deserialization_error_custom() {
    let error = <Error as DeError>::custom("missing field `endpoint`");
    assert_eq!(error.code, Code::InvalidArgument);
    assert_eq!(error.kind, ErrorKind::Other);
    assert_eq!(error.messages, vec!["missing field `endpoint`".to_string()]);
}

#[test]
fn test_json5_error_is_invalid_argument() {
    let error: Error = serde_json5::from_str::<u32>("{ not json")
        .unwrap_err()
        .into();
    assert_eq!(error.code, Code::InvalidArgument);
    assert_eq!(error.messages.len(), 1);
}

#[test]
fn test_status_keeps_backend_code_and_message() {
    let error: Error = tonic::Status::not_found("image \"busybox\" not present").into();
    assert_eq!(error.code, Code::NotFound);
    assert_eq!(error.kind, ErrorKind::Backend);
    assert!(error.is_backend());
    assert_eq!(
        error.messages,
        vec!["image \"busybox\" not present".to_string()]
    );
}

#[test]
fn test_unimplemented_status_maps_to_unimplemented_code() {
    let error: Error = tonic::Status::unimplemented("unknown service").into();
    assert_eq!(error.code, Code::Unimplemented);
}

#[test]
fn test_error_round_trips_through_status() {
    let error = make_err!(Code::PermissionDenied, "registry said no");
    let status: tonic::Status = error.append("while pulling").into();
    assert_eq!(status.code(), tonic::Code::PermissionDenied);
    assert_eq!(status.message(), "registry said no : while pulling");
}

#[test]
fn test_contract_err_is_distinguished() {
    let error = make_contract_err!("imageRef of image {:?} is not set", "busybox");
    assert!(error.is_contract_violation());
    assert!(!error.is_backend());
    assert_eq!(error.code, Code::Internal);
    assert_eq!(
        error.message_string(),
        "imageRef of image \"busybox\" is not set"
    );
}

#[test]
fn test_connect_err_is_distinguished() {
    let error = make_connect_err!(Code::Unavailable, "dial failed");
    assert!(error.is_connectivity());
    assert_eq!(error.kind, ErrorKind::Connectivity);
}

#[test]
fn test_err_tip_keeps_kind_and_code() {
    let result: Result<(), Error> = Err(make_contract_err!("Id or size of image is not set"));
    let error = result.err_tip(|| "In ImageStatus").unwrap_err();
    assert!(error.is_contract_violation());
    assert_eq!(error.code, Code::Internal);
    assert_eq!(
        error.messages,
        vec![
            "Id or size of image is not set".to_string(),
            "In ImageStatus".to_string()
        ]
    );
}

#[test]
fn test_err_tip_with_code_none() {
    let option: Option<i32> = None;
    let result: Result<i32, Error> =
        option.err_tip_with_code(|_error| (Code::InvalidArgument, "Missing value in option"));
    let error = result.unwrap_err();
    assert_eq!(error.code, Code::InvalidArgument);
    assert_eq!(error.messages, vec!["Missing value in option".to_string()]);
}

#[test]
fn test_err_tip_with_code_some() {
    let option = Some(42);
    let result: Result<i32, Error> =
        option.err_tip_with_code(|_error| (Code::Unknown, "Should not appear"));
    assert_eq!(result.unwrap(), 42);
}

#[test]
fn test_io_error_conversion() {
    let error: Error = std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into();
    assert_eq!(error.code, Code::Unavailable);
    assert_eq!(error.kind, ErrorKind::Other);
}

#[test]
fn test_merge_separates_messages() {
    let error = make_err!(Code::Internal, "first").merge(make_err!(Code::Unknown, "second"));
    assert_eq!(error.code, Code::Internal);
    assert_eq!(
        error.messages,
        vec!["first".to_string(), "---".to_string(), "second".to_string()]
    );
}

#[test]
fn test_code_from_i32() {
    assert_eq!(Code::from(12), Code::Unimplemented);
    assert_eq!(Code::from(4), Code::DeadlineExceeded);
    assert_eq!(Code::from(99), Code::Unknown);
}

#[test]
fn test_display_omits_default_kind() {
    let error = make_err!(Code::NotFound, "gone");
    assert_eq!(
        error.to_string(),
        "Error { code: NotFound, messages: [\"gone\"] }"
    );
    let error = error.with_kind(ErrorKind::Backend);
    assert_eq!(
        error.to_string(),
        "Error { code: NotFound, kind: Backend, messages: [\"gone\"] }"
    );
}
