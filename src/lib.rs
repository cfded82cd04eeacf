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

//! Client for a CRI `runtime.v1.ImageService` backend.

#![cfg(unix)]

pub mod image_service;
pub mod remote_image;

pub use crilink_proto::runtime::v1 as runtime;
pub use image_service::ImageManagerService;
pub use remote_image::RemoteImageService;
