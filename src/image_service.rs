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

use async_trait::async_trait;
use crilink_error::Error;
use crilink_proto::runtime::v1::{
    AuthConfig, FilesystemUsage, Image, ImageFilter, ImageSpec, ImageStatusResponse,
    PodSandboxConfig,
};

/// Image operations the node agent needs from a container runtime.
///
/// Every method issues a single attempt; retries belong to the caller.
#[async_trait]
pub trait ImageManagerService: Send + Sync {
    /// Lists the images known to the runtime, optionally narrowed by `filter`.
    async fn list_images(&self, filter: Option<ImageFilter>) -> Result<Vec<Image>, Error>;

    /// Returns the status of `image`. A response without an image means the
    /// runtime does not have it.
    async fn image_status(
        &self,
        image: ImageSpec,
        verbose: bool,
    ) -> Result<ImageStatusResponse, Error>;

    /// Pulls `image` and returns the reference of the now-local image.
    async fn pull_image(
        &self,
        image: ImageSpec,
        auth: Option<AuthConfig>,
        sandbox_config: Option<PodSandboxConfig>,
    ) -> Result<String, Error>;

    /// Removes `image`. Removing an absent image is not an error.
    async fn remove_image(&self, image: ImageSpec) -> Result<(), Error>;

    /// Usage of the filesystems that hold images.
    async fn image_fs_info(&self) -> Result<Vec<FilesystemUsage>, Error>;
}
