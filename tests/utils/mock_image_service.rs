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
use std::sync::Arc;

use async_trait::async_trait;
use crilink::runtime::image_service_server::{ImageService, ImageServiceServer};
use crilink::runtime::{
    ImageFsInfoRequest, ImageFsInfoResponse, ImageStatusRequest, ImageStatusResponse,
    ListImagesRequest, ListImagesResponse, PullImageRequest, PullImageResponse,
    RemoveImageRequest, RemoveImageResponse,
};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::net::UnixListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::Server;
use tonic::{Code, Request, Response, Status};

/// What a method answers with. Kept as a code and message so it can be
/// replayed for every call.
pub(crate) type Reply<T> = Result<T, (Code, String)>;

/// One request as the backend saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordedCall {
    pub method: &'static str,
    /// Raw `grpc-timeout` header, if the client attached a deadline.
    pub grpc_timeout: Option<String>,
    pub traceparent: Option<String>,
}

#[derive(Debug, Clone)]
struct Scripted<T> {
    reply: Reply<T>,
    delay: Option<Duration>,
}

impl<T: Default> Default for Scripted<T> {
    fn default() -> Self {
        Self {
            reply: Ok(T::default()),
            delay: None,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    list_images: Scripted<ListImagesResponse>,
    image_status: Scripted<ImageStatusResponse>,
    pull_image: Scripted<PullImageResponse>,
    remove_image: Scripted<RemoveImageResponse>,
    image_fs_info: Scripted<ImageFsInfoResponse>,

    calls: Vec<RecordedCall>,
    list_images_requests: Vec<ListImagesRequest>,
    image_status_requests: Vec<ImageStatusRequest>,
    pull_image_requests: Vec<PullImageRequest>,
    remove_image_requests: Vec<RemoveImageRequest>,
}

/// Scripted `runtime.v1.ImageService` backend. Every method answers with a
/// default response until told otherwise.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockImageService {
    state: Arc<Mutex<MockState>>,
}

impl MockImageService {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_list_images(&self, reply: Reply<ListImagesResponse>) {
        self.state.lock().list_images.reply = reply;
    }

    pub(crate) fn set_image_status(&self, reply: Reply<ImageStatusResponse>) {
        self.state.lock().image_status.reply = reply;
    }

    pub(crate) fn set_pull_image(&self, reply: Reply<PullImageResponse>) {
        self.state.lock().pull_image.reply = reply;
    }

    pub(crate) fn set_remove_image(&self, reply: Reply<RemoveImageResponse>) {
        self.state.lock().remove_image.reply = reply;
    }

    pub(crate) fn set_image_fs_info(&self, reply: Reply<ImageFsInfoResponse>) {
        self.state.lock().image_fs_info.reply = reply;
    }

    pub(crate) fn delay_list_images(&self, delay: Duration) {
        self.state.lock().list_images.delay = Some(delay);
    }

    pub(crate) fn delay_image_status(&self, delay: Duration) {
        self.state.lock().image_status.delay = Some(delay);
    }

    pub(crate) fn delay_pull_image(&self, delay: Duration) {
        self.state.lock().pull_image.delay = Some(delay);
    }

    pub(crate) fn delay_image_fs_info(&self, delay: Duration) {
        self.state.lock().image_fs_info.delay = Some(delay);
    }

    pub(crate) fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    /// The last recorded call to `method`.
    pub(crate) fn last_call(&self, method: &str) -> Option<RecordedCall> {
        self.state
            .lock()
            .calls
            .iter()
            .rev()
            .find(|call| call.method == method)
            .cloned()
    }

    pub(crate) fn list_images_requests(&self) -> Vec<ListImagesRequest> {
        self.state.lock().list_images_requests.clone()
    }

    pub(crate) fn image_status_requests(&self) -> Vec<ImageStatusRequest> {
        self.state.lock().image_status_requests.clone()
    }

    pub(crate) fn pull_image_requests(&self) -> Vec<PullImageRequest> {
        self.state.lock().pull_image_requests.clone()
    }

    pub(crate) fn remove_image_requests(&self) -> Vec<RemoveImageRequest> {
        self.state.lock().remove_image_requests.clone()
    }

    fn record<T>(&self, method: &'static str, request: &Request<T>) {
        let header = |name: &str| {
            request
                .metadata()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(ToString::to_string)
        };
        let call = RecordedCall {
            method,
            grpc_timeout: header("grpc-timeout"),
            traceparent: header("traceparent"),
        };
        self.state.lock().calls.push(call);
    }
}

async fn answer<T>(scripted: Scripted<T>) -> Result<Response<T>, Status> {
    if let Some(delay) = scripted.delay {
        tokio::time::sleep(delay).await;
    }
    scripted
        .reply
        .map(Response::new)
        .map_err(|(code, message)| Status::new(code, message))
}

#[async_trait]
impl ImageService for MockImageService {
    async fn list_images(
        &self,
        request: Request<ListImagesRequest>,
    ) -> Result<Response<ListImagesResponse>, Status> {
        self.record("ListImages", &request);
        let scripted = {
            let mut state = self.state.lock();
            state.list_images_requests.push(request.into_inner());
            state.list_images.clone()
        };
        answer(scripted).await
    }

    async fn image_status(
        &self,
        request: Request<ImageStatusRequest>,
    ) -> Result<Response<ImageStatusResponse>, Status> {
        self.record("ImageStatus", &request);
        let scripted = {
            let mut state = self.state.lock();
            state.image_status_requests.push(request.into_inner());
            state.image_status.clone()
        };
        answer(scripted).await
    }

    async fn pull_image(
        &self,
        request: Request<PullImageRequest>,
    ) -> Result<Response<PullImageResponse>, Status> {
        self.record("PullImage", &request);
        let scripted = {
            let mut state = self.state.lock();
            state.pull_image_requests.push(request.into_inner());
            state.pull_image.clone()
        };
        answer(scripted).await
    }

    async fn remove_image(
        &self,
        request: Request<RemoveImageRequest>,
    ) -> Result<Response<RemoveImageResponse>, Status> {
        self.record("RemoveImage", &request);
        let scripted = {
            let mut state = self.state.lock();
            state.remove_image_requests.push(request.into_inner());
            state.remove_image.clone()
        };
        answer(scripted).await
    }

    async fn image_fs_info(
        &self,
        request: Request<ImageFsInfoRequest>,
    ) -> Result<Response<ImageFsInfoResponse>, Status> {
        self.record("ImageFsInfo", &request);
        let scripted = self.state.lock().image_fs_info.clone();
        answer(scripted).await
    }
}

/// A [`MockImageService`] served on a unix socket in a temporary directory.
/// The server stops when this is dropped.
#[derive(Debug)]
pub(crate) struct MockBackend {
    pub service: MockImageService,
    pub endpoint: String,
    server: JoinHandle<Result<(), tonic::transport::Error>>,
    _dir: TempDir,
}

impl MockBackend {
    pub(crate) fn start(service: MockImageService) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("image.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        let server = tokio::spawn(
            Server::builder()
                .add_service(ImageServiceServer::new(service.clone()))
                .serve_with_incoming(UnixListenerStream::new(listener)),
        );
        Self {
            service,
            endpoint: format!("unix://{}", socket.display()),
            server,
            _dir: dir,
        }
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}
