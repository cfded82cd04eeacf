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

use core::future::Future;
use core::time::Duration;
use std::path::Path;

use async_trait::async_trait;
use crilink_config::ImageServiceConfig;
use crilink_error::{Code, Error, ErrorKind, ResultExt, make_connect_err, make_contract_err};
use crilink_proto::runtime::v1::image_service_client::ImageServiceClient;
use crilink_proto::runtime::v1::{
    AuthConfig, FilesystemUsage, Image, ImageFilter, ImageFsInfoRequest, ImageSpec,
    ImageStatusRequest, ImageStatusResponse, ListImagesRequest, PodSandboxConfig,
    PullImageRequest, RemoveImageRequest,
};
use crilink_util::call_scope::CallScope;
use crilink_util::endpoint::{UnixConnector, address_and_connector};
use crilink_util::instrumentation::{CallInstrumentation, CallTracing};
use opentelemetry::global::BoxedTracer;
use tonic::transport::{Channel, Endpoint};
use tower::Layer;
use tracing::{debug, error, info, warn};

use crate::image_service::ImageManagerService;

type Client = ImageServiceClient<CallTracing<Channel>>;

/// The connection is a unix socket, so the authority is only used for the
/// `:authority` pseudo header.
const CHANNEL_URI: &str = "http://localhost";

/// [`ImageManagerService`] backed by a CRI image service over gRPC.
///
/// Cloning is cheap and clones share the underlying connection.
#[derive(Debug, Clone)]
pub struct RemoteImageService {
    client: Client,
    timeout: Duration,
}

impl RemoteImageService {
    /// Dials the image service at `config.endpoint` and checks that it
    /// speaks the CRI v1 image API.
    ///
    /// `tracer` is only used when `config.enable_tracing` is set.
    pub async fn connect(
        config: &ImageServiceConfig,
        tracer: Option<BoxedTracer>,
    ) -> Result<Self, Error> {
        let instrumentation = if config.enable_tracing {
            CallInstrumentation::traced(tracer)
        } else {
            CallInstrumentation::PassThrough
        };
        Self::connect_with_instrumentation(config, instrumentation).await
    }

    /// Same as [`RemoteImageService::connect`] with explicit call
    /// instrumentation. `config.enable_tracing` is ignored.
    pub async fn connect_with_instrumentation(
        config: &ImageServiceConfig,
        instrumentation: CallInstrumentation,
    ) -> Result<Self, Error> {
        info!(endpoint = %config.endpoint, "Connecting to image service");
        let (address, connector) = address_and_connector(&config.endpoint)?;

        let channel = dial(&address, connector, config.connection_timeout)
            .await
            .inspect_err(|err| {
                error!(
                    address = %address.display(),
                    ?err,
                    "Connect remote image service failed"
                );
            })
            .err_tip(|| {
                format!(
                    "Connect remote image service failed for address {}",
                    address.display()
                )
            })?;

        let client = ImageServiceClient::new(instrumentation.layer().layer(channel))
            .max_decoding_message_size(config.max_recv_message_size);

        let service = Self {
            client,
            timeout: config.connection_timeout,
        };
        service
            .validate_service_connection(&config.endpoint)
            .await
            .err_tip(|| "validate service connection")?;
        Ok(service)
    }

    /// A handle on the same connection whose bounded calls use `timeout`.
    #[must_use]
    pub fn with_call_timeout(&self, timeout: Duration) -> Self {
        Self {
            client: self.client.clone(),
            timeout,
        }
    }

    /// Deadline applied to list, status and remove calls.
    pub const fn call_timeout(&self) -> Duration {
        self.timeout
    }

    /// Probes the backend with `ImageFsInfo`. Only an `Unimplemented` answer
    /// rejects the connection; any other failure is tolerated.
    async fn validate_service_connection(&self, endpoint: &str) -> Result<(), Error> {
        debug!("Validating the CRI v1 API image version");
        let probe = self
            .call(
                CallScope::Bounded(self.timeout),
                ImageFsInfoRequest {},
                |mut client, request| async move { client.image_fs_info(request).await },
            )
            .await;

        match probe {
            Ok(_) => {
                info!(endpoint, "Validated CRI v1 image API");
                Ok(())
            }
            Err(err) if err.code == Code::Unimplemented => Err(err
                .with_kind(ErrorKind::Connectivity)
                .append(format!(
                    "CRI v1 image API is not implemented for endpoint {endpoint:?}"
                ))),
            Err(err) => {
                warn!(
                    endpoint,
                    ?err,
                    "Could not validate CRI v1 image API, keeping the connection"
                );
                Ok(())
            }
        }
    }

    /// Issues one unary call inside `scope`. Status errors come back with
    /// their code and message intact.
    async fn call<Req, Resp, F, Fut>(
        &self,
        scope: CallScope,
        message: Req,
        rpc: F,
    ) -> Result<Resp, Error>
    where
        F: FnOnce(Client, tonic::Request<Req>) -> Fut,
        Fut: Future<Output = Result<tonic::Response<Resp>, tonic::Status>>,
    {
        let request = scope.request(message);
        let client = self.client.clone();
        scope
            .run(async move { Ok(rpc(client, request).await?.into_inner()) })
            .await
    }
}

async fn dial(
    address: &Path,
    connector: UnixConnector,
    timeout: Duration,
) -> Result<Channel, Error> {
    let endpoint = Endpoint::from_static(CHANNEL_URI);
    tokio::time::timeout(timeout, endpoint.connect_with_connector(connector))
        .await
        .map_err(|_| {
            make_connect_err!(
                Code::DeadlineExceeded,
                "Dialing {} did not complete within {timeout:?}",
                address.display()
            )
        })?
        .map_err(Error::from)
}

#[async_trait]
impl ImageManagerService for RemoteImageService {
    async fn list_images(&self, filter: Option<ImageFilter>) -> Result<Vec<Image>, Error> {
        let request = ListImagesRequest {
            filter: filter.clone(),
        };
        let response = self
            .call(
                CallScope::Bounded(self.timeout),
                request,
                |mut client, request| async move { client.list_images(request).await },
            )
            .await
            .inspect_err(|err| {
                error!(?filter, ?err, "ListImages with filter from image service failed");
            })?;
        Ok(response.images)
    }

    async fn image_status(
        &self,
        image: ImageSpec,
        verbose: bool,
    ) -> Result<ImageStatusResponse, Error> {
        let image_ref = image.image.clone();
        let request = ImageStatusRequest {
            image: Some(image),
            verbose,
        };
        let response = self
            .call(
                CallScope::Bounded(self.timeout),
                request,
                |mut client, request| async move { client.image_status(request).await },
            )
            .await
            .inspect_err(|err| {
                error!(image = %image_ref, ?err, "Get ImageStatus from image service failed");
            })?;

        let incomplete = response
            .image
            .as_ref()
            .is_some_and(|record| record.id.is_empty() || record.size == 0);
        if incomplete {
            let err = make_contract_err!("Id or size of image {image_ref:?} is not set");
            error!(image = %image_ref, ?err, "ImageStatus failed");
            return Err(err);
        }
        Ok(response)
    }

    async fn pull_image(
        &self,
        image: ImageSpec,
        auth: Option<AuthConfig>,
        sandbox_config: Option<PodSandboxConfig>,
    ) -> Result<String, Error> {
        let image_ref = image.image.clone();
        let request = PullImageRequest {
            image: Some(image),
            auth,
            sandbox_config,
        };
        // Pulls are cancel-only.
        let response = self
            .call(
                CallScope::Unbounded,
                request,
                |mut client, request| async move { client.pull_image(request).await },
            )
            .await
            .inspect_err(|err| {
                error!(image = %image_ref, ?err, "PullImage from image service failed");
            })?;

        if response.image_ref.is_empty() {
            let err = make_contract_err!("imageRef of image {image_ref:?} is not set");
            error!(image = %image_ref, ?err, "PullImage failed");
            return Err(err);
        }
        Ok(response.image_ref)
    }

    async fn remove_image(&self, image: ImageSpec) -> Result<(), Error> {
        let image_ref = image.image.clone();
        let request = RemoveImageRequest { image: Some(image) };
        self.call(
            CallScope::Bounded(self.timeout),
            request,
            |mut client, request| async move { client.remove_image(request).await },
        )
        .await
        .inspect_err(|err| {
            error!(image = %image_ref, ?err, "RemoveImage from image service failed");
        })?;
        Ok(())
    }

    async fn image_fs_info(&self) -> Result<Vec<FilesystemUsage>, Error> {
        // Cancel-only, like pulls.
        let response = self
            .call(
                CallScope::Unbounded,
                ImageFsInfoRequest {},
                |mut client, request| async move { client.image_fs_info(request).await },
            )
            .await
            .inspect_err(|err| {
                error!(?err, "ImageFsInfo from image service failed");
            })?;
        Ok(response.image_filesystems)
    }
}
