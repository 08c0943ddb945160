use super::{
    config::ApiConfigTrait,
    error::{map_deserialization_error, map_serialization_error, ClientError},
};
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) struct ApiClient<C: ApiConfigTrait> {
    http_client: reqwest::Client,
    pub config: C,
    pub backoff: backoff::ExponentialBackoff,
    timeout: Duration,
}

impl<C: ApiConfigTrait> ApiClient<C> {
    pub fn new(config: C) -> Result<Self, ClientError> {
        let api_config = config.api_config();
        let timeout = api_config.timeout;
        let mut builder = reqwest::Client::builder().timeout(timeout);
        if !api_config.use_system_proxy {
            builder = builder.no_proxy();
        }
        let backoff = backoff::ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(api_config.max_retry_elapsed))
            .build();
        Ok(Self {
            http_client: builder.build()?,
            config,
            backoff,
            timeout,
        })
    }

    /// Make a POST request to {path} and deserialize the response body
    pub(crate) async fn post<I, O>(&self, path: &str, request: &I) -> Result<O, ClientError>
    where
        I: Serialize + std::fmt::Debug,
        O: DeserializeOwned,
    {
        let serialized_request = serde_json::to_string(request).map_err(map_serialization_error)?;
        crate::trace!("Serialized request: {}", serialized_request);

        let request_maker = || {
            let request = self
                .http_client
                .post(self.config.url(path))
                .headers(self.config.headers())
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(serialized_request.clone())
                .build()
                .map_err(ClientError::Reqwest);
            async move { request }
        };
        self.execute(request_maker).await
    }

    /// Execute a HTTP request and retry on rate limit or temporary unavailability.
    ///
    /// request_maker exists so the request can be rebuilt for each retry.
    async fn execute_raw<M, Fut>(&self, request_maker: M) -> Result<Bytes, ClientError>
    where
        M: Fn() -> Fut,
        Fut: core::future::Future<Output = Result<reqwest::Request, ClientError>>,
    {
        let client = self.http_client.clone();
        let timeout = self.timeout;

        backoff::future::retry(self.backoff.clone(), || async {
            let request = request_maker().await.map_err(backoff::Error::Permanent)?;
            let response = client
                .execute(request)
                .await
                .map_err(|e| map_reqwest_error(e, timeout))
                .map_err(backoff::Error::Permanent)?;

            let status = response.status();
            let bytes = response
                .bytes()
                .await
                .map_err(|e| map_reqwest_error(e, timeout))
                .map_err(backoff::Error::Permanent)?;

            if !status.is_success() {
                let err = ClientError::Status {
                    status: status.as_u16(),
                    body: String::from_utf8_lossy(&bytes).trim().to_string(),
                };
                if status.as_u16() == 429 || status.as_u16() == 503 {
                    tracing::warn!("Retrying after transient API error: {err}");
                    return Err(backoff::Error::Transient {
                        err,
                        retry_after: None,
                    });
                }
                return Err(backoff::Error::Permanent(err));
            }

            Ok(bytes)
        })
        .await
    }

    async fn execute<O, M, Fut>(&self, request_maker: M) -> Result<O, ClientError>
    where
        O: DeserializeOwned,
        M: Fn() -> Fut,
        Fut: core::future::Future<Output = Result<reqwest::Request, ClientError>>,
    {
        let bytes = self.execute_raw(request_maker).await?;

        let value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| map_deserialization_error(e, &bytes))?;
        crate::trace!("Serialized response: {}", value);

        let response: O =
            serde_json::from_value(value).map_err(|e| map_deserialization_error(e, &bytes))?;

        Ok(response)
    }
}

fn map_reqwest_error(e: reqwest::Error, timeout: Duration) -> ClientError {
    if e.is_timeout() {
        ClientError::Timeout { timeout }
    } else {
        ClientError::Reqwest(e)
    }
}
