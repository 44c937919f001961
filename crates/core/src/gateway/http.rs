use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, ClientBuilder, Method, RequestBuilder, Response, StatusCode, Url};

use super::{GatewayError, RemoteGateway};
use crate::config::ConnectionConfig;
use crate::model::{RemoteSnapshot, TaskDraft};
use crate::patch::PartialTask;

/// Talks to the task server over JSON/HTTP with a bearer token.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    tasks_url: Url,
}

impl HttpGateway {
    pub fn new(connection: &ConnectionConfig) -> Result<Self, GatewayError> {
        Self::with_builder(connection, Client::builder())
    }

    fn with_builder(
        connection: &ConnectionConfig,
        builder: ClientBuilder,
    ) -> Result<Self, GatewayError> {
        let endpoint = connection.endpoint.trim_end_matches('/');
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(GatewayError::InvalidEndpoint(connection.endpoint.clone()));
        }
        let tasks_url = Url::parse(&format!("{endpoint}/tasks"))
            .map_err(|_| GatewayError::InvalidEndpoint(connection.endpoint.clone()))?;

        let mut headers = HeaderMap::new();
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", connection.api_key))
            .map_err(|err| GatewayError::Network(format!("invalid api key header: {err}")))?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        let client = builder
            .default_headers(headers)
            .build()
            .map_err(|err| GatewayError::Network(err.to_string()))?;

        Ok(Self { client, tasks_url })
    }

    fn request(&self, method: Method) -> RequestBuilder {
        self.client.request(method, self.tasks_url.clone())
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn fetch_all(&self) -> Result<RemoteSnapshot, GatewayError> {
        let response = send(self.request(Method::GET)).await?;
        let body = response
            .text()
            .await
            .map_err(|err| GatewayError::Network(err.to_string()))?;
        serde_json::from_str(&body).map_err(|err| {
            tracing::debug!(error = %err, "failed to decode task snapshot");
            GatewayError::Decode(err.to_string())
        })
    }

    async fn apply_patches(&self, patches: &[PartialTask]) -> Result<(), GatewayError> {
        send(self.request(Method::PATCH).json(patches)).await?;
        Ok(())
    }

    async fn create_task(&self, draft: &TaskDraft) -> Result<(), GatewayError> {
        send(self.request(Method::POST).json(draft)).await?;
        Ok(())
    }
}

async fn send(request: RequestBuilder) -> Result<Response, GatewayError> {
    let response = request
        .send()
        .await
        .map_err(|err| GatewayError::Network(err.to_string()))?;

    let status = response.status();
    if status == StatusCode::FORBIDDEN {
        return Err(GatewayError::Forbidden);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status = status.as_u16(), body = body.as_str(), "task server error");
        return Err(GatewayError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}
