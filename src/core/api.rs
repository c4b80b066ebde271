use crate::core::config::ServerConfig;
use crate::core::error_log::{ErrorContext, ErrorLog};
use crate::core::models::{
    Ack, CollectionMetadata, CollectionPage, CompanyBatch, CompanyId, CompanyIdsRequest,
    CompanyIdsResponse, LikedCollectionResponse,
};
use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::io;
use thiserror::Error;

/// Failures surfaced by the collections service adapter
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport error during {operation}: {message}")]
    Transport { operation: String, message: String },
    #[error("{operation} failed with HTTP {status}: {body}")]
    Server {
        operation: String,
        status: u16,
        body: String,
    },
    #[error("invalid response for {operation}: {message}")]
    Decode { operation: String, message: String },
}

impl ApiError {
    pub fn error_type(&self) -> &str {
        match self {
            ApiError::Transport { .. } => "transport_error",
            ApiError::Server { .. } => "server_error",
            ApiError::Decode { .. } => "decode_error",
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<ApiError> for io::Error {
    fn from(err: ApiError) -> Self {
        io::Error::other(err)
    }
}

/// Operations offered by the remote collections service.
///
/// The adapter never retries; callers decide what a failure means.
#[async_trait]
pub trait CollectionsApi: Send + Sync {
    async fn get_collection_page(
        &self,
        collection_id: &str,
        offset: u64,
        limit: u32,
    ) -> Result<CollectionPage, ApiError>;

    async fn get_companies(&self, offset: u64, limit: u32) -> Result<CompanyBatch, ApiError>;

    async fn list_collections(&self) -> Result<Vec<CollectionMetadata>, ApiError>;

    async fn get_liked_collection_id(&self) -> Result<String, ApiError>;

    /// Every company id in a collection, without row data
    async fn get_collection_company_ids(
        &self,
        collection_id: &str,
    ) -> Result<Vec<CompanyId>, ApiError>;

    async fn add_to_liked(&self, company_ids: &[CompanyId]) -> Result<(), ApiError>;

    async fn remove_from_liked(&self, company_ids: &[CompanyId]) -> Result<(), ApiError>;

    async fn add_to_my_list(&self, company_ids: &[CompanyId]) -> Result<(), ApiError>;
}

/// `reqwest` implementation of [`CollectionsApi`]
pub struct HttpCollectionsClient {
    client: Client,
    base_url: String,
    error_log: Option<ErrorLog>,
}

impl HttpCollectionsClient {
    pub fn new(config: &ServerConfig) -> io::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| io::Error::other(format!("Failed to create HTTP client: {e}")))?;

        let base_url = config.base_url.trim_end_matches('/').to_string();

        info!("Created collections client for {base_url}");

        Ok(Self {
            client,
            base_url,
            error_log: None,
        })
    }

    /// Also persist failures to the given error log
    pub fn with_error_log(mut self, error_log: ErrorLog) -> Self {
        self.error_log = Some(error_log);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, collection_id: &str) -> String {
        format!(
            "{}/collections/{}",
            self.base_url,
            urlencoding::encode(collection_id)
        )
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        debug!("GET {url} {query:?}");
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| self.transport_error(operation, url, e))?;

        let response = self.check_status(operation, url, response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| self.decode_error(operation, url, e))
    }

    async fn post_ids(
        &self,
        operation: &str,
        path: &str,
        company_ids: &[CompanyId],
    ) -> Result<(), ApiError> {
        let url = format!("{}{path}", self.base_url);
        let body = CompanyIdsRequest {
            company_ids: company_ids.to_vec(),
        };

        info!("{operation}: posting {} company ids", company_ids.len());

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(operation, &url, e))?;

        let response = self.check_status(operation, &url, response).await?;

        // Acks are informational; an empty or non-JSON body is still success
        let text = response.text().await.unwrap_or_default();
        if let Ok(Ack {
            message: Some(message),
        }) = serde_json::from_str::<Ack>(&text)
        {
            info!("{operation}: {message}");
        }
        Ok(())
    }

    async fn check_status(
        &self,
        operation: &str,
        url: &str,
        response: Response,
    ) -> Result<Response, ApiError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();

        ErrorContext::new(operation)
            .with_error("server_error", &format!("HTTP {status}"))
            .with_request_details(url, Some(status.as_u16()), Some(&error_text))
            .report(self.error_log.as_ref());

        Err(ApiError::Server {
            operation: operation.to_string(),
            status: status.as_u16(),
            body: error_text,
        })
    }

    fn transport_error(&self, operation: &str, url: &str, e: reqwest::Error) -> ApiError {
        ErrorContext::new(operation)
            .with_error("transport_error", &e.to_string())
            .with_request_details(url, None, None)
            .with_metadata("timeout", &e.is_timeout().to_string())
            .report(self.error_log.as_ref());

        ApiError::Transport {
            operation: operation.to_string(),
            message: e.to_string(),
        }
    }

    fn decode_error(&self, operation: &str, url: &str, e: reqwest::Error) -> ApiError {
        ErrorContext::new(operation)
            .with_error("decode_error", &e.to_string())
            .with_request_details(url, None, None)
            .report(self.error_log.as_ref());

        ApiError::Decode {
            operation: operation.to_string(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl CollectionsApi for HttpCollectionsClient {
    async fn get_collection_page(
        &self,
        collection_id: &str,
        offset: u64,
        limit: u32,
    ) -> Result<CollectionPage, ApiError> {
        let url = self.collection_url(collection_id);
        self.get_json(
            "get_collection_page",
            &url,
            &[("offset", offset.to_string()), ("limit", limit.to_string())],
        )
        .await
    }

    async fn get_companies(&self, offset: u64, limit: u32) -> Result<CompanyBatch, ApiError> {
        let url = format!("{}/companies", self.base_url);
        self.get_json(
            "get_companies",
            &url,
            &[("offset", offset.to_string()), ("limit", limit.to_string())],
        )
        .await
    }

    async fn list_collections(&self) -> Result<Vec<CollectionMetadata>, ApiError> {
        let url = format!("{}/collections", self.base_url);
        self.get_json("list_collections", &url, &[]).await
    }

    async fn get_liked_collection_id(&self) -> Result<String, ApiError> {
        let url = format!("{}/collections/liked-id", self.base_url);
        let response: LikedCollectionResponse =
            self.get_json("get_liked_collection_id", &url, &[]).await?;
        Ok(response.id)
    }

    async fn get_collection_company_ids(
        &self,
        collection_id: &str,
    ) -> Result<Vec<CompanyId>, ApiError> {
        let url = format!("{}/company-ids", self.collection_url(collection_id));
        let response: CompanyIdsResponse = self
            .get_json("get_collection_company_ids", &url, &[])
            .await?;
        Ok(response.company_ids)
    }

    async fn add_to_liked(&self, company_ids: &[CompanyId]) -> Result<(), ApiError> {
        self.post_ids("add_liked", "/collections/add-liked", company_ids)
            .await
    }

    async fn remove_from_liked(&self, company_ids: &[CompanyId]) -> Result<(), ApiError> {
        self.post_ids("remove_liked", "/collections/remove-liked", company_ids)
            .await
    }

    async fn add_to_my_list(&self, company_ids: &[CompanyId]) -> Result<(), ApiError> {
        self.post_ids("add_my_list", "/collections/add-my-list", company_ids)
            .await
    }
}
