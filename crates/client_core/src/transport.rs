use std::{path::Path, time::Duration};

use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use shared::protocol::{
    query_route, upload_route, PageState, QueryRequest, QueryResponse, UploadOutcome,
};
use url::Url;

use crate::error::TransportError;

/// Form field the server reads the document from.
pub const UPLOAD_FIELD: &str = "file";

/// Contents of the upload form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadForm {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

impl UploadForm {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
            mime_type: None,
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        let mime_type = match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("pdf") => Some("application/pdf".to_string()),
            Some(ext) if ext.eq_ignore_ascii_case("txt") => Some("text/plain".to_string()),
            _ => None,
        };
        Ok(Self {
            filename,
            bytes,
            mime_type,
        })
    }
}

/// The two server calls the controller makes.
#[async_trait]
pub trait DocumentApi: Send + Sync {
    async fn upload(&self, form: UploadForm) -> Result<UploadOutcome, TransportError>;
    async fn query(&self, query: &str) -> Result<QueryResponse, TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpDocumentApi {
    http: Client,
    base_url: Url,
}

impl HttpDocumentApi {
    pub fn new(server_url: &str) -> Result<Self, TransportError> {
        Self::with_client(server_url, Client::new())
    }

    pub fn with_timeout(server_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TransportError::Network)?;
        Self::with_client(server_url, http)
    }

    fn with_client(server_url: &str, http: Client) -> Result<Self, TransportError> {
        Ok(Self {
            http,
            base_url: Url::parse(server_url)?,
        })
    }

    fn endpoint(&self, route: &str) -> Result<Url, TransportError> {
        Ok(self.base_url.join(route)?)
    }

    /// Landing page state; `message` is forwarded as the `?message=` parameter.
    pub async fn page_state(&self, message: Option<&str>) -> Result<PageState, TransportError> {
        let mut request = self.http.get(self.endpoint(upload_route())?);
        if let Some(message) = message {
            request = request.query(&[("message", message)]);
        }
        let res = request.send().await?.error_for_status()?;
        Ok(res.json().await?)
    }
}

#[async_trait]
impl DocumentApi for HttpDocumentApi {
    async fn upload(&self, form: UploadForm) -> Result<UploadOutcome, TransportError> {
        let mut part = Part::bytes(form.bytes).file_name(form.filename);
        if let Some(mime_type) = form.mime_type.as_deref() {
            part = part.mime_str(mime_type)?;
        }
        let res = self
            .http
            .post(self.endpoint(upload_route())?)
            .multipart(Form::new().part(UPLOAD_FIELD, part))
            .send()
            .await?
            .error_for_status()?;
        Ok(res.json().await?)
    }

    async fn query(&self, query: &str) -> Result<QueryResponse, TransportError> {
        let res = self
            .http
            .post(self.endpoint(query_route())?)
            .json(&QueryRequest {
                query: query.to_string(),
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(res.json().await?)
    }
}
