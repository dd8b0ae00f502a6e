//! REST client for the hosted backend
//!
//! The session credential travels in the `X-Fallback-Cookies` header: it is
//! captured from every response that carries it and replayed on every request.
//! No retries and no timeouts beyond the HTTP client defaults.

use super::{AccountApi, DatabaseApi, Query, StorageApi};
use crate::config::{BackendConfig, CollectionConfig};
use crate::domain::{Account, DocumentList, FileUpload, Session, StoredFile};
use crate::error::{BackendError, BackendResult};
use async_trait::async_trait;
use reqwest::{multipart, Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::RwLock;
use tracing::{debug, warn};

const PROJECT_HEADER: &str = "X-Appwrite-Project";
const FALLBACK_COOKIES_HEADER: &str = "X-Fallback-Cookies";

/// Serialized cookie jar the service sends once a session is gone
const EMPTY_COOKIES: &str = "[]";

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

pub struct HttpBackend {
    client: Client,
    endpoint: String,
    project_id: String,
    database_id: String,
    bucket_id: String,
    fallback_cookies: RwLock<Option<String>>,
}

impl HttpBackend {
    pub fn new(backend: &BackendConfig, collections: &CollectionConfig) -> BackendResult<Self> {
        if backend.project_id.is_empty() {
            return Err(BackendError::Config("project id is empty".to_string()));
        }

        Ok(Self {
            client: Client::builder().build()?,
            endpoint: backend.endpoint.trim_end_matches('/').to_string(),
            project_id: backend.project_id.clone(),
            database_id: collections.database_id.clone(),
            bucket_id: collections.storage_id.clone(),
            fallback_cookies: RwLock::new(backend.session.clone()),
        })
    }

    /// Resume a session persisted by an earlier run
    pub fn with_session(self, fallback_cookies: impl Into<String>) -> Self {
        self.set_cookies(Some(fallback_cookies.into()));
        self
    }

    /// Session credential to persist between runs
    pub fn session_cookies(&self) -> Option<String> {
        match self.fallback_cookies.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_cookies(&self, value: Option<String>) {
        match self.fallback_cookies.write() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    fn documents_path(&self, collection: &str) -> String {
        format!(
            "/databases/{}/collections/{}/documents",
            self.database_id, collection
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        debug!(method = %method, path = %path, "Backend request");

        let mut builder = self
            .client
            .request(method, self.url(path))
            .header(PROJECT_HEADER, &self.project_id);
        if let Some(cookies) = self.session_cookies() {
            builder = builder.header(FALLBACK_COOKIES_HEADER, cookies);
        }
        builder
    }

    async fn execute(&self, builder: RequestBuilder) -> BackendResult<Response> {
        let response = builder.send().await?;

        if let Some(cookies) = response
            .headers()
            .get(FALLBACK_COOKIES_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            self.set_cookies(Some(cookies.to_string()));
        }

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|e| e.message)
            .unwrap_or(body);
        warn!(status = status.as_u16(), message = %message, "Backend request failed");
        Err(BackendError::from_status(status.as_u16(), message))
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> BackendResult<T> {
        let response = self.execute(builder).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn send_empty(&self, builder: RequestBuilder) -> BackendResult<()> {
        self.execute(builder).await.map(|_| ())
    }
}

#[async_trait]
impl AccountApi for HttpBackend {
    async fn create_account(
        &self,
        id: &str,
        email: &str,
        password: &str,
        name: &str,
    ) -> BackendResult<Account> {
        let body = json!({
            "userId": id,
            "email": email,
            "password": password,
            "name": name,
        });
        self.send(self.request(Method::POST, "/account").json(&body))
            .await
    }

    async fn create_email_session(&self, email: &str, password: &str) -> BackendResult<Session> {
        let body = json!({ "email": email, "password": password });
        self.send(
            self.request(Method::POST, "/account/sessions/email")
                .json(&body),
        )
        .await
    }

    async fn delete_current_session(&self) -> BackendResult<()> {
        self.send_empty(self.request(Method::DELETE, "/account/sessions/current"))
            .await?;
        self.set_cookies(Some(EMPTY_COOKIES.to_string()));
        Ok(())
    }

    async fn get_account(&self) -> BackendResult<Account> {
        self.send(self.request(Method::GET, "/account")).await
    }

    fn has_local_session(&self) -> bool {
        matches!(self.session_cookies(), Some(c) if c != EMPTY_COOKIES)
    }

    fn initials_avatar_url(&self, name: &str) -> String {
        format!(
            "{}/avatars/initials?name={}&project={}",
            self.endpoint,
            urlencoding::encode(name),
            urlencoding::encode(&self.project_id)
        )
    }
}

#[async_trait]
impl DatabaseApi for HttpBackend {
    async fn create_document(
        &self,
        collection: &str,
        id: &str,
        data: Value,
    ) -> BackendResult<Value> {
        let body = json!({ "documentId": id, "data": data });
        self.send(
            self.request(Method::POST, &self.documents_path(collection))
                .json(&body),
        )
        .await
    }

    async fn get_document(&self, collection: &str, id: &str) -> BackendResult<Value> {
        let path = format!("{}/{}", self.documents_path(collection), id);
        self.send(self.request(Method::GET, &path)).await
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        data: Value,
    ) -> BackendResult<Value> {
        let path = format!("{}/{}", self.documents_path(collection), id);
        let body = json!({ "data": data });
        self.send(self.request(Method::PATCH, &path).json(&body))
            .await
    }

    async fn delete_document(&self, collection: &str, id: &str) -> BackendResult<()> {
        let path = format!("{}/{}", self.documents_path(collection), id);
        self.send_empty(self.request(Method::DELETE, &path)).await
    }

    async fn list_documents(
        &self,
        collection: &str,
        queries: &[Query],
    ) -> BackendResult<DocumentList<Value>> {
        let params = queries
            .iter()
            .map(|q| {
                q.to_param()
                    .map(|p| format!("queries%5B%5D={}", urlencoding::encode(&p)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut path = self.documents_path(collection);
        if !params.is_empty() {
            path.push('?');
            path.push_str(&params.join("&"));
        }
        self.send(self.request(Method::GET, &path)).await
    }
}

#[async_trait]
impl StorageApi for HttpBackend {
    async fn create_file(&self, id: &str, upload: &FileUpload) -> BackendResult<StoredFile> {
        let part = multipart::Part::bytes(upload.bytes.clone())
            .file_name(upload.name.clone())
            .mime_str(upload.content_type.as_ref())?;
        let form = multipart::Form::new()
            .text("fileId", id.to_string())
            .part("file", part);

        let path = format!("/storage/buckets/{}/files", self.bucket_id);
        self.send(self.request(Method::POST, &path).multipart(form))
            .await
    }

    async fn delete_file(&self, id: &str) -> BackendResult<()> {
        let path = format!("/storage/buckets/{}/files/{}", self.bucket_id, id);
        self.send_empty(self.request(Method::DELETE, &path)).await
    }

    fn file_view_url(&self, id: &str) -> BackendResult<String> {
        if id.is_empty() {
            return Err(BackendError::InvalidInput("empty file id".to_string()));
        }
        Ok(format!(
            "{}/storage/buckets/{}/files/{}/view?project={}",
            self.endpoint,
            self.bucket_id,
            urlencoding::encode(id),
            urlencoding::encode(&self.project_id)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> HttpBackend {
        let config = BackendConfig {
            endpoint: "https://cloud.example.io/v1/".to_string(),
            project_id: "proj".to_string(),
            session: None,
        };
        HttpBackend::new(&config, &CollectionConfig::local()).unwrap()
    }

    #[test]
    fn test_view_url() {
        let url = backend().file_view_url("f1").unwrap();
        assert_eq!(
            url,
            "https://cloud.example.io/v1/storage/buckets/media/files/f1/view?project=proj"
        );
        assert!(backend().file_view_url("").is_err());
    }

    #[test]
    fn test_initials_avatar_url_is_encoded() {
        let url = backend().initials_avatar_url("Ada Lovelace");
        assert_eq!(
            url,
            "https://cloud.example.io/v1/avatars/initials?name=Ada%20Lovelace&project=proj"
        );
    }

    #[test]
    fn test_local_session_tracking() {
        let backend = backend();
        assert!(!backend.has_local_session());

        let backend = backend.with_session(EMPTY_COOKIES);
        assert!(!backend.has_local_session());

        let backend = backend.with_session(r#"{"a_session_proj":"token"}"#);
        assert!(backend.has_local_session());
    }

    #[test]
    fn test_empty_project_is_rejected() {
        let config = BackendConfig {
            endpoint: "https://cloud.example.io/v1".to_string(),
            project_id: String::new(),
            session: None,
        };
        assert!(matches!(
            HttpBackend::new(&config, &CollectionConfig::local()),
            Err(BackendError::Config(_))
        ));
    }
}
