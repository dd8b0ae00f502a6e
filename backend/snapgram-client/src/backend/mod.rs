//! Boundary with the hosted backend service
//!
//! Accounts and sessions, the document database and file storage. The
//! service owns all durable state; this crate only consumes it.

mod http;
mod memory;
mod query;

pub use http::HttpBackend;
pub use memory::{FailPoint, MemoryBackend};
pub use query::Query;

use crate::domain::{Account, DocumentList, FileUpload, Session, StoredFile};
use crate::error::BackendResult;
use async_trait::async_trait;
use serde_json::Value;

/// Fresh 20 character document/file identifier
pub fn unique_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(20);
    id
}

#[async_trait]
pub trait AccountApi: Send + Sync {
    async fn create_account(
        &self,
        id: &str,
        email: &str,
        password: &str,
        name: &str,
    ) -> BackendResult<Account>;

    async fn create_email_session(&self, email: &str, password: &str) -> BackendResult<Session>;

    async fn delete_current_session(&self) -> BackendResult<()>;

    /// Account bound to the current session
    async fn get_account(&self) -> BackendResult<Account>;

    /// Whether a session credential is held locally
    fn has_local_session(&self) -> bool;

    fn initials_avatar_url(&self, name: &str) -> String;
}

#[async_trait]
pub trait DatabaseApi: Send + Sync {
    async fn create_document(&self, collection: &str, id: &str, data: Value)
        -> BackendResult<Value>;

    async fn get_document(&self, collection: &str, id: &str) -> BackendResult<Value>;

    /// Partial update; attributes absent from `data` are kept
    async fn update_document(&self, collection: &str, id: &str, data: Value)
        -> BackendResult<Value>;

    async fn delete_document(&self, collection: &str, id: &str) -> BackendResult<()>;

    async fn list_documents(
        &self,
        collection: &str,
        queries: &[Query],
    ) -> BackendResult<DocumentList<Value>>;
}

#[async_trait]
pub trait StorageApi: Send + Sync {
    async fn create_file(&self, id: &str, upload: &FileUpload) -> BackendResult<StoredFile>;

    async fn delete_file(&self, id: &str) -> BackendResult<()>;

    /// Public view URL of a stored file
    fn file_view_url(&self, id: &str) -> BackendResult<String>;
}

/// Everything the API adapter needs from the service
pub trait Backend: AccountApi + DatabaseApi + StorageApi {}

impl<T: AccountApi + DatabaseApi + StorageApi> Backend for T {}
