//! In-process backend
//!
//! Implements the same contract as the hosted service for local development
//! and tests: accounts with a single current session, documents with the
//! schema's two-way relationships, a media bucket, and the list query
//! language. Failures can be injected per operation and writes can be held
//! back to simulate a slow network.

use super::{unique_id, AccountApi, DatabaseApi, Query, StorageApi};
use crate::config::CollectionConfig;
use crate::domain::{Account, DocumentList, FileUpload, Session, StoredFile};
use crate::error::{BackendError, BackendResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use dashmap::DashMap;
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::debug;

/// Default page size of list queries without a limit
const DEFAULT_LIST_LIMIT: usize = 25;

const LOCAL_ENDPOINT: &str = "http://localhost/v1";
const LOCAL_PROJECT: &str = "local";

/// Backend operations that can be counted and made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    CreateAccount,
    CreateSession,
    DeleteSession,
    GetAccount,
    CreateDocument,
    GetDocument,
    UpdateDocument,
    DeleteDocument,
    ListDocuments,
    CreateFile,
    DeleteFile,
    FileView,
}

impl fmt::Display for FailPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailMode {
    Always,
    Once,
}

#[derive(Debug, Clone)]
struct StoredDoc {
    data: Map<String, Value>,
    seq: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct AccountRecord {
    account: Account,
    password: String,
}

struct State {
    /// Keyed by email
    accounts: HashMap<String, AccountRecord>,
    /// Account id of the current session holder
    session: Option<String>,
    collections: HashMap<String, HashMap<String, StoredDoc>>,
    files: HashMap<String, StoredFile>,
    failures: HashMap<FailPoint, FailMode>,
    seq: u64,
    last_ts: DateTime<Utc>,
}

impl State {
    /// Strictly increasing timestamps keep orderings deterministic
    fn tick(&mut self) -> DateTime<Utc> {
        let ts = Utc::now().max(self.last_ts + Duration::milliseconds(1));
        self.last_ts = ts;
        ts
    }

    fn check(&mut self, point: FailPoint) -> BackendResult<()> {
        match self.failures.get(&point).copied() {
            None => Ok(()),
            Some(mode) => {
                if mode == FailMode::Once {
                    self.failures.remove(&point);
                }
                debug!(point = %point, "Injected backend failure");
                Err(BackendError::Api {
                    status: 503,
                    message: format!("injected failure at {}", point),
                })
            }
        }
    }

    fn collection(&self, collection: &str) -> BackendResult<&HashMap<String, StoredDoc>> {
        self.collections
            .get(collection)
            .ok_or_else(|| BackendError::NotFound(format!("collection {}", collection)))
    }

    fn collection_mut(
        &mut self,
        collection: &str,
    ) -> BackendResult<&mut HashMap<String, StoredDoc>> {
        self.collections
            .get_mut(collection)
            .ok_or_else(|| BackendError::NotFound(format!("collection {}", collection)))
    }
}

fn timestamp(ts: &DateTime<Utc>) -> Value {
    Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, false))
}

pub struct MemoryBackend {
    collections: CollectionConfig,
    state: Mutex<State>,
    writes_paused: watch::Sender<bool>,
    calls: DashMap<FailPoint, usize>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(CollectionConfig::local())
    }
}

impl MemoryBackend {
    pub fn new(collections: CollectionConfig) -> Self {
        let mut stores = HashMap::new();
        for id in [
            &collections.user_collection_id,
            &collections.post_collection_id,
            &collections.saves_collection_id,
        ] {
            stores.insert(id.clone(), HashMap::new());
        }

        let (writes_paused, _) = watch::channel(false);
        Self {
            collections,
            state: Mutex::new(State {
                accounts: HashMap::new(),
                session: None,
                collections: stores,
                files: HashMap::new(),
                failures: HashMap::new(),
                seq: 0,
                last_ts: DateTime::<Utc>::MIN_UTC,
            }),
            writes_paused,
            calls: DashMap::new(),
        }
    }

    pub fn collections(&self) -> &CollectionConfig {
        &self.collections
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ============= Test controls =============

    /// Make every call to `point` fail until [`heal`](Self::heal)
    pub fn fail(&self, point: FailPoint) {
        self.state().failures.insert(point, FailMode::Always);
    }

    /// Make the next call to `point` fail
    pub fn fail_once(&self, point: FailPoint) {
        self.state().failures.insert(point, FailMode::Once);
    }

    pub fn heal(&self, point: FailPoint) {
        self.state().failures.remove(&point);
    }

    /// Hold document and file writes until [`resume_writes`](Self::resume_writes)
    pub fn pause_writes(&self) {
        self.writes_paused.send_replace(true);
    }

    pub fn resume_writes(&self) {
        self.writes_paused.send_replace(false);
    }

    /// Calls made to `point`, counted on entry
    pub fn call_count(&self, point: FailPoint) -> usize {
        self.calls.get(&point).map(|c| *c).unwrap_or(0)
    }

    /// Current stored form of a document, with relationships resolved
    pub fn document(&self, collection: &str, id: &str) -> Option<Value> {
        let state = self.state();
        let doc = state.collections.get(collection)?.get(id)?;
        Some(self.render(&state, collection, id, doc))
    }

    pub fn file_exists(&self, id: &str) -> bool {
        self.state().files.contains_key(id)
    }

    pub fn file_count(&self) -> usize {
        self.state().files.len()
    }

    // ============= Internals =============

    fn record(&self, point: FailPoint) {
        *self.calls.entry(point).or_insert(0) += 1;
    }

    async fn writable(&self) {
        let mut rx = self.writes_paused.subscribe();
        while *rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    /// Attributes derived from other collections and never stored
    fn derived_attributes(&self, collection: &str) -> &'static [&'static str] {
        if collection == self.collections.user_collection_id {
            &["save", "liked"]
        } else {
            &[]
        }
    }

    fn writable_data(&self, collection: &str, data: Value) -> BackendResult<Map<String, Value>> {
        let Value::Object(mut data) = data else {
            return Err(BackendError::InvalidInput(
                "document data must be an object".to_string(),
            ));
        };
        data.retain(|key, _| !key.starts_with('$'));
        for key in self.derived_attributes(collection) {
            data.remove(*key);
        }
        Ok(data)
    }

    fn base(collection: &str, id: &str, doc: &StoredDoc) -> Map<String, Value> {
        let mut out = doc.data.clone();
        out.insert("$id".to_string(), Value::from(id));
        out.insert("$collectionId".to_string(), Value::from(collection));
        out.insert("$createdAt".to_string(), timestamp(&doc.created_at));
        out.insert("$updatedAt".to_string(), timestamp(&doc.updated_at));
        out
    }

    /// Related document without its own relationships expanded
    fn shallow(&self, state: &State, collection: &str, id: &str) -> Value {
        match state.collections.get(collection).and_then(|c| c.get(id)) {
            Some(doc) => Value::Object(Self::base(collection, id, doc)),
            None => json!({ "$id": id }),
        }
    }

    fn render(&self, state: &State, collection: &str, id: &str, doc: &StoredDoc) -> Value {
        let users = &self.collections.user_collection_id;
        let posts = &self.collections.post_collection_id;
        let saves = &self.collections.saves_collection_id;
        let mut out = Self::base(collection, id, doc);

        if collection == posts {
            if let Some(Value::String(creator)) = doc.data.get("creator") {
                out.insert("creator".to_string(), self.shallow(state, users, creator));
            }
            let likes = id_list(doc.data.get("likes"))
                .iter()
                .map(|user| self.shallow(state, users, user))
                .collect();
            out.insert("likes".to_string(), Value::Array(likes));
        } else if collection == users {
            let mut records: Vec<(&String, &StoredDoc)> = state
                .collections
                .get(saves)
                .map(|c| c.iter().filter(|(_, s)| str_attr(s, "user") == Some(id)).collect())
                .unwrap_or_default();
            records.sort_by_key(|(_, s)| s.seq);
            let save = records
                .into_iter()
                .map(|(save_id, record)| {
                    let mut rendered = Self::base(saves, save_id, record);
                    if let Some(post) = str_attr(record, "post") {
                        rendered.insert("post".to_string(), self.shallow(state, posts, post));
                    }
                    Value::Object(rendered)
                })
                .collect();
            out.insert("save".to_string(), Value::Array(save));

            let mut liked: Vec<(&String, &StoredDoc)> = state
                .collections
                .get(posts)
                .map(|c| {
                    c.iter()
                        .filter(|(_, p)| id_list(p.data.get("likes")).iter().any(|u| u == id))
                        .collect()
                })
                .unwrap_or_default();
            liked.sort_by_key(|(_, p)| p.seq);
            let liked = liked
                .into_iter()
                .map(|(post_id, post)| Value::Object(Self::base(posts, post_id, post)))
                .collect();
            out.insert("liked".to_string(), Value::Array(liked));
        } else if collection == saves {
            if let Some(user) = str_attr(doc, "user") {
                out.insert("user".to_string(), self.shallow(state, users, user));
            }
            if let Some(post) = str_attr(doc, "post") {
                out.insert("post".to_string(), self.shallow(state, posts, post));
            }
        }

        Value::Object(out)
    }
}

fn str_attr<'a>(doc: &'a StoredDoc, attribute: &str) -> Option<&'a str> {
    doc.data.get(attribute).and_then(Value::as_str)
}

fn id_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(id) => Some(id.clone()),
                Value::Object(doc) => doc.get("$id").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn matches(query: &Query, id: &str, doc: &StoredDoc) -> bool {
    match query {
        Query::Equal { attribute, values } => {
            let actual = if attribute == "$id" {
                Value::from(id)
            } else {
                doc.data.get(attribute).cloned().unwrap_or(Value::Null)
            };
            values.iter().any(|expected| match &actual {
                Value::Array(items) => items.contains(expected),
                other => other == expected,
            })
        }
        Query::Search { attribute, term } => {
            let term = term.to_lowercase();
            str_attr(doc, attribute)
                .map(|text| text.to_lowercase().contains(&term))
                .unwrap_or(false)
        }
        Query::OrderDesc(_) | Query::Limit(_) | Query::CursorAfter(_) => true,
    }
}

fn compare_attribute(a: (&String, &StoredDoc), b: (&String, &StoredDoc), attribute: &str) -> Ordering {
    match attribute {
        "$createdAt" => a.1.created_at.cmp(&b.1.created_at),
        "$updatedAt" => a.1.updated_at.cmp(&b.1.updated_at),
        "$id" => a.0.cmp(b.0),
        _ => match (a.1.data.get(attribute), b.1.data.get(attribute)) {
            (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
            (Some(Value::Number(x)), Some(Value::Number(y))) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            _ => Ordering::Equal,
        },
    }
}

#[async_trait]
impl AccountApi for MemoryBackend {
    async fn create_account(
        &self,
        id: &str,
        email: &str,
        password: &str,
        name: &str,
    ) -> BackendResult<Account> {
        self.record(FailPoint::CreateAccount);
        let mut state = self.state();
        state.check(FailPoint::CreateAccount)?;

        if state.accounts.contains_key(email) {
            return Err(BackendError::Conflict(format!(
                "account with email {} already exists",
                email
            )));
        }
        if password.len() < 8 {
            return Err(BackendError::InvalidInput(
                "password must be at least 8 characters".to_string(),
            ));
        }

        let account = Account {
            id: id.to_string(),
            name: name.to_string(),
            email: email.to_string(),
        };
        state.accounts.insert(
            email.to_string(),
            AccountRecord {
                account: account.clone(),
                password: password.to_string(),
            },
        );
        Ok(account)
    }

    async fn create_email_session(&self, email: &str, password: &str) -> BackendResult<Session> {
        self.record(FailPoint::CreateSession);
        let mut state = self.state();
        state.check(FailPoint::CreateSession)?;

        let account_id = match state.accounts.get(email) {
            Some(record) if record.password == password => record.account.id.clone(),
            _ => {
                return Err(BackendError::Unauthorized(
                    "invalid credentials".to_string(),
                ))
            }
        };

        state.session = Some(account_id.clone());
        Ok(Session {
            id: unique_id(),
            user_id: account_id,
        })
    }

    async fn delete_current_session(&self) -> BackendResult<()> {
        self.record(FailPoint::DeleteSession);
        let mut state = self.state();
        state.check(FailPoint::DeleteSession)?;

        match state.session.take() {
            Some(_) => Ok(()),
            None => Err(BackendError::Unauthorized("no active session".to_string())),
        }
    }

    async fn get_account(&self) -> BackendResult<Account> {
        self.record(FailPoint::GetAccount);
        let mut state = self.state();
        state.check(FailPoint::GetAccount)?;

        let account_id = state
            .session
            .clone()
            .ok_or_else(|| BackendError::Unauthorized("no active session".to_string()))?;
        state
            .accounts
            .values()
            .find(|record| record.account.id == account_id)
            .map(|record| record.account.clone())
            .ok_or_else(|| BackendError::NotFound(format!("account {}", account_id)))
    }

    fn has_local_session(&self) -> bool {
        self.state().session.is_some()
    }

    fn initials_avatar_url(&self, name: &str) -> String {
        format!(
            "{}/avatars/initials?name={}&project={}",
            LOCAL_ENDPOINT,
            urlencoding::encode(name),
            LOCAL_PROJECT
        )
    }
}

#[async_trait]
impl DatabaseApi for MemoryBackend {
    async fn create_document(
        &self,
        collection: &str,
        id: &str,
        data: Value,
    ) -> BackendResult<Value> {
        self.record(FailPoint::CreateDocument);
        self.writable().await;

        let data = self.writable_data(collection, data)?;
        let mut state = self.state();
        state.check(FailPoint::CreateDocument)?;

        if state.collection(collection)?.contains_key(id) {
            return Err(BackendError::Conflict(format!("document {} already exists", id)));
        }

        let now = state.tick();
        state.seq += 1;
        let doc = StoredDoc {
            data,
            seq: state.seq,
            created_at: now,
            updated_at: now,
        };
        state
            .collection_mut(collection)?
            .insert(id.to_string(), doc.clone());

        debug!(collection = %collection, id = %id, "Document created");
        Ok(self.render(&state, collection, id, &doc))
    }

    async fn get_document(&self, collection: &str, id: &str) -> BackendResult<Value> {
        self.record(FailPoint::GetDocument);
        let mut state = self.state();
        state.check(FailPoint::GetDocument)?;

        let doc = state
            .collection(collection)?
            .get(id)
            .ok_or_else(|| BackendError::NotFound(format!("document {}", id)))?;
        Ok(self.render(&state, collection, id, doc))
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        data: Value,
    ) -> BackendResult<Value> {
        self.record(FailPoint::UpdateDocument);
        self.writable().await;

        let data = self.writable_data(collection, data)?;
        let mut state = self.state();
        state.check(FailPoint::UpdateDocument)?;

        let now = state.tick();
        let doc = state
            .collection_mut(collection)?
            .get_mut(id)
            .ok_or_else(|| BackendError::NotFound(format!("document {}", id)))?;
        doc.data.extend(data);
        doc.updated_at = now;
        let doc = doc.clone();

        debug!(collection = %collection, id = %id, "Document updated");
        Ok(self.render(&state, collection, id, &doc))
    }

    async fn delete_document(&self, collection: &str, id: &str) -> BackendResult<()> {
        self.record(FailPoint::DeleteDocument);
        self.writable().await;

        let mut state = self.state();
        state.check(FailPoint::DeleteDocument)?;

        if state.collection_mut(collection)?.remove(id).is_none() {
            return Err(BackendError::NotFound(format!("document {}", id)));
        }

        // Bookmarks of a deleted post go with it
        if collection == self.collections.post_collection_id {
            if let Ok(saves) = state.collection_mut(&self.collections.saves_collection_id) {
                saves.retain(|_, save| str_attr(save, "post") != Some(id));
            }
        }

        debug!(collection = %collection, id = %id, "Document deleted");
        Ok(())
    }

    async fn list_documents(
        &self,
        collection: &str,
        queries: &[Query],
    ) -> BackendResult<DocumentList<Value>> {
        self.record(FailPoint::ListDocuments);
        let mut state = self.state();
        state.check(FailPoint::ListDocuments)?;
        let state = &*state;

        let mut rows: Vec<(&String, &StoredDoc)> = state
            .collection(collection)?
            .iter()
            .filter(|(id, doc)| queries.iter().all(|q| matches(q, id, doc)))
            .collect();

        let orders: Vec<&str> = queries
            .iter()
            .filter_map(|q| match q {
                Query::OrderDesc(attribute) => Some(attribute.as_str()),
                _ => None,
            })
            .collect();
        rows.sort_by(|a, b| {
            orders
                .iter()
                .map(|attribute| compare_attribute(*b, *a, attribute))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or_else(|| a.1.seq.cmp(&b.1.seq))
        });

        let total = rows.len() as u64;

        let cursor = queries.iter().rev().find_map(|q| match q {
            Query::CursorAfter(id) => Some(id.as_str()),
            _ => None,
        });
        if let Some(cursor) = cursor {
            let position = rows
                .iter()
                .position(|(id, _)| id.as_str() == cursor)
                .ok_or_else(|| {
                    BackendError::InvalidInput(format!("cursor document {} not found", cursor))
                })?;
            rows.drain(..=position);
        }

        let limit = queries
            .iter()
            .rev()
            .find_map(|q| match q {
                Query::Limit(limit) => Some(*limit as usize),
                _ => None,
            })
            .unwrap_or(DEFAULT_LIST_LIMIT);
        rows.truncate(limit);

        let documents = rows
            .into_iter()
            .map(|(id, doc)| self.render(state, collection, id, doc))
            .collect();
        Ok(DocumentList { total, documents })
    }
}

#[async_trait]
impl StorageApi for MemoryBackend {
    async fn create_file(&self, id: &str, upload: &FileUpload) -> BackendResult<StoredFile> {
        self.record(FailPoint::CreateFile);
        self.writable().await;

        let mut state = self.state();
        state.check(FailPoint::CreateFile)?;

        if state.files.contains_key(id) {
            return Err(BackendError::Conflict(format!("file {} already exists", id)));
        }
        let file = StoredFile {
            id: id.to_string(),
            bucket_id: self.collections.storage_id.clone(),
            name: upload.name.clone(),
            mime_type: upload.content_type.to_string(),
            size_original: upload.len() as u64,
        };
        state.files.insert(id.to_string(), file.clone());
        Ok(file)
    }

    async fn delete_file(&self, id: &str) -> BackendResult<()> {
        self.record(FailPoint::DeleteFile);
        self.writable().await;

        let mut state = self.state();
        state.check(FailPoint::DeleteFile)?;

        state
            .files
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| BackendError::NotFound(format!("file {}", id)))
    }

    fn file_view_url(&self, id: &str) -> BackendResult<String> {
        self.record(FailPoint::FileView);
        let mut state = self.state();
        state.check(FailPoint::FileView)?;

        if !state.files.contains_key(id) {
            return Err(BackendError::NotFound(format!("file {}", id)));
        }
        Ok(format!(
            "{}/storage/buckets/{}/files/{}/view?project={}",
            LOCAL_ENDPOINT, self.collections.storage_id, id, LOCAL_PROJECT
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn backend() -> MemoryBackend {
        MemoryBackend::default()
    }

    async fn post(backend: &MemoryBackend, id: &str, caption: &str) {
        backend
            .create_document("posts", id, json!({ "creator": "u1", "caption": caption }))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let backend = backend();
        backend
            .create_account("a1", "ada@example.com", "password1", "Ada")
            .await
            .unwrap();

        assert!(!backend.has_local_session());
        assert!(matches!(
            backend.get_account().await,
            Err(BackendError::Unauthorized(_))
        ));
        assert!(backend
            .create_email_session("ada@example.com", "wrong-pass")
            .await
            .is_err());

        let session = backend
            .create_email_session("ada@example.com", "password1")
            .await
            .unwrap();
        assert_eq!(session.user_id, "a1");
        assert_eq!(backend.get_account().await.unwrap().name, "Ada");

        backend.delete_current_session().await.unwrap();
        assert!(!backend.has_local_session());
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let backend = backend();
        backend
            .create_account("a1", "ada@example.com", "password1", "Ada")
            .await
            .unwrap();
        assert!(matches!(
            backend
                .create_account("a2", "ada@example.com", "password2", "Ada")
                .await,
            Err(BackendError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_list_order_cursor_and_limit() {
        let backend = backend();
        for id in ["p1", "p2", "p3", "p4"] {
            post(&backend, id, id).await;
        }

        let ids = |list: DocumentList<Value>| -> Vec<String> {
            list.documents
                .iter()
                .map(|d| d["$id"].as_str().unwrap().to_string())
                .collect()
        };

        let first = backend
            .list_documents("posts", &[Query::order_desc("$createdAt"), Query::limit(3)])
            .await
            .unwrap();
        assert_eq!(first.total, 4);
        assert_eq!(ids(first), vec!["p4", "p3", "p2"]);

        let rest = backend
            .list_documents(
                "posts",
                &[
                    Query::order_desc("$createdAt"),
                    Query::limit(3),
                    Query::cursor_after("p2"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(ids(rest), vec!["p1"]);

        let empty = backend
            .list_documents(
                "posts",
                &[Query::order_desc("$createdAt"), Query::cursor_after("p1")],
            )
            .await
            .unwrap();
        assert!(empty.documents.is_empty());
    }

    #[tokio::test]
    async fn test_update_moves_document_up_by_updated_at() {
        let backend = backend();
        post(&backend, "p1", "old").await;
        post(&backend, "p2", "new").await;
        backend
            .update_document("posts", "p1", json!({ "caption": "edited" }))
            .await
            .unwrap();

        let list = backend
            .list_documents("posts", &[Query::order_desc("$updatedAt")])
            .await
            .unwrap();
        assert_eq!(list.documents[0]["$id"], "p1");
        assert_eq!(list.documents[0]["caption"], "edited");
        assert_eq!(list.documents[0]["creator"]["$id"], "u1");
    }

    #[tokio::test]
    async fn test_equal_and_search_filters() {
        let backend = backend();
        post(&backend, "p1", "Sunset at the Beach").await;
        post(&backend, "p2", "morning coffee").await;
        backend
            .create_document("posts", "p3", json!({ "creator": "u2", "caption": "beach day" }))
            .await
            .unwrap();

        let found = backend
            .list_documents("posts", &[Query::search("caption", "BEACH")])
            .await
            .unwrap();
        assert_eq!(found.total, 2);

        let by_creator = backend
            .list_documents("posts", &[Query::equal("creator", "u1")])
            .await
            .unwrap();
        assert_eq!(by_creator.total, 2);
    }

    #[tokio::test]
    async fn test_relationships_are_resolved() {
        let backend = backend();
        backend
            .create_document("users", "u1", json!({ "name": "Ada", "username": "ada" }))
            .await
            .unwrap();
        backend
            .create_document("posts", "p1", json!({ "creator": "u1", "likes": ["u1"] }))
            .await
            .unwrap();
        backend
            .create_document("saves", "s1", json!({ "user": "u1", "post": "p1" }))
            .await
            .unwrap();

        let user = backend.get_document("users", "u1").await.unwrap();
        assert_eq!(user["save"][0]["$id"], "s1");
        assert_eq!(user["save"][0]["post"]["$id"], "p1");
        assert_eq!(user["liked"][0]["$id"], "p1");

        let post = backend.get_document("posts", "p1").await.unwrap();
        assert_eq!(post["creator"]["username"], "ada");
        assert_eq!(post["likes"][0]["name"], "Ada");

        backend.delete_document("posts", "p1").await.unwrap();
        let user = backend.get_document("users", "u1").await.unwrap();
        assert_eq!(user["save"], json!([]));
    }

    #[tokio::test]
    async fn test_fail_once_then_recovers() {
        let backend = backend();
        backend.fail_once(FailPoint::CreateDocument);

        assert!(backend
            .create_document("posts", "p1", json!({}))
            .await
            .is_err());
        assert!(backend
            .create_document("posts", "p1", json!({}))
            .await
            .is_ok());
        assert_eq!(backend.call_count(FailPoint::CreateDocument), 2);
    }

    #[tokio::test]
    async fn test_paused_writes_wait_for_resume() {
        let backend = Arc::new(backend());
        backend.pause_writes();

        let task = {
            let backend = Arc::clone(&backend);
            tokio::spawn(async move { backend.create_document("posts", "p1", json!({})).await })
        };

        while backend.call_count(FailPoint::CreateDocument) == 0 {
            tokio::task::yield_now().await;
        }
        assert!(backend.document("posts", "p1").is_none());

        backend.resume_writes();
        task.await.unwrap().unwrap();
        assert!(backend.document("posts", "p1").is_some());
    }

    #[tokio::test]
    async fn test_files() {
        let backend = backend();
        let upload = FileUpload::infer("a.png", vec![1, 2, 3]);

        let file = backend.create_file("f1", &upload).await.unwrap();
        assert_eq!(file.size_original, 3);
        assert_eq!(file.mime_type, "image/png");
        assert!(backend.file_view_url("f1").unwrap().contains("/files/f1/view"));

        backend.delete_file("f1").await.unwrap();
        assert!(!backend.file_exists("f1"));
        assert!(backend.file_view_url("f1").is_err());
    }

    #[test]
    fn test_unknown_collection_is_not_found() {
        let backend = backend();

        let result = tokio_test::block_on(backend.get_document("comments", "c1"));
        assert!(matches!(result, Err(BackendError::NotFound(_))));
        assert_eq!(backend.call_count(FailPoint::GetDocument), 1);
    }
}
