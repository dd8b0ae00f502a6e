use chrono::{DateTime, Utc};
use mime::Mime;
use query_cache::Identified;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

// ============================================================================
// Wire helpers
// ============================================================================

/// Relationship attribute: a bare document id or the expanded document
#[derive(Deserialize)]
#[serde(untagged)]
enum DocRef {
    Id(String),
    Doc {
        #[serde(rename = "$id")]
        id: String,
    },
}

impl DocRef {
    fn into_id(self) -> String {
        match self {
            DocRef::Id(id) | DocRef::Doc { id } => id,
        }
    }
}

fn de_ref<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<DocRef>::deserialize(d)?
        .map(DocRef::into_id)
        .unwrap_or_default())
}

fn de_refs<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(Option::<Vec<DocRef>>::deserialize(d)?
        .unwrap_or_default()
        .into_iter()
        .map(DocRef::into_id)
        .collect())
}

fn de_list<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(d)?.unwrap_or_default())
}

/// Nullable string attribute
fn de_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

// ============================================================================
// Documents
// ============================================================================

/// Result of a list query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentList<T> {
    pub total: u64,
    pub documents: Vec<T>,
}

impl<T> Default for DocumentList<T> {
    fn default() -> Self {
        Self {
            total: 0,
            documents: Vec::new(),
        }
    }
}

impl DocumentList<serde_json::Value> {
    pub fn decode<T: DeserializeOwned>(self) -> Result<DocumentList<T>, serde_json::Error> {
        let documents = self
            .documents
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()?;
        Ok(DocumentList {
            total: self.total,
            documents,
        })
    }
}

/// Account bound to the current session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub email: String,
}

/// Authenticated session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(rename = "userId", default)]
    pub user_id: String,
}

/// File stored in the media bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(default)]
    pub bucket_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub size_original: u64,
}

/// Bookmark join record linking a user and a post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveRecord {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_ref")]
    pub user: String,
    #[serde(default, deserialize_with = "de_ref")]
    pub post: String,
}

/// Post author as embedded in a post document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CreatorRepr")]
pub struct Creator {
    #[serde(rename = "$id")]
    pub id: String,
    pub name: String,
    pub username: String,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CreatorRepr {
    Id(String),
    Doc {
        #[serde(rename = "$id")]
        id: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        username: Option<String>,
        #[serde(default, rename = "imageUrl")]
        image_url: Option<String>,
    },
}

impl From<CreatorRepr> for Creator {
    fn from(repr: CreatorRepr) -> Self {
        match repr {
            CreatorRepr::Id(id) => Creator {
                id,
                name: String::new(),
                username: String::new(),
                image_url: String::new(),
            },
            CreatorRepr::Doc {
                id,
                name,
                username,
                image_url,
            } => Creator {
                id,
                name: name.unwrap_or_default(),
                username: username.unwrap_or_default(),
                image_url: image_url.unwrap_or_default(),
            },
        }
    }
}

/// User profile document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_string")]
    pub account_id: String,
    #[serde(default, deserialize_with = "de_string")]
    pub name: String,
    #[serde(default, deserialize_with = "de_string")]
    pub username: String,
    #[serde(default, deserialize_with = "de_string")]
    pub email: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default, deserialize_with = "de_string")]
    pub image_url: String,
    #[serde(default)]
    pub image_id: Option<String>,
    /// Bookmarks held by this user
    #[serde(default, rename = "save", deserialize_with = "de_list")]
    pub saves: Vec<SaveRecord>,
    /// Ids of posts this user likes
    #[serde(default, deserialize_with = "de_refs")]
    pub liked: Vec<String>,
}

impl User {
    /// Save record for `post_id`, if the user bookmarked it
    pub fn save_for(&self, post_id: &str) -> Option<&SaveRecord> {
        self.saves.iter().find(|record| record.post == post_id)
    }
}

/// Post document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(rename = "$id")]
    pub id: String,
    pub creator: Creator,
    #[serde(default, deserialize_with = "de_string")]
    pub caption: String,
    #[serde(default, deserialize_with = "de_list")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "de_string")]
    pub location: String,
    #[serde(default, deserialize_with = "de_string")]
    pub image_url: String,
    #[serde(default, deserialize_with = "de_string")]
    pub image_id: String,
    /// Ids of users liking this post
    #[serde(default, deserialize_with = "de_refs")]
    pub likes: Vec<String>,
    #[serde(rename = "$createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "$updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Identified for Post {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for User {
    fn id(&self) -> &str {
        &self.id
    }
}

// ============================================================================
// Inputs
// ============================================================================

/// Binary payload for the media bucket
#[derive(Debug, Clone, PartialEq)]
pub struct FileUpload {
    pub name: String,
    pub content_type: Mime,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(name: impl Into<String>, content_type: Mime, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type,
            bytes,
        }
    }

    /// Content type taken from the file extension
    pub fn infer(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let content_type = mime_from_name(&name);
        Self::new(name, content_type, bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn mime_from_name(name: &str) -> Mime {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => mime::IMAGE_PNG,
        "jpg" | "jpeg" => mime::IMAGE_JPEG,
        "gif" => mime::IMAGE_GIF,
        "bmp" => mime::IMAGE_BMP,
        "svg" => mime::IMAGE_SVG,
        "webp" => "image/webp"
            .parse()
            .unwrap_or(mime::APPLICATION_OCTET_STREAM),
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    /// Author's user document id
    pub user_id: String,
    pub caption: String,
    pub file: FileUpload,
    pub location: String,
    /// Comma separated, as typed
    pub tags: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePost {
    pub post_id: String,
    pub caption: String,
    /// Current image, kept unless `file` is set
    pub image_id: String,
    pub image_url: String,
    pub file: Option<FileUpload>,
    pub location: String,
    pub tags: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateUser {
    pub user_id: String,
    pub name: String,
    pub username: String,
    pub bio: String,
    pub image_id: Option<String>,
    pub image_url: String,
    pub file: Option<FileUpload>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post_json() -> serde_json::Value {
        json!({
            "$id": "p1",
            "$createdAt": "2024-03-01T10:00:00.000+00:00",
            "$updatedAt": "2024-03-02T10:00:00.000+00:00",
            "creator": {"$id": "u1", "name": "Ada", "username": "ada", "imageUrl": "http://img/u1"},
            "caption": "hello",
            "tags": ["rust", "cli"],
            "location": null,
            "imageUrl": "http://img/p1",
            "imageId": "f1",
            "likes": [{"$id": "u2", "name": "Bo"}, "u3"]
        })
    }

    #[test]
    fn test_post_accepts_expanded_relationships() {
        let post: Post = serde_json::from_value(post_json()).unwrap();

        assert_eq!(post.creator.id, "u1");
        assert_eq!(post.creator.username, "ada");
        assert_eq!(post.likes, vec!["u2", "u3"]);
        assert_eq!(post.location, "");
        assert!(post.updated_at > post.created_at);
    }

    #[test]
    fn test_post_accepts_bare_creator_id() {
        let mut value = post_json();
        value["creator"] = json!("u1");
        value["likes"] = json!(null);

        let post: Post = serde_json::from_value(value).unwrap();
        assert_eq!(post.creator.id, "u1");
        assert!(post.creator.name.is_empty());
        assert!(post.likes.is_empty());
    }

    #[test]
    fn test_serialized_post_reads_back() {
        let post: Post = serde_json::from_value(post_json()).unwrap();
        let back: Post = serde_json::from_value(serde_json::to_value(&post).unwrap()).unwrap();
        assert_eq!(back, post);
    }

    #[test]
    fn test_user_save_records() {
        let user: User = serde_json::from_value(json!({
            "$id": "u1",
            "accountId": "a1",
            "name": "Ada",
            "username": "ada",
            "email": "ada@example.com",
            "bio": null,
            "imageUrl": "http://img/u1",
            "save": [
                {"$id": "s1", "post": {"$id": "p1", "caption": "x"}},
                {"$id": "s2", "user": "u1", "post": "p2"}
            ],
            "liked": [{"$id": "p9"}]
        }))
        .unwrap();

        assert_eq!(user.save_for("p1").map(|s| s.id.as_str()), Some("s1"));
        assert_eq!(user.save_for("p2").map(|s| s.user.as_str()), Some("u1"));
        assert!(user.save_for("p3").is_none());
        assert_eq!(user.liked, vec!["p9"]);
        assert_eq!(user.bio, None);
    }

    #[test]
    fn test_document_list_decode() {
        let list = DocumentList {
            total: 1,
            documents: vec![post_json()],
        };
        let posts = list.decode::<Post>().unwrap();
        assert_eq!(posts.total, 1);
        assert_eq!(posts.documents[0].id, "p1");
    }

    #[test]
    fn test_file_upload_infers_content_type() {
        assert_eq!(FileUpload::infer("a.PNG", vec![1]).content_type, mime::IMAGE_PNG);
        assert_eq!(FileUpload::infer("a.jpeg", vec![]).content_type, mime::IMAGE_JPEG);
        assert_eq!(
            FileUpload::infer("notes", vec![]).content_type,
            mime::APPLICATION_OCTET_STREAM
        );
    }
}
