pub mod helpers;
pub mod models;

pub use helpers::{check_is_liked, parse_tags, time_ago, toggle_like};
pub use models::{
    Account, Creator, DocumentList, FileUpload, NewPost, NewUser, Post, SaveRecord, Session,
    StoredFile, UpdatePost, UpdateUser, User,
};
