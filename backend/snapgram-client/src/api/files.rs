use super::{logged, Api};
use crate::backend::unique_id;
use crate::domain::{FileUpload, StoredFile};
use tracing::debug;

impl Api {
    pub async fn upload_file(&self, file: &FileUpload) -> Option<StoredFile> {
        let result = self.backend.create_file(&unique_id(), file).await;
        let stored = logged("upload_file", result)?;
        debug!(file_id = %stored.id, size = stored.size_original, "File uploaded");
        Some(stored)
    }

    pub fn get_file_preview(&self, file_id: &str) -> Option<String> {
        logged("get_file_preview", self.backend.file_view_url(file_id))
    }

    pub async fn delete_file(&self, file_id: &str) -> Option<()> {
        logged("delete_file", self.backend.delete_file(file_id).await)
    }
}
