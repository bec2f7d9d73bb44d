use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::UPLOADS_DIR;
use crate::error::{BridgeError, Result};

/// Places uploaded files under `<base>/uploads`
#[derive(Debug, Clone)]
pub struct UploadStore {
    base_dir: PathBuf,
}

impl UploadStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    /// Save the bytes under the upload directory, overwriting any file with
    /// the same name. Returns the path relative to the base directory.
    pub async fn save(&self, file_name: &str, contents: &[u8]) -> Result<String> {
        let name = sanitize_file_name(file_name)?;

        let dir = self.base_dir.join(UPLOADS_DIR);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&name), contents).await?;

        info!(file = %name, bytes = contents.len(), "stored upload");
        Ok(format!("{}/{}", UPLOADS_DIR, name))
    }
}

/// Keep only the final path component of a client supplied name
fn sanitize_file_name(file_name: &str) -> Result<String> {
    let name = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if name.is_empty() || name == "." || name == ".." {
        return Err(BridgeError::Validation(format!(
            "Invalid upload file name: '{}'",
            file_name
        )));
    }

    Ok(name.to_string())
}
