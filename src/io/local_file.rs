use std::path::{Component, Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::{BridgeError, Result};

/// Resolve a caller supplied path against the base directory
///
/// Absolute paths and `..` components are rejected so callers cannot reach
/// outside the base directory.
pub fn resolve_in(base_dir: &Path, relative: &str) -> Result<PathBuf> {
    let relative = relative.trim();
    if relative.is_empty() {
        return Err(BridgeError::Validation("File name must be provided.".to_string()));
    }

    let candidate = Path::new(relative);
    for component in candidate.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => {
                return Err(BridgeError::Validation(format!(
                    "File path must stay inside the working directory: {}",
                    relative
                )));
            }
        }
    }

    Ok(base_dir.join(candidate))
}

/// Local flat file on disk
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
}

impl LocalFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check the file exists and is not empty, returning its size in bytes
    pub async fn ensure_readable(&self) -> Result<u64> {
        let metadata = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BridgeError::FileNotFound(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        if !metadata.is_file() {
            return Err(BridgeError::File(format!(
                "not a regular file: {}",
                self.path.display()
            )));
        }

        if metadata.len() == 0 {
            return Err(BridgeError::EmptyFile(self.path.clone()));
        }

        Ok(metadata.len())
    }

    /// Read the first line of the file without the line terminator
    pub async fn read_first_line(&self) -> Result<String> {
        self.ensure_readable().await?;

        let file = File::open(&self.path).await?;
        let mut reader = BufReader::new(file);
        let mut line = String::new();
        reader.read_line(&mut line).await?;

        let line = line.trim_end_matches(['\n', '\r']);
        Ok(line.strip_prefix('\u{feff}').unwrap_or(line).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_resolve_in_rejects_escapes() {
        let base = Path::new("/srv/bridge");

        assert_eq!(
            resolve_in(base, "uploads/data.csv").unwrap(),
            PathBuf::from("/srv/bridge/uploads/data.csv")
        );
        assert!(matches!(
            resolve_in(base, "../etc/passwd"),
            Err(BridgeError::Validation(_))
        ));
        assert!(matches!(
            resolve_in(base, "/etc/passwd"),
            Err(BridgeError::Validation(_))
        ));
        assert!(matches!(resolve_in(base, "  "), Err(BridgeError::Validation(_))));
    }

    #[tokio::test]
    async fn test_missing_and_empty_files() {
        let missing = LocalFile::new("/definitely/not/here.csv");
        assert!(matches!(
            missing.ensure_readable().await,
            Err(BridgeError::FileNotFound(_))
        ));

        let empty = NamedTempFile::new().unwrap();
        let file = LocalFile::new(empty.path());
        assert!(matches!(
            file.ensure_readable().await,
            Err(BridgeError::EmptyFile(_))
        ));
    }

    #[tokio::test]
    async fn test_read_first_line_strips_terminator_and_bom() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "\u{feff}id,name\r\n1,Alice\r\n").unwrap();
        temp_file.flush().unwrap();

        let file = LocalFile::new(temp_file.path());
        assert_eq!(file.read_first_line().await.unwrap(), "id,name");
    }
}
