//! Модуль для временных файлов запроса
//!
//! Загрузки и закодированный результат живут в отдельной временной
//! директории, пока выполняется запрос. Директория удаляется при drop
//! независимо от исхода запроса.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::Result;

/// Временная директория одного запроса
pub struct RequestWorkspace {
    /// Временная директория
    temp_dir: TempDir,
    /// Список выданных путей
    files: Vec<PathBuf>,
}

impl RequestWorkspace {
    /// Создает директорию внутри `root` или в системной временной директории
    pub fn new(root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("audio-overlay-");
        let temp_dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };

        log::debug!("Created request workspace {}", temp_dir.path().display());
        Ok(Self {
            temp_dir,
            files: Vec::new(),
        })
    }

    /// Выдает уникальный путь `<prefix>_<uuid>.<extension>`
    ///
    /// Сам файл создает тот, кто в него пишет.
    pub fn file_path(&mut self, prefix: &str, extension: &str) -> PathBuf {
        let file_name = format!("{}_{}.{}", prefix, uuid::Uuid::new_v4(), extension);
        let path = self.temp_dir.path().join(file_name);
        self.files.push(path.clone());
        path
    }

    /// Выдает путь с заданным именем файла, например для результата
    pub fn named_path(&mut self, file_name: &str) -> PathBuf {
        let path = self.temp_dir.path().join(file_name);
        self.files.push(path.clone());
        path
    }

    /// Путь к временной директории
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Удаляет файл сразу, не дожидаясь drop
    pub async fn remove(&mut self, path: &Path) -> Result<()> {
        if tokio::fs::try_exists(path).await? {
            tokio::fs::remove_file(path).await?;
            log::debug!("Removed {}", path.display());
        }
        self.files.retain(|p| p != path);
        Ok(())
    }

    /// Пути, которые ещё отслеживаются
    pub fn tracked(&self) -> &[PathBuf] {
        &self.files
    }
}

impl Drop for RequestWorkspace {
    fn drop(&mut self) {
        if !self.files.is_empty() {
            log::debug!(
                "Discarding request workspace {} with {} file(s)",
                self.temp_dir.path().display(),
                self.files.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_workspace_is_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let dir;
        {
            let mut workspace = RequestWorkspace::new(Some(root.path())).unwrap();
            dir = workspace.path().to_path_buf();
            let path = workspace.file_path("speech", "wav");
            tokio::fs::write(&path, b"data").await.unwrap();
            assert!(path.exists());
        }
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_remove_forgets_file() {
        let mut workspace = RequestWorkspace::new(None).unwrap();
        let path = workspace.file_path("music", "mp3");
        tokio::fs::write(&path, b"data").await.unwrap();

        workspace.remove(&path).await.unwrap();
        assert!(!path.exists());
        assert!(workspace.tracked().is_empty());

        // повторное удаление допустимо
        workspace.remove(&path).await.unwrap();
    }

    #[test]
    fn test_file_paths_are_unique() {
        let mut workspace = RequestWorkspace::new(None).unwrap();
        let a = workspace.file_path("speech", "wav");
        let b = workspace.file_path("speech", "wav");
        assert_ne!(a, b);
        assert!(a.file_name().unwrap().to_str().unwrap().starts_with("speech_"));
        assert_eq!(workspace.named_path("out.mp3").file_name().unwrap(), "out.mp3");
        assert_eq!(workspace.tracked().len(), 3);

        // путь выдан, но файл не создан
        tokio_test::assert_ok!(tokio_test::block_on(workspace.remove(&a)));
        assert_eq!(workspace.tracked().len(), 2);
    }
}
