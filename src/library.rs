use crate::errors::{PrinterError, Result};
use crate::store::{FilePathStore, FolderStore};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A named bucket of filenames. Paths live in the library's FilePath map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub name: String,
    pub files: Vec<String>,
}

impl Folder {
    pub fn new(name: impl Into<String>, files: Vec<String>) -> Self {
        Self {
            name: name.into(),
            files,
        }
    }
}

/// Folder list plus the process-wide filename → path map, both persisted
/// after every mutation.
pub struct Library {
    folders: Vec<Folder>,
    file_paths: BTreeMap<String, PathBuf>,
    folder_store: FolderStore,
    path_store: FilePathStore,
}

/// A folder's files resolved to their sources, ready to be copied out.
#[derive(Debug, Clone)]
pub struct Export {
    folder: String,
    destination: PathBuf,
    files: Vec<(String, PathBuf)>,
}

impl Export {
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Copy every file, overwriting existing copies.
    pub async fn run(self) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.destination).await?;
        for (name, source) in &self.files {
            tokio::fs::copy(source, self.destination.join(name)).await?;
        }
        info!(
            "Exported folder '{}' ({} files) to {:?}",
            self.folder,
            self.files.len(),
            self.destination
        );
        Ok(self.destination)
    }
}

/// Name a folder gets once its contents have been sent to the printer.
pub fn printed_name(folder: &str, at: DateTime<Local>) -> String {
    format!("{} (Printed at {})", folder, at.format("%Y-%m-%d %H:%M:%S"))
}

/// Replace characters that are not valid in a file or directory name.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

fn folder_mut<'a>(folders: &'a mut [Folder], name: &str) -> Result<&'a mut Folder> {
    folders
        .iter_mut()
        .find(|f| f.name == name)
        .ok_or_else(|| PrinterError::FolderNotFound(name.to_string()))
}

/// The filename a path is registered under. Separators used by the folder,
/// file-path and ledger formats are refused so every store reads back
/// exactly what was written.
fn checked_file_name(path: &Path) -> Result<String> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| PrinterError::InvalidName(path.display().to_string()))?;
    let full = path.to_string_lossy();
    if full.contains(',') || full.contains('|') || full.contains('\n') || file_name.contains(": ") {
        return Err(PrinterError::InvalidName(format!(
            "File paths may not contain ',', '|', ': ' or line breaks: {}",
            full
        )));
    }
    Ok(file_name)
}

impl Library {
    pub async fn load(folder_store: FolderStore, path_store: FilePathStore) -> Result<Self> {
        let folders = folder_store.load().await?;
        let file_paths = path_store.load().await?;
        info!(
            "Library loaded: {} folders, {} file paths",
            folders.len(),
            file_paths.len()
        );
        Ok(Self {
            folders,
            file_paths,
            folder_store,
            path_store,
        })
    }

    pub fn folders(&self) -> &[Folder] {
        &self.folders
    }

    pub fn folder(&self, name: &str) -> Option<&Folder> {
        self.folders.iter().find(|f| f.name == name)
    }

    pub fn file_path(&self, file_name: &str) -> Option<&Path> {
        self.file_paths.get(file_name).map(PathBuf::as_path)
    }

    pub async fn create_folder(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PrinterError::InvalidName("Folder name is required".to_string()));
        }
        if name.contains(": ") || name.contains('|') || name.contains('\n') {
            return Err(PrinterError::InvalidName(format!(
                "Folder name may not contain ': ', '|' or line breaks: {}",
                name
            )));
        }
        if self.folder(name).is_some() {
            return Err(PrinterError::FolderExists(name.to_string()));
        }

        let mut folders = self.folders.clone();
        folders.push(Folder::new(name, Vec::new()));
        self.commit_folders(folders).await?;
        info!("Created folder: {}", name);
        Ok(())
    }

    pub async fn delete_folder(&mut self, name: &str) -> Result<Folder> {
        let index = self
            .folders
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| PrinterError::FolderNotFound(name.to_string()))?;
        let mut folders = self.folders.clone();
        let removed = folders.remove(index);
        self.commit_folders(folders).await?;
        info!("Deleted folder: {}", name);
        Ok(removed)
    }

    /// Register files under `folder`; a filename already mapped elsewhere is
    /// re-pointed at the new path.
    pub async fn add_files(&mut self, folder: &str, paths: &[PathBuf]) -> Result<usize> {
        let mut added = Vec::with_capacity(paths.len());
        for path in paths {
            added.push((checked_file_name(path)?, path.clone()));
        }

        let mut folders = self.folders.clone();
        let mut file_paths = self.file_paths.clone();
        let target = folder_mut(&mut folders, folder)?;
        for (file_name, _) in &added {
            target.files.push(file_name.clone());
        }
        for (file_name, path) in added {
            if let Some(previous) = file_paths.insert(file_name.clone(), path) {
                debug!("Re-pointed {} (was {:?})", file_name, previous);
            }
        }

        self.commit(folders, file_paths).await?;
        info!("Added {} files to folder {}", paths.len(), folder);
        Ok(paths.len())
    }

    /// Remove filenames from a folder and forget their paths.
    pub async fn remove_files(&mut self, folder: &str, file_names: &[String]) -> Result<()> {
        let mut folders = self.folders.clone();
        let mut file_paths = self.file_paths.clone();
        let target = folder_mut(&mut folders, folder)?;
        for name in file_names {
            if let Some(index) = target.files.iter().position(|f| f == name) {
                target.files.remove(index);
            }
        }
        for name in file_names {
            file_paths.remove(name);
        }
        self.commit(folders, file_paths).await
    }

    pub async fn clear_folder(&mut self, folder: &str) -> Result<()> {
        let mut folders = self.folders.clone();
        folder_mut(&mut folders, folder)?.files.clear();
        self.commit_folders(folders).await
    }

    /// Resolve every file of `folder` to its absolute path, failing on the
    /// first unresolved name.
    pub fn resolve(&self, folder: &str) -> Result<Vec<PathBuf>> {
        let folder = self
            .folder(folder)
            .ok_or_else(|| PrinterError::FolderNotFound(folder.to_string()))?;
        folder
            .files
            .iter()
            .map(|name| {
                self.file_paths
                    .get(name)
                    .cloned()
                    .ok_or_else(|| PrinterError::FilePathUnresolved(name.clone()))
            })
            .collect()
    }

    /// Rename `folder` to embed the print timestamp. Returns the new name, or
    /// `None` if the folder no longer exists (renamed or deleted meanwhile).
    pub async fn mark_printed(&mut self, folder: &str, at: DateTime<Local>) -> Result<Option<String>> {
        let new_name = printed_name(folder, at);
        let mut folders = self.folders.clone();
        let Some(target) = folders.iter_mut().find(|f| f.name == folder) else {
            warn!("Cannot mark missing folder as printed: {}", folder);
            return Ok(None);
        };
        target.name = new_name.clone();
        self.commit_folders(folders).await?;
        info!("Folder '{}' marked as printed: '{}'", folder, new_name);
        Ok(Some(new_name))
    }

    /// Resolve a folder for copying into `<target>/<sanitized folder name>/`.
    /// The copy itself happens in [`Export::run`].
    pub fn export(&self, folder: &str, target: &Path) -> Result<Export> {
        let sources = self.resolve(folder)?;
        let names = &self
            .folder(folder)
            .ok_or_else(|| PrinterError::FolderNotFound(folder.to_string()))?
            .files;
        Ok(Export {
            folder: folder.to_string(),
            destination: target.join(sanitize_file_name(folder)),
            files: names.iter().cloned().zip(sources).collect(),
        })
    }

    /// Persist `folders`, then adopt it. On failure nothing changes.
    async fn commit_folders(&mut self, folders: Vec<Folder>) -> Result<()> {
        self.folder_store.save(&folders).await?;
        self.folders = folders;
        Ok(())
    }

    /// Persist both stores, then adopt them. If the path store cannot be
    /// written the previous folder list is written back.
    async fn commit(&mut self, folders: Vec<Folder>, file_paths: BTreeMap<String, PathBuf>) -> Result<()> {
        self.folder_store.save(&folders).await?;
        if let Err(e) = self.path_store.save(&file_paths).await {
            if let Err(restore) = self.folder_store.save(&self.folders).await {
                warn!("Failed to restore folder list after a failed save: {}", restore);
            }
            return Err(e);
        }
        self.folders = folders;
        self.file_paths = file_paths;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::store::DurableStore;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    async fn library(dir: &Path) -> Library {
        let store = DurableStore::new(RetryConfig::default());
        Library::load(
            FolderStore::new(dir.join("folders.txt"), store.clone()),
            FilePathStore::new(dir.join("file_paths.txt"), store),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_folder_lifecycle_persists() {
        let dir = TempDir::new().unwrap();
        {
            let mut lib = library(dir.path()).await;
            lib.create_folder("ReportsQ1").await.unwrap();
            assert!(matches!(
                lib.create_folder("ReportsQ1").await,
                Err(PrinterError::FolderExists(_))
            ));
            lib.add_files(
                "ReportsQ1",
                &[PathBuf::from("/a/1.pdf"), PathBuf::from("/a/2.docx")],
            )
            .await
            .unwrap();
        }

        let lib = library(dir.path()).await;
        assert_eq!(
            lib.folder("ReportsQ1").unwrap().files,
            vec!["1.pdf".to_string(), "2.docx".to_string()]
        );
        assert_eq!(
            lib.resolve("ReportsQ1").unwrap(),
            vec![PathBuf::from("/a/1.pdf"), PathBuf::from("/a/2.docx")]
        );
    }

    #[tokio::test]
    async fn test_last_write_wins_on_name_collision() {
        let dir = TempDir::new().unwrap();
        let mut lib = library(dir.path()).await;
        lib.create_folder("A").await.unwrap();
        lib.create_folder("B").await.unwrap();
        lib.add_files("A", &[PathBuf::from("/old/report.pdf")]).await.unwrap();
        lib.add_files("B", &[PathBuf::from("/new/report.pdf")]).await.unwrap();

        assert_eq!(lib.resolve("A").unwrap(), vec![PathBuf::from("/new/report.pdf")]);
    }

    #[tokio::test]
    async fn test_unresolved_file_is_reported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("folders.txt"), "Stale: ghost.pdf\n").unwrap();
        let lib = library(dir.path()).await;

        match lib.resolve("Stale") {
            Err(PrinterError::FilePathUnresolved(name)) => assert_eq!(name, "ghost.pdf"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_mark_printed_renames_folder() {
        let dir = TempDir::new().unwrap();
        let mut lib = library(dir.path()).await;
        lib.create_folder("Invoices").await.unwrap();
        lib.add_files("Invoices", &[PathBuf::from("/x/inv.pdf")]).await.unwrap();

        let at = Local.with_ymd_and_hms(2030, 1, 2, 9, 30, 5).unwrap();
        let renamed = lib.mark_printed("Invoices", at).await.unwrap();
        assert_eq!(renamed.as_deref(), Some("Invoices (Printed at 2030-01-02 09:30:05)"));
        assert!(lib.folder("Invoices").is_none());
        assert_eq!(lib.folders()[0].files, vec!["inv.pdf".to_string()]);

        assert_eq!(lib.mark_printed("Invoices", at).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let dir = TempDir::new().unwrap();
        let mut lib = library(dir.path()).await;
        lib.create_folder("F").await.unwrap();
        lib.add_files("F", &[PathBuf::from("/p/a.txt"), PathBuf::from("/p/b.txt")])
            .await
            .unwrap();

        lib.remove_files("F", &["a.txt".to_string()]).await.unwrap();
        assert_eq!(lib.folder("F").unwrap().files, vec!["b.txt".to_string()]);
        assert!(lib.file_path("a.txt").is_none());

        lib.clear_folder("F").await.unwrap();
        assert!(lib.folder("F").unwrap().files.is_empty());
    }

    #[tokio::test]
    async fn test_export_copies_files() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src.txt");
        std::fs::write(&source, "hello").unwrap();

        let mut lib = library(dir.path()).await;
        lib.create_folder("Q1/final").await.unwrap();
        lib.add_files("Q1/final", &[source]).await.unwrap();

        let export = lib.export("Q1/final", &dir.path().join("out")).unwrap();
        assert!(!export.destination().exists());
        let out = export.run().await.unwrap();
        assert_eq!(out, dir.path().join("out").join("Q1_final"));
        assert_eq!(std::fs::read_to_string(out.join("src.txt")).unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_names_that_break_the_stores_are_rejected() {
        let dir = TempDir::new().unwrap();
        let mut lib = library(dir.path()).await;
        for bad in ["", "a: b", "a|b", "a\nb"] {
            assert!(matches!(
                lib.create_folder(bad).await,
                Err(PrinterError::InvalidName(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_paths_with_store_separators_are_rejected() {
        let dir = TempDir::new().unwrap();
        let mut lib = library(dir.path()).await;
        lib.create_folder("Q1").await.unwrap();

        for bad in ["/docs/Q1, final.pdf", "/docs/a|b.pdf", "/docs/note: draft.txt", "/do,cs/a.pdf"] {
            let result = lib.add_files("Q1", &[PathBuf::from("/docs/ok.pdf"), PathBuf::from(bad)]).await;
            assert!(matches!(result, Err(PrinterError::InvalidName(_))), "{} accepted", bad);
        }
        assert!(lib.folder("Q1").unwrap().files.is_empty());
        assert!(lib.file_path("ok.pdf").is_none());

        // a colon without the following space is fine
        lib.add_files("Q1", &[PathBuf::from("/docs/10:30 agenda.txt")]).await.unwrap();
        let reloaded = library(dir.path()).await;
        assert_eq!(reloaded.resolve("Q1").unwrap(), vec![PathBuf::from("/docs/10:30 agenda.txt")]);
    }

    #[tokio::test]
    async fn test_failed_save_leaves_library_unchanged() {
        let dir = TempDir::new().unwrap();
        let mut lib = library(dir.path()).await;
        lib.create_folder("Keep").await.unwrap();
        lib.add_files("Keep", &[PathBuf::from("/p/a.txt")]).await.unwrap();

        // a directory where the file-path store lives makes its writes fail
        std::fs::remove_file(dir.path().join("file_paths.txt")).unwrap();
        std::fs::create_dir(dir.path().join("file_paths.txt")).unwrap();

        let result = lib.add_files("Keep", &[PathBuf::from("/p/b.txt")]).await;
        assert!(matches!(result, Err(PrinterError::Persistence { .. })));
        assert_eq!(lib.folder("Keep").unwrap().files, vec!["a.txt".to_string()]);
        assert!(lib.file_path("b.txt").is_none());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("folders.txt")).unwrap().trim(),
            "Keep: a.txt"
        );

        // folder-only mutations are still all-or-nothing
        std::fs::remove_file(dir.path().join("folders.txt")).unwrap();
        std::fs::create_dir(dir.path().join("folders.txt")).unwrap();
        assert!(lib.create_folder("New").await.is_err());
        assert!(lib.delete_folder("Keep").await.is_err());
        assert_eq!(lib.folders().len(), 1);
        assert_eq!(lib.folders()[0].name, "Keep");
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("a/b\\c:d*e?f\"g<h>i|j"), "a_b_c_d_e_f_g_h_i_j");
    }
}
