use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const JPEG_MIME: &str = "image/jpeg";

/// Writes artifacts into a local directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    dir: PathBuf,
}

impl FsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write `bytes` as `<dir>/<filename>`, creating the directory if needed.
    pub async fn write_artifact(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<PathBuf, StorageError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StorageError::CreateDir(self.dir.display().to_string(), e))?;

        let path = self.dir.join(filename);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StorageError::Write(path.display().to_string(), e))?;

        debug!(path = %path.display(), size = bytes.len(), "wrote artifact");
        Ok(path)
    }
}

/// Publishes finished artifacts into a shared pictures directory.
#[derive(Debug, Clone)]
pub struct DirectoryGallery {
    dir: PathBuf,
}

impl DirectoryGallery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Gallery rooted at the user's pictures directory, if the platform has one.
    pub fn user_pictures() -> Option<Self> {
        dirs::picture_dir().map(Self::new)
    }

    pub async fn publish(
        &self,
        path: &Path,
        filename: &str,
        mime_type: &str,
    ) -> Result<PathBuf, GalleryError> {
        if mime_type != JPEG_MIME {
            return Err(GalleryError::Unsupported(mime_type.to_string()));
        }
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| GalleryError::Copy(e.to_string()))?;
        let target = self.dir.join(filename);
        tokio::fs::copy(path, &target)
            .await
            .map_err(|e| GalleryError::Copy(e.to_string()))?;
        Ok(target)
    }
}

/// Where processed photos end up. The variant is chosen once at startup.
#[derive(Debug, Clone)]
pub enum PersistenceSink {
    FilesystemOnly(FsStore),
    FilesystemPlusGallery(FsStore, DirectoryGallery),
}

impl PersistenceSink {
    fn store(&self) -> &FsStore {
        match self {
            PersistenceSink::FilesystemOnly(store) => store,
            PersistenceSink::FilesystemPlusGallery(store, _) => store,
        }
    }

    pub async fn write_artifact(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<PathBuf, StorageError> {
        self.store().write_artifact(bytes, filename).await
    }

    /// Copy an already written artifact into the gallery.
    ///
    /// `FilesystemOnly` sinks have no gallery and report success without
    /// doing anything.
    pub async fn publish_to_gallery(
        &self,
        path: &Path,
        filename: &str,
        mime_type: &str,
    ) -> Result<(), GalleryError> {
        match self {
            PersistenceSink::FilesystemOnly(_) => {
                debug!(filename, "no gallery configured, skipping publish");
                Ok(())
            }
            PersistenceSink::FilesystemPlusGallery(_, gallery) => {
                let target = gallery.publish(path, filename, mime_type).await?;
                info!(path = %target.display(), "photo published to gallery");
                Ok(())
            }
        }
    }

    pub fn has_gallery(&self) -> bool {
        matches!(self, PersistenceSink::FilesystemPlusGallery(..))
    }
}

/// Build the sink from config. A requested gallery with no resolvable
/// directory degrades to filesystem only.
pub fn sink_from_config(
    output_dir: &Path,
    gallery_enabled: bool,
    gallery_dir: Option<&Path>,
) -> PersistenceSink {
    let store = FsStore::new(output_dir);
    if !gallery_enabled {
        return PersistenceSink::FilesystemOnly(store);
    }
    let gallery = match gallery_dir {
        Some(dir) => Some(DirectoryGallery::new(dir)),
        None => DirectoryGallery::user_pictures(),
    };
    match gallery {
        Some(gallery) => PersistenceSink::FilesystemPlusGallery(store, gallery),
        None => {
            warn!("gallery enabled but no pictures directory found, saving to filesystem only");
            PersistenceSink::FilesystemOnly(store)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to create output directory {0}: {1}")]
    CreateDir(String, std::io::Error),
    #[error("failed to write {0}: {1}")]
    Write(String, std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum GalleryError {
    #[error("gallery does not accept {0}")]
    Unsupported(String),
    #[error("failed to copy into gallery: {0}")]
    Copy(String),
}
