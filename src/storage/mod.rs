//! Flat on-disk storage for original uploads and converted artifacts
//!
//! Every component receives the same [`UploadStore`] handle instead of a
//! hard-coded path. File names are generated here and are unique per upload,
//! so no locking of the directory namespace is needed.

use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

const MAX_BASE_LEN: usize = 64;
const MAX_EXT_LEN: usize = 8;
const FALLBACK_BASE: &str = "image";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid file name: {0}")]
    InvalidFilename(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Name generated for one upload.
///
/// `stem` is `<sanitizedBase>-<uniqueToken>` and is shared by the original
/// and every artifact derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedName {
    pub stem: String,
    pub extension: Option<String>,
}

impl GeneratedName {
    pub fn file_name(&self) -> String {
        match &self.extension {
            Some(ext) => format!("{}.{}", self.stem, ext),
            None => self.stem.clone(),
        }
    }
}

/// An upload persisted to the storage directory
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: GeneratedName,
    pub path: PathBuf,
    pub size: u64,
    pub content_type: Option<String>,
}

impl UploadedFile {
    pub fn file_name(&self) -> String {
        self.name.file_name()
    }
}

/// Handle to the shared storage directory
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
    public_base_url: String,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the storage directory if it does not exist yet
    pub async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Generate a collision-free name from a client-supplied file name.
    ///
    /// Only the final path component of `original` is used. The unique token
    /// is a UUIDv7, so names sort by upload time and never repeat even when
    /// two uploads arrive within the same clock tick.
    pub fn generate_name(&self, original: Option<&str>, content_type: Option<&str>) -> GeneratedName {
        let (raw_base, raw_ext) = split_client_name(original.unwrap_or_default());

        let base = sanitize_base(raw_base);
        let extension = raw_ext
            .map(sanitize_extension)
            .filter(|ext| !ext.is_empty())
            .or_else(|| content_type.and_then(extension_for_content_type));

        GeneratedName {
            stem: format!("{}-{}", base, Uuid::now_v7().simple()),
            extension,
        }
    }

    /// Write an upload into the directory.
    ///
    /// Bytes go to a `.part` sibling first and are renamed into place, so a
    /// partially written original is never visible under its final name.
    pub async fn persist(
        &self,
        name: GeneratedName,
        data: Bytes,
        content_type: Option<String>,
    ) -> Result<UploadedFile> {
        self.ensure_dir().await?;

        let path = self.root.join(name.file_name());
        let tmp = part_path(&path);

        if let Err(err) = write_then_rename(&tmp, &path, &data).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(err.into());
        }

        tracing::info!(path = %path.display(), size = data.len(), "Persisted upload");

        Ok(UploadedFile {
            name,
            path,
            size: data.len() as u64,
            content_type,
        })
    }

    /// Resolve a client-supplied file name to a path directly inside the
    /// storage directory. Anything that could escape it is rejected.
    pub fn resolve(&self, filename: &str) -> Result<PathBuf> {
        validate_filename(filename)?;
        Ok(self.root.join(filename))
    }

    /// Open a stored file for reading, returning it with its size
    pub async fn open(&self, filename: &str) -> Result<(fs::File, u64)> {
        let path = self.resolve(filename)?;

        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(filename.to_string()));
            }
            Err(err) => return Err(err.into()),
        };

        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound(filename.to_string()));
        }

        Ok((file, metadata.len()))
    }

    /// Check whether a stored file currently exists
    pub async fn exists(&self, filename: &str) -> Result<bool> {
        let path = self.resolve(filename)?;
        match fs::metadata(&path).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Public path under which a stored file is served
    pub fn public_path(&self, filename: &str) -> String {
        format!("{}/uploads/{}", self.public_base_url, filename)
    }
}

/// Temporary sibling used while a file is being written
pub fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

async fn write_then_rename(tmp: &Path, dest: &Path, data: &[u8]) -> std::io::Result<()> {
    fs::write(tmp, data).await?;
    fs::rename(tmp, dest).await
}

fn validate_filename(filename: &str) -> Result<()> {
    let invalid = || StorageError::InvalidFilename(filename.to_string());

    if filename.is_empty()
        || filename.contains(['/', '\\', '\0'])
        || filename.split('.').all(str::is_empty)
        || filename.contains("..")
        || filename.chars().any(char::is_control)
    {
        return Err(invalid());
    }

    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(invalid()),
    }
}

/// Split a client file name into base and extension, keeping only the last
/// path component (both `/` and `\` count as separators).
fn split_client_name(original: &str) -> (&str, Option<&str>) {
    let file_name = original.rsplit(['/', '\\']).next().unwrap_or_default();

    match file_name.rsplit_once('.') {
        Some((base, ext)) if !base.is_empty() => (base, Some(ext)),
        _ => (file_name, None),
    }
}

fn sanitize_base(raw: &str) -> String {
    let sanitized: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(MAX_BASE_LEN)
        .collect();

    if sanitized.chars().all(|c| c == '_' || c == '-') {
        FALLBACK_BASE.to_string()
    } else {
        sanitized
    }
}

fn sanitize_extension(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .take(MAX_EXT_LEN)
        .collect()
}

fn extension_for_content_type(content_type: &str) -> Option<String> {
    let media_type: mime::Mime = content_type.parse().ok()?;
    if media_type.type_() != mime::IMAGE {
        return None;
    }

    let ext = match media_type.subtype().as_str() {
        "jpeg" | "jpg" | "pjpeg" => "jpg",
        "svg" => "svg",
        other => other,
    };

    let ext = sanitize_extension(ext);
    (!ext.is_empty()).then_some(ext)
}

/// Content type for a stored file, derived from its extension
pub fn content_type_for(filename: &str) -> mime::Mime {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => mime::IMAGE_JPEG,
        "png" => mime::IMAGE_PNG,
        "gif" => mime::IMAGE_GIF,
        "bmp" => mime::IMAGE_BMP,
        "svg" => mime::IMAGE_SVG,
        "webp" => "image/webp".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM),
        "avif" => "image/avif".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM),
        "tif" | "tiff" => "image/tiff".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM),
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}
