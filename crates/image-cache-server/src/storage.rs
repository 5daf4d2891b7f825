//! On-disk storage for uploaded originals and resized variants

use crate::error::{ImageServiceError, Result};
use chrono::Utc;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Directories holding original uploads and their resized variants
pub struct ImageStore {
    upload_dir: PathBuf,
    cache_dir: PathBuf,
}

impl ImageStore {
    pub fn new(upload_dir: PathBuf, cache_dir: PathBuf) -> Self {
        Self {
            upload_dir,
            cache_dir,
        }
    }

    /// Create the upload and cache directories if they do not exist
    pub async fn init(&self) -> Result<()> {
        for dir in [&self.upload_dir, &self.cache_dir] {
            fs::create_dir_all(dir).await?;
        }
        info!(upload_dir = ?self.upload_dir, cache_dir = ?self.cache_dir, "Image store initialized");
        Ok(())
    }

    pub fn original_path(&self, filename: &str) -> PathBuf {
        self.upload_dir.join(filename)
    }

    /// Path of a resized variant. Keeps the original extension so the
    /// encoder can be picked from it.
    pub fn variant_path(&self, filename: &str, width: u32, height: u32) -> PathBuf {
        self.cache_dir
            .join(format!("{}x{}_{}", width, height, filename))
    }

    /// Save an upload under a unique name, returning the stored filename
    pub async fn save_upload(&self, original_name: &str, data: &[u8]) -> Result<String> {
        let stored = format!(
            "{}_{}",
            Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            sanitize_upload_name(original_name)
        );

        let path = self.original_path(&stored);
        fs::write(&path, data).await.map_err(|e| {
            ImageServiceError::Upload(format!("writing {}: {}", path.display(), e))
        })?;

        debug!(filename = %stored, size = data.len(), "Saved upload");
        Ok(stored)
    }

    /// Whether an original upload exists
    pub async fn has_original(&self, filename: &str) -> bool {
        is_file(&self.original_path(filename)).await
    }

    /// Produce a `width`x`height` variant of an original, returning its path.
    ///
    /// A complete variant already on disk is reused without decoding the
    /// original.
    pub async fn resize(&self, filename: &str, width: u32, height: u32) -> Result<PathBuf> {
        let dst = self.variant_path(filename, width, height);
        let src = self.original_path(filename);
        let tmp_dir = self.cache_dir.clone();

        let out = dst.clone();
        let reused = tokio::task::spawn_blocking(move || {
            render_variant(&src, &out, &tmp_dir, width, height)
        })
        .await??;

        if reused {
            debug!(path = ?dst, "Reusing resized variant from disk");
        } else {
            debug!(filename, width, height, path = ?dst, "Resized image");
        }
        Ok(dst)
    }
}

/// Write the resized variant of `src` to `dst`, returning `true` when a
/// complete variant was already there.
///
/// The variant is encoded into a temporary file in `tmp_dir` and renamed
/// onto `dst`, so a file at `dst` is always fully written.
fn render_variant(
    src: &Path,
    dst: &Path,
    tmp_dir: &Path,
    width: u32,
    height: u32,
) -> Result<bool> {
    if image_dimensions(dst) == Some((width, height)) {
        return Ok(true);
    }

    // Sniff the format from the content; the stored name comes from the client.
    // An original that cannot be opened or decoded is treated as missing.
    let not_found = || ImageServiceError::NotFound("Image not found".into());
    let reader = ImageReader::open(src)
        .and_then(|r| r.with_guessed_format())
        .map_err(|_| not_found())?;
    let detected = reader.format();
    let img = reader.decode().map_err(|_| not_found())?;

    let format = ImageFormat::from_path(dst)
        .ok()
        .or(detected)
        .ok_or_else(|| {
            ImageServiceError::Processing(format!("No output format for {}", dst.display()))
        })?;

    let mut resized = img.resize_exact(width, height, FilterType::Lanczos3);
    if format == ImageFormat::Jpeg {
        // JPEG has no alpha channel
        resized = DynamicImage::ImageRgb8(resized.to_rgb8());
    }

    let mut tmp = tempfile::Builder::new()
        .prefix(".variant-")
        .tempfile_in(tmp_dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        resized.write_to(&mut writer, format)?;
        writer.flush()?;
    }
    // Dropping `tmp` on an error path above removes the partial file
    tmp.persist(dst).map_err(|e| ImageServiceError::from(e.error))?;

    Ok(false)
}

/// Dimensions from an image header, detecting the format from the content
fn image_dimensions(path: &Path) -> Option<(u32, u32)> {
    ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .ok()?
        .into_dimensions()
        .ok()
}

/// Reduce a client-supplied name to a single path component
fn sanitize_upload_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.trim().replace(char::is_whitespace, "_"))
        .filter(|n| !n.is_empty() && n != "..")
        .unwrap_or_else(|| "upload".to_string())
}

/// Reject filenames that could escape the storage directories
pub fn validate_filename(filename: &str) -> Result<&str> {
    let invalid = filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains(['/', '\\', '\0']);

    if invalid {
        return Err(ImageServiceError::BadRequest("Invalid filename".into()));
    }
    Ok(filename)
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Content type for a stored image, from its extension or else its content
pub fn content_type_for(path: &Path, data: &[u8]) -> &'static str {
    ImageFormat::from_path(path)
        .or_else(|_| image::guess_format(data))
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    fn create_store(root: &Path) -> ImageStore {
        ImageStore::new(root.join("uploads"), root.join("cache"))
    }

    fn write_png(path: &Path, width: u32, height: u32) {
        RgbImage::from_pixel(width, height, Rgb([200u8, 40, 40]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn test_sanitize_upload_name() {
        assert_eq!(sanitize_upload_name("cat.png"), "cat.png");
        assert_eq!(sanitize_upload_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_upload_name("my photo.jpg"), "my_photo.jpg");
        assert_eq!(sanitize_upload_name(""), "upload");
        assert_eq!(sanitize_upload_name(".."), "upload");
    }

    #[test]
    fn test_validate_filename() {
        assert!(validate_filename("123_cat.png").is_ok());
        assert!(validate_filename("").is_err());
        assert!(validate_filename("..").is_err());
        assert!(validate_filename("a/b.png").is_err());
        assert!(validate_filename("a\\b.png").is_err());
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut data = std::io::Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200u8, 40, 40])))
            .write_to(&mut data, ImageFormat::Png)
            .unwrap();
        data.into_inner()
    }

    fn decode_sniffed(path: &Path) -> DynamicImage {
        ImageReader::open(path)
            .unwrap()
            .with_guessed_format()
            .unwrap()
            .decode()
            .unwrap()
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(Path::new("a.png"), b""), "image/png");
        assert_eq!(content_type_for(Path::new("a.jpg"), b""), "image/jpeg");
        assert_eq!(
            content_type_for(Path::new("a.unknown"), b"plain text"),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_content_type_sniffed_without_extension() {
        let data = png_bytes(2, 2);
        assert_eq!(content_type_for(Path::new("123_photo"), &data), "image/png");
    }

    #[tokio::test]
    async fn test_init_creates_directories() {
        let dir = tempdir().unwrap();
        let store = create_store(dir.path());
        store.init().await.unwrap();

        assert!(dir.path().join("uploads").is_dir());
        assert!(dir.path().join("cache").is_dir());
    }

    #[tokio::test]
    async fn test_save_upload() {
        let dir = tempdir().unwrap();
        let store = create_store(dir.path());
        store.init().await.unwrap();

        let stored = store.save_upload("cat.png", b"not really a png").await.unwrap();

        assert!(stored.ends_with("_cat.png"));
        assert!(store.has_original(&stored).await);
        let data = std::fs::read(store.original_path(&stored)).unwrap();
        assert_eq!(data, b"not really a png");
    }

    #[tokio::test]
    async fn test_resize_writes_variant() {
        let dir = tempdir().unwrap();
        let store = create_store(dir.path());
        store.init().await.unwrap();
        write_png(&store.original_path("cat.png"), 20, 10);

        let path = store.resize("cat.png", 8, 4).await.unwrap();

        assert_eq!(path, store.variant_path("cat.png", 8, 4));
        let resized = image::open(&path).unwrap();
        assert_eq!((resized.width(), resized.height()), (8, 4));
    }

    #[tokio::test]
    async fn test_resize_reuses_variant_on_disk() {
        let dir = tempdir().unwrap();
        let store = create_store(dir.path());
        store.init().await.unwrap();
        write_png(&store.original_path("cat.png"), 20, 10);

        store.resize("cat.png", 8, 4).await.unwrap();
        // Without the original, only the variant on disk can satisfy this
        std::fs::remove_file(store.original_path("cat.png")).unwrap();

        assert!(store.resize("cat.png", 8, 4).await.is_ok());
    }

    #[tokio::test]
    async fn test_resize_extensionless_upload() {
        let dir = tempdir().unwrap();
        let store = create_store(dir.path());
        store.init().await.unwrap();
        std::fs::write(store.original_path("123_photo"), png_bytes(20, 10)).unwrap();

        let path = store.resize("123_photo", 8, 4).await.unwrap();

        // No extension on the variant either, so it keeps the detected format
        let data = std::fs::read(&path).unwrap();
        assert_eq!(image::guess_format(&data).unwrap(), ImageFormat::Png);
        let resized = decode_sniffed(&path);
        assert_eq!((resized.width(), resized.height()), (8, 4));
    }

    #[tokio::test]
    async fn test_resize_extension_mismatch() {
        let dir = tempdir().unwrap();
        let store = create_store(dir.path());
        store.init().await.unwrap();
        // PNG content under a JPEG name
        std::fs::write(store.original_path("photo.jpg"), png_bytes(20, 10)).unwrap();

        let path = store.resize("photo.jpg", 8, 4).await.unwrap();

        // The variant is encoded to match its name
        let data = std::fs::read(&path).unwrap();
        assert_eq!(image::guess_format(&data).unwrap(), ImageFormat::Jpeg);
        let resized = image::open(&path).unwrap();
        assert_eq!((resized.width(), resized.height()), (8, 4));
    }

    #[tokio::test]
    async fn test_resize_replaces_corrupt_variant() {
        let dir = tempdir().unwrap();
        let store = create_store(dir.path());
        store.init().await.unwrap();
        write_png(&store.original_path("cat.png"), 20, 10);
        std::fs::write(store.variant_path("cat.png", 8, 4), b"\x89PNG truncated").unwrap();

        let path = store.resize("cat.png", 8, 4).await.unwrap();

        let resized = image::open(&path).unwrap();
        assert_eq!((resized.width(), resized.height()), (8, 4));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_resize_never_exposes_partial_variant() {
        let dir = tempdir().unwrap();
        let store = std::sync::Arc::new(create_store(dir.path()));
        store.init().await.unwrap();
        write_png(&store.original_path("big.png"), 600, 600);

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(std::time::Duration::from_millis(i * 3)).await;
                    let path = store.resize("big.png", 500, 500).await.unwrap();
                    let data = tokio::fs::read(&path).await.unwrap();
                    let img = image::load_from_memory(&data).unwrap();
                    assert_eq!((img.width(), img.height()), (500, 500));
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        // Temporary files are renamed away or cleaned up
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("cache"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("500x500_big.png")]);
    }

    #[tokio::test]
    async fn test_resize_missing_original() {
        let dir = tempdir().unwrap();
        let store = create_store(dir.path());
        store.init().await.unwrap();

        let result = store.resize("missing.png", 8, 4).await;
        assert!(matches!(result, Err(ImageServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_resize_undecodable_original() {
        let dir = tempdir().unwrap();
        let store = create_store(dir.path());
        store.init().await.unwrap();
        std::fs::write(store.original_path("junk.png"), b"garbage").unwrap();

        let result = store.resize("junk.png", 8, 4).await;
        assert!(matches!(result, Err(ImageServiceError::NotFound(_))));
    }
}
