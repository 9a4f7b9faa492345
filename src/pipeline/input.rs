//! Input resolution: normalise a user-supplied path or URL to a local image,
//! list the images of a folder, and decode them.
//!
//! URL inputs are downloaded into a `TempDir` that lives as long as the
//! returned [`ResolvedInput`], so the file is cleaned up automatically when
//! processing finishes, even on early return.

use crate::config::ExtractionConfig;
use crate::error::InvoiceOcrError;
use futures::{Stream, StreamExt};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// The resolved input: either a local path or a downloaded temp file.
#[derive(Debug)]
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; image downloaded to a temp directory.
    /// The `TempDir` is kept alive to prevent cleanup until processing completes.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// Get the path to the image file regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// `true` when `filename` has an extension in `allowed` (case-insensitive).
pub fn is_allowed_image(filename: &str, allowed: &[String]) -> bool {
    match filename.rsplit_once('.') {
        Some((_, ext)) => {
            let ext = ext.to_lowercase();
            allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext))
        }
        None => false,
    }
}

fn check_allowed(name: &str, config: &ExtractionConfig) -> Result<(), InvoiceOcrError> {
    if is_allowed_image(name, &config.allowed_extensions) {
        Ok(())
    } else {
        Err(InvoiceOcrError::UnsupportedImageType {
            name: name.to_string(),
            allowed: config.allowed_extensions.join(", "),
        })
    }
}

/// Resolve the input string to a local image file path.
///
/// If the input is a URL, download it to a temporary directory.
/// If the input is a local file, validate it exists, is readable and has an
/// allowed image extension.
pub async fn resolve_input(
    input: &str,
    config: &ExtractionConfig,
) -> Result<ResolvedInput, InvoiceOcrError> {
    if is_url(input) {
        download_url(input, config).await
    } else {
        resolve_local(input, config)
    }
}

fn resolve_local(path_str: &str, config: &ExtractionConfig) -> Result<ResolvedInput, InvoiceOcrError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(InvoiceOcrError::FileNotFound { path });
    }
    if path.is_dir() {
        return Err(InvoiceOcrError::InvalidInput {
            input: path_str.to_string(),
        });
    }

    match std::fs::File::open(&path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(InvoiceOcrError::PermissionDenied { path });
        }
        Err(_) => return Err(InvoiceOcrError::FileNotFound { path }),
    }

    check_allowed(&display_name(&path), config)?;
    debug!("Resolved local image: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

/// Download a URL to a temporary directory and return the path.
async fn download_url(url: &str, config: &ExtractionConfig) -> Result<ResolvedInput, InvoiceOcrError> {
    info!("Downloading image from: {}", url);
    let timeout_secs = config.download_timeout_secs;

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| InvoiceOcrError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            InvoiceOcrError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            InvoiceOcrError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(InvoiceOcrError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let filename = extract_filename(url);

    if let Some(len) = response.content_length() {
        if len > config.max_input_bytes {
            return Err(InvoiceOcrError::InputTooLarge {
                name: filename,
                size: len,
                limit: config.max_input_bytes,
            });
        }
    }

    let bytes = read_capped(response.bytes_stream(), url, &filename, config.max_input_bytes).await?;

    let temp_dir = TempDir::new().map_err(|e| InvoiceOcrError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);
    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| InvoiceOcrError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded to: {}", file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Collect a download body, failing as soon as it grows past `limit`.
///
/// The `size` in the resulting `InputTooLarge` is the byte count read when
/// the cap was crossed, not the full body length.
async fn read_capped<S, B, E>(
    body: S,
    url: &str,
    name: &str,
    limit: u64,
) -> Result<Vec<u8>, InvoiceOcrError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut body = std::pin::pin!(body);
    let mut buf = Vec::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| InvoiceOcrError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let chunk = chunk.as_ref();
        let size = (buf.len() + chunk.len()) as u64;
        if size > limit {
            return Err(InvoiceOcrError::InputTooLarge {
                name: name.to_string(),
                size,
                limit,
            });
        }
        buf.extend_from_slice(chunk);
    }
    Ok(buf)
}

/// Extract a reasonable filename from the URL path.
///
/// Image URLs often carry no extension (CDN links, signed URLs); decoding
/// sniffs the format from the bytes, so the name only needs to be readable.
fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.img".to_string()
}

/// List the allowed images directly inside `dir`, sorted by file name.
pub fn list_images(dir: &Path, allowed: &[String]) -> Result<Vec<PathBuf>, InvoiceOcrError> {
    if !dir.exists() {
        return Err(InvoiceOcrError::FileNotFound {
            path: dir.to_path_buf(),
        });
    }
    if !dir.is_dir() {
        return Err(InvoiceOcrError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => InvoiceOcrError::PermissionDenied {
            path: dir.to_path_buf(),
        },
        _ => InvoiceOcrError::Internal(format!("read_dir {}: {}", dir.display(), e)),
    })?;

    let mut images: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.is_file())
        .filter(|p| is_allowed_image(&display_name(p), allowed))
        .collect();
    images.sort();

    debug!("Found {} images in {}", images.len(), dir.display());
    Ok(images)
}

/// Read and decode an image file, enforcing the size cap.
pub fn load_image(path: &Path, max_bytes: u64) -> Result<DynamicImage, InvoiceOcrError> {
    let name = display_name(path);
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => InvoiceOcrError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => InvoiceOcrError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => InvoiceOcrError::ImageDecode {
            name: name.clone(),
            detail: e.to_string(),
        },
    })?;
    if bytes.len() as u64 > max_bytes {
        return Err(InvoiceOcrError::InputTooLarge {
            name,
            size: bytes.len() as u64,
            limit: max_bytes,
        });
    }
    decode_image(&bytes, &name)
}

/// Decode in-memory bytes, sniffing the format from the content.
pub fn decode_image(bytes: &[u8], name: &str) -> Result<DynamicImage, InvoiceOcrError> {
    let img = image::load_from_memory(bytes).map_err(|e| InvoiceOcrError::ImageDecode {
        name: name.to_string(),
        detail: e.to_string(),
    })?;
    if img.width() == 0 || img.height() == 0 {
        return Err(InvoiceOcrError::InvalidDimensions(format!(
            "'{}' decoded to an empty {}x{} raster",
            name,
            img.width(),
            img.height()
        )));
    }
    Ok(img)
}

/// File name component for logs and results, falling back to the full path.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn allowed() -> Vec<String> {
        ExtractionConfig::default().allowed_extensions
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/invoice.jpg"));
        assert!(is_url("http://example.com/invoice.jpg"));
        assert!(!is_url("/tmp/invoice.jpg"));
        assert!(!is_url("invoice.jpg"));
        assert!(!is_url(""));
    }

    #[test]
    fn allowed_extensions_are_case_insensitive() {
        let allowed = allowed();
        assert!(is_allowed_image("scan.JPG", &allowed));
        assert!(is_allowed_image("a.b.webp", &allowed));
        assert!(!is_allowed_image("notes.txt", &allowed));
        assert!(!is_allowed_image("README", &allowed));
    }

    #[tokio::test]
    async fn download_body_is_capped_while_streaming() {
        let chunks: Vec<Result<Vec<u8>, String>> = vec![Ok(vec![0; 6]), Ok(vec![0; 6]), Ok(vec![0; 6])];
        let err = read_capped(futures::stream::iter(chunks), "https://x/a.png", "a.png", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, InvoiceOcrError::InputTooLarge { size: 12, limit: 10, .. }));

        let chunks: Vec<Result<Vec<u8>, String>> = vec![Ok(vec![1; 4]), Ok(vec![2; 6])];
        let body = read_capped(futures::stream::iter(chunks), "https://x/a.png", "a.png", 10)
            .await
            .unwrap();
        assert_eq!(body.len(), 10);
        assert_eq!(body[4], 2);
    }

    #[tokio::test]
    async fn download_stream_error_is_reported() {
        let chunks: Vec<Result<Vec<u8>, String>> = vec![Ok(vec![0; 2]), Err("connection reset".into())];
        let err = read_capped(futures::stream::iter(chunks), "https://x/a.png", "a.png", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, InvoiceOcrError::DownloadFailed { ref reason, .. } if reason == "connection reset"));
    }

    #[test]
    fn filename_from_url() {
        assert_eq!(extract_filename("https://cdn.test/x/hoa-don.png?sig=1"), "hoa-don.png");
        assert_eq!(extract_filename("https://cdn.test/x/abc"), "downloaded.img");
    }

    #[test]
    fn lists_only_images_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.jpg", "notes.txt", "c.JPEG"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();

        let names: Vec<String> = list_images(dir.path(), &allowed())
            .unwrap()
            .iter()
            .map(|p| display_name(p))
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.png", "c.JPEG"]);
    }

    #[test]
    fn listing_a_file_is_not_a_directory() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = list_images(file.path(), &allowed()).unwrap_err();
        assert!(matches!(err, InvoiceOcrError::NotADirectory { .. }));
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode_image(b"definitely not an image", "junk.png").unwrap_err();
        assert!(matches!(err, InvoiceOcrError::ImageDecode { .. }));
    }

    #[test]
    fn load_enforces_size_cap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.png");
        RgbImage::from_pixel(32, 32, Rgb([1, 2, 3])).save(&path).unwrap();
        let err = load_image(&path, 10).unwrap_err();
        assert!(matches!(err, InvoiceOcrError::InputTooLarge { .. }));
        assert_eq!(load_image(&path, u64::MAX).unwrap().width(), 32);
    }

    #[test]
    fn resolve_local_rejects_wrong_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoice.pdf");
        std::fs::write(&path, b"%PDF").unwrap();
        let err = resolve_local(path.to_str().unwrap(), &ExtractionConfig::default()).unwrap_err();
        assert!(matches!(err, InvoiceOcrError::UnsupportedImageType { .. }));
    }
}
