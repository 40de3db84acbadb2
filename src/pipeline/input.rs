//! Image intake: turn a user-supplied path or URL into a [`SourceImage`].
//!
//! Statement images are small enough to hold in memory, so both local files
//! and downloads are read straight into a byte buffer. The mime type is
//! sniffed from magic bytes first and only falls back to the file extension,
//! because phone exports are frequently misnamed (`.jpg` holding HEIF/PNG).

use crate::error::ScanError;
use crate::model::SourceImage;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load one image from a local path or an http(s) URL.
pub async fn load_image(input: &str, timeout_secs: u64) -> Result<SourceImage, ScanError> {
    if input.trim().is_empty() {
        return Err(ScanError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_image(input, timeout_secs).await
    } else {
        load_local(Path::new(input)).await
    }
}

/// Load every input in order, stopping at the first unreadable one.
pub async fn load_images<S: AsRef<str>>(
    inputs: &[S],
    timeout_secs: u64,
) -> Result<Vec<SourceImage>, ScanError> {
    let mut images = Vec::with_capacity(inputs.len());
    for input in inputs {
        images.push(load_image(input.as_ref(), timeout_secs).await?);
    }
    Ok(images)
}

async fn load_local(path: &Path) -> Result<SourceImage, ScanError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => ScanError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => ScanError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "statement".to_string());
    let mime = detect_mime(&bytes, Some(path));
    debug!("Loaded {} ({}, {} bytes)", path.display(), mime, bytes.len());

    Ok(SourceImage::new(name, mime, bytes))
}

async fn download_image(url: &str, timeout_secs: u64) -> Result<SourceImage, ScanError> {
    info!("Downloading image from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ScanError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ScanError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    if !response.status().is_success() {
        return Err(ScanError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let name = filename_from_url(url);
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ScanError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?
        .to_vec();

    let mime = detect_mime(&bytes, Some(&PathBuf::from(&name)));
    Ok(SourceImage::new(name, mime, bytes))
}

/// Last non-empty path segment of a URL, or a generic name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() {
                    return last.to_string();
                }
            }
        }
    }
    "statement".to_string()
}

/// Sniff the mime type from magic bytes, falling back to the extension.
pub fn detect_mime(bytes: &[u8], path: Option<&Path>) -> &'static str {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"\xFF\xD8\xFF", "image/jpeg"),
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"BM", "image/bmp"),
        (b"II*\0", "image/tiff"),
        (b"MM\0*", "image/tiff"),
        (b"%PDF", "application/pdf"),
    ];
    for (magic, mime) in SIGNATURES {
        if bytes.starts_with(magic) {
            return mime;
        }
    }
    if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return "image/webp";
    }
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        match &bytes[8..12] {
            b"heic" | b"heix" | b"hevc" | b"heim" | b"heis" => return "image/heic",
            b"mif1" | b"msf1" => return "image/heif",
            _ => {}
        }
    }

    let ext = path
        .and_then(|p| p.extension())
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("tif" | "tiff") => "image/tiff",
        Some("heic") => "image/heic",
        Some("heif") => "image/heif",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/statement.jpg"));
        assert!(is_url("http://example.com/statement.jpg"));
        assert!(!is_url("/tmp/statement.jpg"));
        assert!(!is_url(""));
    }

    #[test]
    fn sniffs_magic_before_extension() {
        let png = b"\x89PNG\r\n\x1a\n rest";
        assert_eq!(detect_mime(png, Some(Path::new("photo.jpg"))), "image/png");
        assert_eq!(detect_mime(b"%PDF-1.7", None), "application/pdf");
        assert_eq!(detect_mime(b"RIFF\0\0\0\0WEBPVP8 ", None), "image/webp");
    }

    #[test]
    fn falls_back_to_extension() {
        assert_eq!(detect_mime(b"????", Some(Path::new("IMG_1.HEIC"))), "image/heic");
        assert_eq!(detect_mime(b"\0\0\0\x18ftypheic\0\0\0\0", None), "image/heic");
        assert_eq!(detect_mime(b"\0\0\0\x18ftypmif1\0\0\0\0", None), "image/heif");
        assert_eq!(detect_mime(b"????", None), "application/octet-stream");
    }

    #[test]
    fn filename_from_url_uses_last_segment() {
        assert_eq!(filename_from_url("https://x.test/a/b/scan.png?x=1"), "scan.png");
        assert_eq!(filename_from_url("https://x.test/"), "statement");
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let err = load_image("/definitely/not/here.jpg", 5).await.unwrap_err();
        assert!(matches!(err, ScanError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn loads_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page1.jpg");
        std::fs::write(&path, b"\xFF\xD8\xFF\xE0data").unwrap();

        let img = load_image(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(img.name, "page1.jpg");
        assert_eq!(img.mime_type, "image/jpeg");
        assert_eq!(img.original_size(), 8);
    }
}
