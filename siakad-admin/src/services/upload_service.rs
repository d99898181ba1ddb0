use std::io::ErrorKind;
use std::path::Path;

use tokio::io::AsyncWriteExt;

use siakad_shared::errors::{AppError, AppResult, ErrorCode};

/// Public URL prefix of the avatar directory.
pub const AVATAR_URL_PREFIX: &str = "/avatars";

/// File extension for an accepted avatar content type.
pub fn image_extension(content_type: &str) -> AppResult<&'static str> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "image/jpeg" | "image/jpg" => Ok("jpg"),
        "image/png" => Ok("png"),
        "image/webp" => Ok("webp"),
        _ => Err(AppError::new(
            ErrorCode::UnsupportedImageType,
            "Format gambar harus JPG, PNG, atau WEBP",
        )),
    }
}

pub fn check_size(len: usize, max_bytes: usize) -> AppResult<()> {
    if len == 0 {
        return Err(AppError::new(ErrorCode::UploadFailed, "File kosong"));
    }
    if len > max_bytes {
        return Err(AppError::new(
            ErrorCode::ImageTooLarge,
            format!("Ukuran gambar maksimal {} KB", max_bytes / 1024),
        ));
    }
    Ok(())
}

/// Names tried per upload before giving up.
const MAX_NAME_ATTEMPTS: u32 = 16;

/// `avatar-{millis}.{ext}`; later attempts in the same millisecond get a
/// `-{attempt}` suffix.
pub fn avatar_file_name(ext: &str, unix_millis: i64, attempt: u32) -> String {
    if attempt == 0 {
        format!("avatar-{unix_millis}.{ext}")
    } else {
        format!("avatar-{unix_millis}-{attempt}.{ext}")
    }
}

fn write_failed(e: std::io::Error, file_name: &str) -> AppError {
    tracing::error!(error = %e, file = %file_name, "failed to write avatar");
    AppError::new(ErrorCode::UploadFailed, "Gagal menyimpan file")
}

/// Write to a fresh file, never replacing an existing avatar.
async fn write_new_file(dir: &Path, ext: &str, bytes: &[u8], unix_millis: i64) -> AppResult<String> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let file_name = avatar_file_name(ext, unix_millis, attempt);
        let opened = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dir.join(&file_name))
            .await;
        let mut file = match opened {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(write_failed(e, &file_name)),
        };
        file.write_all(bytes).await.map_err(|e| write_failed(e, &file_name))?;
        file.flush().await.map_err(|e| write_failed(e, &file_name))?;
        return Ok(file_name);
    }
    Err(AppError::new(ErrorCode::UploadFailed, "Gagal menyimpan file, coba lagi"))
}

/// Validate and store an avatar, returning its public URL.
pub async fn save_avatar(
    dir: &Path,
    content_type: &str,
    bytes: &[u8],
    max_bytes: usize,
    unix_millis: i64,
) -> AppResult<String> {
    let ext = image_extension(content_type)?;
    check_size(bytes.len(), max_bytes)?;

    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        tracing::error!(error = %e, dir = %dir.display(), "failed to create avatar directory");
        AppError::new(ErrorCode::UploadFailed, "Gagal menyimpan file")
    })?;
    let file_name = write_new_file(dir, ext, bytes, unix_millis).await?;

    tracing::info!(file = %file_name, size = bytes.len(), "avatar uploaded");
    Ok(format!("{AVATAR_URL_PREFIX}/{file_name}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_types() {
        assert_eq!(image_extension("image/jpeg").unwrap(), "jpg");
        assert_eq!(image_extension("image/PNG").unwrap(), "png");
        assert_eq!(image_extension("image/webp; charset=binary").unwrap(), "webp");
    }

    #[test]
    fn other_types_rejected() {
        for ct in ["image/gif", "application/pdf", "text/html", ""] {
            let err = image_extension(ct).unwrap_err();
            assert_eq!(err.error_code(), ErrorCode::UnsupportedImageType);
        }
    }

    #[test]
    fn size_limit() {
        let max = 2 * 1024 * 1024;
        assert!(check_size(max, max).is_ok());
        assert_eq!(check_size(max + 1, max).unwrap_err().error_code(), ErrorCode::ImageTooLarge);
        assert_eq!(check_size(0, max).unwrap_err().error_code(), ErrorCode::UploadFailed);
    }

    #[test]
    fn timestamped_name() {
        assert_eq!(avatar_file_name("png", 1_720_000_000_123, 0), "avatar-1720000000123.png");
        assert_eq!(avatar_file_name("png", 1_720_000_000_123, 2), "avatar-1720000000123-2.png");
    }

    #[tokio::test]
    async fn saves_under_dir_and_returns_url() {
        let dir = std::env::temp_dir().join(format!("siakad-avatars-{}", uuid::Uuid::new_v4()));
        let url = save_avatar(&dir, "image/png", b"\x89PNG....", 1024, 42).await.unwrap();

        assert_eq!(url, "/avatars/avatar-42.png");
        let written = tokio::fs::read(dir.join("avatar-42.png")).await.unwrap();
        assert_eq!(written, b"\x89PNG....");
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn same_millisecond_uploads_keep_both_files() {
        let dir = std::env::temp_dir().join(format!("siakad-avatars-{}", uuid::Uuid::new_v4()));
        let first = save_avatar(&dir, "image/png", b"first", 1024, 7).await.unwrap();
        let second = save_avatar(&dir, "image/png", b"second", 1024, 7).await.unwrap();

        assert_eq!(first, "/avatars/avatar-7.png");
        assert_eq!(second, "/avatars/avatar-7-1.png");
        assert_eq!(tokio::fs::read(dir.join("avatar-7.png")).await.unwrap(), b"first");
        assert_eq!(tokio::fs::read(dir.join("avatar-7-1.png")).await.unwrap(), b"second");
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn rejected_upload_writes_nothing() {
        let dir = std::env::temp_dir().join(format!("siakad-avatars-{}", uuid::Uuid::new_v4()));
        assert!(save_avatar(&dir, "image/gif", b"GIF89a", 1024, 1).await.is_err());
        assert!(!dir.exists());
    }
}
