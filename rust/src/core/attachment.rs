use std::path::Path;

use base64::Engine;

use crate::error::ChatError;
use crate::state::{MediaKind, StagedAttachment};

use super::*;

pub(crate) const MAX_ATTACHMENT_BYTES: u64 = 50 * 1024 * 1024;

const ALLOWED_MIME_TYPES: &[&str] = &[
    // Images
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    // Videos
    "video/mp4",
    "video/quicktime",
    "video/x-msvideo",
    "video/x-matroska",
];

/// Map a file extension to the MIME type a picker would report for it.
pub(crate) fn mime_type_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

fn mime_type_for_path(path: &Path) -> &'static str {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    mime_type_for_extension(ext)
}

pub(crate) fn media_kind_for_mime(mime_type: &str) -> Option<MediaKind> {
    if mime_type.starts_with("image/") {
        Some(MediaKind::Image)
    } else if mime_type.starts_with("video/") {
        Some(MediaKind::Video)
    } else {
        None
    }
}

/// Size and type gate applied before anything is staged or sent.
pub(crate) fn validate_attachment(size_bytes: u64, mime_type: &str) -> Result<MediaKind, ChatError> {
    if size_bytes > MAX_ATTACHMENT_BYTES {
        return Err(ChatError::validation("File too large (max 50 MB)"));
    }
    let mime = mime_type.trim().to_ascii_lowercase();
    if !ALLOWED_MIME_TYPES.contains(&mime.as_str()) {
        return Err(ChatError::validation(format!(
            "Unsupported file type: {}",
            if mime.is_empty() { "unknown" } else { &mime }
        )));
    }
    media_kind_for_mime(&mime)
        .ok_or_else(|| ChatError::validation(format!("Unsupported file type: {mime}")))
}

pub(crate) fn preview_data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!(
        "data:{mime_type};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// Inspect a picked file and build its staged form (without preview).
pub(crate) fn stage_attachment(
    path: &str,
    mime_type: Option<&str>,
) -> Result<StagedAttachment, ChatError> {
    let fs_path = Path::new(path);
    let meta = std::fs::metadata(fs_path)
        .map_err(|e| ChatError::validation(format!("Cannot read file: {e}")))?;
    if !meta.is_file() {
        return Err(ChatError::validation("Not a file"));
    }

    let mime_type = mime_type
        .map(|m| m.trim().to_ascii_lowercase())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| mime_type_for_path(fs_path).to_string());
    let kind = validate_attachment(meta.len(), &mime_type)?;

    let file_name = fs_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "attachment".to_string());

    Ok(StagedAttachment {
        path: path.to_string(),
        file_name,
        mime_type,
        size_bytes: meta.len(),
        kind,
        preview_data_url: None,
    })
}

impl AppCore {
    pub(super) fn select_attachment(&mut self, path: String, mime_type: Option<String>) {
        let staged = match stage_attachment(&path, mime_type.as_deref()) {
            Ok(staged) => staged,
            Err(e) => {
                // A rejected pick leaves whatever was staged before in place.
                tracing::info!(%e, "attachment rejected");
                self.state.composer.attachment_error = Some(e.to_string());
                self.emit_composer();
                return;
            }
        };

        self.stage_seq += 1;
        let stage_token = self.stage_seq;
        tracing::info!(
            stage_token,
            mime = %staged.mime_type,
            size = staged.size_bytes,
            "attachment staged"
        );

        let read_path = staged.path.clone();
        let mime = staged.mime_type.clone();
        self.state.composer.attachment = Some(staged);
        self.state.composer.attachment_error = None;
        self.state.busy.reading_attachment = true;
        self.emit_composer();

        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let result = tokio::fs::read(&read_path)
                .await
                .map(|bytes| preview_data_url(&mime, &bytes))
                .map_err(|e| ChatError::validation(format!("Cannot read file: {e}")));
            let _ = tx.send(CoreMsg::Internal(Box::new(
                InternalEvent::AttachmentPreviewReady {
                    stage_token,
                    result,
                },
            )));
        });
    }

    pub(super) fn clear_attachment(&mut self) {
        // Bumping the token orphans any preview still being computed.
        self.stage_seq += 1;
        let had_state = self.state.composer.attachment.is_some()
            || self.state.composer.attachment_error.is_some();
        self.state.composer.attachment = None;
        self.state.composer.attachment_error = None;
        self.set_busy(|b| b.reading_attachment = false);
        if had_state {
            self.emit_composer();
        }
    }

    pub(super) fn handle_attachment_preview_ready(
        &mut self,
        stage_token: u64,
        result: Result<String, ChatError>,
    ) {
        if stage_token != self.stage_seq {
            tracing::debug!(stage_token, "ignoring preview for replaced attachment");
            return;
        }
        self.set_busy(|b| b.reading_attachment = false);
        match result {
            Ok(data_url) => {
                if let Some(staged) = self.state.composer.attachment.as_mut() {
                    staged.preview_data_url = Some(data_url);
                    self.emit_composer();
                }
            }
            Err(e) => {
                tracing::warn!(%e, "attachment preview failed");
                self.state.composer.attachment = None;
                self.state.composer.attachment_error = Some(e.to_string());
                self.emit_composer();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_allowed_types_up_to_the_limit() {
        assert_eq!(
            validate_attachment(MAX_ATTACHMENT_BYTES, "image/png"),
            Ok(MediaKind::Image)
        );
        assert_eq!(validate_attachment(1, "video/x-matroska"), Ok(MediaKind::Video));
        assert_eq!(validate_attachment(1, "IMAGE/JPEG"), Ok(MediaKind::Image));
    }

    #[test]
    fn rejects_oversized_and_unlisted_types() {
        assert!(validate_attachment(MAX_ATTACHMENT_BYTES + 1, "image/png")
            .unwrap_err()
            .is_validation());
        assert!(validate_attachment(10, "application/pdf")
            .unwrap_err()
            .is_validation());
        assert!(validate_attachment(10, "video/webm").is_err());
        assert!(validate_attachment(10, "").is_err());
    }

    #[test]
    fn extension_mapping_feeds_validation() {
        assert_eq!(mime_type_for_extension("MOV"), "video/quicktime");
        assert_eq!(mime_type_for_extension("avi"), "video/x-msvideo");
        assert_eq!(mime_type_for_extension("zip"), "application/octet-stream");
    }

    #[test]
    fn preview_is_a_base64_data_url() {
        assert_eq!(preview_data_url("image/png", b"abc"), "data:image/png;base64,YWJj");
    }

    #[test]
    fn stage_infers_type_and_checks_size() {
        let dir = tempfile::tempdir().unwrap();

        let png = dir.path().join("photo.png");
        std::fs::write(&png, b"\x89PNG").unwrap();
        let staged = stage_attachment(png.to_str().unwrap(), None).unwrap();
        assert_eq!(staged.mime_type, "image/png");
        assert_eq!(staged.file_name, "photo.png");
        assert_eq!(staged.size_bytes, 4);
        assert_eq!(staged.kind, MediaKind::Image);

        let big = dir.path().join("big.mp4");
        let f = std::fs::File::create(&big).unwrap();
        f.set_len(MAX_ATTACHMENT_BYTES + 1).unwrap();
        assert!(stage_attachment(big.to_str().unwrap(), None).is_err());

        let pdf = dir.path().join("doc.pdf");
        std::fs::write(&pdf, b"%PDF").unwrap();
        assert!(stage_attachment(pdf.to_str().unwrap(), None).is_err());

        // Explicit type wins over the extension.
        let odd = dir.path().join("clip.bin");
        std::fs::write(&odd, b"....").unwrap();
        let staged = stage_attachment(odd.to_str().unwrap(), Some("video/mp4")).unwrap();
        assert_eq!(staged.kind, MediaKind::Video);
    }
}
