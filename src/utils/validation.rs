use anyhow::{Result, anyhow};

/// Longest stored filename in bytes
pub const MAX_FILENAME_LEN: usize = 255;

/// Longest extension carried over into a stored object name
const MAX_EXTENSION_LEN: usize = 10;

const GENERIC_CONTENT_TYPE: &str = "application/octet-stream";

/// Sanitizes a client supplied filename for storage and display.
///
/// Directory components are dropped, reserved and control characters become `_`,
/// leading dots are removed and the result is capped at [`MAX_FILENAME_LEN`].
pub fn sanitize_filename(filename: &str) -> Result<String> {
    // Get only the filename component, whichever separator the client used
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim()
        .trim_start_matches('.');

    if filename.contains("..") {
        tracing::warn!("Path traversal attempt detected: {}", filename);
    }

    if name.is_empty() {
        return Err(anyhow!("Filename cannot be empty"));
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|' | ';') {
                '_'
            } else {
                c
            }
        })
        .collect();

    // Limit length safely for UTF-8
    if sanitized.len() > MAX_FILENAME_LEN {
        let mut end = MAX_FILENAME_LEN;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        return Ok(sanitized[..end].to_string());
    }

    Ok(sanitized)
}

/// Lowercased extension suitable for an object name, if the filename has a sane one.
pub fn file_extension(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty()
        || ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Content type to store for an upload.
///
/// A declared type is kept unless it is missing or the generic octet-stream, in
/// which case the bytes are sniffed.
pub fn resolve_content_type(declared: Option<&str>, data: &[u8]) -> String {
    let declared = declared
        .map(|ct| ct.trim().to_lowercase())
        .filter(|ct| !ct.is_empty() && ct != GENERIC_CONTENT_TYPE);

    if let Some(ct) = declared {
        return ct;
    }

    infer::get(data)
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string())
}

/// Extension derived from the content itself, for uploads without a usable name.
pub fn sniffed_extension(data: &[u8]) -> Option<String> {
    infer::get(data).map(|kind| kind.extension().to_string())
}
