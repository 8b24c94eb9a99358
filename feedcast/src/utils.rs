use sha2::{Digest, Sha256};
use std::path::{Component, Path};

/// MIME type for an audio file, by extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("m4a") => "audio/mp4",
        Some("ogg") => "audio/ogg",
        _ => "application/octet-stream",
    }
}

pub fn is_audio_file(path: &Path) -> bool {
    content_type_for(path).starts_with("audio/")
}

/// Blob key for a local file: its path relative to `work_dir` when it lives
/// there, otherwise just the file name, with `prefix` prepended.
pub fn derive_blob_key(path: &Path, work_dir: &Path, prefix: &str) -> String {
    let relative = path.strip_prefix(work_dir).ok().filter(|rel| {
        rel.components().all(|c| matches!(c, Component::Normal(_)))
    });

    let key = match relative {
        Some(rel) => rel
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .collect::<Vec<_>>()
            .join("/"),
        None => path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("artifact")
            .to_string(),
    };

    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        key
    } else {
        format!("{}/{}", prefix, key)
    }
}

/// Make an item identifier safe to use as a file name.
pub fn sanitize_id(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();

    if cleaned.is_empty() {
        "item".to_string()
    } else {
        cleaned
    }
}

/// File stem for an item's scratch files. Identifiers that sanitizing
/// changes get a digest of the raw id appended, so `a/b` and `a_b` never
/// share a file. Unchanged ids contain no `.`, which keeps the two forms apart.
pub fn scratch_stem(id: &str) -> String {
    let cleaned = sanitize_id(id);
    if cleaned == id {
        return cleaned;
    }

    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{}.{}", cleaned, &digest[..12])
}
