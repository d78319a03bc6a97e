//! Built-in table of accepted upload types.

use std::collections::HashMap;

use crate::collab::UploadTypeRegistry;
use crate::types::UploadType;

/// Extensions (pipe-separated aliases) and the MIME type stored for them.
const DEFAULT_TYPES: &[(&str, &str)] = &[
    // Images
    ("jpg|jpeg|jpe", "image/jpeg"),
    ("gif", "image/gif"),
    ("png", "image/png"),
    ("bmp", "image/bmp"),
    ("tif|tiff", "image/tiff"),
    ("ico", "image/x-icon"),
    ("webp", "image/webp"),
    // Video
    ("asf|asx", "video/x-ms-asf"),
    ("wmv", "video/x-ms-wmv"),
    ("avi", "video/avi"),
    ("mov|qt", "video/quicktime"),
    ("mpeg|mpg|mpe", "video/mpeg"),
    ("mp4|m4v", "video/mp4"),
    ("ogv", "video/ogg"),
    ("webm", "video/webm"),
    ("3gp|3gpp", "video/3gpp"),
    ("3g2|3gp2", "video/3gpp2"),
    // Text
    ("txt|asc|c|cc|h|srt", "text/plain"),
    ("csv", "text/csv"),
    ("rtx", "text/richtext"),
    // Audio
    ("mp3|m4a|m4b", "audio/mpeg"),
    ("ra|ram", "audio/x-realaudio"),
    ("wav", "audio/wav"),
    ("ogg|oga", "audio/ogg"),
    ("mid|midi", "audio/midi"),
    ("wma", "audio/x-ms-wma"),
    // Documents
    ("rtf", "application/rtf"),
    ("pdf", "application/pdf"),
    ("doc", "application/msword"),
    ("pot|pps|ppt", "application/vnd.ms-powerpoint"),
    ("xla|xls|xlt|xlw", "application/vnd.ms-excel"),
    ("docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
    ("xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
    ("pptx", "application/vnd.openxmlformats-officedocument.presentationml.presentation"),
    ("ppsx", "application/vnd.openxmlformats-officedocument.presentationml.slideshow"),
    ("odt", "application/vnd.oasis.opendocument.text"),
    ("ods", "application/vnd.oasis.opendocument.spreadsheet"),
    ("odp", "application/vnd.oasis.opendocument.presentation"),
    ("zip", "application/zip"),
    ("gz|gzip", "application/x-gzip"),
];

/// An [`UploadTypeRegistry`] backed by an in-memory extension table.
#[derive(Debug, Clone)]
pub struct StaticUploadTypes {
    by_extension: HashMap<String, String>,
}

impl StaticUploadTypes {
    /// Registry with the built-in media and document types.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for (extensions, mime) in DEFAULT_TYPES {
            for ext in extensions.split('|') {
                registry.by_extension.insert(ext.to_string(), (*mime).to_string());
            }
        }
        registry
    }

    /// Registry that accepts nothing until types are added.
    pub fn empty() -> Self {
        Self {
            by_extension: HashMap::new(),
        }
    }

    /// Accept `extension` (case-insensitive) as `mime_type`.
    pub fn with_type(mut self, extension: &str, mime_type: &str) -> Self {
        self.by_extension
            .insert(extension.to_ascii_lowercase(), mime_type.to_string());
        self
    }
}

impl Default for StaticUploadTypes {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadTypeRegistry for StaticUploadTypes {
    fn check(&self, file_name: &str) -> Option<UploadType> {
        let (_, ext) = file_name.rsplit_once('.')?;
        if ext.is_empty() {
            return None;
        }
        let ext = ext.to_ascii_lowercase();
        let mime = self.by_extension.get(&ext)?;
        if mime.is_empty() {
            return None;
        }
        Some(UploadType {
            extension: ext,
            mime_type: mime.clone(),
        })
    }
}
