//! File validation rules
//!
//! Pure accept/reject decisions for uploads: extension denylist, category
//! detection by extension, category/MIME consistency and the size ceiling.
//! The lookup tables live in an immutable [`FileRules`] value that is built
//! once at start-up and shared by reference.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::MAX_FILE_SIZE_BYTES;

/// Extensions rejected regardless of declared category
const FORBIDDEN_EXTENSIONS: &[&str] = &[
    "exe", "bat", "cmd", "sh", "ps1", "js", "vbs", "jar", "php", "py", "rb",
];

const DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "txt", "rtf", "odt", "ppt", "pptx", "xls", "xlsx", "csv", "md", "json",
    "xml", "yaml", "yml",
];

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "gif", "bmp", "tiff", "tif", "svg", "ico", "heic",
];

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "mkv", "webm", "avi", "wmv", "flv", "m4v", "3gp",
];

const OTHER_EXTENSIONS: &[&str] = &[
    "zip", "rar", "7z", "tar", "gz", "psd", "ai", "figma", "blend", "obj", "stl", "log", "dat",
];

const DOCUMENT_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "text/plain",
    "application/rtf",
    "application/vnd.oasis.opendocument.text",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "text/csv",
    "text/markdown",
    "application/json",
    "application/xml",
    "text/xml",
    "application/x-yaml",
    "text/yaml",
];

const IMAGE_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/gif",
    "image/bmp",
    "image/tiff",
    "image/svg+xml",
    "image/x-icon",
    "image/heic",
];

const VIDEO_MIME_TYPES: &[&str] = &[
    "video/mp4",
    "video/quicktime",
    "video/x-matroska",
    "video/webm",
    "video/x-msvideo",
    "video/x-ms-wmv",
    "video/x-flv",
    "video/x-m4v",
    "video/3gpp",
];

const OTHER_MIME_TYPES: &[&str] = &[
    "application/zip",
    "application/x-rar-compressed",
    "application/x-7z-compressed",
    "application/x-tar",
    "application/gzip",
    "image/vnd.adobe.photoshop",
    "application/postscript",
    "application/octet-stream",
];

/// Attachment category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Document,
    Image,
    Video,
    Other,
}

impl Category {
    /// Lookup order for extension detection
    pub const ALL: [Category; 4] = [
        Category::Document,
        Category::Image,
        Category::Video,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Document => "document",
            Category::Image => "image",
            Category::Video => "video",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "document" | "documents" => Ok(Category::Document),
            "image" | "images" | "photo" | "photos" => Ok(Category::Image),
            "video" | "videos" => Ok(Category::Video),
            "other" | "others" => Ok(Category::Other),
            _ => Err(ValidationError::UnknownCategory(s.to_string())),
        }
    }
}

/// Reasons an upload is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please select a file.")]
    MissingFileName,

    #[error("Unsupported file type '{extension}'.")]
    UnsupportedType { extension: String },

    #[error("Files with extension '.{extension}' are not allowed for security reasons. Executable and script files are forbidden.")]
    ForbiddenExtension { extension: String },

    #[error("Invalid file type: {0}")]
    UnknownCategory(String),

    #[error("File extension .{extension} is not allowed for {declared} (detected {detected})")]
    CategoryMismatch {
        extension: String,
        declared: Category,
        detected: Category,
    },

    #[error("MIME type {content_type} is not allowed for {category}")]
    MimeMismatch {
        content_type: String,
        category: Category,
    },

    #[error("File is empty.")]
    EmptyFile,

    #[error("File size exceeds maximum allowed size of {}.", human_size(.limit))]
    TooLarge { size: u64, limit: u64 },
}

/// Immutable upload rule table
#[derive(Debug, Clone)]
pub struct FileRules {
    forbidden: HashSet<String>,
    extensions: HashMap<Category, HashSet<String>>,
    mime_types: HashMap<Category, HashSet<String>>,
    max_file_size: u64,
}

impl FileRules {
    /// The standard rule set
    pub fn standard() -> Self {
        let to_set = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<HashSet<_>>();

        let extensions = HashMap::from([
            (Category::Document, to_set(DOCUMENT_EXTENSIONS)),
            (Category::Image, to_set(IMAGE_EXTENSIONS)),
            (Category::Video, to_set(VIDEO_EXTENSIONS)),
            (Category::Other, to_set(OTHER_EXTENSIONS)),
        ]);

        let mime_types = HashMap::from([
            (Category::Document, to_set(DOCUMENT_MIME_TYPES)),
            (Category::Image, to_set(IMAGE_MIME_TYPES)),
            (Category::Video, to_set(VIDEO_MIME_TYPES)),
            (Category::Other, to_set(OTHER_MIME_TYPES)),
        ]);

        Self {
            forbidden: to_set(FORBIDDEN_EXTENSIONS),
            extensions,
            mime_types,
            max_file_size: MAX_FILE_SIZE_BYTES,
        }
    }

    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Check if the file's extension is on the denylist
    pub fn is_forbidden(&self, file_name: &str) -> bool {
        extension_of(file_name)
            .map(|ext| self.forbidden.contains(&ext))
            .unwrap_or(false)
    }

    /// Detect the category from the extension.
    ///
    /// Returns None for a missing, denylisted or unknown extension.
    pub fn detect_category(&self, file_name: &str) -> Option<Category> {
        let ext = extension_of(file_name)?;

        if self.forbidden.contains(&ext) {
            return None;
        }

        Category::ALL
            .into_iter()
            .find(|category| self.is_allowed_extension(&ext, *category))
    }

    pub fn is_allowed_extension(&self, extension: &str, category: Category) -> bool {
        let ext = extension.trim_start_matches('.').to_lowercase();
        self.extensions
            .get(&category)
            .map(|set| set.contains(&ext))
            .unwrap_or(false)
    }

    /// Exact match against the category's table. A blank type never matches.
    pub fn is_allowed_mime(&self, content_type: &str, category: Category) -> bool {
        let mime = normalize_mime(content_type);
        self.mime_types
            .get(&category)
            .map(|set| set.contains(&mime))
            .unwrap_or(false)
    }

    pub fn check_size(&self, size: u64) -> Result<(), ValidationError> {
        if size == 0 {
            return Err(ValidationError::EmptyFile);
        }
        if size > self.max_file_size {
            return Err(ValidationError::TooLarge {
                size,
                limit: self.max_file_size,
            });
        }
        Ok(())
    }

    /// Full upload check. Returns the detected category.
    ///
    /// The denylist is consulted before any category logic.
    pub fn validate(
        &self,
        file_name: &str,
        declared: Option<Category>,
        content_type: &str,
        size: u64,
    ) -> Result<Category, ValidationError> {
        if file_name.trim().is_empty() {
            return Err(ValidationError::MissingFileName);
        }

        let extension = extension_of(file_name).ok_or_else(|| ValidationError::UnsupportedType {
            extension: String::new(),
        })?;

        if self.forbidden.contains(&extension) {
            return Err(ValidationError::ForbiddenExtension { extension });
        }

        let detected = self
            .detect_category(file_name)
            .ok_or_else(|| ValidationError::UnsupportedType {
                extension: extension.clone(),
            })?;

        if let Some(declared) = declared {
            if declared != detected {
                return Err(ValidationError::CategoryMismatch {
                    extension,
                    declared,
                    detected,
                });
            }
        }

        if !self.is_allowed_mime(content_type, detected) {
            return Err(ValidationError::MimeMismatch {
                content_type: content_type.to_string(),
                category: detected,
            });
        }

        self.check_size(size)?;

        Ok(detected)
    }

    /// User-facing list of everything accepted
    pub fn supported_types_message(&self) -> String {
        let lines: Vec<String> = Category::ALL
            .iter()
            .map(|category| {
                let mut exts: Vec<&String> = self
                    .extensions
                    .get(category)
                    .map(|set| set.iter().collect())
                    .unwrap_or_default();
                exts.sort();
                let list = exts
                    .iter()
                    .map(|e| format!(".{}", e))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{}: {}", category.as_str().to_uppercase(), list)
            })
            .collect();

        format!("Supported file types:\n{}", lines.join("\n"))
    }
}

impl Default for FileRules {
    fn default() -> Self {
        Self::standard()
    }
}

/// Lowercased extension without the dot
pub fn extension_of(file_name: &str) -> Option<String> {
    // Some browsers send the full client path
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    Path::new(base)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| ext.to_lowercase())
}

fn normalize_mime(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase()
}

/// Human readable size, e.g. "1.5 KB" or "50 MB"
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    let mut len = bytes as f64;
    let mut order = 0;
    while len >= 1024.0 && order < UNITS.len() - 1 {
        order += 1;
        len /= 1024.0;
    }

    let number = format!("{:.2}", len);
    let number = number.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", number, UNITS[order])
}

fn human_size(bytes: &u64) -> String {
    format_file_size(*bytes)
}
