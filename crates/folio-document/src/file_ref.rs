//! Folio File References
//!
//! Four interchangeable ways of pointing a document field at an asset:
//! an external URL, a local path, an inline `data:` URI carrying the bytes,
//! or the id of a blob held in the large-object store.
//!
//! Stored documents keep the variant tag (`{"$file": "url", ...}`) so the
//! kind survives a round trip; printed documents use the plain form, where a
//! URL, path or data URI is just a string and a blob is `{blob_id: ...}`.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::blob::{BlobId, BlobStore};
use crate::types::Value;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use folio_common::{FolioError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Tag key of the persisted form. Reserved: user field names cannot start with `$`.
pub const FILE_TAG: &str = "$file";

const DATA_URI_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

// =============================================================================
// File Reference
// =============================================================================

/// A reference to an asset stored as a document field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "$file", rename_all = "snake_case")]
pub enum FileRef {
    /// External hyperlink.
    Url { href: String },
    /// Local path or name of an asset.
    Path { path: String },
    /// Inline bytes, base64 encoded.
    DataUri { mime: String, data: String },
    /// Bytes held in the large-object store.
    Blob { blob_id: BlobId },
}

impl FileRef {
    /// Name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Url { .. } => "url",
            Self::Path { .. } => "path",
            Self::DataUri { .. } => "data_uri",
            Self::Blob { .. } => "blob",
        }
    }

    pub fn blob_id(&self) -> Option<&BlobId> {
        match self {
            Self::Blob { blob_id } => Some(blob_id),
            _ => None,
        }
    }

    /// Render the plain field form.
    pub fn to_plain(&self) -> Value {
        match self {
            Self::Url { href } => Value::String(href.clone()),
            Self::Path { path } => Value::String(path.clone()),
            Self::DataUri { mime, data } => {
                Value::String(format!("{}{}{}{}", DATA_URI_PREFIX, mime, BASE64_MARKER, data))
            }
            Self::Blob { blob_id } => {
                let mut obj = BTreeMap::new();
                obj.insert("blob_id".to_string(), Value::String(blob_id.to_string()));
                Value::Object(obj)
            }
        }
    }

    /// Classify a plain field value back into a reference.
    ///
    /// Strings starting with `data:` must carry a base64 payload to be
    /// recognised; `http://` and `https://` strings are URLs; any other
    /// non-empty string is a path. An object is a blob reference only when
    /// `blob_id` is its sole field.
    pub fn from_plain(value: &Value) -> Option<Self> {
        match value {
            Value::FileRef(file) => Some(file.clone()),
            Value::String(s) if s.starts_with(DATA_URI_PREFIX) => parse_data_uri(s),
            Value::String(s) if s.starts_with("http://") || s.starts_with("https://") => {
                Some(Self::Url { href: s.clone() })
            }
            Value::String(s) if !s.is_empty() => Some(Self::Path { path: s.clone() }),
            Value::Object(obj) if obj.len() == 1 => match obj.get("blob_id") {
                Some(Value::String(id)) => Some(Self::Blob {
                    blob_id: BlobId::new(id.clone()),
                }),
                _ => None,
            },
            _ => None,
        }
    }

    /// Decode the inline payload of a data URI.
    pub fn inline_bytes(&self) -> Result<Option<Vec<u8>>> {
        match self {
            Self::DataUri { data, .. } => STANDARD
                .decode(data)
                .map(Some)
                .map_err(|e| FolioError::Serialization(format!("invalid base64 payload: {}", e))),
            _ => Ok(None),
        }
    }
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url { href } => write!(f, "{}", href),
            Self::Path { path } => write!(f, "{}", path),
            Self::DataUri { mime, data } => {
                write!(f, "{}{}{}{}", DATA_URI_PREFIX, mime, BASE64_MARKER, data)
            }
            Self::Blob { blob_id } => write!(f, "blob:{}", blob_id),
        }
    }
}

fn parse_data_uri(s: &str) -> Option<FileRef> {
    let rest = s.strip_prefix(DATA_URI_PREFIX)?;
    let (mime, data) = rest.split_once(BASE64_MARKER)?;
    Some(FileRef::DataUri {
        mime: mime.to_string(),
        data: data.to_string(),
    })
}

// =============================================================================
// Encoders
// =============================================================================

/// Reference an external hyperlink.
pub fn as_url(link: impl Into<String>) -> FileRef {
    FileRef::Url { href: link.into() }
}

/// Reference a local asset by path or name.
pub fn as_path(path: impl Into<String>) -> FileRef {
    FileRef::Path { path: path.into() }
}

/// Carry the asset bytes inline as `data:<mime>;base64,<payload>`.
pub fn as_data_uri(mime: &str, bytes: &[u8]) -> FileRef {
    FileRef::DataUri {
        mime: mime.to_string(),
        data: STANDARD.encode(bytes),
    }
}

/// Write the bytes to the blob store and reference them by the new id.
///
/// The reference only exists once the store has committed the blob, so a
/// failed write never yields a dangling id.
pub fn as_blob_ref(
    store: &dyn BlobStore,
    bytes: &[u8],
    filename: &str,
    mime: &str,
) -> Result<FileRef> {
    let meta = store.put(bytes, filename, mime)?;
    tracing::debug!(
        "Stored blob {} ({} bytes) for '{}'",
        meta.id,
        meta.length,
        filename
    );
    Ok(FileRef::Blob { blob_id: meta.id })
}

// =============================================================================
// Tests
// =============================================================================
