//! Sidecar readers for `.metadata`, `.content`, and `.pagedata` files.
//!
//! Grounded in the teacher's `remarkable::disk` module — same shape (a
//! `serde`-deserialized struct per sidecar, a `from_disk` constructor, a
//! `validate_path` helper to recognize the extension) adapted to the
//! blocking, single-pass ingestion this store requires instead of the
//! teacher's async/DashMap update path.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use uuid::Uuid;

use super::FileType;
use crate::error::{Error, Result};

pub const METADATA_EXTENSION: &str = "metadata";
pub const CONTENT_EXTENSION: &str = "content";
pub const PAGEDATA_EXTENSION: &str = "pagedata";

/// Extract the UUID preceding `.metadata` in a directory entry's filename.
pub fn uuid_from_metadata_path(path: &Path) -> Option<Uuid> {
    if path.extension()? != METADATA_EXTENSION {
        return None;
    }
    Uuid::from_str(&path.file_stem()?.to_string_lossy()).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub enum MetadataKind {
    #[serde(rename = "DocumentType")]
    Document,
    #[serde(rename = "CollectionType")]
    Collection,
}

/// Representation of `<src>/<uuid>.metadata`.
#[derive(Debug, serde::Deserialize)]
struct MetadataSidecar {
    #[serde(rename = "visibleName")]
    visible_name: String,
    #[serde(default, deserialize_with = "parent_uuid")]
    parent: Option<Uuid>,
    #[serde(rename = "type")]
    kind: MetadataKind,
    #[serde(default)]
    deleted: bool,
}

/// Parsed result of a `.metadata` sidecar, field names matching the File
/// record they feed.
pub struct Metadata {
    pub visible_name: String,
    pub parent: Option<Uuid>,
    pub kind: MetadataKind,
    pub deleted: bool,
}

pub fn read_metadata(source: &Path, uuid: Uuid) -> Result<Metadata> {
    let path = source.join(format!("{uuid}.{METADATA_EXTENSION}"));
    let raw = std::fs::read(&path)?;
    let sidecar: MetadataSidecar = serde_json::from_slice(&raw).map_err(|err| Error::BadStore {
        path: path.clone(),
        reason: err.to_string(),
    })?;

    Ok(Metadata {
        visible_name: sidecar.visible_name,
        parent: sidecar.parent,
        kind: sidecar.kind,
        deleted: sidecar.deleted,
    })
}

/// `parent` is either `""` (top-level) or a UUID string; an empty string
/// does not parse as a UUID, so it is mapped to `None` explicitly.
fn parent_uuid<'de, D>(deserializer: D) -> std::result::Result<Option<Uuid>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if raw.is_empty() {
        Ok(None)
    } else {
        Uuid::from_str(&raw).map(Some).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, serde::Deserialize)]
struct ContentSidecar {
    #[serde(rename = "fileType", default)]
    file_type: String,
    #[serde(default)]
    orientation: String,
    #[serde(default, rename = "pageCount")]
    page_count: usize,
    #[serde(default, rename = "dummyDocument")]
    dummy_document: bool,
    #[serde(default)]
    pages: Vec<Uuid>,
}

pub struct Content {
    pub filetype: FileType,
    pub landscape: bool,
    pub page_count: usize,
    pub dummy: bool,
    pub pages: Vec<Uuid>,
}

pub fn read_content(source: &Path, uuid: Uuid) -> Result<Content> {
    let path = source.join(format!("{uuid}.{CONTENT_EXTENSION}"));
    let raw = std::fs::read(&path)?;
    let sidecar: ContentSidecar = serde_json::from_slice(&raw).map_err(|err| Error::BadStore {
        path: path.clone(),
        reason: err.to_string(),
    })?;

    let filetype = match sidecar.file_type.as_str() {
        "notebook" => FileType::Notebook,
        "epub" => FileType::Epub,
        "pdf" => FileType::Pdf,
        _ => FileType::None,
    };

    Ok(Content {
        filetype,
        landscape: sidecar.orientation == "landscape",
        page_count: sidecar.page_count,
        dummy: sidecar.dummy_document,
        pages: sidecar.pages,
    })
}

/// Read `<src>/<uuid>.pagedata`: one template key per line, line k feeding
/// the kth page. A missing file yields no templates (every page keeps an
/// empty `template_name`); fewer lines than pages leaves the remainder
/// empty as well.
pub fn read_pagedata(source: &Path, uuid: Uuid, page_count: usize) -> Vec<String> {
    let path: PathBuf = source.join(format!("{uuid}.{PAGEDATA_EXTENSION}"));
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(_) => return Vec::new(),
    };

    raw.lines().take(page_count).map(str::to_owned).collect()
}
