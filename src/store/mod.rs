//! Ingestion of the flat, UUID-keyed reMarkable store into [`File`] records.
//!
//! Mirrors `remfs_list`/`parse_meta`/`parse_content`/`parse_pagedata` from
//! the original `remarkable_fuse` C sources, generalized from the teacher's
//! `remarkable::disk` sidecar readers.

pub mod disk;

use std::path::{Path, PathBuf};

use itertools::Itertools;
use uuid::Uuid;

/// Discriminates collections (folders) from documents (leaves with content).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Document,
    Collection,
}

/// The document's content format, or `None` for anything that isn't a
/// recognized `fileType`. `Page` is used only for synthesized page records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Notebook,
    Epub,
    Pdf,
    Page,
    None,
}

impl FileType {
    /// Backing-path extension for a non-page document; empty for Notebook
    /// (whose backing path is the per-document pages subdirectory) and for
    /// `None`.
    pub fn extension(&self) -> &'static str {
        match self {
            FileType::Epub => ".epub",
            FileType::Pdf => ".pdf",
            FileType::Page => ".rm",
            FileType::Notebook | FileType::None => "",
        }
    }
}

/// One ingested record: a collection, a document, or a synthesized page.
#[derive(Debug, Clone)]
pub struct File {
    pub uuid: Uuid,
    pub parent_uuid: Option<Uuid>,
    pub visible_name: String,
    pub template_name: String,
    pub kind: Kind,
    pub filetype: FileType,
    pub landscape: bool,
    pub page_count: usize,
    pub deleted: bool,
    pub dummy: bool,
}

impl File {
    fn collection(uuid: Uuid, parent_uuid: Option<Uuid>, visible_name: String, deleted: bool) -> Self {
        File {
            uuid,
            parent_uuid,
            visible_name,
            template_name: String::new(),
            kind: Kind::Collection,
            filetype: FileType::None,
            landscape: false,
            page_count: 0,
            deleted,
            dummy: false,
        }
    }
}

/// Read every `.metadata` entry under `source` into a flat sequence of
/// records, expanding each document's `pages` array into synthesized Page
/// children. Any sidecar that fails to open or parse demotes just that
/// record (or its pages); ingestion never aborts on a single bad entry.
pub fn ingest(source: &Path) -> Vec<File> {
    let mut files = Vec::new();

    let entries = match std::fs::read_dir(source) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::error!("failed to read store directory {source:?}: {err}");
            return files;
        }
    };

    // `read_dir` order isn't guaranteed; sort by path so ingestion (and
    // therefore page enumeration order, which `BTreeMap` alone won't fix
    // since it keys by UUID, not filename) is reproducible across runs.
    let paths = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(err) => {
                tracing::warn!("couldn't read directory entry: {err}");
                None
            }
        })
        .sorted();

    for path in paths {
        let Some(uuid) = disk::uuid_from_metadata_path(&path) else {
            continue;
        };

        let meta = match disk::read_metadata(source, uuid) {
            Ok(meta) => meta,
            Err(err) => {
                tracing::warn!("demoting {uuid}: {err}");
                continue;
            }
        };

        match meta.kind {
            disk::MetadataKind::Collection => {
                files.push(File::collection(uuid, meta.parent, meta.visible_name, meta.deleted));
            }
            disk::MetadataKind::Document => {
                let content = match disk::read_content(source, uuid) {
                    Ok(content) => content,
                    Err(err) => {
                        tracing::warn!("demoting document {uuid}: {err}");
                        continue;
                    }
                };

                files.push(File {
                    uuid,
                    parent_uuid: meta.parent,
                    visible_name: meta.visible_name,
                    template_name: String::new(),
                    kind: Kind::Document,
                    filetype: content.filetype,
                    landscape: content.landscape,
                    page_count: content.page_count,
                    deleted: meta.deleted,
                    dummy: content.dummy,
                });

                // The pages array, not the (possibly stale) `pageCount`
                // field, is what's actually being synthesized into Page
                // records here, so pagedata is bounded by its length.
                let templates = disk::read_pagedata(source, uuid, content.pages.len());

                for (index, page_uuid) in content.pages.into_iter().enumerate() {
                    files.push(File {
                        uuid: page_uuid,
                        parent_uuid: Some(uuid),
                        visible_name: format!("page_{:06}.rm", index + 1),
                        template_name: templates.get(index).cloned().unwrap_or_default(),
                        kind: Kind::Document,
                        filetype: FileType::Page,
                        landscape: content.landscape,
                        page_count: 1,
                        deleted: meta.deleted,
                        dummy: content.dummy,
                    });
                }
            }
        }
    }

    tracing::info!("ingested {} records from {source:?}", files.len());
    files
}

/// The directory entry a non-collection record is backed by at mount time.
pub fn backing_probe_path(source: &Path, file: &File) -> PathBuf {
    match file.filetype {
        FileType::Page => source
            .join(file.parent_uuid.map(|u| u.to_string()).unwrap_or_default())
            .join(format!("{}.rm", file.uuid)),
        _ => source.join(format!("{}.metadata", file.uuid)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, uuid: Uuid, ext: &str, body: &str) {
        fs::write(dir.join(format!("{uuid}.{ext}")), body).unwrap();
    }

    #[test]
    fn ingests_a_collection_and_a_pdf_with_an_annotation_directory() {
        let dir = tempfile::tempdir().unwrap();
        let collection = Uuid::new_v4();
        let pdf = Uuid::new_v4();
        let page = Uuid::new_v4();

        write(
            dir.path(),
            collection,
            "metadata",
            r#"{"visibleName":"Books","parent":"","type":"CollectionType","deleted":false}"#,
        );
        write(
            dir.path(),
            pdf,
            "metadata",
            &format!(r#"{{"visibleName":"Book1","parent":"{collection}","type":"DocumentType","deleted":false}}"#),
        );
        write(
            dir.path(),
            pdf,
            "content",
            &format!(r#"{{"fileType":"pdf","orientation":"portrait","pageCount":1,"pages":["{page}"]}}"#),
        );
        fs::write(dir.path().join(format!("{pdf}.pdf")), b"%PDF-1.4").unwrap();

        let files = ingest(dir.path());
        let collection_file = files.iter().find(|f| f.uuid == collection).unwrap();
        assert_eq!(collection_file.kind, Kind::Collection);

        let pdf_file = files.iter().find(|f| f.uuid == pdf).unwrap();
        assert_eq!(pdf_file.filetype, FileType::Pdf);
        assert_eq!(pdf_file.page_count, 1);

        let page_file = files.iter().find(|f| f.uuid == page).unwrap();
        assert_eq!(page_file.filetype, FileType::Page);
        assert_eq!(page_file.parent_uuid, Some(pdf));
        assert_eq!(page_file.visible_name, "page_000001.rm");
    }

    #[test]
    fn page_count_is_read_from_the_sidecar_field_not_derived_from_the_pages_array() {
        let dir = tempfile::tempdir().unwrap();
        let notebook = Uuid::new_v4();
        let page = Uuid::new_v4();

        write(
            dir.path(),
            notebook,
            "metadata",
            r#"{"visibleName":"Daily","parent":"","type":"DocumentType","deleted":false}"#,
        );
        // A dummy document whose `pageCount` hasn't caught up with its
        // (shorter) `pages` array.
        write(
            dir.path(),
            notebook,
            "content",
            &format!(r#"{{"fileType":"notebook","orientation":"portrait","pageCount":3,"dummyDocument":true,"pages":["{page}"]}}"#),
        );

        let files = ingest(dir.path());
        let notebook_file = files.iter().find(|f| f.uuid == notebook).unwrap();
        assert_eq!(notebook_file.page_count, 3);
        assert_eq!(files.iter().filter(|f| f.parent_uuid == Some(notebook)).count(), 1);
    }

    #[test]
    fn a_malformed_sidecar_demotes_only_its_own_record() {
        let dir = tempfile::tempdir().unwrap();
        let good = Uuid::new_v4();
        let bad = Uuid::new_v4();

        write(
            dir.path(),
            good,
            "metadata",
            r#"{"visibleName":"Good","parent":"","type":"CollectionType","deleted":false}"#,
        );
        write(dir.path(), bad, "metadata", "not json");

        let files = ingest(dir.path());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].uuid, good);
    }

    #[test]
    fn backing_probe_path_for_a_page_points_at_the_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let parent = Uuid::new_v4();
        let page = Uuid::new_v4();
        let file = File {
            uuid: page,
            parent_uuid: Some(parent),
            visible_name: "page_000001.rm".to_string(),
            template_name: String::new(),
            kind: Kind::Document,
            filetype: FileType::Page,
            landscape: false,
            page_count: 1,
            deleted: false,
            dummy: false,
        };
        assert_eq!(
            backing_probe_path(dir.path(), &file),
            dir.path().join(parent.to_string()).join(format!("{page}.rm"))
        );
    }
}
