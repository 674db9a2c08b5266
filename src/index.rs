//! The bidirectional index between UUIDs, virtual paths, and backing
//! artifacts, built once at mount from the flat sequence [`crate::store`]
//! produces.
//!
//! Generalizes the teacher's `Remarkable` (`remarkable/mod.rs`) — same
//! UUID-keyed map over `Arc<Element>` records — into the ordered-map,
//! virtual-path-keyed shape this store's resolver needs, plus the
//! explicit child-listing pass the teacher leaves implicit in its
//! `Parent` comparisons.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use crate::store::{self, File, Kind};

/// One live, backed record: its [`File`], its absolute virtual path, and
/// the ordered UUIDs of its children (non-empty only for collections and
/// for notebook/Pdf/Epub documents that carry pages).
#[derive(Debug)]
pub struct IndexNode {
    pub file: File,
    pub virtual_path: String,
    pub children: Vec<Uuid>,
}

#[derive(Debug)]
pub struct NameIndex {
    source: PathBuf,
    by_uuid: BTreeMap<Uuid, Arc<IndexNode>>,
    by_path: BTreeMap<String, Arc<IndexNode>>,
    root: Vec<Uuid>,
}

impl NameIndex {
    /// Ingest `source` and build the UUID index, the virtual-path index,
    /// and the child-listing map in the three passes the design doc
    /// specifies.
    pub fn build(source: &Path) -> Self {
        let files = store::ingest(source);
        Self::from_files(source, files)
    }

    pub(crate) fn from_files(source: &Path, files: Vec<File>) -> Self {
        // Source-enumeration order, kept alongside the UUID-keyed map: the
        // map gives O(log n) lookups, but child-listing order (§4.2 Pass 3)
        // must mirror the order `store::ingest` pushed records in, which a
        // `BTreeMap`'s ascending-UUID iteration does not.
        let order: Vec<Uuid> = files.iter().map(|file| file.uuid).collect();
        let mut by_file: BTreeMap<Uuid, File> = BTreeMap::new();
        for file in files {
            by_file.insert(file.uuid, file);
        }

        // Pass 1: keep only non-deleted records whose backing artifact
        // exists on disk at mount time, preserving enumeration order.
        let mut live: BTreeMap<Uuid, File> = BTreeMap::new();
        let mut live_order: Vec<Uuid> = Vec::new();
        for uuid in &order {
            let Some(file) = by_file.get(uuid) else { continue };
            if file.deleted {
                continue;
            }
            let probe = store::backing_probe_path(source, file);
            if probe.exists() {
                live.insert(*uuid, file.clone());
                live_order.push(*uuid);
            } else {
                tracing::debug!("no backing artifact for {uuid} at {probe:?}, dropping");
            }
        }

        // Pass 2: compute each node's virtual path by walking parent
        // links upward. The walk stops silently at a missing ancestor
        // (orphans are anchored wherever the walk truncates, per the
        // design doc's decision on the open question).
        let mut virtual_paths: BTreeMap<Uuid, String> = BTreeMap::new();
        for uuid in live.keys() {
            virtual_paths.insert(*uuid, virtual_path_of(*uuid, &live));
        }

        // Pass 3: append each node to its parent's child list, or to the
        // root bucket when it has no parent. Walking `live_order` instead
        // of the `live` map keeps children lists in source enumeration
        // order, matching the Data Model's ordering invariant.
        let mut children: BTreeMap<Uuid, Vec<Uuid>> = BTreeMap::new();
        let mut root = Vec::new();
        for uuid in &live_order {
            let file = &live[uuid];
            match file.parent_uuid {
                Some(parent) if live.contains_key(&parent) => {
                    children.entry(parent).or_default().push(*uuid);
                }
                _ => root.push(*uuid),
            }
        }

        let mut by_uuid = BTreeMap::new();
        let mut by_path = BTreeMap::new();
        for (uuid, file) in live {
            let node = Arc::new(IndexNode {
                virtual_path: virtual_paths.remove(&uuid).unwrap_or_default(),
                children: children.remove(&uuid).unwrap_or_default(),
                file,
            });
            by_path.insert(node.virtual_path.clone(), node.clone());
            by_uuid.insert(uuid, node);
        }

        NameIndex {
            source: source.to_path_buf(),
            by_uuid,
            by_path,
            root,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn by_uuid(&self, uuid: &Uuid) -> Option<&Arc<IndexNode>> {
        self.by_uuid.get(uuid)
    }

    pub fn by_path(&self, path: &str) -> Option<&Arc<IndexNode>> {
        self.by_path.get(path)
    }

    /// Children of `uuid`, or the root bucket when `uuid` is `None`.
    pub fn children(&self, uuid: Option<Uuid>) -> &[Uuid] {
        match uuid {
            None => &self.root,
            Some(uuid) => self
                .by_uuid
                .get(&uuid)
                .map(|node| node.children.as_slice())
                .unwrap_or(&[]),
        }
    }
}

fn virtual_path_of(uuid: Uuid, live: &BTreeMap<Uuid, File>) -> String {
    let mut segments = Vec::new();
    let mut current = Some(uuid);
    while let Some(id) = current {
        let Some(file) = live.get(&id) else { break };
        segments.push(file.visible_name.clone());
        current = file.parent_uuid;
    }
    segments.reverse();
    format!("/{}", segments.join("/"))
}
