//! Maps an inbound virtual path to a backing artifact and a set of
//! synthesis flags, by literally mangling the path string the way the
//! original `munge_path` (`main.c`) does.
//!
//! The brittleness this implies for visible names that happen to contain
//! `.svg` or ` Annotations` is inherited deliberately — see the design
//! doc's discussion of this open question — rather than fixed, since the
//! testable properties pin the exact mangling behavior.

use std::path::PathBuf;
use std::sync::Arc;

use crate::index::{IndexNode, NameIndex};
use crate::store::{FileType, Kind};

use bitflags::bitflags;

bitflags! {
    /// Which synthesis, if any, a resolved path requires.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct SynthFlags: u8 {
        const IS_SVG = 1 << 0;
        const IS_ANNOT_DIR = 1 << 1;
        const IS_ANNOT_PAGE = 1 << 2;
    }
}

pub struct Resolved {
    pub node: Arc<IndexNode>,
    pub flags: SynthFlags,
    pub backing_path: PathBuf,
}

/// Apply the mangling rules to `path`, returning the rewritten path and
/// the flags they set.
pub fn mangle(path: &str) -> (String, SynthFlags) {
    let mut flags = SynthFlags::empty();
    let mut mangled = path.to_string();

    if let Some(pos) = mangled.find(".svg") {
        mangled.replace_range(pos..pos + 4, ".rm");
        flags |= SynthFlags::IS_SVG;
    }

    const ANNOTATIONS: &str = " Annotations";
    if let Some(pos) = mangled.find(ANNOTATIONS) {
        if pos + ANNOTATIONS.len() == mangled.len() {
            mangled.truncate(pos);
            flags |= SynthFlags::IS_ANNOT_DIR | SynthFlags::IS_ANNOT_PAGE;
        } else {
            mangled.replace_range(pos..pos + ANNOTATIONS.len(), "");
            flags |= SynthFlags::IS_ANNOT_PAGE;
        }
    }

    (mangled, flags)
}

pub fn resolve(index: &NameIndex, path: &str) -> Option<Resolved> {
    let (mangled, flags) = mangle(path);
    let node = index.by_path(&mangled)?.clone();
    let backing_path = backing_path_for(index, &node, flags);
    Some(Resolved { node, flags, backing_path })
}

fn backing_path_for(index: &NameIndex, node: &Arc<IndexNode>, flags: SynthFlags) -> PathBuf {
    let source = index.source();

    if node.file.kind == Kind::Collection {
        return source.to_path_buf();
    }

    if node.file.filetype == FileType::Page {
        let parent = node.file.parent_uuid.map(|u| u.to_string()).unwrap_or_default();
        return source.join(parent).join(format!("{}.rm", node.file.uuid));
    }

    if flags.contains(SynthFlags::IS_ANNOT_DIR) {
        return source.join(node.file.uuid.to_string());
    }

    source.join(format!("{}{}", node.file.uuid, node.file.filetype.extension()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FileType;

    #[test]
    fn svg_suffix_mangles_to_rm_and_sets_is_svg() {
        let (mangled, flags) = mangle("/Notes/page_000001.svg");
        assert_eq!(mangled, "/Notes/page_000001.rm");
        assert_eq!(flags, SynthFlags::IS_SVG);
    }

    #[test]
    fn trailing_annotations_strips_the_suffix_and_sets_both_flags() {
        let (mangled, flags) = mangle("/Books/Book1 Annotations");
        assert_eq!(mangled, "/Books/Book1");
        assert_eq!(flags, SynthFlags::IS_ANNOT_DIR | SynthFlags::IS_ANNOT_PAGE);
    }

    #[test]
    fn mid_path_annotations_only_sets_the_page_flag() {
        let (mangled, flags) = mangle("/Books/Book1 Annotations/page_000001.svg");
        assert_eq!(mangled, "/Books/Book1/page_000001.rm");
        assert_eq!(flags, SynthFlags::IS_SVG | SynthFlags::IS_ANNOT_PAGE);
    }

    #[test]
    fn plain_path_is_unchanged() {
        let (mangled, flags) = mangle("/Books/Book1");
        assert_eq!(mangled, "/Books/Book1");
        assert!(flags.is_empty());
    }

    #[test]
    fn resolve_a_collection_uses_the_source_root_as_its_backing_path() {
        use crate::index::NameIndex;
        use std::path::Path;

        let source = Path::new("/store");
        let collections = vec![crate::store::File {
            uuid: uuid::Uuid::new_v4(),
            parent_uuid: None,
            visible_name: "Books".to_string(),
            template_name: String::new(),
            kind: Kind::Collection,
            filetype: FileType::None,
            landscape: false,
            page_count: 0,
            deleted: false,
            dummy: false,
        }];
        let index = NameIndex::from_files(source, collections);

        let resolved = resolve(&index, "/Books").expect("resolves");
        assert_eq!(resolved.backing_path, source);
        assert!(resolved.flags.is_empty());
    }
}
