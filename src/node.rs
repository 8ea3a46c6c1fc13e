// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory model of the filesystem hierarchy a BOM describes.

use {
    crate::{format::FileType, BomResult, Error},
    std::collections::{btree_map::Entry, BTreeMap},
};

/// One filesystem record handed to the BOM builder.
///
/// Producers are free to emit records in any order; the builder sorts
/// everything into a rooted tree. `path` is `/` separated and relative.
/// A leading `./` is tolerated and stripped; a bare `.` record is
/// ignored, since the root is implicit.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileEntry {
    pub path: String,

    /// Full stat mode. The high nibble encodes the node type.
    pub mode: u32,

    pub uid: u32,
    pub gid: u32,

    /// 0 for directories.
    pub size: u32,

    /// CRC-32 of file contents; for symlinks, of the target string.
    /// 0 for directories.
    pub checksum: u32,

    /// Symlink target. Required for symlinks, absent otherwise.
    pub link_target: Option<String>,
}

/// A provider of filesystem records.
///
/// Implementations exist for textual manifests
/// ([crate::manifest::ManifestSource]) and live directory trees
/// ([crate::walk::FilesystemSource]).
pub trait NodeSource {
    fn entries(&mut self) -> BomResult<Vec<FileEntry>>;
}

/// A node in the assembled filesystem tree.
///
/// Children are keyed by name in a sorted map; iteration order is the
/// ascending byte-lexical order the BOM writer relies on.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Node {
    pub file_type: FileType,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
    pub checksum: u32,
    pub link_target: Option<String>,
    pub children: BTreeMap<String, Node>,
}

impl Node {
    /// The virtual root. Never emitted itself; its children are the
    /// BOM's top-level entries.
    pub fn root() -> Self {
        Self {
            file_type: FileType::Directory,
            mode: 0,
            uid: 0,
            gid: 0,
            size: 0,
            checksum: 0,
            link_target: None,
            children: BTreeMap::new(),
        }
    }

    /// A childless node carrying one record's metadata.
    pub fn from_entry(entry: &FileEntry) -> BomResult<Self> {
        let file_type = FileType::from_mode(entry.mode)?;

        if file_type == FileType::Link
            && entry.link_target.as_ref().map_or(true, |t| t.is_empty())
        {
            return Err(Error::MissingLinkTarget(entry.path.clone()));
        }

        Ok(Self {
            file_type,
            mode: entry.mode,
            uid: entry.uid,
            gid: entry.gid,
            size: entry.size,
            checksum: entry.checksum,
            link_target: entry.link_target.clone(),
            children: BTreeMap::new(),
        })
    }

    /// Assemble records into a rooted tree.
    ///
    /// Records may arrive in any order. Every proper path prefix must
    /// itself be present as a record, mirroring how installers expect
    /// directories to be listed before their contents.
    pub fn from_entries(entries: impl IntoIterator<Item = FileEntry>) -> BomResult<Self> {
        let mut all = BTreeMap::new();
        for mut entry in entries {
            let path = match normalize_path(&entry.path) {
                Some(p) => p.to_string(),
                None => continue,
            };
            entry.path = path.clone();
            all.insert(path, entry);
        }

        let mut root = Self::root();
        for path in all.keys() {
            let mut current = &mut root;
            let mut prefix = String::with_capacity(path.len());

            for segment in path.split('/') {
                if !prefix.is_empty() {
                    prefix.push('/');
                }
                prefix.push_str(segment);

                current = match current.children.entry(segment.to_string()) {
                    Entry::Occupied(existing) => existing.into_mut(),
                    Entry::Vacant(slot) => {
                        let entry = all
                            .get(prefix.as_str())
                            .ok_or_else(|| Error::MissingParent(prefix.clone()))?;

                        slot.insert(Self::from_entry(entry)?)
                    }
                };
            }
        }

        Ok(root)
    }

    /// Total number of nodes below this one.
    pub fn descendant_count(&self) -> u32 {
        self.children
            .values()
            .map(|child| 1 + child.descendant_count())
            .sum()
    }
}

fn normalize_path(path: &str) -> Option<&str> {
    let path = path.strip_prefix("./").unwrap_or(path);

    if path.is_empty() || path == "." {
        None
    } else {
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir(path: &str) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            mode: 0o40755,
            uid: 0,
            gid: 0,
            size: 0,
            checksum: 0,
            link_target: None,
        }
    }

    fn file(path: &str, size: u32) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            mode: 0o100644,
            uid: 501,
            gid: 20,
            size,
            checksum: 0x1234,
            link_target: None,
        }
    }

    #[test]
    fn assembles_nested_tree() {
        let root = Node::from_entries(vec![
            dir("d"),
            file("d/a", 1),
            file("d/b", 2),
        ])
        .unwrap();

        assert_eq!(root.descendant_count(), 3);
        let d = &root.children["d"];
        assert_eq!(d.file_type, FileType::Directory);
        assert_eq!(
            d.children.keys().collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }

    #[test]
    fn order_does_not_matter() {
        let forward = Node::from_entries(vec![dir("d"), file("d/a", 1)]).unwrap();
        let reversed = Node::from_entries(vec![file("d/a", 1), dir("d")]).unwrap();

        assert_eq!(forward, reversed);
    }

    #[test]
    fn missing_parent_is_fatal() {
        assert!(matches!(
            Node::from_entries(vec![file("d/a", 1)]),
            Err(Error::MissingParent(p)) if p == "d"
        ));
    }

    #[test]
    fn dot_prefix_is_stripped() {
        let root = Node::from_entries(vec![
            dir("."),
            dir("./d"),
            file("./d/a", 1),
        ])
        .unwrap();

        assert_eq!(root.descendant_count(), 2);
        assert!(root.children.contains_key("d"));
    }

    #[test]
    fn rejects_unsupported_mode() {
        let entry = FileEntry {
            mode: 0o20644, // character device
            ..file("dev", 0)
        };

        assert!(matches!(
            Node::from_entries(vec![entry]),
            Err(Error::UnsupportedFileMode(_))
        ));
    }

    #[test]
    fn link_requires_target() {
        let entry = FileEntry {
            path: "l".to_string(),
            mode: 0o120777,
            uid: 0,
            gid: 0,
            size: 0,
            checksum: 0,
            link_target: None,
        };

        assert!(matches!(
            Node::from_entries(vec![entry]),
            Err(Error::MissingLinkTarget(_))
        ));
    }
}
