// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Assembling complete BOM files.

use {
    crate::{
        format::{BomInfo, BomInfoEntry, VIndex, FORMAT_VERSION},
        node::{FileEntry, Node, NodeSource},
        storage::BomStorage,
        tree,
        BomResult,
    },
    log::debug,
    std::io::Write,
};

/// Builds a BOM from an assembled filesystem tree.
///
/// The five standard variables are emitted in the fixed order system
/// tools expect: `BomInfo`, `Paths`, `HLIndex`, `VIndex`, `Size64`.
/// Output is deterministic; building twice from the same tree produces
/// byte-identical files.
pub struct BomBuilder {
    root: Node,
}

impl BomBuilder {
    /// Build from an already assembled tree rooted at the virtual root.
    pub fn from_tree(root: Node) -> Self {
        Self { root }
    }

    /// Build from filesystem records in any order.
    pub fn from_entries(entries: impl IntoIterator<Item = FileEntry>) -> BomResult<Self> {
        Ok(Self::from_tree(Node::from_entries(entries)?))
    }

    /// Build by draining a [NodeSource].
    pub fn from_source(source: &mut dyn NodeSource) -> BomResult<Self> {
        Self::from_entries(source.entries()?)
    }

    /// The assembled tree.
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Serialize the BOM into `writer`.
    pub fn write_to(&self, writer: &mut impl Write) -> BomResult<()> {
        let count = self.root.descendant_count();
        debug!("writing BOM for {} paths", count);

        let mut storage = BomStorage::new();

        let info = BomInfo {
            version: FORMAT_VERSION,
            number_of_paths: count + 1,
            entries: if count > 0 {
                vec![BomInfoEntry::default()]
            } else {
                vec![]
            },
        };
        let info_id = storage.add_block(&info.to_vec()?);
        storage.add_var("BomInfo", info_id)?;

        let paths_id = tree::add_paths_tree(&mut storage, &self.root)?;
        storage.add_var("Paths", paths_id)?;

        let hl_index_id = tree::add_empty_tree(&mut storage, tree::DEFAULT_BLOCK_SIZE)?;
        storage.add_var("HLIndex", hl_index_id)?;

        let vtree_id = tree::add_empty_tree(&mut storage, tree::VINDEX_BLOCK_SIZE)?;
        let vindex_id = storage.add_block(&VIndex::new(vtree_id).to_vec()?);
        storage.add_var("VIndex", vindex_id)?;

        let size64_id = tree::add_empty_tree(&mut storage, tree::DEFAULT_BLOCK_SIZE)?;
        storage.add_var("Size64", size64_id)?;

        storage.write_to(writer)
    }

    /// Serialize the BOM into a byte vector.
    pub fn to_vec(&self) -> BomResult<Vec<u8>> {
        let mut data = vec![];
        self.write_to(&mut data)?;

        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            format::{FileRecord, Paths, Tree},
            reader::BomReader,
            FileType,
        },
        scroll::Pread,
    };

    fn dir(path: &str) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            mode: 0o40755,
            uid: 0,
            gid: 80,
            size: 0,
            checksum: 0,
            link_target: None,
        }
    }

    fn file(path: &str, size: u32, checksum: u32) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            mode: 0o100644,
            uid: 501,
            gid: 20,
            size,
            checksum,
            link_target: None,
        }
    }

    fn link(path: &str, target: &str) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            mode: 0o120777,
            uid: 0,
            gid: 0,
            size: target.len() as u32,
            checksum: crc32fast::hash(target.as_bytes()),
            link_target: Some(target.to_string()),
        }
    }

    fn build(entries: Vec<FileEntry>) -> Vec<u8> {
        BomBuilder::from_entries(entries).unwrap().to_vec().unwrap()
    }

    #[test]
    fn empty_tree() {
        let data = build(vec![]);

        assert_eq!(&data[0..8], b"BOMStore");
        assert_eq!(data.pread_with::<u32>(8, scroll::BE).unwrap(), 1);

        let bom = BomReader::parse(data).unwrap();
        assert_eq!(
            bom.vars().iter().map(|v| v.name.as_str()).collect::<Vec<_>>(),
            vec!["BomInfo", "Paths", "HLIndex", "VIndex", "Size64"]
        );

        let info = crate::format::BomInfo::parse(bom.var_data("BomInfo").unwrap()).unwrap();
        assert_eq!(info.version, 1);
        assert_eq!(info.number_of_paths, 1);
        assert!(info.entries.is_empty());

        let paths_tree = bom.tree("Paths").unwrap();
        assert_eq!(paths_tree.path_count, 0);
        let root = Paths::parse(bom.block_data(paths_tree.child).unwrap()).unwrap();
        assert_eq!(root.is_leaf, 1);
        assert_eq!(root.count(), 0);

        assert!(bom.paths().unwrap().is_empty());
    }

    #[test]
    fn auxiliary_variables_are_empty_trees() {
        let data = build(vec![file("a", 3, 0xdeadbeef)]);
        let bom = BomReader::parse(data).unwrap();

        for name in ["HLIndex", "Size64"] {
            let tree = bom.tree(name).unwrap();
            assert_eq!(tree.path_count, 0);
            assert_eq!(tree.block_size, 4096);

            let page = Paths::parse(bom.block_data(tree.child).unwrap()).unwrap();
            assert_eq!(page.is_leaf, 1);
            assert_eq!(page.count(), 0);
        }

        let vindex =
            crate::format::VIndex::parse(bom.var_data("VIndex").unwrap()).unwrap();
        assert_eq!(vindex.unknown0, 1);
        assert_eq!(vindex.unknown2, 0);
        assert_eq!(vindex.unknown3, 0);

        let vtree = Tree::parse(bom.block_data(vindex.index_to_vtree).unwrap()).unwrap();
        assert_eq!(vtree.block_size, 128);
        assert_eq!(vtree.path_count, 0);
    }

    #[test]
    fn single_file() {
        let data = build(vec![file("a", 3, 0xdeadbeef)]);
        let bom = BomReader::parse(data).unwrap();

        let info = crate::format::BomInfo::parse(bom.var_data("BomInfo").unwrap()).unwrap();
        assert_eq!(info.number_of_paths, 2);
        assert_eq!(info.entries.len(), 1);
        assert_eq!(info.entries[0], crate::format::BomInfoEntry::default());

        let tree = bom.tree("Paths").unwrap();
        assert_eq!(tree.path_count, 1);

        let page = Paths::parse(bom.block_data(tree.child).unwrap()).unwrap();
        assert_eq!(page.count(), 1);
        let record = FileRecord::parse(bom.block_data(page.indices[0].index1).unwrap()).unwrap();
        assert_eq!(record.parent, 0);
        assert_eq!(record.name, "a");

        let paths = bom.paths().unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].path, "a");
        assert_eq!(paths[0].file_type, FileType::File);
        assert_eq!(paths[0].mode, 0o100644);
        assert_eq!(paths[0].uid, 501);
        assert_eq!(paths[0].gid, 20);
        assert_eq!(paths[0].size, 3);
        assert_eq!(paths[0].checksum, 0xdeadbeef);
    }

    #[test]
    fn directory_with_two_files() {
        let data = build(vec![
            dir("d"),
            file("d/a", 1, 1),
            file("d/b", 2, 2),
        ]);
        let bom = BomReader::parse(data).unwrap();

        assert_eq!(bom.tree("Paths").unwrap().path_count, 3);

        let paths = bom.paths().unwrap();
        assert_eq!(
            paths.iter().map(|p| p.path.as_str()).collect::<Vec<_>>(),
            vec!["d", "d/a", "d/b"]
        );
        assert_eq!(paths[0].file_type, FileType::Directory);
    }

    #[test]
    fn symlink() {
        let data = build(vec![link("l", "target")]);
        let bom = BomReader::parse(data).unwrap();

        let tree = bom.tree("Paths").unwrap();
        let page = Paths::parse(bom.block_data(tree.child).unwrap()).unwrap();
        let info1 =
            crate::format::PathInfo1::parse(bom.block_data(page.indices[0].index0).unwrap())
                .unwrap();
        let info2_data = bom.block_data(info1.index).unwrap();
        let info2 = crate::format::PathInfo2::parse(info2_data).unwrap();

        assert_eq!(info2.file_type, FileType::Link);
        // Trailing NUL is included in the stored length.
        assert_eq!(
            info2_data.pread_with::<u32>(27, scroll::BE).unwrap(),
            7
        );
        assert_eq!(&info2_data[31..], b"target\0");
        assert_eq!(info2.link_name.as_deref(), Some("target"));
    }

    #[test]
    fn deterministic_output() {
        let entries = vec![
            dir("d"),
            file("d/a", 1, 0x11),
            link("d/l", "a"),
            file("b", 9, 0x22),
        ];

        let first = build(entries.clone());
        let second = build(entries);

        assert_eq!(first, second);
    }

    #[test]
    fn metadata_round_trip() {
        let entries = vec![
            dir("d"),
            dir("d/sub"),
            file("d/a", 17, 0xcafe),
            file("d/sub/z", 4096, 0xf00d),
            link("l", "d/a"),
        ];

        let data = build(entries.clone());
        let bom = BomReader::parse(data).unwrap();

        let mut recovered = bom
            .paths()
            .unwrap()
            .into_iter()
            .map(|p| {
                (
                    p.path,
                    p.mode as u32,
                    p.uid,
                    p.gid,
                    p.size,
                    p.checksum,
                    p.link_target,
                )
            })
            .collect::<Vec<_>>();
        recovered.sort();

        let mut expected = entries
            .into_iter()
            .map(|e| {
                (
                    e.path,
                    e.mode & 0xffff,
                    e.uid,
                    e.gid,
                    e.size,
                    e.checksum,
                    e.link_target,
                )
            })
            .collect::<Vec<_>>();
        expected.sort();

        assert_eq!(recovered, expected);
    }

    #[test]
    fn block_intervals_are_disjoint_and_in_range() {
        let entries = (0..300)
            .map(|i| file(&format!("f{:03}", i), i, i))
            .collect::<Vec<_>>();
        let data = build(entries);
        let size = data.len() as u64;
        let bom = BomReader::parse(data).unwrap();

        let mut intervals = bom
            .block_table()
            .iter()
            .skip(1)
            .map(|p| (p.address as u64, p.length as u64))
            .collect::<Vec<_>>();

        for (address, length) in &intervals {
            assert!(address + length <= size);
            assert!(*length > 0);
        }

        intervals.sort();
        for pair in intervals.windows(2) {
            assert!(pair[0].0 + pair[0].1 <= pair[1].0);
        }
    }

    #[test]
    fn free_list_is_empty_with_reserved_slots() {
        let data = build(vec![file("a", 1, 1)]);
        let header = crate::format::BomHeader::parse(&data).unwrap();

        let table_count = data
            .pread_with::<u32>(header.index_offset as usize, scroll::BE)
            .unwrap() as usize;
        let free_offset = header.index_offset as usize + 4 + table_count * 8;

        assert_eq!(
            data.pread_with::<u32>(free_offset, scroll::BE).unwrap(),
            0
        );
        assert_eq!(&data[free_offset + 4..free_offset + 20], &[0u8; 16]);
        assert_eq!(data.len(), free_offset + 20);
    }

    #[test]
    fn two_leaf_chain_round_trips() {
        let entries = (0..257)
            .map(|i| file(&format!("f{:03}", i), i, i))
            .collect::<Vec<_>>();
        let data = build(entries);
        let bom = BomReader::parse(data).unwrap();

        assert_eq!(bom.paths().unwrap().len(), 257);

        let tree = bom.tree("Paths").unwrap();
        let root = Paths::parse(bom.block_data(tree.child).unwrap()).unwrap();
        assert_eq!(root.is_leaf, 0);
        assert_eq!(root.count(), 2);
    }
}
