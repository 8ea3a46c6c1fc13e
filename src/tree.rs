// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Serialization of the paged paths tree.
//!
//! Nodes are numbered breadth-first, children in ascending byte-lexical
//! name order, starting at 1. Each node contributes three blocks - a
//! [PathInfo2], a [PathInfo1], and a [FileRecord] - and one
//! `(PathInfo1, FileRecord)` pair in the current leaf page. Leaves hold
//! up to [ENTRIES_PER_PAGE] pairs; once more than one leaf exists, a
//! single interior page becomes the root and routes to the leaves in
//! chain order.

use {
    crate::{
        format::{FileRecord, PathIndices, PathInfo1, PathInfo2, Paths, Tree},
        node::Node,
        storage::BomStorage,
        BomResult,
    },
    scroll::Pwrite,
    std::collections::VecDeque,
};

/// Maximum number of entry pairs per leaf page.
pub const ENTRIES_PER_PAGE: usize = 256;

/// Declared page size for every tree except the one inside `VIndex`.
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

/// Declared page size of the `VIndex` inner tree.
pub const VINDEX_BLOCK_SIZE: u32 = 128;

/// Serialize the paths tree for `root` into `storage`.
///
/// Returns the block id of the tree header, suitable for registering as
/// the `Paths` variable.
pub fn add_paths_tree(storage: &mut BomStorage, root: &Node) -> BomResult<u32> {
    let total = root.descendant_count();

    let mut queue: VecDeque<(u32, &Node)> = VecDeque::new();
    queue.push_back((0, root));

    let mut leaf = Paths::leaf(0);
    let mut previous_leaf = 0u32;
    let mut finished: Vec<PathIndices> = vec![];
    let mut last_file_record = 0u32;
    let mut ordinal = 0u32;

    while let Some((parent, node)) = queue.pop_front() {
        for (name, child) in &node.children {
            if ordinal != 0 && ordinal as usize % ENTRIES_PER_PAGE == 0 {
                let page = std::mem::replace(&mut leaf, Paths::leaf(0));
                let leaf_id =
                    finish_leaf(storage, &page, previous_leaf, &mut finished, last_file_record)?;
                leaf.backward = leaf_id;
                previous_leaf = leaf_id;
            }

            let info2 = metadata_record(child);
            let info2_id = storage.add_block(&info2.to_vec()?);

            let info1 = PathInfo1 {
                id: ordinal + 1,
                index: info2_id,
            };
            let info1_id = storage.add_block(&info1.to_vec()?);

            let record = FileRecord {
                parent,
                name: name.clone(),
            };
            let record_id = storage.add_block(&record.to_vec()?);

            leaf.indices.push(PathIndices {
                index0: info1_id,
                index1: record_id,
            });
            last_file_record = record_id;

            queue.push_back((ordinal + 1, child));
            ordinal += 1;
        }
    }

    // The final leaf. For an empty tree this is a well-formed empty page
    // serving as the root.
    let last_leaf = finish_leaf(storage, &leaf, previous_leaf, &mut finished, last_file_record)?;

    let root_page = if finished.len() > 1 {
        storage.add_block(&Paths::interior(finished).to_vec()?)
    } else {
        last_leaf
    };

    let tree = Tree::new(root_page, DEFAULT_BLOCK_SIZE, total);

    Ok(storage.add_block(&tree.to_vec()?))
}

/// Add a tree holding nothing but one empty leaf page.
///
/// `HLIndex`, `Size64`, and the tree inside `VIndex` all take this
/// shape.
pub fn add_empty_tree(storage: &mut BomStorage, block_size: u32) -> BomResult<u32> {
    let leaf_id = storage.add_block(&Paths::leaf(0).to_vec()?);
    let tree = Tree::new(leaf_id, block_size, 0);

    Ok(storage.add_block(&tree.to_vec()?))
}

/// Allocate a filled leaf, chain it behind its predecessor, and record
/// its routing entry for a prospective interior root.
fn finish_leaf(
    storage: &mut BomStorage,
    page: &Paths,
    previous_leaf: u32,
    finished: &mut Vec<PathIndices>,
    last_file_record: u32,
) -> BomResult<u32> {
    let leaf_id = storage.add_block(&page.to_vec()?);

    if previous_leaf != 0 {
        storage
            .block_mut(previous_leaf)?
            .pwrite_with(leaf_id, Paths::FORWARD_OFFSET, scroll::BE)?;
    }

    finished.push(PathIndices {
        index0: leaf_id,
        index1: last_file_record,
    });

    Ok(leaf_id)
}

fn metadata_record(node: &Node) -> PathInfo2 {
    PathInfo2 {
        file_type: node.file_type,
        unknown0: 1,
        architecture: 3,
        mode: node.mode as u16,
        user: node.uid,
        group: node.gid,
        modtime: 0,
        size: node.size,
        unknown1: 1,
        checksum: node.checksum,
        link_name: node.link_target.clone(),
    }
}
