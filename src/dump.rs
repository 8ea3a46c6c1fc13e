// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Human-readable dump of a BOM's internals, for debugging.

use {
    crate::{
        format::{BomInfo, FileRecord, Paths, Tree, VIndex},
        reader::BomReader,
        BomResult,
    },
    scroll::Pread,
    std::io::Write,
};

const RULE: &str = "-----------------------------------------------------";

/// Write every structure of `bom` to `out`.
///
/// Known variables are decoded field by field; anything else is
/// hexdumped.
pub fn dump_bom(bom: &BomReader, out: &mut impl Write) -> BomResult<()> {
    let header = bom.header();

    writeln!(out, "file_length = {}", bom.file_size())?;
    writeln!(out)?;
    writeln!(out, "Header:")?;
    writeln!(out, "{}", RULE)?;
    writeln!(out, "magic = \"{}\"", String::from_utf8_lossy(&header.magic))?;
    writeln!(out, "version = {}", header.version)?;
    writeln!(out, "numberOfBlocks = {}", header.number_of_blocks)?;
    writeln!(out, "indexOffset = {}", header.index_offset)?;
    writeln!(out, "indexLength = {}", header.index_length)?;
    writeln!(out, "varsOffset = {}", header.vars_offset)?;
    writeln!(out, "varsLength = {}", header.vars_length)?;
    writeln!(
        out,
        "(calculated number of blocks = {})",
        bom.block_table().iter().filter(|p| !p.is_null()).count()
    )?;

    writeln!(out)?;
    writeln!(out, "Index Table:")?;
    writeln!(out, "{}", RULE)?;
    writeln!(out, "numberOfBlockTableEntries = {}", bom.block_table().len())?;

    writeln!(out)?;
    writeln!(out, "Free List:")?;
    writeln!(out, "{}", RULE)?;
    writeln!(out, "numberOfFreeListPointers = {}", bom.free_list().len())?;

    writeln!(out)?;
    writeln!(out, "Variables:")?;
    writeln!(out, "{}", RULE)?;
    writeln!(out, "count = {}", bom.vars().len())?;
    let names = bom
        .vars()
        .iter()
        .map(|v| format!("\"{}\"", v.name))
        .collect::<Vec<_>>();
    writeln!(out, "{}", names.join(","))?;

    for var in bom.vars() {
        let data = bom.block_data(var.index)?;
        let pointer = bom.block_table()[var.index as usize];

        writeln!(out)?;
        writeln!(
            out,
            "\"{}\" (file offset: {:#x} length: {})",
            var.name, pointer.address, pointer.length
        )?;
        writeln!(out, "{}", RULE)?;

        match var.name.as_str() {
            "Paths" | "HLIndex" | "Size64" => dump_tree(bom, out, data)?,
            "BomInfo" => dump_bom_info(out, data)?,
            "VIndex" => dump_vindex(bom, out, data)?,
            _ => dump_raw(out, data)?,
        }
    }

    Ok(())
}

fn dump_tree(bom: &BomReader, out: &mut impl Write, data: &[u8]) -> BomResult<()> {
    let tree = Tree::parse(data)?;

    writeln!(out, "tree = \"{}\"", String::from_utf8_lossy(&tree.tag))?;
    writeln!(out, "version = {}", tree.version)?;
    writeln!(out, "child = {}", tree.child)?;
    writeln!(out, "blockSize = {}", tree.block_size)?;
    writeln!(out, "pathCount = {}", tree.path_count)?;
    writeln!(out, "unknown3 = {}", tree.unknown3)?;

    dump_page_chain(bom, out, tree.child)
}

fn dump_page_chain(bom: &BomReader, out: &mut impl Write, first: u32) -> BomResult<()> {
    let mut id = first;

    loop {
        let page = Paths::parse(bom.block_data(id)?)?;

        writeln!(out)?;
        writeln!(out, "path id={}", id)?;
        writeln!(out, "isLeaf = {}", page.is_leaf)?;
        writeln!(out, "count = {}", page.count())?;
        writeln!(out, "forward = {}", page.forward)?;
        writeln!(out, "backward = {}", page.backward)?;

        for (i, pair) in page.indices.iter().enumerate() {
            // index1 names a file record in leaves and the routing key
            // in interior pages; both decode the same way.
            let record = FileRecord::parse(bom.block_data(pair.index1)?)?;
            writeln!(out, "indices[{}].index0 = {}", i, pair.index0)?;
            writeln!(out, "indices[{}].index1.parent = {}", i, record.parent)?;
            writeln!(out, "indices[{}].index1.name = {}", i, record.name)?;
        }

        if page.is_leaf == 0 {
            if let Some(first_child) = page.indices.first() {
                dump_page_chain(bom, out, first_child.index0)?;
            }
        }

        if page.forward == 0 {
            break;
        }
        id = page.forward;
    }

    Ok(())
}

fn dump_bom_info(out: &mut impl Write, data: &[u8]) -> BomResult<()> {
    let info = BomInfo::parse(data)?;

    writeln!(out, "version = {}", info.version)?;
    writeln!(out, "numberOfPaths = {}", info.number_of_paths)?;
    writeln!(out, "numberOfInfoEntries = {}", info.entries.len())?;
    for (i, entry) in info.entries.iter().enumerate() {
        writeln!(out, "entries[{}].unknown0 = {}", i, entry.unknown0)?;
        writeln!(out, "entries[{}].unknown1 = {}", i, entry.unknown1)?;
        writeln!(out, "entries[{}].unknown2 = {}", i, entry.unknown2)?;
        writeln!(out, "entries[{}].unknown3 = {}", i, entry.unknown3)?;
    }

    Ok(())
}

fn dump_vindex(bom: &BomReader, out: &mut impl Write, data: &[u8]) -> BomResult<()> {
    let vindex = VIndex::parse(data)?;

    writeln!(out, "unknown0 = {}", vindex.unknown0)?;
    writeln!(out, "indexToVTree = {}", vindex.index_to_vtree)?;
    writeln!(out, "unknown2 = {}", vindex.unknown2)?;
    writeln!(out, "unknown3 = {}", vindex.unknown3)?;
    writeln!(out)?;

    dump_tree(bom, out, bom.block_data(vindex.index_to_vtree)?)
}

fn dump_raw(out: &mut impl Write, data: &[u8]) -> BomResult<()> {
    let words = data.len() / 4;
    for i in 0..words {
        let value = data.pread_with::<u32>(i * 4, scroll::BE)?;
        writeln!(out, "{:#010x}", value)?;
    }
    for byte in &data[words * 4..] {
        writeln!(out, "{:#04x}", byte)?;
    }

    Ok(())
}
