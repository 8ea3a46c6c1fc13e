// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Read-only interface to parsed BOM files.

use {
    crate::{
        format::{
            BlockPointer, BomHeader, FileRecord, FileType, PathInfo1, PathInfo2, Paths, Tree, Var,
        },
        BomResult, Error,
    },
    log::debug,
    scroll::Pread,
    std::{collections::HashMap, io::Read},
};

/// One filesystem node recovered from a BOM's `Paths` tree.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BomPath {
    /// Full `/` separated path, relative to the payload root.
    pub path: String,

    pub file_type: FileType,
    pub mode: u16,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
    pub checksum: u32,
    pub link_target: Option<String>,
}

/// Read-only interface to a single BOM file.
///
/// Parsing validates the header, the block table, the free list, and the
/// variables directory. Variable payloads are interpreted lazily by the
/// accessor methods; a pointer leading outside the file is rejected up
/// front.
#[derive(Clone, Debug)]
pub struct BomReader {
    data: Vec<u8>,
    header: BomHeader,
    block_table: Vec<BlockPointer>,
    free_list: Vec<BlockPointer>,
    vars: Vec<Var>,
}

impl BomReader {
    /// Parse a BOM from a complete in-memory file image.
    pub fn parse(data: Vec<u8>) -> BomResult<Self> {
        let header = BomHeader::parse(&data)?;

        let index_offset = header.index_offset as usize;
        let index_end = index_offset
            .checked_add(header.index_length as usize)
            .ok_or(Error::Truncated)?;
        if index_end > data.len() {
            return Err(Error::Truncated);
        }

        let (block_table, free_list_offset) = Self::parse_pointer_array(&data, index_offset)?;
        for (i, pointer) in block_table.iter().enumerate() {
            if !pointer.is_null()
                && pointer.address as u64 + pointer.length as u64 > data.len() as u64
            {
                return Err(Error::BlockOutOfRange(i as u32));
            }
        }

        let (free_list, _) = Self::parse_pointer_array(&data, free_list_offset)?;

        let vars_offset = header.vars_offset as usize;
        let vars_end = vars_offset
            .checked_add(header.vars_length as usize)
            .ok_or(Error::Truncated)?;
        if vars_end > data.len() {
            return Err(Error::Truncated);
        }

        let vars_region = &data[vars_offset..vars_end];
        let count = vars_region
            .pread_with::<u32>(0, scroll::BE)
            .map_err(|_| Error::BadVariables)?;
        let mut vars = Vec::with_capacity(count as usize);
        let mut offset = 4;
        for _ in 0..count {
            vars.push(Var::parse(vars_region, &mut offset)?);
        }

        debug!(
            "parsed BOM: {} blocks, {} variables",
            header.number_of_blocks,
            vars.len()
        );

        Ok(Self {
            data,
            header,
            block_table,
            free_list,
            vars,
        })
    }

    /// Parse a BOM from a reader, buffering it fully.
    pub fn from_reader(mut reader: impl Read) -> BomResult<Self> {
        let mut data = vec![];
        reader.read_to_end(&mut data)?;

        Self::parse(data)
    }

    /// Total size of the underlying file image.
    pub fn file_size(&self) -> usize {
        self.data.len()
    }

    pub fn header(&self) -> &BomHeader {
        &self.header
    }

    pub fn block_table(&self) -> &[BlockPointer] {
        &self.block_table
    }

    pub fn free_list(&self) -> &[BlockPointer] {
        &self.free_list
    }

    /// All variables, in file order.
    pub fn vars(&self) -> &[Var] {
        &self.vars
    }

    /// Look up a variable by name.
    pub fn var(&self, name: &str) -> Option<&Var> {
        self.vars.iter().find(|v| v.name == name)
    }

    /// The raw bytes behind a block id.
    pub fn block_data(&self, id: u32) -> BomResult<&[u8]> {
        let pointer = self
            .block_table
            .get(id as usize)
            .ok_or(Error::UnknownBlock(id))?;

        Ok(&self.data[pointer.address as usize..(pointer.address + pointer.length) as usize])
    }

    /// The raw bytes behind a named variable.
    pub fn var_data(&self, name: &str) -> BomResult<&[u8]> {
        let var = self
            .var(name)
            .ok_or_else(|| Error::NoSuchVariable(name.to_string()))?;

        self.block_data(var.index)
    }

    /// Parse a named variable as a tree header.
    pub fn tree(&self, name: &str) -> BomResult<Tree> {
        Tree::parse(self.var_data(name)?)
    }

    /// Walk the `Paths` tree and reconstruct every filesystem node.
    ///
    /// Entries come back in stored order: breadth-first, children in
    /// ascending name order, matching the writer's numbering.
    pub fn paths(&self) -> BomResult<Vec<BomPath>> {
        let tree = self.tree("Paths")?;

        let mut paths = vec![];
        let mut full_paths: HashMap<u32, String> = HashMap::new();

        let mut page = Paths::parse(self.block_data(tree.child)?)?;
        let mut hops = 0;

        // Descend through interior pages to the leftmost leaf.
        while page.is_leaf == 0 {
            let first = page.indices.first().ok_or(Error::BadTreePage)?;
            page = Paths::parse(self.block_data(first.index0)?)?;

            hops += 1;
            if hops > self.block_table.len() {
                return Err(Error::BadTreePage);
            }
        }

        loop {
            for pair in &page.indices {
                let info1 = PathInfo1::parse(self.block_data(pair.index0)?)?;
                let info2 = PathInfo2::parse(self.block_data(info1.index)?)?;
                let record = FileRecord::parse(self.block_data(pair.index1)?)?;

                let path = if record.parent == 0 {
                    record.name
                } else {
                    let parent = full_paths
                        .get(&record.parent)
                        .ok_or(Error::BadTreePage)?;

                    format!("{}/{}", parent, record.name)
                };
                full_paths.insert(info1.id, path.clone());

                paths.push(BomPath {
                    path,
                    file_type: info2.file_type,
                    mode: info2.mode,
                    uid: info2.user,
                    gid: info2.group,
                    size: info2.size,
                    checksum: info2.checksum,
                    link_target: info2.link_name,
                });
            }

            if page.forward == 0 {
                break;
            }
            page = Paths::parse(self.block_data(page.forward)?)?;

            hops += 1;
            if hops > self.block_table.len() {
                return Err(Error::BadTreePage);
            }
        }

        Ok(paths)
    }

    /// Parse a `count` prefixed pointer array, returning the pointers
    /// and the offset one past them.
    fn parse_pointer_array(data: &[u8], offset: usize) -> BomResult<(Vec<BlockPointer>, usize)> {
        let count = data
            .pread_with::<u32>(offset, scroll::BE)
            .map_err(|_| Error::Truncated)? as usize;

        let body = offset + 4;
        if count
            .checked_mul(BlockPointer::ENCODED_SIZE)
            .and_then(|n| body.checked_add(n))
            .map_or(true, |end| end > data.len())
        {
            return Err(Error::Truncated);
        }

        let mut pointers = Vec::with_capacity(count);
        for i in 0..count {
            pointers.push(
                data.pread_with::<BlockPointer>(body + i * BlockPointer::ENCODED_SIZE, scroll::BE)?,
            );
        }

        Ok((pointers, body + count * BlockPointer::ENCODED_SIZE))
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::storage::BomStorage, scroll::Pwrite};

    fn sample_image() -> Vec<u8> {
        let mut storage = BomStorage::new();
        let id = storage.add_block(&[1, 2, 3, 4, 5]);
        storage.add_var("Blob", id).unwrap();

        let mut data = vec![];
        storage.write_to(&mut data).unwrap();

        data
    }

    #[test]
    fn parses_writer_output() {
        let bom = BomReader::parse(sample_image()).unwrap();

        assert_eq!(bom.header().number_of_blocks, 1);
        assert_eq!(bom.block_table().len(), 2);
        assert!(bom.block_table()[0].is_null());
        assert_eq!(bom.free_list().len(), 0);
        assert_eq!(bom.vars().len(), 1);
        assert_eq!(bom.var_data("Blob").unwrap(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut data = sample_image();
        data[0] = b'X';

        assert!(matches!(BomReader::parse(data), Err(Error::BadMagic)));
    }

    #[test]
    fn rejects_truncated_file() {
        let mut data = sample_image();
        data.truncate(data.len() - 6);

        assert!(matches!(BomReader::parse(data), Err(Error::Truncated)));
    }

    #[test]
    fn rejects_out_of_range_block_pointer() {
        let mut data = sample_image();
        let header = BomHeader::parse(&data).unwrap();

        // Corrupt block 1's address in the table.
        let pointer_offset = header.index_offset as usize + 4 + BlockPointer::ENCODED_SIZE;
        data.pwrite_with(0xffff_0000u32, pointer_offset, scroll::BE)
            .unwrap();

        assert!(matches!(
            BomReader::parse(data),
            Err(Error::BlockOutOfRange(1))
        ));
    }

    #[test]
    fn rejects_var_name_past_vars_region() {
        let mut data = sample_image();

        // Inflate the recorded name length of the only var.
        let name_length_offset = 512 + 4 + 4;
        data[name_length_offset] = 200;

        assert!(matches!(BomReader::parse(data), Err(Error::BadVariables)));
    }

    #[test]
    fn missing_variable_is_reported() {
        let bom = BomReader::parse(sample_image()).unwrap();

        assert!(matches!(
            bom.var_data("Paths"),
            Err(Error::NoSuchVariable(name)) if name == "Paths"
        ));
    }
}
