// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The writable block-indexed store backing a BOM file.

use {
    crate::{
        format::{
            BlockPointer, BomHeader, Var, FORMAT_VERSION, FREE_LIST_RESERVED_POINTERS,
            HEADER_MAGIC, HEADER_SIZE,
        },
        BomResult, Error,
    },
    scroll::IOwrite,
    std::io::Write,
};

/// An in-memory BOM container being assembled.
///
/// Blocks are append-only: payloads accumulate in one growable buffer and
/// are addressed by block table slot. Slot 0 is reserved and never refers
/// to data. Addresses held in the table are payload-relative while the
/// container is mutable; they are rebased to absolute file offsets during
/// [BomStorage::write_to].
///
/// Header offsets are recomputed after every mutation, so the header is
/// consistent at all times.
#[derive(Clone, Debug)]
pub struct BomStorage {
    header: BomHeader,
    vars: Vec<Var>,
    block_table: Vec<BlockPointer>,
    payload: Vec<u8>,
}

impl Default for BomStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl BomStorage {
    /// An empty container: reserved null block, no vars, no payload.
    pub fn new() -> Self {
        let mut storage = Self {
            header: BomHeader {
                magic: *HEADER_MAGIC,
                version: FORMAT_VERSION,
                number_of_blocks: 0,
                index_offset: 0,
                index_length: 0,
                vars_offset: HEADER_SIZE as u32,
                vars_length: 0,
            },
            vars: vec![],
            block_table: vec![BlockPointer::default()],
            payload: vec![],
        };
        storage.refresh_header();

        storage
    }

    /// The header as it would be written right now.
    pub fn header(&self) -> &BomHeader {
        &self.header
    }

    /// The block table, with payload-relative addresses.
    pub fn block_table(&self) -> &[BlockPointer] {
        &self.block_table
    }

    pub fn vars(&self) -> &[Var] {
        &self.vars
    }

    /// Append a payload as a new block and return its id.
    pub fn add_block(&mut self, data: &[u8]) -> u32 {
        let id = self.block_table.len() as u32;

        self.block_table.push(BlockPointer {
            address: self.payload.len() as u32,
            length: data.len() as u32,
        });
        self.payload.extend_from_slice(data);
        self.refresh_header();

        id
    }

    /// Borrow an already-added block's payload.
    pub fn block(&self, id: u32) -> BomResult<&[u8]> {
        let pointer = self.pointer(id)?;

        Ok(&self.payload[pointer.address as usize..(pointer.address + pointer.length) as usize])
    }

    /// Mutably borrow an already-added block's payload.
    ///
    /// Used to back-patch sibling pointers in tree pages after the next
    /// page's block id becomes known.
    pub fn block_mut(&mut self, id: u32) -> BomResult<&mut [u8]> {
        let pointer = self.pointer(id)?;

        Ok(&mut self.payload[pointer.address as usize..(pointer.address + pointer.length) as usize])
    }

    /// Record `name` as pointing at block `index`.
    pub fn add_var(&mut self, name: &str, index: u32) -> BomResult<()> {
        if name.len() > u8::MAX as usize {
            return Err(Error::VarNameTooLong(name.to_string()));
        }
        self.pointer(index)?;

        self.vars.push(Var {
            index,
            name: name.to_string(),
        });
        self.refresh_header();

        Ok(())
    }

    /// Serialize the container.
    ///
    /// Emits, in order: header, vars, block payloads, block table with
    /// addresses rebased to absolute file offsets, free list. All
    /// multi-byte fields become big-endian here.
    pub fn write_to(&self, writer: &mut impl Write) -> BomResult<()> {
        self.header.write_to(writer)?;

        writer.iowrite_with(self.vars.len() as u32, scroll::BE)?;
        for var in &self.vars {
            var.write_to(writer)?;
        }

        writer.write_all(&self.payload)?;

        let rebase = HEADER_SIZE as u32 + self.header.vars_length;
        writer.iowrite_with(self.block_table.len() as u32, scroll::BE)?;
        for pointer in &self.block_table {
            let address = if pointer.length != 0 {
                pointer.address + rebase
            } else {
                pointer.address
            };
            writer.iowrite_with(address, scroll::BE)?;
            writer.iowrite_with(pointer.length, scroll::BE)?;
        }

        // The free list is always written empty, trailed by reserved
        // all-zero slots.
        writer.iowrite_with(0u32, scroll::BE)?;
        for _ in 0..FREE_LIST_RESERVED_POINTERS {
            writer.iowrite_with(0u32, scroll::BE)?;
            writer.iowrite_with(0u32, scroll::BE)?;
        }

        Ok(())
    }

    fn pointer(&self, id: u32) -> BomResult<BlockPointer> {
        if id == 0 {
            return Err(Error::UnknownBlock(id));
        }

        self.block_table
            .get(id as usize)
            .copied()
            .ok_or(Error::UnknownBlock(id))
    }

    fn vars_size(&self) -> usize {
        4 + self.vars.iter().map(|v| v.encoded_size()).sum::<usize>()
    }

    fn index_size(&self) -> usize {
        let table = 4 + self.block_table.len() * BlockPointer::ENCODED_SIZE;
        let free_list = 4 + FREE_LIST_RESERVED_POINTERS * BlockPointer::ENCODED_SIZE;

        table + free_list
    }

    fn refresh_header(&mut self) {
        self.header.number_of_blocks = self.block_table.len() as u32 - 1;
        self.header.vars_length = self.vars_size() as u32;
        self.header.index_offset =
            (HEADER_SIZE + self.vars_size() + self.payload.len()) as u32;
        self.header.index_length = self.index_size() as u32;
    }
}
