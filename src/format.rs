// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! On-disk data structures in BOM files.
//!
//! All multi-byte integers are stored big-endian. Every structure here
//! decodes and encodes field by field through [scroll] with an explicit
//! [scroll::BE] context, so host endianness and alignment never leak
//! into the wire format.

use {
    crate::{BomResult, Error},
    scroll::{IOwrite, Pread, Pwrite, SizeWith},
    std::{ffi::CStr, io::Write},
};

/// Magic at the beginning of every BOM file.
pub const HEADER_MAGIC: &[u8; 8] = b"BOMStore";

/// Total size of the file header, including zero padding.
pub const HEADER_SIZE: usize = 512;

/// BOM format version emitted and accepted by this crate.
pub const FORMAT_VERSION: u32 = 1;

/// Tag identifying a paged tree block.
pub const TREE_TAG: &[u8; 4] = b"tree";

/// Number of reserved all-zero pointers trailing a written free list.
pub const FREE_LIST_RESERVED_POINTERS: usize = 2;

/// The file preamble.
///
/// Occupies the first [HEADER_SIZE] bytes of the file; everything after
/// the fields below is zero padding.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Pread, Pwrite, SizeWith)]
pub struct BomHeader {
    /// `BOMStore`.
    pub magic: [u8; 8],

    /// Format version. Always 1.
    pub version: u32,

    /// Number of allocated blocks, excluding the reserved null block.
    pub number_of_blocks: u32,

    /// Absolute file offset of the block table.
    pub index_offset: u32,

    /// Combined size in bytes of the block table and the free list.
    pub index_length: u32,

    /// Absolute file offset of the variables section.
    pub vars_offset: u32,

    /// Size in bytes of the variables section.
    pub vars_length: u32,
}

impl BomHeader {
    /// Parse and validate the header at the start of `data`.
    pub fn parse(data: &[u8]) -> BomResult<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Error::Truncated);
        }

        let header = data.pread_with::<BomHeader>(0, scroll::BE)?;

        if &header.magic != HEADER_MAGIC {
            return Err(Error::BadMagic);
        }
        if header.version != FORMAT_VERSION {
            return Err(Error::UnsupportedVersion(header.version));
        }

        Ok(header)
    }

    /// Write the full padded header.
    pub fn write_to(&self, writer: &mut impl Write) -> BomResult<()> {
        let mut buf = [0u8; HEADER_SIZE];
        buf.pwrite_with(self, 0, scroll::BE)?;
        writer.write_all(&buf)?;

        Ok(())
    }
}

/// One block table or free list slot: an absolute file region.
///
/// An all-zero pointer denotes an unused slot.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Pread, Pwrite, SizeWith)]
pub struct BlockPointer {
    pub address: u32,
    pub length: u32,
}

impl BlockPointer {
    pub const ENCODED_SIZE: usize = 8;

    pub fn is_null(&self) -> bool {
        self.address == 0 && self.length == 0
    }
}

/// A named reference to a block.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Var {
    /// Block table slot holding this variable's payload.
    pub index: u32,

    /// Variable name. ASCII, at most 255 bytes, not NUL terminated.
    pub name: String,
}

impl Var {
    /// Parse one variable record, advancing `offset` past it.
    ///
    /// `data` is the complete variables section; records never extend
    /// past it.
    pub fn parse(data: &[u8], offset: &mut usize) -> BomResult<Self> {
        let index = data
            .pread_with::<u32>(*offset, scroll::BE)
            .map_err(|_| Error::BadVariables)?;
        let name_length = data
            .pread_with::<u8>(*offset + 4, scroll::BE)
            .map_err(|_| Error::BadVariables)? as usize;

        let start = *offset + 5;
        let name_data = data
            .get(start..start + name_length)
            .ok_or(Error::BadVariables)?;
        let name = String::from_utf8_lossy(name_data).to_string();

        *offset = start + name_length;

        Ok(Self { index, name })
    }

    pub fn write_to(&self, writer: &mut impl Write) -> BomResult<()> {
        writer.iowrite_with(self.index, scroll::BE)?;
        writer.iowrite_with(self.name.len() as u8, scroll::BE)?;
        writer.write_all(self.name.as_bytes())?;

        Ok(())
    }

    /// Encoded size in bytes.
    pub fn encoded_size(&self) -> usize {
        4 + 1 + self.name.len()
    }
}

/// Header of a paged tree structure.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Pread, Pwrite, SizeWith)]
pub struct Tree {
    /// `tree`.
    pub tag: [u8; 4],

    /// Tree format version. Always 1.
    pub version: u32,

    /// Block id of the root page.
    pub child: u32,

    /// Page size. 4096 for all trees except the one inside `VIndex`,
    /// which uses 128.
    pub block_size: u32,

    /// Number of filesystem entries indexed by this tree.
    pub path_count: u32,

    pub unknown3: u8,
}

impl Tree {
    pub const ENCODED_SIZE: usize = 21;

    pub fn new(child: u32, block_size: u32, path_count: u32) -> Self {
        Self {
            tag: *TREE_TAG,
            version: FORMAT_VERSION,
            child,
            block_size,
            path_count,
            unknown3: 0,
        }
    }

    pub fn parse(data: &[u8]) -> BomResult<Self> {
        let tree = data.pread_with::<Tree>(0, scroll::BE)?;

        if &tree.tag != TREE_TAG {
            return Err(Error::BadTreeTag);
        }

        Ok(tree)
    }

    pub fn to_vec(&self) -> BomResult<Vec<u8>> {
        let mut buf = vec![0u8; Self::ENCODED_SIZE];
        buf.pwrite_with(self, 0, scroll::BE)?;

        Ok(buf)
    }
}

/// One `(index0, index1)` pair in a tree page.
///
/// In a leaf page `index0` names a [PathInfo1] block and `index1` a
/// [FileRecord] block. In an interior page `index0` names a child page
/// and `index1` the last [FileRecord] reachable under that child.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Pread, Pwrite, SizeWith)]
pub struct PathIndices {
    pub index0: u32,
    pub index1: u32,
}

/// One page of a paged tree.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Paths {
    /// 1 for leaf pages, 0 for interior pages.
    pub is_leaf: u16,

    /// Block id of the next sibling leaf, or 0.
    pub forward: u32,

    /// Block id of the previous sibling leaf, or 0.
    pub backward: u32,

    pub indices: Vec<PathIndices>,
}

impl Paths {
    /// Size of the fixed page header preceding the entry pairs.
    pub const HEADER_SIZE: usize = 12;

    /// Byte offset of the `forward` field, used when back-patching the
    /// sibling chain.
    pub const FORWARD_OFFSET: usize = 4;

    /// A new leaf page chained behind `backward`.
    pub fn leaf(backward: u32) -> Self {
        Self {
            is_leaf: 1,
            forward: 0,
            backward,
            indices: vec![],
        }
    }

    /// An interior page routing to `children`.
    pub fn interior(children: Vec<PathIndices>) -> Self {
        Self {
            is_leaf: 0,
            forward: 0,
            backward: 0,
            indices: children,
        }
    }

    pub fn count(&self) -> usize {
        self.indices.len()
    }

    pub fn parse(data: &[u8]) -> BomResult<Self> {
        let is_leaf = data.pread_with::<u16>(0, scroll::BE)?;
        let count = data.pread_with::<u16>(2, scroll::BE)? as usize;
        let forward = data.pread_with::<u32>(4, scroll::BE)?;
        let backward = data.pread_with::<u32>(8, scroll::BE)?;

        let mut indices = Vec::with_capacity(count);
        for i in 0..count {
            indices.push(data.pread_with::<PathIndices>(
                Self::HEADER_SIZE + i * 8,
                scroll::BE,
            )?);
        }

        Ok(Self {
            is_leaf,
            forward,
            backward,
            indices,
        })
    }

    pub fn to_vec(&self) -> BomResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(Self::HEADER_SIZE + self.indices.len() * 8);
        buf.iowrite_with(self.is_leaf, scroll::BE)?;
        buf.iowrite_with(self.indices.len() as u16, scroll::BE)?;
        buf.iowrite_with(self.forward, scroll::BE)?;
        buf.iowrite_with(self.backward, scroll::BE)?;
        for pair in &self.indices {
            buf.iowrite_with(pair.index0, scroll::BE)?;
            buf.iowrite_with(pair.index1, scroll::BE)?;
        }

        Ok(buf)
    }
}

/// The type of filesystem node described by a [PathInfo2].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FileType {
    File,
    Directory,
    Link,
}

impl FileType {
    /// Derive the node type from the high nibble of a stat mode.
    pub fn from_mode(mode: u32) -> BomResult<Self> {
        match mode & 0xf000 {
            0x4000 => Ok(Self::Directory),
            0x8000 => Ok(Self::File),
            0xa000 => Ok(Self::Link),
            _ => Err(Error::UnsupportedFileMode(mode)),
        }
    }
}

impl TryFrom<u8> for FileType {
    type Error = Error;

    fn try_from(v: u8) -> BomResult<Self> {
        match v {
            1 => Ok(Self::File),
            2 => Ok(Self::Directory),
            3 => Ok(Self::Link),
            _ => Err(Error::UnknownFileType(v)),
        }
    }
}

impl From<FileType> for u8 {
    fn from(t: FileType) -> u8 {
        match t {
            FileType::File => 1,
            FileType::Directory => 2,
            FileType::Link => 3,
        }
    }
}

/// Per-node metadata record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PathInfo2 {
    pub file_type: FileType,

    /// Always 1.
    pub unknown0: u8,

    /// Always 3.
    pub architecture: u16,

    pub mode: u16,
    pub user: u32,
    pub group: u32,

    /// Always written as 0.
    pub modtime: u32,

    pub size: u32,

    /// Always 1.
    pub unknown1: u8,

    pub checksum: u32,

    /// Symlink target, without the trailing NUL it carries on disk.
    /// `None` for files and directories.
    pub link_name: Option<String>,
}

impl PathInfo2 {
    /// Size of the record before the variable-length link name.
    pub const FIXED_SIZE: usize = 31;

    pub fn parse(data: &[u8]) -> BomResult<Self> {
        let file_type = FileType::try_from(data.pread_with::<u8>(0, scroll::BE)?)?;
        let unknown0 = data.pread_with::<u8>(1, scroll::BE)?;
        let architecture = data.pread_with::<u16>(2, scroll::BE)?;
        let mode = data.pread_with::<u16>(4, scroll::BE)?;
        let user = data.pread_with::<u32>(6, scroll::BE)?;
        let group = data.pread_with::<u32>(10, scroll::BE)?;
        let modtime = data.pread_with::<u32>(14, scroll::BE)?;
        let size = data.pread_with::<u32>(18, scroll::BE)?;
        let unknown1 = data.pread_with::<u8>(22, scroll::BE)?;
        let checksum = data.pread_with::<u32>(23, scroll::BE)?;
        let link_name_length = data.pread_with::<u32>(27, scroll::BE)? as usize;

        let link_name = if link_name_length > 0 {
            let raw = data
                .get(Self::FIXED_SIZE..Self::FIXED_SIZE + link_name_length)
                .ok_or(Error::Truncated)?;
            let raw = raw.strip_suffix(&[0]).unwrap_or(raw);

            Some(String::from_utf8_lossy(raw).to_string())
        } else {
            None
        };

        Ok(Self {
            file_type,
            unknown0,
            architecture,
            mode,
            user,
            group,
            modtime,
            size,
            unknown1,
            checksum,
            link_name,
        })
    }

    pub fn to_vec(&self) -> BomResult<Vec<u8>> {
        let link_name_length = self.link_name.as_ref().map_or(0, |s| s.len() + 1);

        let mut buf = Vec::with_capacity(Self::FIXED_SIZE + link_name_length);
        buf.iowrite_with(u8::from(self.file_type), scroll::BE)?;
        buf.iowrite_with(self.unknown0, scroll::BE)?;
        buf.iowrite_with(self.architecture, scroll::BE)?;
        buf.iowrite_with(self.mode, scroll::BE)?;
        buf.iowrite_with(self.user, scroll::BE)?;
        buf.iowrite_with(self.group, scroll::BE)?;
        buf.iowrite_with(self.modtime, scroll::BE)?;
        buf.iowrite_with(self.size, scroll::BE)?;
        buf.iowrite_with(self.unknown1, scroll::BE)?;
        buf.iowrite_with(self.checksum, scroll::BE)?;
        buf.iowrite_with(link_name_length as u32, scroll::BE)?;
        if let Some(target) = &self.link_name {
            buf.write_all(target.as_bytes())?;
            buf.write_all(b"\0")?;
        }

        Ok(buf)
    }
}

/// The node ordinal record referenced from leaf pages.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Pread, Pwrite, SizeWith)]
pub struct PathInfo1 {
    /// 1-based ordinal assigned to the node during tree construction.
    pub id: u32,

    /// Block id of the node's [PathInfo2].
    pub index: u32,
}

impl PathInfo1 {
    pub const ENCODED_SIZE: usize = 8;

    pub fn parse(data: &[u8]) -> BomResult<Self> {
        Ok(data.pread_with::<PathInfo1>(0, scroll::BE)?)
    }

    pub fn to_vec(&self) -> BomResult<Vec<u8>> {
        let mut buf = vec![0u8; Self::ENCODED_SIZE];
        buf.pwrite_with(self, 0, scroll::BE)?;

        Ok(buf)
    }
}

/// The node name record referenced from leaf pages.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileRecord {
    /// Ordinal of the parent node, or 0 for top-level entries.
    pub parent: u32,

    /// Node name. NUL terminated on disk.
    pub name: String,
}

impl FileRecord {
    pub fn parse(data: &[u8]) -> BomResult<Self> {
        let parent = data.pread_with::<u32>(0, scroll::BE)?;
        let name_data = data.get(4..).ok_or(Error::Truncated)?;
        let name = CStr::from_bytes_with_nul(name_data)
            .map_err(|_| Error::Truncated)?
            .to_string_lossy()
            .to_string();

        Ok(Self { parent, name })
    }

    pub fn to_vec(&self) -> BomResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(4 + self.name.len() + 1);
        buf.iowrite_with(self.parent, scroll::BE)?;
        buf.write_all(self.name.as_bytes())?;
        buf.write_all(b"\0")?;

        Ok(buf)
    }
}

/// One opaque entry in [BomInfo].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Pread, Pwrite, SizeWith)]
pub struct BomInfoEntry {
    pub unknown0: u32,
    pub unknown1: u32,
    pub unknown2: u32,
    pub unknown3: u32,
}

/// The `BomInfo` summary variable.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BomInfo {
    pub version: u32,

    /// Number of paths covered by the BOM, counting the implicit root.
    pub number_of_paths: u32,

    pub entries: Vec<BomInfoEntry>,
}

impl BomInfo {
    pub fn parse(data: &[u8]) -> BomResult<Self> {
        let version = data.pread_with::<u32>(0, scroll::BE)?;
        let number_of_paths = data.pread_with::<u32>(4, scroll::BE)?;
        let count = data.pread_with::<u32>(8, scroll::BE)? as usize;

        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            entries.push(data.pread_with::<BomInfoEntry>(12 + i * 16, scroll::BE)?);
        }

        Ok(Self {
            version,
            number_of_paths,
            entries,
        })
    }

    pub fn to_vec(&self) -> BomResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(12 + self.entries.len() * 16);
        buf.iowrite_with(self.version, scroll::BE)?;
        buf.iowrite_with(self.number_of_paths, scroll::BE)?;
        buf.iowrite_with(self.entries.len() as u32, scroll::BE)?;
        for entry in &self.entries {
            buf.iowrite_with(entry.unknown0, scroll::BE)?;
            buf.iowrite_with(entry.unknown1, scroll::BE)?;
            buf.iowrite_with(entry.unknown2, scroll::BE)?;
            buf.iowrite_with(entry.unknown3, scroll::BE)?;
        }

        Ok(buf)
    }
}

/// The `VIndex` variable, wrapping an always-empty tree.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Pread, Pwrite, SizeWith)]
pub struct VIndex {
    /// Always 1.
    pub unknown0: u32,

    /// Block id of the inner tree.
    pub index_to_vtree: u32,

    /// Always 0.
    pub unknown2: u32,

    /// Always 0.
    pub unknown3: u8,
}

impl VIndex {
    pub const ENCODED_SIZE: usize = 13;

    pub fn new(index_to_vtree: u32) -> Self {
        Self {
            unknown0: 1,
            index_to_vtree,
            unknown2: 0,
            unknown3: 0,
        }
    }

    pub fn parse(data: &[u8]) -> BomResult<Self> {
        Ok(data.pread_with::<VIndex>(0, scroll::BE)?)
    }

    pub fn to_vec(&self) -> BomResult<Vec<u8>> {
        let mut buf = vec![0u8; Self::ENCODED_SIZE];
        buf.pwrite_with(self, 0, scroll::BE)?;

        Ok(buf)
    }
}
