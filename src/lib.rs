// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Apple Bill of Materials (BOM) files.

*Bill of materials* files - often named `Bom` inside macOS installer
packages - record every file, directory, and symlink in an installer
payload along with ownership, permissions, sizes, and CRC-32 checksums.
The macOS Installer consults the BOM to decide what to copy, verify, and
later remove.

# File Format

A BOM is a self-describing, big-endian binary database. The high-level
layout is:

* A 512 byte header starting with the magic `BOMStore`. The header points
  at a *block table* and a *variables* section.
* A sequence of *blocks* - opaque byte payloads addressed through the
  block table by numeric id. Block id 0 is reserved and always refers to
  nothing.
* The *block table*, an array of `(file offset, length)` pairs, followed
  by a *free list* of reclaimable regions. Files produced by this crate
  always carry an empty free list.
* The *variables* section, mapping names like `Paths` or `BomInfo` to
  block ids.

The interesting content hangs off the named variables. Each of `Paths`,
`HLIndex`, and `Size64` is a paged tree tagged `tree`: interior pages
route to leaf pages, and sibling leaves form a doubly linked list. In the
`Paths` tree each leaf entry references three little records describing
one filesystem node: a [format::PathInfo1] (the node's ordinal id), a
[format::PathInfo2] (type, mode, owner, size, checksum, link target), and
a [format::FileRecord] (parent id and name). `VIndex` wraps another,
always empty, tree. `BomInfo` holds summary counts.

# Reading

Use [BomReader] to parse a BOM and walk its contents:

```no_run
use apple_bom::BomReader;

let data = std::fs::read("Bom").unwrap();
let bom = BomReader::parse(data).unwrap();

for path in bom.paths().unwrap() {
    println!("{} mode={:o}", path.path, path.mode);
}
```

# Writing

Feed [builder::BomBuilder] records from any [NodeSource] - a parsed
textual manifest ([manifest::ManifestSource]) or a filesystem walk
([walk::FilesystemSource]) - and write the result to a sink:

```no_run
use apple_bom::{builder::BomBuilder, walk::FilesystemSource, NodeSource};

let mut source = FilesystemSource::new("payload-root");
let builder = BomBuilder::from_entries(source.entries().unwrap()).unwrap();
let mut out = std::fs::File::create("Bom").unwrap();
builder.write_to(&mut out).unwrap();
```

Produced files are deterministic: building twice from the same records
yields byte-identical output.
*/

pub mod builder;
pub mod dump;
pub mod format;
pub mod manifest;
pub mod node;
pub mod reader;
pub mod storage;
mod tree;
pub mod walk;

pub use crate::{
    format::FileType,
    node::{FileEntry, Node, NodeSource},
    reader::{BomPath, BomReader},
    storage::BomStorage,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("(de)serialization error: {0}")]
    Scroll(#[from] scroll::Error),

    #[error("bad magic value encountered")]
    BadMagic,

    #[error("unsupported BOM version: {0}")]
    UnsupportedVersion(u32),

    #[error("BOM file is truncated")]
    Truncated,

    #[error("block {0} points outside the file")]
    BlockOutOfRange(u32),

    #[error("unknown block id: {0}")]
    UnknownBlock(u32),

    #[error("variables section is corrupted")]
    BadVariables,

    #[error("no such variable: {0}")]
    NoSuchVariable(String),

    #[error("variable name too long: {0}")]
    VarNameTooLong(String),

    #[error("tree block does not carry the `tree` tag")]
    BadTreeTag,

    #[error("tree page references are inconsistent")]
    BadTreePage,

    #[error("unsupported file mode: {0:o}")]
    UnsupportedFileMode(u32),

    #[error("unknown file type: {0}")]
    UnknownFileType(u8),

    #[error("symlink \"{0}\" has no link target")]
    MissingLinkTarget(String),

    #[error("parent directory of \"{0}\" does not appear in the input")]
    MissingParent(String),

    #[error("source path {0} is not a directory")]
    NotADirectory(String),

    #[error("malformed manifest line {0}")]
    MalformedManifestLine(usize),

    #[error("invalid digit in octal mode on manifest line {0}")]
    BadOctalMode(usize),
}

/// Result type for this crate.
pub type BomResult<T> = std::result::Result<T, Error>;
