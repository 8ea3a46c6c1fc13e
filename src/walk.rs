// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Producing BOM records from a live directory tree.

use {
    crate::{
        format::FileType,
        node::{FileEntry, NodeSource},
        BomResult, Error,
    },
    log::debug,
    std::{
        fs,
        io::Read,
        os::unix::fs::MetadataExt,
        path::{Path, PathBuf},
    },
};

/// A [NodeSource] that walks a directory with `lstat` semantics.
///
/// Directory entries whose name begins with `.` are skipped. Children
/// are visited in ascending name order so the emitted record stream is
/// deterministic. Regular files are checksummed with CRC-32 over their
/// contents; symlinks over their target string.
pub struct FilesystemSource {
    root: PathBuf,
    uid_override: Option<u32>,
    gid_override: Option<u32>,
}

impl FilesystemSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            uid_override: None,
            gid_override: None,
        }
    }

    /// Force ownership fields instead of reporting filesystem values.
    pub fn with_owner(mut self, uid: Option<u32>, gid: Option<u32>) -> Self {
        self.uid_override = uid;
        self.gid_override = gid;

        self
    }

    fn walk(&self, dir: &Path, prefix: &str, entries: &mut Vec<FileEntry>) -> BomResult<()> {
        let mut names = vec![];
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            names.push((name, entry.path()));
        }
        names.sort();

        for (name, path) in names {
            let metadata = fs::symlink_metadata(&path)?;
            let mode = metadata.mode();
            let file_type = FileType::from_mode(mode)?;

            let relative = if prefix.is_empty() {
                name
            } else {
                format!("{}/{}", prefix, name)
            };

            let (size, checksum, link_target) = match file_type {
                FileType::Directory => (0, 0, None),
                FileType::File => (metadata.len() as u32, file_crc32(&path)?, None),
                FileType::Link => {
                    let target = fs::read_link(&path)?.to_string_lossy().to_string();
                    let checksum = crc32fast::hash(target.as_bytes());

                    (metadata.len() as u32, checksum, Some(target))
                }
            };

            entries.push(FileEntry {
                path: relative.clone(),
                mode,
                uid: self.uid_override.unwrap_or_else(|| metadata.uid()),
                gid: self.gid_override.unwrap_or_else(|| metadata.gid()),
                size,
                checksum,
                link_target,
            });

            if file_type == FileType::Directory {
                self.walk(&path, &relative, entries)?;
            }
        }

        Ok(())
    }
}

impl NodeSource for FilesystemSource {
    fn entries(&mut self) -> BomResult<Vec<FileEntry>> {
        let metadata = fs::metadata(&self.root)?;
        if !metadata.is_dir() {
            return Err(Error::NotADirectory(self.root.display().to_string()));
        }

        let mut entries = vec![];
        self.walk(&self.root, "", &mut entries)?;

        debug!("collected {} entries under {}", entries.len(), self.root.display());

        Ok(entries)
    }
}

fn file_crc32(path: &Path) -> BomResult<u32> {
    let mut file = fs::File::open(path)?;
    let mut hasher = crc32fast::Hasher::new();

    let mut buffer = [0u8; 32768];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hasher.finalize())
}
