// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The textual manifest format describing a filesystem tree.
//!
//! One node per line: `path<TAB>octal-mode<TAB>uid/gid`, extended with
//! `<TAB>size<TAB>crc` for regular files and a further `<TAB>target`
//! for symlinks. The mode is written as decimal digits spelling the
//! octal representation, e.g. `40755` for `0o40755`. The `uid/gid`
//! token may also appear as two separate tokens.

use {
    crate::{
        format::FileType,
        node::{FileEntry, NodeSource},
        BomResult, Error,
    },
    std::io::BufRead,
};

/// A [NodeSource] yielding entries parsed from manifest text.
pub struct ManifestSource<R: BufRead> {
    reader: R,
}

impl<R: BufRead> ManifestSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> NodeSource for ManifestSource<R> {
    fn entries(&mut self) -> BomResult<Vec<FileEntry>> {
        let mut entries = vec![];

        for (index, line) in self.reader.by_ref().lines().enumerate() {
            entries.push(parse_line(&line?, index + 1)?);
        }

        Ok(entries)
    }
}

/// Parse one manifest line. `number` is 1-based and only used in
/// errors.
pub fn parse_line(line: &str, number: usize) -> BomResult<FileEntry> {
    let (path, rest) = line
        .split_once('\t')
        .ok_or(Error::MalformedManifestLine(number))?;

    let mut tokens = rest.split_whitespace().map(String::from).collect::<Vec<_>>();
    if let Some((uid, gid)) = tokens.get(1).and_then(|t| t.split_once('/')) {
        let (uid, gid) = (uid.to_string(), gid.to_string());
        tokens.splice(1..2, [uid, gid]);
    }
    if tokens.len() < 3 {
        return Err(Error::MalformedManifestLine(number));
    }

    let mode = parse_octal_mode(&tokens[0], number)?;
    let uid = parse_u32(&tokens[1], number)?;
    let gid = parse_u32(&tokens[2], number)?;

    let (size, checksum, link_target) = match FileType::from_mode(mode)? {
        FileType::Directory => (0, 0, None),
        FileType::File => {
            if tokens.len() < 5 {
                return Err(Error::MalformedManifestLine(number));
            }

            (parse_u32(&tokens[3], number)?, parse_u32(&tokens[4], number)?, None)
        }
        FileType::Link => {
            if tokens.len() < 6 {
                return Err(Error::MalformedManifestLine(number));
            }

            (
                parse_u32(&tokens[3], number)?,
                parse_u32(&tokens[4], number)?,
                Some(tokens[5].clone()),
            )
        }
    };

    Ok(FileEntry {
        path: path.to_string(),
        mode,
        uid,
        gid,
        size,
        checksum,
        link_target,
    })
}

/// Render an entry as one manifest line, without trailing newline.
pub fn format_entry(entry: &FileEntry) -> BomResult<String> {
    let mut line = format!(
        "{}\t{:o}\t{}/{}",
        entry.path, entry.mode, entry.uid, entry.gid
    );

    match FileType::from_mode(entry.mode)? {
        FileType::Directory => {}
        FileType::File => {
            line.push_str(&format!("\t{}\t{}", entry.size, entry.checksum));
        }
        FileType::Link => {
            line.push_str(&format!(
                "\t{}\t{}\t{}",
                entry.size,
                entry.checksum,
                entry.link_target.as_deref().unwrap_or_default()
            ));
        }
    }

    Ok(line)
}

fn parse_octal_mode(token: &str, number: usize) -> BomResult<u32> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::MalformedManifestLine(number));
    }

    u32::from_str_radix(token, 8).map_err(|_| Error::BadOctalMode(number))
}

fn parse_u32(token: &str, number: usize) -> BomResult<u32> {
    token
        .parse::<u32>()
        .map_err(|_| Error::MalformedManifestLine(number))
}

#[cfg(test)]
mod tests {
    use {super::*, std::io::Cursor};

    fn source(text: &str) -> ManifestSource<Cursor<&[u8]>> {
        ManifestSource::new(Cursor::new(text.as_bytes()))
    }

    #[test]
    fn parses_directory_line() {
        let entry = parse_line("d\t40755\t0/80", 1).unwrap();

        assert_eq!(entry.path, "d");
        assert_eq!(entry.mode, 0o40755);
        assert_eq!(entry.uid, 0);
        assert_eq!(entry.gid, 80);
        assert_eq!(entry.size, 0);
        assert_eq!(entry.checksum, 0);
        assert_eq!(entry.link_target, None);
    }

    #[test]
    fn parses_file_line_with_joined_owner() {
        let entry = parse_line("d/a\t100644\t501/20\t3\t3735928559", 4).unwrap();

        assert_eq!(entry.mode, 0o100644);
        assert_eq!(entry.uid, 501);
        assert_eq!(entry.gid, 20);
        assert_eq!(entry.size, 3);
        assert_eq!(entry.checksum, 0xdeadbeef);
    }

    #[test]
    fn parses_file_line_with_split_owner() {
        let entry = parse_line("a\t100644\t501\t20\t3\t7", 1).unwrap();

        assert_eq!(entry.uid, 501);
        assert_eq!(entry.gid, 20);
        assert_eq!(entry.size, 3);
        assert_eq!(entry.checksum, 7);
    }

    #[test]
    fn parses_symlink_line() {
        let entry = parse_line("l\t120777\t0/0\t6\t123\ttarget", 1).unwrap();

        assert_eq!(entry.mode, 0o120777);
        assert_eq!(entry.size, 6);
        assert_eq!(entry.link_target.as_deref(), Some("target"));
    }

    #[test]
    fn rejects_non_octal_digits() {
        assert!(matches!(
            parse_line("a\t40958\t0/0", 7),
            Err(Error::BadOctalMode(7))
        ));
    }

    #[test]
    fn rejects_line_without_fields() {
        assert!(matches!(
            parse_line("just-a-path", 2),
            Err(Error::MalformedManifestLine(2))
        ));
    }

    #[test]
    fn rejects_file_line_missing_checksum() {
        assert!(matches!(
            parse_line("a\t100644\t0/0\t3", 3),
            Err(Error::MalformedManifestLine(3))
        ));
    }

    #[test]
    fn format_parse_round_trip() {
        let entry = FileEntry {
            path: "d/l".to_string(),
            mode: 0o120777,
            uid: 501,
            gid: 20,
            size: 6,
            checksum: 99,
            link_target: Some("target".to_string()),
        };

        let line = format_entry(&entry).unwrap();
        assert_eq!(line, "d/l\t120777\t501/20\t6\t99\ttarget");
        assert_eq!(parse_line(&line, 1).unwrap(), entry);
    }

    #[test]
    fn source_yields_all_lines() {
        let mut source = source("d\t40755\t0/0\nd/a\t100644\t0/0\t1\t2\n");
        let entries = source.entries().unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].path, "d/a");
    }
}
