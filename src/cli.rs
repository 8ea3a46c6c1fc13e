// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    apple_bom::{
        builder::BomBuilder,
        dump::dump_bom,
        manifest::{self, ManifestSource},
        reader::BomReader,
        walk::FilesystemSource,
        BomResult, NodeSource,
    },
    clap::{value_t, App, AppSettings, Arg, ArgMatches, SubCommand},
    std::{
        fs::File,
        io::{BufReader, BufWriter, Write},
    },
};

const LS_ABOUT: &str = "\
Walk a directory tree and print one manifest line per node.

The output format is the same one `create --filelist` consumes:
path, octal mode, uid/gid, and for regular files and symlinks the
size, CRC-32 checksum, and link target.
";

const CREATE_ABOUT: &str = "\
Create a BOM file describing a directory tree.

The source is either a directory to walk, or - with --filelist - an
already generated manifest. Ownership overrides only make sense while
walking a directory, so they are rejected together with --filelist.
";

pub fn run_cli() -> BomResult<()> {
    env_logger::init();

    let matches = App::new("bom")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Read and write Apple Bill of Materials files")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("ls")
                .about("Print a manifest for a directory tree")
                .long_about(LS_ABOUT)
                .arg(
                    Arg::with_name("uid")
                        .short("u")
                        .long("uid")
                        .takes_value(true)
                        .help("Force user ID to the specified value"),
                )
                .arg(
                    Arg::with_name("gid")
                        .short("g")
                        .long("gid")
                        .takes_value(true)
                        .help("Force group ID to the specified value"),
                )
                .arg(Arg::with_name("path").required(true).help("Directory to walk")),
        )
        .subcommand(
            SubCommand::with_name("create")
                .about("Create a BOM from a directory or manifest")
                .long_about(CREATE_ABOUT)
                .arg(
                    Arg::with_name("filelist")
                        .short("i")
                        .long("filelist")
                        .help("Treat source as a manifest file instead of a directory"),
                )
                .arg(
                    Arg::with_name("uid")
                        .short("u")
                        .long("uid")
                        .takes_value(true)
                        .conflicts_with("filelist")
                        .help("Force user ID to the specified value"),
                )
                .arg(
                    Arg::with_name("gid")
                        .short("g")
                        .long("gid")
                        .takes_value(true)
                        .conflicts_with("filelist")
                        .help("Force group ID to the specified value"),
                )
                .arg(
                    Arg::with_name("source")
                        .required(true)
                        .help("Directory or manifest to read"),
                )
                .arg(
                    Arg::with_name("output")
                        .required(true)
                        .help("BOM file to write"),
                ),
        )
        .subcommand(
            SubCommand::with_name("dump")
                .about("Dump the internal structures of a BOM file")
                .arg(Arg::with_name("path").required(true).help("BOM file to read")),
        )
        .get_matches();

    match matches.subcommand() {
        ("ls", Some(args)) => command_ls(args),
        ("create", Some(args)) => command_create(args),
        ("dump", Some(args)) => command_dump(args),
        _ => unreachable!("subcommand is required by clap"),
    }
}

fn owner_overrides(args: &ArgMatches) -> (Option<u32>, Option<u32>) {
    let uid = if args.is_present("uid") {
        Some(value_t!(args, "uid", u32).unwrap_or_else(|e| e.exit()))
    } else {
        None
    };
    let gid = if args.is_present("gid") {
        Some(value_t!(args, "gid", u32).unwrap_or_else(|e| e.exit()))
    } else {
        None
    };

    (uid, gid)
}

fn command_ls(args: &ArgMatches) -> BomResult<()> {
    let path = args.value_of("path").expect("path is required by clap");
    let (uid, gid) = owner_overrides(args);

    let mut source = FilesystemSource::new(path).with_owner(uid, gid);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for entry in source.entries()? {
        writeln!(out, "{}", manifest::format_entry(&entry)?)?;
    }

    Ok(())
}

fn command_create(args: &ArgMatches) -> BomResult<()> {
    let source = args.value_of("source").expect("source is required by clap");
    let output = args.value_of("output").expect("output is required by clap");

    let entries = if args.is_present("filelist") {
        ManifestSource::new(BufReader::new(File::open(source)?)).entries()?
    } else {
        let (uid, gid) = owner_overrides(args);
        FilesystemSource::new(source).with_owner(uid, gid).entries()?
    };

    let builder = BomBuilder::from_entries(entries)?;

    let mut writer = BufWriter::new(File::create(output)?);
    builder.write_to(&mut writer)?;
    writer.flush()?;

    Ok(())
}

fn command_dump(args: &ArgMatches) -> BomResult<()> {
    let path = args.value_of("path").expect("path is required by clap");

    let bom = BomReader::from_reader(File::open(path)?)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{}", path)?;
    dump_bom(&bom, &mut out)?;

    Ok(())
}
