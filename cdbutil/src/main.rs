//! `cdbutil` — build, look up, and dump `.cdb` files from the command line.
//!
//! `build` reads newline-delimited `key\tvalue` records from an input file (or
//! stdin) and writes a published `.cdb`. `get` looks up a key, printing every
//! value stored under it. `dump` walks a whole file back out in the same
//! `key\tvalue` form `build` accepts, so the two round-trip.

extern crate cdb;
#[macro_use]
extern crate clap;
extern crate env_logger;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;
extern crate tempfile;

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use std::process;

use clap::{App, Arg, SubCommand};

use cdb::OpenMode;

fn main() {
    env_logger::init();

    let matches = App::new("cdbutil")
        .version(crate_version!())
        .about("build, look up, and dump constant databases")
        .subcommand(
            SubCommand::with_name("build")
                .about("build a .cdb file from tab-delimited key/value input")
                .arg(Arg::with_name("OUTPUT").required(true))
                .arg(
                    Arg::with_name("input")
                        .short("i")
                        .long("input")
                        .takes_value(true)
                        .help("read records from this file instead of stdin"),
                ),
        )
        .subcommand(
            SubCommand::with_name("get")
                .about("print every value stored under a key")
                .arg(Arg::with_name("DB").required(true))
                .arg(Arg::with_name("KEY").required(true))
                .arg(
                    Arg::with_name("mode")
                        .short("m")
                        .long("mode")
                        .takes_value(true)
                        .possible_values(&["mmap", "heap", "unbuffered"])
                        .default_value("mmap"),
                ),
        )
        .subcommand(
            SubCommand::with_name("dump")
                .about("print every record in a .cdb file as tab-delimited key/value pairs")
                .arg(Arg::with_name("DB").required(true))
                .arg(
                    Arg::with_name("mode")
                        .short("m")
                        .long("mode")
                        .takes_value(true)
                        .possible_values(&["mmap", "heap", "unbuffered"])
                        .default_value("mmap"),
                ),
        )
        .get_matches();

    let result = match matches.subcommand() {
        ("build", Some(m)) => build(
            m.value_of("OUTPUT").unwrap(),
            m.value_of("input"),
        ),
        ("get", Some(m)) => get(
            m.value_of("DB").unwrap(),
            m.value_of("KEY").unwrap(),
            parse_mode(m.value_of("mode").unwrap()),
        ),
        ("dump", Some(m)) => dump(
            m.value_of("DB").unwrap(),
            parse_mode(m.value_of("mode").unwrap()),
        ),
        _ => {
            eprintln!("cdbutil: a subcommand is required (build, get, dump); see --help");
            process::exit(2);
        }
    };

    if let Err(e) = result {
        eprintln!("cdbutil: {}", e);
        process::exit(1);
    }
}

fn parse_mode(s: &str) -> OpenMode {
    match s {
        "mmap" => OpenMode::Mmap,
        "heap" => OpenMode::Heap,
        "unbuffered" => OpenMode::Unbuffered,
        _ => unreachable!("clap restricts this to the possible_values list"),
    }
}

/// Splits one input line on the first tab into `(key, value)`. Lines with no
/// tab are rejected rather than silently treated as a key with an empty value.
fn split_record(line: &str) -> Result<(&str, &str), failure::Error> {
    match line.find('\t') {
        Some(idx) => Ok((&line[..idx], &line[idx + 1..])),
        None => Err(format_err!(
            "malformed input line (expected <key>\\t<value>): {:?}",
            line
        )),
    }
}

fn build(output: &str, input: Option<&str>) -> Result<(), failure::Error> {
    let output_path = Path::new(output);
    let dir = output_path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    let tmp = tempfile::NamedTempFile::new_in(dir)?;
    let temp_path = tmp.path().to_path_buf();
    // Release the handle `cdb::builder` will reopen at `temp_path`; the file
    // stays on disk until the rename (or an error) removes it.
    tmp.keep()?;

    let mut builder = cdb::builder(output_path, temp_path.as_path())?;

    let count = match input {
        Some(path) => {
            let f = File::open(path)?;
            read_records(BufReader::new(f), &mut builder)?
        }
        None => {
            let stdin = io::stdin();
            read_records(stdin.lock(), &mut builder)?
        }
    };

    builder.finish()?;
    debug!("build: wrote {} records to {}", count, output);
    Ok(())
}

fn read_records<R: BufRead>(r: R, builder: &mut cdb::Builder) -> Result<u64, failure::Error> {
    let mut count = 0u64;
    for line in r.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let (key, value) = split_record(&line)?;
        builder.insert(key.as_bytes(), value.as_bytes())?;
        count += 1;
    }
    Ok(count)
}

fn get(db: &str, key: &str, mode: OpenMode) -> Result<(), failure::Error> {
    let reader = cdb::open(db, mode)?;
    let values = reader.multi_find(key.as_bytes())?;
    if values.is_empty() {
        process::exit(1);
    }
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for value in &values {
        out.write_all(value)?;
        out.write_all(b"\n")?;
    }
    Ok(())
}

fn dump(db: &str, mode: OpenMode) -> Result<(), failure::Error> {
    let mut reader = cdb::open(db, mode)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for entry in reader.iter() {
        let (key, value) = entry?;
        out.write_all(&key)?;
        out.write_all(b"\t")?;
        out.write_all(&value)?;
        out.write_all(b"\n")?;
    }
    Ok(())
}
