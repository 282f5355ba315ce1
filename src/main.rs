#![forbid(unsafe_code)]

use std::{
    fs::{self, File},
    io::{self, BufReader, Write},
    path::{Component, Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use log::info;
use structopt::StructOpt;

use pakf::{Archive, ArchiveReader};

////////////////////////////////////////////////////////////////////////////////

#[derive(StructOpt, Debug)]
#[structopt(name = "pakf", about = "Lists and unpacks PAKF archives")]
struct Opts {
    /// Increase logging verbosity (-v, -vv, -vvv)
    #[structopt(short, long, parse(from_occurrences), global = true)]
    verbose: usize,

    /// Silence all log output
    #[structopt(short, long, global = true)]
    quiet: bool,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt, Debug)]
enum Command {
    /// Print name, level, sizes and CRC-32 of every entry
    List {
        #[structopt(parse(from_os_str))]
        archive: PathBuf,

        /// Fail if a decoded size differs from the one in the header
        #[structopt(long)]
        strict: bool,
    },
    /// Write every entry's decoded data to the output directory
    Unpack {
        #[structopt(parse(from_os_str))]
        archive: PathBuf,

        #[structopt(short, long, parse(from_os_str), default_value = ".")]
        output: PathBuf,

        /// Fail if a decoded size differs from the one in the header
        #[structopt(long)]
        strict: bool,
    },
}

////////////////////////////////////////////////////////////////////////////////

fn open_archive(path: &Path, strict: bool) -> Result<Archive> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    ArchiveReader::new(BufReader::new(file))
        .verify_lengths(strict)
        .read_archive()
        .with_context(|| format!("cannot read archive {}", path.display()))
}

fn list(archive: &Archive, mut out: impl Write) -> Result<()> {
    writeln!(
        out,
        "{:<16} {:>5} {:>10} {:>10} {:>8}",
        "name", "level", "packed", "size", "crc32"
    )?;
    for entry in archive {
        writeln!(
            out,
            "{:<16} {:>5} {:>10} {:>10} {:08x}",
            entry.name(),
            entry.compression_level(),
            entry.compressed_length(),
            entry.data().len(),
            entry.crc32()
        )?;
    }
    writeln!(
        out,
        "{} entries, declared size {}",
        archive.len(),
        archive.declared_size()
    )?;
    Ok(())
}

/// Resolves an entry name to a path directly inside `dir`.
fn output_path(dir: &Path, name: &str) -> Result<PathBuf> {
    if name.contains(|c: char| c == '/' || c == '\\') {
        bail!("entry name {:?} contains a path separator", name);
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(file_name)), None) => Ok(dir.join(file_name)),
        _ => bail!("entry name {:?} is not a plain file name", name),
    }
}

fn unpack(archive: &Archive, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
    for entry in archive {
        let path = output_path(dir, entry.name())?;
        fs::write(&path, entry.data())
            .with_context(|| format!("cannot write {}", path.display()))?;
        info!("{} ({} bytes)", path.display(), entry.data().len());
    }
    Ok(())
}

fn main() -> Result<()> {
    let opts = Opts::from_args();
    stderrlog::new()
        .quiet(opts.quiet)
        .verbosity(opts.verbose + 1)
        .init()?;

    match opts.command {
        Command::List { archive, strict } => {
            let archive = open_archive(&archive, strict)?;
            list(&archive, io::stdout().lock())
        }
        Command::Unpack {
            archive,
            output,
            strict,
        } => {
            let archive = open_archive(&archive, strict)?;
            unpack(&archive, &output)
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    /// Archive whose entries all hold "abcd"; `uncompressed` is the header's claim.
    fn archive_with(entries: &[(&str, u32)]) -> Vec<u8> {
        let mut bytes = b"PAKF\x00\x00\x00\x00".to_vec();
        for (name, uncompressed) in entries {
            let mut field = [0u8; 16];
            field[..name.len()].copy_from_slice(name.as_bytes());
            bytes.extend_from_slice(&field);
            bytes.extend_from_slice(&3u32.to_le_bytes());
            bytes.extend_from_slice(&5u32.to_le_bytes());
            bytes.extend_from_slice(&uncompressed.to_le_bytes());
            bytes.extend_from_slice(&[0x03, b'a', b'b', b'c', b'd']);
        }
        bytes
    }

    fn sample_archive() -> Vec<u8> {
        archive_with(&[("test.txt", 4)])
    }

    fn scratch_dir(tag: &str) -> Result<PathBuf> {
        let dir = std::env::temp_dir().join(format!("pakf-{}-{}", tag, std::process::id()));
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn dir_names(dir: &Path) -> Result<Vec<std::ffi::OsString>> {
        let mut names = fs::read_dir(dir)?
            .map(|e| e.map(|e| e.file_name()))
            .collect::<io::Result<Vec<_>>>()?;
        names.sort();
        Ok(names)
    }

    #[test]
    fn plain_names_are_joined() -> Result<()> {
        let dir = Path::new("out");
        assert_eq!(output_path(dir, "test.txt")?, dir.join("test.txt"));
        assert_eq!(output_path(dir, "NOEXT")?, dir.join("NOEXT"));
        Ok(())
    }

    #[test]
    fn escaping_names_are_rejected() {
        let dir = Path::new("out");
        for name in ["", ".", "..", "../evil", "a/b", "/etc", "c:\\x", "dir\\f"] {
            assert!(output_path(dir, name).is_err(), "{:?} accepted", name);
        }
    }

    #[test]
    fn list_prints_every_entry() -> Result<()> {
        let archive = pakf::read_archive(sample_archive().as_slice())?;
        let mut out = Vec::new();
        list(&archive, &mut out)?;

        let text = String::from_utf8(out)?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("test.txt"));
        assert!(lines[1].ends_with(&format!("{:08x}", archive.entries()[0].crc32())));
        assert_eq!(lines[2], "1 entries, declared size 0");
        Ok(())
    }

    #[test]
    fn unpack_creates_output_dir() -> Result<()> {
        let base = scratch_dir("unpack")?;
        let path = base.join("sample.pak");
        fs::write(&path, sample_archive())?;

        let archive = open_archive(&path, true)?;
        let out = base.join("out").join("nested");
        assert!(!out.exists());
        unpack(&archive, &out)?;

        assert_eq!(fs::read(out.join("test.txt"))?, b"abcd");
        assert_eq!(dir_names(&out)?, ["test.txt"]);

        fs::remove_dir_all(&base)?;
        Ok(())
    }

    #[test]
    fn strict_open_rejects_size_mismatch() -> Result<()> {
        let base = scratch_dir("strict")?;
        let path = base.join("lying.pak");
        fs::write(&path, archive_with(&[("test.txt", 9)]))?;

        let err = open_archive(&path, true).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<pakf::Error>(),
            Some(pakf::Error::LengthMismatch {
                expected: 9,
                actual: 4,
                ..
            })
        ));
        assert_eq!(open_archive(&path, false)?.entries()[0].data(), b"abcd");

        fs::remove_dir_all(&base)?;
        Ok(())
    }

    #[test]
    fn unpack_never_writes_outside_output_dir() -> Result<()> {
        let base = scratch_dir("escape")?;
        for (i, name) in ["..", "../escaped.txt"].into_iter().enumerate() {
            let path = base.join(format!("evil{}.pak", i));
            fs::write(&path, archive_with(&[(name, 4)]))?;
            let archive = open_archive(&path, true)?;

            let out = base.join(format!("out{}", i));
            let before = dir_names(&base)?;
            assert!(unpack(&archive, &out).is_err(), "{:?} unpacked", name);

            let mut expected = before;
            expected.push(format!("out{}", i).into());
            expected.sort();
            assert_eq!(dir_names(&base)?, expected);
            assert!(dir_names(&out)?.is_empty());
        }
        assert!(!base.join("escaped.txt").exists());

        fs::remove_dir_all(&base)?;
        Ok(())
    }
}
