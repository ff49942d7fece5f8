#![allow(clippy::multiple_crate_versions)]
#![doc = include_str!("../README.md")]

use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context as _};
use clap::{Parser, Subcommand};
use gptmanip::{Entry, GptHandle, GptOptions, Header, Signature};
use log::{debug, info, warn};

mod config;
mod report;

use crate::config::{load_options, Overrides};

#[derive(Debug, Subcommand)]
enum CliSubcommand {
    Show {
        #[arg(help = "Disk Image or Block Device")]
        device: PathBuf,
    },
    Verify {
        #[arg(help = "Disk Image or Block Device")]
        device: PathBuf,
    },
    Swap {
        #[arg(help = "Disk Image or Block Device")]
        device: PathBuf,

        #[arg(help = "Index of the first Partition Entry")]
        first: usize,

        #[arg(help = "Index of the second Partition Entry")]
        second: usize,
    },
    Sort {
        #[arg(help = "Disk Image or Block Device")]
        device: PathBuf,
    },
}

#[derive(Parser)]
#[command(version, about = "GUID Partition Table Utility")]
struct Cli {
    #[arg(short, long, global = true, help = "Configuration File")]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Logical Block Size, in bytes")]
    lba_size: Option<u32>,

    #[arg(long, global = true, help = "Primary Header Location, in LBAs")]
    offset: Option<u64>,

    #[arg(long, global = true, help = "Expected Header Signature")]
    signature: Option<Signature>,

    #[clap(subcommand)]
    command: CliSubcommand,
}

fn open_device(
    device: &Path,
    opts: &GptOptions,
    read_only: bool,
) -> Result<GptHandle, anyhow::Error> {
    if !read_only && opts.read_only {
        bail!("{} is configured as read-only", device.display());
    }

    let opts = GptOptions {
        read_only: opts.read_only || read_only,
        ..*opts
    };

    GptHandle::open_with_options(device, &opts)
        .with_context(|| format!("Couldn't open the GPT on {}", device.display()))
}

fn read_verified_table(handle: &mut GptHandle) -> Result<(Header, Vec<Entry>), anyhow::Error> {
    let header = handle.read_header()?;
    handle
        .verify_header(&header)
        .context("Primary GPT Header is corrupted")?;

    let entries = handle.get_all_entries(&header)?;
    header
        .verify_entries(&entries)
        .context("Partition Entries are corrupted")?;

    Ok((header, entries))
}

/// Moves the used entries first, ordered by their first LBA. Returns whether the order changed.
fn sort_entries(entries: &mut [Entry]) -> bool {
    let before = entries.to_vec();

    entries.sort_by_key(|entry| (entry.is_unused(), entry.first_lba));

    entries[..] != before[..]
}

fn show(device: &Path, opts: &GptOptions, out: &mut impl Write) -> Result<(), anyhow::Error> {
    let mut handle = open_device(device, opts, true)?;

    let header = handle.read_header()?;
    if let Err(e) = handle.verify_header(&header) {
        warn!("Primary GPT Header is corrupted: {e}");
    }

    report::write_header(out, &header)?;

    let entries = handle.get_all_entries(&header)?;
    if let Err(e) = header.verify_entries(&entries) {
        warn!("Partition Entries are corrupted: {e}");
    }

    writeln!(out)?;
    report::write_entries(out, &entries)?;

    handle.close();
    Ok(())
}

fn verify(device: &Path, opts: &GptOptions, out: &mut impl Write) -> Result<(), anyhow::Error> {
    let mut handle = open_device(device, opts, true)?;
    let mut failed = false;

    let header = handle.read_header()?;
    match handle.verify_header(&header) {
        Ok(()) => writeln!(out, "Primary Header: OK")?,
        Err(e) => {
            failed = true;
            writeln!(out, "Primary Header: {e}")?;
        }
    }

    match handle
        .get_all_entries(&header)
        .and_then(|entries| header.verify_entries(&entries))
    {
        Ok(()) => writeln!(out, "Partition Entries: OK")?,
        Err(e) => {
            failed = true;
            writeln!(out, "Partition Entries: {e}")?;
        }
    }

    match handle.verify_secondary_header(&header) {
        Ok(_) => writeln!(out, "Secondary Header: OK")?,
        Err(e) => {
            failed = true;
            writeln!(out, "Secondary Header: {e}")?;
        }
    }

    handle.close();

    if failed {
        bail!("{} has an invalid GPT", device.display());
    }

    Ok(())
}

fn swap(
    device: &Path,
    opts: &GptOptions,
    first: usize,
    second: usize,
) -> Result<(), anyhow::Error> {
    let mut handle = open_device(device, opts, false)?;
    let (mut header, mut entries) = read_verified_table(&mut handle)?;

    for idx in [first, second] {
        if idx >= entries.len() {
            bail!(
                "Partition Entry {idx} is out of range (table has {} slots)",
                entries.len()
            );
        }
    }

    if first == second {
        info!("Nothing to swap");
        return Ok(());
    }

    debug!("Swapping Partition Entries {first} and {second}");
    entries.swap(first, second);

    handle.commit(&mut header, &entries)?;
    handle.close();

    Ok(())
}

fn sort(device: &Path, opts: &GptOptions) -> Result<(), anyhow::Error> {
    let mut handle = open_device(device, opts, false)?;
    let (mut header, mut entries) = read_verified_table(&mut handle)?;

    if !sort_entries(&mut entries) {
        info!("Partition Entries are already sorted");
        return Ok(());
    }

    handle.commit(&mut header, &entries)?;
    handle.close();

    Ok(())
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::init();

    let cli = Cli::parse();

    info!(
        "Running {} {}",
        env!("CARGO_CRATE_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let overrides = Overrides {
        lba_size: cli.lba_size,
        offset_lbas: cli.offset,
        signature: cli.signature,
    };
    let opts = load_options(cli.config.as_deref(), &overrides)?;

    match cli.command {
        CliSubcommand::Show { device } => show(&device, &opts, &mut io::stdout().lock()),
        CliSubcommand::Verify { device } => verify(&device, &opts, &mut io::stdout().lock()),
        CliSubcommand::Swap {
            device,
            first,
            second,
        } => swap(&device, &opts, first, second),
        CliSubcommand::Sort { device } => sort(&device, &opts),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use gptmanip::{Entry, GptHandle, GptOptions, Header};
    use tempfile::NamedTempFile;
    use test_log::test;

    use super::{show, sort, sort_entries, swap, verify};

    const DISK_LBAS: u64 = 64;

    fn partition(name: &str, first_lba: u64, last_lba: u64) -> Entry {
        let mut entry = Entry {
            type_guid: [0xaa; 16],
            first_lba,
            last_lba,
            ..Entry::default()
        };

        entry.set_name(name).unwrap();
        entry
    }

    fn disk_image(entries: &[Entry]) -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        file.as_file().set_len(DISK_LBAS * 512).unwrap();

        let mut header = Header {
            position_secondary: DISK_LBAS - 1,
            first_usable_lba: 34,
            last_usable_lba: DISK_LBAS - 34,
            entries: 4,
            ..Header::default()
        };

        let mut handle = GptHandle::open(file.path(), 512, 1, false).unwrap();
        handle.commit(&mut header, entries).unwrap();
        handle.close();

        file
    }

    fn names(file: &NamedTempFile) -> Vec<String> {
        let mut handle = GptHandle::open(file.path(), 512, 1, true).unwrap();
        let header = handle.read_header().unwrap();
        header.verify().unwrap();

        let entries = handle.get_all_entries(&header).unwrap();
        header.verify_entries(&entries).unwrap();
        handle.verify_secondary_header(&header).unwrap();

        entries.iter().map(|e| e.name().unwrap()).collect()
    }

    #[test]
    fn sort_moves_unused_last() {
        let mut entries = [
            Entry::default(),
            partition("root", 40, 50),
            partition("boot", 34, 39),
        ];

        assert!(sort_entries(&mut entries));
        assert_eq!(entries[0].name().unwrap(), "boot");
        assert_eq!(entries[1].name().unwrap(), "root");
        assert!(entries[2].is_unused());

        assert!(!sort_entries(&mut entries), "Sorted entries were reordered");
    }

    #[test]
    fn show_image() {
        let file = disk_image(&[partition("boot", 34, 39)]);

        let mut out = Vec::new();
        show(file.path(), &GptOptions::default(), &mut out).unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Signature: EFI PART\n"), "{out}");
        assert!(out.contains(" boot\n"), "{out}");
    }

    #[test]
    fn verify_image() {
        let file = disk_image(&[partition("boot", 34, 39)]);

        let mut out = Vec::new();
        verify(file.path(), &GptOptions::default(), &mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Primary Header: OK\nPartition Entries: OK\nSecondary Header: OK\n"
        );
    }

    #[test]
    fn verify_corrupted_image() {
        let file = disk_image(&[partition("boot", 34, 39)]);

        let mut disk = fs::read(file.path()).unwrap();
        disk[1024 + 60] ^= 0x01;
        fs::write(file.path(), &disk).unwrap();

        let mut out = Vec::new();
        verify(file.path(), &GptOptions::default(), &mut out).unwrap_err();

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Primary Header: OK\n"), "{out}");
        assert!(
            out.contains("Partition Entries: Partition Entries CRC32 Mismatch"),
            "{out}"
        );
        assert!(out.contains("Secondary Header: OK\n"), "{out}");
    }

    #[test]
    fn verify_oversized_header() {
        let file = disk_image(&[partition("boot", 34, 39)]);

        let mut disk = fs::read(file.path()).unwrap();
        disk[512 + 12..512 + 16].copy_from_slice(&u32::MAX.to_le_bytes());
        fs::write(file.path(), &disk).unwrap();

        let mut out = Vec::new();
        verify(file.path(), &GptOptions::default(), &mut out).unwrap_err();

        let out = String::from_utf8(out).unwrap();
        assert!(
            out.contains("Primary Header: Invalid Header Size: 4294967295 bytes\n"),
            "{out}"
        );
        assert!(out.contains("Partition Entries: OK\n"), "{out}");

        let mut out = Vec::new();
        show(file.path(), &GptOptions::default(), &mut out).unwrap();
        swap(file.path(), &GptOptions::default(), 0, 1).unwrap_err();
    }

    #[test]
    fn swap_entries() {
        let file = disk_image(&[partition("boot", 34, 39), partition("root", 40, 50)]);

        swap(file.path(), &GptOptions::default(), 0, 1).unwrap();

        assert_eq!(names(&file), ["root", "boot", "", ""]);
    }

    #[test]
    fn swap_out_of_range() {
        let file = disk_image(&[partition("boot", 34, 39)]);

        swap(file.path(), &GptOptions::default(), 0, 4).unwrap_err();
    }

    #[test]
    fn swap_read_only() {
        let file = disk_image(&[partition("boot", 34, 39), partition("root", 40, 50)]);
        let opts = GptOptions {
            read_only: true,
            ..GptOptions::default()
        };

        swap(file.path(), &opts, 0, 1).unwrap_err();
        assert_eq!(names(&file), ["boot", "root", "", ""]);
    }

    #[test]
    fn sort_image() {
        let file = disk_image(&[
            Entry::default(),
            partition("root", 40, 50),
            partition("boot", 34, 39),
        ]);

        sort(file.path(), &GptOptions::default()).unwrap();

        assert_eq!(names(&file), ["boot", "root", "", ""]);
    }
}
