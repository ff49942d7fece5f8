use std::io::{self, Write};

use gptmanip::{Entry, Header};

pub(crate) fn write_header(out: &mut impl Write, header: &Header) -> io::Result<()> {
    writeln!(out, "Signature: {}", header.signature)?;
    writeln!(out, "Revision: {:#010x}", header.revision)?;
    writeln!(out, "Header Size: {}", header.header_size)?;
    writeln!(out, "Header CRC32: {:#010x}", header.crc32_header)?;
    writeln!(out, "Primary Position: {}", header.position_primary)?;
    writeln!(out, "Secondary Position: {}", header.position_secondary)?;
    writeln!(out, "First Usable LBA: {}", header.first_usable_lba)?;
    writeln!(out, "Last Usable LBA: {}", header.last_usable_lba)?;
    writeln!(out, "Disk GUID: {}", header.disk_uuid().hyphenated())?;
    writeln!(out, "Partition Entries Position: {}", header.position_entries)?;
    writeln!(
        out,
        "Partition Entries: {} of {} bytes",
        header.entries, header.entry_size
    )?;
    writeln!(out, "Partition Entries CRC32: {:#010x}", header.crc32_entries)?;

    Ok(())
}

fn flags(entry: &Entry) -> String {
    [
        (entry.platform_required(), 'R'),
        (entry.efi_ignore(), 'I'),
        (entry.legacy_bootable(), 'B'),
    ]
    .iter()
    .map(|(set, flag)| if *set { *flag } else { '-' })
    .collect()
}

/// Lists the used entries, along with their slot index
pub(crate) fn write_entries(out: &mut impl Write, entries: &[Entry]) -> io::Result<()> {
    writeln!(
        out,
        "{:>5} {:>12} {:>12} {:>5} {:<36} {:<36} Name",
        "Index", "First LBA", "Last LBA", "Flags", "Type GUID", "Unique GUID"
    )?;

    for (idx, entry) in entries.iter().enumerate() {
        if entry.is_unused() {
            continue;
        }

        writeln!(
            out,
            "{:>5} {:>12} {:>12} {:>5} {:<36} {:<36} {}",
            idx,
            entry.first_lba,
            entry.last_lba,
            flags(entry),
            entry.type_uuid().hyphenated(),
            entry.unique_uuid().hyphenated(),
            String::from_utf16_lossy(entry.name_units())
        )?;
    }

    Ok(())
}
