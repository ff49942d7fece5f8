//! On-disk layouts of the GPT header and partition entries, and the conversion
//! between them and the [`Header`] and [`Entry`] structures.
//!
//! Every field is little-endian and stored at a fixed byte offset, regardless
//! of the host's endianness or alignment rules.
//!
//! | Header field          | Offset | Size |
//! |-----------------------|--------|------|
//! | Signature             | 0      | 8    |
//! | Revision              | 8      | 4    |
//! | Header Size           | 12     | 4    |
//! | Header CRC32          | 16     | 4    |
//! | Reserved (zero)       | 20     | 4    |
//! | Current LBA           | 24     | 8    |
//! | Alternate LBA         | 32     | 8    |
//! | First Usable LBA      | 40     | 8    |
//! | Last Usable LBA       | 48     | 8    |
//! | Disk GUID             | 56     | 16   |
//! | Entries LBA           | 72     | 8    |
//! | Number of Entries     | 80     | 4    |
//! | Size of an Entry      | 84     | 4    |
//! | Entries CRC32         | 88     | 4    |
//!
//! | Entry field           | Offset | Size |
//! |-----------------------|--------|------|
//! | Partition Type GUID   | 0      | 16   |
//! | Unique Partition GUID | 16     | 16   |
//! | First LBA             | 32     | 8    |
//! | Last LBA              | 40     | 8    |
//! | Attributes            | 48     | 8    |
//! | Name (UTF-16LE)       | 56     | 72   |

use log::trace;

use crate::{Entry, Header, Signature};

/// Size of the fixed part of the header, in bytes
pub const RAW_HEADER_SIZE: usize = 92;

/// Size of a partition entry record, in bytes
pub const RAW_ENTRY_SIZE: usize = 128;

/// Number of UTF-16 code units in a partition name
pub const NAME_LEN: usize = 36;

/// A GPT header, as laid out on disk
pub type RawHeader = [u8; RAW_HEADER_SIZE];

/// A GPT partition entry, as laid out on disk
pub type RawEntry = [u8; RAW_ENTRY_SIZE];

/// Scratch buffer used to write or hash padding, so that we never allocate it
pub(crate) const ZEROES: [u8; 256] = [0; 256];

const HEADER_SIGNATURE_OFFSET: usize = 0;
const HEADER_REVISION_OFFSET: usize = 8;
const HEADER_SIZE_OFFSET: usize = 12;
const HEADER_CRC32_OFFSET: usize = 16;
const HEADER_RESERVED_OFFSET: usize = 20;
const HEADER_CURRENT_LBA_OFFSET: usize = 24;
const HEADER_ALTERNATE_LBA_OFFSET: usize = 32;
const HEADER_FIRST_USABLE_OFFSET: usize = 40;
const HEADER_LAST_USABLE_OFFSET: usize = 48;
const HEADER_GUID_OFFSET: usize = 56;
const HEADER_ENTRIES_LBA_OFFSET: usize = 72;
const HEADER_ENTRIES_NUM_OFFSET: usize = 80;
const HEADER_ENTRY_SIZE_OFFSET: usize = 84;
const HEADER_ENTRIES_CRC32_OFFSET: usize = 88;

const ENTRY_TYPE_GUID_OFFSET: usize = 0;
const ENTRY_GUID_OFFSET: usize = 16;
const ENTRY_FIRST_LBA_OFFSET: usize = 32;
const ENTRY_LAST_LBA_OFFSET: usize = 40;
const ENTRY_ATTRIBUTES_OFFSET: usize = 48;
const ENTRY_NAME_OFFSET: usize = 56;

fn read_array<const N: usize>(bytes: &[u8], offset: usize) -> [u8; N] {
    let mut array = [0; N];
    array.copy_from_slice(&bytes[offset..(offset + N)]);
    array
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(read_array(bytes, offset))
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(read_array(bytes, offset))
}

fn write_bytes(bytes: &mut [u8], offset: usize, val: &[u8]) {
    bytes[offset..(offset + val.len())].copy_from_slice(val);
}

/// Returns how many leading bytes of an entry record are stored in a slot of `stride` bytes
#[must_use]
pub fn record_len(stride: u32) -> usize {
    usize::try_from(stride).map_or(RAW_ENTRY_SIZE, |s| s.min(RAW_ENTRY_SIZE))
}

/// Returns how many padding bytes follow an entry record in a slot of `stride` bytes
#[must_use]
pub fn padding_len(stride: u32) -> u64 {
    u64::from(stride).saturating_sub(RAW_ENTRY_SIZE as u64)
}

/// Decodes a header from its on-disk representation. The reserved field is ignored.
#[must_use]
pub fn decode_header(raw: &RawHeader) -> Header {
    Header {
        signature: Signature::new(read_array(raw, HEADER_SIGNATURE_OFFSET)),
        revision: read_u32(raw, HEADER_REVISION_OFFSET),
        header_size: read_u32(raw, HEADER_SIZE_OFFSET),
        crc32_header: read_u32(raw, HEADER_CRC32_OFFSET),
        position_primary: read_u64(raw, HEADER_CURRENT_LBA_OFFSET),
        position_secondary: read_u64(raw, HEADER_ALTERNATE_LBA_OFFSET),
        first_usable_lba: read_u64(raw, HEADER_FIRST_USABLE_OFFSET),
        last_usable_lba: read_u64(raw, HEADER_LAST_USABLE_OFFSET),
        disk_guid: read_array(raw, HEADER_GUID_OFFSET),
        position_entries: read_u64(raw, HEADER_ENTRIES_LBA_OFFSET),
        entries: read_u32(raw, HEADER_ENTRIES_NUM_OFFSET),
        entry_size: read_u32(raw, HEADER_ENTRY_SIZE_OFFSET),
        crc32_entries: read_u32(raw, HEADER_ENTRIES_CRC32_OFFSET),
    }
}

/// Encodes a header to its on-disk representation. The reserved field is always zero.
#[must_use]
pub fn encode_header(header: &Header) -> RawHeader {
    let mut raw = [0; RAW_HEADER_SIZE];

    write_bytes(&mut raw, HEADER_SIGNATURE_OFFSET, header.signature.as_bytes());
    write_bytes(&mut raw, HEADER_REVISION_OFFSET, &header.revision.to_le_bytes());
    write_bytes(&mut raw, HEADER_SIZE_OFFSET, &header.header_size.to_le_bytes());
    write_bytes(&mut raw, HEADER_CRC32_OFFSET, &header.crc32_header.to_le_bytes());
    write_bytes(&mut raw, HEADER_RESERVED_OFFSET, &[0; 4]);
    write_bytes(
        &mut raw,
        HEADER_CURRENT_LBA_OFFSET,
        &header.position_primary.to_le_bytes(),
    );
    write_bytes(
        &mut raw,
        HEADER_ALTERNATE_LBA_OFFSET,
        &header.position_secondary.to_le_bytes(),
    );
    write_bytes(
        &mut raw,
        HEADER_FIRST_USABLE_OFFSET,
        &header.first_usable_lba.to_le_bytes(),
    );
    write_bytes(
        &mut raw,
        HEADER_LAST_USABLE_OFFSET,
        &header.last_usable_lba.to_le_bytes(),
    );
    write_bytes(&mut raw, HEADER_GUID_OFFSET, &header.disk_guid);
    write_bytes(
        &mut raw,
        HEADER_ENTRIES_LBA_OFFSET,
        &header.position_entries.to_le_bytes(),
    );
    write_bytes(&mut raw, HEADER_ENTRIES_NUM_OFFSET, &header.entries.to_le_bytes());
    write_bytes(&mut raw, HEADER_ENTRY_SIZE_OFFSET, &header.entry_size.to_le_bytes());
    write_bytes(
        &mut raw,
        HEADER_ENTRIES_CRC32_OFFSET,
        &header.crc32_entries.to_le_bytes(),
    );

    raw
}

/// Decodes a full 128 bytes entry record
#[must_use]
pub fn decode_entry_record(raw: &RawEntry) -> Entry {
    let mut name = [0; NAME_LEN];
    for (idx, unit) in name.iter_mut().enumerate() {
        *unit = u16::from_le_bytes(read_array(raw, ENTRY_NAME_OFFSET + idx * 2));
    }

    Entry {
        type_guid: read_array(raw, ENTRY_TYPE_GUID_OFFSET),
        guid: read_array(raw, ENTRY_GUID_OFFSET),
        first_lba: read_u64(raw, ENTRY_FIRST_LBA_OFFSET),
        last_lba: read_u64(raw, ENTRY_LAST_LBA_OFFSET),
        attributes: read_u64(raw, ENTRY_ATTRIBUTES_OFFSET),
        name,
    }
}

/// Encodes an entry to a full 128 bytes record
#[must_use]
pub fn encode_entry_record(entry: &Entry) -> RawEntry {
    let mut raw = [0; RAW_ENTRY_SIZE];

    write_bytes(&mut raw, ENTRY_TYPE_GUID_OFFSET, &entry.type_guid);
    write_bytes(&mut raw, ENTRY_GUID_OFFSET, &entry.guid);
    write_bytes(&mut raw, ENTRY_FIRST_LBA_OFFSET, &entry.first_lba.to_le_bytes());
    write_bytes(&mut raw, ENTRY_LAST_LBA_OFFSET, &entry.last_lba.to_le_bytes());
    write_bytes(&mut raw, ENTRY_ATTRIBUTES_OFFSET, &entry.attributes.to_le_bytes());

    for (idx, unit) in entry.name.iter().enumerate() {
        write_bytes(&mut raw, ENTRY_NAME_OFFSET + idx * 2, &unit.to_le_bytes());
    }

    raw
}

/// Decodes an entry stored in a slot of `stride` bytes.
///
/// Only the first `min(stride, 128)` bytes of `raw` are used. Any field that
/// doesn't fit in a shorter slot is left to zero, and whatever follows the
/// record in a longer slot is padding and is ignored.
#[must_use]
pub fn decode_entry(raw: &[u8], stride: u32) -> Entry {
    let len = record_len(stride).min(raw.len());

    let mut record = [0; RAW_ENTRY_SIZE];
    record[..len].copy_from_slice(&raw[..len]);

    trace!("Decoding {len} bytes entry record (stride {stride} bytes)");

    decode_entry_record(&record)
}

/// Encodes an entry to exactly `stride` bytes.
///
/// The record is truncated if the slot is smaller than 128 bytes, and followed
/// by zeroes if it's larger.
#[must_use]
pub fn encode_entry(entry: &Entry, stride: u32) -> Vec<u8> {
    let record = encode_entry_record(entry);
    let len = record_len(stride);

    let mut bytes = Vec::with_capacity(len);
    bytes.extend_from_slice(&record[..len]);

    let padding = usize::try_from(padding_len(stride)).unwrap_or(0);
    bytes.resize(len + padding, 0);

    trace!("Encoded entry to {} bytes (stride {stride} bytes)", bytes.len());

    bytes
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::{
        decode_entry, decode_entry_record, decode_header, encode_entry, encode_entry_record,
        encode_header, padding_len, record_len, RAW_ENTRY_SIZE, RAW_HEADER_SIZE,
    };
    use crate::{Entry, Header, Signature};

    fn sample_header() -> Header {
        Header {
            signature: Signature::new(*b"EFI PART"),
            revision: 0x0001_0000,
            header_size: 92,
            crc32_header: 0xdead_beef,
            position_primary: 1,
            position_secondary: 0x0003_ffff,
            first_usable_lba: 34,
            last_usable_lba: 0x0003_ffde,
            disk_guid: [
                0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd,
                0xee, 0xff,
            ],
            position_entries: 2,
            entries: 128,
            entry_size: 128,
            crc32_entries: 0x0102_0304,
        }
    }

    fn sample_entry() -> Entry {
        let mut entry = Entry {
            type_guid: [0x28; 16],
            guid: [0x42; 16],
            first_lba: 2048,
            last_lba: 4095,
            attributes: 0x8000_0000_0000_0004,
            ..Entry::default()
        };
        entry.set_name("root").unwrap();
        entry
    }

    #[test]
    fn header_layout() {
        let raw = encode_header(&sample_header());

        assert_eq!(raw.len(), RAW_HEADER_SIZE);
        assert_eq!(&raw[0..8], b"EFI PART");
        assert_eq!(&raw[8..12], &[0x00, 0x00, 0x01, 0x00]);
        assert_eq!(&raw[12..16], &92_u32.to_le_bytes());
        assert_eq!(&raw[16..20], &0xdead_beef_u32.to_le_bytes());
        assert_eq!(&raw[20..24], &[0, 0, 0, 0]);
        assert_eq!(&raw[24..32], &1_u64.to_le_bytes());
        assert_eq!(&raw[32..40], &0x0003_ffff_u64.to_le_bytes());
        assert_eq!(&raw[40..48], &34_u64.to_le_bytes());
        assert_eq!(&raw[48..56], &0x0003_ffde_u64.to_le_bytes());
        assert_eq!(raw[56], 0x00);
        assert_eq!(raw[71], 0xff);
        assert_eq!(&raw[72..80], &2_u64.to_le_bytes());
        assert_eq!(&raw[80..84], &128_u32.to_le_bytes());
        assert_eq!(&raw[84..88], &128_u32.to_le_bytes());
        assert_eq!(&raw[88..92], &0x0102_0304_u32.to_le_bytes());
    }

    #[test]
    fn header_round_trip() {
        let header = sample_header();

        assert_eq!(decode_header(&encode_header(&header)), header);
    }

    #[test]
    fn header_reserved_ignored() {
        let mut raw = encode_header(&sample_header());
        raw[20..24].copy_from_slice(&[1, 2, 3, 4]);

        let header = decode_header(&raw);
        assert_eq!(header, sample_header());
        assert_eq!(&encode_header(&header)[20..24], &[0, 0, 0, 0]);
    }

    #[test]
    fn entry_layout() {
        let raw = encode_entry_record(&sample_entry());

        assert_eq!(&raw[0..16], &[0x28; 16]);
        assert_eq!(&raw[16..32], &[0x42; 16]);
        assert_eq!(&raw[32..40], &2048_u64.to_le_bytes());
        assert_eq!(&raw[40..48], &4095_u64.to_le_bytes());
        assert_eq!(&raw[48..56], &0x8000_0000_0000_0004_u64.to_le_bytes());
        assert_eq!(&raw[56..64], &[b'r', 0, b'o', 0, b'o', 0, b't', 0]);
        assert!(raw[64..].iter().all(|b| *b == 0), "Name isn't zero padded");
    }

    #[test]
    fn entry_name_code_units_preserved() {
        let mut raw = [0; RAW_ENTRY_SIZE];
        raw[0] = 1;
        // An unpaired surrogate must survive as-is.
        raw[56..58].copy_from_slice(&0xd800_u16.to_le_bytes());
        raw[126..128].copy_from_slice(&0x00e9_u16.to_le_bytes());

        let entry = decode_entry_record(&raw);
        assert_eq!(entry.name[0], 0xd800);
        assert_eq!(entry.name[35], 0x00e9);
        assert_eq!(encode_entry_record(&entry), raw);
    }

    #[test]
    fn entry_round_trip_large_stride() {
        let entry = sample_entry();

        for stride in [128, 129, 256, 512] {
            let bytes = encode_entry(&entry, stride);

            assert_eq!(bytes.len(), stride as usize);
            assert!(
                bytes[RAW_ENTRY_SIZE..].iter().all(|b| *b == 0),
                "Padding isn't zeroed"
            );
            assert_eq!(decode_entry(&bytes, stride), entry);
        }
    }

    #[test]
    fn entry_truncated_stride() {
        let entry = sample_entry();
        let bytes = encode_entry(&entry, 48);

        assert_eq!(bytes.len(), 48);

        let decoded = decode_entry(&bytes, 48);
        assert_eq!(decoded.type_guid, entry.type_guid);
        assert_eq!(decoded.guid, entry.guid);
        assert_eq!(decoded.first_lba, entry.first_lba);
        assert_eq!(decoded.last_lba, entry.last_lba);
        assert_eq!(decoded.attributes, 0);
        assert_eq!(decoded.name, [0; 36]);
    }

    #[test]
    fn entry_truncated_mid_name() {
        let entry = sample_entry();
        let bytes = encode_entry(&entry, 60);
        let decoded = decode_entry(&bytes, 60);

        assert_eq!(decoded.attributes, entry.attributes);
        assert_eq!(decoded.name_units(), &[u16::from(b'r'), u16::from(b'o')]);
    }

    #[test]
    fn stride_arithmetic() {
        assert_eq!(record_len(64), 64);
        assert_eq!(record_len(128), 128);
        assert_eq!(record_len(4096), 128);

        assert_eq!(padding_len(64), 0);
        assert_eq!(padding_len(128), 0);
        assert_eq!(padding_len(4096), 3968);
    }
}
