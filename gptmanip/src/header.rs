use core::iter;

use log::{debug, warn};
use uuid::Uuid;

use crate::{
    checksum,
    raw::{encode_entry_record, encode_header, padding_len, record_len, RAW_HEADER_SIZE},
    ChecksumKind, Entry, GptError, Signature, DEFAULT_OFFSET_LBAS, GPT_REVISION, GPT_SIGNATURE,
    MIN_LBA_SIZE,
};

/// Size of the fixed part of the header, as stored in the header size field
pub const HEADER_SIZE: u32 = 92;

/// Default number of partition entries
pub const DEFAULT_ENTRIES: u32 = 128;

/// Default size of a partition entry, in bytes
pub const DEFAULT_ENTRY_SIZE: u32 = 128;

/// A GPT Header
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Header {
    /// Header signature, `EFI PART` for a standard table
    pub signature: Signature,

    /// Header revision
    pub revision: u32,

    /// Size of the header, in bytes, covered by the header CRC32
    pub header_size: u32,

    /// CRC32 of the header, computed with this field set to zero
    pub crc32_header: u32,

    /// LBA of this header
    pub position_primary: u64,

    /// LBA of the alternate header
    pub position_secondary: u64,

    /// First LBA usable by a partition
    pub first_usable_lba: u64,

    /// Last LBA usable by a partition
    pub last_usable_lba: u64,

    /// Disk GUID, in its on-disk byte order
    pub disk_guid: [u8; 16],

    /// LBA of the partition entry array
    pub position_entries: u64,

    /// Number of slots in the partition entry array
    pub entries: u32,

    /// Size of a partition entry slot, in bytes
    pub entry_size: u32,

    /// CRC32 of the partition entry array
    pub crc32_entries: u32,
}

impl Header {
    /// Returns the disk GUID
    #[must_use]
    pub fn disk_uuid(&self) -> Uuid {
        Uuid::from_bytes_le(self.disk_guid)
    }

    /// Sets the disk GUID
    pub fn set_disk_uuid(&mut self, uuid: Uuid) {
        self.disk_guid = uuid.to_bytes_le();
    }

    /// Returns the size of the partition entry array, in bytes
    #[must_use]
    pub fn entries_bytes(&self) -> u64 {
        u64::from(self.entries) * u64::from(self.entry_size)
    }

    /// Returns the number of LBAs the partition entry array spans
    ///
    /// # Errors
    ///
    /// If the LBA size is too small to be valid
    pub fn entries_lbas(&self, lba_size: u32) -> Result<u64, GptError> {
        if lba_size < MIN_LBA_SIZE {
            return Err(GptError::Geometry(lba_size));
        }

        Ok(self.entries_bytes().div_ceil(u64::from(lba_size)))
    }

    fn compute_crc(&self) -> Result<u32, GptError> {
        if self.header_size < HEADER_SIZE {
            return Err(GptError::InvalidHeaderSize(self.header_size));
        }

        let mut zeroed = *self;
        zeroed.crc32_header = 0;

        let mut digest = checksum::digest();
        digest.update(&encode_header(&zeroed));
        checksum::update_zeroes(
            &mut digest,
            u64::from(self.header_size) - RAW_HEADER_SIZE as u64,
        );

        Ok(digest.finalize())
    }

    /// Checks the header CRC32 against the header content
    ///
    /// # Errors
    ///
    /// If the stored CRC32 doesn't match, or if the header size is invalid
    pub fn verify(&self) -> Result<(), GptError> {
        let computed = self.compute_crc()?;

        if computed != self.crc32_header {
            warn!(
                "Header CRC32 Mismatch: stored {:#010x}, computed {computed:#010x}",
                self.crc32_header
            );

            return Err(GptError::CrcMismatch {
                kind: ChecksumKind::Header,
                stored: self.crc32_header,
                computed,
            });
        }

        Ok(())
    }

    /// Recomputes the header CRC32. This must happen after any change to the header.
    ///
    /// # Errors
    ///
    /// If the header size is invalid
    pub fn refresh_crc(&mut self) -> Result<(), GptError> {
        self.crc32_header = 0;
        self.crc32_header = self.compute_crc()?;

        debug!("Header CRC32 is now {:#010x}", self.crc32_header);

        Ok(())
    }

    /// Computes the CRC32 of the partition entry array, as it would be laid out on disk
    ///
    /// # Errors
    ///
    /// If there's more entries than slots in the array
    pub fn compute_entries_crc(&self, entries: &[Entry]) -> Result<u32, GptError> {
        let len = record_len(self.entry_size);
        let padding = padding_len(self.entry_size);

        let mut digest = checksum::digest();
        for entry in table_slots(self, entries)? {
            let raw = encode_entry_record(&entry);

            digest.update(&raw[..len]);
            checksum::update_zeroes(&mut digest, padding);
        }

        Ok(digest.finalize())
    }

    /// Recomputes the partition entry array CRC32. This must happen after any change to the
    /// entries, and before [`Header::refresh_crc`].
    ///
    /// # Errors
    ///
    /// If there's more entries than slots in the array
    pub fn refresh_entries_crc(&mut self, entries: &[Entry]) -> Result<(), GptError> {
        self.crc32_entries = self.compute_entries_crc(entries)?;

        debug!("Partition Entries CRC32 is now {:#010x}", self.crc32_entries);

        Ok(())
    }

    /// Checks the partition entry array CRC32 against the entries
    ///
    /// # Errors
    ///
    /// If the stored CRC32 doesn't match, or if there's more entries than slots in the array
    pub fn verify_entries(&self, entries: &[Entry]) -> Result<(), GptError> {
        let computed = self.compute_entries_crc(entries)?;

        if computed != self.crc32_entries {
            warn!(
                "Partition Entries CRC32 Mismatch: stored {:#010x}, computed {computed:#010x}",
                self.crc32_entries
            );

            return Err(GptError::CrcMismatch {
                kind: ChecksumKind::Entries,
                stored: self.crc32_entries,
                computed,
            });
        }

        Ok(())
    }

    /// Returns the header as it must be stored in the alternate location.
    ///
    /// The current and alternate LBAs are swapped, the partition entry array is
    /// moved right before the alternate header, and the CRC32 is recomputed.
    ///
    /// # Errors
    ///
    /// If the alternate header LBA is too low to hold the partition entry array
    /// before it, or if the header size is invalid
    pub fn mirrored(&self, lba_size: u32) -> Result<Self, GptError> {
        let table_lbas = self.entries_lbas(lba_size)?;
        let position_entries = self
            .position_secondary
            .checked_sub(table_lbas)
            .ok_or(GptError::Overflow)?;

        let mut mirror = Self {
            position_primary: self.position_secondary,
            position_secondary: self.position_primary,
            position_entries,
            ..*self
        };
        mirror.refresh_crc()?;

        debug!(
            "Mirrored Header is located at LBA {}, its Partition Table at LBA {}",
            mirror.position_primary, mirror.position_entries
        );

        Ok(mirror)
    }

    /// Returns whether the partition entry array lies strictly between this header and its
    /// alternate copy
    fn entries_between_headers(&self) -> bool {
        let (low, high) = if self.position_primary < self.position_secondary {
            (self.position_primary, self.position_secondary)
        } else {
            (self.position_secondary, self.position_primary)
        };

        low < self.position_entries && self.position_entries < high
    }

    /// Returns whether this header is the alternate copy of `other`
    #[must_use]
    pub fn is_mirror_of(&self, other: &Self) -> bool {
        self.entries_between_headers()
            && self.signature == other.signature
            && self.revision == other.revision
            && self.header_size == other.header_size
            && self.position_primary == other.position_secondary
            && self.position_secondary == other.position_primary
            && self.first_usable_lba == other.first_usable_lba
            && self.last_usable_lba == other.last_usable_lba
            && self.disk_guid == other.disk_guid
            && self.entries == other.entries
            && self.entry_size == other.entry_size
            && self.crc32_entries == other.crc32_entries
    }
}

impl Default for Header {
    fn default() -> Self {
        Self {
            signature: GPT_SIGNATURE,
            revision: GPT_REVISION,
            header_size: HEADER_SIZE,
            crc32_header: 0,
            position_primary: DEFAULT_OFFSET_LBAS,
            position_secondary: 0,
            first_usable_lba: 0,
            last_usable_lba: 0,
            disk_guid: [0; 16],
            position_entries: DEFAULT_OFFSET_LBAS + 1,
            entries: DEFAULT_ENTRIES,
            entry_size: DEFAULT_ENTRY_SIZE,
            crc32_entries: 0,
        }
    }
}

/// Returns exactly as many entries as the header has slots, unused ones filling up the end
pub(crate) fn table_slots<'a>(
    header: &Header,
    entries: &'a [Entry],
) -> Result<impl Iterator<Item = Entry> + 'a, GptError> {
    let slots = usize::try_from(header.entries).map_err(|_err| GptError::Overflow)?;

    if entries.len() > slots {
        return Err(GptError::TooManyEntries {
            count: entries.len(),
            slots: header.entries,
        });
    }

    Ok(entries
        .iter()
        .copied()
        .chain(iter::repeat(Entry::default()))
        .take(slots))
}
