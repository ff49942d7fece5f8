use std::{
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
};

use log::{debug, trace, warn};

use crate::{
    header::table_slots,
    raw::{
        decode_entry, decode_header, encode_entry_record, encode_header, padding_len, record_len,
        RAW_ENTRY_SIZE, RAW_HEADER_SIZE, ZEROES,
    },
    Entry, GptError, GptOptions, Header, Signature, MIN_LBA_SIZE,
};

/// A GUID Partition Table stored on a seekable byte store.
///
/// The handle owns the store: it's released when the handle is closed or dropped.
/// Every operation moves the store cursor, so a handle must not be shared between
/// threads without serializing all accesses.
#[derive(Debug)]
pub struct GptHandle<S = File> {
    store: S,
    lba_size: u32,
    offset: u64,
}

#[allow(clippy::multiple_inherent_impl)]
impl GptHandle<File> {
    /// Opens the GPT stored in a file or a block device
    ///
    /// # Errors
    ///
    /// If the LBA size is smaller than the header, or if the file can't be opened
    pub fn open(
        path: impl AsRef<Path>,
        lba_size: u32,
        offset_lbas: u64,
        read_only: bool,
    ) -> Result<Self, GptError> {
        let path = path.as_ref();

        check_geometry(lba_size, offset_lbas)?;

        debug!(
            "Opening {} ({})",
            path.display(),
            if read_only { "read-only" } else { "read-write" }
        );

        let file = File::options()
            .read(true)
            .write(!read_only)
            .open(path)
            .map_err(|source| GptError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        Self::from_store(file, lba_size, offset_lbas)
    }

    /// Opens the GPT stored in a file or a block device, and checks its signature
    ///
    /// # Errors
    ///
    /// If the LBA size is smaller than the header, if the file can't be opened, or
    /// if the signature found in the file isn't the expected one. The file is closed
    /// on error.
    pub fn open_with_signature(
        path: impl AsRef<Path>,
        lba_size: u32,
        signature: Signature,
        offset_lbas: u64,
        read_only: bool,
    ) -> Result<Self, GptError> {
        Self::open(path, lba_size, offset_lbas, read_only)?.with_signature(signature)
    }

    /// Opens the GPT stored in a file or a block device using a set of [`GptOptions`]
    ///
    /// # Errors
    ///
    /// Same as [`GptHandle::open`] and [`GptHandle::open_with_signature`]
    pub fn open_with_options(path: impl AsRef<Path>, opts: &GptOptions) -> Result<Self, GptError> {
        let handle = Self::open(path, opts.lba_size, opts.offset_lbas, opts.read_only)?;

        match opts.signature {
            Some(signature) => handle.with_signature(signature),
            None => Ok(handle),
        }
    }
}

#[allow(clippy::multiple_inherent_impl)]
impl<S> GptHandle<S>
where
    S: Read + Seek,
{
    /// Creates a handle over an already opened store
    ///
    /// # Errors
    ///
    /// If the LBA size is smaller than the header, or if the header offset overflows
    pub fn from_store(store: S, lba_size: u32, offset_lbas: u64) -> Result<Self, GptError> {
        let offset = check_geometry(lba_size, offset_lbas)?;

        debug!("LBA Size is {lba_size} bytes");
        debug!("Primary GPT Header is located at LBA {offset_lbas} (byte {offset})");

        Ok(Self {
            store,
            lba_size,
            offset,
        })
    }

    /// Checks that the signature stored at the header location is the expected one
    ///
    /// # Errors
    ///
    /// If the signature can't be read or doesn't match. The handle, and thus the
    /// store, is released on error.
    pub fn with_signature(mut self, expected: Signature) -> Result<Self, GptError> {
        self.seek_to(self.offset)?;

        let mut found = [0; 8];
        self.store.read_exact(&mut found).map_err(GptError::Read)?;

        let found = Signature::new(found);
        if found != expected {
            debug!("Signature Mismatch: expected {expected}, found {found}");

            return Err(GptError::SignatureMismatch { expected, found });
        }

        Ok(self)
    }

    /// Returns the size of a Logical Block, in bytes
    #[must_use]
    pub fn lba_size(&self) -> u32 {
        self.lba_size
    }

    /// Returns the offset of the primary header, in bytes
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Releases the handle, returning the underlying store
    #[must_use]
    pub fn into_inner(self) -> S {
        self.store
    }

    /// Releases the handle and the underlying store
    pub fn close(self) {
        debug!("Closing GPT Handle");
    }

    fn lba_to_offset(&self, lba: u64) -> Result<u64, GptError> {
        lba.checked_mul(u64::from(self.lba_size))
            .ok_or(GptError::Overflow)
    }

    fn seek_to(&mut self, offset: u64) -> Result<(), GptError> {
        trace!("Seeking to byte {offset}");

        self.store
            .seek(SeekFrom::Start(offset))
            .map_err(GptError::Seek)?;

        Ok(())
    }

    fn read_header_at(&mut self, offset: u64) -> Result<Header, GptError> {
        self.seek_to(offset)?;

        let mut raw = [0; RAW_HEADER_SIZE];
        self.store.read_exact(&mut raw).map_err(GptError::Read)?;

        let header = decode_header(&raw);

        debug!(
            "Read GPT Header at byte {offset}: {} entries of {} bytes at LBA {}",
            header.entries, header.entry_size, header.position_entries
        );

        Ok(header)
    }

    /// Reads the primary header. Its CRC32 isn't checked, see [`Header::verify`].
    ///
    /// # Errors
    ///
    /// If the header can't be read from the store
    pub fn read_header(&mut self) -> Result<Header, GptError> {
        self.read_header_at(self.offset)
    }

    /// Checks the header CRC32, after making sure the header fits in a Logical Block.
    ///
    /// Unlike [`Header::verify`], a corrupted header size can't make us hash past the LBA.
    ///
    /// # Errors
    ///
    /// If the header size is larger than an LBA or smaller than the header, or if the CRC32
    /// doesn't match
    pub fn verify_header(&self, header: &Header) -> Result<(), GptError> {
        if header.header_size > self.lba_size {
            warn!(
                "Header Size of {} bytes doesn't fit in a {} bytes LBA",
                header.header_size, self.lba_size
            );

            return Err(GptError::InvalidHeaderSize(header.header_size));
        }

        header.verify()
    }

    /// Reads the secondary header pointed to by `header`, and checks its CRC32 and that it
    /// mirrors `header`.
    ///
    /// On success, the secondary header is returned so that it can be used in place of a
    /// corrupted primary header.
    ///
    /// # Errors
    ///
    /// If the secondary header can't be read, if its CRC32 doesn't match, or if it's
    /// not the alternate copy of `header`
    pub fn verify_secondary_header(&mut self, header: &Header) -> Result<Header, GptError> {
        let offset = self.lba_to_offset(header.position_secondary)?;

        debug!(
            "Secondary GPT Header is located at LBA {}",
            header.position_secondary
        );

        let secondary = self.read_header_at(offset)?;
        self.verify_header(&secondary)?;

        if !secondary.is_mirror_of(header) {
            debug!(
                "Secondary Header at LBA {} points to LBA {}, entries at LBA {}",
                secondary.position_primary,
                secondary.position_secondary,
                secondary.position_entries
            );

            return Err(GptError::MirrorMismatch);
        }

        Ok(secondary)
    }

    /// Reads a single partition entry.
    ///
    /// The entry array is assumed to start on the LBA right after the primary header.
    ///
    /// # Errors
    ///
    /// If the entry can't be read from the store
    pub fn get_entry(&mut self, header: &Header, index: u32) -> Result<Entry, GptError> {
        let offset = self
            .offset
            .checked_add(u64::from(self.lba_size))
            .and_then(|o| o.checked_add(u64::from(index) * u64::from(header.entry_size)))
            .ok_or(GptError::Overflow)?;

        self.seek_to(offset)?;

        let len = record_len(header.entry_size);
        let mut raw = [0; RAW_ENTRY_SIZE];
        self.store
            .read_exact(&mut raw[..len])
            .map_err(GptError::Read)?;

        trace!("Read Partition Entry {index} at byte {offset}");

        Ok(decode_entry(&raw, header.entry_size))
    }

    /// Reads the whole partition entry array, located at the LBA given by the header.
    ///
    /// Either all the entries declared by the header are returned, or an error.
    ///
    /// # Errors
    ///
    /// If the array can't be allocated, or if any entry can't be read from the store
    pub fn get_all_entries(&mut self, header: &Header) -> Result<Vec<Entry>, GptError> {
        let offset = self.lba_to_offset(header.position_entries)?;
        debug!(
            "GPT Partition Table is located at LBA {}",
            header.position_entries
        );

        self.seek_to(offset)?;

        let count = usize::try_from(header.entries).map_err(|_err| GptError::Overflow)?;
        let mut entries = Vec::new();
        entries.try_reserve_exact(count)?;

        let len = record_len(header.entry_size);
        let padding =
            i64::try_from(padding_len(header.entry_size)).map_err(|_err| GptError::Overflow)?;

        for index in 0..header.entries {
            let mut raw = [0; RAW_ENTRY_SIZE];
            self.store
                .read_exact(&mut raw[..len])
                .map_err(GptError::Read)?;

            let entry = decode_entry(&raw, header.entry_size);
            trace!(
                "Partition Entry {index}: {}",
                if entry.is_unused() { "unused" } else { "used" }
            );
            entries.push(entry);

            if padding > 0 {
                self.store
                    .seek(SeekFrom::Current(padding))
                    .map_err(GptError::Seek)?;
            }
        }

        debug!("Read {} Partition Entries", entries.len());

        Ok(entries)
    }

    fn write_padding(&mut self, len: u64) -> Result<(), GptError>
    where
        S: Write,
    {
        let mut remaining = len;

        while remaining > 0 {
            let chunk = usize::try_from(remaining).map_or(ZEROES.len(), |r| r.min(ZEROES.len()));

            self.store
                .write_all(&ZEROES[..chunk])
                .map_err(GptError::Write)?;
            remaining -= chunk as u64;
        }

        Ok(())
    }

    fn flush(&mut self) -> Result<(), GptError>
    where
        S: Write,
    {
        self.store.flush().map_err(GptError::Write)
    }

    /// The header must fit in its LBA, and can't be smaller than its fixed part
    fn header_padding(&self, header: &Header) -> Result<u64, GptError> {
        if header.header_size > self.lba_size {
            return Err(GptError::InvalidHeaderSize(header.header_size));
        }

        u64::from(header.header_size)
            .checked_sub(RAW_HEADER_SIZE as u64)
            .ok_or(GptError::InvalidHeaderSize(header.header_size))
    }

    fn write_header_at(&mut self, offset: u64, header: &Header) -> Result<(), GptError>
    where
        S: Write,
    {
        let padding = self.header_padding(header)?;

        self.seek_to(offset)?;

        debug!("Writing GPT Header at byte {offset}");

        self.store
            .write_all(&encode_header(header))
            .map_err(GptError::Write)?;
        self.write_padding(padding)?;
        self.flush()
    }

    /// Writes the primary header. Its CRC32 must have been refreshed beforehand.
    ///
    /// # Errors
    ///
    /// If the header size is invalid, or if the header can't be written to the store
    pub fn write_header(&mut self, header: &Header) -> Result<(), GptError>
    where
        S: Write,
    {
        self.write_header_at(self.offset, header)
    }

    /// Writes the alternate copy of `header` at the secondary header location.
    ///
    /// See [`Header::mirrored`] for how the alternate copy is derived.
    ///
    /// # Errors
    ///
    /// If the alternate copy can't be derived, or if it can't be written to the store
    pub fn write_secondary_header(&mut self, header: &Header) -> Result<(), GptError>
    where
        S: Write,
    {
        let (mirror, offset, _) = self.secondary_layout(header)?;

        self.write_header_at(offset, &mirror)
    }

    fn write_entries_at(
        &mut self,
        offset: u64,
        header: &Header,
        entries: &[Entry],
    ) -> Result<(), GptError>
    where
        S: Write,
    {
        let slots = table_slots(header, entries)?;
        let len = record_len(header.entry_size);
        let padding = padding_len(header.entry_size);

        self.seek_to(offset)?;

        debug!(
            "Writing {} Partition Entries of {} bytes at byte {offset}",
            header.entries, header.entry_size
        );

        for entry in slots {
            let raw = encode_entry_record(&entry);

            self.store
                .write_all(&raw[..len])
                .map_err(GptError::Write)?;
            self.write_padding(padding)?;
        }

        self.flush()
    }

    fn primary_entries_offset(&self) -> Result<u64, GptError> {
        self.offset
            .checked_add(u64::from(self.lba_size))
            .ok_or(GptError::Overflow)
    }

    /// Returns the alternate header copy, with its byte offset and the one of its entry array
    fn secondary_layout(&self, header: &Header) -> Result<(Header, u64, u64), GptError> {
        let mirror = header.mirrored(self.lba_size)?;
        let header_offset = self.lba_to_offset(mirror.position_primary)?;
        let entries_offset = self.lba_to_offset(mirror.position_entries)?;

        Ok((mirror, header_offset, entries_offset))
    }

    /// Writes the partition entry array right after the primary header.
    ///
    /// If there's less entries than slots declared by the header, the remaining slots are
    /// written as unused entries.
    ///
    /// # Errors
    ///
    /// If there's more entries than slots, or if the entries can't be written to the store
    pub fn write_entries(&mut self, header: &Header, entries: &[Entry]) -> Result<(), GptError>
    where
        S: Write,
    {
        let offset = self.primary_entries_offset()?;

        self.write_entries_at(offset, header, entries)
    }

    /// Writes the partition entry array before the secondary header, where its alternate
    /// copy points to.
    ///
    /// # Errors
    ///
    /// If the alternate header copy can't be derived, if there's more entries than slots,
    /// or if the entries can't be written to the store
    pub fn write_secondary_entries(
        &mut self,
        header: &Header,
        entries: &[Entry],
    ) -> Result<(), GptError>
    where
        S: Write,
    {
        let (_, _, offset) = self.secondary_layout(header)?;

        self.write_entries_at(offset, header, entries)
    }

    /// Refreshes both checksums of `header` for `entries`, then writes the primary and
    /// secondary partition entry arrays and headers.
    ///
    /// Everything that can be checked without touching the store is checked before the
    /// first write, so a table that can't be mirrored leaves the store untouched.
    ///
    /// # Errors
    ///
    /// If any of the checksum refresh or write operations fails
    pub fn commit(&mut self, header: &mut Header, entries: &[Entry]) -> Result<(), GptError>
    where
        S: Write,
    {
        header.refresh_entries_crc(entries)?;
        header.refresh_crc()?;

        self.header_padding(header)?;
        let entries_offset = self.primary_entries_offset()?;
        let (mirror, mirror_offset, mirror_entries_offset) = self.secondary_layout(header)?;

        self.write_entries_at(entries_offset, header, entries)?;
        self.write_header_at(self.offset, header)?;
        self.write_entries_at(mirror_entries_offset, header, entries)?;
        self.write_header_at(mirror_offset, &mirror)?;

        debug!("GPT committed");

        Ok(())
    }
}

fn check_geometry(lba_size: u32, offset_lbas: u64) -> Result<u64, GptError> {
    if lba_size < MIN_LBA_SIZE {
        return Err(GptError::Geometry(lba_size));
    }

    offset_lbas
        .checked_mul(u64::from(lba_size))
        .ok_or(GptError::Overflow)
}
