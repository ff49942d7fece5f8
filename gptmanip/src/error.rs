use alloc::collections::TryReserveError;
use core::fmt;
use std::{io, path::PathBuf};

use crate::Signature;

/// The checksum a [`GptError::CrcMismatch`] refers to
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChecksumKind {
    /// The CRC32 covering the header itself
    Header,

    /// The CRC32 covering the partition entry array
    Entries,
}

impl fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header => write!(f, "Header"),
            Self::Entries => write!(f, "Partition Entries"),
        }
    }
}

/// Our Error Type
#[derive(thiserror::Error, Debug)]
pub enum GptError {
    /// The LBA size is too small to hold a GPT header
    #[error("LBA size of {0} bytes is smaller than the GPT header")]
    Geometry(u32),

    /// The underlying store couldn't be opened
    #[error("Couldn't open {}", path.display())]
    Open {
        /// Path we tried to open
        path: PathBuf,

        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The signature found on the store isn't the one we expected
    #[error("Signature Mismatch (expected {expected}, found {found})")]
    SignatureMismatch {
        /// The signature we were asked to validate against
        expected: Signature,

        /// The signature found on the store
        found: Signature,
    },

    /// A signature option isn't exactly 8 bytes long
    #[error("Invalid Signature {0:?}: a signature is exactly 8 bytes long")]
    InvalidSignature(String),

    /// Seeking into the store failed
    #[error("Seek Failure")]
    Seek(#[source] io::Error),

    /// Fewer bytes than required could be read from the store
    #[error("Short Read")]
    Read(#[source] io::Error),

    /// Fewer bytes than required could be written to the store, or flushing it failed
    #[error("Short Write")]
    Write(#[source] io::Error),

    /// A stored CRC32 disagrees with the one computed from the data
    #[error("{kind} CRC32 Mismatch (stored {stored:#010x}, computed {computed:#010x})")]
    CrcMismatch {
        /// Which checksum is wrong
        kind: ChecksumKind,

        /// The checksum stored in the header
        stored: u32,

        /// The checksum computed from the data
        computed: u32,
    },

    /// The entry array couldn't be allocated
    #[error("Allocation Failure")]
    Allocation(#[from] TryReserveError),

    /// The header declares a size smaller than its fixed layout
    #[error("Invalid Header Size: {0} bytes")]
    InvalidHeaderSize(u32),

    /// More entries were provided than the header has slots for
    #[error("{count} Partition Entries provided for a table of {slots} slots")]
    TooManyEntries {
        /// Number of entries provided
        count: usize,

        /// Number of slots declared by the header
        slots: u32,
    },

    /// A partition name doesn't fit in an entry
    #[error("Partition Name too long: {0} UTF-16 code units")]
    NameTooLong(usize),

    /// The secondary header is valid but doesn't mirror the primary one
    #[error("Secondary Header doesn't mirror the Primary Header")]
    MirrorMismatch,

    /// An offset computation doesn't fit in 64 bits
    #[error("Integer Overflow")]
    Overflow,
}
