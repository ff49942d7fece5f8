#![doc = include_str!("../README.md")]

extern crate alloc;

pub mod checksum;
mod device;
mod entry;
mod error;
mod header;
mod options;
pub mod raw;

pub use device::GptHandle;
pub use entry::Entry;
pub use error::{ChecksumKind, GptError};
pub use header::{Header, DEFAULT_ENTRIES, DEFAULT_ENTRY_SIZE, HEADER_SIZE};
pub use options::{GptOptions, Signature};

#[cfg(test)]
use tempfile as _;

/// The standard GPT Header signature.
///
/// This is the on-disk UEFI value, with a space. Tables using `EFI_PART` can be opened through
/// the `signature` option.
pub const GPT_SIGNATURE: Signature = Signature::new(*b"EFI PART");

/// The GPT revision we write, 1.0
pub const GPT_REVISION: u32 = 0x0001_0000;

/// Default Logical Block size, in bytes
pub const DEFAULT_LBA_SIZE: u32 = 512;

/// Default location of the primary header, in LBAs
pub const DEFAULT_OFFSET_LBAS: u64 = 1;

/// Smallest Logical Block size able to hold a GPT Header
pub const MIN_LBA_SIZE: u32 = HEADER_SIZE;
