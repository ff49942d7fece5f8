use alloc::string::FromUtf16Error;

use bit_field::BitField as _;
use uuid::Uuid;

use crate::{raw::NAME_LEN, GptError};

const ATTRIBUTE_PLATFORM_REQUIRED_BIT: usize = 0;
const ATTRIBUTE_EFI_IGNORE_BIT: usize = 1;
const ATTRIBUTE_LEGACY_BOOTABLE_BIT: usize = 2;

/// A GPT Partition Entry
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Entry {
    /// Partition type GUID, in its on-disk byte order. All zeroes for an unused entry.
    pub type_guid: [u8; 16],

    /// Unique partition GUID, in its on-disk byte order
    pub guid: [u8; 16],

    /// First LBA of the partition
    pub first_lba: u64,

    /// Last LBA of the partition, inclusive
    pub last_lba: u64,

    /// Attribute bits
    pub attributes: u64,

    /// Partition name, as UTF-16 code units. Unused units are zero.
    pub name: [u16; NAME_LEN],
}

impl Entry {
    /// Returns whether the entry is unused, ie. its partition type GUID is all zeroes
    #[must_use]
    pub fn is_unused(&self) -> bool {
        self.type_guid.iter().all(|b| *b == 0)
    }

    /// Returns the partition type GUID
    #[must_use]
    pub fn type_uuid(&self) -> Uuid {
        Uuid::from_bytes_le(self.type_guid)
    }

    /// Sets the partition type GUID
    pub fn set_type_uuid(&mut self, uuid: Uuid) {
        self.type_guid = uuid.to_bytes_le();
    }

    /// Returns the unique partition GUID
    #[must_use]
    pub fn unique_uuid(&self) -> Uuid {
        Uuid::from_bytes_le(self.guid)
    }

    /// Sets the unique partition GUID
    pub fn set_unique_uuid(&mut self, uuid: Uuid) {
        self.guid = uuid.to_bytes_le();
    }

    /// Returns the number of LBAs covered by the partition
    #[must_use]
    pub fn size_lbas(&self) -> u64 {
        if self.is_unused() || self.last_lba < self.first_lba {
            return 0;
        }

        (self.last_lba - self.first_lba) + 1
    }

    /// Returns the name code units, up to the first NUL
    #[must_use]
    pub fn name_units(&self) -> &[u16] {
        let len = self
            .name
            .iter()
            .position(|unit| *unit == 0)
            .unwrap_or(NAME_LEN);

        &self.name[..len]
    }

    /// Returns the partition name
    ///
    /// # Errors
    ///
    /// If the name isn't valid UTF-16
    pub fn name(&self) -> Result<String, FromUtf16Error> {
        String::from_utf16(self.name_units())
    }

    /// Sets the partition name
    ///
    /// # Errors
    ///
    /// If the name takes more than 36 UTF-16 code units
    pub fn set_name(&mut self, name: &str) -> Result<(), GptError> {
        let units = name.encode_utf16().collect::<Vec<_>>();
        if units.len() > NAME_LEN {
            return Err(GptError::NameTooLong(units.len()));
        }

        self.name = [0; NAME_LEN];
        self.name[..units.len()].copy_from_slice(&units);

        Ok(())
    }

    /// Whether the partition is required for the platform to function. See Table 5.8 of the
    /// [UEFI Specification] for further explanations.
    ///
    /// [UEFI Specification]: https://uefi.org/sites/default/files/resources/UEFI_Spec_2_10_Aug29.pdf
    #[must_use]
    pub fn platform_required(&self) -> bool {
        self.attributes.get_bit(ATTRIBUTE_PLATFORM_REQUIRED_BIT)
    }

    /// Marks the partition as required for the platform to function
    pub fn set_platform_required(&mut self, val: bool) {
        self.attributes.set_bit(ATTRIBUTE_PLATFORM_REQUIRED_BIT, val);
    }

    /// Whether the EFI firmware should ignore the partition during discovery
    #[must_use]
    pub fn efi_ignore(&self) -> bool {
        self.attributes.get_bit(ATTRIBUTE_EFI_IGNORE_BIT)
    }

    /// Marks the partition as ignored by the EFI during partition discovery
    pub fn set_efi_ignore(&mut self, val: bool) {
        self.attributes.set_bit(ATTRIBUTE_EFI_IGNORE_BIT, val);
    }

    /// Whether the partition is bootable by Legacy BIOS implementations
    #[must_use]
    pub fn legacy_bootable(&self) -> bool {
        self.attributes.get_bit(ATTRIBUTE_LEGACY_BOOTABLE_BIT)
    }

    /// Marks the partition as bootable for Legacy BIOS implementations
    pub fn set_legacy_bootable(&mut self, val: bool) {
        self.attributes.set_bit(ATTRIBUTE_LEGACY_BOOTABLE_BIT, val);
    }
}

impl Default for Entry {
    fn default() -> Self {
        Self {
            type_guid: [0; 16],
            guid: [0; 16],
            first_lba: 0,
            last_lba: 0,
            attributes: 0,
            name: [0; NAME_LEN],
        }
    }
}
