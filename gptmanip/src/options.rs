use core::{fmt, str::FromStr};

use serde::Deserialize;

use crate::{GptError, DEFAULT_LBA_SIZE, DEFAULT_OFFSET_LBAS, GPT_SIGNATURE};

/// An 8 bytes GPT Header signature
#[derive(Clone, Copy, Deserialize, Eq, Hash, PartialEq)]
#[serde(try_from = "String")]
pub struct Signature([u8; 8]);

impl Signature {
    /// Creates a signature from its raw bytes
    #[must_use]
    pub const fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Returns the raw signature bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl Default for Signature {
    fn default() -> Self {
        GPT_SIGNATURE
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.escape_ascii())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature(\"{self}\")")
    }
}

impl FromStr for Signature {
    type Err = GptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 8] = s
            .as_bytes()
            .try_into()
            .map_err(|_err| GptError::InvalidSignature(s.to_owned()))?;

        Ok(Self(bytes))
    }
}

impl TryFrom<String> for Signature {
    type Error = GptError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Options used to open a GUID Partition Table
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct GptOptions {
    /// Size of a Logical Block, in bytes
    pub lba_size: u32,

    /// LBA of the primary header
    pub offset_lbas: u64,

    /// Signature to check when opening the table. No check is performed if unset.
    pub signature: Option<Signature>,

    /// Opens the underlying store without write access
    pub read_only: bool,
}

impl Default for GptOptions {
    fn default() -> Self {
        Self {
            lba_size: DEFAULT_LBA_SIZE,
            offset_lbas: DEFAULT_OFFSET_LBAS,
            signature: None,
            read_only: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::{GptOptions, Signature};
    use crate::GptError;

    #[test]
    fn defaults() {
        let opts = GptOptions::default();

        assert_eq!(opts.lba_size, 512);
        assert_eq!(opts.offset_lbas, 1);
        assert_eq!(opts.signature, None);
        assert!(!opts.read_only);
    }

    #[test]
    fn signature_parse() {
        let sig: Signature = "EFI PART".parse().unwrap();

        assert_eq!(sig, Signature::default());
        assert_eq!(sig.to_string(), "EFI PART");
    }

    #[test]
    fn signature_wrong_length() {
        assert!(matches!(
            "EFI".parse::<Signature>(),
            Err(GptError::InvalidSignature(_))
        ));
        assert!(matches!(
            "EFI PART!".parse::<Signature>(),
            Err(GptError::InvalidSignature(_))
        ));
    }

    #[test]
    fn signature_display_escapes() {
        let sig = Signature::new(*b"AB\0\0\xffCDE");

        assert_eq!(sig.to_string(), "AB\\x00\\x00\\xffCDE");
    }

    #[test]
    fn toml_empty() {
        let opts: GptOptions = toml::from_str("").unwrap();

        assert_eq!(opts, GptOptions::default());
    }

    #[test]
    fn toml_full() {
        let opts: GptOptions = toml::from_str(
            r#"
            lba-size = 4096
            offset-lbas = 2
            signature = "FOOBARBZ"
            read-only = true
            "#,
        )
        .unwrap();

        assert_eq!(opts.lba_size, 4096);
        assert_eq!(opts.offset_lbas, 2);
        assert_eq!(opts.signature, Some(Signature::new(*b"FOOBARBZ")));
        assert!(opts.read_only);
    }

    #[test]
    fn toml_invalid_signature() {
        toml::from_str::<GptOptions>(r#"signature = "EFI""#).unwrap_err();
    }

    #[test]
    fn toml_unknown_field() {
        toml::from_str::<GptOptions>("sector-size = 512").unwrap_err();
    }
}
