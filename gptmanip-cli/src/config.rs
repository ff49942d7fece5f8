use std::{fs, path::Path};

use anyhow::Context as _;
use gptmanip::{GptOptions, Signature};
use log::debug;

/// Options given on the command line, taking precedence over the configuration file
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Overrides {
    pub(crate) lba_size: Option<u32>,
    pub(crate) offset_lbas: Option<u64>,
    pub(crate) signature: Option<Signature>,
}

pub(crate) fn parse_options(
    content: &str,
    overrides: &Overrides,
) -> Result<GptOptions, anyhow::Error> {
    let mut opts: GptOptions = toml::from_str(content).context("Invalid configuration")?;

    if let Some(lba_size) = overrides.lba_size {
        opts.lba_size = lba_size;
    }

    if let Some(offset_lbas) = overrides.offset_lbas {
        opts.offset_lbas = offset_lbas;
    }

    if overrides.signature.is_some() {
        opts.signature = overrides.signature;
    }

    Ok(opts)
}

pub(crate) fn load_options(
    path: Option<&Path>,
    overrides: &Overrides,
) -> Result<GptOptions, anyhow::Error> {
    let content = match path {
        Some(path) => {
            debug!("Loading configuration from {}", path.display());

            fs::read_to_string(path)
                .with_context(|| format!("Couldn't read configuration file {}", path.display()))?
        }
        None => String::new(),
    };

    let opts = parse_options(&content, overrides)?;

    debug!(
        "LBA Size {} bytes, Header at LBA {}, Signature {}",
        opts.lba_size,
        opts.offset_lbas,
        opts.signature
            .map_or_else(|| String::from("unchecked"), |sig| sig.to_string())
    );

    Ok(opts)
}
