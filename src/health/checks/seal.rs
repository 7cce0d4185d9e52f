//! Seal setup health checks

use std::fs;

use anyhow::{Context, bail};
use tracing::debug;

use crate::config::SealConfig;
use crate::health::{Ctx, error, skip_requested, start_span, test};

/// Length in bytes of a static seal key
pub const STATIC_KEY_LEN: usize = 32;

/// Capability shared by every seal implementation
pub trait Seal: Send {
    /// Seal type as named in configuration
    fn barrier_type(&self) -> &'static str;

    /// Prepares the seal for use
    fn init(&mut self) -> anyhow::Result<()>;

    /// Releases anything acquired by [`Seal::init`]
    fn finalize(&mut self) -> anyhow::Result<()>;
}

/// Key shares are supplied by operators at unseal time; nothing to load
#[derive(Debug, Default)]
pub struct ShamirSeal;

impl Seal for ShamirSeal {
    fn barrier_type(&self) -> &'static str {
        "shamir"
    }

    fn init(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn finalize(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Wraps the barrier key with a fixed key read from disk
#[derive(Debug)]
pub struct StaticKeySeal {
    key: Option<[u8; STATIC_KEY_LEN]>,
    source: std::path::PathBuf,
}

impl StaticKeySeal {
    pub fn new(key_file: impl Into<std::path::PathBuf>) -> Self {
        Self {
            key: None,
            source: key_file.into(),
        }
    }
}

impl Seal for StaticKeySeal {
    fn barrier_type(&self) -> &'static str {
        "static"
    }

    fn init(&mut self) -> anyhow::Result<()> {
        let text = fs::read_to_string(&self.source)
            .with_context(|| format!("failed to read seal key file {}", self.source.display()))?;
        self.key = Some(decode_hex_key(text.trim())?);
        Ok(())
    }

    fn finalize(&mut self) -> anyhow::Result<()> {
        if let Some(key) = self.key.as_mut() {
            key.fill(0);
        }
        self.key = None;
        Ok(())
    }
}

fn decode_hex_key(text: &str) -> anyhow::Result<[u8; STATIC_KEY_LEN]> {
    if text.len() != STATIC_KEY_LEN * 2 || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        bail!(
            "static seal key must be {} bytes encoded as {} hex characters",
            STATIC_KEY_LEN,
            STATIC_KEY_LEN * 2
        );
    }

    let mut key = [0u8; STATIC_KEY_LEN];
    for (byte, pair) in key.iter_mut().zip(text.as_bytes().chunks(2)) {
        let pair = std::str::from_utf8(pair)?;
        *byte = u8::from_str_radix(pair, 16)?;
    }
    Ok(key)
}

/// Builds and initializes the configured seal, shamir by default
pub fn create_seal(config: Option<&SealConfig>) -> anyhow::Result<Box<dyn Seal>> {
    let mut seal: Box<dyn Seal> = match config {
        None | Some(SealConfig::Shamir) => Box::new(ShamirSeal),
        Some(SealConfig::StaticKey { key_file }) => Box::new(StaticKeySeal::new(key_file)),
    };
    seal.init()?;
    Ok(seal)
}

/// Finalizes every held seal when dropped, each under its own check
pub struct SealFinalizer {
    ctx: Ctx,
    seals: Vec<Box<dyn Seal>>,
}

impl SealFinalizer {
    pub fn new(ctx: Ctx, seals: Vec<Box<dyn Seal>>) -> Self {
        Self { ctx, seals }
    }

    pub fn seals(&self) -> &[Box<dyn Seal>] {
        &self.seals
    }
}

impl Drop for SealFinalizer {
    fn drop(&mut self) {
        for seal in &mut self.seals {
            let name = format!("finalize-seal-{}", seal.barrier_type());
            debug!(seal = seal.barrier_type(), "Finalizing seal");
            let _ = test(&self.ctx, &name, |_| {
                seal.finalize().context("error finalizing seal")
            });
        }
    }
}

/// Runs the `create-seal` stage
///
/// The returned guard finalizes the seal once the caller is done with it;
/// `None` means the seal was skipped or could not be created, which is already
/// recorded under `ctx`.
pub fn diagnose_seal(ctx: &Ctx, config: Option<&SealConfig>) -> Option<SealFinalizer> {
    if skip_requested(ctx, "create-seal") {
        return None;
    }

    let span = start_span(ctx, "create-seal");
    match create_seal(config) {
        Ok(seal) => Some(SealFinalizer::new(ctx.clone(), vec![seal])),
        Err(e) => {
            error(&span, &e.context("seal could not be configured"));
            None
        }
    }
}
