//! Core setup checks

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, bail};

use crate::health::{Ctx, spot_error, spot_ok, spot_skipped};

/// Kernel randomness device read by the server at startup
pub const RANDOM_SOURCE: &str = "/dev/urandom";

const SAMPLE_LEN: usize = 32;

/// Body of the `setup-core` stage
///
/// Failures are recorded on the child span and roll up; the stage itself
/// never short-circuits the pipeline.
pub fn diagnose_core(ctx: &Ctx) -> anyhow::Result<()> {
    if !cfg!(unix) {
        spot_skipped(ctx, "init-randreader", "no random device on this platform");
        return Ok(());
    }
    match read_random(Path::new(RANDOM_SOURCE)) {
        Ok(()) => spot_ok(ctx, "init-randreader", ""),
        Err(e) => {
            spot_error(ctx, "init-randreader", e);
        }
    }
    Ok(())
}

/// Reads a sample from `source`, rejecting short or all-zero reads
pub fn read_random(source: &Path) -> anyhow::Result<()> {
    let mut sample = [0u8; SAMPLE_LEN];
    File::open(source)
        .and_then(|mut f| f.read_exact(&mut sample))
        .with_context(|| format!("could not read random bytes from {}", source.display()))?;

    if sample.iter().all(|b| *b == 0) {
        bail!("random source {} returned only zero bytes", source.display());
    }
    Ok(())
}
