//! Startup self-check for the decompression capability decoders rely on.

use thiserror::Error;

const PROBE: &[u8] = b"argus decompression probe";

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("zstd unavailable: {0}")]
    Codec(#[from] std::io::Error),
    #[error("zstd probe round-trip mismatch")]
    Mismatch,
}

/// Verify the runtime can decompress zstd frames. Decoders assume this holds;
/// the daemon refuses to start when it does not.
pub fn verify_decompression() -> Result<(), CapabilityError> {
    let compressed = zstd::encode_all(PROBE, 0)?;
    let out = zstd::decode_all(compressed.as_slice())?;
    if out != PROBE {
        return Err(CapabilityError::Mismatch);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_round_trips() {
        verify_decompression().unwrap();
    }
}
