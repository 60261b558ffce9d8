use rand::TryRngCore;
use rand::rngs::OsRng;
use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;

use crate::error::{CustodyError, Result};

/// Fills `dest` straight from the operating system entropy source.
pub(crate) fn fill_random(dest: &mut [u8]) -> Result<()> {
    OsRng
        .try_fill_bytes(dest)
        .map_err(|e| CustodyError::RandomnessUnavailable(e.to_string()))
}

/// Returns `N` fresh random bytes.
pub(crate) fn random_array<const N: usize>() -> Result<[u8; N]> {
    let mut out = [0u8; N];
    fill_random(&mut out)?;
    Ok(out)
}

/// ChaCha20 CSPRNG seeded from the OS, used for polynomial coefficients.
pub(crate) fn seeded_rng() -> Result<ChaCha20Rng> {
    ChaCha20Rng::try_from_rng(&mut OsRng)
        .map_err(|e| CustodyError::RandomnessUnavailable(e.to_string()))
}
