use std::fmt;

use rand_chacha::ChaCha20Rng;
use rand_chacha::rand_core::RngCore;
use rayon::prelude::*;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::config::SplitMode;
use crate::error::{CustodyError, Result};
use crate::finite_field::FiniteField;
use crate::random::seeded_rng;

/// Threshold used for every wallet
pub const WALLET_THRESHOLD: u8 = 2;
/// Number of shares produced for every wallet
pub const WALLET_SHARE_COUNT: u8 = 3;

/// A share in Shamir's Secret Sharing scheme
///
/// Each share holds one polynomial evaluation per secret byte together with
/// the x-coordinate it was evaluated at. A single share reveals nothing about
/// the secret. The share bytes are wiped when the share is dropped.
///
/// # Example
/// ```
/// use keycustody::ShamirShare;
///
/// let mut shamir = ShamirShare::builder(3, 2).build().unwrap();
/// let shares = shamir.split(b"secret").unwrap();
/// let share = &shares[0];
///
/// assert_eq!(share.index, 1);
/// assert_eq!(share.threshold, 2);
/// assert_eq!(share.total_shares, 3);
/// assert_eq!(share.data.len(), 6);
/// ```
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Share {
    /// Index of the share (x-coordinate in the polynomial), never zero
    pub index: u8,
    /// The share data (y-coordinates for each byte of the secret)
    pub data: Vec<u8>,
    /// Minimum number of shares required for reconstruction
    pub threshold: u8,
    /// Total number of shares created
    pub total_shares: u8,
}

impl fmt::Debug for Share {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Share")
            .field("index", &self.index)
            .field("data", &format_args!("<{} bytes redacted>", self.data.len()))
            .field("threshold", &self.threshold)
            .field("total_shares", &self.total_shares)
            .finish()
    }
}

impl Share {
    /// Builds a wallet share (2-of-3) from its index and raw bytes
    pub fn wallet_share(index: u8, data: Vec<u8>) -> Result<Self> {
        if index == 0 || index > WALLET_SHARE_COUNT {
            return Err(CustodyError::InvalidShares(format!(
                "wallet share index {index} outside 1..={WALLET_SHARE_COUNT}"
            )));
        }
        Ok(Self {
            index,
            data,
            threshold: WALLET_THRESHOLD,
            total_shares: WALLET_SHARE_COUNT,
        })
    }

    /// Encodes the share as `"<index>:<hex>"` for handing it to a passkey vault
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(format!("{}:{}", self.index, hex::encode(&self.data)))
    }

    /// Parses a wallet share encoded by [`Share::to_hex`]
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let (index, data) = encoded.split_once(':').ok_or_else(|| {
            CustodyError::InvalidShares("expected share format <index>:<hex>".into())
        })?;
        let index: u8 = index
            .parse()
            .map_err(|_| CustodyError::InvalidShares(format!("invalid share index {index:?}")))?;
        let data = hex::decode(data)?;
        Self::wallet_share(index, data)
    }
}

/// Main implementation of Shamir's Secret Sharing scheme
///
/// Uses GF(256) arithmetic for polynomial operations and a ChaCha20 CSPRNG
/// seeded from the operating system for polynomial coefficients.
///
/// # Example
/// ```
/// use keycustody::ShamirShare;
///
/// let mut scheme = ShamirShare::builder(3, 2).build().unwrap();
///
/// let secret = b"my secret data";
/// let shares = scheme.split(secret).unwrap();
///
/// let reconstructed = ShamirShare::combine(&shares[1..3]).unwrap();
/// assert_eq!(&reconstructed[..], secret);
/// ```
pub struct ShamirShare {
    /// Total number of shares to generate
    total_shares: u8,
    /// Minimum number of shares needed for reconstruction
    threshold: u8,
    /// How share evaluation is scheduled
    mode: SplitMode,
    /// Cryptographically secure random number generator
    rng: ChaCha20Rng,
}

/// Builder for creating ShamirShare instances
#[derive(Debug)]
pub struct ShamirShareBuilder {
    total_shares: u8,
    threshold: u8,
    mode: SplitMode,
}

impl ShamirShareBuilder {
    /// Creates a new builder
    ///
    /// # Arguments
    /// * `total_shares` - Total number of shares to create (2-255)
    /// * `threshold` - Minimum shares required for reconstruction (2-total_shares)
    pub fn new(total_shares: u8, threshold: u8) -> Self {
        Self {
            total_shares,
            threshold,
            mode: SplitMode::default(),
        }
    }

    /// Sets how share evaluation is scheduled
    pub fn with_mode(mut self, mode: SplitMode) -> Self {
        self.mode = mode;
        self
    }

    /// Builds the ShamirShare instance with validation
    ///
    /// # Errors
    /// Returns [`CustodyError::InvalidParameters`] if `threshold < 2` or
    /// `threshold > total_shares`. The `u8` share count keeps every
    /// x-coordinate a non-zero byte.
    pub fn build(self) -> Result<ShamirShare> {
        if self.threshold < 2 {
            return Err(CustodyError::InvalidParameters(format!(
                "threshold {} is below the minimum of 2",
                self.threshold
            )));
        }
        if self.threshold > self.total_shares {
            return Err(CustodyError::InvalidParameters(format!(
                "threshold {} exceeds total shares {}",
                self.threshold, self.total_shares
            )));
        }

        Ok(ShamirShare {
            total_shares: self.total_shares,
            threshold: self.threshold,
            mode: self.mode,
            rng: seeded_rng()?,
        })
    }
}

impl ShamirShare {
    /// Creates a builder for configuring a ShamirShare instance
    pub fn builder(total_shares: u8, threshold: u8) -> ShamirShareBuilder {
        ShamirShareBuilder::new(total_shares, threshold)
    }

    /// Creates the 2-of-3 scheme used for wallet master secrets
    pub fn for_wallet(mode: SplitMode) -> Result<Self> {
        Self::builder(WALLET_SHARE_COUNT, WALLET_THRESHOLD)
            .with_mode(mode)
            .build()
    }

    /// Splits a secret into `total_shares` shares
    ///
    /// For each byte of the secret a fresh random polynomial of degree
    /// `threshold - 1` is drawn with the secret byte as its constant term and
    /// evaluated at x = 1..=total_shares.
    ///
    /// # Example
    /// ```
    /// use keycustody::ShamirShare;
    ///
    /// let mut scheme = ShamirShare::builder(3, 2).build().unwrap();
    /// let shares = scheme.split(b"secret data").unwrap();
    /// assert_eq!(shares.len(), 3);
    /// ```
    pub fn split(&mut self, secret: &[u8]) -> Result<Vec<Share>> {
        let t = self.threshold as usize;

        // Coefficient for x^j of byte idx lives at idx*(t-1) + (j-1)
        let mut coefficients = Zeroizing::new(vec![0u8; secret.len() * (t - 1)]);
        self.rng.fill_bytes(&mut coefficients);

        let evaluate = |x: u8| Self::evaluate_share(FiniteField::new(x), secret, &coefficients, t);
        let share_data: Vec<Vec<u8>> = match self.mode {
            SplitMode::Sequential => (1..=self.total_shares).map(evaluate).collect(),
            SplitMode::Parallel => (1..=self.total_shares).into_par_iter().map(evaluate).collect(),
        };

        Ok(share_data
            .into_iter()
            .zip(1..=self.total_shares)
            .map(|(data, index)| Share {
                index,
                data,
                threshold: self.threshold,
                total_shares: self.total_shares,
            })
            .collect())
    }

    /// Reconstructs the secret from shares using Lagrange interpolation at x = 0
    ///
    /// The result does not depend on the order of `shares`. The returned buffer
    /// is wiped when dropped.
    ///
    /// # Errors
    /// - [`CustodyError::InvalidShares`] for fewer than 2 shares, fewer than the
    ///   recorded threshold, mismatched lengths or metadata, or index 0
    /// - [`CustodyError::DivisionByZero`] when two shares carry the same index
    pub fn combine(shares: &[Share]) -> Result<Zeroizing<Vec<u8>>> {
        Self::validate_shares(shares)?;

        let coefficients = Self::lagrange_coefficients_at_zero(shares)?;
        let secret_len = shares[0].data.len();

        let mut secret = Zeroizing::new(Vec::with_capacity(secret_len));
        for byte_idx in 0..secret_len {
            let byte = shares
                .iter()
                .zip(&coefficients)
                .fold(FiniteField::ZERO, |acc, (share, &coeff)| {
                    acc + coeff * FiniteField::new(share.data[byte_idx])
                });
            secret.push(byte.0);
        }

        Ok(secret)
    }

    /// Evaluates every byte polynomial at `x` using Horner's method
    #[inline]
    fn evaluate_share(x: FiniteField, secret: &[u8], coefficients: &[u8], t: usize) -> Vec<u8> {
        secret
            .iter()
            .enumerate()
            .map(|(idx, &constant)| {
                let mut acc = FiniteField::ZERO;
                for j in (1..t).rev() {
                    acc = acc * x + FiniteField::new(coefficients[idx * (t - 1) + (j - 1)]);
                }
                (acc * x + FiniteField::new(constant)).0
            })
            .collect()
    }

    fn validate_shares(shares: &[Share]) -> Result<()> {
        if shares.len() < 2 {
            return Err(CustodyError::InvalidShares(format!(
                "need at least 2 shares, got {}",
                shares.len()
            )));
        }

        let first = &shares[0];
        if shares.len() < first.threshold as usize {
            return Err(CustodyError::InvalidShares(format!(
                "need at least {} shares, got {}",
                first.threshold,
                shares.len()
            )));
        }

        for share in shares {
            if share.data.len() != first.data.len() {
                return Err(CustodyError::InvalidShares(
                    "inconsistent share lengths".into(),
                ));
            }
            if share.threshold != first.threshold || share.total_shares != first.total_shares {
                return Err(CustodyError::InvalidShares(
                    "inconsistent share metadata".into(),
                ));
            }
            if share.index == 0 {
                return Err(CustodyError::InvalidShares(
                    "share index 0 is not a valid x-coordinate".into(),
                ));
            }
        }

        Ok(())
    }

    /// Basis values L_i(0) = Π_{j≠i} x_j / (x_j - x_i)
    ///
    /// Duplicate x-coordinates make a denominator zero and surface as
    /// [`CustodyError::DivisionByZero`].
    fn lagrange_coefficients_at_zero(shares: &[Share]) -> Result<Vec<FiniteField>> {
        let xs: Vec<FiniteField> = shares.iter().map(|s| FiniteField::new(s.index)).collect();

        xs.iter()
            .enumerate()
            .map(|(i, &x_i)| {
                let mut numerator = FiniteField::ONE;
                let mut denominator = FiniteField::ONE;
                for (j, &x_j) in xs.iter().enumerate() {
                    if i != j {
                        numerator = numerator * x_j;
                        denominator = denominator * (x_j - x_i);
                    }
                }
                numerator.divide(denominator)
            })
            .collect()
    }
}
