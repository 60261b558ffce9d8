use crate::error::Result;
use crate::kdf::KdfParams;

/// Processing mode for share evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitMode {
    /// Evaluate shares one after another
    #[default]
    Sequential,
    /// Evaluate shares on the rayon thread pool
    Parallel,
}

/// Configuration options for wallet creation and secret splitting
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CustodyConfig {
    /// Key derivation parameters recorded for newly created wallets
    pub kdf: KdfParams,
    /// Processing mode used when splitting secrets
    pub split_mode: SplitMode,
}

impl CustodyConfig {
    /// Creates a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the key derivation parameters
    pub fn with_kdf(mut self, kdf: KdfParams) -> Result<Self> {
        kdf.validate()?;
        self.kdf = kdf;
        Ok(self)
    }

    /// Sets the processing mode
    pub fn with_split_mode(mut self, mode: SplitMode) -> Self {
        self.split_mode = mode;
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        self.kdf.validate()
    }
}
