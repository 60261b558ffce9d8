use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::artifacts::{DeviceRecoveryObject, RecoveryFileObject, WalletProfile};
use crate::creation::CreatedWallet;
use crate::error::{CustodyError, Result};
use crate::identity::hash_card_id;
use crate::kdf::DeviceKey;

const MAGIC_NUMBER: &[u8] = b"WKS1";
const VERSION: u8 = 1;

/// Durable, device-confidential key-value store
///
/// Confidentiality at rest is the platform's job. Nothing stored through
/// [`WalletRegistry`] is plaintext share or master-secret material; the device
/// key is stored verbatim by design of the device custody slot.
///
/// # Example
/// ```
/// use keycustody::{MemoryWalletStore, WalletStore};
///
/// let mut store = MemoryWalletStore::new();
/// store.set("wallet_index", b"[]").unwrap();
/// assert_eq!(store.get("wallet_index").unwrap().as_deref(), Some(&b"[]"[..]));
/// store.delete("wallet_index").unwrap();
/// assert!(store.get("wallet_index").unwrap().is_none());
/// ```
pub trait WalletStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn set(&mut self, key: &str, value: &[u8]) -> Result<()>;

    /// Deleting a missing key is not an error
    fn delete(&mut self, key: &str) -> Result<()>;
}

/// Convention-tagged store keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKey<'a> {
    WalletIndex,
    DeviceObject(&'a str),
    PasskeyShare(&'a str),
    DeviceKey(&'a str),
    RecoveryFile(&'a str),
}

impl StoreKey<'_> {
    pub fn as_key(&self) -> String {
        match self {
            StoreKey::WalletIndex => "wallet_index".to_string(),
            StoreKey::DeviceObject(id) => format!("device_object:{id}"),
            StoreKey::PasskeyShare(id) => format!("passkey_share:{id}"),
            StoreKey::DeviceKey(id) => format!("device_key:{id}"),
            StoreKey::RecoveryFile(id) => format!("recovery_file:{id}"),
        }
    }
}

/// In-memory store, mainly for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryWalletStore {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryWalletStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl WalletStore for MemoryWalletStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// File system implementation of WalletStore
///
/// Each key is one file holding a magic number, a version byte, a length
/// prefix and the value. A key `prefix:id` is stored as `prefix.<hex of id>`.
///
/// # Example
/// ```
/// use keycustody::{FileWalletStore, WalletStore};
/// use tempfile::tempdir;
///
/// let temp_dir = tempdir().unwrap();
/// let mut store = FileWalletStore::new(temp_dir.path()).unwrap();
/// store.set("device_key:abc", &[1, 2, 3]).unwrap();
/// assert_eq!(store.get("device_key:abc").unwrap(), Some(vec![1, 2, 3]));
/// ```
pub struct FileWalletStore {
    /// Base directory for stored entries
    base_dir: PathBuf,
}

impl FileWalletStore {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b':'));
        if !valid {
            return Err(CustodyError::StorageError(format!("invalid store key {key:?}")));
        }
        // Keys never contain '.', so "prefix.hex(id)" cannot collide with a
        // plain key or with another prefix
        let file_name = match key.split_once(':') {
            Some((prefix, id)) => format!("{prefix}.{}", hex::encode(id)),
            None => key.to_string(),
        };
        Ok(self.base_dir.join(file_name))
    }
}

impl WalletStore for FileWalletStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.entry_path(key)?;
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if magic != MAGIC_NUMBER {
            return Err(CustodyError::StorageError(format!("bad magic in entry {key:?}")));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] > VERSION {
            return Err(CustodyError::StorageError(format!(
                "entry {key:?} has unsupported version {}",
                version[0]
            )));
        }

        let mut len_bytes = [0u8; 4];
        file.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes) as usize;

        let mut data = vec![0u8; len];
        file.read_exact(&mut data)?;
        Ok(Some(data))
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.entry_path(key)?;
        let len = u32::try_from(value.len())
            .map_err(|_| CustodyError::StorageError(format!("entry {key:?} too large")))?;

        // Write to a sibling file first so a crash never leaves a torn entry
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            writer.write_all(MAGIC_NUMBER)?;
            writer.write_all(&[VERSION])?;
            writer.write_all(&len.to_le_bytes())?;
            writer.write_all(value)?;
            writer.flush()?;
        }
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        let path = self.entry_path(key)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Wallet-level view over a [`WalletStore`]
///
/// Keeps the profile index and the per-wallet artifacts under the
/// [`StoreKey`] conventions.
pub struct WalletRegistry<S: WalletStore> {
    store: S,
}

impl<S: WalletStore> WalletRegistry<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    pub fn list_profiles(&self) -> Result<Vec<WalletProfile>> {
        match self.store.get(&StoreKey::WalletIndex.as_key())? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| CustodyError::StorageError(format!("corrupt wallet index: {e}"))),
            None => Ok(Vec::new()),
        }
    }

    /// Inserts or replaces the profile with the same wallet id
    pub fn save_profile(&mut self, profile: &WalletProfile) -> Result<()> {
        let mut profiles = self.list_profiles()?;
        profiles.retain(|p| p.wallet_id != profile.wallet_id);
        profiles.push(profile.clone());
        self.write_index(&profiles)
    }

    pub fn load_profile(&self, wallet_id: &str) -> Result<Option<WalletProfile>> {
        Ok(self
            .list_profiles()?
            .into_iter()
            .find(|p| p.wallet_id == wallet_id))
    }

    /// Looks up the wallet a scanned card belongs to
    pub fn find_by_card(&self, raw_card_id: &str) -> Result<Option<WalletProfile>> {
        let card_id_hash = hash_card_id(raw_card_id)?;
        Ok(self
            .list_profiles()?
            .into_iter()
            .find(|p| p.card_id_hash == card_id_hash))
    }

    /// Persists everything a device keeps after creating a wallet
    ///
    /// The passkey share is not stored here; it goes to the passkey vault,
    /// whose wrapped output can be kept with [`Self::store_passkey_share`].
    pub fn persist_created_wallet(
        &mut self,
        created: &CreatedWallet,
        device_key: &DeviceKey,
    ) -> Result<()> {
        let id = created.wallet_id.as_str();
        self.store
            .set(&StoreKey::DeviceObject(id).as_key(), &created.device_object.to_json()?)?;
        self.store
            .set(&StoreKey::DeviceKey(id).as_key(), &device_key.to_bytes())?;
        self.store
            .set(&StoreKey::RecoveryFile(id).as_key(), &created.recovery_file.to_json()?)?;
        self.save_profile(&created.profile)?;
        info!(wallet_id = id, "wallet persisted");
        Ok(())
    }

    pub fn load_device_object(&self, wallet_id: &str) -> Result<Option<DeviceRecoveryObject>> {
        self.store
            .get(&StoreKey::DeviceObject(wallet_id).as_key())?
            .map(|bytes| DeviceRecoveryObject::from_json(&bytes))
            .transpose()
    }

    pub fn load_device_key(&self, wallet_id: &str) -> Result<Option<DeviceKey>> {
        self.store
            .get(&StoreKey::DeviceKey(wallet_id).as_key())?
            .map(|bytes| {
                let bytes = Zeroizing::new(bytes);
                DeviceKey::from_slice(&bytes)
            })
            .transpose()
    }

    pub fn load_recovery_file(&self, wallet_id: &str) -> Result<Option<RecoveryFileObject>> {
        self.store
            .get(&StoreKey::RecoveryFile(wallet_id).as_key())?
            .map(|bytes| RecoveryFileObject::from_json(&bytes))
            .transpose()
    }

    /// Stores the passkey vault's wrapped form of share C, opaque to this crate
    pub fn store_passkey_share(&mut self, wallet_id: &str, wrapped: &[u8]) -> Result<()> {
        self.store.set(&StoreKey::PasskeyShare(wallet_id).as_key(), wrapped)
    }

    pub fn load_passkey_share(&self, wallet_id: &str) -> Result<Option<Vec<u8>>> {
        self.store.get(&StoreKey::PasskeyShare(wallet_id).as_key())
    }

    /// Removes every entry and the index row of a wallet
    pub fn remove_wallet(&mut self, wallet_id: &str) -> Result<()> {
        for key in [
            StoreKey::DeviceObject(wallet_id),
            StoreKey::PasskeyShare(wallet_id),
            StoreKey::DeviceKey(wallet_id),
            StoreKey::RecoveryFile(wallet_id),
        ] {
            self.store.delete(&key.as_key())?;
        }
        let mut profiles = self.list_profiles()?;
        profiles.retain(|p| p.wallet_id != wallet_id);
        self.write_index(&profiles)?;
        debug!(wallet_id, "wallet removed from store");
        Ok(())
    }

    fn write_index(&mut self, profiles: &[WalletProfile]) -> Result<()> {
        let bytes = serde_json::to_vec(profiles)?;
        self.store.set(&StoreKey::WalletIndex.as_key(), &bytes)
    }
}
