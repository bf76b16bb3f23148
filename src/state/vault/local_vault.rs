//! A [KeyVault] backed by a JSON file on local disk.

use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;
use tracing::info;
use tracing::warn;
use zeroize::Zeroizing;

use super::encryption::Argon2Params;
use super::encryption::CipherError;
use super::encryption::StoredSecret;
use super::encryption::VaultFile;
use super::encryption::WalletCipher;
use super::encryption::WalletKeyManager;
use super::encryption::WalletSecret;
use super::KeyMaterial;
use super::KeyVault;
use super::VaultError;

/// Vault stored at `path`, or kept in memory only when no path is given.
///
/// Starts out unavailable. [KeyVault::load] reads the file, or creates a
/// fresh unencrypted wallet if none exists.
#[derive(Debug)]
pub struct LocalKeyVault {
    path: Option<PathBuf>,
    kdf: Argon2Params,
    file: Option<VaultFile>,
}

impl LocalKeyVault {
    pub fn new(path: PathBuf, kdf: Argon2Params) -> Self {
        Self {
            path: Some(path),
            kdf,
            file: None,
        }
    }

    pub fn in_memory(kdf: Argon2Params) -> Self {
        Self {
            path: None,
            kdf,
            file: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record a balance figure. Only possible while the secret is in
    /// plaintext. Nothing in the daemon syncs a balance yet, so this only
    /// seeds test wallets.
    #[cfg(test)]
    pub(crate) async fn set_synced_balance(&mut self, balance: u64) -> Result<(), VaultError> {
        let mut file = self.loaded()?.clone();
        match &mut file.secret {
            StoredSecret::Plaintext(secret) => secret.balance = balance,
            StoredSecret::Sealed { .. } => return Err(VaultError::AlreadyEncrypted),
        }
        self.commit(file).await
    }

    fn loaded(&self) -> Result<&VaultFile, VaultError> {
        self.file.as_ref().ok_or(VaultError::NotAvailable)
    }

    fn open_sealed(&self, key: &KeyMaterial) -> Result<Result<WalletSecret, CipherError>, VaultError> {
        let StoredSecret::Sealed { nonce, ciphertext } = &self.loaded()?.secret else {
            return Err(VaultError::NotEncrypted);
        };
        let cipher =
            WalletCipher::new(key.expose()).map_err(|e| VaultError::Cipher(e.to_string()))?;
        let plaintext = match cipher.open(ciphertext, nonce) {
            Ok(p) => Zeroizing::new(p),
            Err(e) => return Ok(Err(e)),
        };
        Ok(Ok(serde_json::from_slice(&plaintext)?))
    }

    /// Persist `file`, then make it the in-memory state. A failed write
    /// leaves the vault as it was.
    async fn commit(&mut self, file: VaultFile) -> Result<(), VaultError> {
        if let Some(path) = &self.path {
            write_file_atomic(path, &serde_json::to_vec_pretty(&file)?).await?;
        }
        self.file = Some(file);
        Ok(())
    }
}

#[async_trait]
impl KeyVault for LocalKeyVault {
    fn is_available(&self) -> bool {
        self.file.is_some()
    }

    fn is_encrypted(&self) -> Result<bool, VaultError> {
        Ok(self.loaded()?.is_sealed())
    }

    async fn derive_key(&self, password: &str) -> Result<KeyMaterial, VaultError> {
        let file = self.loaded()?;
        let (salt, kdf) = (file.salt, file.kdf);
        let password = Zeroizing::new(password.to_owned());

        let key = tokio::task::spawn_blocking(move || {
            WalletKeyManager::from_password(&password, &salt, kdf)?.derive_wallet_key()
        })
        .await
        .map_err(|e| VaultError::KeyDerivation(e.to_string()))??;

        Ok(KeyMaterial::new(key))
    }

    fn verify_key(&self, key: &KeyMaterial) -> Result<bool, VaultError> {
        match self.open_sealed(key)? {
            Ok(_) => Ok(true),
            Err(CipherError::Authentication) => Ok(false),
            Err(e) => Err(VaultError::Cipher(e.to_string())),
        }
    }

    async fn decrypt(&mut self, key: &KeyMaterial) -> Result<(), VaultError> {
        let secret = match self.open_sealed(key)? {
            Ok(secret) => secret,
            Err(CipherError::Authentication) => return Err(VaultError::WrongKey),
            Err(e) => return Err(VaultError::Cipher(e.to_string())),
        };

        let mut file = self.loaded()?.clone();
        file.secret = StoredSecret::Plaintext(secret);
        self.commit(file).await?;
        debug!("wallet secret decrypted");
        Ok(())
    }

    async fn encrypt(&mut self, key: &KeyMaterial) -> Result<(), VaultError> {
        let mut file = self.loaded()?.clone();
        let StoredSecret::Plaintext(secret) = &file.secret else {
            return Err(VaultError::AlreadyEncrypted);
        };

        let plaintext = Zeroizing::new(serde_json::to_vec(secret)?);
        let nonce = WalletCipher::generate_nonce();
        let ciphertext = WalletCipher::new(key.expose())
            .and_then(|cipher| cipher.seal(&plaintext, &nonce))
            .map_err(|e| VaultError::Cipher(e.to_string()))?;

        file.secret = StoredSecret::Sealed { nonce, ciphertext };
        self.commit(file).await?;
        debug!("wallet secret encrypted");
        Ok(())
    }

    fn available_balance(&self) -> Result<Option<u64>, VaultError> {
        Ok(match &self.loaded()?.secret {
            StoredSecret::Plaintext(secret) => Some(secret.balance),
            StoredSecret::Sealed { .. } => None,
        })
    }

    async fn load(&mut self) -> Result<(), VaultError> {
        if self.file.is_some() {
            return Ok(());
        }

        let Some(path) = self.path.clone() else {
            self.file = Some(VaultFile::new_unencrypted(self.kdf));
            info!("created in-memory wallet");
            return Ok(());
        };

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let file = VaultFile::from_json(&bytes)?;
                if file.kdf != self.kdf {
                    warn!(
                        "wallet file {} uses stored kdf parameters {:?}, not the configured {:?}",
                        path.display(),
                        file.kdf,
                        self.kdf
                    );
                }
                file.kdf.build()?;
                info!(
                    "loaded {} wallet from {}",
                    if file.is_sealed() { "encrypted" } else { "unencrypted" },
                    path.display()
                );
                self.file = Some(file);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no wallet at {}; creating a new one", path.display());
                self.commit(VaultFile::new_unencrypted(self.kdf)).await
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Write via a sibling temp file and rename, so a crash never leaves a
/// half-written vault behind.
async fn write_file_atomic(path: &Path, contents: &[u8]) -> Result<(), VaultError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
