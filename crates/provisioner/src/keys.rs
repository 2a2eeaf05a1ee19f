//! Key material - secure-messaging key pairs and blockchain accounts
//!
//! Both are ed25519 keys from `ed25519-dalek`. Private halves are written as
//! "unlocked" JSON documents readable only by the owner.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::SigningKey;
use join_types::{AccountGenerator, Address, KeyGenerator, KeySpec, ProvisionError, BLOCKCHAIN_FOLDER};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Keystore folder under the blockchain folder
pub const KEYSTORE_FOLDER: &str = "keystore";

/// Bytes of the key hash kept as the account address
const ADDRESS_LEN: usize = 20;

/// Private key file contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateKeyFile {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: PrivateKeyData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateKeyData {
    /// base64 secret key
    pub bytes: String,
}

impl PrivateKeyFile {
    fn unlocked(key: &SigningKey) -> Self {
        Self {
            kind: "unlocked".to_string(),
            data: PrivateKeyData {
                bytes: STANDARD.encode(key.to_bytes()),
            },
        }
    }
}

/// Keystore entry for a generated account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeystoreEntry {
    pub address: Address,
    /// base64 public key
    pub public_key: String,
    pub private_key: PrivateKeyFile,
    /// RFC 3339 creation time
    pub created_at: String,
}

fn new_signing_key() -> SigningKey {
    SigningKey::from_bytes(&rand::random::<[u8; 32]>())
}

/// Writes `<name>.pub` / `<name>.key` pairs under a root directory
pub struct LocalKeyGenerator {
    root: PathBuf,
}

impl LocalKeyGenerator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl KeyGenerator for LocalKeyGenerator {
    async fn create_keys(&self, keys: &[KeySpec]) -> Result<(), ProvisionError> {
        for spec in keys {
            let dir = self.root.join(&spec.folder_name);
            let key = new_signing_key();

            let public_path = dir.join(format!("{}.pub", spec.file_name));
            let public = STANDARD.encode(key.verifying_key().as_bytes());
            tokio::fs::write(&public_path, public)
                .await
                .map_err(|e| write_error(&public_path, e))?;

            let private_path = dir.join(format!("{}.key", spec.file_name));
            let private = serde_json::to_vec_pretty(&PrivateKeyFile::unlocked(&key))
                .map_err(ProvisionError::key_generation)?;
            write_private(&private_path, &private).await?;

            tracing::debug!("Generated key pair {}/{}", spec.folder_name, spec.file_name);
        }

        tracing::info!("Generated {} key pairs", keys.len());
        Ok(())
    }
}

/// Mints blockchain accounts into `Blockchain/keystore`
pub struct LocalAccountGenerator {
    keystore: PathBuf,
}

impl LocalAccountGenerator {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            keystore: root.as_ref().join(BLOCKCHAIN_FOLDER).join(KEYSTORE_FOLDER),
        }
    }

    pub fn keystore(&self) -> &Path {
        &self.keystore
    }
}

#[async_trait]
impl AccountGenerator for LocalAccountGenerator {
    async fn new_account(&self) -> Result<Address, ProvisionError> {
        let key = new_signing_key();
        let public = key.verifying_key();
        let hash = blake3::hash(public.as_bytes());
        let address = Address::from_bytes(&hash.as_bytes()[blake3::OUT_LEN - ADDRESS_LEN..]);

        let entry = KeystoreEntry {
            address: address.clone(),
            public_key: STANDARD.encode(public.as_bytes()),
            private_key: PrivateKeyFile::unlocked(&key),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        let contents =
            serde_json::to_vec_pretty(&entry).map_err(ProvisionError::key_generation)?;

        tokio::fs::create_dir_all(&self.keystore)
            .await
            .map_err(|e| write_error(&self.keystore, e))?;
        write_private(&self.keystore.join(format!("{}.json", address)), &contents).await?;

        tracing::info!("Generated new account {}", address);
        Ok(address)
    }
}

async fn write_private(path: &Path, contents: &[u8]) -> Result<(), ProvisionError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| write_error(path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(|e| write_error(path, e))?;
    }
    Ok(())
}

fn write_error(path: &Path, e: std::io::Error) -> ProvisionError {
    ProvisionError::KeyGeneration(format!("failed to write {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::VerifyingKey;

    fn specs() -> Vec<KeySpec> {
        ["node", "nodeArch"]
            .into_iter()
            .map(|name| KeySpec {
                folder_name: "Constellation".to_string(),
                file_name: name.to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_key_pairs_match() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Constellation")).unwrap();

        LocalKeyGenerator::new(dir.path())
            .create_keys(&specs())
            .await
            .unwrap();

        for name in ["node", "nodeArch"] {
            let folder = dir.path().join("Constellation");
            let public = std::fs::read_to_string(folder.join(format!("{name}.pub"))).unwrap();
            let private: PrivateKeyFile = serde_json::from_slice(
                &std::fs::read(folder.join(format!("{name}.key"))).unwrap(),
            )
            .unwrap();
            assert_eq!(private.kind, "unlocked");

            let secret: [u8; 32] = STANDARD
                .decode(&private.data.bytes)
                .unwrap()
                .try_into()
                .unwrap();
            let expected = SigningKey::from_bytes(&secret).verifying_key();
            let public: [u8; 32] = STANDARD.decode(public).unwrap().try_into().unwrap();
            assert_eq!(VerifyingKey::from_bytes(&public).unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_missing_folder_fails() {
        let dir = tempfile::tempdir().unwrap();

        let err = LocalKeyGenerator::new(dir.path())
            .create_keys(&specs())
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::KeyGeneration(_)));
    }

    #[tokio::test]
    async fn test_new_account_writes_keystore() {
        let dir = tempfile::tempdir().unwrap();
        let generator = LocalAccountGenerator::new(dir.path());

        let first = generator.new_account().await.unwrap();
        let second = generator.new_account().await.unwrap();
        assert_ne!(first, second);

        assert!(first.as_str().starts_with("0x"));
        assert_eq!(first.as_str().len(), 2 + ADDRESS_LEN * 2);

        let path = generator.keystore().join(format!("{first}.json"));
        let entry: KeystoreEntry = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(entry.address, first);
        assert!(chrono::DateTime::parse_from_rfc3339(&entry.created_at).is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_private_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let generator = LocalAccountGenerator::new(dir.path());
        let address = generator.new_account().await.unwrap();

        let path = generator.keystore().join(format!("{address}.json"));
        let mode = std::fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
