//! Passphrase-based encryption of the backup artifact
//!
//! The encrypted file is a small binary container:
//!
//! ```text
//! magic "VBKENC" | version u8 | argon2 m_cost u32 | t_cost u32 | p_cost u32
//! | salt_len u8 | salt | nonce (12) | name_len u16 | original file name
//! | AES-256-GCM ciphertext with tag
//! ```
//!
//! The key is derived from the passphrase with Argon2id. The whole header,
//! including the original file name, is authenticated as associated data.

use super::archive::{BackupArtifact, ENCRYPTED_EXTENSION};
use crate::error::BackupError;
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use anyhow::{Context, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use zeroize::Zeroizing;

const MAGIC: &[u8; 6] = b"VBKENC";
const FORMAT_VERSION: u8 = 1;
const SALT_SIZE: usize = 16;
const NONCE_SIZE: usize = 12;

// Upper bounds for cost parameters read back from a file header
const MAX_MEMORY_COST_KIB: u32 = 1024 * 1024;
const MAX_TIME_COST: u32 = 16;
const MAX_PARALLELISM: u32 = 16;

/// Argon2id cost parameters stored alongside every encrypted backup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyDerivationParams {
    /// Memory cost in KiB
    pub memory_cost: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

impl KeyDerivationParams {
    /// Reject header values that would make key derivation unreasonably expensive
    fn check_bounds(&self) -> Result<()> {
        if self.memory_cost > MAX_MEMORY_COST_KIB
            || self.time_cost > MAX_TIME_COST
            || self.parallelism > MAX_PARALLELISM
        {
            anyhow::bail!(
                "Key derivation parameters out of range (m={} KiB, t={}, p={})",
                self.memory_cost,
                self.time_cost,
                self.parallelism
            );
        }
        Ok(())
    }
}

impl Default for KeyDerivationParams {
    fn default() -> Self {
        Self {
            memory_cost: 19456,
            time_cost: 2,
            parallelism: 1,
        }
    }
}

/// Contents recovered from an encrypted backup
#[derive(Debug)]
pub struct DecryptedBackup {
    pub file_name: String,
    pub content: Vec<u8>,
}

/// Encrypt the artifact when a passphrase is configured.
///
/// Without a passphrase the artifact is returned untouched. The plaintext file
/// is only removed once the encrypted file has been written completely.
pub fn apply(artifact: BackupArtifact, passphrase: Option<&str>) -> Result<BackupArtifact, BackupError> {
    let passphrase = match passphrase {
        Some(p) if !p.is_empty() => p,
        _ => return Ok(artifact),
    };

    let encrypted_path = encrypted_path_for(&artifact.path);
    info!("Encrypting {} to {:?}", artifact.name, encrypted_path);

    let plaintext = Zeroizing::new(
        fs::read(&artifact.path)
            .context(format!("Failed to read unencrypted backup {:?}", artifact.path))
            .map_err(|e| BackupError::Encryption(e.into()))?,
    );

    let sealed = encrypt_bytes(
        &plaintext,
        &artifact.name,
        passphrase,
        KeyDerivationParams::default(),
    )
    .map_err(|e| BackupError::Encryption(e.into()))?;

    if let Err(e) = fs::write(&encrypted_path, &sealed) {
        if encrypted_path.is_file() {
            if let Err(remove_err) = fs::remove_file(&encrypted_path) {
                warn!("Failed to remove partial encrypted backup: {}", remove_err);
            }
        }
        return Err(BackupError::Encryption(
            anyhow::Error::new(e)
                .context(format!("Failed to write encrypted backup {:?}", encrypted_path))
                .into(),
        ));
    }

    fs::remove_file(&artifact.path)
        .context(format!("Failed to remove unencrypted backup {:?}", artifact.path))
        .map_err(|e| BackupError::Encryption(e.into()))?;

    BackupArtifact::from_path(&encrypted_path)
        .context(format!("Failed to stat encrypted backup {:?}", encrypted_path))
        .map_err(|e| BackupError::Encryption(e.into()))
}

/// `<original>.enc`
pub fn encrypted_path_for(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".");
    os.push(ENCRYPTED_EXTENSION);
    PathBuf::from(os)
}

/// Encrypt `plaintext`, embedding `file_name` as authenticated metadata
pub fn encrypt_bytes(
    plaintext: &[u8],
    file_name: &str,
    passphrase: &str,
    params: KeyDerivationParams,
) -> Result<Vec<u8>> {
    let name_bytes = file_name.as_bytes();
    let name_len = u16::try_from(name_bytes.len()).context("File name too long to embed")?;

    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);

    let mut header = Vec::with_capacity(64 + name_bytes.len());
    header.extend_from_slice(MAGIC);
    header.push(FORMAT_VERSION);
    header.extend_from_slice(&params.memory_cost.to_be_bytes());
    header.extend_from_slice(&params.time_cost.to_be_bytes());
    header.extend_from_slice(&params.parallelism.to_be_bytes());
    header.push(SALT_SIZE as u8);
    header.extend_from_slice(&salt);
    header.extend_from_slice(&nonce_bytes);
    header.extend_from_slice(&name_len.to_be_bytes());
    header.extend_from_slice(name_bytes);

    let key = derive_key(passphrase, &salt, params)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|e| anyhow::anyhow!("Failed to create cipher: {}", e))?;
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad: &header,
            },
        )
        .map_err(|e| anyhow::anyhow!("Encryption failed: {}", e))?;

    let mut sealed = header;
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Reverse [`encrypt_bytes`]
pub fn decrypt_bytes(sealed: &[u8], passphrase: &str) -> Result<DecryptedBackup> {
    let mut reader = HeaderReader::new(sealed);

    if reader.take(MAGIC.len())? != MAGIC {
        anyhow::bail!("Not an encrypted backup (bad magic)");
    }
    let version = reader.take(1)?[0];
    if version != FORMAT_VERSION {
        anyhow::bail!("Unsupported encryption format version: {}", version);
    }
    let params = KeyDerivationParams {
        memory_cost: reader.u32()?,
        time_cost: reader.u32()?,
        parallelism: reader.u32()?,
    };
    params.check_bounds()?;
    let salt_len = reader.take(1)?[0] as usize;
    let salt = reader.take(salt_len)?;
    let nonce_bytes = reader.take(NONCE_SIZE)?;
    let name_len = u16::from_be_bytes([reader.take(1)?[0], reader.take(1)?[0]]) as usize;
    let file_name = String::from_utf8(reader.take(name_len)?.to_vec())
        .context("Embedded file name is not valid UTF-8")?;

    let (header, ciphertext) = sealed.split_at(reader.position);

    let key = derive_key(passphrase, salt, params)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|e| anyhow::anyhow!("Failed to create cipher: {}", e))?;
    let content = cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad: header,
            },
        )
        .map_err(|_| anyhow::anyhow!("Decryption failed: wrong passphrase or corrupted data"))?;

    Ok(DecryptedBackup { file_name, content })
}

/// Decrypt an encrypted backup file
pub fn decrypt_file(path: &Path, passphrase: &str) -> Result<DecryptedBackup> {
    let sealed = fs::read(path).context(format!("Failed to read {:?}", path))?;
    decrypt_bytes(&sealed, passphrase)
}

fn derive_key(
    passphrase: &str,
    salt: &[u8],
    params: KeyDerivationParams,
) -> Result<Zeroizing<[u8; 32]>> {
    let argon2_params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(32),
    )
    .map_err(|e| anyhow::anyhow!("Invalid Argon2 parameters: {}", e))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut key[..])
        .map_err(|e| anyhow::anyhow!("Key derivation failed: {}", e))?;
    Ok(key)
}

struct HeaderReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> HeaderReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.position + len;
        if end > self.data.len() {
            anyhow::bail!("Encrypted backup header is truncated");
        }
        let slice = &self.data[self.position..end];
        self.position = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}
