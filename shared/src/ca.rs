//! Simulated certificate authority
//!
//! A single signing key pair stored on local disk stands in for a PKI. Any
//! process that can read the pair can vouch for a public key by signing the
//! SHA-256 digest of its serialized form, and can check such a signature.
//!
//! Only the server role may create the pair. Creation is guarded by an
//! advisory lock on a file in the CA directory, and each PEM file is written under a temporary name
//! and renamed into place, so readers never observe a half-written key.
//! Every other process polls until both files exist.

use crate::crypto::{public_key_from_pem, public_key_pem, KeyPair};
use crate::error::CaError;
use log::{debug, info, warn};
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha2::{Digest, Sha256};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CA_DIR: &str = "ca_keys";
pub const PUBLIC_KEY_FILE: &str = "public_key.pem";
pub const PRIVATE_KEY_FILE: &str = "private_key.pem";
const LOCK_FILE: &str = ".provision.lock";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);
pub const DEFAULT_MAX_POLLS: u32 = 150;

/// Which side of the game a process plays; decides who may create the CA keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    pub key_bits: usize,
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        Self {
            key_bits: crate::crypto::DEFAULT_KEY_BITS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CertificateAuthority {
    keys: KeyPair,
}

impl CertificateAuthority {
    pub fn from_keys(keys: KeyPair) -> Self {
        Self { keys }
    }

    /// Creates a fresh in-memory authority without touching disk
    pub fn generate(bits: usize) -> Result<Self, CaError> {
        Ok(Self::from_keys(KeyPair::generate(bits)?))
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        self.keys.public_key()
    }

    /// Signs the SHA-256 digest of `material`
    pub fn sign(&self, material: &str) -> Result<Vec<u8>, CaError> {
        let digest = Sha256::digest(material.as_bytes());
        self.keys
            .private_key()
            .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
            .map_err(CaError::Sign)
    }

    /// Checks a signature made by [`sign`](Self::sign). Never fails, any
    /// mismatch is just `false`.
    pub fn verify(&self, material: &str, signature: &[u8]) -> bool {
        let digest = Sha256::digest(material.as_bytes());
        self.keys
            .public_key()
            .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
            .is_ok()
    }

    pub fn load(dir: &Path) -> Result<Self, CaError> {
        let private_pem = fs::read_to_string(dir.join(PRIVATE_KEY_FILE))?;
        let keys = KeyPair::from_private_pem(&private_pem)?;

        let public_pem = fs::read_to_string(dir.join(PUBLIC_KEY_FILE))?;
        let public = public_key_from_pem(&public_pem)?;
        if &public != keys.public_key() {
            warn!(
                "CA public key in {} does not match the private key, using the private key's",
                dir.display()
            );
        }

        Ok(Self::from_keys(keys))
    }

    /// Writes both PEM files. The public key is written last, so its presence
    /// implies the private key is complete.
    pub fn save(&self, dir: &Path) -> Result<(), CaError> {
        fs::create_dir_all(dir)?;
        write_atomically(&dir.join(PRIVATE_KEY_FILE), &self.keys.private_key_pem()?)?;
        write_atomically(
            &dir.join(PUBLIC_KEY_FILE),
            &public_key_pem(self.keys.public_key())?,
        )?;
        Ok(())
    }

    /// Loads the authority from `dir`, creating it first when `role` is
    /// [`Role::Server`] and nobody else has.
    pub async fn provision(
        dir: &Path,
        role: Role,
        options: &ProvisionOptions,
    ) -> Result<Self, CaError> {
        for attempt in 0..options.max_polls.max(1) {
            if keys_present(dir) {
                debug!("loading CA keys from {}", dir.display());
                return Self::load(dir);
            }

            if role == Role::Server {
                fs::create_dir_all(dir)?;
                if let Some(lock) = ProvisionLock::acquire(dir)? {
                    // another server may have finished between the check and the lock
                    if keys_present(dir) {
                        drop(lock);
                        return Self::load(dir);
                    }

                    info!(
                        "generating {}-bit CA key pair in {}",
                        options.key_bits,
                        dir.display()
                    );
                    let ca = Self::generate(options.key_bits)?;
                    ca.save(dir)?;
                    drop(lock);
                    return Ok(ca);
                }
            }

            if attempt == 0 {
                info!("waiting for CA keys to appear in {}", dir.display());
            }
            tokio::time::sleep(options.poll_interval).await;
        }

        Err(CaError::ProvisionTimeout {
            dir: dir.to_path_buf(),
            attempts: options.max_polls.max(1),
        })
    }
}

pub fn keys_present(dir: &Path) -> bool {
    dir.join(PRIVATE_KEY_FILE).is_file() && dir.join(PUBLIC_KEY_FILE).is_file()
}

fn write_atomically(path: &Path, contents: &str) -> io::Result<()> {
    let tmp = path.with_extension("pem.tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}

/// Exclusive right to create the CA keys. An advisory lock on the lock
/// file, released on drop or by the OS when the holder dies; the file itself
/// is left in place.
struct ProvisionLock {
    file: File,
    path: PathBuf,
}

impl ProvisionLock {
    fn acquire(dir: &Path) -> io::Result<Option<Self>> {
        let path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { file, path })),
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                debug!("CA provisioning lock {} is held", path.display());
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

impl Drop for ProvisionLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("failed to unlock {}: {}", self.path.display(), e);
        }
    }
}
