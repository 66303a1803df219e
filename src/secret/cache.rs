//! Decrypted-config cache
//!
//! A single slot keyed by the SHA-256 of the ciphertext. The plaintext lives
//! next to a sidecar file holding the hex hash it was produced from; when the
//! ciphertext changes the slot is refilled.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use super::age::Decryptor;
use super::resolver::SecretKey;
use crate::error::KeelError;
use crate::paths::Paths;
use crate::resource::acl;
use crate::runner::Runner;

/// Hex SHA-256 of a byte slice
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hex SHA-256 of a file's contents
pub fn sha256_file(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(sha256_hex(&bytes))
}

pub struct ConfigCache<'a> {
    plaintext: PathBuf,
    hash_file: PathBuf,
    runner: &'a dyn Runner,
}

impl<'a> ConfigCache<'a> {
    pub fn new(paths: &Paths, runner: &'a dyn Runner) -> Self {
        Self::at(paths.cached_config(), paths.cached_config_hash(), runner)
    }

    pub fn at(plaintext: PathBuf, hash_file: PathBuf, runner: &'a dyn Runner) -> Self {
        Self {
            plaintext,
            hash_file,
            runner,
        }
    }

    /// Hash recorded for the cached plaintext, if the slot is filled
    fn cached_hash(&self) -> Option<String> {
        if !self.plaintext.exists() {
            return None;
        }
        fs::read_to_string(&self.hash_file)
            .ok()
            .map(|h| h.trim().to_string())
    }

    /// Return the plaintext for `ciphertext`, decrypting only on a cache miss
    pub fn load_plaintext<F>(
        &self,
        ciphertext: &Path,
        resolve: F,
        decryptor: &dyn Decryptor,
    ) -> Result<String>
    where
        F: FnOnce() -> std::result::Result<SecretKey, KeelError>,
    {
        let hash = sha256_file(ciphertext)?;

        if self.cached_hash().as_deref() == Some(hash.as_str()) {
            log::debug!("Config cache hit ({})", &hash[..12]);
            return fs::read_to_string(&self.plaintext).with_context(|| {
                format!("Failed to read cached config {}", self.plaintext.display())
            });
        }

        log::debug!("Config cache miss, decrypting {}", ciphertext.display());
        if self.hash_file.exists() {
            fs::remove_file(&self.hash_file).with_context(|| {
                format!("Failed to remove stale cache hash {}", self.hash_file.display())
            })?;
        }

        let key = resolve()?;

        let dir = self
            .plaintext
            .parent()
            .context("Cache path has no parent directory")?;
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create cache directory {}", dir.display()))?;

        let staging = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        decryptor.decrypt(&key, ciphertext, staging.path())?;
        acl::restrict_to_owner(staging.path(), self.runner)?;
        staging
            .persist(&self.plaintext)
            .with_context(|| format!("Failed to write {}", self.plaintext.display()))?;

        fs::write(&self.hash_file, &hash)
            .with_context(|| format!("Failed to write {}", self.hash_file.display()))?;

        fs::read_to_string(&self.plaintext)
            .with_context(|| format!("Failed to read {}", self.plaintext.display()))
    }

    /// Delete the cached plaintext and its hash; true if anything was removed
    pub fn clear(&self) -> Result<bool> {
        let mut removed = false;
        for path in [&self.plaintext, &self.hash_file] {
            if path.exists() {
                fs::remove_file(path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
                log::debug!("Removed {}", path.display());
                removed = true;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::fake::FakeRunner;
    use crate::secret::age::fake::CopyDecryptor;
    use std::cell::Cell;
    use tempfile::TempDir;

    const KEY: &str = "AGE-SECRET-KEY-1ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

    struct Fixture {
        _tmp: TempDir,
        ciphertext: PathBuf,
        plaintext: PathBuf,
        hash_file: PathBuf,
    }

    fn fixture(content: &str) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let ciphertext = tmp.path().join("config.toml.age");
        fs::write(&ciphertext, content).unwrap();
        Fixture {
            plaintext: tmp.path().join("cache").join("config.toml"),
            hash_file: tmp.path().join("cache").join("config.toml.sha256"),
            ciphertext,
            _tmp: tmp,
        }
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hit_skips_resolution_and_decrypt() {
        let fx = fixture("[scoop]\n");
        let runner = FakeRunner::default();
        let cache = ConfigCache::at(fx.plaintext.clone(), fx.hash_file.clone(), &runner);
        let decryptor = CopyDecryptor::default();
        let resolutions = Cell::new(0);
        let resolve = || {
            resolutions.set(resolutions.get() + 1);
            SecretKey::parse(KEY)
        };

        let first = cache.load_plaintext(&fx.ciphertext, resolve, &decryptor).unwrap();
        let second = cache.load_plaintext(&fx.ciphertext, resolve, &decryptor).unwrap();

        assert_eq!(first, "[scoop]\n");
        assert_eq!(second, first);
        assert_eq!(resolutions.get(), 1);
        assert_eq!(decryptor.decrypts.get(), 1);
        assert_eq!(
            fs::read_to_string(&fx.hash_file).unwrap(),
            sha256_hex(b"[scoop]\n")
        );
    }

    #[test]
    fn test_changed_ciphertext_refills_slot() {
        let fx = fixture("v1");
        let runner = FakeRunner::default();
        let cache = ConfigCache::at(fx.plaintext.clone(), fx.hash_file.clone(), &runner);
        let decryptor = CopyDecryptor::default();

        cache
            .load_plaintext(&fx.ciphertext, || SecretKey::parse(KEY), &decryptor)
            .unwrap();
        fs::write(&fx.ciphertext, "v2").unwrap();
        let text = cache
            .load_plaintext(&fx.ciphertext, || SecretKey::parse(KEY), &decryptor)
            .unwrap();

        assert_eq!(text, "v2");
        assert_eq!(decryptor.decrypts.get(), 2);
    }

    #[test]
    fn test_resolution_failure_leaves_no_stale_hash() {
        let fx = fixture("v1");
        let runner = FakeRunner::default();
        let cache = ConfigCache::at(fx.plaintext.clone(), fx.hash_file.clone(), &runner);
        let decryptor = CopyDecryptor::default();
        cache
            .load_plaintext(&fx.ciphertext, || SecretKey::parse(KEY), &decryptor)
            .unwrap();

        fs::write(&fx.ciphertext, "v2").unwrap();
        let err = cache
            .load_plaintext(&fx.ciphertext, || Err(KeelError::secret("none")), &decryptor)
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<KeelError>(),
            Some(KeelError::SecretResolution { .. })
        ));
        assert!(!fx.hash_file.exists());
    }

    #[test]
    fn test_clear() {
        let fx = fixture("v1");
        let runner = FakeRunner::default();
        let cache = ConfigCache::at(fx.plaintext.clone(), fx.hash_file.clone(), &runner);
        assert!(!cache.clear().unwrap());

        cache
            .load_plaintext(&fx.ciphertext, || SecretKey::parse(KEY), &CopyDecryptor::default())
            .unwrap();
        assert!(cache.clear().unwrap());
        assert!(!fx.plaintext.exists());
        assert!(!fx.hash_file.exists());
    }
}
