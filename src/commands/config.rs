//! `keel config` - move the desired-state document between plaintext and age

use anyhow::{Context, Result};
use std::fs;

use super::{confirm, decrypt_key_sources, recipient_hint, sibling_temp};
use super::secret::recipient;
use crate::AppContext;
use crate::error::KeelError;
use crate::paths::{self, Paths};
use crate::resource::acl;
use crate::runner::{Runner, SystemRunner};
use crate::schema::DesiredState;
use crate::secret::{
    AgeCli, BitwardenCli, ConfigCache, Decryptor, KeySources, SecretKey, resolve_key,
};
use crate::ui;

/// Encrypt `config.toml` into `config.toml.age`
///
/// The stale decrypted cache is dropped so the next run decrypts the new
/// ciphertext.
pub fn encrypt_config(
    paths: &Paths,
    recipient: &str,
    age: &dyn Decryptor,
    runner: &dyn Runner,
) -> Result<()> {
    let plaintext = paths.config_file();
    if !plaintext.is_file() {
        return Err(KeelError::config(format!("{} not found", plaintext.display())).into());
    }
    let output = paths.encrypted_config_file();
    let temp = sibling_temp(&output)?;
    age.encrypt(recipient, &plaintext, temp.path())?;
    temp.persist(&output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    ConfigCache::new(paths, runner).clear()?;
    Ok(())
}

/// Decrypt `config.toml.age` into `config.toml`, refusing to overwrite without `force`
pub fn decrypt_config(
    paths: &Paths,
    key: impl FnOnce() -> Result<SecretKey, KeelError>,
    age: &dyn Decryptor,
    runner: &dyn Runner,
    force: bool,
) -> Result<()> {
    let encrypted = paths.encrypted_config_file();
    if !encrypted.is_file() {
        return Err(KeelError::config(format!("{} not found", encrypted.display())).into());
    }
    let output = paths.config_file();
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists, pass --force to overwrite it",
            output.display()
        );
    }

    let key = key()?;
    let temp = sibling_temp(&output)?;
    age.decrypt(&key, &encrypted, temp.path())?;
    acl::restrict_to_owner(temp.path(), runner)?;
    temp.persist(&output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(())
}

pub fn encrypt(ctx: &AppContext, remove: bool) -> Result<()> {
    let runner = SystemRunner;
    let age = AgeCli::new(&runner);
    let vault = BitwardenCli::new(&runner);
    let paths = &ctx.paths;

    let plaintext = paths.config_file();
    let content = fs::read_to_string(&plaintext).map_err(|e| {
        KeelError::config(format!("Failed to read {}: {e}", plaintext.display()))
    })?;
    let document = DesiredState::parse(&content, &paths.config_dir, &paths.home)?;
    let hints = recipient_hint(paths)?;
    let sources = KeySources::from_env().with_fallback(KeySources::from_age_config(&document.age));
    let recipient = recipient(&[&document.age, &hints], || {
        let key = resolve_key(&sources, &vault)?;
        age.public_key(&key)
    })?;

    encrypt_config(paths, &recipient, &age, &runner)?;
    ui::success(&format!(
        "Encrypted {} → {}",
        paths::CONFIG_FILE,
        paths.encrypted_config_file().display()
    ));

    if remove {
        if confirm(&format!("Delete the plaintext {}?", plaintext.display()), true)? {
            fs::remove_file(&plaintext)
                .with_context(|| format!("Failed to remove {}", plaintext.display()))?;
            ui::info(&format!("Removed {}", plaintext.display()));
        } else {
            ui::dim("Plaintext kept");
        }
    } else if !ctx.quiet {
        ui::dim("The plaintext stays in place and still takes precedence; pass --remove to delete it");
    }
    Ok(())
}

pub fn decrypt(ctx: &AppContext, force: bool) -> Result<()> {
    let runner = SystemRunner;
    let age = AgeCli::new(&runner);
    let vault = BitwardenCli::new(&runner);
    let paths = &ctx.paths;

    age.ensure_available()?;
    let sources = decrypt_key_sources(paths)?;
    decrypt_config(paths, || resolve_key(&sources, &vault), &age, &runner, force)?;

    ui::success(&format!(
        "Decrypted {} → {}",
        paths::ENCRYPTED_CONFIG_FILE,
        paths.config_file().display()
    ));
    if !ctx.quiet {
        ui::dim("The plaintext now takes precedence over the encrypted document");
    }
    Ok(())
}

pub fn cache_clear(ctx: &AppContext) -> Result<()> {
    let runner = SystemRunner;
    if ConfigCache::new(&ctx.paths, &runner).clear()? {
        ui::success("Cleared the decrypted config cache");
    } else {
        ui::info("Config cache is already empty");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::fake::FakeRunner;
    use crate::secret::age::fake::CopyDecryptor;
    use tempfile::TempDir;

    const KEY: &str = "AGE-SECRET-KEY-1ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

    fn paths_in(tmp: &TempDir) -> Paths {
        let paths = Paths {
            config_dir: tmp.path().join("cfg"),
            cache_dir: tmp.path().join("cache"),
            home: tmp.path().join("home"),
        };
        fs::create_dir_all(&paths.config_dir).unwrap();
        paths
    }

    fn key() -> Result<SecretKey, KeelError> {
        SecretKey::parse(KEY)
    }

    #[test]
    fn test_encrypt_drops_stale_cache() {
        let tmp = TempDir::new().unwrap();
        let paths = paths_in(&tmp);
        fs::write(paths.config_file(), "[winget]\napps = [\"Git.Git\"]\n").unwrap();
        fs::create_dir_all(&paths.cache_dir).unwrap();
        fs::write(paths.cached_config(), "old").unwrap();
        fs::write(paths.cached_config_hash(), "abc").unwrap();

        let age = CopyDecryptor::default();
        encrypt_config(&paths, "age1x", &age, &FakeRunner::default()).unwrap();

        assert!(paths.encrypted_config_file().is_file());
        assert!(!paths.cached_config().exists());
        assert!(!paths.cached_config_hash().exists());
    }

    #[test]
    fn test_encrypt_without_plaintext() {
        let tmp = TempDir::new().unwrap();
        let paths = paths_in(&tmp);
        let err = encrypt_config(&paths, "age1x", &CopyDecryptor::default(), &FakeRunner::default())
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<KeelError>(),
            Some(KeelError::Config { .. })
        ));
    }

    #[test]
    fn test_decrypt_refuses_overwrite_without_force() {
        let tmp = TempDir::new().unwrap();
        let paths = paths_in(&tmp);
        fs::write(paths.encrypted_config_file(), "new").unwrap();
        fs::write(paths.config_file(), "old").unwrap();
        let age = CopyDecryptor::default();
        let runner = FakeRunner::default();

        assert!(decrypt_config(&paths, key, &age, &runner, false).is_err());
        assert_eq!(fs::read_to_string(paths.config_file()).unwrap(), "old");
        assert_eq!(age.decrypts.get(), 0);

        decrypt_config(&paths, key, &age, &runner, true).unwrap();
        assert_eq!(fs::read_to_string(paths.config_file()).unwrap(), "new");
    }

    #[test]
    fn test_decrypt_key_failure_leaves_no_file() {
        let tmp = TempDir::new().unwrap();
        let paths = paths_in(&tmp);
        fs::write(paths.encrypted_config_file(), "new").unwrap();

        let err = decrypt_config(
            &paths,
            || Err(KeelError::secret("no key source")),
            &CopyDecryptor::default(),
            &FakeRunner::default(),
            false,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<KeelError>(),
            Some(KeelError::SecretResolution { .. })
        ));
        assert!(!paths.config_file().exists());
    }
}
