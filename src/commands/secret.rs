//! `keel secret` - age identities and one-off file encryption

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::{confirm, decrypt_key_sources, recipient_hint, sibling_temp};
use crate::AppContext;
use crate::config::ConfigSource;
use crate::resource::acl;
use crate::runner::{Runner, SystemRunner};
use crate::schema::{AgeConfig, DesiredState};
use crate::secret::{AgeCli, BitwardenCli, Decryptor, KeySources, SecretKey, Vault, resolve_key};
use crate::ui;

const AGE_EXTENSION: &str = "age";

/// `<file>.age`
pub fn encrypted_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(".");
    name.push(AGE_EXTENSION);
    PathBuf::from(name)
}

/// `<file>` for `<file>.age`
pub fn decrypted_path(file: &Path) -> Result<PathBuf> {
    if file.extension().is_some_and(|ext| ext == AGE_EXTENSION) {
        Ok(file.with_extension(""))
    } else {
        anyhow::bail!("{} does not end in .{AGE_EXTENSION}", file.display())
    }
}

/// Recipient for new ciphertexts
///
/// Uses the first `public_key` among `configs`, otherwise derives it from
/// the resolved secret key.
pub fn recipient(
    configs: &[&AgeConfig],
    derive: impl FnOnce() -> Result<String>,
) -> Result<String> {
    if let Some(key) = configs.iter().find_map(|age| age.public_key.clone()) {
        log::debug!("Using configured age recipient");
        return Ok(key);
    }
    log::debug!("No public key configured, deriving it from the secret key");
    derive()
}

/// Derive a recipient from whichever secret key the sources resolve to
fn derive_recipient(age: &AgeCli<'_>, sources: &KeySources, vault: &dyn Vault) -> Result<String> {
    let key = resolve_key(sources, vault)?;
    age.public_key(&key)
}

/// `[age]` table of the plaintext document, when there is one
fn plaintext_age_config(ctx: &AppContext) -> Option<AgeConfig> {
    let Ok(ConfigSource::Plaintext(path)) = ConfigSource::locate(&ctx.paths) else {
        return None;
    };
    let content = std::fs::read_to_string(&path).ok()?;
    match DesiredState::parse(&content, &ctx.paths.config_dir, &ctx.paths.home) {
        Ok(state) => Some(state.age),
        Err(e) => {
            log::debug!("Ignoring unparsable {}: {e}", path.display());
            None
        }
    }
}

/// Encrypt `file` into `<file>.age`
pub fn encrypt_file(file: &Path, recipient: &str, age: &dyn Decryptor) -> Result<PathBuf> {
    if !file.is_file() {
        anyhow::bail!("File not found: {}", file.display());
    }
    let output = encrypted_path(file);
    let temp = sibling_temp(&output)?;
    age.encrypt(recipient, file, temp.path())?;
    temp.persist(&output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(output)
}

/// Decrypt `<file>.age` next to itself, readable by the owner only
pub fn decrypt_file(
    file: &Path,
    key: &SecretKey,
    age: &dyn Decryptor,
    runner: &dyn Runner,
) -> Result<PathBuf> {
    if !file.is_file() {
        anyhow::bail!("File not found: {}", file.display());
    }
    let output = decrypted_path(file)?;
    let temp = sibling_temp(&output)?;
    age.decrypt(key, file, temp.path())?;
    acl::restrict_to_owner(temp.path(), runner)?;
    temp.persist(&output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(output)
}

pub fn keygen(ctx: &AppContext, path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or_else(|| ctx.paths.default_key_file());
    if path.exists() {
        ui::warn(&format!("{} already exists", path.display()));
        if !confirm("Overwrite the existing key? The old key is lost", false)? {
            anyhow::bail!("Key generation cancelled, {} left untouched", path.display());
        }
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let runner = SystemRunner;
    let age = AgeCli::new(&runner);
    let public_key = age.keygen(&path)?;
    acl::restrict_to_owner(&path, &runner)?;

    ui::success(&format!("Generated {}", path.display()));
    ui::kv("Public key", &public_key);
    if !ctx.quiet {
        println!();
        ui::dim("Add the public key to [age].public_key and keep the secret key out of version control");
    }
    Ok(())
}

pub fn encrypt(ctx: &AppContext, file: &Path) -> Result<()> {
    let runner = SystemRunner;
    let age = AgeCli::new(&runner);
    let vault = BitwardenCli::new(&runner);

    let hints = recipient_hint(&ctx.paths)?;
    let document = plaintext_age_config(ctx);
    let sources = KeySources::from_env()
        .with_fallback(document.as_ref().map(KeySources::from_age_config).unwrap_or_default());
    let mut configs: Vec<&AgeConfig> = document.iter().collect();
    configs.push(&hints);
    let recipient = recipient(&configs, || derive_recipient(&age, &sources, &vault))?;

    let output = encrypt_file(file, &recipient, &age)?;
    ui::success(&format!("Encrypted {} → {}", file.display(), output.display()));
    Ok(())
}

pub fn decrypt(ctx: &AppContext, file: &Path) -> Result<()> {
    let runner = SystemRunner;
    let age = AgeCli::new(&runner);
    let vault = BitwardenCli::new(&runner);

    age.ensure_available()?;
    let sources = decrypt_key_sources(&ctx.paths)?;
    let key = resolve_key(&sources, &vault)?;

    let output = decrypt_file(file, &key, &age, &runner)?;
    ui::success(&format!("Decrypted {} → {}", file.display(), output.display()));
    Ok(())
}
