//! Encrypted file reconciler
//!
//! Each mapping decrypts an age file into a target. The ledger keeps the
//! SHA-256 of the ciphertext that was deployed and of the plaintext written,
//! so both a new ciphertext and local edits to the target are detected.

use anyhow::{Context, Result};
use declarative::{Category, Plan};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use super::acl::{self, AclSpec};
use super::{from_tilde_key, tilde_key};
use crate::error::KeelError;
use crate::runner::Runner;
use crate::schema::EncryptedFile;
use crate::secret::cache::{sha256_file, sha256_hex};
use crate::secret::{Decryptor, SecretKey};
use crate::state::EncryptedFileRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateReason {
    Untracked,
    SourceChanged,
    TargetModified,
}

impl UpdateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Untracked => "untracked",
            Self::SourceChanged => "source changed",
            Self::TargetModified => "target modified",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedItem {
    /// Ledger key
    pub key: String,
    /// Ciphertext; `None` for removals
    pub source: Option<PathBuf>,
    pub target: PathBuf,
    pub acl: Option<AclSpec>,
    pub reason: Option<UpdateReason>,
}

impl fmt::Display for EncryptedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)?;
        if let Some(reason) = self.reason {
            write!(f, " ({})", reason.as_str())?;
        }
        Ok(())
    }
}

/// Compare declared mappings with deployed targets and the ledger
pub fn diff(
    files: &[EncryptedFile],
    records: &BTreeMap<String, EncryptedFileRecord>,
    home: &Path,
) -> Result<Plan<EncryptedItem>> {
    let mut plan = Plan::new();
    let mut declared = BTreeSet::new();

    for file in files {
        let key = tilde_key(&file.target, home);
        declared.insert(key.clone());

        let item = |reason| EncryptedItem {
            key: key.clone(),
            source: Some(file.source.clone()),
            target: file.target.clone(),
            acl: file.acl,
            reason,
        };

        if !file.target.is_file() {
            plan.push(Category::Add, item(None));
            continue;
        }

        let Some(record) = records.get(&key) else {
            plan.push(Category::Update, item(Some(UpdateReason::Untracked)));
            continue;
        };

        if sha256_file(&file.target)? != record.target_hash {
            plan.push(Category::Update, item(Some(UpdateReason::TargetModified)));
        } else if sha256_file(&file.source)? != record.source_hash {
            plan.push(Category::Update, item(Some(UpdateReason::SourceChanged)));
        }
    }

    for key in records.keys().filter(|k| !declared.contains(*k)) {
        plan.push(
            Category::Remove,
            EncryptedItem {
                key: key.clone(),
                source: None,
                target: from_tilde_key(key, home),
                acl: None,
                reason: None,
            },
        );
    }

    Ok(plan)
}

/// Whether the plan needs the age binary and a key
pub fn needs_key(plan: &Plan<EncryptedItem>) -> bool {
    !plan.items(Category::Add).is_empty() || !plan.items(Category::Update).is_empty()
}

/// Decrypt one mapping into place, returning its ledger record
fn deploy(
    source: &Path,
    item: &EncryptedItem,
    key: &SecretKey,
    decryptor: &dyn Decryptor,
    runner: &dyn Runner,
) -> Result<EncryptedFileRecord> {
    let dir = item
        .target
        .parent()
        .with_context(|| format!("{} has no parent directory", item.target.display()))?;
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let source_hash = sha256_file(source)?;

    let staging = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    decryptor.decrypt(key, source, staging.path())?;

    let plaintext = fs::read(staging.path())
        .with_context(|| format!("Failed to read decrypted {}", source.display()))?;
    let target_hash = sha256_hex(&plaintext);

    if let Some(spec) = &item.acl {
        acl::apply(spec, staging.path(), runner)?;
    }
    staging
        .persist(&item.target)
        .with_context(|| format!("Failed to write {}", item.target.display()))?;

    Ok(EncryptedFileRecord {
        source_hash,
        target_hash,
    })
}

/// Execute the plan and update the ledger
///
/// The age binary is required whenever add or update work exists, even in a
/// preview. The key is resolved at most once, and only for a real apply.
pub fn apply<F>(
    plan: &Plan<EncryptedItem>,
    records: &mut BTreeMap<String, EncryptedFileRecord>,
    decryptor: &dyn Decryptor,
    resolve: F,
    runner: &dyn Runner,
    dry_run: bool,
) -> Result<usize>
where
    F: FnOnce() -> std::result::Result<SecretKey, KeelError>,
{
    let deploys: Vec<&EncryptedItem> = plan
        .items(Category::Add)
        .iter()
        .chain(plan.items(Category::Update))
        .collect();

    if needs_key(plan) {
        decryptor.ensure_available()?;
    }
    if dry_run {
        return Ok(plan.len());
    }

    if !deploys.is_empty() {
        let key = resolve()?;
        for item in deploys {
            let Some(source) = &item.source else { continue };
            let record = deploy(source, item, &key, decryptor, runner)?;
            log::debug!("Deployed {}", item.key);
            records.insert(item.key.clone(), record);
        }
    }

    for item in plan.items(Category::Remove) {
        if item.target.is_file() {
            fs::remove_file(&item.target)
                .with_context(|| format!("Failed to remove {}", item.target.display()))?;
        }
        records.remove(&item.key);
    }

    Ok(plan.len())
}
