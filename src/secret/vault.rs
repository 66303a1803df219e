//! Bitwarden vault access through the `bw` CLI

use serde::Deserialize;

use super::resolver::{SecretKey, find_key_line};
use crate::error::KeelError;
use crate::runner::Runner;

pub const BW: &str = "bw";

pub const BW_HINT: &str = "Install it with: scoop install bitwarden-cli";

/// Custom field names searched after the notes, in order
const KEY_FIELDS: [&str; 2] = ["age_key", "private_key"];

pub trait Vault {
    /// Read an age secret key from a named item
    fn fetch_key(&self, item: &str) -> Result<SecretKey, KeelError>;
}

#[derive(Debug, Deserialize)]
struct Status {
    status: String,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    fields: Vec<Field>,
}

#[derive(Debug, Deserialize)]
struct Field {
    name: Option<String>,
    value: Option<String>,
}

impl Item {
    fn key(&self) -> Option<SecretKey> {
        if let Some(line) = self.notes.as_deref().and_then(find_key_line) {
            return SecretKey::parse(line).ok();
        }
        KEY_FIELDS.iter().find_map(|wanted| {
            self.fields
                .iter()
                .filter(|f| f.name.as_deref() == Some(*wanted))
                .find_map(|f| f.value.as_deref())
                .and_then(|v| SecretKey::parse(v).ok())
        })
    }
}

/// Vault backed by the Bitwarden CLI
pub struct BitwardenCli<'a> {
    runner: &'a dyn Runner,
}

impl<'a> BitwardenCli<'a> {
    pub fn new(runner: &'a dyn Runner) -> Self {
        Self { runner }
    }

    fn run_json(&self, args: &[&str]) -> Result<String, KeelError> {
        let output = self
            .runner
            .run(BW, args)
            .map_err(|e| KeelError::command(BW, e.to_string()))?;
        if !output.success {
            return Err(KeelError::command(
                format!("{BW} {}", args.join(" ")),
                output.combined().trim().to_string(),
            ));
        }
        Ok(output.stdout_str())
    }

    fn ensure_unlocked(&self) -> Result<(), KeelError> {
        let raw = self.run_json(&["status"])?;
        let status: Status = serde_json::from_str(&raw)
            .map_err(|e| KeelError::command("bw status", format!("unexpected output: {e}")))?;

        if status.status != "unlocked" {
            return Err(KeelError::secret_with_hint(
                format!("Bitwarden vault is {}", status.status),
                "Run `bw unlock` and export the BW_SESSION it prints",
            ));
        }
        Ok(())
    }
}

impl Vault for BitwardenCli<'_> {
    fn fetch_key(&self, item: &str) -> Result<SecretKey, KeelError> {
        if !self.runner.exists(BW) {
            return Err(KeelError::prerequisite(BW, BW_HINT));
        }
        self.ensure_unlocked()?;

        let raw = self.run_json(&["get", "item", item])?;
        let parsed: Item = serde_json::from_str(&raw)
            .map_err(|e| KeelError::command("bw get item", format!("unexpected output: {e}")))?;

        parsed.key().ok_or_else(|| {
            KeelError::secret_with_hint(
                format!("vault item {item:?} holds no age secret key"),
                "Put the key in the item's notes or in a custom field named age_key",
            )
        })
    }
}
