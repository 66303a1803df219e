//! Wrapper around the `age` and `age-keygen` binaries
//!
//! The secret key only ever touches disk inside a [`NamedTempFile`] that
//! lives for one decrypt invocation and is removed when it drops.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

use super::resolver::SecretKey;
use crate::error::KeelError;
use crate::runner::Runner;

pub const AGE: &str = "age";
pub const AGE_KEYGEN: &str = "age-keygen";

pub const AGE_HINT: &str = "Install it with: scoop install age";

pub trait Decryptor {
    /// Fail with a prerequisite error unless the tool is installed
    fn ensure_available(&self) -> Result<()>;

    /// Decrypt `input` into `output` with `key`
    fn decrypt(&self, key: &SecretKey, input: &Path, output: &Path) -> Result<()>;

    /// Encrypt `input` into `output` for `recipient`
    fn encrypt(&self, recipient: &str, input: &Path, output: &Path) -> Result<()>;
}

/// `age` driven through a [`Runner`]
pub struct AgeCli<'a> {
    runner: &'a dyn Runner,
}

impl<'a> AgeCli<'a> {
    pub fn new(runner: &'a dyn Runner) -> Self {
        Self { runner }
    }

    /// Generate a new identity at `path`, returning its public key
    pub fn keygen(&self, path: &Path) -> Result<String> {
        self.runner.require(AGE_KEYGEN, AGE_HINT)?;
        let target = path.to_string_lossy();
        let output = self.runner.run(AGE_KEYGEN, &["-o", &target])?;
        if !output.success {
            return Err(KeelError::command(AGE_KEYGEN, output.stderr_str().trim()).into());
        }
        // age-keygen reports "Public key: age1..." on stderr
        output
            .combined()
            .lines()
            .find_map(|line| line.trim().strip_prefix("Public key:"))
            .map(|key| key.trim().to_string())
            .context("age-keygen did not report a public key")
    }

    /// Derive the public recipient of a secret key
    pub fn public_key(&self, key: &SecretKey) -> Result<String> {
        self.runner.require(AGE_KEYGEN, AGE_HINT)?;
        let identity = write_identity(key)?;
        let path = identity.path().to_string_lossy().to_string();
        let stdout = self.runner.run_capture(AGE_KEYGEN, &["-y", &path])?;
        stdout
            .lines()
            .map(str::trim)
            .find(|line| line.starts_with("age1"))
            .map(ToString::to_string)
            .context("age-keygen -y did not print a recipient")
    }
}

impl Decryptor for AgeCli<'_> {
    fn ensure_available(&self) -> Result<()> {
        self.runner.require(AGE, AGE_HINT)
    }

    fn decrypt(&self, key: &SecretKey, input: &Path, output: &Path) -> Result<()> {
        self.ensure_available()?;
        let identity = write_identity(key)?;
        let identity_path = identity.path().to_string_lossy().to_string();
        let input = input.to_string_lossy();
        let out = output.to_string_lossy();

        self.runner
            .run_capture(AGE, &["--decrypt", "-i", &identity_path, "-o", &out, &input])
            .with_context(|| format!("Failed to decrypt {input}"))?;
        Ok(())
    }

    fn encrypt(&self, recipient: &str, input: &Path, output: &Path) -> Result<()> {
        self.ensure_available()?;
        let input = input.to_string_lossy();
        let out = output.to_string_lossy();

        self.runner
            .run_capture(AGE, &["--encrypt", "-r", recipient, "-o", &out, &input])
            .with_context(|| format!("Failed to encrypt {input}"))?;
        Ok(())
    }
}

/// Materialize a key into a temp file removed on drop
fn write_identity(key: &SecretKey) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("keel-identity-")
        .tempfile()
        .context("Failed to create temporary identity file")?;
    writeln!(file, "{}", key.expose()).context("Failed to write temporary identity file")?;
    file.flush()?;
    Ok(file)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::fake::FakeRunner;
    use declarative::CommandOutput;

    const KEY: &str = "AGE-SECRET-KEY-1ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

    #[test]
    fn test_decrypt_invocation() {
        let runner = FakeRunner::with_tools(&[AGE]);
        let age = AgeCli::new(&runner);
        let key = SecretKey::parse(KEY).unwrap();
        age.decrypt(&key, Path::new("in.age"), Path::new("out")).unwrap();

        let calls = runner.calls.borrow();
        assert!(calls[0].starts_with("age --decrypt -i "));
        assert!(calls[0].ends_with("-o out in.age"));
        assert!(!calls[0].contains(KEY));
    }

    #[test]
    fn test_identity_file_removed_after_decrypt() {
        let runner = FakeRunner::with_tools(&[AGE]);
        let key = SecretKey::parse(KEY).unwrap();
        AgeCli::new(&runner)
            .decrypt(&key, Path::new("in.age"), Path::new("out"))
            .unwrap();

        let call = runner.calls.borrow()[0].clone();
        let identity = call.split_whitespace().nth(3).unwrap().to_string();
        assert!(!Path::new(&identity).exists());
    }

    #[test]
    fn test_decrypt_failure_is_reported() {
        let runner = FakeRunner::with_tools(&[AGE]);
        runner.respond("age --decrypt", CommandOutput::failed("no identity matched"));
        let key = SecretKey::parse(KEY).unwrap();
        let err = AgeCli::new(&runner)
            .decrypt(&key, Path::new("in.age"), Path::new("out"))
            .unwrap_err();
        assert!(format!("{err:#}").contains("no identity matched"));
    }

    #[test]
    fn test_missing_age() {
        let runner = FakeRunner::default();
        let err = AgeCli::new(&runner).ensure_available().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<KeelError>(),
            Some(KeelError::PrerequisiteMissing { .. })
        ));
    }

    #[test]
    fn test_keygen_reports_public_key() {
        let runner = FakeRunner::with_tools(&[AGE_KEYGEN]);
        runner.respond(
            "age-keygen -o",
            CommandOutput {
                stdout: Vec::new(),
                stderr: b"Public key: age1xyz\n".to_vec(),
                success: true,
            },
        );
        let public = AgeCli::new(&runner).keygen(Path::new("key.txt")).unwrap();
        assert_eq!(public, "age1xyz");
    }

    #[test]
    fn test_public_key_derivation() {
        let runner = FakeRunner::with_tools(&[AGE_KEYGEN]);
        runner.respond("age-keygen -y", CommandOutput::ok("age1recipient\n"));
        let key = SecretKey::parse(KEY).unwrap();
        assert_eq!(AgeCli::new(&runner).public_key(&key).unwrap(), "age1recipient");
    }
}
