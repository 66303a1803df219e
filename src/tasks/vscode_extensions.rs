//! VS Code extensions through the `code` CLI
//!
//! ```toml
//! [tasks.vscode_extensions]
//! extensions = ["rust-lang.rust-analyzer", "tamasfe.even-better-toml"]
//! ```

use anyhow::Result;
use std::collections::{BTreeSet, HashSet};

use super::{Task, TaskInfo, TaskOutcome, TaskStatus, string_list};
use crate::runner::Runner;

pub const NAME: &str = "vscode_extensions";

const CODE: &str = "code";
const CODE_HINT: &str = "Install VS Code and enable the `code` command on PATH";

pub struct VsCodeExtensions<'a> {
    runner: &'a dyn Runner,
    /// Installed during the current apply, undone by rollback
    installed_now: Vec<String>,
}

impl<'a> VsCodeExtensions<'a> {
    pub fn new(runner: &'a dyn Runner) -> Self {
        Self {
            runner,
            installed_now: Vec::new(),
        }
    }

    fn installed(&self) -> Result<HashSet<String>> {
        let stdout = self.runner.run_capture(CODE, &["--list-extensions"])?;
        Ok(stdout
            .lines()
            .map(|line| line.trim().to_lowercase())
            .filter(|line| !line.is_empty())
            .collect())
    }
}

impl Task for VsCodeExtensions<'_> {
    fn info(&self) -> TaskInfo {
        TaskInfo {
            name: NAME,
            description: "VS Code extensions",
            tool: CODE,
        }
    }

    fn status(&mut self, config: &toml::Value, items: &BTreeSet<String>) -> Result<TaskStatus> {
        self.runner.require(CODE, CODE_HINT)?;
        let desired: Vec<String> = string_list(config, "extensions")?
            .into_iter()
            .map(|id| id.to_lowercase())
            .collect();
        let live = self.installed()?;

        let mut status = TaskStatus::default();
        let mut seen = HashSet::new();
        for id in desired.iter().filter(|id| seen.insert(id.as_str())) {
            if live.contains(id) {
                status.up_to_date.push(id.clone());
            } else {
                status.to_install.push(id.clone());
            }
        }
        status.to_remove = items
            .iter()
            .filter(|id| !seen.contains(id.as_str()) && live.contains(*id))
            .cloned()
            .collect();
        Ok(status)
    }

    fn apply(
        &mut self,
        config: &toml::Value,
        items: &BTreeSet<String>,
        dry_run: bool,
    ) -> Result<TaskOutcome> {
        let status = self.status(config, items)?;
        if dry_run {
            return Ok(TaskOutcome {
                installed: status.to_install,
                removed: status.to_remove,
            });
        }

        let mut outcome = TaskOutcome::default();
        for id in status.to_install {
            self.runner
                .run_capture(CODE, &["--install-extension", &id, "--force"])?;
            self.installed_now.push(id.clone());
            outcome.installed.push(id);
        }
        for id in status.to_remove {
            self.runner.run_capture(CODE, &["--uninstall-extension", &id])?;
            outcome.removed.push(id);
        }
        Ok(outcome)
    }

    fn rollback(&mut self) -> Result<()> {
        for id in self.installed_now.drain(..).rev() {
            log::info!("Rolling back VS Code extension {id}");
            self.runner.run_capture(CODE, &["--uninstall-extension", &id])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::fake::FakeRunner;
    use declarative::CommandOutput;

    fn config(ids: &[&str]) -> toml::Value {
        let mut table = toml::Table::new();
        table.insert(
            "extensions".to_string(),
            toml::Value::Array(ids.iter().map(|s| toml::Value::String((*s).to_string())).collect()),
        );
        toml::Value::Table(table)
    }

    #[test]
    fn test_status() {
        let runner = FakeRunner::with_tools(&[CODE]);
        runner.respond(
            "code --list-extensions",
            CommandOutput::ok("Rust-Lang.Rust-Analyzer\nold.ext\nmanual.ext\n"),
        );
        let items: BTreeSet<String> = ["old.ext".to_string()].into();

        let mut task = VsCodeExtensions::new(&runner);
        let status = task
            .status(&config(&["rust-lang.rust-analyzer", "new.ext"]), &items)
            .unwrap();
        assert_eq!(status.up_to_date, vec!["rust-lang.rust-analyzer"]);
        assert_eq!(status.to_install, vec!["new.ext"]);
        assert_eq!(status.to_remove, vec!["old.ext"]);
    }

    #[test]
    fn test_missing_cli() {
        let runner = FakeRunner::default();
        let mut task = VsCodeExtensions::new(&runner);
        assert!(task.status(&config(&["a.b"]), &BTreeSet::new()).is_err());
    }

    #[test]
    fn test_failed_install_rolls_back() {
        let runner = FakeRunner::with_tools(&[CODE]);
        runner.respond("code --install-extension b.b", CommandOutput::failed("not found"));
        let mut task = VsCodeExtensions::new(&runner);

        assert!(task.apply(&config(&["a.a", "b.b"]), &BTreeSet::new(), false).is_err());
        task.rollback().unwrap();
        assert_eq!(runner.calls_matching("code --uninstall-extension a.a"), 1);
    }
}
