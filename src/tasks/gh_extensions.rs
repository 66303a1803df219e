//! GitHub CLI extensions through `gh extension`
//!
//! ```toml
//! [tasks.gh_extensions]
//! extensions = ["dlvhdr/gh-dash"]
//! ```

use anyhow::Result;
use std::collections::{BTreeSet, HashSet};

use super::{Task, TaskInfo, TaskOutcome, TaskStatus, string_list};
use crate::runner::Runner;

pub const NAME: &str = "gh_extensions";

const GH: &str = "gh";
const GH_HINT: &str = "Install it with: winget install GitHub.cli";

/// `owner/repo` entries from `gh extension list`
///
/// Lines look like `gh dash\tdlvhdr/gh-dash\tv4.0.0`.
fn parse_list(stdout: &str) -> HashSet<String> {
    stdout
        .lines()
        .filter_map(|line| line.split('\t').map(str::trim).find(|field| field.contains('/')))
        .map(str::to_lowercase)
        .collect()
}

/// Name `gh extension remove` expects for a repository
fn extension_name(repo: &str) -> &str {
    repo.rsplit('/').next().unwrap_or(repo)
}

pub struct GhExtensions<'a> {
    runner: &'a dyn Runner,
    installed_now: Vec<String>,
}

impl<'a> GhExtensions<'a> {
    pub fn new(runner: &'a dyn Runner) -> Self {
        Self {
            runner,
            installed_now: Vec::new(),
        }
    }
}

impl Task for GhExtensions<'_> {
    fn info(&self) -> TaskInfo {
        TaskInfo {
            name: NAME,
            description: "GitHub CLI extensions",
            tool: GH,
        }
    }

    fn status(&mut self, config: &toml::Value, items: &BTreeSet<String>) -> Result<TaskStatus> {
        self.runner.require(GH, GH_HINT)?;
        let desired: Vec<String> = string_list(config, "extensions")?
            .into_iter()
            .map(|repo| repo.to_lowercase())
            .collect();
        let live = parse_list(&self.runner.run_capture(GH, &["extension", "list"])?);

        let mut status = TaskStatus::default();
        let mut seen = HashSet::new();
        for repo in desired.iter().filter(|r| seen.insert(r.as_str())) {
            if live.contains(repo) {
                status.up_to_date.push(repo.clone());
            } else {
                status.to_install.push(repo.clone());
            }
        }
        status.to_remove = items
            .iter()
            .filter(|r| !seen.contains(r.as_str()) && live.contains(*r))
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
        for repo in status.to_install {
            self.runner.run_capture(GH, &["extension", "install", &repo])?;
            self.installed_now.push(repo.clone());
            outcome.installed.push(repo);
        }
        for repo in status.to_remove {
            self.runner
                .run_capture(GH, &["extension", "remove", extension_name(&repo)])?;
            outcome.removed.push(repo);
        }
        Ok(outcome)
    }

    fn rollback(&mut self) -> Result<()> {
        for repo in self.installed_now.drain(..).rev() {
            log::info!("Rolling back gh extension {repo}");
            self.runner
                .run_capture(GH, &["extension", "remove", extension_name(&repo)])?;
        }
        Ok(())
    }
}
