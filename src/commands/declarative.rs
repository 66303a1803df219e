//! Declarative commands
//!
//! - `status` - preview what apply would change
//! - `apply` - make the machine match the desired-state document

use anyhow::Result;
use declarative::{RunOptions, RunSummary};
use pkgkit::backend::scoop::ScoopCli;
use pkgkit::backend::winget::WingetCli;

use crate::AppContext;
use crate::config::{self, ConfigSource};
use crate::engine::{self, Toolbox};
use crate::resource::env_store::PowerShellEnvStore;
use crate::runner::SystemRunner;
use crate::secret::{AgeCli, BitwardenCli};
use crate::tasks::TaskRegistry;
use crate::ui;

/// Show pending changes without touching anything
pub fn status(ctx: &AppContext) -> Result<RunSummary> {
    run(ctx, true)
}

/// Converge the machine on the desired state
pub fn apply(ctx: &AppContext) -> Result<RunSummary> {
    run(ctx, false)
}

fn run(ctx: &AppContext, dry_run: bool) -> Result<RunSummary> {
    let runner = SystemRunner;
    let scoop = ScoopCli::new();
    let winget = WingetCli::new();
    let env = PowerShellEnvStore::new(&runner);
    let vault = BitwardenCli::new(&runner);
    let age = AgeCli::new(&runner);
    let tasks = TaskRegistry::builtin();

    let source = ConfigSource::locate(&ctx.paths)?;
    let desired = config::load(&ctx.paths, &runner, &vault, &age)?;

    if !ctx.quiet {
        ui::header(if dry_run { "keel status" } else { "keel apply" });
        ui::kv("Config", &source.to_string());
        if dry_run {
            ui::dim("Preview only, nothing is changed");
        }
    }

    let tools = Toolbox {
        runner: &runner,
        scoop: &scoop,
        winget: &winget,
        env: &env,
        vault: &vault,
        decryptor: &age,
        tasks: &tasks,
    };
    let opts = RunOptions {
        dry_run,
        verbose: ctx.verbose > 0,
    };

    let report = engine::execute(&ctx.paths, &desired, tools, &opts, ctx.quiet)?;
    if !ctx.quiet || report.summary.had_errors {
        engine::print_summary(&report);
    }
    Ok(report.summary)
}
