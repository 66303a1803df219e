//! Phase-ordered reconciliation
//!
//! Phases run in a fixed order against one in-memory ledger:
//! scoop → winget → environment → path → dotfiles → encrypted files → tasks.
//! A failing phase is classified by its error kind; the ledger is written
//! once at the end, and only when a real run finished without errors.

use anyhow::Result;
use declarative::{
    BoxedPhase, Category, Disposition, ElevationProvider, Phase, PhaseOutcome, ProgressCallback,
    RunOptions, RunSummary,
};
use pkgkit::backend::{ScoopBackend, WingetBackend};
use std::cell::RefCell;
use std::path::PathBuf;

use super::differ;
use crate::error;
use crate::paths::Paths;
use crate::resource::{
    self, dotfile, encrypted_file, env_store::EnvStore, env_var, path_entry, scoop, winget,
};
use crate::runner::Runner;
use crate::schema::DesiredState;
use crate::secret::{Decryptor, KeySources, Vault, resolve_key};
use crate::state::Ledger;
use crate::sudo::{self, SudoContext};
use crate::tasks::{self, TaskRegistry};
use crate::ui;

/// Live-system collaborators for one run
#[derive(Clone, Copy)]
pub struct Toolbox<'a> {
    pub runner: &'a dyn Runner,
    pub scoop: &'a dyn ScoopBackend,
    pub winget: &'a dyn WingetBackend,
    pub env: &'a dyn EnvStore,
    pub vault: &'a dyn Vault,
    pub decryptor: &'a dyn Decryptor,
    pub tasks: &'a TaskRegistry,
}

/// State shared by all phases
pub struct RunState<'a> {
    pub desired: &'a DesiredState,
    pub ledger: Ledger,
    pub tools: Toolbox<'a>,
    pub home: PathBuf,
    pub quiet: bool,
    /// Variable lookup used to expand PATH entries
    pub env_lookup: &'a dyn Fn(&str) -> Option<String>,
}

/// Acquire elevation for machine-scope writes; a preview only checks the helper
fn elevation<'r>(
    needed: bool,
    runner: &'r dyn Runner,
    opts: &RunOptions,
    reason: &str,
) -> Result<Option<SudoContext<'r>>> {
    if !needed {
        return Ok(None);
    }
    if opts.dry_run {
        runner.require(sudo::HELPER, sudo::HELPER_HINT)?;
        return Ok(None);
    }
    SudoContext::acquire(runner, reason).map(Some)
}

fn show<T: std::fmt::Display>(quiet: bool, title: &str, plan: &declarative::Plan<T>) {
    if !quiet {
        resource::print_plan(title, plan);
    }
}

// ============================================================================
// Phases
// ============================================================================

struct ScoopPhase;

impl<'a> Phase<RunState<'a>> for ScoopPhase {
    type Error = anyhow::Error;

    fn name(&self) -> &'static str {
        "scoop"
    }

    fn run(&mut self, state: &mut RunState<'a>, opts: &RunOptions) -> Result<usize> {
        let plan = scoop::diff(&state.desired.scoop, state.tools.scoop)?;
        show(state.quiet, "Scoop", &plan);
        scoop::apply(&plan, state.tools.scoop, state.quiet, opts.dry_run)
    }
}

struct WingetPhase;

impl<'a> Phase<RunState<'a>> for WingetPhase {
    type Error = anyhow::Error;

    fn name(&self) -> &'static str {
        "winget"
    }

    fn run(&mut self, state: &mut RunState<'a>, opts: &RunOptions) -> Result<usize> {
        let plan = winget::diff(&state.desired.winget, state.tools.winget)?;
        show(state.quiet, "Winget", &plan);
        winget::apply(&plan, state.tools.winget, state.quiet, opts.dry_run)
    }
}

struct EnvironmentPhase;

impl<'a> Phase<RunState<'a>> for EnvironmentPhase {
    type Error = anyhow::Error;

    fn name(&self) -> &'static str {
        "environment"
    }

    fn run(&mut self, state: &mut RunState<'a>, opts: &RunOptions) -> Result<usize> {
        let desired = &state.desired.environment;
        let tracked = &state.ledger.environment;
        if desired.user.is_empty()
            && desired.machine.is_empty()
            && tracked.user.is_empty()
            && tracked.machine.is_empty()
        {
            return Ok(0);
        }

        let tools = state.tools;
        tools.env.ensure_available()?;
        let plan = env_var::diff(desired, tracked, tools.env)?;
        show(state.quiet, "Environment", &plan);

        let sudo = elevation(
            env_var::needs_elevation(&plan),
            tools.runner,
            opts,
            "machine environment variables",
        )?;
        let provider = sudo.as_ref().map(|s| s as &dyn ElevationProvider);
        env_var::apply(
            &plan,
            &mut state.ledger.environment,
            tools.env,
            provider,
            opts.dry_run,
        )
    }
}

struct PathPhase;

impl<'a> Phase<RunState<'a>> for PathPhase {
    type Error = anyhow::Error;

    fn name(&self) -> &'static str {
        "path"
    }

    fn run(&mut self, state: &mut RunState<'a>, opts: &RunOptions) -> Result<usize> {
        let desired = &state.desired.path;
        let tracked = &state.ledger.path;
        if *desired == Default::default() && *tracked == Default::default() {
            return Ok(0);
        }

        let tools = state.tools;
        tools.env.ensure_available()?;
        let plan = path_entry::diff(desired, tracked, tools.env, state.env_lookup)?;
        show(state.quiet, "PATH", &plan);

        let sudo = elevation(
            path_entry::needs_elevation(&plan),
            tools.runner,
            opts,
            "machine PATH",
        )?;
        let provider = sudo.as_ref().map(|s| s as &dyn ElevationProvider);
        path_entry::apply(
            &plan,
            &mut state.ledger.path,
            tools.env,
            provider,
            state.env_lookup,
            opts.dry_run,
        )
    }
}

struct DotfilesPhase;

impl<'a> Phase<RunState<'a>> for DotfilesPhase {
    type Error = anyhow::Error;

    fn name(&self) -> &'static str {
        "dotfiles"
    }

    fn run(&mut self, state: &mut RunState<'a>, opts: &RunOptions) -> Result<usize> {
        let plan = dotfile::diff(
            state.desired.dotfiles.as_ref(),
            &state.ledger.dotfiles,
            &state.home,
        )?;
        show(state.quiet, "Dotfiles", &plan);

        if opts.verbose && !state.quiet {
            for item in plan.items(Category::Update) {
                if let Some(source) = &item.source {
                    ui::dim(&item.key);
                    differ::show_file_diff(&item.target, source);
                }
            }
        }

        dotfile::apply(&plan, &mut state.ledger.dotfiles, opts.dry_run)
    }
}

struct EncryptedFilesPhase;

impl<'a> Phase<RunState<'a>> for EncryptedFilesPhase {
    type Error = anyhow::Error;

    fn name(&self) -> &'static str {
        "encrypted_files"
    }

    fn run(&mut self, state: &mut RunState<'a>, opts: &RunOptions) -> Result<usize> {
        let plan = encrypted_file::diff(
            &state.desired.encrypted_files,
            &state.ledger.encrypted_files,
            &state.home,
        )?;
        show(state.quiet, "Encrypted files", &plan);

        let tools = state.tools;
        let age = &state.desired.age;
        let resolve = || {
            let sources = KeySources::from_env().with_fallback(KeySources::from_age_config(age));
            resolve_key(&sources, tools.vault)
        };
        encrypted_file::apply(
            &plan,
            &mut state.ledger.encrypted_files,
            tools.decryptor,
            resolve,
            tools.runner,
            opts.dry_run,
        )
    }
}

struct TasksPhase;

impl<'a> Phase<RunState<'a>> for TasksPhase {
    type Error = anyhow::Error;

    fn name(&self) -> &'static str {
        "tasks"
    }

    fn run(&mut self, state: &mut RunState<'a>, opts: &RunOptions) -> Result<usize> {
        let tools = state.tools;
        tasks::run_all(
            &state.desired.tasks,
            &mut state.ledger,
            tools.tasks,
            tools.runner,
            opts.dry_run,
            state.quiet,
        )
    }
}

/// All phases in execution order
pub fn phases<'a>() -> Vec<BoxedPhase<'static, RunState<'a>, anyhow::Error>> {
    vec![
        Box::new(ScoopPhase),
        Box::new(WingetPhase),
        Box::new(EnvironmentPhase),
        Box::new(PathPhase),
        Box::new(DotfilesPhase),
        Box::new(EncryptedFilesPhase),
        Box::new(TasksPhase),
    ]
}

// ============================================================================
// Run
// ============================================================================

/// Reports phase failures as they happen
struct UiProgress;

impl ProgressCallback for UiProgress {
    fn on_phase_start(&mut self, name: &str) {
        log::debug!("Starting phase {name}");
    }

    fn on_phase_complete(&mut self, name: &str, outcome: &PhaseOutcome) {
        if let PhaseOutcome::Failed { error, disposition } = outcome {
            match disposition {
                Disposition::Warn => ui::warn(&format!("{name}: {error}")),
                _ => ui::error(&format!("{name} failed: {error}")),
            }
        }
    }
}

/// Result of a run with the remediation hints collected from failed phases
#[derive(Debug)]
pub struct RunReport {
    pub summary: RunSummary,
    pub hints: Vec<String>,
    pub ledger_saved: bool,
}

/// Run every phase and persist the ledger after a clean apply
///
/// A ledger with an unsupported schema version aborts before any phase runs.
pub fn execute(
    paths: &Paths,
    desired: &DesiredState,
    tools: Toolbox<'_>,
    opts: &RunOptions,
    quiet: bool,
) -> Result<RunReport> {
    let ledger = Ledger::load(&paths.state_file())?;
    let mut state = RunState {
        desired,
        ledger,
        tools,
        home: paths.home.clone(),
        quiet,
        env_lookup: &path_entry::process_env,
    };

    let (summary, hints) = run(&mut state, opts);

    let ledger_saved = summary.should_commit();
    if ledger_saved {
        state.ledger.save(&paths.state_file())?;
    } else if !opts.dry_run {
        log::warn!("Run had errors, ledger not updated");
    }

    Ok(RunReport {
        summary,
        hints,
        ledger_saved,
    })
}

/// Run the phases against prepared state
pub fn run(state: &mut RunState<'_>, opts: &RunOptions) -> (RunSummary, Vec<String>) {
    let hints = RefCell::new(Vec::new());
    let classifier = |e: &anyhow::Error| {
        if let Some(hint) = error::hint_for(e) {
            hints.borrow_mut().push(hint);
        }
        error::classify(e)
    };

    let mut phases = phases();
    let mut progress = UiProgress;
    let summary = declarative::run_phases(&mut phases, state, opts, &classifier, &mut progress);
    (summary, hints.into_inner())
}

/// Print the closing summary line and any failures
pub fn print_summary(report: &RunReport) {
    let summary = &report.summary;
    println!();
    if summary.dry_run {
        ui::info(&format!("{} pending", ui::changes(summary.changes)));
    } else if summary.changes == 0 && !summary.had_errors {
        ui::success("Everything is up to date");
    } else {
        ui::success(&format!("Applied {}", ui::changes(summary.changes)));
    }

    if summary.had_errors {
        let failed: Vec<&str> = summary.failures().map(|(name, _)| name).collect();
        ui::warn(&format!("Phases with errors: {}", failed.join(", ")));
        for hint in &report.hints {
            ui::dim(&format!("hint: {hint}"));
        }
        if !summary.dry_run {
            ui::dim("The ledger was not updated; fix the errors and run apply again");
        }
    }
}
