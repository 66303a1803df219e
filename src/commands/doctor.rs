use anyhow::Result;
use colored::Colorize;

use crate::AppContext;
use crate::config::{self, ConfigSource};
use crate::paths::Paths;
use crate::resource::{env_store, scoop, winget};
use crate::runner::{Runner, SystemRunner};
use crate::secret::{age, vault};
use crate::state::Ledger;
use crate::sudo;
use crate::tasks::TaskRegistry;
use crate::ui;

struct Issue {
    category: &'static str,
    summary: String,
    detail: Option<String>,
    fix: Option<String>,
}

/// External tools and the work that needs them
fn tools() -> [(&'static str, &'static str, &'static str); 7] {
    [
        ("scoop", "Scoop packages", scoop::SCOOP_HINT),
        ("winget", "Winget packages", winget::WINGET_HINT),
        (env_store::POWERSHELL, "Environment and PATH", env_store::POWERSHELL_HINT),
        (sudo::HELPER, "Machine-scope changes", sudo::HELPER_HINT),
        (age::AGE, "Encrypted files and config", age::AGE_HINT),
        (age::AGE_KEYGEN, "Key generation", age::AGE_HINT),
        (vault::BW, "Key from Bitwarden", vault::BW_HINT),
    ]
}

pub fn run(ctx: &AppContext) -> Result<()> {
    if !ctx.quiet {
        ui::banner();
    }
    ui::header("System Health Check");

    let runner = SystemRunner;
    let mut issues: Vec<Issue> = Vec::new();

    check_tools(&runner, &mut issues);
    check_tasks(&runner, &TaskRegistry::builtin(), &mut issues);
    check_locations(&ctx.paths);
    check_config(&ctx.paths, &mut issues);
    check_ledger(&ctx.paths, &mut issues);

    println!();
    if issues.is_empty() {
        ui::success("All systems healthy!");
    } else {
        print_issue_summary(&issues);
    }

    Ok(())
}

fn print_issue_summary(issues: &[Issue]) {
    let count = issues.len();
    let label = if count == 1 { "Issue" } else { "Issues" };
    ui::header(&format!("{count} {label} Found"));

    for (i, issue) in issues.iter().enumerate() {
        let num = i + 1;
        println!(
            "  {}  {} {}",
            format!("{num}.").bold(),
            issue.summary,
            format!("[{}]", issue.category).dimmed()
        );
        if let Some(detail) = &issue.detail {
            for line in detail.lines() {
                println!("      {}", line.dimmed());
            }
        }
        if let Some(fix) = &issue.fix {
            println!("      {} {}", "Fix:".cyan(), fix);
        }
        println!();
    }
}

fn check_tools(runner: &dyn Runner, issues: &mut Vec<Issue>) {
    ui::section("External Tools");

    for (tool, purpose, hint) in tools() {
        if runner.exists(tool) {
            println!("  {} {} - {}", "✓".green(), tool, purpose.dimmed());
        } else {
            println!("  {} {} - {} {}", "✗".red(), tool, purpose, "(missing)".red());
            issues.push(Issue {
                category: "External Tools",
                summary: format!("{tool} is not installed"),
                detail: Some(format!("Needed for: {purpose}")),
                fix: Some(hint.to_string()),
            });
        }
    }
}

fn check_tasks(runner: &dyn Runner, registry: &TaskRegistry, issues: &mut Vec<Issue>) {
    ui::section("Tasks");

    for name in registry.names() {
        let Some(factory) = registry.get(name) else {
            continue;
        };
        let info = factory(runner).info();
        if runner.exists(info.tool) {
            println!("  {} {} - {}", "✓".green(), info.name, info.description.dimmed());
        } else {
            println!(
                "  {} {} - {} {}",
                "○".dimmed(),
                info.name,
                info.description,
                format!("({} not found)", info.tool).dimmed()
            );
            issues.push(Issue {
                category: "Tasks",
                summary: format!("{} is not on PATH", info.tool),
                detail: Some(format!("Task `{}` fails while it is missing", info.name)),
                fix: None,
            });
        }
    }
}

fn check_locations(paths: &Paths) {
    ui::section("Locations");
    ui::kv("Config dir", &paths.config_dir.display().to_string());
    ui::kv("Cache dir", &paths.cache_dir.display().to_string());
    ui::kv("Ledger", &paths.state_file().display().to_string());
    ui::kv("Home", &paths.home.display().to_string());
}

fn check_config(paths: &Paths, issues: &mut Vec<Issue>) {
    ui::section("Configuration");

    match ConfigSource::locate(paths) {
        Ok(source) => {
            println!("  {} {}", "✓".green(), source);
            if matches!(source, ConfigSource::Encrypted(_)) {
                let cached = paths.cached_config().exists();
                println!(
                    "  {} decrypted cache {}",
                    "ℹ".blue(),
                    if cached { "present" } else { "empty" }.dimmed()
                );
            }
        }
        Err(e) => {
            println!("  {} {}", "✗".red(), e);
            issues.push(Issue {
                category: "Configuration",
                summary: "No desired-state document".into(),
                detail: Some(e.to_string()),
                fix: Some(format!("Create {}", paths.config_file().display())),
            });
        }
    }

    match config::load_hints(paths) {
        Ok(hints) if hints.key_file.is_some() || hints.bitwarden_item.is_some() => {
            println!("  {} {} - {}", "✓".green(), crate::paths::HINTS_FILE, "Key source hints".dimmed());
        }
        Ok(_) => {}
        Err(e) => {
            println!("  {} {} {}", "⚠".yellow(), crate::paths::HINTS_FILE, "(invalid)".yellow());
            issues.push(Issue {
                category: "Configuration",
                summary: format!("{} cannot be read", crate::paths::HINTS_FILE),
                detail: Some(format!("{e:#}")),
                fix: None,
            });
        }
    }
}

fn check_ledger(paths: &Paths, issues: &mut Vec<Issue>) {
    ui::section("Ledger");

    let path = paths.state_file();
    if !path.exists() {
        println!("  {} {}", "○".dimmed(), "No ledger yet, created by the first apply".dimmed());
        return;
    }

    let parsed = std::fs::read_to_string(&path)
        .map_err(anyhow::Error::from)
        .and_then(|content| Ledger::parse(&content).map_err(anyhow::Error::from));
    match parsed {
        Ok(ledger) => {
            let tasks: usize = ledger.tasks.values().map(|t| t.items.len()).sum();
            println!(
                "  {} version {} - {}",
                "✓".green(),
                ledger.version,
                format!(
                    "{} dotfiles, {} variables, {} encrypted files, {} task items",
                    ledger.dotfiles.len(),
                    ledger.environment.user.len() + ledger.environment.machine.len(),
                    ledger.encrypted_files.len(),
                    tasks
                )
                .dimmed()
            );
        }
        Err(e) => {
            println!("  {} {}", "✗".red(), e);
            let hint = crate::error::hint_for(&e);
            issues.push(Issue {
                category: "Ledger",
                summary: "The ledger does not load cleanly".into(),
                detail: Some(format!("{e:#}")),
                fix: hint,
            });
        }
    }
}
