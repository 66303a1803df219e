//! Task plugins
//!
//! A task manages a set of named items through some external tool. Tasks are
//! registered at compile time; each run creates a fresh instance, uses it,
//! calls `cleanup` and drops it before the next task starts. Item sets are
//! recorded in the ledger under the task name.

use anyhow::Result;
use declarative::{Category, Plan};
use std::collections::BTreeSet;

use crate::error::KeelError;
use crate::runner::Runner;
use crate::schema::TaskConfig;
use crate::state::Ledger;

pub mod gh_extensions;
pub mod vscode_extensions;

/// Static description of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskInfo {
    pub name: &'static str,
    pub description: &'static str,
    /// External command the task drives
    pub tool: &'static str,
}

/// Result of comparing a task's configuration with the live system
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskStatus {
    pub to_install: Vec<String>,
    pub to_remove: Vec<String>,
    pub up_to_date: Vec<String>,
}

/// Items changed by an apply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOutcome {
    pub installed: Vec<String>,
    pub removed: Vec<String>,
}

impl TaskOutcome {
    pub fn changes(&self) -> usize {
        self.installed.len() + self.removed.len()
    }
}

pub trait Task {
    fn info(&self) -> TaskInfo;

    /// Compare `config` with the live system; `items` are the ones keel manages
    fn status(&mut self, config: &toml::Value, items: &BTreeSet<String>) -> Result<TaskStatus>;

    /// Converge the live system; with `dry_run` only report what would change
    fn apply(
        &mut self,
        config: &toml::Value,
        items: &BTreeSet<String>,
        dry_run: bool,
    ) -> Result<TaskOutcome>;

    /// Undo a partially applied change
    fn rollback(&mut self) -> Result<()> {
        Ok(())
    }

    fn cleanup(&mut self) {}
}

/// Builds a task instance over a runner
pub type TaskFactory = for<'a> fn(&'a dyn Runner) -> Box<dyn Task + 'a>;

/// Compile-time table of known tasks
pub struct TaskRegistry {
    entries: Vec<(&'static str, TaskFactory)>,
}

fn make_vscode_extensions(runner: &dyn Runner) -> Box<dyn Task + '_> {
    Box::new(vscode_extensions::VsCodeExtensions::new(runner))
}

fn make_gh_extensions(runner: &dyn Runner) -> Box<dyn Task + '_> {
    Box::new(gh_extensions::GhExtensions::new(runner))
}

impl TaskRegistry {
    /// Registry with every built-in task
    pub fn builtin() -> Self {
        Self {
            entries: vec![
                (vscode_extensions::NAME, make_vscode_extensions as TaskFactory),
                (gh_extensions::NAME, make_gh_extensions as TaskFactory),
            ],
        }
    }

    /// Empty registry, filled with [`TaskRegistry::register`]
    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn register(&mut self, name: &'static str, factory: TaskFactory) {
        self.entries.retain(|(n, _)| *n != name);
        self.entries.push((name, factory));
    }

    pub fn get(&self, name: &str) -> Option<TaskFactory> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, factory)| *factory)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(name, _)| *name)
    }
}

/// Read a list of strings from `config[key]`; a missing key is an empty list
pub fn string_list(config: &toml::Value, key: &str) -> Result<Vec<String>> {
    let Some(value) = config.get(key) else {
        return Ok(Vec::new());
    };
    let Some(array) = value.as_array() else {
        anyhow::bail!("`{key}` must be a list of strings");
    };
    array
        .iter()
        .map(|v| {
            v.as_str()
                .map(|s| s.trim().to_string())
                .ok_or_else(|| anyhow::anyhow!("`{key}` must be a list of strings"))
        })
        .collect()
}

/// Fold a status into the shared plan shape; unrecorded up-to-date items are adopted
pub fn status_plan(status: &TaskStatus, items: &BTreeSet<String>) -> Plan<String> {
    let mut plan = Plan::new();
    for item in &status.to_install {
        plan.push(Category::Add, item.clone());
    }
    for item in status.up_to_date.iter().filter(|i| !items.contains(*i)) {
        plan.push(Category::Track, item.clone());
    }
    for item in &status.to_remove {
        plan.push(Category::Remove, item.clone());
    }
    plan
}

fn run_one(
    task: &mut dyn Task,
    config: &TaskConfig,
    items: &BTreeSet<String>,
    dry_run: bool,
) -> Result<(TaskStatus, TaskOutcome)> {
    let status = task.status(&config.config, items)?;
    let outcome = task.apply(&config.config, items, dry_run)?;
    Ok((status, outcome))
}

/// Run every configured task in order
///
/// An unknown task is skipped with a warning. A failing task is rolled back
/// and the remaining tasks still run; the call then fails naming every
/// failed task.
pub fn run_all(
    configs: &[TaskConfig],
    ledger: &mut Ledger,
    registry: &TaskRegistry,
    runner: &dyn Runner,
    dry_run: bool,
    quiet: bool,
) -> Result<usize> {
    let mut changes = 0;
    let mut failed = Vec::new();

    for config in configs {
        let Some(factory) = registry.get(&config.name) else {
            log::warn!("Unknown task {}", config.name);
            crate::ui::warn(&format!("Unknown task `{}`, skipped", config.name));
            continue;
        };

        let mut task = factory(runner);
        let items = ledger.task_items(&config.name);

        match run_one(task.as_mut(), config, &items, dry_run) {
            Ok((status, outcome)) => {
                let plan = status_plan(&status, &items);
                if !quiet {
                    crate::resource::print_plan(task.info().description, &plan);
                }
                changes += outcome.changes() + plan.items(Category::Track).len();

                if !dry_run {
                    let recorded: BTreeSet<String> = outcome
                        .installed
                        .iter()
                        .chain(&status.up_to_date)
                        .cloned()
                        .collect();
                    for item in items
                        .iter()
                        .filter(|i| !recorded.contains(*i) && !outcome.removed.contains(*i))
                    {
                        log::debug!("Dropping {item} from {}, gone outside keel", config.name);
                    }
                    ledger.set_task_items(&config.name, recorded);
                }
            }
            Err(e) => {
                log::warn!("Task {} failed: {e:#}", config.name);
                crate::ui::warn(&format!("Task `{}` failed: {e:#}", config.name));
                if let Err(rollback) = task.rollback() {
                    log::warn!("Rollback of {} failed: {rollback:#}", config.name);
                }
                failed.push(config.name.clone());
            }
        }

        task.cleanup();
    }

    if !failed.is_empty() {
        return Err(KeelError::command("tasks", failed.join(", ")).into());
    }
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::fake::FakeRunner;
    use std::cell::RefCell;

    thread_local! {
        static EVENTS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    }

    fn record(event: String) {
        EVENTS.with(|e| e.borrow_mut().push(event));
    }

    fn take_events() -> Vec<String> {
        EVENTS.with(|e| std::mem::take(&mut *e.borrow_mut()))
    }

    /// Wants `config.items`, reports `config.live` as installed, fails on `config.fail`
    struct ScriptedTask;

    impl Task for ScriptedTask {
        fn info(&self) -> TaskInfo {
            TaskInfo {
                name: "scripted",
                description: "scripted",
                tool: "none",
            }
        }

        fn status(&mut self, config: &toml::Value, items: &BTreeSet<String>) -> Result<TaskStatus> {
            let wanted = string_list(config, "items")?;
            let live = string_list(config, "live")?;
            Ok(TaskStatus {
                to_install: wanted.iter().filter(|w| !live.contains(w)).cloned().collect(),
                to_remove: items
                    .iter()
                    .filter(|i| !wanted.contains(i) && live.contains(i))
                    .cloned()
                    .collect(),
                up_to_date: wanted.iter().filter(|w| live.contains(w)).cloned().collect(),
            })
        }

        fn apply(
            &mut self,
            config: &toml::Value,
            items: &BTreeSet<String>,
            _dry_run: bool,
        ) -> Result<TaskOutcome> {
            if config.get("fail").is_some() {
                anyhow::bail!("scripted failure");
            }
            let status = self.status(config, items)?;
            Ok(TaskOutcome {
                installed: status.to_install,
                removed: status.to_remove,
            })
        }

        fn rollback(&mut self) -> Result<()> {
            record("rollback".to_string());
            Ok(())
        }

        fn cleanup(&mut self) {
            record("cleanup".to_string());
        }
    }

    fn make_scripted(_runner: &dyn Runner) -> Box<dyn Task + '_> {
        Box::new(ScriptedTask)
    }

    fn task(name: &str, toml_src: &str) -> TaskConfig {
        TaskConfig {
            name: name.to_string(),
            config: toml::Value::Table(toml::from_str(toml_src).unwrap()),
        }
    }

    fn registry() -> TaskRegistry {
        let mut registry = TaskRegistry::empty();
        registry.register("scripted", make_scripted);
        registry.register("broken", make_scripted);
        registry
    }

    #[test]
    fn test_builtin_registry() {
        let registry = TaskRegistry::builtin();
        assert!(registry.get("vscode_extensions").is_some());
        assert!(registry.get("gh_extensions").is_some());
        assert!(registry.get("brew").is_none());
        assert_eq!(registry.names().count(), 2);
    }

    #[test]
    fn test_string_list() {
        let config: toml::Value = toml::from_str::<toml::Table>("extensions = [\"a\", \" b \"]")
            .map(toml::Value::Table)
            .unwrap();
        assert_eq!(string_list(&config, "extensions").unwrap(), vec!["a", "b"]);
        assert!(string_list(&config, "missing").unwrap().is_empty());

        let bad: toml::Value = toml::from_str::<toml::Table>("extensions = \"a\"")
            .map(toml::Value::Table)
            .unwrap();
        assert!(string_list(&bad, "extensions").is_err());
    }

    #[test]
    fn test_ledger_records_installed_and_adopted() {
        take_events();
        let mut ledger = Ledger::default();
        ledger.set_task_items("scripted", ["gone".to_string()].into());
        let configs = [task("scripted", "items = [\"a\", \"b\"]\nlive = [\"b\", \"gone\"]")];

        let changes = run_all(&configs, &mut ledger, &registry(), &FakeRunner::default(), false, true)
            .unwrap();
        assert_eq!(changes, 3);
        assert_eq!(
            ledger.task_items("scripted"),
            ["a".to_string(), "b".to_string()].into()
        );
        assert_eq!(take_events(), vec!["cleanup"]);
    }

    #[test]
    fn test_items_gone_outside_keel_leave_the_ledger() {
        let mut ledger = Ledger::default();
        ledger.set_task_items("scripted", ["a".to_string(), "uninstalled-by-hand".to_string()].into());
        let configs = [task("scripted", "items = [\"a\"]\nlive = [\"a\"]")];

        let changes = run_all(&configs, &mut ledger, &registry(), &FakeRunner::default(), false, true)
            .unwrap();
        assert_eq!(changes, 0);
        assert_eq!(ledger.task_items("scripted"), ["a".to_string()].into());
    }

    #[test]
    fn test_failure_rolls_back_and_continues() {
        take_events();
        let mut ledger = Ledger::default();
        let configs = [
            task("broken", "fail = true"),
            task("nonexistent", ""),
            task("scripted", "items = [\"a\"]"),
        ];

        let err = run_all(&configs, &mut ledger, &registry(), &FakeRunner::default(), false, true)
            .unwrap_err();
        assert!(err.to_string().contains("broken"));
        assert_eq!(take_events(), vec!["rollback", "cleanup", "cleanup"]);
        assert_eq!(ledger.task_items("scripted"), ["a".to_string()].into());
        assert!(ledger.task_items("broken").is_empty());
    }

    #[test]
    fn test_dry_run_keeps_ledger() {
        let mut ledger = Ledger::default();
        let configs = [task("scripted", "items = [\"a\"]")];
        let changes = run_all(&configs, &mut ledger, &registry(), &FakeRunner::default(), true, true)
            .unwrap();
        assert_eq!(changes, 1);
        assert!(ledger.tasks.is_empty());
    }
}
