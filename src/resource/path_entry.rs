//! PATH reconciler
//!
//! Entries are stored in the registry form (`%VAR%` references) and compared
//! after expansion, case-insensitively, ignoring trailing separators and the
//! difference between `/` and `\`.

use anyhow::Result;
use declarative::{Category, ElevationProvider, Plan};
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use super::env_store::EnvStore;
use crate::schema::{PathConfig, Position, Scope, Scoped};
use crate::state::PathEntries;

/// Registry value holding the search path
pub const PATH_VAR: &str = "Path";

const SEPARATOR: char = ';';

static SHELL_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("shell variable pattern is valid")
});

static WINDOWS_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%([^%]+)%").expect("windows variable pattern is valid"));

/// Rewrite shell-style references into registry form
pub fn normalize(raw: &str) -> String {
    let raw = raw.trim();
    let converted = SHELL_VAR.replace_all(raw, |caps: &regex::Captures<'_>| {
        let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        format!("%{name}%")
    });

    match converted.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with(['/', '\\']) => {
            format!("%USERPROFILE%{rest}")
        }
        _ => converted.into_owned(),
    }
}

/// Expand `%VAR%` references; unknown variables are kept verbatim
pub fn expand(entry: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    WINDOWS_VAR
        .replace_all(entry, |caps: &regex::Captures<'_>| {
            lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Comparison key for an entry
pub fn compare_key(entry: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    expand(entry, lookup)
        .replace('/', "\\")
        .trim_end_matches('\\')
        .to_lowercase()
}

/// Lookup against the current process environment
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn split(value: &str) -> Vec<String> {
    value
        .split(SEPARATOR)
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathItem {
    pub scope: Scope,
    pub position: Position,
    /// Normalized entry
    pub entry: String,
}

impl fmt::Display for PathItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {}] {}", self.scope, self.position.as_str(), self.entry)
    }
}

/// Compare configured entries with the live PATH and the ledger
pub fn diff(
    desired: &Scoped<PathConfig>,
    ledger: &Scoped<PathEntries>,
    store: &dyn EnvStore,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<Plan<PathItem>> {
    let mut plan = Plan::new();

    for scope in Scope::ALL {
        let config = desired.get(scope);
        let tracked = ledger.get(scope);
        let live = store.get(scope, PATH_VAR)?.unwrap_or_default();
        let live_keys: HashSet<String> = split(&live).iter().map(|e| compare_key(e, lookup)).collect();

        let mut configured_keys = HashSet::new();
        for position in Position::ALL {
            let tracked_keys: HashSet<String> = tracked
                .get(position)
                .iter()
                .map(|e| compare_key(e, lookup))
                .collect();

            for raw in config.entries(position) {
                let entry = normalize(raw);
                let key = compare_key(&entry, lookup);
                if !configured_keys.insert(key.clone()) {
                    continue;
                }
                let item = PathItem {
                    scope,
                    position,
                    entry,
                };
                if !live_keys.contains(&key) {
                    plan.push(Category::Add, item);
                } else if !tracked_keys.contains(&key) {
                    plan.push(Category::Track, item);
                }
            }
        }

        for position in Position::ALL {
            for entry in tracked.get(position) {
                if !configured_keys.contains(&compare_key(entry, lookup)) {
                    plan.push(
                        Category::Remove,
                        PathItem {
                            scope,
                            position,
                            entry: entry.clone(),
                        },
                    );
                }
            }
        }
    }

    Ok(plan)
}

/// Build the new PATH list for one scope
pub fn rebuild(
    current: &[String],
    plan: &Plan<PathItem>,
    scope: Scope,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Vec<String> {
    let removals: HashSet<String> = plan
        .items(Category::Remove)
        .iter()
        .filter(|i| i.scope == scope)
        .map(|i| compare_key(&i.entry, lookup))
        .collect();

    let additions = |position: Position| {
        plan.items(Category::Add)
            .iter()
            .filter(move |i| i.scope == scope && i.position == position)
            .map(|i| i.entry.clone())
    };

    let mut rebuilt: Vec<String> = additions(Position::Prepend).collect();
    rebuilt.extend(
        current
            .iter()
            .filter(|e| !removals.contains(&compare_key(e, lookup)))
            .cloned(),
    );
    rebuilt.extend(additions(Position::Append));
    rebuilt
}

/// Whether applying the plan writes the machine PATH
pub fn needs_elevation(plan: &Plan<PathItem>) -> bool {
    plan.iter()
        .any(|(cat, item)| cat != Category::Track && item.scope == Scope::Machine)
}

/// Execute the plan and update the ledger
pub fn apply(
    plan: &Plan<PathItem>,
    ledger: &mut Scoped<PathEntries>,
    store: &dyn EnvStore,
    elevation: Option<&dyn ElevationProvider>,
    lookup: &dyn Fn(&str) -> Option<String>,
    dry_run: bool,
) -> Result<usize> {
    if dry_run {
        return Ok(plan.len());
    }

    let mut wrote = false;
    for scope in Scope::ALL {
        let touches_scope = plan
            .iter()
            .any(|(cat, item)| cat != Category::Track && item.scope == scope);
        if !touches_scope {
            continue;
        }

        let current = split(&store.get(scope, PATH_VAR)?.unwrap_or_default());
        let rebuilt = rebuild(&current, plan, scope, lookup);
        if rebuilt != current {
            let value = rebuilt.join(";");
            store.set(scope, PATH_VAR, &value, elevation)?;
            wrote = true;
        }
    }

    for (category, item) in plan.iter() {
        let entries = ledger.get_mut(item.scope).get_mut(item.position);
        match category {
            Category::Add | Category::Update | Category::Track => {
                entries.insert(item.entry.clone());
            }
            Category::Remove => {
                entries.remove(&item.entry);
            }
        }
    }

    if wrote {
        store.broadcast()?;
    }
    Ok(plan.len())
}
