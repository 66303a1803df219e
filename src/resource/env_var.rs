//! Environment variable reconciler
//!
//! Only variables named in the configuration or recorded in the ledger are
//! ever touched. A configured variable whose live value already matches is
//! adopted into the ledger without a write.

use anyhow::Result;
use declarative::{Category, ElevationProvider, Plan};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::env_store::EnvStore;
use crate::schema::{Scope, Scoped};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVarItem {
    pub scope: Scope,
    pub name: String,
    /// Configured value; `None` for removals
    pub value: Option<String>,
    /// Live value at diff time
    pub current: Option<String>,
}

impl fmt::Display for EnvVarItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.scope, self.name)?;
        match (&self.current, &self.value) {
            (Some(old), Some(new)) if old != new => write!(f, ": {old} → {new}"),
            (_, Some(new)) => write!(f, " = {new}"),
            (Some(old), None) => write!(f, " (was {old})"),
            (None, None) => Ok(()),
        }
    }
}

/// Compare configured variables with the live environment and the ledger
pub fn diff(
    desired: &Scoped<BTreeMap<String, String>>,
    ledger: &Scoped<BTreeSet<String>>,
    store: &dyn EnvStore,
) -> Result<Plan<EnvVarItem>> {
    let mut plan = Plan::new();

    for scope in Scope::ALL {
        let configured = desired.get(scope);
        let tracked = ledger.get(scope);

        for (name, value) in configured {
            let current = store.get(scope, name)?;
            let category = match current.as_deref() {
                None => Some(Category::Add),
                Some(live) if live != value => Some(Category::Update),
                Some(_) if !tracked.contains(name) => Some(Category::Track),
                Some(_) => None,
            };
            if let Some(category) = category {
                plan.push(
                    category,
                    EnvVarItem {
                        scope,
                        name: name.clone(),
                        value: Some(value.clone()),
                        current,
                    },
                );
            }
        }

        for name in tracked.iter().filter(|n| !configured.contains_key(*n)) {
            let current = store.get(scope, name)?;
            plan.push(
                Category::Remove,
                EnvVarItem {
                    scope,
                    name: name.clone(),
                    value: None,
                    current,
                },
            );
        }
    }

    Ok(plan)
}

/// Whether applying the plan writes machine-scope variables
pub fn needs_elevation(plan: &Plan<EnvVarItem>) -> bool {
    plan.iter()
        .any(|(cat, item)| cat != Category::Track && item.scope == Scope::Machine)
}

/// Execute the plan and update the ledger
pub fn apply(
    plan: &Plan<EnvVarItem>,
    ledger: &mut Scoped<BTreeSet<String>>,
    store: &dyn EnvStore,
    elevation: Option<&dyn ElevationProvider>,
    dry_run: bool,
) -> Result<usize> {
    if dry_run {
        return Ok(plan.len());
    }

    let mut wrote = false;
    for (category, item) in plan.iter() {
        match (category, &item.value) {
            (Category::Add | Category::Update, Some(value)) => {
                store.set(item.scope, &item.name, value, elevation)?;
                wrote = true;
                ledger.get_mut(item.scope).insert(item.name.clone());
            }
            (Category::Track, _) => {
                ledger.get_mut(item.scope).insert(item.name.clone());
            }
            (Category::Remove, _) => {
                if item.current.is_some() {
                    store.remove(item.scope, &item.name, elevation)?;
                    wrote = true;
                }
                ledger.get_mut(item.scope).remove(&item.name);
            }
            (Category::Add | Category::Update, None) => {}
        }
    }

    if wrote {
        store.broadcast()?;
    }
    Ok(plan.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::env_store::fake::MemoryEnvStore;

    fn desired(scope: Scope, pairs: &[(&str, &str)]) -> Scoped<BTreeMap<String, String>> {
        let mut desired = Scoped::<BTreeMap<String, String>>::default();
        for (k, v) in pairs {
            desired.get_mut(scope).insert((*k).to_string(), (*v).to_string());
        }
        desired
    }

    #[test]
    fn test_categories() {
        let store = MemoryEnvStore::default();
        store.insert(Scope::User, "EDITOR", "vim");
        store.insert(Scope::User, "PAGER", "less");
        store.insert(Scope::User, "OLD", "x");
        store.insert(Scope::User, "UNLISTED", "y");

        let want = desired(
            Scope::User,
            &[("EDITOR", "nvim"), ("PAGER", "less"), ("GOPATH", "C:\\go")],
        );
        let mut ledger = Scoped::<BTreeSet<String>>::default();
        ledger.user.insert("OLD".to_string());

        let plan = diff(&want, &ledger, &store).unwrap();
        assert_eq!(plan.items(Category::Add)[0].name, "GOPATH");
        assert_eq!(plan.items(Category::Update)[0].name, "EDITOR");
        assert_eq!(plan.items(Category::Track)[0].name, "PAGER");
        assert_eq!(plan.items(Category::Remove)[0].name, "OLD");
        assert!(plan.iter().all(|(_, i)| i.name != "UNLISTED"));
    }

    #[test]
    fn test_apply_then_converged() {
        let store = MemoryEnvStore::with(Scope::User, "OLD", "x");
        let want = desired(Scope::User, &[("EDITOR", "nvim")]);
        let mut ledger = Scoped::<BTreeSet<String>>::default();
        ledger.user.insert("OLD".to_string());

        let plan = diff(&want, &ledger, &store).unwrap();
        assert_eq!(apply(&plan, &mut ledger, &store, None, false).unwrap(), 2);
        assert_eq!(store.value(Scope::User, "EDITOR").as_deref(), Some("nvim"));
        assert_eq!(store.value(Scope::User, "OLD"), None);
        assert_eq!(store.broadcasts.get(), 1);
        assert!(ledger.user.contains("EDITOR"));
        assert!(!ledger.user.contains("OLD"));

        let again = diff(&want, &ledger, &store).unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let store = MemoryEnvStore::default();
        let want = desired(Scope::User, &[("EDITOR", "nvim")]);
        let mut ledger = Scoped::<BTreeSet<String>>::default();

        let plan = diff(&want, &ledger, &store).unwrap();
        assert_eq!(apply(&plan, &mut ledger, &store, None, true).unwrap(), 1);
        assert_eq!(store.writes.get(), 0);
        assert!(ledger.user.is_empty());
    }

    #[test]
    fn test_adoption_does_not_write() {
        let store = MemoryEnvStore::with(Scope::Machine, "JAVA_HOME", "C:\\jdk");
        let want = desired(Scope::Machine, &[("JAVA_HOME", "C:\\jdk")]);
        let mut ledger = Scoped::<BTreeSet<String>>::default();

        let plan = diff(&want, &ledger, &store).unwrap();
        assert!(!needs_elevation(&plan));
        apply(&plan, &mut ledger, &store, None, false).unwrap();
        assert_eq!(store.writes.get(), 0);
        assert_eq!(store.broadcasts.get(), 0);
        assert!(ledger.machine.contains("JAVA_HOME"));
    }

    #[test]
    fn test_machine_scope_needs_elevation() {
        let store = MemoryEnvStore::default();
        let want = desired(Scope::Machine, &[("JAVA_HOME", "C:\\jdk")]);
        let plan = diff(&want, &Scoped::default(), &store).unwrap();
        assert!(needs_elevation(&plan));
    }
}
