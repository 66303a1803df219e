//! Persistent environment variables
//!
//! Values live in the registry and are read without expansion so `%VAR%`
//! references survive a round trip. Machine-scope writes go through an
//! [`ElevationProvider`].

use anyhow::{Result, bail};
use declarative::ElevationProvider;

use crate::error::KeelError;
use crate::runner::Runner;
use crate::schema::Scope;

pub const POWERSHELL: &str = "powershell";

pub const POWERSHELL_HINT: &str = "Windows PowerShell is required to read and write the environment";

pub trait EnvStore {
    /// Fail with a prerequisite error unless the store can be probed
    fn ensure_available(&self) -> Result<()>;

    /// Raw (unexpanded) value of a variable
    fn get(&self, scope: Scope, name: &str) -> Result<Option<String>>;

    /// Write a variable; machine scope requires `elevation`
    fn set(
        &self,
        scope: Scope,
        name: &str,
        value: &str,
        elevation: Option<&dyn ElevationProvider>,
    ) -> Result<()>;

    /// Delete a variable; machine scope requires `elevation`
    fn remove(&self, scope: Scope, name: &str, elevation: Option<&dyn ElevationProvider>)
    -> Result<()>;

    /// Notify running processes that the environment changed
    fn broadcast(&self) -> Result<()>;
}

fn registry_key(scope: Scope) -> &'static str {
    match scope {
        Scope::User => r"HKCU:\Environment",
        Scope::Machine => r"HKLM:\SYSTEM\CurrentControlSet\Control\Session Manager\Environment",
    }
}

/// Quote a string for a single-quoted PowerShell literal
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn get_script(scope: Scope, name: &str) -> String {
    format!(
        "$v = (Get-Item -LiteralPath {key}).GetValue({name}, $null, 'DoNotExpandEnvironmentNames'); \
         if ($null -eq $v) {{ [Console]::Out.Write('0') }} else {{ [Console]::Out.Write('1' + $v) }}",
        key = quote(registry_key(scope)),
        name = quote(name),
    )
}

fn set_script(scope: Scope, name: &str, value: &str) -> String {
    let kind = if value.contains('%') { "ExpandString" } else { "String" };
    format!(
        "New-ItemProperty -LiteralPath {key} -Name {name} -Value {value} -PropertyType {kind} -Force | Out-Null",
        key = quote(registry_key(scope)),
        name = quote(name),
        value = quote(value),
    )
}

fn remove_script(scope: Scope, name: &str) -> String {
    format!(
        "Remove-ItemProperty -LiteralPath {key} -Name {name} -ErrorAction SilentlyContinue",
        key = quote(registry_key(scope)),
        name = quote(name),
    )
}

/// Broadcasts WM_SETTINGCHANGE as a side effect of a .NET environment write
const BROADCAST_SCRIPT: &str = "[Environment]::SetEnvironmentVariable('KEEL_REFRESH', $null, 'User')";

fn parse_get_output(stdout: &str) -> Option<String> {
    stdout.strip_prefix('1').map(ToString::to_string)
}

/// Environment store driven through PowerShell
pub struct PowerShellEnvStore<'a> {
    runner: &'a dyn Runner,
}

impl<'a> PowerShellEnvStore<'a> {
    pub fn new(runner: &'a dyn Runner) -> Self {
        Self { runner }
    }

    fn args(script: &str) -> [&str; 4] {
        ["-NoProfile", "-NonInteractive", "-Command", script]
    }

    fn write(
        &self,
        scope: Scope,
        script: &str,
        elevation: Option<&dyn ElevationProvider>,
    ) -> Result<()> {
        let output = match (scope, elevation) {
            (Scope::User, _) => self.runner.run(POWERSHELL, &Self::args(script))?,
            (Scope::Machine, Some(elevated)) => {
                elevated.run_elevated(POWERSHELL, &Self::args(script))?
            }
            (Scope::Machine, None) => bail!("machine-scope environment writes require elevation"),
        };
        if !output.success {
            return Err(KeelError::command(
                format!("{POWERSHELL} ({scope} environment)"),
                output.stderr_str().trim(),
            )
            .into());
        }
        Ok(())
    }
}

impl EnvStore for PowerShellEnvStore<'_> {
    fn ensure_available(&self) -> Result<()> {
        self.runner.require(POWERSHELL, POWERSHELL_HINT)
    }

    fn get(&self, scope: Scope, name: &str) -> Result<Option<String>> {
        let script = get_script(scope, name);
        let stdout = self.runner.run_capture(POWERSHELL, &Self::args(&script))?;
        Ok(parse_get_output(&stdout))
    }

    fn set(
        &self,
        scope: Scope,
        name: &str,
        value: &str,
        elevation: Option<&dyn ElevationProvider>,
    ) -> Result<()> {
        log::debug!("Setting {scope} environment variable {name}");
        self.write(scope, &set_script(scope, name, value), elevation)
    }

    fn remove(
        &self,
        scope: Scope,
        name: &str,
        elevation: Option<&dyn ElevationProvider>,
    ) -> Result<()> {
        log::debug!("Removing {scope} environment variable {name}");
        self.write(scope, &remove_script(scope, name), elevation)
    }

    fn broadcast(&self) -> Result<()> {
        self.runner
            .run_capture(POWERSHELL, &Self::args(BROADCAST_SCRIPT))?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory environment

    use super::*;
    use crate::schema::Scoped;
    use std::cell::{Cell, RefCell};
    use std::collections::BTreeMap;

    #[derive(Default)]
    pub struct MemoryEnvStore {
        pub vars: RefCell<Scoped<BTreeMap<String, String>>>,
        pub writes: Cell<usize>,
        pub broadcasts: Cell<usize>,
    }

    impl MemoryEnvStore {
        pub fn with(scope: Scope, name: &str, value: &str) -> Self {
            let store = Self::default();
            store.insert(scope, name, value);
            store
        }

        pub fn insert(&self, scope: Scope, name: &str, value: &str) {
            self.vars
                .borrow_mut()
                .get_mut(scope)
                .insert(name.to_string(), value.to_string());
        }

        pub fn value(&self, scope: Scope, name: &str) -> Option<String> {
            self.vars.borrow().get(scope).get(name).cloned()
        }

        fn check_elevation(scope: Scope, elevation: Option<&dyn ElevationProvider>) -> Result<()> {
            if scope == Scope::Machine && elevation.is_none() {
                bail!("machine-scope environment writes require elevation");
            }
            Ok(())
        }
    }

    impl EnvStore for MemoryEnvStore {
        fn ensure_available(&self) -> Result<()> {
            Ok(())
        }

        fn get(&self, scope: Scope, name: &str) -> Result<Option<String>> {
            Ok(self.value(scope, name))
        }

        fn set(
            &self,
            scope: Scope,
            name: &str,
            value: &str,
            elevation: Option<&dyn ElevationProvider>,
        ) -> Result<()> {
            Self::check_elevation(scope, elevation)?;
            self.writes.set(self.writes.get() + 1);
            self.insert(scope, name, value);
            Ok(())
        }

        fn remove(
            &self,
            scope: Scope,
            name: &str,
            elevation: Option<&dyn ElevationProvider>,
        ) -> Result<()> {
            Self::check_elevation(scope, elevation)?;
            self.writes.set(self.writes.get() + 1);
            self.vars.borrow_mut().get_mut(scope).remove(name);
            Ok(())
        }

        fn broadcast(&self) -> Result<()> {
            self.broadcasts.set(self.broadcasts.get() + 1);
            Ok(())
        }
    }
}
