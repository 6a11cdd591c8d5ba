//! Shell-session state: variables, arrays, functions, options, traps.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::Command;

/// Behavior toggles set via `set -e` / `set -u` / `set -o pipefail`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ShellOptions {
    pub errexit: bool,
    pub nounset: bool,
    pub pipefail: bool,
}

/// One saved binding for `local`: the variable's previous value (`None`
/// when it was unset), restored when the function returns.
pub type LocalScope = Vec<(String, Option<String>)>;

/// Everything a shell session carries across commands.
#[derive(Clone, Default)]
pub struct ShellState {
    pub env: IndexMap<String, String>,
    pub exported: HashSet<String>,
    pub arrays: HashMap<String, Vec<String>>,
    pub assoc: HashMap<String, IndexMap<String, String>>,
    pub funcs: HashMap<String, Rc<Command>>,
    pub positional: Vec<String>,
    pub arg0: String,
    pub last_status: i32,
    pub last_bg_pid: Option<u32>,
    pub options: ShellOptions,
    pub traps: HashMap<String, String>,
    pub history: Vec<String>,
    pub local_scopes: Vec<LocalScope>,
}

impl ShellState {
    pub fn new() -> Self {
        Self {
            arg0: "sh".to_string(),
            ..Self::default()
        }
    }

    pub fn get_var(&self, name: &str) -> Option<&str> {
        self.env.get(name).map(String::as_str)
    }

    pub fn set_var(&mut self, name: &str, value: impl Into<String>) {
        self.env.insert(name.to_string(), value.into());
    }

    /// Sets a variable and records its previous value in the innermost
    /// `local` scope, if one is being built.
    pub fn set_local(&mut self, name: &str, value: impl Into<String>) {
        if let Some(scope) = self.local_scopes.last_mut() {
            if !scope.iter().any(|(saved, _)| saved == name) {
                let previous = self.env.get(name).cloned();
                scope.push((name.to_string(), previous));
            }
        }
        self.env.insert(name.to_string(), value.into());
    }

    pub fn unset_var(&mut self, name: &str) {
        self.env.shift_remove(name);
        self.exported.remove(name);
        self.arrays.remove(name);
        self.assoc.remove(name);
    }

    pub fn export(&mut self, name: &str) {
        self.exported.insert(name.to_string());
    }

    /// The environment a child process sees: exported variables only.
    pub fn exported_env(&self) -> Vec<(String, String)> {
        self.env
            .iter()
            .filter(|(name, _)| self.exported.contains(*name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    pub fn pwd(&self) -> String {
        self.get_var("PWD").unwrap_or("/").to_string()
    }

    pub fn ifs(&self) -> String {
        self.get_var("IFS").unwrap_or(" \t\n").to_string()
    }

    pub fn push_local_scope(&mut self) {
        self.local_scopes.push(Vec::new());
    }

    pub fn pop_local_scope(&mut self) {
        if let Some(scope) = self.local_scopes.pop() {
            for (name, previous) in scope.into_iter().rev() {
                match previous {
                    Some(value) => {
                        self.env.insert(name, value);
                    }
                    None => {
                        self.env.shift_remove(&name);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exported_env_filters_unexported_vars() {
        let mut state = ShellState::new();
        state.set_var("VISIBLE", "1");
        state.set_var("HIDDEN", "2");
        state.export("VISIBLE");
        let env = state.exported_env();
        assert_eq!(env, vec![("VISIBLE".to_string(), "1".to_string())]);
    }

    #[test]
    fn local_scopes_restore_previous_values() {
        let mut state = ShellState::new();
        state.set_var("X", "outer");
        state.push_local_scope();
        state.set_local("X", "inner");
        state.set_local("Y", "only-inner");
        assert_eq!(state.get_var("X"), Some("inner"));
        state.pop_local_scope();
        assert_eq!(state.get_var("X"), Some("outer"));
        assert_eq!(state.get_var("Y"), None);
    }

    #[test]
    fn unset_removes_every_binding_kind() {
        let mut state = ShellState::new();
        state.set_var("V", "x");
        state.export("V");
        state.arrays.insert("V".to_string(), vec!["a".to_string()]);
        state.unset_var("V");
        assert_eq!(state.get_var("V"), None);
        assert!(!state.exported.contains("V"));
        assert!(!state.arrays.contains_key("V"));
    }
}
