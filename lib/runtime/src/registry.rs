//! The in-process tool registry.
//!
//! Native tools register directly. WASM modules arrive through
//! `install` as raw bytes and only become runnable once a
//! [`ModuleLoader`] (the host platform adapter) is attached; without one
//! they are listed but fail lookup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use wasmbox_wasi::{Tool, ToolRegistry};

/// The host platform adapter contract: turns a registered module's
/// bytes into a runnable [`Tool`] (instantiate + bridge WASI imports).
pub trait ModuleLoader: Send + Sync {
    fn load(&self, name: &str, module_bytes: &[u8]) -> Result<Arc<dyn Tool>, String>;
}

/// Size cap for installed modules; the package collaborator enforces
/// its own host allowlist before bytes ever reach us.
pub const MODULE_SIZE_CAP: usize = 64 * 1024 * 1024;

#[derive(Default)]
struct RegistryState {
    native: HashMap<String, Arc<dyn Tool>>,
    modules: HashMap<String, Vec<u8>>,
}

#[derive(Default)]
pub struct InMemoryRegistry {
    state: Mutex<RegistryState>,
    loader: Mutex<Option<Arc<dyn ModuleLoader>>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a native tool under `name`.
    pub fn register(&self, name: &str, tool: Arc<dyn Tool>) {
        self.state
            .lock()
            .unwrap()
            .native
            .insert(name.to_string(), tool);
    }

    /// Attaches the engine adapter that makes installed modules
    /// runnable.
    pub fn set_module_loader(&self, loader: Arc<dyn ModuleLoader>) {
        *self.loader.lock().unwrap() = Some(loader);
    }
}

impl ToolRegistry for InMemoryRegistry {
    fn lookup(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let state = self.state.lock().unwrap();
        if let Some(tool) = state.native.get(name) {
            return Some(tool.clone());
        }
        let bytes = state.modules.get(name)?;
        let loader = self.loader.lock().unwrap().clone()?;
        loader.load(name, bytes).ok()
    }

    fn list(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut names: Vec<String> = state
            .native
            .keys()
            .chain(state.modules.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }

    fn install(&self, name: &str, module_bytes: Vec<u8>, source_url: &str) -> Result<(), String> {
        if module_bytes.len() > MODULE_SIZE_CAP {
            return Err(format!("{name}: module exceeds size cap"));
        }
        tracing::debug!(name, source_url, bytes = module_bytes.len(), "install module");
        self.state
            .lock()
            .unwrap()
            .modules
            .insert(name.to_string(), module_bytes);
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        if state.native.remove(name).is_some() || state.modules.remove(name).is_some() {
            Ok(())
        } else {
            Err(format!("{name}: not installed"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modules_without_a_loader_are_listed_but_not_runnable() {
        let registry = InMemoryRegistry::new();
        registry
            .install("mytool", vec![0, 0x61, 0x73, 0x6d], "https://tools.example/mytool.wasm")
            .unwrap();
        assert!(registry.list().contains(&"mytool".to_string()));
        assert!(registry.lookup("mytool").is_none());
    }

    #[test]
    fn remove_unknown_tool_errors() {
        let registry = InMemoryRegistry::new();
        assert!(registry.remove("ghost").is_err());
    }

    #[test]
    fn size_cap_is_enforced() {
        let registry = InMemoryRegistry::new();
        let oversized = vec![0u8; MODULE_SIZE_CAP + 1];
        assert!(registry.install("big", oversized, "https://x").is_err());
    }
}
