use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use sf_core::ScenarioError;

pub const REGISTRY_DUPLICATE: &str = "REGISTRY_DUPLICATE";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterOptions {
    /// Replace an existing entry instead of rejecting the registration.
    pub overwrite: bool,
    /// Log each registration.
    pub verbose: bool,
}

impl RegisterOptions {
    pub fn overwrite() -> Self {
        Self {
            overwrite: true,
            verbose: false,
        }
    }
}

/// Name-keyed handler table shared across sessions.
pub(crate) struct Registry<T: ?Sized> {
    label: &'static str,
    entries: RwLock<HashMap<String, Arc<T>>>,
}

impl<T: ?Sized> Registry<T> {
    pub(crate) fn new(label: &'static str) -> Self {
        Self {
            label,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn register(
        &self,
        name: &str,
        entry: Arc<T>,
        options: RegisterOptions,
    ) -> Result<(), ScenarioError> {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let replaced = entries.contains_key(name);
        if replaced && !options.overwrite {
            return Err(ScenarioError::evaluation(
                REGISTRY_DUPLICATE,
                format!(
                    "{} \"{}\" is already registered; pass overwrite to replace it.",
                    self.label, name
                ),
            ));
        }
        entries.insert(name.to_string(), entry);
        if options.verbose {
            tracing::info!(kind = self.label, name, replaced, "registered");
        } else {
            tracing::debug!(kind = self.label, name, replaced, "registered");
        }
        Ok(())
    }

    pub(crate) fn get(&self, name: &str) -> Option<Arc<T>> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
