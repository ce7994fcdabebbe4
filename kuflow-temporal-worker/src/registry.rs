//! Workflow and activity types served by a worker.

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use std::collections::BTreeSet;

/// The set of workflow and activity types a worker registers, built once
/// at setup. Every registered type is served through the encryption
/// converter and interceptors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerRegistry {
    workflow_types: BTreeSet<String>,
    activity_types: BTreeSet<String>,
}

impl WorkerRegistry {
    /// Builds the registry from the worker's configured types.
    ///
    /// Blank names and names registered twice for the same kind are rejected.
    pub fn from_config(config: &WorkerConfig) -> WorkerResult<Self> {
        let mut registry = Self::default();
        for name in &config.workflows {
            registry.register_workflow(name)?;
        }
        for name in &config.activities {
            registry.register_activity(name)?;
        }
        Ok(registry)
    }

    fn register_workflow(&mut self, name: &str) -> WorkerResult<()> {
        insert_type(&mut self.workflow_types, "workflow", name)
    }

    fn register_activity(&mut self, name: &str) -> WorkerResult<()> {
        insert_type(&mut self.activity_types, "activity", name)
    }

    pub fn workflow_types(&self) -> impl Iterator<Item = &str> {
        self.workflow_types.iter().map(String::as_str)
    }

    pub fn activity_types(&self) -> impl Iterator<Item = &str> {
        self.activity_types.iter().map(String::as_str)
    }
}

fn insert_type(types: &mut BTreeSet<String>, kind: &str, name: &str) -> WorkerResult<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(WorkerError::Config(format!("{kind} type name is empty")));
    }
    if !types.insert(name.to_string()) {
        return Err(WorkerError::Config(format!("{kind} type {name} is registered twice")));
    }
    Ok(())
}
