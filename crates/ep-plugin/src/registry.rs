//! Plugin registry
//!
//! Plugins declare their inputs and outputs as fields. Each field is a
//! schema value keyed `"<plugin>.<field>"` in the workflow data. The
//! registry is built explicitly at startup and passed to the runner; there
//! is no global plugin table.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use ep_core::{SchemaMap, SchemaRegistry};

use crate::runner::RunnerError;

/// Body of a plugin
#[async_trait]
pub trait PluginMain: Send + Sync {
    /// Read `input`, write results into `output`
    async fn run(&self, input: &SchemaMap, output: &mut SchemaMap) -> anyhow::Result<()>;
}

/// Workflow data key of a plugin field
pub fn schema_key(plugin: &str, field: &str) -> String {
    format!("{}.{}", plugin, field)
}

/// A plugin and the schema keys it reads and writes
pub struct PluginDescriptor {
    name: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    main: Arc<dyn PluginMain>,
}

impl PluginDescriptor {
    pub fn new(name: impl Into<String>, main: Arc<dyn PluginMain>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            main,
        }
    }

    /// Read a field from the shared workflow data. `field` may name another
    /// plugin's field in full (`"other.files"`).
    pub fn input(mut self, field: &str) -> Self {
        self.inputs.push(self.qualify(field));
        self
    }

    /// Write a field into the plugin's private data
    pub fn output(mut self, field: &str) -> Self {
        self.outputs.push(self.qualify(field));
        self
    }

    fn qualify(&self, field: &str) -> String {
        if field.contains('.') {
            field.to_string()
        } else {
            schema_key(&self.name, field)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn main(&self) -> Arc<dyn PluginMain> {
        Arc::clone(&self.main)
    }
}

/// Registered plugins and the constructors of their schema values
#[derive(Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, PluginDescriptor>,
    schemas: SchemaRegistry,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin. Names are unique.
    pub fn register(&mut self, descriptor: PluginDescriptor) -> Result<(), RunnerError> {
        if self.plugins.contains_key(descriptor.name()) {
            return Err(RunnerError::DuplicatePlugin(descriptor.name().to_string()));
        }
        tracing::debug!(
            plugin = %descriptor.name(),
            inputs = ?descriptor.inputs(),
            outputs = ?descriptor.outputs(),
            "Registered plugin"
        );
        self.plugins.insert(descriptor.name().to_string(), descriptor);
        Ok(())
    }

    /// Register `T::default()` as the initial value of a schema key
    pub fn register_schema<T>(&mut self, key: impl Into<String>)
    where
        T: Default + serde::Serialize + 'static,
    {
        self.schemas.register_type::<T>(key);
    }

    /// Register a constructor for a schema key
    pub fn register_schema_with<F>(&mut self, key: impl Into<String>, constructor: F)
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.schemas.register(key, constructor);
    }

    pub fn get(&self, name: &str) -> Option<&PluginDescriptor> {
        self.plugins.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl PluginMain for Noop {
        async fn run(&self, _input: &SchemaMap, _output: &mut SchemaMap) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_descriptor_qualifies_fields() {
        let descriptor = PluginDescriptor::new("kind-remover", Arc::new(Noop))
            .input("files")
            .input("image-builder.images")
            .output("files");

        assert_eq!(
            descriptor.inputs(),
            &["kind-remover.files", "image-builder.images"]
        );
        assert_eq!(descriptor.outputs(), &["kind-remover.files"]);
    }

    #[test]
    fn test_duplicate_plugin_rejected() {
        let mut registry = PluginRegistry::new();
        registry
            .register(PluginDescriptor::new("p", Arc::new(Noop)))
            .unwrap();

        assert!(matches!(
            registry.register(PluginDescriptor::new("p", Arc::new(Noop))),
            Err(RunnerError::DuplicatePlugin(name)) if name == "p"
        ));
        assert_eq!(registry.names().count(), 1);
    }
}
