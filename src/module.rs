use serde::de::DeserializeOwned;
use std::{collections::BTreeMap, fmt};

use crate::{config::Config, error::GraphError, graph::ModuleContext, modules};

/// Anything with a stable module name.
pub trait Named {
    fn name(&self) -> &str;
}

/// A module type: turns its typed properties into build steps.
///
/// Instances share nothing, so the engine may generate them in any order or
/// in parallel.
pub trait Module: Named + fmt::Debug + Send + Sync {
    /// Emit this module's steps into `ctx`.
    ///
    /// Scoped property problems go through [`ModuleContext::property_error`]
    /// and return `Ok`; an `Err` aborts the whole generation.
    fn generate_build_actions(&self, ctx: &mut ModuleContext<'_>) -> Result<(), GraphError>;

    /// Artifact paths other modules may depend on.
    fn outputs(&self, config: &Config) -> Vec<String>;
}

/// Builds a fresh module from its name and the remaining fields of its
/// declarative block.
pub type ModuleFactory = fn(String, toml::Table) -> Result<Box<dyn Module>, toml::de::Error>;

/// Deserialize a module block into a typed properties struct by field name.
pub fn properties<P: DeserializeOwned>(block: toml::Table) -> Result<P, toml::de::Error> {
    toml::Value::Table(block).try_into()
}

#[derive(Clone)]
pub struct ModuleRegistry {
    factories: BTreeMap<String, ModuleFactory>,
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("types", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        let mut r = Self::empty();
        r.register(modules::go_binary::TYPE_NAME, modules::go_binary::factory);
        r
    }
}

impl ModuleRegistry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, type_name: &str, factory: ModuleFactory) {
        self.factories.insert(type_name.to_string(), factory);
    }

    pub fn get(&self, type_name: &str) -> Option<ModuleFactory> {
        self.factories.get(type_name).copied()
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}
