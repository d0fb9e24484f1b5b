//! Instance registry: every expanded instance, keyed by identity.
//!
//! Built once by the expander and read-only afterwards. The registry is
//! passed explicitly to the resolver, evaluator, and scheduler.

use std::collections::{BTreeMap, HashMap};

use modgraph_common::types::{InstanceId, InstanceKey, Value, Variables};

use crate::parser::ast::{Expression, ModuleDeclaration};

/// One concrete occurrence of a declaration after expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInstance {
    /// Declaration name plus key.
    pub id: InstanceId,
    /// Source locator inherited from the declaration.
    pub source: String,
    /// Argument expressions inherited from the declaration.
    pub arguments: BTreeMap<String, Expression>,
    /// The `for_each` entry value this instance was created for.
    pub each_value: Option<Value>,
}

/// How a declared module was expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    /// Exactly one keyless instance.
    Single,
    /// One instance per key, possibly none.
    Keyed(Vec<InstanceKey>),
}

#[derive(Debug, Clone)]
struct ModuleEntry {
    expanded: bool,
    instances: Vec<usize>,
}

/// Arena of module instances with lookup by identity and by module.
#[derive(Debug, Clone, Default)]
pub struct InstanceRegistry {
    instances: Vec<ModuleInstance>,
    index: HashMap<InstanceId, usize>,
    modules: BTreeMap<String, ModuleEntry>,
    variables: Variables,
}

impl InstanceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry over the given root input variables.
    #[must_use]
    pub fn with_variables(variables: Variables) -> Self {
        Self {
            variables,
            ..Self::default()
        }
    }

    /// Root input variables the instances were expanded with.
    #[must_use]
    pub const fn variables(&self) -> &Variables {
        &self.variables
    }

    /// Registers a declared module before its instances are added.
    pub(crate) fn declare(&mut self, declaration: &ModuleDeclaration) {
        let _ = self.modules.insert(
            declaration.name.clone(),
            ModuleEntry {
                expanded: declaration.is_expanded(),
                instances: Vec::new(),
            },
        );
    }

    /// Adds an instance of a previously declared module, returning its index.
    pub(crate) fn push(&mut self, instance: ModuleInstance) -> usize {
        let idx = self.instances.len();
        if let Some(entry) = self.modules.get_mut(&instance.id.module) {
            entry.instances.push(idx);
        }
        let _ = self.index.insert(instance.id.clone(), idx);
        self.instances.push(instance);
        idx
    }

    /// Number of instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether the registry holds no instances.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Returns the instance at `idx`.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&ModuleInstance> {
        self.instances.get(idx)
    }

    /// Returns the arena index of an instance.
    #[must_use]
    pub fn index_of(&self, id: &InstanceId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Iterates over all instances in expansion order.
    pub fn iter(&self) -> impl Iterator<Item = &ModuleInstance> {
        self.instances.iter()
    }

    /// Whether a module with this name was declared.
    #[must_use]
    pub fn contains_module(&self, module: &str) -> bool {
        self.modules.contains_key(module)
    }

    /// Whether the named module was declared with `for_each` or `count`.
    #[must_use]
    pub fn is_expanded(&self, module: &str) -> Option<bool> {
        self.modules.get(module).map(|entry| entry.expanded)
    }

    /// Arena indices of the named module's instances.
    #[must_use]
    pub fn instances_of(&self, module: &str) -> &[usize] {
        self.modules
            .get(module)
            .map(|entry| entry.instances.as_slice())
            .unwrap_or(&[])
    }

    /// Returns how the named module was expanded.
    #[must_use]
    pub fn shape(&self, module: &str) -> Option<Shape> {
        let entry = self.modules.get(module)?;
        if !entry.expanded {
            return Some(Shape::Single);
        }
        let keys = entry
            .instances
            .iter()
            .filter_map(|&idx| self.instances[idx].id.key.clone())
            .collect();
        Some(Shape::Keyed(keys))
    }
}
