//! Abstract syntax tree for module declarations.

use std::collections::BTreeMap;

use modgraph_common::types::{InstanceKey, Value};

/// Root node of a parsed declaration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclarationFile {
    /// Module declarations in source order.
    pub modules: Vec<ModuleDeclaration>,
}

/// A `module "<name>" { ... }` block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleDeclaration {
    /// Unique module name.
    pub name: String,
    /// Opaque locator handed to the module executor.
    pub source: String,
    /// Mapping expression driving one instance per key.
    pub for_each: Option<Expression>,
    /// Integer expression driving one instance per index.
    pub count: Option<Expression>,
    /// Named argument expressions passed to every instance.
    pub arguments: BTreeMap<String, Expression>,
}

impl ModuleDeclaration {
    /// Creates a declaration with no multiplicity and no arguments.
    #[must_use]
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            ..Self::default()
        }
    }

    /// Sets the `for_each` expression.
    #[must_use]
    pub fn with_for_each(mut self, expr: Expression) -> Self {
        self.for_each = Some(expr);
        self
    }

    /// Sets the `count` expression.
    #[must_use]
    pub fn with_count(mut self, expr: Expression) -> Self {
        self.count = Some(expr);
        self
    }

    /// Adds a named argument.
    #[must_use]
    pub fn with_argument(mut self, name: impl Into<String>, expr: Expression) -> Self {
        let _ = self.arguments.insert(name.into(), expr);
        self
    }

    /// Whether the declaration expands into keyed instances.
    #[must_use]
    pub const fn is_expanded(&self) -> bool {
        self.for_each.is_some() || self.count.is_some()
    }
}

/// A scalar or composite expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    /// A constant value.
    Literal(Value),
    /// `module.<module>[<key>].<path>`.
    ///
    /// A reference with no key and an empty path denotes the whole module.
    AttributeRef {
        /// Referenced module name.
        module: String,
        /// Selected instance key for expanded modules.
        key: Option<InstanceKey>,
        /// Attribute path projected from the instance outputs.
        path: Vec<String>,
    },
    /// `var.<name>.<path>`: a root input variable.
    VariableRef {
        /// Variable name.
        name: String,
        /// Keys projected from a mapping-valued variable.
        path: Vec<String>,
    },
    /// `<target>[<key>]`.
    Indexed {
        /// Collection being indexed.
        target: Box<Expression>,
        /// Key or index expression.
        key: Box<Expression>,
    },
    /// `<name>(<args>)`.
    FunctionCall {
        /// Function name.
        name: String,
        /// Argument expressions.
        args: Vec<Expression>,
    },
}

impl Expression {
    /// Builds a literal expression.
    #[must_use]
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// Builds `module.<module>.<attribute>`.
    #[must_use]
    pub fn attr(module: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::AttributeRef {
            module: module.into(),
            key: None,
            path: vec![attribute.into()],
        }
    }

    /// Builds `module.<module>[<key>].<attribute>`.
    #[must_use]
    pub fn keyed_attr(
        module: impl Into<String>,
        key: InstanceKey,
        attribute: impl Into<String>,
    ) -> Self {
        Self::AttributeRef {
            module: module.into(),
            key: Some(key),
            path: vec![attribute.into()],
        }
    }

    /// Builds `module.<module>`.
    #[must_use]
    pub fn whole_module(module: impl Into<String>) -> Self {
        Self::AttributeRef {
            module: module.into(),
            key: None,
            path: Vec::new(),
        }
    }

    /// Builds `var.<name>`.
    #[must_use]
    pub fn var(name: impl Into<String>) -> Self {
        Self::VariableRef {
            name: name.into(),
            path: Vec::new(),
        }
    }

    /// Builds `<target>[<key>]`.
    #[must_use]
    pub fn indexed(target: Self, key: Self) -> Self {
        Self::Indexed {
            target: Box::new(target),
            key: Box::new(key),
        }
    }

    /// Builds `<name>(<args>)`.
    #[must_use]
    pub fn call(name: impl Into<String>, args: Vec<Self>) -> Self {
        Self::FunctionCall {
            name: name.into(),
            args,
        }
    }

    /// Returns the constant value if this expression is a literal.
    #[must_use]
    pub const fn as_literal(&self) -> Option<&Value> {
        match self {
            Self::Literal(v) => Some(v),
            _ => None,
        }
    }
}
