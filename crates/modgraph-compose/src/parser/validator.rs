//! Static validation of module declarations.
//!
//! Checks for duplicate names, missing sources, and conflicting
//! multiplicity meta-arguments before any instance is expanded.

use std::collections::HashSet;

use modgraph_common::error::{ModgraphError, Result};

use super::ast::ModuleDeclaration;

/// Validates a sequence of declarations for structural correctness.
///
/// # Checks performed
///
/// 1. Every module has a non-empty name.
/// 2. No duplicate module names.
/// 3. Every module declares a `source`.
/// 4. No module sets both `count` and `for_each`.
///
/// # Errors
///
/// Returns a declaration error describing the first failed check.
pub fn validate(modules: &[ModuleDeclaration]) -> Result<()> {
    tracing::debug!(modules = modules.len(), "validating declarations");
    check_names(modules)?;
    check_sources(modules)?;
    check_multiplicity(modules)?;
    Ok(())
}

fn check_names(modules: &[ModuleDeclaration]) -> Result<()> {
    let mut seen = HashSet::new();
    for module in modules {
        if module.name.is_empty() {
            return Err(ModgraphError::Declaration {
                message: "module name must not be empty".into(),
            });
        }
        if !seen.insert(module.name.as_str()) {
            return Err(ModgraphError::Declaration {
                message: format!("duplicate module name: \"{}\"", module.name),
            });
        }
    }
    Ok(())
}

fn check_sources(modules: &[ModuleDeclaration]) -> Result<()> {
    for module in modules {
        if module.source.is_empty() {
            return Err(ModgraphError::Declaration {
                message: format!("module \"{}\" has no source", module.name),
            });
        }
    }
    Ok(())
}

fn check_multiplicity(modules: &[ModuleDeclaration]) -> Result<()> {
    for module in modules {
        if module.count.is_some() && module.for_each.is_some() {
            return Err(ModgraphError::Declaration {
                message: format!(
                    "module \"{}\" sets both count and for_each",
                    module.name
                ),
            });
        }
    }
    Ok(())
}
