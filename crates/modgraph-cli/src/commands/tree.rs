//! `mgraph tree` — Print the declared module structure.

use std::fmt;
use std::path::PathBuf;

use clap::Args;
use modgraph_common::constants::DEFAULT_DECLARATION_FILE;
use modgraph_common::types::{InstanceKey, Variables};
use modgraph_compose::parser::ast::ModuleDeclaration;
use modgraph_compose::registry::InstanceRegistry;
use termtree::Tree;

/// Arguments for the `tree` command.
#[derive(Args, Debug)]
pub struct TreeArgs {
    /// Declaration file, or a directory containing `main.mg`.
    #[arg(default_value = DEFAULT_DECLARATION_FILE)]
    pub file: PathBuf,
}

/// A module as shown in the tree: `name{x y} (source)` for `for_each`
/// modules and `name[N] (source)` for `count` modules.
#[derive(Debug)]
struct ModuleNode<'a> {
    name: &'a str,
    source: &'a str,
    count: Option<usize>,
    keys: Option<Vec<String>>,
}

impl fmt::Display for ModuleNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)?;
        if let Some(count) = self.count {
            write!(f, "[{count}]")?;
        }
        if let Some(keys) = &self.keys {
            write!(f, "{{{}}}", keys.join(" "))?;
        }
        write!(f, " ({})", self.source)
    }
}

/// Executes the `tree` command.
///
/// # Errors
///
/// Returns an error if the declarations cannot be loaded or expanded.
pub fn execute(args: &TreeArgs, variables: &Variables) -> anyhow::Result<()> {
    let declarations = super::load_declarations(&args.file)?;
    let registry = modgraph_compose::expand_with_variables(&declarations, variables)?;
    print!("{}", module_tree(&declarations, &registry));
    Ok(())
}

fn module_tree(
    declarations: &[ModuleDeclaration],
    registry: &InstanceRegistry,
) -> Tree<String> {
    let leaves = declarations.iter().map(|decl| {
        let instances = registry.instances_of(&decl.name);
        let node = ModuleNode {
            name: &decl.name,
            source: &decl.source,
            count: decl.count.as_ref().map(|_| instances.len()),
            keys: decl.for_each.as_ref().map(|_| {
                instances
                    .iter()
                    .filter_map(|&idx| registry.get(idx))
                    .filter_map(|instance| instance.id.key.as_ref())
                    .map(InstanceKey::as_map_key)
                    .collect()
            }),
        };
        Tree::new(node.to_string())
    });
    Tree::new("*".to_string()).with_leaves(leaves)
}
