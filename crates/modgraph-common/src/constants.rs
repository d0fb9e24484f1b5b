//! System-wide constants and defaults.

/// Default number of instances evaluated concurrently.
pub const DEFAULT_PARALLELISM: usize = 10;

/// File extension for modgraph declaration files.
pub const DECLARATION_EXTENSION: &str = ".mg";

/// Default declaration file looked up by the CLI.
pub const DEFAULT_DECLARATION_FILE: &str = "main.mg";

/// Block type identifier marking a module declaration.
pub const MODULE_BLOCK: &str = "module";

/// Namespace of root input variable references (`var.<name>`).
pub const VARIABLE_NAMESPACE: &str = "var";

/// Extension marking a variables file written as a JSON object.
pub const JSON_VARIABLES_EXTENSION: &str = "json";

/// Reserved attribute holding the module's source locator.
pub const SOURCE_ATTRIBUTE: &str = "source";

/// Reserved meta-argument expanding a module over a mapping.
pub const FOR_EACH_ATTRIBUTE: &str = "for_each";

/// Reserved meta-argument expanding a module a fixed number of times.
pub const COUNT_ATTRIBUTE: &str = "count";

/// Application name used in CLI output.
pub const APP_NAME: &str = "modgraph";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "mgraph";
