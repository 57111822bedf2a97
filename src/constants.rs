/// How many error diagnostics `throw_if_errors` puts into its failure message.
pub const MAX_THROWN_ERRORS: usize = 2;

pub const BANNED_SYMBOLS_FILE: &str = "BannedSymbols.txt";

pub const ENV_REF_NAMING: &str = "DYNCOMPILE_REF_NAMING";
pub const ENV_RUNTIME_DIR: &str = "DYNCOMPILE_RUNTIME_DIR";
pub const ENV_WORK_DIR: &str = "DYNCOMPILE_WORK_DIR";
pub const ENV_PYTHON_PATH: &str = "PYTHON_PATH";
pub const ENV_WARNINGS_AS_ERRORS: &str = "DYNCOMPILE_WARNINGS_AS_ERRORS";

pub const DEFAULT_PYTHON: &str = "python3";
pub const WORK_DIR_NAME: &str = "dyncompile";

/// Deepest statement, declaration, type or bracket nesting the C# front end descends into.
pub const MAX_SYNTAX_DEPTH: usize = 128;
