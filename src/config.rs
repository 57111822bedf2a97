use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::constants::{
    DEFAULT_PYTHON, ENV_PYTHON_PATH, ENV_REF_NAMING, ENV_RUNTIME_DIR, ENV_WARNINGS_AS_ERRORS,
    ENV_WORK_DIR, WORK_DIR_NAME,
};

/// How `to_ref` derives a reference name from a file path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReferenceNaming {
    /// `libs/Foo.dll` -> `Foo`
    #[default]
    FileStem,
    /// `libs/Foo.dll` -> `Foo.dll`
    FileName,
}

impl FromStr for ReferenceNaming {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stem" | "file_stem" | "filestem" => Ok(ReferenceNaming::FileStem),
            "name" | "file_name" | "filename" => Ok(ReferenceNaming::FileName),
            other => Err(format!("unknown reference naming `{}`", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilerConfig {
    pub reference_naming: ReferenceNaming,
    /// Directory holding the runtime reference assemblies.
    pub runtime_dir: PathBuf,
    /// Scratch directory for process-backed compilers.
    pub work_dir: PathBuf,
    pub python_path: PathBuf,
    pub warnings_as_errors: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        let base = std::env::temp_dir().join(WORK_DIR_NAME);
        CompilerConfig {
            reference_naming: ReferenceNaming::default(),
            runtime_dir: base.join("runtime"),
            work_dir: base,
            python_path: PathBuf::from(DEFAULT_PYTHON),
            warnings_as_errors: false,
        }
    }
}

impl CompilerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from defaults overridden by whatever `lookup` returns.
    /// Unparseable values are logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = CompilerConfig::default();

        if let Some(value) = lookup(ENV_REF_NAMING) {
            match value.parse() {
                Ok(naming) => config.reference_naming = naming,
                Err(e) => tracing::warn!("Ignoring {}: {}", ENV_REF_NAMING, e),
            }
        }
        if let Some(value) = lookup(ENV_RUNTIME_DIR) {
            config.runtime_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_WORK_DIR) {
            config.work_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_PYTHON_PATH) {
            config.python_path = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_WARNINGS_AS_ERRORS) {
            match parse_flag(&value) {
                Some(flag) => config.warnings_as_errors = flag,
                None => tracing::warn!(
                    "Ignoring {}: `{}` is not a boolean",
                    ENV_WARNINGS_AS_ERRORS,
                    value
                ),
            }
        }

        config
    }

    pub fn to_full_runtime_path<P: AsRef<Path>>(&self, file_name: P) -> PathBuf {
        self.runtime_dir.join(file_name)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
