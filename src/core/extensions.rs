use std::path::Path;
use std::sync::Arc;

use itertools::Itertools;

use crate::config::ReferenceNaming;
use crate::constants::MAX_THROWN_ERRORS;
use crate::core::{
    cancellation::CancellationToken,
    domain::{CompilationError, CompilationResult, Language, Reference},
    errors::CompileError,
    references::CodeReference,
    traits::Compiler,
};

const EXTENSIONS: [(Language, &str); 4] = [
    (Language::CSharp, ".cs"),
    (Language::VisualBasic, ".vb"),
    (Language::FSharp, ".fs"),
    (Language::Python, ".py"),
];

/// Source file extension of `language`, dot included.
pub fn to_extension(language: Language) -> &'static str {
    EXTENSIONS
        .iter()
        .find(|(lang, _)| *lang == language)
        .map(|(_, ext)| *ext)
        .unwrap_or_default()
}

/// Maps `cs`, `.CS`, `.py`... back to a language.
pub fn try_to_language(extension: &str) -> Option<Language> {
    let extension = extension.trim();
    let extension = extension.strip_prefix('.').unwrap_or(extension);
    EXTENSIONS
        .iter()
        .find(|(_, ext)| ext[1..].eq_ignore_ascii_case(extension))
        .map(|(lang, _)| *lang)
}

pub trait CompilationResultExt: Sized {
    fn has_errors(&self) -> bool;

    fn errors_only(&self) -> Vec<&CompilationError>;

    /// Fails with the first few error diagnostics when there are any.
    fn throw_if_errors(self) -> Result<Self, CompileError>;
}

impl CompilationResultExt for CompilationResult {
    fn has_errors(&self) -> bool {
        self.errors.iter().any(CompilationError::is_error)
    }

    fn errors_only(&self) -> Vec<&CompilationError> {
        self.errors.iter().filter(|e| e.is_error()).collect()
    }

    fn throw_if_errors(self) -> Result<Self, CompileError> {
        if !self.has_errors() {
            return Ok(self);
        }
        let shown = self
            .errors
            .iter()
            .filter(|e| e.is_error())
            .take(MAX_THROWN_ERRORS)
            .join("\n");
        Err(CompileError::Failed {
            msg: format!("Compilation error: {}", shown),
        })
    }
}

pub async fn to_ref<P: AsRef<Path>>(path: P) -> Result<Reference, CompileError> {
    to_ref_with(path, ReferenceNaming::default()).await
}

/// Reads `path` into memory, naming the reference after the file.
pub async fn to_ref_with<P: AsRef<Path>>(
    path: P,
    naming: ReferenceNaming,
) -> Result<Reference, CompileError> {
    let path = path.as_ref();
    let name = match naming {
        ReferenceNaming::FileStem => path.file_stem(),
        ReferenceNaming::FileName => path.file_name(),
    }
    .map(|n| n.to_string_lossy().into_owned())
    .filter(|n| !n.is_empty())
    .ok_or_else(|| CompileError::InvalidReference {
        name: path.display().to_string(),
        msg: "path has no file name".to_string(),
    })?;

    let body = tokio::fs::read(path)
        .await
        .map_err(|e| CompileError::io(path, &e))?;
    tracing::trace!("Read reference {} ({} bytes)", name, body.len());
    Ok(Reference::new(name, body))
}

/// Locations of the references that currently resolve.
pub fn to_valid_paths<R>(references: &[R]) -> Vec<String>
where
    R: AsRef<dyn CodeReference>,
{
    references
        .iter()
        .map(|r| -> &dyn CodeReference { r.as_ref() })
        .filter(|r| r.is_valid())
        .map(|r| r.location())
        .collect()
}

/// Resolves every valid reference concurrently and flattens their images.
pub async fn to_valid_ref_images(
    references: &[Arc<dyn CodeReference>],
    cancel: &CancellationToken,
) -> Result<Vec<Reference>, CompileError> {
    cancel.check()?;
    let loads = references
        .iter()
        .filter(|r| r.is_valid())
        .map(|r| r.images(cancel));
    let images = futures::future::try_join_all(loads).await?;
    cancel.check()?;
    Ok(images.into_iter().flatten().collect())
}

/// Reads each reference path with [`to_ref_with`], then compiles.
#[tracing::instrument(skip(compiler, sources, paths, cancel))]
pub async fn compile_paths<P>(
    compiler: &dyn Compiler,
    name: &str,
    sources: &[String],
    paths: &[P],
    naming: ReferenceNaming,
    cancel: &CancellationToken,
) -> Result<CompilationResult, CompileError>
where
    P: AsRef<Path> + std::fmt::Debug,
{
    cancel.check()?;
    let references =
        futures::future::try_join_all(paths.iter().map(|p| to_ref_with(p, naming))).await?;
    compiler.compile(name, sources, &references, cancel).await
}
