//! In-process C# backend.

use std::sync::Arc;

use crate::config::CompilerConfig;
use crate::core::{
    cancellation::CancellationToken,
    domain::{AnalyzerSettings, CompilationError, CompilationResult, ErrorType, Language, Reference},
    errors::{to_error, validate_inputs, CompileError},
    traits::{Analyzer, Compiler},
};
use crate::metadata::{cache::MetadataCache, Assembly};

pub mod binder;
pub mod lexer;
pub mod parser;
pub mod syntax;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CSharpOptions {
    pub warnings_as_errors: bool,
}

#[derive(Clone, Debug, Default)]
pub struct CSharpCompiler {
    options: CSharpOptions,
    cache: Arc<MetadataCache>,
}

impl CSharpCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: CSharpOptions) -> Self {
        CSharpCompiler {
            options,
            cache: Arc::default(),
        }
    }

    /// Shares a metadata cache with other compiler instances.
    pub fn with_cache(mut self, cache: Arc<MetadataCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn from_config(config: &CompilerConfig) -> Self {
        Self::with_options(CSharpOptions {
            warnings_as_errors: config.warnings_as_errors,
        })
    }

    pub fn options(&self) -> CSharpOptions {
        self.options
    }

    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    fn load_references(&self, references: &[Reference]) -> Result<Vec<Arc<Assembly>>, CompileError> {
        references.iter().map(|r| self.cache.load(r)).collect()
    }
}

/// Runs CPU-bound work on the blocking pool, racing it against `cancel`.
///
/// Once cancellation is observed no result is returned, even if the job
/// finished in the meantime.
async fn run_blocking<T, F>(cancel: &CancellationToken, job: F) -> Result<T, CompileError>
where
    F: FnOnce(CancellationToken) -> Result<T, CompileError> + Send + 'static,
    T: Send + 'static,
{
    cancel.check()?;
    let token = cancel.clone();
    let handle = tokio::task::spawn_blocking(move || job(token));

    let result = tokio::select! {
        joined = handle => joined.map_err(|e| CompileError::Internal { msg: e.to_string() })?,
        _ = cancel.cancelled() => {
            tracing::debug!("Compilation cancelled");
            return Err(CompileError::Cancelled);
        }
    };
    cancel.check()?;
    result
}

/// `test.cs` for a single source, `test_0.cs`, `test_1.cs`... otherwise.
pub fn source_file_names(name: &str, count: usize) -> Vec<String> {
    if count == 1 {
        return vec![format!("{}.cs", name)];
    }
    (0..count).map(|i| format!("{}_{}.cs", name, i)).collect()
}

/// Lexes, parses and binds the sources. Diagnostics come back ordered by
/// source file, then position.
fn front_end(
    name: &str,
    sources: &[String],
    references: &[Arc<Assembly>],
    cancel: &CancellationToken,
) -> Result<(Vec<CompilationError>, binder::BindOutput), CompileError> {
    let files = source_file_names(name, sources.len());
    let mut diagnostics = Vec::new();
    let mut units = Vec::with_capacity(sources.len());

    for (file, source) in files.iter().zip(sources) {
        cancel.check()?;
        let (tokens, lex_errors) = lexer::tokenize(file, source);
        let (unit, parse_errors) = parser::parse(file, &tokens);
        diagnostics.extend(lex_errors);
        diagnostics.extend(parse_errors);
        units.push(unit);
    }

    cancel.check()?;
    let bound = binder::bind(name, &units, references);
    diagnostics.extend(bound.diagnostics.iter().cloned());

    diagnostics.sort_by_key(|d| match &d.location {
        Some(loc) => (
            files.iter().position(|f| *f == loc.file).unwrap_or(files.len()),
            loc.line,
            loc.column,
        ),
        None => (files.len() + 1, 0, 0),
    });
    Ok((diagnostics, bound))
}

fn promote_warnings(diagnostics: Vec<CompilationError>) -> Vec<CompilationError> {
    diagnostics
        .into_iter()
        .map(|d| match d.error_type {
            ErrorType::Warning => CompilationError {
                error_type: ErrorType::Error,
                ..d
            },
            _ => d,
        })
        .collect()
}

fn compile_job(
    name: &str,
    sources: &[String],
    references: &[Arc<Assembly>],
    options: CSharpOptions,
    cancel: &CancellationToken,
) -> Result<CompilationResult, CompileError> {
    let (mut diagnostics, bound) = front_end(name, sources, references, cancel)?;
    if options.warnings_as_errors {
        diagnostics = promote_warnings(diagnostics);
    }
    cancel.check()?;

    if diagnostics.iter().any(CompilationError::is_error) {
        return Ok(CompilationResult::failed(diagnostics));
    }

    let assembly = Assembly {
        name: name.to_string(),
        references: references.iter().map(|r| r.name.clone()).collect(),
        types: bound.types,
    };
    let image = assembly
        .to_bytes()
        .map_err(|e| CompileError::Internal { msg: e.to_string() })?;
    Ok(CompilationResult::new(diagnostics, Some(image)))
}

#[async_trait::async_trait]
impl Compiler for CSharpCompiler {
    fn language(&self) -> Language {
        Language::CSharp
    }

    #[tracing::instrument(skip(self, sources, references))]
    async fn compile(
        &self,
        name: &str,
        sources: &[String],
        references: &[Reference],
        cancel: &CancellationToken,
    ) -> Result<CompilationResult, CompileError> {
        validate_inputs(name, sources)?;
        cancel.check()?;
        let assemblies = self.load_references(references)?;

        tracing::debug!(
            "Start compiling {} sources against {} references",
            sources.len(),
            assemblies.len()
        );
        let options = self.options;
        let owned_name = name.to_string();
        let owned_sources = sources.to_vec();
        let result = run_blocking(cancel, move |token| {
            compile_job(&owned_name, &owned_sources, &assemblies, options, &token)
        })
        .await;

        let result = match result {
            Err(CompileError::Internal { msg }) => {
                tracing::error!("Compiler fault: {}", msg);
                CompilationResult::failed(vec![to_error(&msg)])
            }
            other => other?,
        };
        tracing::debug!("Compilation result: {}", result.summary());
        Ok(result)
    }

    #[tracing::instrument(skip(self, settings, sources, references))]
    async fn analyse(
        &self,
        analyzer: Arc<dyn Analyzer>,
        settings: &[AnalyzerSettings],
        name: &str,
        sources: &[String],
        references: &[Reference],
        cancel: &CancellationToken,
    ) -> Result<Vec<CompilationError>, CompileError> {
        validate_inputs(name, sources)?;
        cancel.check()?;
        let assemblies = self.load_references(references)?;

        let owned_name = name.to_string();
        let owned_sources = sources.to_vec();
        let owned_settings = settings.to_vec();
        let result = run_blocking(cancel, move |token| {
            let (_, bound) = front_end(&owned_name, &owned_sources, &assemblies, &token)?;
            token.check()?;
            Ok(analyzer.analyse(&bound.model, &owned_settings))
        })
        .await;

        match result {
            Err(CompileError::Internal { msg }) => {
                tracing::error!("Analyzer fault: {}", msg);
                Ok(vec![to_error(&msg)])
            }
            other => {
                let diagnostics = other?;
                tracing::debug!("Analysis produced {} diagnostics", diagnostics.len());
                Ok(diagnostics)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{Location, SemanticModel};
    use crate::metadata::runtime;

    fn corlib() -> Vec<Reference> {
        vec![runtime::to_reference(&runtime::core_library()).unwrap()]
    }

    fn sources(text: &str) -> Vec<String> {
        vec![text.to_string()]
    }

    #[derive(Debug)]
    struct PanickingAnalyzer;

    impl Analyzer for PanickingAnalyzer {
        fn id(&self) -> &str {
            "PANIC"
        }

        fn analyse(&self, _model: &SemanticModel, _settings: &[AnalyzerSettings]) -> Vec<CompilationError> {
            panic!("analyzer exploded")
        }
    }

    #[tokio::test]
    async fn test_compile_ok() {
        let compiler = CSharpCompiler::new();
        let result = compiler
            .compile("test", &sources("class Class1 {}"), &corlib(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.errors.is_empty(), "{:?}", result.errors);
        let image = result.assembly().unwrap();
        let assembly = Assembly::load(image).unwrap();
        assert_eq!(assembly.name, "test");
        assert!(assembly.find_type("Class1").is_some());
        assert_eq!(assembly.references, vec![runtime::CORE_LIBRARY.to_string()]);
    }

    #[tokio::test]
    async fn test_compile_error_has_no_image() {
        let compiler = CSharpCompiler::new();
        let result = compiler
            .compile("test", &sources("class Class1 {"), &corlib(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.image.is_none());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].id, "CS1513");
        assert_eq!(result.errors[0].location, Some(Location::new("test.cs", 1, 15)));
    }

    #[tokio::test]
    async fn test_pre_cancelled() {
        let compiler = CSharpCompiler::new();
        let result = compiler
            .compile("test", &sources("class Class1 {"), &corlib(), &CancellationToken::cancelled_token())
            .await;
        assert_eq!(result, Err(CompileError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancelled_while_compiling() {
        let member = "public int Value(int x) { if (x > 0) { return x * 2; } return Value(x + 1); }\n";
        let big: Vec<String> = (0..2_000)
            .map(|i| format!("class C{} {{\n{}}}", i, member.repeat(30)))
            .collect();
        let compiler = CSharpCompiler::new();
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                cancel.cancel();
            })
        };
        let result = compiler.compile("big", &big, &corlib(), &cancel).await;
        canceller.await.unwrap();

        assert_eq!(result, Err(CompileError::Cancelled));
    }

    #[tokio::test]
    async fn test_deep_nesting_is_a_diagnostic() {
        let depth = 10_000;
        let nested_types = format!("{}{}", "class A { ".repeat(depth), "}".repeat(depth));
        let nested_blocks = format!(
            "class B {{ void M() {{ {}{} }} }}",
            "{".repeat(depth),
            "}".repeat(depth)
        );
        let compiler = CSharpCompiler::new();

        for source in [nested_types, nested_blocks] {
            let result = compiler
                .compile("test", &sources(&source), &corlib(), &CancellationToken::new())
                .await
                .unwrap();
            assert!(result.image.is_none());
            assert!(result.errors.iter().any(|e| e.id == "CS8078"), "{:?}", result.errors);
        }
    }

    #[tokio::test]
    async fn test_generic_creation_in_local() {
        let source = "using System.Collections.Generic;\n\
            class A { void M() { var d = new Dictionary<string, List<int>>(); var n = d.Count; } }";
        let references = vec![
            runtime::to_reference(&runtime::core_library()).unwrap(),
            runtime::to_reference(&runtime::collections()).unwrap(),
        ];
        let result = CSharpCompiler::new()
            .compile("test", &sources(source), &references, &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert!(result.assembly().is_some());
    }

    #[tokio::test]
    async fn test_invalid_inputs() {
        let compiler = CSharpCompiler::new();
        let cancel = CancellationToken::new();

        let empty_name = compiler.compile(" ", &sources("class A {}"), &corlib(), &cancel).await;
        assert!(matches!(empty_name, Err(CompileError::InvalidArgument { .. })));

        let no_sources = compiler.compile("test", &[], &corlib(), &cancel).await;
        assert!(matches!(no_sources, Err(CompileError::InvalidArgument { .. })));

        let bad_reference = compiler
            .compile("test", &sources("class A {}"), &[Reference::new("junk", vec![1, 2, 3])], &cancel)
            .await;
        assert!(matches!(bad_reference, Err(CompileError::InvalidReference { .. })));
    }

    #[tokio::test]
    async fn test_warnings_as_errors() {
        let source = "using System;\nusing System;\nclass A { String s; }";

        let lenient = CSharpCompiler::new()
            .compile("test", &sources(source), &corlib(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(lenient.assembly().is_some());
        assert_eq!(lenient.errors.len(), 1);
        assert_eq!(lenient.errors[0].error_type, ErrorType::Warning);

        let strict = CSharpCompiler::with_options(CSharpOptions {
            warnings_as_errors: true,
        })
        .compile("test", &sources(source), &corlib(), &CancellationToken::new())
        .await
        .unwrap();
        assert!(strict.assembly().is_none());
        assert_eq!(strict.errors[0].error_type, ErrorType::Error);
    }

    #[tokio::test]
    async fn test_multiple_sources_are_ordered_by_file() {
        let compiler = CSharpCompiler::new();
        let result = compiler
            .compile(
                "unit",
                &["class A { B b; }".to_string(), "class B {".to_string()],
                &corlib(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let files: Vec<_> = result
            .errors
            .iter()
            .map(|e| e.location.as_ref().unwrap().file.as_str())
            .collect();
        assert_eq!(files, vec!["unit_1.cs"]);
    }

    #[tokio::test]
    async fn test_analyzer_panic_becomes_diagnostic() {
        let compiler = CSharpCompiler::new();
        let diagnostics = compiler
            .analyse(
                Arc::new(PanickingAnalyzer),
                &[],
                "test",
                &sources("class A {}"),
                &corlib(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].is_error());
        assert!(diagnostics[0].message.contains("analyzer exploded"));
    }

    #[tokio::test]
    async fn test_cache_is_shared() {
        let cache = Arc::new(MetadataCache::new());
        let first = CSharpCompiler::new().with_cache(cache.clone());
        let second = CSharpCompiler::new().with_cache(cache.clone());
        let cancel = CancellationToken::new();

        first.compile("a", &sources("class A {}"), &corlib(), &cancel).await.unwrap();
        second.compile("b", &sources("class B {}"), &corlib(), &cancel).await.unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_source_file_names() {
        assert_eq!(source_file_names("x", 1), vec!["x.cs"]);
        assert_eq!(source_file_names("x", 2), vec!["x_0.cs", "x_1.cs"]);
    }
}
