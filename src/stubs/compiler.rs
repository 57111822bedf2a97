use std::sync::Arc;
use std::time::Duration;

use crate::core::{
    cancellation::CancellationToken,
    domain::{AnalyzerSettings, CompilationError, CompilationResult, Language, Reference},
    errors::{validate_inputs, CompileError},
    traits::{Analyzer, Compiler},
};

/// Backend returning a canned result after a delay. Used to register
/// languages that have no real toolchain and in concurrency tests.
#[derive(Debug, Clone)]
pub struct CompilerStub {
    language: Language,
    result: Result<CompilationResult, CompileError>,
    delay: Duration,
}

impl CompilerStub {
    pub fn new(
        language: Language,
        result: Result<CompilationResult, CompileError>,
        delay: Duration,
    ) -> Self {
        Self {
            language,
            result,
            delay,
        }
    }

    async fn wait(&self, cancel: &CancellationToken) -> Result<(), CompileError> {
        cancel.check()?;
        tokio::select! {
            _ = tokio::time::sleep(self.delay) => Ok(()),
            _ = cancel.cancelled() => Err(CompileError::Cancelled),
        }
    }
}

#[async_trait::async_trait]
impl Compiler for CompilerStub {
    fn language(&self) -> Language {
        self.language
    }

    #[tracing::instrument(skip(self, cancel))]
    async fn compile(
        &self,
        name: &str,
        sources: &[String],
        references: &[Reference],
        cancel: &CancellationToken,
    ) -> Result<CompilationResult, CompileError> {
        validate_inputs(name, sources)?;
        tracing::debug!("Start stub compilation of {}", name);
        self.wait(cancel).await?;
        tracing::debug!("Compilation result: {:?}", self.result);

        self.result.clone()
    }

    #[tracing::instrument(skip(self, analyzer, sources, cancel))]
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
        self.wait(cancel).await?;

        self.result.clone().map(|res| {
            res.errors
                .into_iter()
                .filter(|e| e.id == analyzer.id())
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::to_banned_symbols_analyzer;

    #[tokio::test]
    async fn test_returns_canned_result() {
        let canned = CompilationResult::new(Vec::new(), Some(vec![1, 2, 3]));
        let stub = CompilerStub::new(Language::FSharp, Ok(canned.clone()), Duration::from_millis(10));

        let result = stub
            .compile("test", &["let x = 1".to_string()], &[], &CancellationToken::new())
            .await;
        assert_eq!(result, Ok(canned));
        assert_eq!(stub.language(), Language::FSharp);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_delay() {
        let stub = CompilerStub::new(
            Language::VisualBasic,
            Ok(CompilationResult::default()),
            Duration::from_secs(30),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            stub.compile("test", &["x".to_string()], &[], &cancel),
        )
        .await
        .expect("stub should observe cancellation");
        assert_eq!(result, Err(CompileError::Cancelled));
    }

    #[tokio::test]
    async fn test_analyse_filters_by_analyzer_id() {
        let canned = CompilationResult::failed(vec![
            CompilationError::error("RS0030", "banned"),
            CompilationError::error("CS0246", "unknown"),
        ]);
        let stub = CompilerStub::new(Language::CSharp, Ok(canned), Duration::ZERO);
        let (analyzer, settings) = to_banned_symbols_analyzer("T:System.Object");

        let diagnostics = stub
            .analyse(
                analyzer,
                &[settings],
                "test",
                &["class A {}".to_string()],
                &[],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].id, "RS0030");
    }
}
