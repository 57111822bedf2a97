use std::sync::Arc;

use crate::core::{
    cancellation::CancellationToken,
    domain::{AnalyzerSettings, CompilationError, CompilationResult, Language, Reference},
    errors::CompileError,
    traits::analyzer::Analyzer,
};

#[mockall::automock]
#[async_trait::async_trait]
pub trait Compiler: std::fmt::Debug + Send + Sync {
    /// Language this backend compiles.
    fn language(&self) -> Language;

    async fn compile(
        &self,
        name: &str,
        sources: &[String],
        references: &[Reference],
        cancel: &CancellationToken,
    ) -> Result<CompilationResult, CompileError>;

    /// Runs `analyzer` over the bound sources without emitting an image and
    /// returns the analyzer diagnostics only.
    async fn analyse(
        &self,
        analyzer: Arc<dyn Analyzer>,
        settings: &[AnalyzerSettings],
        name: &str,
        sources: &[String],
        references: &[Reference],
        cancel: &CancellationToken,
    ) -> Result<Vec<CompilationError>, CompileError>;
}
