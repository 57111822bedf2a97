use crate::core::domain::{AnalyzerSettings, CompilationError, SemanticModel};

/// A pluggable static-analysis rule run against a bound semantic model.
pub trait Analyzer: std::fmt::Debug + Send + Sync {
    /// Diagnostic id reported by this analyzer.
    fn id(&self) -> &str;

    fn analyse(&self, model: &SemanticModel, settings: &[AnalyzerSettings])
    -> Vec<CompilationError>;
}
