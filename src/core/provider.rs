use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};

use crate::config::CompilerConfig;
use crate::core::{domain::Language, errors::CompileError, traits::Compiler};
use crate::csharp::CSharpCompiler;
use crate::native::ProcessCompiler;

/// Registry of the compiler backend serving each language.
#[derive(Debug, Default)]
pub struct CompilerProvider {
    compilers: DashMap<Language, Arc<dyn Compiler>>,
}

impl CompilerProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// C# in-process and Python through the configured interpreter.
    pub fn with_defaults(config: &CompilerConfig) -> Result<Self, CompileError> {
        let provider = Self::new();
        provider.register_compiler(Language::CSharp, Arc::new(CSharpCompiler::from_config(config)))?;
        provider.register_compiler(
            Language::Python,
            Arc::new(ProcessCompiler::python(&config.python_path, &config.work_dir)),
        )?;
        Ok(provider)
    }

    #[tracing::instrument(skip(self, compiler))]
    pub fn register_compiler(
        &self,
        language: Language,
        compiler: Arc<dyn Compiler>,
    ) -> Result<(), CompileError> {
        match self.compilers.entry(language) {
            Entry::Occupied(_) => {
                tracing::warn!("Compiler for {} is already registered", language);
                Err(CompileError::AlreadyRegistered(language))
            }
            Entry::Vacant(entry) => {
                entry.insert(compiler);
                tracing::debug!("Registered compiler for {}", language);
                Ok(())
            }
        }
    }

    pub fn get_compiler(&self, language: Language) -> Result<Arc<dyn Compiler>, CompileError> {
        self.try_get_compiler(language)
            .ok_or(CompileError::NotRegistered(language))
    }

    pub fn try_get_compiler(&self, language: Language) -> Option<Arc<dyn Compiler>> {
        self.compilers.get(&language).map(|c| c.value().clone())
    }

    #[tracing::instrument(skip(self))]
    pub fn unregister_compiler(&self, language: Language) -> Option<Arc<dyn Compiler>> {
        let removed = self.compilers.remove(&language).map(|(_, c)| c);
        if removed.is_some() {
            tracing::debug!("Unregistered compiler for {}", language);
        }
        removed
    }

    /// Registered languages in declaration order.
    pub fn languages(&self) -> Vec<Language> {
        let mut languages: Vec<Language> = self.compilers.iter().map(|e| *e.key()).collect();
        languages.sort();
        languages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::compiler::MockCompiler;

    fn mock() -> Arc<dyn Compiler> {
        Arc::new(MockCompiler::new())
    }

    #[test]
    fn test_register_and_get() {
        let provider = CompilerProvider::new();
        let compiler = mock();
        provider
            .register_compiler(Language::CSharp, compiler.clone())
            .unwrap();

        let first = provider.get_compiler(Language::CSharp).unwrap();
        let second = provider.get_compiler(Language::CSharp).unwrap();
        assert!(Arc::ptr_eq(&first, &compiler));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(provider.languages(), vec![Language::CSharp]);
    }

    #[test]
    fn test_missing_language() {
        let provider = CompilerProvider::new();
        assert!(provider.try_get_compiler(Language::FSharp).is_none());
        assert!(matches!(
            provider.get_compiler(Language::FSharp),
            Err(CompileError::NotRegistered(Language::FSharp))
        ));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let provider = CompilerProvider::new();
        let original = mock();
        provider
            .register_compiler(Language::Python, original.clone())
            .unwrap();

        let duplicate = provider.register_compiler(Language::Python, mock());
        assert!(matches!(
            duplicate,
            Err(CompileError::AlreadyRegistered(Language::Python))
        ));
        assert!(Arc::ptr_eq(
            &provider.get_compiler(Language::Python).unwrap(),
            &original
        ));
    }

    #[test]
    fn test_unregister() {
        let provider = CompilerProvider::new();
        provider.register_compiler(Language::VisualBasic, mock()).unwrap();

        assert!(provider.unregister_compiler(Language::VisualBasic).is_some());
        assert!(provider.try_get_compiler(Language::VisualBasic).is_none());
        assert!(provider.unregister_compiler(Language::VisualBasic).is_none());

        provider.register_compiler(Language::VisualBasic, mock()).unwrap();
        assert!(provider.try_get_compiler(Language::VisualBasic).is_some());
    }

    #[test]
    fn test_with_defaults() {
        let provider = CompilerProvider::with_defaults(&CompilerConfig::default()).unwrap();
        assert_eq!(provider.languages(), vec![Language::CSharp, Language::Python]);
        assert_eq!(
            provider.get_compiler(Language::CSharp).unwrap().language(),
            Language::CSharp
        );
        assert_eq!(
            provider.get_compiler(Language::Python).unwrap().language(),
            Language::Python
        );
    }

    #[tokio::test]
    async fn test_dispatches_to_registered_backend() {
        use crate::core::{cancellation::CancellationToken, domain::CompilationResult};
        use crate::stubs::CompilerStub;
        use std::time::Duration;

        let provider = CompilerProvider::new();
        let canned = CompilationResult::new(Vec::new(), Some(vec![0xF5]));
        provider
            .register_compiler(
                Language::FSharp,
                Arc::new(CompilerStub::new(Language::FSharp, Ok(canned.clone()), Duration::ZERO)),
            )
            .unwrap();

        let compiler = provider.get_compiler(Language::FSharp).unwrap();
        let result = compiler
            .compile("test", &["let x = 1".to_string()], &[], &CancellationToken::new())
            .await;
        assert_eq!(result, Ok(canned));
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        let provider = Arc::new(CompilerProvider::new());
        let handles: Vec<_> = Language::ALL
            .into_iter()
            .map(|language| {
                let provider = provider.clone();
                tokio::spawn(async move {
                    for _ in 0..50 {
                        let _ = provider.register_compiler(language, mock());
                        let _ = provider.try_get_compiler(language);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(provider.languages(), Language::ALL.to_vec());
    }
}
