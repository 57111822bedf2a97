//! Dynamic compilation service: compiles source text against in-memory
//! reference images and returns a loadable image or diagnostics.

pub mod analyzers;
pub mod config;
pub mod constants;
pub mod core;
pub mod csharp;
pub mod metadata;
pub mod native;
pub mod stubs;

#[cfg(test)]
mod integration_test;

pub use crate::config::{CompilerConfig, ReferenceNaming};
pub use crate::core::{
    cancellation::CancellationToken,
    domain::{CompilationError, CompilationResult, ErrorType, Language, Location, Reference},
    errors::{to_error, CompileError},
    extensions::{to_extension, to_ref, to_ref_with, try_to_language, CompilationResultExt},
    provider::CompilerProvider,
    references::{AssemblyReference, CodeReference, ImageReference},
    traits::{Analyzer, Compiler},
};
