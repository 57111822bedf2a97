pub mod analyzer;
pub mod compiler;

pub use analyzer::Analyzer;
pub use compiler::Compiler;
