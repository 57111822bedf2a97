pub mod compiler;

pub use compiler::CompilerStub;
