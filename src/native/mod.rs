/// Native module contains compiler backends that drive an external
/// toolchain process instead of compiling in-process.
pub mod process;

pub use process::ProcessCompiler;
