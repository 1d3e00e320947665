//! A bytecode implementation of the Lox language: a single-pass compiler
//! that emits into a chunk, and a stack-based VM that executes it.

pub mod runtime_io;
pub mod scanner;
pub mod vm;

pub use vm::{CompileError, InterpretError, Vm, VmError};
