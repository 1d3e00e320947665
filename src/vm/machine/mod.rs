//! The execution engine: a fetch-decode-execute loop over a value stack.

use std::rc::Rc;

use thiserror::Error;

use crate::runtime_io::{RuntimeIo, StdIo};

use super::chunk::{Chunk, OpCode};
use super::compiler::{self, CompileError};
use super::table::Table;
use super::value::{Obj, Value};

use instruction::ExecutionFlow;

mod instruction;


pub const STACK_MAX: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmErrorKind {
    TypeError,
    UndefinedVariable,
    ZeroDivision,
    StackOverflow,
    StackUnderflow,
    /// The instruction stream itself is malformed: unknown opcode byte,
    /// out-of-range operand, or running off the end of the chunk.
    BadBytecode,
}

/// A runtime failure. Rendered as the message followed by the source line
/// of the offending instruction, e.g. `Operand must be a number.` then
/// `[line 3] in script`.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}\n[line {line}] in script")]
pub struct VmError {
    pub kind: VmErrorKind,
    pub message: String,
    pub line: usize,
}

pub type VmResult<T> = Result<T, VmError>;

/// The one error type that crosses the `interpret` boundary. The driver
/// maps it onto process exit codes.
#[derive(Error, Debug)]
pub enum InterpretError {
    #[error("compilation failed")]
    Compile(Vec<CompileError>),
    #[error(transparent)]
    Runtime(#[from] VmError),
}

pub struct Vm {
    chunk: Chunk,
    ip: usize,
    stack: Vec<Value>,
    /// Interned strings, shared between compiler and runtime so that equal
    /// content always means an identical handle.
    strings: Table,
    globals: Table,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Vm {
            chunk: Chunk::new(),
            ip: 0,
            stack: Vec::with_capacity(STACK_MAX),
            strings: Table::new(),
            globals: Table::new(),
        }
    }

    /// Compiles and runs `source`, printing to stdout.
    pub fn interpret(&mut self, source: &str) -> Result<(), InterpretError> {
        let mut stdio = StdIo;
        self.interpret_with_io(source, &mut stdio)
    }

    /// Compiles and runs `source` with output routed to `io`. Globals and
    /// interned strings survive across calls (the REPL relies on this); the
    /// bytecode does not outlive the call on any exit path.
    pub fn interpret_with_io<IO: RuntimeIo>(
        &mut self,
        source: &str,
        io: &mut IO,
    ) -> Result<(), InterpretError> {
        self.chunk =
            compiler::compile(source, &mut self.strings).map_err(InterpretError::Compile)?;
        self.ip = 0;
        self.stack.clear();

        let result = self.run(io);

        self.chunk = Chunk::new();
        if result.is_err() {
            self.stack.clear();
        }
        Ok(result?)
    }

    fn run<IO: RuntimeIo>(&mut self, io: &mut IO) -> VmResult<()> {
        loop {
            let byte = self.read_byte()?;
            let op = OpCode::from_repr(byte).ok_or_else(|| {
                self.error(
                    VmErrorKind::BadBytecode,
                    format!("Unknown opcode {}.", byte),
                )
            })?;
            match self.execute(op, io)? {
                ExecutionFlow::Continue => {}
                ExecutionFlow::Finish => return Ok(()),
            }
        }
    }

    // ----- fetch helpers -----

    fn read_byte(&mut self) -> VmResult<u8> {
        let byte = self.chunk.code.get(self.ip).copied().ok_or_else(|| {
            self.error(
                VmErrorKind::BadBytecode,
                "Ran off the end of the bytecode.".to_string(),
            )
        })?;
        self.ip += 1;
        Ok(byte)
    }

    fn read_constant(&mut self) -> VmResult<Value> {
        let index = self.read_byte()? as usize;
        self.chunk.constants.get(index).cloned().ok_or_else(|| {
            self.error(
                VmErrorKind::BadBytecode,
                format!("Bad constant index {}.", index),
            )
        })
    }

    /// Reads a constant operand that must be an interned string (variable
    /// names are stored that way).
    fn read_string(&mut self) -> VmResult<Rc<Obj>> {
        match self.read_constant()? {
            Value::Obj(obj) => Ok(obj),
            other => Err(self.error(
                VmErrorKind::BadBytecode,
                format!("Expected a string constant, found {}.", other),
            )),
        }
    }

    // ----- stack helpers -----

    fn push(&mut self, value: Value) -> VmResult<()> {
        if self.stack.len() >= STACK_MAX {
            return Err(self.error(VmErrorKind::StackOverflow, "Stack overflow.".to_string()));
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> VmResult<Value> {
        self.stack
            .pop()
            .ok_or_else(|| self.error(VmErrorKind::StackUnderflow, "Stack underflow.".to_string()))
    }

    /// The value `distance` slots below the top, without popping.
    fn peek(&self, distance: usize) -> VmResult<Value> {
        self.stack
            .len()
            .checked_sub(1 + distance)
            .and_then(|index| self.stack.get(index))
            .cloned()
            .ok_or_else(|| self.error(VmErrorKind::StackUnderflow, "Stack underflow.".to_string()))
    }

    /// Builds a runtime error against the instruction currently executing.
    fn error(&self, kind: VmErrorKind, message: String) -> VmError {
        let line = self
            .chunk
            .lines
            .get(self.ip.saturating_sub(1))
            .copied()
            .unwrap_or(0);
        VmError {
            kind,
            message,
            line,
        }
    }
}
