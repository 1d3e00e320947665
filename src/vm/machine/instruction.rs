use std::rc::Rc;

use crate::runtime_io::RuntimeIo;
use crate::vm::chunk::OpCode;
use crate::vm::value::Value;

use super::{Vm, VmErrorKind, VmResult};

/// What the dispatch loop should do after one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ExecutionFlow {
    Continue,
    Finish,
}

impl Vm {
    pub(super) fn execute<IO: RuntimeIo>(
        &mut self,
        op: OpCode,
        io: &mut IO,
    ) -> VmResult<ExecutionFlow> {
        match op {
            // ===== constants and literals =====
            OpCode::Constant => self.handle_constant(),
            OpCode::Nil => self.handle_literal(Value::Nil),
            OpCode::True => self.handle_literal(Value::Bool(true)),
            OpCode::False => self.handle_literal(Value::Bool(false)),

            // ===== stack =====
            OpCode::Pop => self.handle_pop(),

            // ===== locals and globals =====
            OpCode::GetLocal => self.handle_get_local(),
            OpCode::SetLocal => self.handle_set_local(),
            OpCode::GetGlobal => self.handle_get_global(),
            OpCode::DefineGlobal => self.handle_define_global(),
            OpCode::SetGlobal => self.handle_set_global(),

            // ===== operators =====
            OpCode::Equal => self.handle_equal(),
            OpCode::Add => self.handle_add(),
            OpCode::Greater
            | OpCode::Less
            | OpCode::Subtract
            | OpCode::Multiply
            | OpCode::Divide => self.handle_numeric_binary(op),
            OpCode::Not => self.handle_not(),
            OpCode::Negate => self.handle_negate(),

            // ===== statements =====
            OpCode::Print => self.handle_print(io),
            OpCode::Return => Ok(ExecutionFlow::Finish),
        }
    }

    // ==================== constants and literals ====================

    fn handle_constant(&mut self) -> VmResult<ExecutionFlow> {
        let value = self.read_constant()?;
        self.push(value)?;
        Ok(ExecutionFlow::Continue)
    }

    fn handle_literal(&mut self, value: Value) -> VmResult<ExecutionFlow> {
        self.push(value)?;
        Ok(ExecutionFlow::Continue)
    }

    // ==================== stack ====================

    fn handle_pop(&mut self) -> VmResult<ExecutionFlow> {
        self.pop()?;
        Ok(ExecutionFlow::Continue)
    }

    // ==================== locals and globals ====================

    fn handle_get_local(&mut self) -> VmResult<ExecutionFlow> {
        let slot = self.read_byte()? as usize;
        let value = self.stack.get(slot).cloned().ok_or_else(|| {
            self.error(VmErrorKind::BadBytecode, format!("Bad local slot {}.", slot))
        })?;
        self.push(value)?;
        Ok(ExecutionFlow::Continue)
    }

    /// Assignment is an expression, so the value stays on the stack.
    fn handle_set_local(&mut self) -> VmResult<ExecutionFlow> {
        let slot = self.read_byte()? as usize;
        let value = self.peek(0)?;
        match self.stack.get_mut(slot) {
            Some(entry) => *entry = value,
            None => {
                return Err(self.error(
                    VmErrorKind::BadBytecode,
                    format!("Bad local slot {}.", slot),
                ))
            }
        }
        Ok(ExecutionFlow::Continue)
    }

    fn handle_get_global(&mut self) -> VmResult<ExecutionFlow> {
        let name = self.read_string()?;
        let value = self.globals.get(&name).ok_or_else(|| {
            self.error(
                VmErrorKind::UndefinedVariable,
                format!("Undefined variable '{}'.", name.as_str()),
            )
        })?;
        self.push(value)?;
        Ok(ExecutionFlow::Continue)
    }

    fn handle_define_global(&mut self) -> VmResult<ExecutionFlow> {
        let name = self.read_string()?;
        let value = self.peek(0)?;
        self.globals.set(name, value);
        self.pop()?;
        Ok(ExecutionFlow::Continue)
    }

    /// Assigning to a name that was never defined is an error; the
    /// accidental insert is rolled back before reporting.
    fn handle_set_global(&mut self) -> VmResult<ExecutionFlow> {
        let name = self.read_string()?;
        let value = self.peek(0)?;
        if self.globals.set(Rc::clone(&name), value) {
            self.globals.delete(&name);
            return Err(self.error(
                VmErrorKind::UndefinedVariable,
                format!("Undefined variable '{}'.", name.as_str()),
            ));
        }
        Ok(ExecutionFlow::Continue)
    }

    // ==================== operators ====================

    fn handle_equal(&mut self) -> VmResult<ExecutionFlow> {
        let b = self.pop()?;
        let a = self.pop()?;
        self.push(Value::Bool(a == b))?;
        Ok(ExecutionFlow::Continue)
    }

    /// `+` is overloaded: two strings concatenate (and the result is
    /// interned, so equal results share one object), two numbers add.
    fn handle_add(&mut self) -> VmResult<ExecutionFlow> {
        let (b, a) = (self.peek(0)?, self.peek(1)?);
        match (&a, &b) {
            (Value::Obj(left), Value::Obj(right)) => {
                let mut text = left.as_str().to_string();
                text.push_str(right.as_str());
                self.pop()?;
                self.pop()?;
                let obj = self.strings.intern(text);
                self.push(Value::Obj(obj))?;
            }
            (Value::Number(x), Value::Number(y)) => {
                let sum = x + y;
                self.pop()?;
                self.pop()?;
                self.push(Value::Number(sum))?;
            }
            _ => {
                return Err(self.error(
                    VmErrorKind::TypeError,
                    "Operands must be two numbers or two strings.".to_string(),
                ))
            }
        }
        Ok(ExecutionFlow::Continue)
    }

    fn handle_numeric_binary(&mut self, op: OpCode) -> VmResult<ExecutionFlow> {
        let (Value::Number(b), Value::Number(a)) = (self.peek(0)?, self.peek(1)?) else {
            return Err(self.error(
                VmErrorKind::TypeError,
                "Operands must be numbers.".to_string(),
            ));
        };
        self.pop()?;
        self.pop()?;
        match op {
            OpCode::Greater => self.push(Value::Bool(a > b))?,
            OpCode::Less => self.push(Value::Bool(a < b))?,
            OpCode::Subtract => self.push(Value::Number(a - b))?,
            OpCode::Multiply => self.push(Value::Number(a * b))?,
            OpCode::Divide => {
                if b == 0.0 {
                    return Err(
                        self.error(VmErrorKind::ZeroDivision, "Division by zero.".to_string())
                    );
                }
                self.push(Value::Number(a / b))?;
            }
            _ => unreachable!("numeric handler on non-numeric opcode"),
        }
        Ok(ExecutionFlow::Continue)
    }

    fn handle_not(&mut self) -> VmResult<ExecutionFlow> {
        let value = self.pop()?;
        self.push(Value::Bool(value.is_falsey()))?;
        Ok(ExecutionFlow::Continue)
    }

    fn handle_negate(&mut self) -> VmResult<ExecutionFlow> {
        let Value::Number(n) = self.peek(0)? else {
            return Err(self.error(
                VmErrorKind::TypeError,
                "Operand must be a number.".to_string(),
            ));
        };
        self.pop()?;
        self.push(Value::Number(-n))?;
        Ok(ExecutionFlow::Continue)
    }

    // ==================== statements ====================

    fn handle_print<IO: RuntimeIo>(&mut self, io: &mut IO) -> VmResult<ExecutionFlow> {
        let value = self.pop()?;
        io.write_line(&value.to_string());
        Ok(ExecutionFlow::Continue)
    }
}
