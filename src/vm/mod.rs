//! # Virtual machine
//!
//! A fetch-decode-execute loop over a [`CompiledUnit`]'s entry chunk. The
//! data stack and the frame stack are both owned by the `Vm` instance; the
//! compiled unit is borrowed read-only except for the globals slice, which
//! global writes mutate in place. Stack underflow and any other state a
//! correct code generator can never produce are reported as
//! [`InternalError`], distinct from the [`RuntimeError`] a malformed runtime
//! value (e.g. a `to_int` default of the wrong type) produces.

use crate::bytecode::OpCode;
use crate::compiler::error::{InternalError, RuntimeError};
use crate::value::{CompiledUnit, StringHandle, Value};
use std::io::Write;

/// Anything that can stop execution: a VM-level fault in the source
/// program, or a bug in this crate's own code generator.
#[derive(Debug)]
pub enum ExecError {
    Runtime(RuntimeError),
    Internal(InternalError),
}

impl From<RuntimeError> for ExecError {
    fn from(e: RuntimeError) -> Self {
        ExecError::Runtime(e)
    }
}

impl From<InternalError> for ExecError {
    fn from(e: InternalError) -> Self {
        ExecError::Internal(e)
    }
}

impl std::fmt::Display for ExecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecError::Runtime(e) => write!(f, "{e}"),
            ExecError::Internal(e) => write!(f, "{e}"),
        }
    }
}

/// One active function activation. `base` is the data-stack index its
/// locals start at, giving each frame a local view of the stack where
/// `at(0)` is always its first local regardless of how deep the data
/// stack is.
struct Frame {
    chunk: u32,
    ip: usize,
    base: usize,
}

pub struct Vm<'u> {
    unit: &'u mut CompiledUnit,
    stack: Vec<Value>,
    frames: Vec<Frame>,
    out: &'u mut dyn Write,
}

/// Runs the unit's entry chunk to completion, writing `print` output to
/// `out`. Returns the process exit status this execution implies: always 0
/// on a normal `RETURN` from the entry function, since the language has no
/// other way to communicate a status.
pub fn run(unit: &mut CompiledUnit, out: &mut dyn Write) -> Result<i32, ExecError> {
    let entry = unit
        .entry_chunk
        .ok_or_else(|| InternalError::new("compiled unit has no entry chunk"))?;
    let mut vm = Vm {
        unit,
        stack: Vec::new(),
        frames: vec![Frame {
            chunk: entry,
            ip: 0,
            base: 0,
        }],
        out,
    };
    vm.run_loop()
}

impl<'u> Vm<'u> {
    fn run_loop(&mut self) -> Result<i32, ExecError> {
        loop {
            let (chunk_idx, ip) = {
                let frame = self.frames.last().expect("at least one frame while running");
                (frame.chunk, frame.ip)
            };
            let byte = self.unit.chunk(chunk_idx).read_u8(ip);
            let op = OpCode::from_u8(byte)
                .ok_or_else(|| InternalError::new(format!("unknown opcode byte {byte}")))?;

            match op {
                OpCode::Nop => self.advance(1),
                OpCode::Constant => {
                    let idx = self.unit.chunk(chunk_idx).read_u8(ip + 1) as usize;
                    self.push(self.unit.constants[idx].clone());
                    self.advance(2);
                }
                OpCode::ConstantLong => {
                    let idx = self.unit.chunk(chunk_idx).read_u32_le(ip + 1) as usize;
                    self.push(self.unit.constants[idx].clone());
                    self.advance(5);
                }
                OpCode::True => {
                    self.push(Value::Bool(true));
                    self.advance(1);
                }
                OpCode::False => {
                    self.push(Value::Bool(false));
                    self.advance(1);
                }
                OpCode::Pop => {
                    self.pop()?;
                    self.advance(1);
                }
                OpCode::Equal => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(Value::Bool(a == b));
                    self.advance(1);
                }
                OpCode::NotEqual => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(Value::Bool(a != b));
                    self.advance(1);
                }
                OpCode::Greater | OpCode::GreaterEqual | OpCode::Less | OpCode::LessEqual => {
                    self.compare(op, ip)?;
                    self.advance(1);
                }
                OpCode::Add => {
                    self.add(ip)?;
                    self.advance(1);
                }
                OpCode::Subtract => {
                    self.arithmetic(op, ip)?;
                    self.advance(1);
                }
                OpCode::Multiply | OpCode::Divide | OpCode::Power => {
                    self.arithmetic(op, ip)?;
                    self.advance(1);
                }
                OpCode::AddBNum | OpCode::SubtractBNum => {
                    self.bnum_arithmetic(op, ip)?;
                    self.advance(1);
                }
                OpCode::Blend => {
                    self.blend(ip)?;
                    self.advance(1);
                }
                OpCode::Jump => {
                    let off = self.unit.chunk(chunk_idx).read_i8(ip + 1) as i64;
                    self.jump_to(ip as i64 + 2 + off);
                }
                OpCode::JumpLong => {
                    let off = self.unit.chunk(chunk_idx).read_i32_le(ip + 1) as i64;
                    self.jump_to(ip as i64 + 5 + off);
                }
                OpCode::JumpIfFalse => {
                    let cond = self.pop()?;
                    let off = self.unit.chunk(chunk_idx).read_i8(ip + 1) as i64;
                    if !self.truthy(&cond, ip)? {
                        self.jump_to(ip as i64 + 2 + off);
                    } else {
                        self.advance(2);
                    }
                }
                OpCode::JumpIfFalseLong => {
                    let cond = self.pop()?;
                    let off = self.unit.chunk(chunk_idx).read_i32_le(ip + 1) as i64;
                    if !self.truthy(&cond, ip)? {
                        self.jump_to(ip as i64 + 5 + off);
                    } else {
                        self.advance(5);
                    }
                }
                OpCode::JumpIfFalseNoPop => {
                    let cond = self.peek(0)?;
                    let off = self.unit.chunk(chunk_idx).read_i8(ip + 1) as i64;
                    if !self.truthy(cond, ip)? {
                        self.jump_to(ip as i64 + 2 + off);
                    } else {
                        self.advance(2);
                    }
                }
                OpCode::JumpIfFalseNoPopLong => {
                    let cond = self.peek(0)?;
                    let off = self.unit.chunk(chunk_idx).read_i32_le(ip + 1) as i64;
                    if !self.truthy(cond, ip)? {
                        self.jump_to(ip as i64 + 5 + off);
                    } else {
                        self.advance(5);
                    }
                }
                OpCode::JumpIfTrueNoPop => {
                    let cond = self.peek(0)?;
                    let off = self.unit.chunk(chunk_idx).read_i8(ip + 1) as i64;
                    if self.truthy(cond, ip)? {
                        self.jump_to(ip as i64 + 2 + off);
                    } else {
                        self.advance(2);
                    }
                }
                OpCode::JumpIfTrueNoPopLong => {
                    let cond = self.peek(0)?;
                    let off = self.unit.chunk(chunk_idx).read_i32_le(ip + 1) as i64;
                    if self.truthy(cond, ip)? {
                        self.jump_to(ip as i64 + 5 + off);
                    } else {
                        self.advance(5);
                    }
                }
                OpCode::Not => {
                    let v = self.pop()?;
                    let b = match v {
                        Value::Bool(b) => b,
                        other => {
                            return Err(self.runtime_error(ip, format!("'not' expects bool, found {}", other.type_name())).into())
                        }
                    };
                    self.push(Value::Bool(!b));
                    self.advance(1);
                }
                OpCode::Negate => {
                    let v = self.pop()?;
                    let result = match v {
                        Value::Int(i) => Value::Int(-i),
                        Value::Float(f) => Value::Float(-f),
                        other => {
                            return Err(self
                                .runtime_error(ip, format!("negation expects a number, found {}", other.type_name()))
                                .into())
                        }
                    };
                    self.push(result);
                    self.advance(1);
                }
                OpCode::ToInt => {
                    self.to_int(ip)?;
                    self.advance(1);
                }
                OpCode::ToFloat => {
                    self.to_float(ip)?;
                    self.advance(1);
                }
                OpCode::ToBNum => {
                    self.to_bnum(ip)?;
                    self.advance(1);
                }
                OpCode::ToString => {
                    self.to_string_op();
                    self.advance(1);
                }
                OpCode::Print => {
                    let v = self.pop()?;
                    let text = self.display(&v);
                    writeln!(self.out, "{text}").map_err(|e| {
                        ExecError::Internal(InternalError::new(format!("print failed: {e}")))
                    })?;
                    self.advance(1);
                }
                OpCode::ReadGlobal => {
                    let idx = self.unit.chunk(chunk_idx).read_u8(ip + 1) as usize;
                    self.push(self.unit.globals[idx].clone());
                    self.advance(2);
                }
                OpCode::WriteGlobal => {
                    let idx = self.unit.chunk(chunk_idx).read_u8(ip + 1) as usize;
                    let v = self.peek(0)?.clone();
                    self.unit.globals[idx] = v;
                    self.advance(2);
                }
                OpCode::ReadLocal => {
                    let slot = self.unit.chunk(chunk_idx).read_u8(ip + 1) as usize;
                    let base = self.frames.last().unwrap().base;
                    self.push(self.stack[base + slot].clone());
                    self.advance(2);
                }
                OpCode::WriteLocal => {
                    let slot = self.unit.chunk(chunk_idx).read_u8(ip + 1) as usize;
                    let base = self.frames.last().unwrap().base;
                    let v = self.peek(0)?.clone();
                    self.stack[base + slot] = v;
                    self.advance(2);
                }
                OpCode::Return => {
                    self.frames.pop();
                    if self.frames.is_empty() {
                        return Ok(0);
                    }
                    self.advance(1);
                }
            }
        }
    }

    fn advance(&mut self, n: usize) {
        self.frames.last_mut().unwrap().ip += n;
    }

    fn jump_to(&mut self, target: i64) {
        self.frames.last_mut().unwrap().ip = target as usize;
    }

    fn push(&mut self, v: Value) {
        self.stack.push(v);
    }

    fn pop(&mut self) -> Result<Value, InternalError> {
        self.stack
            .pop()
            .ok_or_else(|| InternalError::new("data stack underflow"))
    }

    fn peek(&self, distance_from_top: usize) -> Result<&Value, InternalError> {
        let len = self.stack.len();
        if distance_from_top >= len {
            return Err(InternalError::new("data stack underflow on peek"));
        }
        Ok(&self.stack[len - 1 - distance_from_top])
    }

    fn current_line(&self, ip: usize) -> usize {
        let frame = self.frames.last().unwrap();
        self.unit.debug.line_at(frame.chunk, ip)
    }

    fn runtime_error(&self, ip: usize, message: impl Into<String>) -> RuntimeError {
        RuntimeError::new(self.current_line(ip), message)
    }

    fn truthy(&self, v: &Value, ip: usize) -> Result<bool, ExecError> {
        match v {
            Value::Bool(b) => Ok(*b),
            other => Err(self
                .runtime_error(ip, format!("expected bool, found {}", other.type_name()))
                .into()),
        }
    }

    fn intern(&mut self, s: &str) -> StringHandle {
        self.unit.interner.intern(s)
    }

    fn resolve_str(&self, handle: StringHandle) -> &str {
        self.unit.interner.resolve(handle)
    }

    fn add(&mut self, ip: usize) -> Result<(), ExecError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let result = match (&a, &b) {
            (Value::Str(x), Value::Str(y)) => {
                let joined = format!("{}{}", self.resolve_str(*x), self.resolve_str(*y));
                Value::Str(self.intern(&joined))
            }
            (Value::Int(x), Value::Int(y)) => Value::Int(x + y),
            _ => {
                let (x, y) = (self.as_f64(&a, ip)?, self.as_f64(&b, ip)?);
                Value::Float(x + y)
            }
        };
        self.push(result);
        Ok(())
    }

    fn arithmetic(&mut self, op: OpCode, ip: usize) -> Result<(), ExecError> {
        let b = self.pop()?;
        let a = self.pop()?;
        if let (Value::Int(x), Value::Int(y)) = (&a, &b) {
            if let Some(result) = self.int_op(op, *x, *y) {
                self.push(result);
                return Ok(());
            }
        }
        let x = self.as_f64(&a, ip)?;
        let y = self.as_f64(&b, ip)?;
        let result = match op {
            OpCode::Subtract => x - y,
            OpCode::Multiply => x * y,
            OpCode::Divide => x / y,
            OpCode::Power => x.powf(y),
            _ => unreachable!("arithmetic() only handles -,*,/,^"),
        };
        self.push(Value::Float(result));
        Ok(())
    }

    fn int_op(&self, op: OpCode, x: i64, y: i64) -> Option<Value> {
        match op {
            OpCode::Subtract => Some(Value::Int(x - y)),
            OpCode::Multiply => Some(Value::Int(x * y)),
            // Division and exponentiation always yield float, per the typing rule.
            _ => None,
        }
    }

    fn as_f64(&self, v: &Value, ip: usize) -> Result<f64, ExecError> {
        match v {
            Value::Int(i) => Ok(*i as f64),
            Value::Float(f) => Ok(*f),
            other => Err(self
                .runtime_error(ip, format!("expected a number, found {}", other.type_name()))
                .into()),
        }
    }

    fn compare(&mut self, op: OpCode, ip: usize) -> Result<(), ExecError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let ordering = match (&a, &b) {
            (Value::Str(x), Value::Str(y)) => self.resolve_str(*x).cmp(self.resolve_str(*y)),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            _ => {
                let x = self.as_f64(&a, ip)?;
                let y = self.as_f64(&b, ip)?;
                x.partial_cmp(&y)
                    .ok_or_else(|| self.runtime_error(ip, "comparison produced NaN"))?
            }
        };
        let result = match op {
            OpCode::Greater => ordering.is_gt(),
            OpCode::GreaterEqual => ordering.is_ge(),
            OpCode::Less => ordering.is_lt(),
            OpCode::LessEqual => ordering.is_le(),
            _ => unreachable!("compare() only handles ordering opcodes"),
        };
        self.push(Value::Bool(result));
        Ok(())
    }

    /// Bounded-number arithmetic: leaves `(0,1)`/`(-1,1)` by mapping into
    /// unbounded space, performing ordinary arithmetic, then mapping back.
    fn bnum_arithmetic(&mut self, op: OpCode, ip: usize) -> Result<(), ExecError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let x = self.as_f64(&a, ip)?;
        let y = self.as_f64(&b, ip)?;
        let ux = inverse_bounded_transform(x);
        let uy = inverse_bounded_transform(y);
        let u = match op {
            OpCode::AddBNum => ux + uy,
            OpCode::SubtractBNum => ux - uy,
            _ => unreachable!("bnum_arithmetic() only handles ADD_BNUM/SUBTRACT_BNUM"),
        };
        self.push(Value::Float(bounded_transform(u)));
        Ok(())
    }

    fn blend(&mut self, ip: usize) -> Result<(), ExecError> {
        let weight = self.pop()?;
        let y = self.pop()?;
        let x = self.pop()?;
        let w = self.as_f64(&weight, ip)?;
        let y = self.as_f64(&y, ip)?;
        let x = self.as_f64(&x, ip)?;
        let w_prime = 1.0 - (1.0 - w) / 2.0;
        self.push(Value::Float(y * w_prime + x * (1.0 - w_prime)));
        Ok(())
    }

    fn to_int(&mut self, ip: usize) -> Result<(), ExecError> {
        let default = self.pop()?;
        let value = self.pop()?;
        let default = match default {
            Value::Int(i) => i,
            other => {
                return Err(self
                    .runtime_error(ip, format!("to_int default must be int, found {}", other.type_name()))
                    .into())
            }
        };
        let result = match value {
            Value::Int(i) => i,
            Value::Float(f) => f.trunc() as i64,
            Value::Bool(b) => i64::from(b),
            Value::Str(s) => self.resolve_str(s).parse::<i64>().unwrap_or(default),
            Value::Function(_) => default,
        };
        self.push(Value::Int(result));
        Ok(())
    }

    fn to_float(&mut self, ip: usize) -> Result<(), ExecError> {
        let default = self.pop()?;
        let value = self.pop()?;
        let default = match default {
            Value::Float(f) => f,
            other => {
                return Err(self
                    .runtime_error(ip, format!("to_float default must be float, found {}", other.type_name()))
                    .into())
            }
        };
        let result = match value {
            Value::Float(f) => f,
            Value::Int(i) => i as f64,
            Value::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Str(s) => self.resolve_str(s).parse::<f64>().unwrap_or(default),
            Value::Function(_) => default,
        };
        self.push(Value::Float(result));
        Ok(())
    }

    fn to_bnum(&mut self, ip: usize) -> Result<(), ExecError> {
        let default = self.pop()?;
        let value = self.pop()?;
        let default = match default {
            Value::Float(f) => f,
            other => {
                return Err(self
                    .runtime_error(ip, format!("to_bnum default must be float, found {}", other.type_name()))
                    .into())
            }
        };
        let in_range = |v: f64| v > 0.0 && v < 1.0;
        let result = match value {
            Value::Float(f) if in_range(f) => f,
            Value::Str(s) => self
                .resolve_str(s)
                .parse::<f64>()
                .ok()
                .filter(|v| in_range(*v))
                .unwrap_or(default),
            _ => default,
        };
        self.push(Value::Float(result));
        Ok(())
    }

    fn to_string_op(&mut self) {
        let value = self.pop().expect("to_string operand must be present");
        let text = self.display(&value);
        let handle = self.intern(&text);
        self.push(Value::Str(handle));
    }

    fn display(&self, v: &Value) -> String {
        match v {
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format!("{f}"),
            Value::Bool(b) => b.to_string(),
            Value::Str(s) => self.resolve_str(*s).to_string(),
            Value::Function(idx) => format!("<function {idx}>"),
        }
    }
}

fn inverse_bounded_transform(b: f64) -> f64 {
    if b > 0.0 {
        1.0 / (1.0 - b) - 1.0
    } else {
        1.0 - 1.0 / (1.0 + b)
    }
}

fn bounded_transform(u: f64) -> f64 {
    if u > 0.0 {
        1.0 - 1.0 / (1.0 + u)
    } else {
        1.0 / (1.0 - u) - 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen;
    use crate::compiler::lexer::Scanner;
    use crate::compiler::parser::parse;
    use crate::compiler::resolver;
    use crate::compiler::semantic;

    fn run_source(src: &str) -> String {
        let sw = parse(Scanner::tokenize_all(src)).expect("parse");
        semantic::check(&sw).expect("semantic check");
        resolver::resolve(&sw).expect("resolve");
        let mut unit = codegen::generate(&sw).expect("codegen");
        let mut out = Vec::new();
        run(&mut unit, &mut out).expect("run");
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn prints_arithmetic_result() {
        assert_eq!(run_source("function main(): void .print(1+2) end"), "3\n");
    }

    #[test]
    fn concatenates_strings() {
        assert_eq!(
            run_source("function main(): void .print(\"hi\" + \" there\") end"),
            "hi there\n"
        );
    }

    #[test]
    fn mutates_global_and_prints_it() {
        assert_eq!(
            run_source("globals x: int = 10 end function main(): void x = x + 5 .print(x) end"),
            "15\n"
        );
    }

    #[test]
    fn if_else_picks_true_branch() {
        assert_eq!(
            run_source("function main(): void if 1<2 then .print(\"y\") else .print(\"n\") end end"),
            "y\n"
        );
    }

    #[test]
    fn while_loop_counts_up() {
        assert_eq!(
            run_source(
                "function main(): void do var i: int = 0 while i<3 do .print(i) i = i+1 end end end"
            ),
            "0\n1\n2\n"
        );
    }

    #[test]
    fn bounded_transform_round_trips() {
        let b = 0.4;
        let u = inverse_bounded_transform(b);
        assert!((bounded_transform(u) - b).abs() < 1e-9);
    }
}
