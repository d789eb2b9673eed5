//! # Code generator
//!
//! Two passes over the resolved tree. Pass one walks top-level declarations
//! in the same order the resolver assigned global indices in, reserving a
//! chunk for every function and a global slot for every globals-block
//! variable and every function (functions are addressable global values so
//! their slot index lines up with `Binding::Global`, even though nothing in
//! this backend can call through one yet). Pass two walks each function body
//! emitting bytecode into its reserved chunk, tracking local variable slots
//! the way the resolver counted them and handing every jump to
//! `bytecode::patch_jump` for back-patching.

use crate::ast::nodes::*;
use crate::ast::types::Type;
use crate::bytecode::{self, OpCode};
use crate::compiler::error::CompileError;
use crate::value::{CompiledUnit, Value};

pub fn generate(storyworld: &Storyworld) -> Result<CompiledUnit, Vec<CompileError>> {
    crate::debug::log_codegen(&format!(
        "generating code for {} declarations",
        storyworld.declarations.len()
    ));
    let mut unit = CompiledUnit::new();
    let mut errors = Vec::new();

    for decl in &storyworld.declarations {
        match decl {
            Declaration::Globals(block) => {
                for var in &block.vars {
                    let value = literal_value(&var.initializer, &mut unit);
                    if let Err(msg) = unit.add_global(var.name.clone(), value) {
                        errors.push(CompileError::at_line(var.line, msg));
                    }
                }
            }
            Declaration::Function(f) => {
                let chunk_idx = unit.add_chunk(f.name.clone());
                f.chunk_index.set(Some(chunk_idx));
                if f.name == "main" {
                    unit.entry_chunk = Some(chunk_idx);
                }
                if let Err(msg) = unit.add_global(f.name.clone(), Value::Function(chunk_idx)) {
                    errors.push(CompileError::at_line(f.line, msg));
                }
            }
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    for decl in &storyworld.declarations {
        if let Declaration::Function(f) = decl {
            let chunk_idx = f
                .chunk_index
                .get()
                .expect("pass one reserved a chunk for every function");
            let mut function_gen = FunctionGen::new(&mut unit, chunk_idx);
            function_gen.compile_function(f, &mut errors);
        }
    }

    if errors.is_empty() {
        Ok(unit)
    } else {
        Err(errors)
    }
}

fn literal_value(expr: &Expr, unit: &mut CompiledUnit) -> Value {
    match expr {
        Expr::IntLiteral(v, _) => Value::Int(*v),
        Expr::FloatLiteral(v, _) => Value::Float(*v),
        Expr::BNumLiteral(v, _) => Value::Float(*v),
        Expr::BoolLiteral(v, _) => Value::Bool(*v),
        Expr::StringLiteral(s, _) => Value::Str(unit.interner.intern(s)),
        _ => unreachable!("semantic checker rejects non-literal global initializers"),
    }
}

/// The static type of an expression, recomputed on the fly. Only the code
/// generator needs this (to pick bnum-aware opcodes); the resolver only
/// tracks name bindings, not full expression types.
fn infer_type(expr: &Expr) -> Type {
    match expr {
        Expr::IntLiteral(..) => Type::Int,
        Expr::FloatLiteral(..) => Type::Float,
        Expr::BNumLiteral(..) => Type::BNum,
        Expr::BoolLiteral(..) => Type::Bool,
        Expr::StringLiteral(..) => Type::String,
        Expr::VarRef(v) => v.resolved_type.borrow().clone(),
        Expr::Assignment(a) => a.resolved_type.borrow().clone(),
        Expr::Call(c) => c.resolved_type.borrow().clone(),
        Expr::Binary(b) => match b.op {
            BinaryOp::Equal
            | BinaryOp::NotEqual
            | BinaryOp::Less
            | BinaryOp::LessEqual
            | BinaryOp::Greater
            | BinaryOp::GreaterEqual => Type::Bool,
            _ => {
                let lhs = infer_type(&b.left);
                if lhs.is_bnum() {
                    Type::BNum
                } else {
                    lhs
                }
            }
        },
        Expr::Unary(u) => match u.op {
            UnaryOp::Not => Type::Bool,
            _ => infer_type(&u.operand),
        },
        Expr::And(_) | Expr::Or(_) => Type::Bool,
        Expr::Blend(b) => infer_type(&b.x),
        Expr::TypeConversion(t) => match t.target {
            ConversionTarget::Int => Type::Int,
            ConversionTarget::Float => Type::Float,
            ConversionTarget::BNum => Type::BNum,
            ConversionTarget::String => Type::String,
        },
        Expr::BuiltInCall(_) => Type::Void,
    }
}

/// Thin wrapper keeping a chunk's code buffer and its parallel debug-info
/// line vector in lockstep as bytes are emitted.
struct Emitter<'u> {
    unit: &'u mut CompiledUnit,
    chunk_idx: u32,
}

impl<'u> Emitter<'u> {
    fn len(&self) -> usize {
        self.unit.chunk(self.chunk_idx).len()
    }

    fn write_u8(&mut self, byte: u8, line: usize) {
        self.unit.chunk_mut(self.chunk_idx).write_u8(byte);
        self.unit.debug.lines[self.chunk_idx as usize].push(line);
    }

    fn write_op(&mut self, op: OpCode, line: usize) {
        self.write_u8(op as u8, line);
    }

    fn write_u32_le(&mut self, value: u32, line: usize) {
        for byte in value.to_le_bytes() {
            self.write_u8(byte, line);
        }
    }

    /// Emits a short-form jump placeholder and returns its opcode address.
    fn emit_jump(&mut self, op: OpCode, line: usize) -> usize {
        let addr = self.len();
        self.write_op(op, line);
        self.write_u8(0, line);
        addr
    }

    /// Patches the jump at `opcode_addr` to land here, returning the number
    /// of bytes inserted (0 unless the offset needed upgrading to long form).
    fn patch_jump_here(&mut self, opcode_addr: usize) -> usize {
        let target = self.len();
        self.patch_jump_to(opcode_addr, target)
    }

    fn patch_jump_to(&mut self, opcode_addr: usize, target: usize) -> usize {
        let chunk = &mut self.unit.chunks[self.chunk_idx as usize];
        let lines = &mut self.unit.debug.lines[self.chunk_idx as usize];
        bytecode::patch_jump(chunk, lines, opcode_addr, target)
    }
}

struct LocalVar {
    name: String,
    depth: usize,
}

struct FunctionGen<'u> {
    emit: Emitter<'u>,
    locals: Vec<LocalVar>,
    scope_depth: usize,
}

impl<'u> FunctionGen<'u> {
    fn new(unit: &'u mut CompiledUnit, chunk_idx: u32) -> Self {
        FunctionGen {
            emit: Emitter { unit, chunk_idx },
            locals: Vec::new(),
            scope_depth: 0,
        }
    }

    fn compile_function(&mut self, f: &FunctionDecl, errors: &mut Vec<CompileError>) {
        self.scope_depth += 1;
        for p in &f.params {
            self.push_local(p.name.clone(), f.line, errors);
        }
        self.compile_block(&f.body, errors);
        self.end_scope(f.line);
        self.emit.write_op(OpCode::Return, f.line);
    }

    fn push_local(&mut self, name: String, line: usize, errors: &mut Vec<CompileError>) {
        if self.locals.len() >= 256 {
            errors.push(CompileError::at_line(
                line,
                "Too many local variables in one function.",
            ));
            return;
        }
        self.locals.push(LocalVar {
            name,
            depth: self.scope_depth,
        });
    }

    fn begin_scope(&mut self) {
        self.scope_depth += 1;
    }

    fn end_scope(&mut self, line: usize) {
        while let Some(local) = self.locals.last() {
            if local.depth < self.scope_depth {
                break;
            }
            self.locals.pop();
            self.emit.write_op(OpCode::Pop, line);
        }
        self.scope_depth -= 1;
    }

    fn compile_block(&mut self, block: &Block, errors: &mut Vec<CompileError>) {
        self.begin_scope();
        for stmt in &block.statements {
            self.compile_stmt(stmt, errors);
        }
        self.end_scope(block.line);
    }

    fn compile_stmt(&mut self, stmt: &Stmt, errors: &mut Vec<CompileError>) {
        match stmt {
            Stmt::VarDecl(v) => {
                self.compile_expr(&v.initializer, errors);
                self.push_local(v.name.clone(), v.line, errors);
            }
            Stmt::ExpressionStmt(e, line) => {
                self.compile_expr(e, errors);
                if !matches!(e, Expr::BuiltInCall(_)) {
                    self.emit.write_op(OpCode::Pop, *line);
                }
            }
            Stmt::Block(b) => self.compile_block(b, errors),
            Stmt::If(i) => self.compile_if(i, errors),
            Stmt::While(w) => self.compile_while(w, errors),
        }
    }

    fn compile_if(&mut self, stmt: &IfStmt, errors: &mut Vec<CompileError>) {
        self.compile_expr(&stmt.condition, errors);
        let then_skip = self.emit.emit_jump(OpCode::JumpIfFalse, stmt.line);
        stmt.then_skip_addr.set(Some(then_skip));
        self.compile_block(&stmt.then_branch, errors);

        match &stmt.else_branch {
            Some(else_branch) => {
                let end_skip = self.emit.emit_jump(OpCode::Jump, stmt.line);
                stmt.end_skip_addr.set(Some(end_skip));
                let shift = self.emit.patch_jump_here(then_skip);
                let end_skip = end_skip + shift;
                match else_branch {
                    ElseBranch::Block(b) => self.compile_block(b, errors),
                    ElseBranch::If(nested) => self.compile_if(nested, errors),
                }
                self.emit.patch_jump_here(end_skip);
            }
            None => {
                self.emit.patch_jump_here(then_skip);
            }
        }
    }

    fn compile_while(&mut self, stmt: &WhileStmt, errors: &mut Vec<CompileError>) {
        let loop_start = self.emit.len();
        stmt.loop_start.set(Some(loop_start));
        self.compile_expr(&stmt.condition, errors);
        let exit_jump = self.emit.emit_jump(OpCode::JumpIfFalse, stmt.line);
        stmt.exit_jump_addr.set(Some(exit_jump));
        self.compile_block(&stmt.body, errors);
        let back_jump = self.emit.emit_jump(OpCode::Jump, stmt.line);
        self.emit.patch_jump_to(back_jump, loop_start);
        self.emit.patch_jump_here(exit_jump);
    }

    fn compile_expr(&mut self, expr: &Expr, errors: &mut Vec<CompileError>) {
        match expr {
            Expr::IntLiteral(v, line) => self.emit_constant(Value::Int(*v), *line, errors),
            Expr::FloatLiteral(v, line) => self.emit_constant(Value::Float(*v), *line, errors),
            Expr::BNumLiteral(v, line) => self.emit_constant(Value::Float(*v), *line, errors),
            Expr::BoolLiteral(v, line) => {
                self.emit
                    .write_op(if *v { OpCode::True } else { OpCode::False }, *line);
            }
            Expr::StringLiteral(s, line) => {
                let handle = self.emit.unit.interner.intern(s);
                self.emit_constant(Value::Str(handle), *line, errors);
            }
            Expr::VarRef(v) => self.compile_binding_read(v.binding.get(), v.line, errors),
            Expr::Assignment(a) => {
                self.compile_expr(&a.value, errors);
                self.compile_binding_write(a.binding.get(), a.line, errors);
            }
            Expr::Call(c) => {
                errors.push(CompileError::diagnostic(
                    c.line,
                    &c.callee,
                    "function calls are not supported by this backend.",
                ));
            }
            Expr::Binary(b) => self.compile_binary(b, errors),
            Expr::Unary(u) => self.compile_unary(u, errors),
            Expr::And(s) => self.compile_and(s, errors),
            Expr::Or(s) => self.compile_or(s, errors),
            Expr::Blend(b) => {
                self.compile_expr(&b.x, errors);
                self.compile_expr(&b.y, errors);
                self.compile_expr(&b.weight, errors);
                self.emit.write_op(OpCode::Blend, b.line);
            }
            Expr::TypeConversion(t) => {
                self.compile_expr(&t.value, errors);
                if let Some(default) = &t.default {
                    self.compile_expr(default, errors);
                }
                let op = match t.target {
                    ConversionTarget::Int => OpCode::ToInt,
                    ConversionTarget::Float => OpCode::ToFloat,
                    ConversionTarget::BNum => OpCode::ToBNum,
                    ConversionTarget::String => OpCode::ToString,
                };
                self.emit.write_op(op, t.line);
            }
            Expr::BuiltInCall(c) => {
                for arg in &c.args {
                    self.compile_expr(arg, errors);
                }
                if c.name == "print" {
                    self.emit.write_op(OpCode::Print, c.line);
                } else {
                    errors.push(CompileError::diagnostic(
                        c.line,
                        &c.name,
                        format!("Unknown built-in '.{}'.", c.name),
                    ));
                }
            }
        }
    }

    fn compile_binding_read(&mut self, binding: Option<Binding>, line: usize, errors: &mut Vec<CompileError>) {
        match binding {
            Some(Binding::Local(slot)) => {
                self.emit.write_op(OpCode::ReadLocal, line);
                self.emit.write_u8(slot, line);
            }
            Some(Binding::Global(idx)) => {
                self.emit.write_op(OpCode::ReadGlobal, line);
                self.emit.write_u8(idx, line);
            }
            None => errors.push(CompileError::at_line(
                line,
                "Internal compiler error: variable reference was never resolved.",
            )),
        }
    }

    fn compile_binding_write(&mut self, binding: Option<Binding>, line: usize, errors: &mut Vec<CompileError>) {
        match binding {
            Some(Binding::Local(slot)) => {
                self.emit.write_op(OpCode::WriteLocal, line);
                self.emit.write_u8(slot, line);
            }
            Some(Binding::Global(idx)) => {
                self.emit.write_op(OpCode::WriteGlobal, line);
                self.emit.write_u8(idx, line);
            }
            None => errors.push(CompileError::at_line(
                line,
                "Internal compiler error: assignment target was never resolved.",
            )),
        }
    }

    fn compile_binary(&mut self, b: &Binary, errors: &mut Vec<CompileError>) {
        self.compile_expr(&b.left, errors);
        self.compile_expr(&b.right, errors);
        let bnum = infer_type(&b.left).is_bnum();
        let op = match b.op {
            BinaryOp::Add => {
                if bnum {
                    OpCode::AddBNum
                } else {
                    OpCode::Add
                }
            }
            BinaryOp::Subtract => {
                if bnum {
                    OpCode::SubtractBNum
                } else {
                    OpCode::Subtract
                }
            }
            BinaryOp::Multiply => OpCode::Multiply,
            BinaryOp::Divide => OpCode::Divide,
            BinaryOp::Power => OpCode::Power,
            BinaryOp::Equal => OpCode::Equal,
            BinaryOp::NotEqual => OpCode::NotEqual,
            BinaryOp::Less => OpCode::Less,
            BinaryOp::LessEqual => OpCode::LessEqual,
            BinaryOp::Greater => OpCode::Greater,
            BinaryOp::GreaterEqual => OpCode::GreaterEqual,
        };
        self.emit.write_op(op, b.line);
    }

    fn compile_unary(&mut self, u: &Unary, errors: &mut Vec<CompileError>) {
        self.compile_expr(&u.operand, errors);
        match u.op {
            UnaryOp::Plus => {}
            UnaryOp::Negate => self.emit.write_op(OpCode::Negate, u.line),
            UnaryOp::Not => self.emit.write_op(OpCode::Not, u.line),
        }
    }

    fn compile_and(&mut self, s: &ShortCircuit, errors: &mut Vec<CompileError>) {
        self.compile_expr(&s.left, errors);
        let jump = self.emit.emit_jump(OpCode::JumpIfFalseNoPop, s.line);
        s.jump_addr.set(Some(jump));
        self.emit.write_op(OpCode::Pop, s.line);
        self.compile_expr(&s.right, errors);
        self.emit.patch_jump_here(jump);
    }

    fn compile_or(&mut self, s: &ShortCircuit, errors: &mut Vec<CompileError>) {
        self.compile_expr(&s.left, errors);
        let jump = self.emit.emit_jump(OpCode::JumpIfTrueNoPop, s.line);
        s.jump_addr.set(Some(jump));
        self.emit.write_op(OpCode::Pop, s.line);
        self.compile_expr(&s.right, errors);
        self.emit.patch_jump_here(jump);
    }

    fn emit_constant(&mut self, value: Value, line: usize, errors: &mut Vec<CompileError>) {
        match self.emit.unit.add_constant(value) {
            Ok(idx) if idx <= u8::MAX as u32 => {
                self.emit.write_op(OpCode::Constant, line);
                self.emit.write_u8(idx as u8, line);
            }
            Ok(idx) => {
                self.emit.write_op(OpCode::ConstantLong, line);
                self.emit.write_u32_le(idx, line);
            }
            Err(msg) => errors.push(CompileError::at_line(line, msg)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lexer::Scanner;
    use crate::compiler::parser::parse;
    use crate::compiler::resolver;
    use crate::compiler::semantic;

    fn compiled(src: &str) -> CompiledUnit {
        let sw = parse(Scanner::tokenize_all(src)).expect("parse");
        semantic::check(&sw).expect("semantic check");
        resolver::resolve(&sw).expect("resolve");
        generate(&sw).expect("codegen")
    }

    #[test]
    fn emits_constant_and_return_for_trivial_main() {
        let unit = compiled("function main(): void var x: int = 1 end");
        let entry = unit.entry_chunk.unwrap();
        let chunk = unit.chunk(entry);
        assert_eq!(chunk.read_u8(0), OpCode::Constant as u8);
        assert!(chunk.code.contains(&(OpCode::Return as u8)));
    }

    #[test]
    fn rejects_function_calls() {
        let sw = parse(Scanner::tokenize_all(
            "function helper(): void end function main(): void helper() end",
        ))
        .unwrap();
        semantic::check(&sw).unwrap();
        resolver::resolve(&sw).unwrap();
        assert!(generate(&sw).is_err());
    }

    #[test]
    fn if_without_else_patches_forward_jump() {
        let unit = compiled(
            "function main(): void var b: bool = true if b then var y: int = 1 end end",
        );
        let entry = unit.entry_chunk.unwrap();
        let chunk = unit.chunk(entry);
        assert!(chunk.code.contains(&(OpCode::JumpIfFalse as u8)));
    }
}
