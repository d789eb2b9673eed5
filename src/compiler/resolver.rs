//! # Variable-type resolver
//!
//! Two-phase pass run after the semantic checker. Step A gathers every
//! top-level name (globals-block variables and functions) into a flat
//! symbol table together with the slot index codegen's pass one will give
//! it. Step B walks each function body with a scope-stack of locals,
//! annotating every `VarRef`, `Assignment`, and `FunctionCall` with its
//! resolved type and (for variables) its binding, local slot or global
//! index, via the `Cell`/`RefCell` fields those nodes carry, and applies
//! the operator typing rules (comparison/arithmetic/unary/blend/conversion)
//! to catch type errors before code generation ever runs.
//!
//! Global indices are assigned here in exactly the declaration order code
//! generation pass one uses (top-level declarations in order; each globals-
//! block variable and each function contributes one slot), so the index
//! recorded on a `Binding::Global` always matches the slot codegen gives
//! that name later.

use crate::ast::nodes::*;
use crate::ast::types::Type;
use crate::compiler::error::CompileError;
use std::collections::HashMap;

struct Local {
    name: String,
    depth: usize,
    ty: Type,
}

pub struct Resolver {
    globals: HashMap<String, (Type, u8)>,
    locals: Vec<Local>,
    depth: usize,
    errors: Vec<CompileError>,
}

pub fn resolve(storyworld: &Storyworld) -> Result<(), Vec<CompileError>> {
    let mut resolver = Resolver {
        globals: HashMap::new(),
        locals: Vec::new(),
        depth: 0,
        errors: Vec::new(),
    };
    resolver.collect_globals(storyworld);
    for decl in &storyworld.declarations {
        if let Declaration::Function(f) = decl {
            resolver.resolve_function(f);
        }
    }
    if resolver.errors.is_empty() {
        Ok(())
    } else {
        Err(resolver.errors)
    }
}

impl Resolver {
    fn collect_globals(&mut self, storyworld: &Storyworld) {
        let mut index: u8 = 0;
        for decl in &storyworld.declarations {
            match decl {
                Declaration::Globals(block) => {
                    for var in &block.vars {
                        self.globals
                            .insert(var.name.clone(), (var.declared_type.clone(), index));
                        index = index.saturating_add(1);
                    }
                }
                Declaration::Function(f) => {
                    let params = f.params.iter().map(|p| p.ty.clone()).collect();
                    let ty = Type::function(params, f.return_type.clone());
                    self.globals.insert(f.name.clone(), (ty, index));
                    index = index.saturating_add(1);
                }
            }
        }
    }

    fn resolve_function(&mut self, f: &FunctionDecl) {
        self.depth += 1;
        for p in &f.params {
            self.locals.push(Local {
                name: p.name.clone(),
                depth: self.depth,
                ty: p.ty.clone(),
            });
        }
        self.resolve_block(&f.body);
        self.locals.retain(|l| l.depth < self.depth);
        self.depth -= 1;
    }

    fn resolve_block(&mut self, block: &Block) {
        self.depth += 1;
        for stmt in &block.statements {
            self.resolve_stmt(stmt);
        }
        self.locals.retain(|l| l.depth < self.depth);
        self.depth -= 1;
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::VarDecl(v) => {
                let init_ty = self.resolve_expr(&v.initializer);
                if init_ty != Type::Invalid && v.declared_type != Type::Invalid && init_ty != v.declared_type
                {
                    self.errors.push(CompileError::diagnostic(
                        v.line,
                        &v.name,
                        format!(
                            "Cannot initialize '{}' of type {} with a value of type {}.",
                            v.name, v.declared_type, init_ty
                        ),
                    ));
                }
                self.locals.push(Local {
                    name: v.name.clone(),
                    depth: self.depth,
                    ty: v.declared_type.clone(),
                });
            }
            Stmt::ExpressionStmt(e, _) => {
                self.resolve_expr(e);
            }
            Stmt::Block(b) => self.resolve_block(b),
            Stmt::If(i) => self.resolve_if(i),
            Stmt::While(w) => {
                self.expect_bool_condition(&w.condition, w.line);
                self.resolve_block(&w.body);
            }
        }
    }

    fn resolve_if(&mut self, stmt: &IfStmt) {
        self.expect_bool_condition(&stmt.condition, stmt.line);
        self.resolve_block(&stmt.then_branch);
        match &stmt.else_branch {
            Some(ElseBranch::Block(b)) => self.resolve_block(b),
            Some(ElseBranch::If(nested)) => self.resolve_if(nested),
            None => {}
        }
    }

    fn expect_bool_condition(&mut self, condition: &Expr, line: usize) {
        let ty = self.resolve_expr(condition);
        if ty != Type::Invalid && ty != Type::Bool {
            self.errors.push(CompileError::diagnostic(
                line,
                "",
                format!("Condition must be bool, found {ty}."),
            ));
        }
    }

    fn lookup(&self, name: &str) -> Option<(Binding, Type)> {
        for (idx, local) in self.locals.iter().enumerate().rev() {
            if local.name == name {
                return Some((Binding::Local(idx as u8), local.ty.clone()));
            }
        }
        self.globals
            .get(name)
            .map(|(ty, idx)| (Binding::Global(*idx), ty.clone()))
    }

    /// Resolves bindings and checks operator typing rules in one walk,
    /// returning the expression's static type (`Type::Invalid` once an error
    /// has already been reported for it, so mismatches don't cascade).
    fn resolve_expr(&mut self, expr: &Expr) -> Type {
        match expr {
            Expr::IntLiteral(..) => Type::Int,
            Expr::FloatLiteral(..) => Type::Float,
            Expr::BNumLiteral(..) => Type::BNum,
            Expr::BoolLiteral(..) => Type::Bool,
            Expr::StringLiteral(..) => Type::String,
            Expr::VarRef(v) => match self.lookup(&v.name) {
                Some((binding, ty)) => {
                    v.binding.set(Some(binding));
                    *v.resolved_type.borrow_mut() = ty.clone();
                    ty
                }
                None => {
                    self.undefined(v.line, &v.name);
                    Type::Invalid
                }
            },
            Expr::Assignment(a) => {
                let value_ty = self.resolve_expr(&a.value);
                match self.lookup(&a.name) {
                    Some((binding, ty)) => {
                        a.binding.set(Some(binding));
                        if value_ty != Type::Invalid && ty != Type::Invalid && value_ty != ty {
                            self.errors.push(CompileError::diagnostic(
                                a.line,
                                &a.name,
                                format!(
                                    "Cannot assign a value of type {value_ty} to '{}' of type {ty}.",
                                    a.name
                                ),
                            ));
                        }
                        *a.resolved_type.borrow_mut() = ty.clone();
                        ty
                    }
                    None => {
                        self.undefined(a.line, &a.name);
                        Type::Invalid
                    }
                }
            }
            Expr::Call(c) => self.resolve_call(c),
            Expr::Binary(b) => self.resolve_binary(b),
            Expr::Unary(u) => self.resolve_unary(u),
            Expr::And(s) | Expr::Or(s) => {
                self.expect_bool_condition(&s.left, s.line);
                self.expect_bool_condition(&s.right, s.line);
                Type::Bool
            }
            Expr::Blend(b) => {
                self.resolve_expr(&b.x);
                self.resolve_expr(&b.y);
                let weight_ty = self.resolve_expr(&b.weight);
                if weight_ty != Type::Invalid && weight_ty != Type::BNum {
                    self.errors.push(CompileError::diagnostic(
                        b.line,
                        "",
                        format!("Blend weight must be bnum, found {weight_ty}."),
                    ));
                }
                Type::BNum
            }
            Expr::TypeConversion(t) => {
                self.resolve_expr(&t.value);
                if let Some(d) = &t.default {
                    self.resolve_expr(d);
                }
                match t.target {
                    ConversionTarget::Int => Type::Int,
                    ConversionTarget::Float => Type::Float,
                    ConversionTarget::BNum => Type::BNum,
                    ConversionTarget::String => Type::String,
                }
            }
            Expr::BuiltInCall(c) => {
                for arg in &c.args {
                    self.resolve_expr(arg);
                }
                Type::Void
            }
        }
    }

    fn resolve_call(&mut self, c: &FunctionCall) -> Type {
        let arg_types: Vec<Type> = c.args.iter().map(|a| self.resolve_expr(a)).collect();
        let Some((ty, _)) = self.globals.get(&c.callee).cloned() else {
            self.undefined(c.line, &c.callee);
            return Type::Invalid;
        };
        let Type::Function { params, returns } = &ty else {
            self.errors.push(CompileError::diagnostic(
                c.line,
                &c.callee,
                format!("'{}' is not a function.", c.callee),
            ));
            return Type::Invalid;
        };
        if params.len() != arg_types.len() {
            self.errors.push(CompileError::diagnostic(
                c.line,
                &c.callee,
                format!(
                    "'{}' expects {} argument(s), found {}.",
                    c.callee,
                    params.len(),
                    arg_types.len()
                ),
            ));
        } else {
            for (param_ty, arg_ty) in params.iter().zip(arg_types.iter()) {
                if *arg_ty != Type::Invalid && param_ty != arg_ty {
                    self.errors.push(CompileError::diagnostic(
                        c.line,
                        &c.callee,
                        format!("Argument type {arg_ty} does not match parameter type {param_ty}."),
                    ));
                }
            }
        }
        let return_ty = (**returns).clone();
        *c.resolved_type.borrow_mut() = return_ty.clone();
        return_ty
    }

    fn resolve_binary(&mut self, b: &Binary) -> Type {
        let left_ty = self.resolve_expr(&b.left);
        let right_ty = self.resolve_expr(&b.right);
        if left_ty == Type::Invalid || right_ty == Type::Invalid {
            return Type::Invalid;
        }
        match b.op {
            BinaryOp::Equal
            | BinaryOp::NotEqual
            | BinaryOp::Less
            | BinaryOp::LessEqual
            | BinaryOp::Greater
            | BinaryOp::GreaterEqual => {
                let comparable = (left_ty.is_numeric() && right_ty.is_numeric()) || left_ty == right_ty;
                if !comparable {
                    self.errors.push(CompileError::diagnostic(
                        b.line,
                        "",
                        format!("Cannot compare {left_ty} and {right_ty}."),
                    ));
                }
                Type::Bool
            }
            BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply => {
                self.arithmetic_result(&left_ty, &right_ty, b.line)
            }
            BinaryOp::Divide | BinaryOp::Power => {
                if !left_ty.is_numeric() || !right_ty.is_numeric() {
                    self.errors.push(CompileError::diagnostic(
                        b.line,
                        "",
                        format!("'/' and '^' require numeric operands, found {left_ty} and {right_ty}."),
                    ));
                    return Type::Invalid;
                }
                Type::Float
            }
        }
    }

    /// Implements the LHS-driven arithmetic typing rule: `String` if the
    /// left side is a string, `BNum` if it's bnum, `Int` if both sides are
    /// int, `Float` otherwise.
    fn arithmetic_result(&mut self, left_ty: &Type, right_ty: &Type, line: usize) -> Type {
        if *left_ty == Type::String {
            if *right_ty != Type::String {
                self.errors.push(CompileError::diagnostic(
                    line,
                    "",
                    format!("Cannot apply this operator between string and {right_ty}."),
                ));
                return Type::Invalid;
            }
            return Type::String;
        }
        if !left_ty.is_numeric() {
            self.errors.push(CompileError::diagnostic(
                line,
                "",
                format!("Left operand must be numeric or string, found {left_ty}."),
            ));
            return Type::Invalid;
        }
        if !right_ty.is_numeric() {
            self.errors.push(CompileError::diagnostic(
                line,
                "",
                format!("Right operand must be numeric, found {right_ty}."),
            ));
            return Type::Invalid;
        }
        if left_ty.is_bnum() {
            Type::BNum
        } else if *left_ty == Type::Int && *right_ty == Type::Int {
            Type::Int
        } else {
            Type::Float
        }
    }

    fn resolve_unary(&mut self, u: &Unary) -> Type {
        let operand_ty = self.resolve_expr(&u.operand);
        if operand_ty == Type::Invalid {
            return Type::Invalid;
        }
        match u.op {
            UnaryOp::Plus | UnaryOp::Negate => {
                if !operand_ty.is_numeric() {
                    self.errors.push(CompileError::diagnostic(
                        u.line,
                        "",
                        format!("Unary '+'/'-' require a numeric operand, found {operand_ty}."),
                    ));
                    return Type::Invalid;
                }
                operand_ty
            }
            UnaryOp::Not => {
                if operand_ty != Type::Bool {
                    self.errors.push(CompileError::diagnostic(
                        u.line,
                        "",
                        format!("'not' requires a bool operand, found {operand_ty}."),
                    ));
                }
                Type::Bool
            }
        }
    }

    fn undefined(&mut self, line: usize, name: &str) {
        self.errors.push(CompileError::diagnostic(
            line,
            name,
            format!("Undefined name '{name}'."),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lexer::Scanner;
    use crate::compiler::parser::parse;

    #[test]
    fn resolves_global_and_local() {
        let sw = parse(Scanner::tokenize_all(
            "globals g: int = 1 end function main(): void var l: int = 2 .print(g + l) end",
        ))
        .unwrap();
        assert!(resolve(&sw).is_ok());
    }

    #[test]
    fn reports_undefined_variable() {
        let sw = parse(Scanner::tokenize_all(
            "function main(): void .print(missing) end",
        ))
        .unwrap();
        assert!(resolve(&sw).is_err());
    }

    #[test]
    fn rejects_mismatched_var_initializer() {
        let sw = parse(Scanner::tokenize_all(
            "function main(): void var x: int = \"oops\" end",
        ))
        .unwrap();
        assert!(resolve(&sw).is_err());
    }

    #[test]
    fn rejects_non_bool_if_condition() {
        let sw = parse(Scanner::tokenize_all(
            "function main(): void if 1 then .print(1) end end",
        ))
        .unwrap();
        assert!(resolve(&sw).is_err());
    }

    #[test]
    fn bnum_addition_stays_bnum() {
        let sw = parse(Scanner::tokenize_all(
            "globals w: bnum = 0.5b end function main(): void var y: bnum = w + w end",
        ))
        .unwrap();
        assert!(resolve(&sw).is_ok());
    }
}
