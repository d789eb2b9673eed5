//! # AST nodes
//!
//! A closed, tagged node family for the Romualdo storyworld language. Every
//! node carries a source line so diagnostics can always point back at the
//! program text. Nodes that the code generator must patch after the fact
//! (jump targets, resolved bindings, resolved types) hold that state in a
//! `Cell`/`RefCell` so the resolver and code generator can mutate the tree
//! in place during their respective walks rather than rebuilding it.

use crate::ast::types::Type;
use std::cell::{Cell, RefCell};

/// The root of a compiled program: an ordered list of top-level declarations.
#[derive(Debug)]
pub struct Storyworld {
    pub declarations: Vec<Declaration>,
}

#[derive(Debug)]
pub enum Declaration {
    Globals(GlobalsBlock),
    Function(FunctionDecl),
}

#[derive(Debug)]
pub struct GlobalsBlock {
    pub vars: Vec<VarDecl>,
    pub line: usize,
}

#[derive(Debug)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Type,
    pub body: Block,
    pub line: usize,
    /// Filled in by code generation pass one.
    pub chunk_index: Cell<Option<u32>>,
}

#[derive(Debug)]
pub struct VarDecl {
    pub name: String,
    pub declared_type: Type,
    pub initializer: Expr,
    pub line: usize,
}

#[derive(Debug)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub line: usize,
}

#[derive(Debug)]
pub enum Stmt {
    VarDecl(VarDecl),
    ExpressionStmt(Expr, usize),
    Block(Block),
    If(IfStmt),
    While(WhileStmt),
}

#[derive(Debug)]
pub struct IfStmt {
    pub condition: Expr,
    pub then_branch: Block,
    pub else_branch: Option<ElseBranch>,
    pub line: usize,
    /// Placeholder address of the `JUMP_IF_FALSE` emitted after the condition.
    pub then_skip_addr: Cell<Option<usize>>,
    /// Placeholder address of the unconditional `JUMP` emitted before `else`.
    pub end_skip_addr: Cell<Option<usize>>,
}

#[derive(Debug)]
pub enum ElseBranch {
    Block(Block),
    If(Box<IfStmt>),
}

#[derive(Debug)]
pub struct WhileStmt {
    pub condition: Expr,
    pub body: Block,
    pub line: usize,
    /// Byte address the backward jump returns to; recorded on Enter.
    pub loop_start: Cell<Option<usize>>,
    /// Placeholder address of the `JUMP_IF_FALSE` that exits the loop.
    pub exit_jump_addr: Cell<Option<usize>>,
}

/// Where a name resolved to: a frame-relative local slot or a globals-list
/// index. Filled in by the variable-type resolver, read back by codegen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Local(u8),
    Global(u8),
}

#[derive(Debug)]
pub struct VarRef {
    pub name: String,
    pub line: usize,
    pub resolved_type: RefCell<Type>,
    pub binding: Cell<Option<Binding>>,
}

#[derive(Debug)]
pub struct Assignment {
    pub name: String,
    pub value: Box<Expr>,
    pub line: usize,
    pub resolved_type: RefCell<Type>,
    pub binding: Cell<Option<Binding>>,
}

/// A call to a user-defined function, e.g. `foo(1, 2)`. The resolver
/// resolves `callee` to its function type the same way it resolves a
/// `VarRef`; the code generator has no emission rule for this node (see
/// `DESIGN.md`) and rejects it with a diagnostic instead of miscompiling.
#[derive(Debug)]
pub struct FunctionCall {
    pub callee: String,
    pub args: Vec<Expr>,
    pub line: usize,
    pub resolved_type: RefCell<Type>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

#[derive(Debug)]
pub struct Binary {
    pub op: BinaryOp,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Negate,
    Not,
}

#[derive(Debug)]
pub struct Unary {
    pub op: UnaryOp,
    pub operand: Box<Expr>,
    pub line: usize,
}

/// Short-circuiting `and`/`or`. The jump address is recorded after the LHS
/// is emitted and patched once the RHS has been emitted.
#[derive(Debug)]
pub struct ShortCircuit {
    pub left: Box<Expr>,
    pub right: Box<Expr>,
    pub line: usize,
    pub jump_addr: Cell<Option<usize>>,
}

#[derive(Debug)]
pub struct Blend {
    pub x: Box<Expr>,
    pub y: Box<Expr>,
    pub weight: Box<Expr>,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionTarget {
    Int,
    Float,
    BNum,
    String,
}

#[derive(Debug)]
pub struct TypeConversion {
    pub target: ConversionTarget,
    pub value: Box<Expr>,
    /// Absent only for `string(...)`, which takes no default.
    pub default: Option<Box<Expr>>,
    pub line: usize,
}

/// The only built-in callable form recognized by the grammar: `.print(...)`.
#[derive(Debug)]
pub struct BuiltInCall {
    pub name: String,
    pub args: Vec<Expr>,
    pub line: usize,
}

#[derive(Debug)]
pub enum Expr {
    IntLiteral(i64, usize),
    FloatLiteral(f64, usize),
    BNumLiteral(f64, usize),
    BoolLiteral(bool, usize),
    StringLiteral(String, usize),
    VarRef(VarRef),
    Assignment(Assignment),
    Call(FunctionCall),
    Binary(Binary),
    Unary(Unary),
    And(ShortCircuit),
    Or(ShortCircuit),
    Blend(Blend),
    TypeConversion(TypeConversion),
    BuiltInCall(BuiltInCall),
}

impl Expr {
    pub fn line(&self) -> usize {
        match self {
            Expr::IntLiteral(_, l)
            | Expr::FloatLiteral(_, l)
            | Expr::BNumLiteral(_, l)
            | Expr::BoolLiteral(_, l)
            | Expr::StringLiteral(_, l) => *l,
            Expr::VarRef(v) => v.line,
            Expr::Assignment(a) => a.line,
            Expr::Call(c) => c.line,
            Expr::Binary(b) => b.line,
            Expr::Unary(u) => u.line,
            Expr::And(s) | Expr::Or(s) => s.line,
            Expr::Blend(b) => b.line,
            Expr::TypeConversion(t) => t.line,
            Expr::BuiltInCall(c) => c.line,
        }
    }
}
