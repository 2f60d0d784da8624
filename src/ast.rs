use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use ts_rs::TS;

use crate::types::Type;

/// A 1-based line/column pair. Columns count characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, TS)]
#[ts(export)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

/// Source location of a token or node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Span {
    pub start_index: usize,
    pub end_index: usize,
    pub start: Position,
    pub end: Position,
}

impl Span {
    /// Span from the start of `self` to the end of `other`.
    pub fn merge(self, other: Span) -> Span {
        Span {
            start_index: self.start_index,
            end_index: other.end_index,
            start: self.start,
            end: other.end,
        }
    }

    pub fn is_multiline(&self) -> bool {
        self.start.line != self.end.line
    }
}

// ── Operators ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    BitOr,
    BitXor,
    BitAnd,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Rem,
    Pow,
}

impl BinOp {
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Or => 4,
            BinOp::And => 5,
            BinOp::BitOr => 6,
            BinOp::BitXor => 7,
            BinOp::BitAnd => 8,
            BinOp::Eq | BinOp::Ne => 9,
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => 10,
            BinOp::Shl | BinOp::Shr => 11,
            BinOp::Add | BinOp::Sub => 12,
            BinOp::Mul | BinOp::Div | BinOp::IDiv | BinOp::Rem => 13,
            BinOp::Pow => 14,
        }
    }

    /// Operator as written in source.
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Or => "or",
            BinOp::And => "and",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::BitAnd => "&",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::IDiv => "idiv",
            BinOp::Rem => "%",
            BinOp::Pow => "**",
        }
    }

    /// Instruction emitted for the operator.
    pub fn opcode(self) -> &'static str {
        match self {
            BinOp::IDiv => "div",
            BinOp::Pow => "pow",
            other => other.symbol(),
        }
    }

    /// (operand type, result type). Equality is polymorphic and handled by the assembler.
    pub fn signature(self) -> (Type, Type) {
        match self {
            BinOp::Or | BinOp::And => (Type::Boolean, Type::Boolean),
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
                (Type::Number, Type::Boolean)
            }
            _ => (Type::Number, Type::Number),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    BitNot,
    Neg,
}

impl UnaryOp {
    pub fn opcode(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::Neg => "neg",
        }
    }

    pub fn signature(self) -> (Type, Type) {
        match self {
            UnaryOp::Not => (Type::Boolean, Type::Boolean),
            UnaryOp::BitNot | UnaryOp::Neg => (Type::Number, Type::Number),
        }
    }
}

// ── Nodes ──────────────────────────────────────────────────────

/// A SimVar (or template) reference: `(A:NAME, unit)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimVarRef {
    pub name: String,
    pub unit: Option<String>,
}

impl fmt::Display for SimVarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.unit {
            Some(unit) => write!(f, "{},{unit}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Import(ImportDecl),
    Local(LocalDecl),
    Alias(AliasDecl),
    Macro(Rc<MacroDecl>),
    Assignment(Assignment),
    /// An `if` in statement position; it may not produce a value.
    If(IfExpr, Span),
    /// A block in statement position; it may not produce a value.
    Block(Block),
    /// An expression statement. `terminated` is false only for the trailing
    /// expression that supplies the enclosing block's value.
    Expr { expr: Expr, terminated: bool },
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Import(s) => s.span,
            Stmt::Local(s) => s.span,
            Stmt::Alias(s) => s.span,
            Stmt::Macro(s) => s.span,
            Stmt::Assignment(s) => s.span,
            Stmt::If(_, span) => *span,
            Stmt::Block(b) => b.span,
            Stmt::Expr { expr, .. } => expr.span,
        }
    }

    /// Whether the statement's value is dropped after it runs.
    pub fn discards_value(&self) -> bool {
        !matches!(self, Stmt::Expr { terminated: false, .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringLit {
    pub value: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub names: Vec<Ident>,
    pub specifier: StringLit,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalDecl {
    pub name: Ident,
    pub value: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AliasDecl {
    pub name: Ident,
    pub target: SimVarRef,
    pub target_span: Span,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroDecl {
    pub name: Ident,
    pub exported: bool,
    pub params: Vec<Ident>,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    SimVar(SimVarRef, Span),
    Identifier(Ident),
}

impl AssignTarget {
    pub fn span(&self) -> Span {
        match self {
            AssignTarget::SimVar(_, span) => *span,
            AssignTarget::Identifier(ident) => ident.span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub target: AssignTarget,
    pub value: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfExpr {
    pub test: Box<Expr>,
    pub consequent: Block,
    pub alternative: Option<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arguments {
    pub items: Vec<Rc<Expr>>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Method {
        target: Box<Expr>,
        callee: Ident,
        args: Arguments,
    },
    MacroExpansion {
        name: Ident,
        args: Arguments,
    },
    Identifier(String),
    MacroIdentifier(String),
    Boolean(bool),
    Number(f64),
    Str(String),
    SimVar(SimVarRef),
    Insert(SimVarRef),
    If(IfExpr),
    Block(Block),
}
