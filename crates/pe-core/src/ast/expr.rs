use crate::ast::{BinaryOp, BoolOpKind, CompareOp, Ident, UnaryOp, ValueFloat};

pub type BExpr = Box<Expr>;

common_enum! {
    /// A literal appearing directly in the tree.
    pub enum Lit {
        Int(i64),
        Float(ValueFloat),
        Str(String),
        Bool(bool),
    }
}

common_enum! {
    pub enum Expr {
        Name(Ident),
        Literal(Lit),
        Binary(ExprBinary),
        Unary(ExprUnary),
        Bool(ExprBool),
        Compare(ExprCompare),
        Call(ExprCall),
        Attribute(ExprAttribute),
        Subscript(ExprSubscript),
    }
}

impl Expr {
    pub fn name(ident: impl Into<Ident>) -> Self {
        Expr::Name(ident.into())
    }

    pub fn int(value: i64) -> Self {
        Expr::Literal(Lit::Int(value))
    }

    pub fn float(value: f64) -> Self {
        Expr::Literal(Lit::Float(ValueFloat::new(value)))
    }

    pub fn str(value: impl Into<String>) -> Self {
        Expr::Literal(Lit::Str(value.into()))
    }

    pub fn bool(value: bool) -> Self {
        Expr::Literal(Lit::Bool(value))
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary(ExprBinary {
            op,
            left: left.into(),
            right: right.into(),
        })
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary(ExprUnary {
            op,
            operand: operand.into(),
        })
    }

    pub fn as_literal(&self) -> Option<&Lit> {
        match self {
            Expr::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&Ident> {
        match self {
            Expr::Name(ident) => Some(ident),
            _ => None,
        }
    }
}

common_struct! {
    pub struct ExprBinary {
        pub op: BinaryOp,
        pub left: BExpr,
        pub right: BExpr,
    }
}

common_struct! {
    pub struct ExprUnary {
        pub op: UnaryOp,
        pub operand: BExpr,
    }
}

common_struct! {
    /// `a and b and c` / `a or b or c`. Operands are kept flat so the
    /// rewriter can drop or fold individual legs without re-nesting.
    pub struct ExprBool {
        pub op: BoolOpKind,
        pub operands: Vec<Expr>,
    }
}

common_struct! {
    /// A chained comparison `a < b <= c`: one leftmost operand, then
    /// (operator, operand) pairs. Semantically each adjacent pair is
    /// compared and the results are and-ed, with single evaluation of the
    /// shared operands.
    pub struct ExprCompare {
        pub left: BExpr,
        pub comparators: Vec<(CompareOp, Expr)>,
    }
}

common_enum! {
    pub enum CallArg {
        Positional(Expr),
        Keyword { name: Ident, value: Expr },
        /// `*args` splat. Never folded or inlined through.
        Starred(Expr),
        /// `**kwargs` splat. Never folded or inlined through.
        StarredKeyword(Expr),
    }
}

impl CallArg {
    /// The expression carried by this argument, whatever its kind.
    pub fn value(&self) -> &Expr {
        match self {
            CallArg::Positional(expr) => expr,
            CallArg::Keyword { value, .. } => value,
            CallArg::Starred(expr) => expr,
            CallArg::StarredKeyword(expr) => expr,
        }
    }

    pub fn value_mut(&mut self) -> &mut Expr {
        match self {
            CallArg::Positional(expr) => expr,
            CallArg::Keyword { value, .. } => value,
            CallArg::Starred(expr) => expr,
            CallArg::StarredKeyword(expr) => expr,
        }
    }

    pub fn as_positional(&self) -> Option<&Expr> {
        match self {
            CallArg::Positional(expr) => Some(expr),
            _ => None,
        }
    }
}

common_struct! {
    pub struct ExprCall {
        pub callee: BExpr,
        pub args: Vec<CallArg>,
    }
}

impl ExprCall {
    pub fn new(callee: Expr, args: Vec<CallArg>) -> Self {
        Self {
            callee: callee.into(),
            args,
        }
    }

    pub fn all_positional(&self) -> bool {
        self.args
            .iter()
            .all(|arg| matches!(arg, CallArg::Positional(_)))
    }
}

common_struct! {
    pub struct ExprAttribute {
        pub base: BExpr,
        pub attr: Ident,
    }
}

common_struct! {
    pub struct ExprSubscript {
        pub base: BExpr,
        pub index: BExpr,
    }
}
