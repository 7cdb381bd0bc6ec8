use crate::ast::{Expr, ExprAttribute, ExprSubscript, Ident};

common_enum! {
    pub enum Stmt {
        FunctionDef(StmtFunctionDef),
        Assign(StmtAssign),
        If(StmtIf),
        For(StmtFor),
        While(StmtWhile),
        Return(StmtReturn),
        Raise(StmtRaise),
        Break,
        Pass,
        Expr(Expr),
    }
}

impl Stmt {
    /// Whether control flow never proceeds past this statement inside its
    /// block, making everything after it dead.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stmt::Return(_) | Stmt::Raise(_) | Stmt::Break)
    }
}

common_struct! {
    pub struct StmtFunctionDef {
        pub name: Ident,
        pub params: Vec<Ident>,
        pub body: Vec<Stmt>,
    }
}

impl StmtFunctionDef {
    pub fn new(name: impl Into<Ident>, params: Vec<Ident>, body: Vec<Stmt>) -> Self {
        Self {
            name: name.into(),
            params,
            body,
        }
    }
}

common_enum! {
    /// The left-hand side of an assignment. Attribute and subscript stores
    /// mutate their base object; a plain name store rebinds only.
    pub enum AssignTarget {
        Name(Ident),
        Attribute(ExprAttribute),
        Subscript(ExprSubscript),
    }
}

common_struct! {
    pub struct StmtAssign {
        pub target: AssignTarget,
        pub value: Expr,
    }
}

common_struct! {
    /// `if`/`else`. `orelse` is empty when there is no else branch; an
    /// `elif` chain parses as a nested If in `orelse`.
    pub struct StmtIf {
        pub test: Expr,
        pub then: Vec<Stmt>,
        pub orelse: Vec<Stmt>,
    }
}

common_struct! {
    pub struct StmtFor {
        pub target: Ident,
        pub iter: Expr,
        pub body: Vec<Stmt>,
    }
}

common_struct! {
    pub struct StmtWhile {
        pub test: Expr,
        pub body: Vec<Stmt>,
    }
}

common_struct! {
    /// `return` / `return expr`. A bare return carries `None`.
    pub struct StmtReturn {
        pub value: Option<Expr>,
    }
}

common_struct! {
    pub struct StmtRaise {
        pub exc: Option<Expr>,
    }
}
