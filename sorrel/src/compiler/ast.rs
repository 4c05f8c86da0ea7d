//! The syntax tree handed to the compiler.
//!
//! Every node carries the 1-based source line it came from, used for
//! diagnostics and runtime traces.

/// A binary or prefix operator, identified at run time by its symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Equals,
    NotEquals,
    Less,
    LessEquals,
    Greater,
    GreaterEquals,
}

impl Op {
    pub fn symbol(&self) -> &'static str {
        match self {
            Op::Add => "+",
            Op::Subtract => "-",
            Op::Multiply => "*",
            Op::Divide => "/",
            Op::Remainder => "%",
            Op::Equals => "==",
            Op::NotEquals => "!=",
            Op::Less => "<",
            Op::LessEquals => "<=",
            Op::Greater => ">",
            Op::GreaterEquals => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

impl Param {
    pub fn new(name: &str) -> Param {
        Param {
            name: name.to_string(),
            default: None,
        }
    }

    pub fn with_default(name: &str, default: Expr) -> Param {
        Param {
            name: name.to_string(),
            default: Some(default),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    /// Empty for anonymous functions.
    pub name: String,
    pub params: Vec<Param>,
    /// Whether the final parameter collects excess arguments into a list.
    pub has_vargs: bool,
    pub is_generator: bool,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Number(f64),
    String(String),
    Boolean(bool),
    Nil,
    List(Vec<Expr>),
    Identifier(String),
    /// `name = value`
    Assign(String, Box<Expr>),
    Infix(Op, Box<Expr>, Box<Expr>),
    Prefix(Op, Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    /// `target[index]`
    Index(Box<Expr>, Box<Expr>),
    IndexAssign {
        target: Box<Expr>,
        index: Box<Expr>,
        value: Box<Expr>,
    },
    /// `target.field`
    Field(Box<Expr>, String),
    FieldAssign {
        target: Box<Expr>,
        field: String,
        value: Box<Expr>,
    },
    /// `target[op]`
    OperIndex(Box<Expr>, Op),
    /// `target[op]= value`, e.g. appending with `list[+]= item`
    OperIndexAssign {
        target: Box<Expr>,
        oper: Op,
        value: Box<Expr>,
    },
    Call(Box<Expr>, Vec<Expr>),
    MethodCall {
        target: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    /// Self recursion that reuses the current frame.
    TailRec(Vec<Expr>),
    Resume(Box<Expr>),
    Yield(Option<Box<Expr>>),
    Function(Box<FunctionDecl>),
}

impl Expr {
    pub fn new(kind: ExprKind, line: u32) -> Expr {
        Expr { kind, line }
    }

    pub fn number(value: f64, line: u32) -> Expr {
        Expr::new(ExprKind::Number(value), line)
    }

    pub fn string(value: &str, line: u32) -> Expr {
        Expr::new(ExprKind::String(value.to_string()), line)
    }

    pub fn identifier(name: &str, line: u32) -> Expr {
        Expr::new(ExprKind::Identifier(name.to_string()), line)
    }

    pub fn infix(op: Op, lhs: Expr, rhs: Expr, line: u32) -> Expr {
        Expr::new(ExprKind::Infix(op, Box::new(lhs), Box::new(rhs)), line)
    }

    pub fn call(callee: Expr, args: Vec<Expr>, line: u32) -> Expr {
        Expr::new(ExprKind::Call(Box::new(callee), args), line)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    /// `var name = value`
    Var(String, Option<Expr>),
    /// A named function definition, stored in the enclosing module.
    Function(FunctionDecl),
    Block(Vec<Stmt>),
    If {
        cond: Expr,
        then: Vec<Stmt>,
        or_else: Option<Vec<Stmt>>,
    },
    /// `while` loop; the else branch runs when the condition fails on
    /// the first test.
    While {
        label: Option<String>,
        cond: Expr,
        body: Vec<Stmt>,
        or_else: Option<Vec<Stmt>>,
    },
    /// Counted loop: `iter var = init to limit by step`.
    Iter {
        label: Option<String>,
        var: String,
        init: Expr,
        limit: Expr,
        step: Option<Expr>,
        body: Vec<Stmt>,
    },
    /// `each var in value`
    Each {
        label: Option<String>,
        var: String,
        value: Expr,
        body: Vec<Stmt>,
    },
    /// `each index, var in value`; the index is 1-based.
    IndexedEach {
        label: Option<String>,
        index: String,
        var: String,
        value: Expr,
        body: Vec<Stmt>,
    },
    Break(Option<String>),
    Continue(Option<String>),
    Return(Option<Expr>),
    Throw(Expr),
    Try {
        body: Vec<Stmt>,
        /// Local name the caught exception is bound to, if any.
        name: Option<String>,
        handler: Vec<Stmt>,
    },
}

impl Stmt {
    pub fn new(kind: StmtKind, line: u32) -> Stmt {
        Stmt { kind, line }
    }

    pub fn expr(expr: Expr) -> Stmt {
        let line = expr.line;
        Stmt::new(StmtKind::Expr(expr), line)
    }

    pub fn var(name: &str, value: Expr) -> Stmt {
        let line = value.line;
        Stmt::new(StmtKind::Var(name.to_string(), Some(value)), line)
    }
}
