pub mod span {
    use serde::Serialize;

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
    pub struct Span {
        pub start: u32,
        pub end: u32,
    }

    impl Span {
        pub fn to(self, other: Span) -> Span {
            Span {
                start: self.start,
                end: other.end,
            }
        }
    }
}

pub mod ast {
    use super::span::Span;
    use serde::Serialize;

    /// A whole source file: a statement sequence with an optional tail value.
    #[derive(Debug, Clone, Serialize)]
    pub struct Program {
        pub body: Block,
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct Block {
        pub stmts: Vec<Stmt>,
        pub tail: Option<Box<Expr>>,
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize)]
    pub enum Stmt {
        /// `target = value;`
        Assign {
            target: Target,
            value: Expr,
            span: Span,
        },
        /// `defer(opts) target = value;` binds a future to the target
        Defer {
            options: Vec<FutureOpt>,
            target: Target,
            value: Expr,
            span: Span,
        },
        /// `use pkg;`
        Use { package: Ident, span: Span },
        Expr { expr: Expr, span: Span },
    }

    /// Left-hand side of an assignment.
    #[derive(Debug, Clone, Serialize)]
    pub enum Target {
        Name(Ident),
        Index {
            container: Box<Expr>,
            key: Box<Expr>,
            span: Span,
        },
    }

    /// `name: literal` inside `future(...)` / `defer(...)`.
    #[derive(Debug, Clone, Serialize)]
    pub struct FutureOpt {
        pub name: Ident,
        pub value: Lit,
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize)]
    pub struct Ident {
        pub text: String,
        pub span: Span,
    }

    #[derive(Debug, Clone, Serialize)]
    pub enum Expr {
        Lit(Lit, Span),
        Var(Ident),
        /// `package::name`
        Path {
            package: Ident,
            name: Ident,
            span: Span,
        },
        Unary {
            op: UnOp,
            expr: Box<Expr>,
            span: Span,
        },
        Binary {
            lhs: Box<Expr>,
            op: BinOp,
            rhs: Box<Expr>,
            span: Span,
        },
        Call {
            callee: Box<Expr>,
            args: Vec<Expr>,
            span: Span,
        },
        Index {
            target: Box<Expr>,
            key: Box<Expr>,
            span: Span,
        },
        Paren {
            inner: Box<Expr>,
            span: Span,
        },
        Block(Block),
        If {
            cond: Box<Expr>,
            then_: Block,
            else_: Option<Box<Expr>>,
            span: Span,
        },
        While {
            cond: Box<Expr>,
            body: Block,
            span: Span,
        },
        Lambda {
            params: Vec<Ident>,
            body: Block,
            span: Span,
        },
        /// `future(opts) { body }`
        Future {
            options: Vec<FutureOpt>,
            body: Block,
            span: Span,
        },
    }

    impl Expr {
        pub fn span(&self) -> Span {
            match self {
                Expr::Lit(_, span) => *span,
                Expr::Var(id) => id.span,
                Expr::Block(block) => block.span,
                Expr::Path { span, .. }
                | Expr::Unary { span, .. }
                | Expr::Binary { span, .. }
                | Expr::Call { span, .. }
                | Expr::Index { span, .. }
                | Expr::Paren { span, .. }
                | Expr::If { span, .. }
                | Expr::While { span, .. }
                | Expr::Lambda { span, .. }
                | Expr::Future { span, .. } => *span,
            }
        }
    }

    #[derive(Debug, Clone, Copy, Serialize)]
    pub enum UnOp {
        Not,
        Neg,
    }

    #[derive(Debug, Clone, Serialize)]
    pub enum Lit {
        Int(i64),
        Float(f64),
        Str(String),
        Bool(bool),
        Nil,
    }

    #[derive(Debug, Clone, Copy, Serialize)]
    pub enum BinOp {
        // logical
        Or,
        And,
        // equality
        Eq,
        Ne,
        // relational
        Lt,
        Le,
        Gt,
        Ge,
        // arithmetic
        Add,
        Sub,
        Mul,
        Div,
    }

    impl BinOp {
        pub fn symbol(self) -> &'static str {
            match self {
                BinOp::Or => "||",
                BinOp::And => "&&",
                BinOp::Eq => "==",
                BinOp::Ne => "!=",
                BinOp::Lt => "<",
                BinOp::Le => "<=",
                BinOp::Gt => ">",
                BinOp::Ge => ">=",
                BinOp::Add => "+",
                BinOp::Sub => "-",
                BinOp::Mul => "*",
                BinOp::Div => "/",
            }
        }
    }
}

/// Deparser. The `Display` output is the canonical "expression text" used in
/// error reports and capture fingerprints, so it must stay deterministic.
pub mod deparse {
    use super::ast::*;
    use std::fmt;

    fn write_options(f: &mut fmt::Formatter<'_>, options: &[FutureOpt]) -> fmt::Result {
        if options.is_empty() {
            return Ok(());
        }
        write!(f, "(")?;
        for (i, opt) in options.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", opt.name.text, opt.value)?;
        }
        write!(f, ")")
    }

    impl fmt::Display for Lit {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Lit::Int(v) => write!(f, "{v}"),
                Lit::Float(v) => write!(f, "{v:?}"),
                Lit::Str(s) => write!(f, "{s:?}"),
                Lit::Bool(b) => write!(f, "{b}"),
                Lit::Nil => write!(f, "nil"),
            }
        }
    }

    impl fmt::Display for Target {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Target::Name(id) => write!(f, "{}", id.text),
                Target::Index { container, key, .. } => write!(f, "{container}[{key}]"),
            }
        }
    }

    impl fmt::Display for Stmt {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Stmt::Assign { target, value, .. } => write!(f, "{target} = {value};"),
                Stmt::Defer {
                    options,
                    target,
                    value,
                    ..
                } => {
                    write!(f, "defer")?;
                    write_options(f, options)?;
                    write!(f, " {target} = {value};")
                }
                Stmt::Use { package, .. } => write!(f, "use {};", package.text),
                Stmt::Expr { expr, .. } => write!(f, "{expr};"),
            }
        }
    }

    impl fmt::Display for Block {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            if self.stmts.is_empty() && self.tail.is_none() {
                return write!(f, "{{}}");
            }
            write!(f, "{{")?;
            for stmt in &self.stmts {
                write!(f, " {stmt}")?;
            }
            if let Some(tail) = &self.tail {
                write!(f, " {tail}")?;
            }
            write!(f, " }}")
        }
    }

    impl fmt::Display for Program {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let mut first = true;
            for stmt in &self.body.stmts {
                if !first {
                    writeln!(f)?;
                }
                write!(f, "{stmt}")?;
                first = false;
            }
            if let Some(tail) = &self.body.tail {
                if !first {
                    writeln!(f)?;
                }
                write!(f, "{tail}")?;
            }
            Ok(())
        }
    }

    impl fmt::Display for Expr {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Expr::Lit(lit, _) => write!(f, "{lit}"),
                Expr::Var(id) => write!(f, "{}", id.text),
                Expr::Path { package, name, .. } => write!(f, "{}::{}", package.text, name.text),
                Expr::Unary { op, expr, .. } => match op {
                    UnOp::Not => write!(f, "!{expr}"),
                    UnOp::Neg => write!(f, "-{expr}"),
                },
                Expr::Binary { lhs, op, rhs, .. } => write!(f, "{lhs} {} {rhs}", op.symbol()),
                Expr::Call { callee, args, .. } => {
                    write!(f, "{callee}(")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    write!(f, ")")
                }
                Expr::Index { target, key, .. } => write!(f, "{target}[{key}]"),
                Expr::Paren { inner, .. } => write!(f, "({inner})"),
                Expr::Block(block) => write!(f, "{block}"),
                Expr::If {
                    cond, then_, else_, ..
                } => {
                    write!(f, "if {cond} {then_}")?;
                    if let Some(else_) = else_ {
                        write!(f, " else {else_}")?;
                    }
                    Ok(())
                }
                Expr::While { cond, body, .. } => write!(f, "while {cond} {body}"),
                Expr::Lambda { params, body, .. } => {
                    let names: Vec<&str> = params.iter().map(|p| p.text.as_str()).collect();
                    write!(f, "fn({}) {body}", names.join(", "))
                }
                Expr::Future { options, body, .. } => {
                    write!(f, "future")?;
                    write_options(f, options)?;
                    write!(f, " {body}")
                }
            }
        }
    }
}
