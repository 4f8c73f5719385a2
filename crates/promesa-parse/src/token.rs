use std::fmt;

use promesa_ast::span::Span;

#[derive(Debug, Clone, PartialEq)]
pub enum TokKind {
    Eof,
    /// Malformed input (unknown character, bad number, open string)
    Error(String),

    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    /// separates a future option from its value
    Colon,
    /// `pkg::name`
    ColonColon,
    Semicolon,
    Eq,

    Plus,
    Minus,
    Star,
    Slash,
    EqEq,
    BangEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,

    Ident(String),
    KwFn,
    KwTrue,
    KwFalse,
    KwNil,
    KwIf,
    KwElse,
    KwWhile,
    KwFuture,
    KwDefer,
    KwUse,

    Int(i64),
    Float(f64),
    Str(String),
}

impl TokKind {
    /// Reserved word for `s`, if it is one.
    pub fn keyword(s: &str) -> Option<TokKind> {
        Some(match s {
            "fn" => TokKind::KwFn,
            "true" => TokKind::KwTrue,
            "false" => TokKind::KwFalse,
            "nil" => TokKind::KwNil,
            "if" => TokKind::KwIf,
            "else" => TokKind::KwElse,
            "while" => TokKind::KwWhile,
            "future" => TokKind::KwFuture,
            "defer" => TokKind::KwDefer,
            "use" => TokKind::KwUse,
            _ => return None,
        })
    }

    fn symbol(&self) -> Option<&'static str> {
        Some(match self {
            TokKind::LParen => "(",
            TokKind::RParen => ")",
            TokKind::LBrace => "{",
            TokKind::RBrace => "}",
            TokKind::LBracket => "[",
            TokKind::RBracket => "]",
            TokKind::Comma => ",",
            TokKind::Colon => ":",
            TokKind::ColonColon => "::",
            TokKind::Semicolon => ";",
            TokKind::Eq => "=",
            TokKind::Plus => "+",
            TokKind::Minus => "-",
            TokKind::Star => "*",
            TokKind::Slash => "/",
            TokKind::EqEq => "==",
            TokKind::BangEq => "!=",
            TokKind::Lt => "<",
            TokKind::Le => "<=",
            TokKind::Gt => ">",
            TokKind::Ge => ">=",
            TokKind::AndAnd => "&&",
            TokKind::OrOr => "||",
            TokKind::Bang => "!",
            TokKind::KwFn => "fn",
            TokKind::KwTrue => "true",
            TokKind::KwFalse => "false",
            TokKind::KwNil => "nil",
            TokKind::KwIf => "if",
            TokKind::KwElse => "else",
            TokKind::KwWhile => "while",
            TokKind::KwFuture => "future",
            TokKind::KwDefer => "defer",
            TokKind::KwUse => "use",
            _ => return None,
        })
    }
}

/// Token as it should appear in a diagnostic.
impl fmt::Display for TokKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sym) = self.symbol() {
            return write!(f, "`{sym}`");
        }
        match self {
            TokKind::Eof => write!(f, "end of input"),
            TokKind::Error(msg) => write!(f, "invalid token ({msg})"),
            TokKind::Ident(name) => write!(f, "identifier `{name}`"),
            TokKind::Int(v) => write!(f, "integer `{v}`"),
            TokKind::Float(v) => write!(f, "float `{v:?}`"),
            TokKind::Str(s) => write!(f, "string {s:?}"),
            _ => write!(f, "{self:?}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tok {
    pub kind: TokKind,
    pub span: Span,
}
