use crate::token::{Tok, TokKind};
use promesa_ast::span::Span;

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
        }
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.src.get(self.pos).copied()?;
        self.pos += 1;
        Some(b)
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }
    fn peek2(&self) -> Option<u8> {
        self.src.get(self.pos + 1).copied()
    }

    fn span(&self, start: usize) -> Span {
        Span {
            start: start as u32,
            end: self.pos as u32,
        }
    }

    fn tok(&self, kind: TokKind, start: usize) -> Tok {
        Tok {
            kind,
            span: self.span(start),
        }
    }

    fn skip_ws_and_comments(&mut self) {
        loop {
            while matches!(self.peek(), Some(b) if (b as char).is_whitespace()) {
                self.bump();
            }
            // line comment: // or #
            let line_comment = (self.peek() == Some(b'/') && self.peek2() == Some(b'/'))
                || self.peek() == Some(b'#');
            if line_comment {
                while let Some(b) = self.peek() {
                    if b == b'\n' {
                        break;
                    }
                    self.bump();
                }
                continue;
            }
            break;
        }
    }

    pub fn next_tok(&mut self) -> Tok {
        self.skip_ws_and_comments();
        let start = self.pos;
        let Some(b) = self.bump() else {
            return self.tok(TokKind::Eof, start);
        };
        let c = b as char;

        // 2-char operators first
        let double = match (c, self.peek().map(|b| b as char)) {
            ('&', Some('&')) => Some(TokKind::AndAnd),
            ('|', Some('|')) => Some(TokKind::OrOr),
            ('=', Some('=')) => Some(TokKind::EqEq),
            ('!', Some('=')) => Some(TokKind::BangEq),
            ('<', Some('=')) => Some(TokKind::Le),
            ('>', Some('=')) => Some(TokKind::Ge),
            (':', Some(':')) => Some(TokKind::ColonColon),
            _ => None,
        };
        if let Some(k) = double {
            self.bump();
            return self.tok(k, start);
        }

        // 1-char punctuation/operators
        let single = match c {
            '(' => Some(TokKind::LParen),
            ')' => Some(TokKind::RParen),
            '{' => Some(TokKind::LBrace),
            '}' => Some(TokKind::RBrace),
            '[' => Some(TokKind::LBracket),
            ']' => Some(TokKind::RBracket),
            ',' => Some(TokKind::Comma),
            ':' => Some(TokKind::Colon),
            ';' => Some(TokKind::Semicolon),
            '+' => Some(TokKind::Plus),
            '-' => Some(TokKind::Minus),
            '*' => Some(TokKind::Star),
            '/' => Some(TokKind::Slash),
            '=' => Some(TokKind::Eq),
            '<' => Some(TokKind::Lt),
            '>' => Some(TokKind::Gt),
            '!' => Some(TokKind::Bang),
            _ => None,
        };
        if let Some(k) = single {
            return self.tok(k, start);
        }

        // string
        if c == '"' {
            return self.lex_string(start);
        }

        // number (int/float)
        if c.is_ascii_digit() {
            let mut s = String::from(c);
            let mut dot = false;
            while let Some(p) = self.peek() {
                let ch = p as char;
                if ch.is_ascii_digit() {
                    s.push(ch);
                    self.bump();
                } else if ch == '.' && !dot && matches!(self.peek2(), Some(d) if d.is_ascii_digit())
                {
                    dot = true;
                    s.push('.');
                    self.bump();
                } else {
                    break;
                }
            }
            let kind = if dot {
                s.parse()
                    .map(TokKind::Float)
                    .unwrap_or_else(|_| TokKind::Error(format!("invalid float literal `{s}`")))
            } else {
                s.parse()
                    .map(TokKind::Int)
                    .unwrap_or_else(|_| TokKind::Error(format!("integer literal `{s}` out of range")))
            };
            return self.tok(kind, start);
        }

        // ident / keywords
        if c.is_ascii_alphabetic() || c == '_' {
            let mut s = String::from(c);
            while let Some(p) = self.peek() {
                let ch = p as char;
                if ch.is_ascii_alphanumeric() || ch == '_' {
                    s.push(ch);
                    self.bump();
                } else {
                    break;
                }
            }
            let kind = TokKind::keyword(&s).unwrap_or_else(|| TokKind::Ident(s));
            return self.tok(kind, start);
        }

        self.tok(TokKind::Error(format!("unexpected character `{c}`")), start)
    }

    fn lex_string(&mut self, start: usize) -> Tok {
        let mut bytes = Vec::new();
        loop {
            let Some(b) = self.bump() else {
                return self.tok(TokKind::Error("unterminated string literal".into()), start);
            };
            match b {
                b'"' => break,
                b'\\' => {
                    let Some(esc) = self.bump() else {
                        return self.tok(TokKind::Error("unterminated string literal".into()), start);
                    };
                    bytes.push(match esc {
                        b'n' => b'\n',
                        b't' => b'\t',
                        other => other,
                    });
                }
                other => bytes.push(other),
            }
        }
        let s = String::from_utf8_lossy(&bytes).into_owned();
        self.tok(TokKind::Str(s), start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokKind> {
        let mut lex = Lexer::new(src);
        let mut out = Vec::new();
        loop {
            let t = lex.next_tok();
            if t.kind == TokKind::Eof {
                break;
            }
            out.push(t.kind);
        }
        out
    }

    #[test]
    fn keywords_and_paths() {
        assert_eq!(
            kinds("defer x = math::sqrt(2);"),
            vec![
                TokKind::KwDefer,
                TokKind::Ident("x".into()),
                TokKind::Eq,
                TokKind::Ident("math".into()),
                TokKind::ColonColon,
                TokKind::Ident("sqrt".into()),
                TokKind::LParen,
                TokKind::Int(2),
                TokKind::RParen,
                TokKind::Semicolon,
            ]
        );
    }

    #[test]
    fn float_and_comments() {
        assert_eq!(
            kinds("a = 2.71 # trailing\n// whole line\n"),
            vec![
                TokKind::Ident("a".into()),
                TokKind::Eq,
                TokKind::Float(2.71),
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(kinds(r#""a\"b\n""#), vec![TokKind::Str("a\"b\n".into())]);
    }

    #[test]
    fn bad_input_becomes_error_token() {
        assert!(matches!(kinds("@")[0], TokKind::Error(_)));
        assert!(matches!(
            kinds("99999999999999999999")[0],
            TokKind::Error(_)
        ));
    }
}
