//! Static free-variable analysis.
//!
//! Walks an expression in evaluation order and records every name that is
//! read before the walked path assigns it. Those are the expression's
//! *globals*: values that must be looked up in the defining context when a
//! future is created.
//!
//! The analysis is path-insensitive at joins. After an `if` or `while`, a
//! name assigned on ANY branch counts as local for the rest of the walk, so
//!
//! ```text
//! if flag { x = 1; }
//! x
//! ```
//!
//! does not report `x` even though the `false` path reads the outer `x`.
//! Such names are under-approximated on purpose; callers that need them can
//! reference them unconditionally before the branch.

use std::collections::{BTreeSet, HashSet};

use promesa_ast::ast::{Block, Expr, Stmt, Target};

/// Result of the analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Globals {
    /// Free names in first-read order, without duplicates.
    pub names: Vec<String>,
    /// Packages referenced through `pkg::name` paths or `use pkg;`.
    pub packages: BTreeSet<String>,
}

impl Globals {
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }
}

/// Collect the globals of an expression.
pub fn find_globals(expr: &Expr) -> Globals {
    let mut w = Walker::default();
    w.expr(expr, &mut BTreeSet::new());
    w.out
}

/// Collect the globals of a statement block (e.g. a whole program body).
pub fn find_globals_in_block(block: &Block) -> Globals {
    let mut w = Walker::default();
    w.block(block, &mut BTreeSet::new());
    w.out
}

type Bound = BTreeSet<String>;

#[derive(Default)]
struct Walker {
    out: Globals,
    seen: HashSet<String>,
}

impl Walker {
    fn read(&mut self, name: &str, bound: &Bound) {
        if !bound.contains(name) && self.seen.insert(name.to_string()) {
            self.out.names.push(name.to_string());
        }
    }

    fn expr(&mut self, e: &Expr, bound: &mut Bound) {
        match e {
            Expr::Lit(..) => {}
            Expr::Var(id) => self.read(&id.text, bound),
            Expr::Path { package, .. } => {
                self.out.packages.insert(package.text.clone());
            }
            Expr::Unary { expr, .. } => self.expr(expr, bound),
            Expr::Binary { lhs, rhs, .. } => {
                self.expr(lhs, bound);
                self.expr(rhs, bound);
            }
            Expr::Call { callee, args, .. } => {
                self.expr(callee, bound);
                for arg in args {
                    self.expr(arg, bound);
                }
            }
            Expr::Index { target, key, .. } => {
                self.expr(target, bound);
                self.expr(key, bound);
            }
            Expr::Paren { inner, .. } => self.expr(inner, bound),
            Expr::Block(block) => self.block(block, bound),
            Expr::If {
                cond, then_, else_, ..
            } => {
                self.expr(cond, bound);
                let mut then_bound = bound.clone();
                self.block(then_, &mut then_bound);
                let mut else_bound = bound.clone();
                if let Some(else_) = else_ {
                    self.expr(else_, &mut else_bound);
                }
                // any-branch assignment shadows from here on
                bound.extend(then_bound);
                bound.extend(else_bound);
            }
            Expr::While { cond, body, .. } => {
                self.expr(cond, bound);
                let mut body_bound = bound.clone();
                self.block(body, &mut body_bound);
                bound.extend(body_bound);
            }
            Expr::Lambda { params, body, .. } => {
                let mut inner = bound.clone();
                inner.extend(params.iter().map(|p| p.text.clone()));
                self.block(body, &mut inner);
            }
            Expr::Future { body, .. } => {
                let mut inner = bound.clone();
                self.block(body, &mut inner);
            }
        }
    }

    fn block(&mut self, block: &Block, bound: &mut Bound) {
        for stmt in &block.stmts {
            self.stmt(stmt, bound);
        }
        if let Some(tail) = &block.tail {
            self.expr(tail, bound);
        }
    }

    fn stmt(&mut self, stmt: &Stmt, bound: &mut Bound) {
        match stmt {
            Stmt::Assign { target, value, .. } | Stmt::Defer { target, value, .. } => {
                self.expr(value, bound);
                self.target(target, bound);
            }
            Stmt::Use { package, .. } => {
                self.out.packages.insert(package.text.clone());
            }
            Stmt::Expr { expr, .. } => self.expr(expr, bound),
        }
    }

    fn target(&mut self, target: &Target, bound: &mut Bound) {
        match target {
            Target::Name(id) => {
                bound.insert(id.text.clone());
            }
            // storing into a container reads the container binding
            Target::Index { container, key, .. } => {
                self.expr(container, bound);
                self.expr(key, bound);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promesa_ast::ast::{Ident, Lit};
    use promesa_ast::span::Span;

    fn var(name: &str) -> Expr {
        Expr::Var(Ident {
            text: name.to_string(),
            span: Span::default(),
        })
    }

    #[test]
    fn single_variable_is_global() {
        let g = find_globals(&var("a"));
        assert_eq!(g.names, vec!["a".to_string()]);
        assert!(g.packages.is_empty());
    }

    #[test]
    fn literal_has_no_globals() {
        let g = find_globals(&Expr::Lit(Lit::Int(1), Span::default()));
        assert_eq!(g, Globals::default());
    }
}
