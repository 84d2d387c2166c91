//! Statement AST
//!
//! Method bodies as statement trees.

use serde::{Deserialize, Serialize};

use super::expression::Expr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// Method-local declaration
    Let {
        name: String,
        #[serde(default)]
        ty: Option<String>,
        #[serde(default)]
        value: Option<Expr>,
    },
    /// `target = value`
    Assign { target: String, value: Expr },
    /// `target[index] = value`
    IndexAssign {
        target: Expr,
        index: Expr,
        value: Expr,
    },
    /// `object.member = value`
    MemberAssign {
        object: Expr,
        member: String,
        value: Expr,
    },
    Expr(Expr),
    Block(Vec<Stmt>),
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        #[serde(default)]
        else_branch: Vec<Stmt>,
    },
    ForRange {
        var: String,
        start: Expr,
        end: Expr,
        body: Vec<Stmt>,
    },
    ForEach {
        var: String,
        iterable: Expr,
        body: Vec<Stmt>,
    },
    Return(Option<Expr>),
}

impl Stmt {
    pub fn assign(target: impl Into<String>, value: Expr) -> Self {
        Stmt::Assign {
            target: target.into(),
            value,
        }
    }
}
