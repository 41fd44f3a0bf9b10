//! Lightweight storage-type inference
//!
//! This is not a type checker. It exists to pick C storage types at
//! assignment sites and printf specifiers for `%v`, nothing more; anything
//! it cannot see defaults to `int`.

use std::collections::HashMap;

use crate::frontend::ast::{Expr, ExprKind, Stmt, StmtKind};

/// The C storage type a value lowers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CType {
    Int,
    Float,
    Str,
    Bool,
    Char,
    /// Method-chain arrays (`AhoyArray*`, int storage)
    Array,
    /// Generic array literals (`DynamicArray*`, void** storage)
    DynArray,
    Dict,
    Void,
}

impl CType {
    /// The declared-type map: unrecognized names default to `int`
    pub fn from_name(name: &str) -> Self {
        match name {
            "float" => CType::Float,
            "string" => CType::Str,
            "bool" => CType::Bool,
            "char" => CType::Char,
            "array" => CType::Array,
            "dict" => CType::Dict,
            _ => CType::Int,
        }
    }

    pub fn c_storage(self) -> &'static str {
        match self {
            CType::Int => "int",
            CType::Float => "double",
            CType::Str => "char*",
            CType::Bool => "bool",
            CType::Char => "char",
            CType::Array => "AhoyArray*",
            CType::DynArray => "DynamicArray*",
            CType::Dict => "HashMap*",
            CType::Void => "void",
        }
    }

    /// printf specifier substituted for `%v` (arrays are special-cased by
    /// the caller, which also wraps the argument in the print helper)
    pub fn format_spec(self) -> &'static str {
        match self {
            CType::Int | CType::Bool => "%d",
            CType::Float => "%f",
            CType::Str => "%s",
            CType::Char => "%c",
            CType::Array | CType::DynArray | CType::Dict | CType::Void => "%p",
        }
    }

    /// Type name substituted for `%t`
    pub fn type_name(self) -> &'static str {
        match self {
            CType::Int => "int",
            CType::Float => "float",
            CType::Str => "string",
            CType::Bool => "bool",
            CType::Char => "char",
            CType::Array | CType::DynArray => "array",
            CType::Dict => "dict",
            CType::Void => "void",
        }
    }
}

/// What an array method call evaluates to
pub fn method_result(method: &str) -> CType {
    match method {
        "map" | "filter" | "sort" | "reverse" | "shuffle" | "push" => CType::Array,
        _ => CType::Int,
    }
}

/// Lookup context for identifier and call inference
pub struct TypeEnv<'a> {
    pub vars: &'a HashMap<String, CType>,
    pub consts: &'a HashMap<String, CType>,
    pub functions: &'a HashMap<String, CType>,
}

pub fn infer_expr(expr: &Expr, env: &TypeEnv) -> CType {
    match &expr.kind {
        ExprKind::Number(spelling) => {
            if spelling.contains('.') {
                CType::Float
            } else {
                CType::Int
            }
        }
        ExprKind::Str(_) => CType::Str,
        ExprKind::CharLit(_) => CType::Char,
        ExprKind::Boolean(_) => CType::Bool,
        ExprKind::Identifier(name) => env
            .vars
            .get(name)
            .or_else(|| env.consts.get(name))
            .copied()
            .unwrap_or(CType::Int),
        ExprKind::LoopCounter => CType::Int,
        ExprKind::Binary { lhs, rhs, .. } => {
            if infer_expr(lhs, env) == CType::Float || infer_expr(rhs, env) == CType::Float {
                CType::Float
            } else {
                CType::Int
            }
        }
        ExprKind::Unary { operand, .. } => infer_expr(operand, env),
        ExprKind::Call { name, .. } => env.functions.get(name).copied().unwrap_or_else(|| {
            if name == "sprintf" {
                CType::Str
            } else {
                CType::Int
            }
        }),
        ExprKind::MethodCall { method, .. } => method_result(method),
        ExprKind::Member { .. } => CType::Int,
        ExprKind::Index { receiver, .. } => match infer_expr(receiver, env) {
            CType::Dict => CType::Str,
            _ => CType::Int,
        },
        ExprKind::ArrayLit(elems) => {
            if elems.iter().all(|e| infer_expr(e, env) == CType::Int) {
                CType::Array
            } else {
                CType::DynArray
            }
        }
        ExprKind::DictLit(_) => CType::Dict,
        ExprKind::Lambda { .. } => CType::Int,
    }
}

/// Pre-pass over a statement list recording the type of every variable at
/// its first assignment (or loop binding), in source order. Emission then
/// reads these without re-walking expressions.
pub fn collect_var_types(
    stmts: &[Stmt],
    vars: &mut HashMap<String, CType>,
    consts: &HashMap<String, CType>,
    functions: &HashMap<String, CType>,
) {
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::Assign { target, value } => {
                if !vars.contains_key(target) {
                    let ty = infer_expr(value, &TypeEnv { vars, consts, functions });
                    vars.insert(target.clone(), ty);
                }
            }
            StmtKind::TupleAssign { targets, values } => {
                for (target, value) in targets.iter().zip(values) {
                    if !vars.contains_key(target) {
                        let ty = infer_expr(value, &TypeEnv { vars, consts, functions });
                        vars.insert(target.clone(), ty);
                    }
                }
            }
            StmtKind::If { arms, else_body } => {
                for arm in arms {
                    collect_var_types(&arm.body.stmts, vars, consts, functions);
                }
                if let Some(body) = else_body {
                    collect_var_types(&body.stmts, vars, consts, functions);
                }
            }
            StmtKind::Switch { cases, .. } => {
                for case in cases {
                    collect_var_types(&case.body, vars, consts, functions);
                }
            }
            StmtKind::When { body, .. } | StmtKind::While { body, .. } => {
                collect_var_types(&body.stmts, vars, consts, functions);
            }
            StmtKind::ForRange { var, body, .. } => {
                vars.entry(var.clone()).or_insert(CType::Int);
                collect_var_types(&body.stmts, vars, consts, functions);
            }
            StmtKind::ForCount { body, .. } => {
                collect_var_types(&body.stmts, vars, consts, functions);
            }
            StmtKind::ForInArray { var, body, .. } => {
                vars.entry(var.clone()).or_insert(CType::Int);
                collect_var_types(&body.stmts, vars, consts, functions);
            }
            StmtKind::ForInDict { key, value, body, .. } => {
                vars.entry(key.clone()).or_insert(CType::Str);
                vars.entry(value.clone()).or_insert(CType::Str);
                collect_var_types(&body.stmts, vars, consts, functions);
            }
            StmtKind::Return(_) | StmtKind::Break | StmtKind::Skip | StmtKind::Expr(_) => {}
        }
    }
}

/// First `return <expr>` in a body, used to infer undeclared return types
pub fn find_return<'a>(stmts: &'a [Stmt]) -> Option<&'a Expr> {
    for stmt in stmts {
        let found = match &stmt.kind {
            StmtKind::Return(Some(expr)) => Some(expr),
            StmtKind::If { arms, else_body } => arms
                .iter()
                .find_map(|arm| find_return(&arm.body.stmts))
                .or_else(|| else_body.as_ref().and_then(|b| find_return(&b.stmts))),
            StmtKind::Switch { cases, .. } => {
                cases.iter().find_map(|case| find_return(&case.body))
            }
            StmtKind::When { body, .. }
            | StmtKind::While { body, .. }
            | StmtKind::ForRange { body, .. }
            | StmtKind::ForCount { body, .. }
            | StmtKind::ForInArray { body, .. }
            | StmtKind::ForInDict { body, .. } => find_return(&body.stmts),
            _ => None,
        };
        if found.is_some() {
            return found;
        }
    }
    None
}
