//! Top-level items and declarations

use super::{Block, Expr, Stmt};
use crate::common::Span;

/// One top-level entry of a module.
///
/// Ahoy files mix declarations with plain statements; the statements become
/// the body of the generated `main`.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// `program name` package directive
    Program(ProgramDecl),
    /// `import path` / `import path as alias`
    Import(ImportDecl),
    Decl(Decl),
    Stmt(Stmt),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgramDecl {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    /// Import path as written: a quoted path or a dotted package path
    pub path: String,
    pub alias: Option<String>,
    pub span: Span,
}

impl ImportDecl {
    /// C header imports are carried through verbatim and never resolved
    pub fn is_header(&self) -> bool {
        self.path.ends_with(".h")
    }
}

/// A declaration that survives merging into the compilation unit
#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Function(FnDecl),
    Struct(StructDecl),
    Enum(EnumDecl),
    Const(ConstDecl),
}

impl Decl {
    pub fn name(&self) -> &str {
        match self {
            Decl::Function(d) => &d.name,
            Decl::Struct(d) => &d.name,
            Decl::Enum(d) => &d.name,
            Decl::Const(d) => &d.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FnDecl {
    pub name: String,
    pub params: Vec<Param>,
    /// Declared return type, if the signature carried one
    pub return_type: Option<String>,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<StructField>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructField {
    pub name: String,
    pub ty: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDecl {
    pub name: String,
    pub members: Vec<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstDecl {
    pub name: String,
    pub value: Expr,
    pub span: Span,
}
