//! C backend
//!
//! Lowers the merged AST into a single C11 translation unit (with GNU
//! statement-expression extensions) carrying exactly the runtime helpers
//! the program uses.

mod emit;
mod format;
mod infer;
mod runtime;

pub use emit::{generate_c, pascal_case, CodeGenerator};
pub use infer::CType;
