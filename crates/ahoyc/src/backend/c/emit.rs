//! C code emitter
//!
//! Lowers a merged [`CompilationUnit`] into one self-contained C source
//! file. All scratch state (feature sets, counters, loop-counter stack,
//! scope tables) lives in the generator value; a fresh generator per call
//! keeps the output deterministic.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::common::{CompileError, CompileResult};
use crate::frontend::ast::*;
use crate::resolver::CompilationUnit;

use super::format::{rewrite_format, ArgAction};
use super::infer::{collect_var_types, find_return, infer_expr, CType, TypeEnv};
use super::runtime;

/// Generate C source for a merged program
pub fn generate_c(unit: &CompilationUnit) -> CompileResult<String> {
    CodeGenerator::new().generate(unit)
}

/// `snake_case` → `PascalCase` for emitted function names.
///
/// Underscore runs collapse; each segment's first letter is uppercased with
/// the rest preserved. The internal print helper keeps its marker name.
pub fn pascal_case(name: &str) -> String {
    if name == "__print_array_helper" {
        return name.to_string();
    }
    name.split('_')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// C code generator with per-invocation scratch state
pub struct CodeGenerator {
    // Runtime features referenced by the program
    array_methods: BTreeSet<&'static str>,
    needs_ahoy_array: bool,
    needs_dynamic_array: bool,
    needs_hashmap: bool,
    needs_print_array: bool,
    needs_rng: bool,
    // Counters and the loop-counter stack
    temp_counter: u32,
    loop_counter: u32,
    loop_stack: Vec<String>,
    renames: Vec<(String, String)>,
    // Global symbol tables
    enums: HashMap<String, Vec<String>>,
    consts: HashMap<String, CType>,
    functions: HashMap<String, CType>,
    // Current scope
    vars: HashMap<String, CType>,
    declared: HashSet<String>,
}

impl CodeGenerator {
    pub fn new() -> Self {
        Self {
            array_methods: BTreeSet::new(),
            needs_ahoy_array: false,
            needs_dynamic_array: false,
            needs_hashmap: false,
            needs_print_array: false,
            needs_rng: false,
            temp_counter: 0,
            loop_counter: 0,
            loop_stack: Vec::new(),
            renames: Vec::new(),
            enums: HashMap::new(),
            consts: HashMap::new(),
            functions: HashMap::new(),
            vars: HashMap::new(),
            declared: HashSet::new(),
        }
    }

    pub fn generate(mut self, unit: &CompilationUnit) -> CompileResult<String> {
        let mut unit = unit.clone();
        rewrite_loop_counters(&mut unit);

        self.register_decls(&unit);

        // Enum/struct typedefs and #defines, in declaration order
        let mut typedefs = String::new();
        for decl in &unit.decls {
            match decl {
                Decl::Enum(decl) => {
                    let members = decl
                        .members
                        .iter()
                        .enumerate()
                        .map(|(ordinal, member)| format!("{}_{} = {}", decl.name, member, ordinal))
                        .collect::<Vec<_>>()
                        .join(", ");
                    typedefs.push_str(&format!("typedef enum {{ {} }} {};\n", members, decl.name));
                }
                Decl::Struct(decl) => {
                    typedefs.push_str("typedef struct {\n");
                    for field in &decl.fields {
                        typedefs.push_str(&format!(
                            "    {} {};\n",
                            CType::from_name(&field.ty).c_storage(),
                            field.name
                        ));
                    }
                    typedefs.push_str(&format!("}} {};\n", decl.name));
                }
                Decl::Const(decl) => {
                    let value = self.emit_expr(&decl.value)?;
                    typedefs.push_str(&format!("#define {} {}\n", decl.name, value));
                }
                Decl::Function(_) => {}
            }
        }

        let mut prototypes = String::new();
        let mut functions = String::new();
        for decl in &unit.decls {
            if let Decl::Function(decl) = decl {
                self.emit_function(decl, &mut prototypes, &mut functions)?;
            }
        }

        // Main body scope
        self.vars.clear();
        self.declared.clear();
        self.renames.clear();
        let mut main_vars = HashMap::new();
        collect_var_types(&unit.main_body, &mut main_vars, &self.consts, &self.functions);
        self.vars = main_vars;

        let mut main_body = String::new();
        for stmt in &unit.main_body {
            self.emit_stmt(stmt, &mut main_body, 1)?;
        }

        Ok(self.assemble(&unit, &typedefs, &prototypes, &functions, &main_body))
    }

    /// Register enums, constants, and function return types before any
    /// emission, so inference never depends on emission order
    fn register_decls(&mut self, unit: &CompilationUnit) {
        for decl in &unit.decls {
            match decl {
                Decl::Enum(decl) => {
                    self.enums.insert(decl.name.clone(), decl.members.clone());
                }
                Decl::Struct(_) => {}
                Decl::Const(decl) => {
                    let empty = HashMap::new();
                    let ty = infer_expr(
                        &decl.value,
                        &TypeEnv {
                            vars: &empty,
                            consts: &self.consts,
                            functions: &self.functions,
                        },
                    );
                    self.consts.insert(decl.name.clone(), ty);
                }
                Decl::Function(decl) => {
                    if let Some(declared) = &decl.return_type {
                        self.functions
                            .insert(decl.name.clone(), CType::from_name(declared));
                    }
                }
            }
        }

        // Undeclared return types are inferred from the first returned value
        for decl in &unit.decls {
            let Decl::Function(decl) = decl else { continue };
            if self.functions.contains_key(&decl.name) {
                continue;
            }
            let mut vars = HashMap::new();
            for param in &decl.params {
                let ty = param.ty.as_deref().map_or(CType::Int, CType::from_name);
                vars.insert(param.name.clone(), ty);
            }
            collect_var_types(&decl.body.stmts, &mut vars, &self.consts, &self.functions);
            let ret = find_return(&decl.body.stmts).map_or(CType::Void, |expr| {
                infer_expr(
                    expr,
                    &TypeEnv {
                        vars: &vars,
                        consts: &self.consts,
                        functions: &self.functions,
                    },
                )
            });
            self.functions.insert(decl.name.clone(), ret);
        }
    }

    fn emit_function(
        &mut self,
        decl: &FnDecl,
        prototypes: &mut String,
        functions: &mut String,
    ) -> CompileResult<()> {
        self.vars.clear();
        self.declared.clear();
        self.renames.clear();

        let mut params = Vec::new();
        for param in &decl.params {
            let ty = param.ty.as_deref().map_or(CType::Int, CType::from_name);
            self.vars.insert(param.name.clone(), ty);
            self.declared.insert(param.name.clone());
            params.push(format!("{} {}", ty.c_storage(), param.name));
        }

        let mut vars = std::mem::take(&mut self.vars);
        collect_var_types(&decl.body.stmts, &mut vars, &self.consts, &self.functions);
        self.vars = vars;

        let ret = self.functions.get(&decl.name).copied().unwrap_or(CType::Void);
        let params_sig = if params.is_empty() {
            "void".to_string()
        } else {
            params.join(", ")
        };
        let signature = format!("{} {}({})", ret.c_storage(), pascal_case(&decl.name), params_sig);

        prototypes.push_str(&signature);
        prototypes.push_str(";\n");

        functions.push_str(&signature);
        functions.push_str(" {\n");
        for stmt in &decl.body.stmts {
            self.emit_stmt(stmt, functions, 1)?;
        }
        functions.push_str("}\n\n");
        Ok(())
    }

    fn assemble(
        &self,
        unit: &CompilationUnit,
        typedefs: &str,
        prototypes: &str,
        functions: &str,
        main_body: &str,
    ) -> String {
        let mut out = String::new();

        out.push_str("#include <stdio.h>\n");
        out.push_str("#include <stdlib.h>\n");
        out.push_str("#include <string.h>\n");
        out.push_str("#include <stdbool.h>\n");
        out.push_str("#include <stdint.h>\n");
        if self.needs_rng {
            out.push_str("#include <time.h>\n");
        }
        for header in &unit.headers {
            out.push_str(&format!("#include \"{}\"\n", header));
        }
        out.push('\n');

        if self.needs_dynamic_array {
            out.push_str(runtime::DYNAMIC_ARRAY);
            out.push('\n');
        }
        if self.needs_hashmap {
            out.push_str(runtime::HASHMAP_FORWARD);
            out.push('\n');
        }
        if !typedefs.is_empty() {
            out.push_str(typedefs);
            out.push('\n');
        }
        if self.needs_ahoy_array {
            out.push_str(runtime::AHOY_ARRAY_CORE);
            out.push('\n');
        }
        if self.needs_rng {
            out.push_str(runtime::RNG_SEED);
            out.push('\n');
        }
        for method in &self.array_methods {
            out.push_str(runtime::method_helper(method));
            out.push('\n');
        }
        if self.needs_hashmap {
            out.push_str(runtime::HASHMAP_IMPL);
            out.push('\n');
        }
        if self.needs_print_array {
            out.push_str(runtime::PRINT_ARRAY_HELPER);
            out.push('\n');
        }
        if !prototypes.is_empty() {
            out.push_str(prototypes);
            out.push('\n');
        }
        out.push_str(functions);

        out.push_str("int main() {\n");
        out.push_str(main_body);
        out.push_str("    return 0;\n}\n");
        out
    }

    // ==================== Statements ====================

    fn emit_block(&mut self, block: &Block, out: &mut String, indent: usize) -> CompileResult<()> {
        for stmt in &block.stmts {
            self.emit_stmt(stmt, out, indent)?;
        }
        Ok(())
    }

    fn emit_stmt(&mut self, stmt: &Stmt, out: &mut String, indent: usize) -> CompileResult<()> {
        let pad = "    ".repeat(indent);
        match &stmt.kind {
            StmtKind::Assign { target, value } => {
                let value_str = self.emit_expr(value)?;
                let name = self.renamed(target).to_string();
                if self.declared.contains(&name) || self.consts.contains_key(&name) {
                    out.push_str(&format!("{pad}{name} = {value_str};\n"));
                } else {
                    let ty = self.vars.get(target).copied().unwrap_or(CType::Int);
                    self.declared.insert(name.clone());
                    out.push_str(&format!("{pad}{} {name} = {value_str};\n", ty.c_storage()));
                }
            }
            StmtKind::TupleAssign { targets, values } => {
                // Every right-hand side lands in a fresh temporary before any
                // target updates, so swaps read the pre-assignment values
                let mut temps = Vec::with_capacity(values.len());
                for value in values {
                    let ty = self.infer(value);
                    let value_str = self.emit_expr(value)?;
                    let temp = format!("__temp_{}", self.temp_counter);
                    self.temp_counter += 1;
                    out.push_str(&format!("{pad}{} {temp} = {value_str};\n", ty.c_storage()));
                    temps.push(temp);
                }
                for (target, temp) in targets.iter().zip(&temps) {
                    let name = self.renamed(target).to_string();
                    if self.declared.contains(&name) || self.consts.contains_key(&name) {
                        out.push_str(&format!("{pad}{name} = {temp};\n"));
                    } else {
                        let ty = self.vars.get(target).copied().unwrap_or(CType::Int);
                        self.declared.insert(name.clone());
                        out.push_str(&format!("{pad}{} {name} = {temp};\n", ty.c_storage()));
                    }
                }
            }
            StmtKind::If { arms, else_body } => {
                for (i, arm) in arms.iter().enumerate() {
                    let cond = self.emit_expr(&arm.cond)?;
                    if i == 0 {
                        out.push_str(&format!("{pad}if ({cond}) {{\n"));
                    } else {
                        out.push_str(&format!("{pad}}} else if ({cond}) {{\n"));
                    }
                    self.emit_block(&arm.body, out, indent + 1)?;
                }
                if let Some(body) = else_body {
                    out.push_str(&format!("{pad}}} else {{\n"));
                    self.emit_block(body, out, indent + 1)?;
                }
                out.push_str(&format!("{pad}}}\n"));
            }
            StmtKind::Switch { scrutinee, cases } => {
                self.emit_switch(scrutinee, cases, out, indent)?;
            }
            StmtKind::When { flag, body } => {
                out.push_str(&format!("#ifdef {flag}\n"));
                self.emit_block(body, out, indent)?;
                out.push_str("#endif\n");
            }
            StmtKind::While { cond, body } => {
                let cond = self.emit_expr(cond)?;
                out.push_str(&format!("{pad}while ({cond}) {{\n"));
                self.emit_block(body, out, indent + 1)?;
                out.push_str(&format!("{pad}}}\n"));
            }
            StmtKind::ForRange { var, start, end, body } => {
                let counter = format!("__loop_{}_{}", var, self.loop_counter);
                self.loop_counter += 1;
                let start_str = self.emit_expr(start)?;
                let end_str = self.emit_expr(end)?;
                out.push_str(&format!(
                    "{pad}for (int {counter} = {start_str}; {counter} < {end_str}; {counter}++) {{\n"
                ));
                self.loop_stack.push(counter.clone());
                self.renames.push((var.clone(), counter.clone()));
                self.declared.insert(counter);
                self.emit_block(body, out, indent + 1)?;
                self.renames.pop();
                self.loop_stack.pop();
                out.push_str(&format!("{pad}}}\n"));
            }
            StmtKind::ForCount { start, body } => {
                let counter = format!("__loop_count_{}", self.loop_counter);
                self.loop_counter += 1;
                let start_str = match start {
                    Some(expr) => self.emit_expr(expr)?,
                    None => "0".to_string(),
                };
                out.push_str(&format!(
                    "{pad}for (int {counter} = {start_str}; ; {counter}++) {{\n"
                ));
                self.loop_stack.push(counter.clone());
                self.declared.insert(counter);
                self.emit_block(body, out, indent + 1)?;
                self.loop_stack.pop();
                out.push_str(&format!("{pad}}}\n"));
            }
            StmtKind::ForInArray { var, array, body } => {
                let storage = if self.infer(array) == CType::DynArray {
                    self.needs_dynamic_array = true;
                    "DynamicArray*"
                } else {
                    self.needs_ahoy_array = true;
                    "AhoyArray*"
                };
                let array_str = self.emit_expr(array)?;
                let iter = format!("__iter_{}", self.temp_counter);
                self.temp_counter += 1;
                let idx = format!("__loop_idx_{}", self.loop_counter);
                self.loop_counter += 1;
                let inner = "    ".repeat(indent + 1);
                let deep = "    ".repeat(indent + 2);
                out.push_str(&format!("{pad}{{\n"));
                out.push_str(&format!("{inner}{storage} {iter} = {array_str};\n"));
                out.push_str(&format!(
                    "{inner}for (int {idx} = 0; {idx} < {iter}->length; {idx}++) {{\n"
                ));
                out.push_str(&format!(
                    "{deep}int {var} = (int)(intptr_t){iter}->data[{idx}];\n"
                ));
                self.declared.insert(var.clone());
                self.emit_block(body, out, indent + 2)?;
                out.push_str(&format!("{inner}}}\n"));
                out.push_str(&format!("{pad}}}\n"));
            }
            StmtKind::ForInDict { key, value, dict, body } => {
                self.needs_hashmap = true;
                let dict_str = self.emit_expr(dict)?;
                let iter = format!("__iter_{}", self.temp_counter);
                self.temp_counter += 1;
                let bucket = format!("__bucket_{}", self.loop_counter);
                let entry = format!("__entry_{}", self.loop_counter);
                self.loop_counter += 1;
                let inner = "    ".repeat(indent + 1);
                let deep = "    ".repeat(indent + 2);
                let deepest = "    ".repeat(indent + 3);
                out.push_str(&format!("{pad}{{\n"));
                out.push_str(&format!("{inner}HashMap* {iter} = {dict_str};\n"));
                out.push_str(&format!(
                    "{inner}for (int {bucket} = 0; {bucket} < HASHMAP_BUCKETS; {bucket}++) {{\n"
                ));
                out.push_str(&format!(
                    "{deep}for (HashMapEntry* {entry} = {iter}->buckets[{bucket}]; {entry} != NULL; {entry} = {entry}->next) {{\n"
                ));
                out.push_str(&format!("{deepest}const char* {key} = {entry}->key;\n"));
                out.push_str(&format!(
                    "{deepest}const char* {value} = (const char*)(intptr_t){entry}->value;\n"
                ));
                self.declared.insert(key.clone());
                self.declared.insert(value.clone());
                self.emit_block(body, out, indent + 3)?;
                out.push_str(&format!("{deep}}}\n"));
                out.push_str(&format!("{inner}}}\n"));
                out.push_str(&format!("{pad}}}\n"));
            }
            StmtKind::Return(value) => match value {
                Some(expr) => {
                    let value_str = self.emit_expr(expr)?;
                    out.push_str(&format!("{pad}return {value_str};\n"));
                }
                None => out.push_str(&format!("{pad}return;\n")),
            },
            StmtKind::Break => out.push_str(&format!("{pad}break;\n")),
            StmtKind::Skip => out.push_str(&format!("{pad}continue;\n")),
            StmtKind::Expr(expr) => {
                let expr_str = self.emit_expr(expr)?;
                out.push_str(&format!("{pad}{expr_str};\n"));
            }
        }
        Ok(())
    }

    fn emit_switch(
        &mut self,
        scrutinee: &Expr,
        cases: &[Case],
        out: &mut String,
        indent: usize,
    ) -> CompileResult<()> {
        let pad = "    ".repeat(indent);
        let inner = "    ".repeat(indent + 1);
        let scrutinee_str = self.emit_expr(scrutinee)?;
        out.push_str(&format!("{pad}switch ({scrutinee_str}) {{\n"));

        // Range labels collect under a single guarded default
        let mut ranges: Vec<(&Expr, &Expr, &[Stmt])> = Vec::new();
        for case in cases {
            match &case.label {
                CaseLabel::List(labels) => {
                    for label in labels {
                        let label_str = self.emit_expr(label)?;
                        out.push_str(&format!("{pad}case {label_str}:\n"));
                    }
                    for stmt in &case.body {
                        self.emit_stmt(stmt, out, indent + 1)?;
                    }
                    out.push_str(&format!("{inner}break;\n"));
                }
                CaseLabel::Range(lo, hi) => ranges.push((lo, hi, &case.body)),
            }
        }

        if !ranges.is_empty() {
            out.push_str(&format!("{pad}default:\n"));
            for (lo, hi, body) in ranges {
                let lo_str = self.emit_expr(lo)?;
                let hi_str = self.emit_expr(hi)?;
                out.push_str(&format!(
                    "{inner}if (({scrutinee_str} >= {lo_str}) && ({scrutinee_str} <= {hi_str})) {{\n"
                ));
                for stmt in body {
                    self.emit_stmt(stmt, out, indent + 2)?;
                }
                out.push_str(&format!("{inner}}}\n"));
            }
            out.push_str(&format!("{inner}break;\n"));
        }

        out.push_str(&format!("{pad}}}\n"));
        Ok(())
    }

    // ==================== Expressions ====================

    fn emit_expr(&mut self, expr: &Expr) -> CompileResult<String> {
        match &expr.kind {
            ExprKind::Number(spelling) => Ok(spelling.clone()),
            ExprKind::Str(value) => Ok(format!("\"{}\"", value)),
            ExprKind::CharLit(value) => Ok(format!("'{}'", value)),
            ExprKind::Boolean(value) => Ok(if *value { "true" } else { "false" }.to_string()),
            ExprKind::Identifier(name) => Ok(self.renamed(name).to_string()),
            ExprKind::LoopCounter => self.loop_stack.last().cloned().ok_or_else(|| {
                CompileError::codegen("`__loop_counter` used outside of a loop")
            }),
            ExprKind::Unary { op, operand } => {
                let operand_str = self.emit_expr(operand)?;
                Ok(format!("({}{})", op.c_op(), operand_str))
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs_str = self.emit_expr(lhs)?;
                let rhs_str = self.emit_expr(rhs)?;
                Ok(format!("({} {} {})", lhs_str, op.c_op(), rhs_str))
            }
            ExprKind::Call { name, args } => match name.as_str() {
                "print" => self.emit_print(args),
                "sprintf" => self.emit_sprintf(args),
                _ => {
                    let args_str = self.emit_args(args)?;
                    Ok(format!("{}({})", pascal_case(name), args_str))
                }
            },
            ExprKind::MethodCall { receiver, method, args } => {
                // A receiver that is neither a variable nor an enum is an
                // import namespace; those dissolve at merge time
                if let ExprKind::Identifier(ns) = &receiver.kind {
                    if !self.vars.contains_key(ns)
                        && !self.consts.contains_key(ns)
                        && !self.enums.contains_key(ns)
                    {
                        let args_str = self.emit_args(args)?;
                        return Ok(format!("{}({})", pascal_case(method), args_str));
                    }
                }

                if method == "map" || method == "filter" {
                    if let Some(ExprKind::Lambda { param, body }) = args.first().map(|a| &a.kind) {
                        return self.emit_map_filter(receiver, method, param, body);
                    }
                }

                if let Some(canonical) = runtime::canonical_method(method) {
                    self.needs_ahoy_array = true;
                    self.array_methods.insert(canonical);
                    if runtime::method_needs_rng(canonical) {
                        self.needs_rng = true;
                    }
                    let mut call_args = vec![self.emit_expr(receiver)?];
                    for arg in args {
                        call_args.push(self.emit_expr(arg)?);
                    }
                    return Ok(format!("ahoy_array_{}({})", canonical, call_args.join(", ")));
                }

                // Unknown method: a plain call with the receiver first
                let mut call_args = vec![self.emit_expr(receiver)?];
                for arg in args {
                    call_args.push(self.emit_expr(arg)?);
                }
                Ok(format!("{}({})", pascal_case(method), call_args.join(", ")))
            }
            ExprKind::Member { receiver, name } => {
                if let ExprKind::Identifier(enum_name) = &receiver.kind {
                    if self.enums.contains_key(enum_name) {
                        return Ok(format!("{}_{}", enum_name, name));
                    }
                }
                let receiver_str = self.emit_expr(receiver)?;
                Ok(format!("{}.{}", receiver_str, name))
            }
            ExprKind::Index { receiver, index } => {
                let receiver_ty = self.infer(receiver);
                let receiver_str = self.emit_expr(receiver)?;
                let index_str = self.emit_expr(index)?;
                if receiver_ty == CType::Dict {
                    self.needs_hashmap = true;
                    Ok(format!("hashMapGet({}, {})", receiver_str, index_str))
                } else {
                    Ok(format!("{}->data[{}]", receiver_str, index_str))
                }
            }
            ExprKind::ArrayLit(elems) => self.emit_array_literal(elems),
            ExprKind::DictLit(entries) => self.emit_dict_literal(entries),
            ExprKind::Lambda { .. } => Err(CompileError::codegen(
                "lambda expression is only valid as a map or filter argument",
            )),
        }
    }

    fn emit_args(&mut self, args: &[Expr]) -> CompileResult<String> {
        let mut parts = Vec::with_capacity(args.len());
        for arg in args {
            parts.push(self.emit_expr(arg)?);
        }
        Ok(parts.join(", "))
    }

    fn emit_array_literal(&mut self, elems: &[Expr]) -> CompileResult<String> {
        let all_int = elems.iter().all(|e| self.infer(e) == CType::Int);
        let name = format!("__arr_{}", self.temp_counter);
        self.temp_counter += 1;

        let mut parts = Vec::with_capacity(elems.len() + 2);
        if all_int {
            self.needs_ahoy_array = true;
            self.array_methods.insert("push");
            parts.push(format!("AhoyArray* {name} = ahoy_array_new();"));
            for elem in elems {
                let elem_str = self.emit_expr(elem)?;
                parts.push(format!("ahoy_array_push({name}, {elem_str});"));
            }
        } else {
            self.needs_dynamic_array = true;
            parts.push(format!("DynamicArray* {name} = dyn_array_new();"));
            for elem in elems {
                let is_str = self.infer(elem) == CType::Str;
                let elem_str = self.emit_expr(elem)?;
                if is_str {
                    parts.push(format!("dyn_array_push({name}, (void*)({elem_str}));"));
                } else {
                    parts.push(format!(
                        "dyn_array_push({name}, (void*)(intptr_t)({elem_str}));"
                    ));
                }
            }
        }
        parts.push(format!("{name};"));
        Ok(format!("({{ {} }})", parts.join(" ")))
    }

    fn emit_dict_literal(&mut self, entries: &[(Expr, Expr)]) -> CompileResult<String> {
        self.needs_hashmap = true;
        let name = format!("__map_{}", self.temp_counter);
        self.temp_counter += 1;

        let mut parts = Vec::with_capacity(entries.len() + 2);
        parts.push(format!("HashMap* {name} = hashMapNew();"));
        for (key, value) in entries {
            let key_str = self.emit_expr(key)?;
            let is_str = self.infer(value) == CType::Str;
            let value_str = self.emit_expr(value)?;
            if is_str {
                parts.push(format!("hashMapPut({name}, {key_str}, (void*)({value_str}));"));
            } else {
                parts.push(format!(
                    "hashMapPut({name}, {key_str}, (void*)(intptr_t)({value_str}));"
                ));
            }
        }
        parts.push(format!("{name};"));
        Ok(format!("({{ {} }})", parts.join(" ")))
    }

    /// Inline a `map`/`filter` lambda: the parameter becomes a per-element C
    /// variable and the lambda body is emitted in place
    fn emit_map_filter(
        &mut self,
        receiver: &Expr,
        method: &str,
        param: &str,
        body: &Expr,
    ) -> CompileResult<String> {
        self.needs_ahoy_array = true;
        self.array_methods.insert("push");

        let receiver_str = self.emit_expr(receiver)?;
        let n = self.temp_counter;
        self.temp_counter += 1;
        let src = format!("__src_{n}");
        let dst = format!("__dst_{n}");
        let idx = format!("__i_{n}");

        // The lambda parameter shadows any outer loop-variable rename
        self.renames.push((param.to_string(), param.to_string()));
        let body_str = self.emit_expr(body)?;
        self.renames.pop();

        let op = if method == "map" {
            format!("ahoy_array_push({dst}, {body_str});")
        } else {
            format!("if ({body_str}) {{ ahoy_array_push({dst}, {param}); }}")
        };

        Ok(format!(
            "({{ AhoyArray* {src} = {receiver_str}; AhoyArray* {dst} = ahoy_array_new(); \
             for (int {idx} = 0; {idx} < {src}->length; {idx}++) {{ int {param} = {src}->data[{idx}]; {op} }} {dst}; }})"
        ))
    }

    fn emit_print(&mut self, args: &[Expr]) -> CompileResult<String> {
        let Some((first, rest)) = args.split_first() else {
            return Ok("printf(\"\\n\")".to_string());
        };
        let ExprKind::Str(format_str) = &first.kind else {
            // No literal format string: pass the arguments straight through
            let args_str = self.emit_args(args)?;
            return Ok(format!("printf({})", args_str));
        };

        let types: Vec<CType> = rest.iter().map(|arg| self.infer(arg)).collect();
        let rewritten = rewrite_format(format_str, &types, true);

        let mut arg_strs = Vec::with_capacity(rest.len());
        for (i, arg) in rest.iter().enumerate() {
            match rewritten.actions.get(i).copied().unwrap_or(ArgAction::Plain) {
                ArgAction::Plain => arg_strs.push(self.emit_expr(arg)?),
                ArgAction::WrapArrayHelper => {
                    self.needs_print_array = true;
                    self.needs_ahoy_array = true;
                    let arg_str = self.emit_expr(arg)?;
                    arg_strs.push(format!("__print_array_helper({})", arg_str));
                }
                ArgAction::TypeName(type_name) => arg_strs.push(format!("\"{}\"", type_name)),
            }
        }

        if arg_strs.is_empty() {
            Ok(format!("printf(\"{}\")", rewritten.format))
        } else {
            Ok(format!("printf(\"{}\", {})", rewritten.format, arg_strs.join(", ")))
        }
    }

    fn emit_sprintf(&mut self, args: &[Expr]) -> CompileResult<String> {
        let name = format!("__str_{}", self.temp_counter);
        self.temp_counter += 1;

        let Some((first, rest)) = args.split_first() else {
            return Err(CompileError::codegen("sprintf requires a format argument"));
        };
        let ExprKind::Str(format_str) = &first.kind else {
            let args_str = self.emit_args(args)?;
            return Ok(format!(
                "({{ char* {name} = malloc(256); sprintf({name}, {args_str}); {name}; }})"
            ));
        };

        let types: Vec<CType> = rest.iter().map(|arg| self.infer(arg)).collect();
        let rewritten = rewrite_format(format_str, &types, false);

        let mut arg_strs = Vec::with_capacity(rest.len());
        for (i, arg) in rest.iter().enumerate() {
            match rewritten.actions.get(i).copied().unwrap_or(ArgAction::Plain) {
                ArgAction::Plain => arg_strs.push(self.emit_expr(arg)?),
                ArgAction::WrapArrayHelper => {
                    self.needs_print_array = true;
                    self.needs_ahoy_array = true;
                    let arg_str = self.emit_expr(arg)?;
                    arg_strs.push(format!("__print_array_helper({})", arg_str));
                }
                ArgAction::TypeName(type_name) => arg_strs.push(format!("\"{}\"", type_name)),
            }
        }

        let call = if arg_strs.is_empty() {
            format!("sprintf({name}, \"{}\")", rewritten.format)
        } else {
            format!("sprintf({name}, \"{}\", {})", rewritten.format, arg_strs.join(", "))
        };
        Ok(format!("({{ char* {name} = malloc(256); {call}; {name}; }})"))
    }

    // ==================== Helpers ====================

    fn infer(&self, expr: &Expr) -> CType {
        infer_expr(
            expr,
            &TypeEnv {
                vars: &self.vars,
                consts: &self.consts,
                functions: &self.functions,
            },
        )
    }

    fn renamed<'a>(&'a self, name: &'a str) -> &'a str {
        self.renames
            .iter()
            .rev()
            .find(|(from, _)| from == name)
            .map_or(name, |(_, to)| to.as_str())
    }
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// ==================== Loop-counter rewriting ====================

/// Replace `__loop_counter` identifiers with the synthetic [`ExprKind::LoopCounter`]
/// node before emission; the emitter resolves it against its counter stack.
fn rewrite_loop_counters(unit: &mut CompilationUnit) {
    for decl in &mut unit.decls {
        match decl {
            Decl::Function(decl) => rewrite_block(&mut decl.body),
            Decl::Const(decl) => rewrite_expr(&mut decl.value),
            Decl::Struct(_) | Decl::Enum(_) => {}
        }
    }
    for stmt in &mut unit.main_body {
        rewrite_stmt(stmt);
    }
}

fn rewrite_block(block: &mut Block) {
    for stmt in &mut block.stmts {
        rewrite_stmt(stmt);
    }
}

fn rewrite_stmt(stmt: &mut Stmt) {
    match &mut stmt.kind {
        StmtKind::Assign { value, .. } => rewrite_expr(value),
        StmtKind::TupleAssign { values, .. } => values.iter_mut().for_each(rewrite_expr),
        StmtKind::If { arms, else_body } => {
            for arm in arms {
                rewrite_expr(&mut arm.cond);
                rewrite_block(&mut arm.body);
            }
            if let Some(body) = else_body {
                rewrite_block(body);
            }
        }
        StmtKind::Switch { scrutinee, cases } => {
            rewrite_expr(scrutinee);
            for case in cases {
                match &mut case.label {
                    CaseLabel::List(labels) => labels.iter_mut().for_each(rewrite_expr),
                    CaseLabel::Range(lo, hi) => {
                        rewrite_expr(lo);
                        rewrite_expr(hi);
                    }
                }
                case.body.iter_mut().for_each(rewrite_stmt);
            }
        }
        StmtKind::When { body, .. } => rewrite_block(body),
        StmtKind::While { cond, body } => {
            rewrite_expr(cond);
            rewrite_block(body);
        }
        StmtKind::ForRange { start, end, body, .. } => {
            rewrite_expr(start);
            rewrite_expr(end);
            rewrite_block(body);
        }
        StmtKind::ForCount { start, body } => {
            if let Some(start) = start {
                rewrite_expr(start);
            }
            rewrite_block(body);
        }
        StmtKind::ForInArray { array, body, .. } => {
            rewrite_expr(array);
            rewrite_block(body);
        }
        StmtKind::ForInDict { dict, body, .. } => {
            rewrite_expr(dict);
            rewrite_block(body);
        }
        StmtKind::Return(Some(value)) => rewrite_expr(value),
        StmtKind::Return(None) | StmtKind::Break | StmtKind::Skip => {}
        StmtKind::Expr(expr) => rewrite_expr(expr),
    }
}

fn rewrite_expr(expr: &mut Expr) {
    if matches!(&expr.kind, ExprKind::Identifier(name) if name == "__loop_counter") {
        expr.kind = ExprKind::LoopCounter;
        return;
    }
    match &mut expr.kind {
        ExprKind::Binary { lhs, rhs, .. } => {
            rewrite_expr(lhs);
            rewrite_expr(rhs);
        }
        ExprKind::Unary { operand, .. } => rewrite_expr(operand),
        ExprKind::Call { args, .. } => args.iter_mut().for_each(rewrite_expr),
        ExprKind::MethodCall { receiver, args, .. } => {
            rewrite_expr(receiver);
            args.iter_mut().for_each(rewrite_expr);
        }
        ExprKind::Member { receiver, .. } => rewrite_expr(receiver),
        ExprKind::Index { receiver, index } => {
            rewrite_expr(receiver);
            rewrite_expr(index);
        }
        ExprKind::ArrayLit(elems) => elems.iter_mut().for_each(rewrite_expr),
        ExprKind::DictLit(entries) => {
            for (key, value) in entries {
                rewrite_expr(key);
                rewrite_expr(value);
            }
        }
        ExprKind::Lambda { body, .. } => rewrite_expr(body),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::tokenize;
    use crate::frontend::parser::parse;
    use crate::resolver::{merge_with_imports, Package, SourceFile};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn unit_for(source: &str) -> CompilationUnit {
        let tokens = tokenize(source);
        let (_, diagnostics) = parse(&tokens);
        assert!(diagnostics.is_empty(), "diagnostics: {:?}", diagnostics);
        let package = Package {
            name: "test".to_string(),
            dir: PathBuf::from("/virtual/test"),
            files: vec![SourceFile::from_source("test.ahoy", source)],
        };
        merge_with_imports(&package, &BTreeMap::new())
    }

    fn generate(source: &str) -> String {
        generate_c(&unit_for(source)).unwrap()
    }

    #[test]
    fn test_pascal_case() {
        assert_eq!(pascal_case("util"), "Util");
        assert_eq!(pascal_case("draw_frame"), "DrawFrame");
        assert_eq!(pascal_case("a__b"), "AB");
        assert_eq!(pascal_case("parseHTTP"), "ParseHTTP");
        assert_eq!(pascal_case("__print_array_helper"), "__print_array_helper");
    }

    #[test]
    fn test_hello_world() {
        let out = generate("print(\"hello\")\n");
        assert!(out.contains("printf(\"hello\\n\")"), "{out}");
        assert!(out.contains("int main() {"));
        assert!(out.contains("    return 0;\n}"));
    }

    #[test]
    fn test_range_loop() {
        let out = generate("for i in range(0, 3) {\n  print(\"%v\", i)\n}\n");
        assert!(
            out.contains("for (int __loop_i_0 = 0; __loop_i_0 < 3; __loop_i_0++)"),
            "{out}"
        );
        assert!(out.contains("printf(\"%d\\n\", __loop_i_0);"), "{out}");
    }

    #[test]
    fn test_tuple_swap() {
        let out = generate("a = 1\nb = 2\na, b = b, a\n");
        assert!(out.contains("int __temp_0 = b;"), "{out}");
        assert!(out.contains("int __temp_1 = a;"), "{out}");
        let temps = out.find("int __temp_0").unwrap();
        let first_assign = out.find("a = __temp_0;").unwrap();
        let second_assign = out.find("b = __temp_1;").unwrap();
        assert!(temps < first_assign && first_assign < second_assign);
    }

    #[test]
    fn test_map_filter_chain() {
        let out = generate("xs = [1, 2, 3, 4].map(x => x times 2).filter(x => x greater_than 4)\n");
        assert!(out.contains("AhoyArray* xs = "), "{out}");
        // Two nested statement expressions plus the literal
        assert!(out.matches("({ AhoyArray*").count() >= 3, "{out}");
        assert!(out.contains("ahoy_array_push"), "{out}");
        assert!(out.contains("if ((x > 4)) { ahoy_array_push"), "{out}");
        // Exactly one copy of the push helper
        assert_eq!(out.matches("static AhoyArray* ahoy_array_push").count(), 1);
    }

    #[test]
    fn test_enum_typedef() {
        let out = generate("enum Color { Red, Green, Blue }\n");
        assert!(
            out.contains(
                "typedef enum { Color_Red = 0, Color_Green = 1, Color_Blue = 2 } Color;"
            ),
            "{out}"
        );
    }

    #[test]
    fn test_enum_member_access() {
        let out = generate("enum Color { Red, Green }\nc = Color.Green\n");
        assert!(out.contains("int c = Color_Green;"), "{out}");
    }

    #[test]
    fn test_struct_typedef() {
        let out = generate("struct Point {\n  x: int\n  y: float\n  label: string\n}\n");
        assert!(out.contains("typedef struct {"), "{out}");
        assert!(out.contains("    int x;"), "{out}");
        assert!(out.contains("    double y;"), "{out}");
        assert!(out.contains("    char* label;"), "{out}");
        assert!(out.contains("} Point;"), "{out}");
    }

    #[test]
    fn test_const_define() {
        let out = generate("const MAX = 100\nprint(\"%v\", MAX)\n");
        assert!(out.contains("#define MAX 100"), "{out}");
        assert!(out.contains("printf(\"%d\\n\", MAX);"), "{out}");
    }

    #[test]
    fn test_function_names_pascal_cased() {
        let out = generate("fn draw_frame() {\n  return 1\n}\ndraw_frame()\n");
        assert!(out.contains("int DrawFrame(void) {"), "{out}");
        assert!(out.contains("int DrawFrame(void);"), "{out}");
        assert!(out.contains("    DrawFrame();"), "{out}");
    }

    #[test]
    fn test_function_types() {
        let out = generate("fn scale(x: float): float {\n  return x times 2\n}\n");
        assert!(out.contains("double Scale(double x) {"), "{out}");
    }

    #[test]
    fn test_inferred_return_type() {
        let out = generate("fn half(x) {\n  return x div 2.0\n}\n");
        assert!(out.contains("double Half(int x) {"), "{out}");
    }

    #[test]
    fn test_void_function() {
        let out = generate("fn shout() {\n  print(\"hi\")\n}\n");
        assert!(out.contains("void Shout(void) {"), "{out}");
    }

    #[test]
    fn test_operator_lowering() {
        let out = generate("x = 1 plus 2 times 3\nb = x is 7 and true or not false\n");
        assert!(out.contains("int x = (1 + (2 * 3));"), "{out}");
        assert!(out.contains("(((x == 7) && true) || (!false))"), "{out}");
    }

    #[test]
    fn test_if_elseif_else() {
        let out = generate("if x is 1 {\n  print(\"a\")\n} elseif x is 2 {\n  print(\"b\")\n} else {\n  print(\"c\")\n}\n");
        assert!(out.contains("if ((x == 1)) {"), "{out}");
        assert!(out.contains("} else if ((x == 2)) {"), "{out}");
        assert!(out.contains("} else {"), "{out}");
    }

    #[test]
    fn test_switch_lowering() {
        let out = generate(
            "switch x {\ncase 1, 2:\n  print(\"low\")\ncase 10..20:\n  print(\"mid\")\n}\n",
        );
        assert!(out.contains("switch (x) {"), "{out}");
        assert!(out.contains("case 1:\n    case 2:"), "{out}");
        assert!(out.contains("default:"), "{out}");
        assert!(out.contains("if ((x >= 10) && (x <= 20)) {"), "{out}");
        // A break after every case body
        assert_eq!(out.matches("break;").count(), 2, "{out}");
    }

    #[test]
    fn test_when_ifdef() {
        let out = generate("when DEBUG {\n  print(\"dbg\")\n}\n");
        assert!(out.contains("#ifdef DEBUG\n"), "{out}");
        assert!(out.contains("#endif\n"), "{out}");
    }

    #[test]
    fn test_while_loop() {
        let out = generate("x = 0\nwhile x less_than 10 {\n  x = x plus 1\n}\n");
        assert!(out.contains("while ((x < 10)) {"), "{out}");
    }

    #[test]
    fn test_for_count_and_loop_counter() {
        let out = generate("for count {\n  print(\"%v\", __loop_counter)\n  break\n}\n");
        assert!(out.contains("for (int __loop_count_0 = 0; ; __loop_count_0++)"), "{out}");
        assert!(out.contains("printf(\"%d\\n\", __loop_count_0);"), "{out}");
    }

    #[test]
    fn test_loop_counter_rewrites_to_innermost() {
        let out = generate(
            "for i in range(0, 2) {\n  for count {\n    print(\"%v\", __loop_counter)\n    break\n  }\n}\n",
        );
        assert!(out.contains("printf(\"%d\\n\", __loop_count_1);"), "{out}");
    }

    #[test]
    fn test_loop_counter_outside_loop_fails() {
        let err = generate_c(&unit_for("print(\"%v\", __loop_counter)\n")).unwrap_err();
        assert!(matches!(err, CompileError::Codegen { .. }));
    }

    #[test]
    fn test_for_in_array() {
        let out = generate("xs = [1, 2, 3]\nfor x in xs {\n  print(\"%v\", x)\n}\n");
        assert!(out.contains("AhoyArray* __iter_"), "{out}");
        assert!(out.contains("(int)(intptr_t)"), "{out}");
        assert!(out.contains("->length;"), "{out}");
    }

    #[test]
    fn test_for_in_dict() {
        let out = generate("d = {\"a\": \"x\"}\nfor k, v in d {\n  print(\"%v %v\", k, v)\n}\n");
        assert!(out.contains("HASHMAP_BUCKETS"), "{out}");
        assert!(out.contains("const char* k = "), "{out}");
        assert!(out.contains("const char* v = (const char*)(intptr_t)"), "{out}");
        assert!(out.contains("printf(\"%s %s\\n\", k, v);"), "{out}");
    }

    #[test]
    fn test_dict_literal_and_access() {
        let out = generate("d = {\"a\": 1, \"b\": 2}\nx = d[\"a\"]\n");
        assert!(out.contains("HashMap* d = ({ HashMap* __map_0 = hashMapNew();"), "{out}");
        assert!(out.contains("hashMapPut(__map_0, \"a\", (void*)(intptr_t)(1));"), "{out}");
        assert!(out.contains("char* x = hashMapGet(d, \"a\");"), "{out}");
    }

    #[test]
    fn test_array_access() {
        let out = generate("xs = [5, 6]\ny = xs[1]\n");
        assert!(out.contains("int y = xs->data[1];"), "{out}");
    }

    #[test]
    fn test_mixed_array_uses_dynamic_runtime() {
        let out = generate("xs = [\"a\", 1]\n");
        assert!(out.contains("DynamicArray* xs = "), "{out}");
        assert!(out.contains("dyn_array_push(__arr_0, (void*)(\"a\"));"), "{out}");
        assert!(out.contains("dyn_array_push(__arr_0, (void*)(intptr_t)(1));"), "{out}");
        assert!(out.contains("typedef struct {\n    void** data;"), "{out}");
    }

    #[test]
    fn test_print_type_specifiers() {
        let out = generate("pi = 3.14\ns = \"hi\"\nprint(\"%v %v %t\", pi, s, pi)\n");
        assert!(out.contains("double pi = 3.14;"), "{out}");
        assert!(out.contains("printf(\"%f %s %s\\n\", pi, s, \"float\");"), "{out}");
    }

    #[test]
    fn test_print_array_helper() {
        let out = generate("xs = [1, 2]\nprint(\"%v\", xs)\n");
        assert!(out.contains("printf(\"%s\\n\", __print_array_helper(xs));"), "{out}");
        assert_eq!(out.matches("static char* __print_array_helper").count(), 1);
    }

    #[test]
    fn test_print_no_double_newline() {
        let out = generate("print(\"done\\n\")\n");
        assert!(out.contains("printf(\"done\\n\")"), "{out}");
        assert!(!out.contains("done\\n\\n"), "{out}");
    }

    #[test]
    fn test_sprintf_lowering() {
        let out = generate("s = sprintf(\"%v-%v\", 1, 2)\nprint(s)\n");
        assert!(out.contains("char* s = ({ char* __str_0 = malloc(256);"), "{out}");
        assert!(out.contains("sprintf(__str_0, \"%d-%d\", 1, 2);"), "{out}");
        // sprintf never gains a trailing newline
        assert!(!out.contains("%d-%d\\n"), "{out}");
    }

    #[test]
    fn test_array_methods_emitted_once_each() {
        let out = generate(
            "xs = [3, 1, 2]\nxs.push(4)\nxs.push(5)\nn = xs.sum()\ns = xs.sort()\nprint(\"%v %v\", n, s.length())\n",
        );
        assert_eq!(out.matches("static AhoyArray* ahoy_array_push").count(), 1, "{out}");
        assert_eq!(out.matches("static int ahoy_array_sum").count(), 1, "{out}");
        assert_eq!(out.matches("static AhoyArray* ahoy_array_sort").count(), 1, "{out}");
        assert_eq!(out.matches("static int ahoy_array_length").count(), 1, "{out}");
        // Unused helpers stay out
        assert!(!out.contains("ahoy_array_reverse"), "{out}");
    }

    #[test]
    fn test_shuffle_pulls_rng() {
        let out = generate("xs = [1, 2, 3].shuffle()\n");
        assert!(out.contains("#include <time.h>"), "{out}");
        assert!(out.contains("srand((unsigned)time(NULL));"), "{out}");
        assert!(out.contains("ahoy_array_shuffle"), "{out}");
    }

    #[test]
    fn test_headers_injected() {
        let mut unit = unit_for("print(\"hi\")\n");
        unit.headers.push("raylib.h".to_string());
        let out = generate_c(&unit).unwrap();
        assert!(out.contains("#include \"raylib.h\"\n"), "{out}");
    }

    #[test]
    fn test_namespaced_call_dissolves() {
        let out = generate("util.helper(1)\n");
        assert!(out.contains("    Helper(1);"), "{out}");
    }

    #[test]
    fn test_lambda_outside_map_filter_fails() {
        let err = generate_c(&unit_for("x = y => y\n")).unwrap_err();
        assert!(matches!(err, CompileError::Codegen { .. }));
    }

    #[test]
    fn test_deterministic_output() {
        let source = "xs = [1, 2].shuffle()\nd = {\"k\": 1}\nfor i in range(0, 3) {\n  print(\"%v\", i)\n}\n";
        let unit = unit_for(source);
        assert_eq!(generate_c(&unit).unwrap(), generate_c(&unit).unwrap());
    }

    #[test]
    fn test_merged_function_defined_once() {
        // Mirrors the package-merge scenario: one decl, one definition
        let out = generate("fn util() {\n  return 1\n}\nx = util()\n");
        assert_eq!(out.matches("int Util(void) {").count(), 1, "{out}");
        assert!(out.contains("int x = Util();"), "{out}");
    }
}
