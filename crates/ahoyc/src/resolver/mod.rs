//! Package discovery, import resolution, and AST merging
//!
//! A package is a directory of `.ahoy` files (top level only; subdirectories
//! are separate packages). Imports resolve relative to the importing file,
//! then a project-root `lib/`, then the standard library directory. Cycles
//! are not errors: a package already being resolved is treated as satisfied
//! and the shared declarations merge once.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::common::{CompileError, CompileResult, Diagnostic};
use crate::frontend::ast::{Decl, Item, Module, Stmt};
use crate::frontend::lexer::tokenize;
use crate::frontend::parser::parse_lint;

/// A parsed Ahoy source file
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub text: String,
    pub module: Module,
    /// Name from a `program` directive, if the file carries one
    pub package_name: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl SourceFile {
    /// Parse source text into a file record, stamping diagnostics with the path
    pub fn from_source(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        let path = path.into();
        let text = text.into();
        let tokens = tokenize(&text);
        let (module, diagnostics) = parse_lint(&tokens, &path.display().to_string());
        let package_name = module.items.iter().find_map(|item| match item {
            Item::Program(p) => Some(p.name.clone()),
            _ => None,
        });
        Self {
            path,
            text,
            module,
            package_name,
            diagnostics,
        }
    }
}

/// A package: a directory of source files under one name
#[derive(Debug, Clone)]
pub struct Package {
    pub name: String,
    pub dir: PathBuf,
    pub files: Vec<SourceFile>,
}

impl Package {
    /// All parse diagnostics across the package's files
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.files.iter().flat_map(|f| f.diagnostics.iter())
    }
}

/// Loads packages from disk and tracks resolution state
pub struct PackageManager {
    root_dir: PathBuf,
    std_dir: Option<PathBuf>,
    loaded: HashMap<PathBuf, Package>,
    in_progress: HashSet<PathBuf>,
}

impl PackageManager {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            std_dir: std::env::var_os("AHOY_STDLIB").map(PathBuf::from),
            loaded: HashMap::new(),
            in_progress: HashSet::new(),
        }
    }

    /// Load the package containing `path`: every top-level `.ahoy` file in
    /// its directory. Cached by canonical directory.
    pub fn load_package_from_file(&mut self, path: &Path) -> CompileResult<Package> {
        let abs = fs::canonicalize(path).map_err(|e| {
            CompileError::resolve(format!("cannot open {}: {}", path.display(), e))
        })?;
        let dir = abs
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| CompileError::resolve(format!("{} has no parent directory", abs.display())))?;

        if let Some(package) = self.loaded.get(&dir) {
            return Ok(package.clone());
        }

        let mut file_paths: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("ahoy"))
            .collect();
        file_paths.sort();

        let mut files = Vec::with_capacity(file_paths.len());
        for file_path in file_paths {
            let text = fs::read_to_string(&file_path)?;
            files.push(SourceFile::from_source(file_path, text));
        }

        // The package name comes from the root file's `program` directive,
        // falling back to the directory name
        let root_name = files
            .iter()
            .find(|f| f.path == abs)
            .and_then(|f| f.package_name.clone());
        let name = root_name.unwrap_or_else(|| {
            dir.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "main".to_string())
        });

        let package = Package {
            name,
            dir: dir.clone(),
            files,
        };
        self.loaded.insert(dir, package.clone());
        Ok(package)
    }

    /// Is the package owning `dir` currently being resolved?
    fn is_in_progress(&self, dir: &Path) -> bool {
        self.in_progress.contains(dir)
    }

    /// Resolve an import path to a source file on disk.
    ///
    /// Dotted paths map to directory separators; a bare package path may name
    /// either `<path>.ahoy` or a directory of sources. Search order:
    /// importing directory, project `lib/`, standard library.
    fn resolve_import_path(&self, import: &str, importing_dir: &Path) -> CompileResult<PathBuf> {
        let relative = if import.ends_with(".ahoy") {
            PathBuf::from(import)
        } else {
            PathBuf::from(import.replace('.', "/"))
        };

        let mut bases = vec![importing_dir.to_path_buf(), self.root_dir.join("lib")];
        if let Some(std_dir) = &self.std_dir {
            bases.push(std_dir.clone());
        }

        for base in &bases {
            let candidate = base.join(&relative);
            if candidate.extension().and_then(|e| e.to_str()) == Some("ahoy") {
                if candidate.is_file() {
                    return Ok(candidate);
                }
                continue;
            }
            let as_file = candidate.with_extension("ahoy");
            if as_file.is_file() {
                return Ok(as_file);
            }
            if candidate.is_dir() {
                let mut members: Vec<PathBuf> = fs::read_dir(&candidate)?
                    .filter_map(Result::ok)
                    .map(|entry| entry.path())
                    .filter(|p| {
                        p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("ahoy")
                    })
                    .collect();
                members.sort();
                if let Some(first) = members.into_iter().next() {
                    return Ok(first);
                }
            }
        }

        Err(CompileError::resolve(format!(
            "cannot resolve import '{}' from {}",
            import,
            importing_dir.display()
        )))
    }
}

/// Resolve every Ahoy import reachable from `package`, keyed by namespace
/// (the alias, or the imported package's name). Header imports are left for
/// [`merge_with_imports`] to collect.
pub fn resolve_imports(
    package: &Package,
    pm: &mut PackageManager,
    from_file: &Path,
) -> CompileResult<BTreeMap<String, Package>> {
    let mut imports = BTreeMap::new();
    pm.in_progress.insert(package.dir.clone());

    for file in &package.files {
        let importing_dir = file
            .path
            .parent()
            .unwrap_or_else(|| from_file.parent().unwrap_or(Path::new(".")))
            .to_path_buf();

        for item in &file.module.items {
            let Item::Import(import) = item else { continue };
            if import.is_header() {
                continue;
            }

            let resolved = pm.resolve_import_path(&import.path, &importing_dir)?;
            let dep_dir = fs::canonicalize(resolved.parent().unwrap_or(Path::new(".")))?;
            if pm.is_in_progress(&dep_dir) {
                // Cycle: the package is already on the resolution stack and
                // its declarations will merge through the shared unit
                continue;
            }

            let dep = pm.load_package_from_file(&resolved)?;
            let namespace = import.alias.clone().unwrap_or_else(|| dep.name.clone());
            let nested = resolve_imports(&dep, pm, &resolved)?;
            for (ns, nested_pkg) in nested {
                imports.entry(ns).or_insert(nested_pkg);
            }
            imports.entry(namespace).or_insert(dep);
        }
    }

    pm.in_progress.remove(&package.dir);
    Ok(imports)
}

/// The merged program handed to the code generator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompilationUnit {
    /// C header paths from `.h` imports, first-seen order, deduplicated
    pub headers: Vec<String>,
    /// Declarations, deduplicated by (kind, name) with first occurrence winning
    pub decls: Vec<Decl>,
    /// Top-level statements, in order: these become the body of `main`
    pub main_body: Vec<Stmt>,
}

/// Merge a package and its resolved imports into one compilation unit.
///
/// Imported packages are scanned first (in namespace order), then the root
/// package, so an import's definition of a name shadows the root's.
pub fn merge_with_imports(
    package: &Package,
    imports: &BTreeMap<String, Package>,
) -> CompilationUnit {
    let mut unit = CompilationUnit::default();
    let mut seen: HashSet<(&'static str, String)> = HashSet::new();

    for import in imports.values() {
        merge_package(import, &mut unit, &mut seen);
    }
    merge_package(package, &mut unit, &mut seen);

    unit
}

fn merge_package(
    package: &Package,
    unit: &mut CompilationUnit,
    seen: &mut HashSet<(&'static str, String)>,
) {
    for file in &package.files {
        for item in &file.module.items {
            match item {
                Item::Program(_) => {}
                Item::Import(import) => {
                    if import.is_header() && !unit.headers.contains(&import.path) {
                        unit.headers.push(import.path.clone());
                    }
                }
                Item::Decl(decl) => match decl {
                    Decl::Function(_) | Decl::Struct(_) | Decl::Enum(_) => {
                        let tag = match decl {
                            Decl::Function(_) => "fn",
                            Decl::Struct(_) => "struct",
                            _ => "enum",
                        };
                        if seen.insert((tag, decl.name().to_string())) {
                            unit.decls.push(decl.clone());
                        }
                    }
                    Decl::Const(_) => unit.decls.push(decl.clone()),
                },
                Item::Stmt(stmt) => unit.main_body.push(stmt.clone()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package_from(name: &str, sources: &[(&str, &str)]) -> Package {
        Package {
            name: name.to_string(),
            dir: PathBuf::from(format!("/virtual/{name}")),
            files: sources
                .iter()
                .map(|(path, text)| SourceFile::from_source(*path, *text))
                .collect(),
        }
    }

    #[test]
    fn test_merge_splits_decls_and_statements() {
        let package = package_from(
            "main",
            &[(
                "main.ahoy",
                "program main\nfn util() {\n  return 1\n}\nx = util()\nprint(\"%v\", x)\n",
            )],
        );
        let unit = merge_with_imports(&package, &BTreeMap::new());
        assert_eq!(unit.decls.len(), 1);
        assert_eq!(unit.main_body.len(), 2);
        assert!(unit.headers.is_empty());
    }

    #[test]
    fn test_merge_dedupes_by_name_imports_win() {
        let dep = package_from("util", &[("util.ahoy", "fn util() {\n  return 1\n}\n")]);
        let root = package_from(
            "main",
            &[("main.ahoy", "import util\nfn util() {\n  return 2\n}\nutil()\n")],
        );
        let mut imports = BTreeMap::new();
        imports.insert("util".to_string(), dep);

        let unit = merge_with_imports(&root, &imports);
        let functions: Vec<_> = unit
            .decls
            .iter()
            .filter_map(|d| match d {
                Decl::Function(f) => Some(f),
                _ => None,
            })
            .collect();
        assert_eq!(functions.len(), 1);
        // First occurrence wins, scanning imports before the root package
        let crate::frontend::ast::StmtKind::Return(Some(value)) =
            &functions[0].body.stmts[0].kind
        else {
            panic!("expected return");
        };
        assert!(
            matches!(&value.kind, crate::frontend::ast::ExprKind::Number(n) if n == "1")
        );
    }

    #[test]
    fn test_merge_same_kind_dedup_only() {
        // A struct and a function may share a name
        let package = package_from(
            "main",
            &[(
                "main.ahoy",
                "struct util {\n  x: int\n}\nfn util() {\n  return 1\n}\n",
            )],
        );
        let unit = merge_with_imports(&package, &BTreeMap::new());
        assert_eq!(unit.decls.len(), 2);
    }

    #[test]
    fn test_merge_collects_headers_once() {
        let dep = package_from("gfx", &[("gfx.ahoy", "import \"raylib.h\"\nfn draw() {\n  return\n}\n")]);
        let root = package_from(
            "main",
            &[("main.ahoy", "import gfx\nimport \"raylib.h\"\ndraw()\n")],
        );
        let mut imports = BTreeMap::new();
        imports.insert("gfx".to_string(), dep);

        let unit = merge_with_imports(&root, &imports);
        assert_eq!(unit.headers, vec!["raylib.h".to_string()]);
    }

    #[test]
    fn test_merge_drops_program_and_ahoy_imports() {
        let package = package_from(
            "main",
            &[("main.ahoy", "program demo\nimport util\nx = 1\n")],
        );
        let unit = merge_with_imports(&package, &BTreeMap::new());
        assert!(unit.decls.is_empty());
        assert_eq!(unit.main_body.len(), 1);
        assert!(unit.headers.is_empty());
    }

    #[test]
    fn test_constants_pass_through_unchanged() {
        let dep = package_from("a", &[("a.ahoy", "const MAX = 10\n")]);
        let root = package_from("main", &[("main.ahoy", "const MAX = 20\n")]);
        let mut imports = BTreeMap::new();
        imports.insert("a".to_string(), dep);

        let unit = merge_with_imports(&root, &imports);
        // Constants are not deduplicated
        assert_eq!(unit.decls.len(), 2);
    }

    #[test]
    fn test_load_and_resolve_from_disk() {
        let base = std::env::temp_dir().join(format!("ahoyc_resolver_{}", std::process::id()));
        let lib = base.join("mathlib");
        fs::create_dir_all(&lib).unwrap();
        fs::write(
            base.join("main.ahoy"),
            "program main\nimport mathlib\nx = double(2)\n",
        )
        .unwrap();
        fs::write(
            lib.join("mathlib.ahoy"),
            "program mathlib\nfn double(n) {\n  return n times 2\n}\n",
        )
        .unwrap();

        let mut pm = PackageManager::new(&base);
        let root_file = base.join("main.ahoy");
        let package = pm.load_package_from_file(&root_file).unwrap();
        assert_eq!(package.name, "main");
        assert_eq!(package.files.len(), 1);

        let imports = resolve_imports(&package, &mut pm, &root_file).unwrap();
        assert!(imports.contains_key("mathlib"));

        let unit = merge_with_imports(&package, &imports);
        assert_eq!(unit.decls.len(), 1);
        assert!(matches!(&unit.decls[0], Decl::Function(f) if f.name == "double"));
        assert_eq!(unit.main_body.len(), 1);

        fs::remove_dir_all(&base).unwrap();
    }

    #[test]
    fn test_cyclic_imports_merge_silently() {
        let base = std::env::temp_dir().join(format!("ahoyc_cycle_{}", std::process::id()));
        let a = base.join("a");
        let b = base.join("b");
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();
        fs::write(a.join("a.ahoy"), "program a\nimport \"../b/b.ahoy\"\nfn fa() {\n  return 1\n}\n")
            .unwrap();
        fs::write(b.join("b.ahoy"), "program b\nimport \"../a/a.ahoy\"\nfn fb() {\n  return 2\n}\n")
            .unwrap();

        let mut pm = PackageManager::new(&base);
        let root_file = a.join("a.ahoy");
        let package = pm.load_package_from_file(&root_file).unwrap();
        let imports = resolve_imports(&package, &mut pm, &root_file).unwrap();
        assert!(imports.contains_key("b"));

        let unit = merge_with_imports(&package, &imports);
        let names: Vec<_> = unit.decls.iter().map(|d| d.name().to_string()).collect();
        assert!(names.contains(&"fa".to_string()));
        assert!(names.contains(&"fb".to_string()));

        fs::remove_dir_all(&base).unwrap();
    }

    #[test]
    fn test_missing_import_is_resolve_error() {
        let base = std::env::temp_dir().join(format!("ahoyc_missing_{}", std::process::id()));
        fs::create_dir_all(&base).unwrap();
        fs::write(base.join("main.ahoy"), "import nowhere\n").unwrap();

        let mut pm = PackageManager::new(&base);
        let root_file = base.join("main.ahoy");
        let package = pm.load_package_from_file(&root_file).unwrap();
        let err = resolve_imports(&package, &mut pm, &root_file).unwrap_err();
        assert!(matches!(err, CompileError::Resolve { .. }));

        fs::remove_dir_all(&base).unwrap();
    }
}
