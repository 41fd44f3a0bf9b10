//! Compilation driver and pipeline orchestration
//!
//! Runs load → resolve → merge → generate, owns the output-path policy, and
//! wraps the gcc/run steps for the CLI.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::process::Command;

use crate::backend::c::generate_c;
use crate::common::{CompileError, CompileResult, Diagnostic};
use crate::resolver::{merge_with_imports, resolve_imports, PackageManager};

/// The result of compiling a source tree down to C text
#[derive(Debug)]
pub struct GeneratedProgram {
    pub c_source: String,
    /// Header paths retained from `.h` imports; drives gcc link flags
    pub headers: Vec<String>,
}

/// Compile the package rooted at `input` to C source.
///
/// Any syntax diagnostic across the package graph aborts with
/// [`CompileError::Parse`]; resolver and codegen failures surface as their
/// own variants.
pub fn compile_to_c(input: &Path) -> CompileResult<GeneratedProgram> {
    let root_dir = input
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    let mut pm = PackageManager::new(root_dir);
    let package = pm.load_package_from_file(input)?;
    let imports = resolve_imports(&package, &mut pm, input)?;

    let mut diagnostics: Vec<Diagnostic> = package.diagnostics().cloned().collect();
    for dep in imports.values() {
        diagnostics.extend(dep.diagnostics().cloned());
    }
    if !diagnostics.is_empty() {
        return Err(CompileError::Parse { diagnostics });
    }

    let unit = merge_with_imports(&package, &imports);
    let c_source = generate_c(&unit)?;
    Ok(GeneratedProgram {
        c_source,
        headers: unit.headers,
    })
}

/// Where the generated C file and binary land for a given source path:
/// `output/<base>.c` and `output/<base>`, except that sources under a
/// `test/input` segment build into the sibling `test/output`.
pub fn output_paths(input: &Path) -> (PathBuf, PathBuf) {
    let base = input
        .file_stem()
        .map_or_else(|| "out".to_string(), |s| s.to_string_lossy().into_owned());
    let out_dir = test_output_dir(input).unwrap_or_else(|| PathBuf::from("output"));
    (out_dir.join(format!("{base}.c")), out_dir.join(base))
}

fn test_output_dir(input: &Path) -> Option<PathBuf> {
    let parent = input.parent()?;
    let components: Vec<Component> = parent.components().collect();
    for i in 0..components.len().saturating_sub(1) {
        let (Component::Normal(a), Component::Normal(b)) = (&components[i], &components[i + 1])
        else {
            continue;
        };
        if a.to_str() == Some("test") && b.to_str() == Some("input") {
            let mut out = PathBuf::new();
            for component in &components[..i] {
                out.push(component.as_os_str());
            }
            out.push("test");
            out.push("output");
            for component in &components[i + 2..] {
                out.push(component.as_os_str());
            }
            return Some(out);
        }
    }
    None
}

pub fn write_c_file(path: &Path, source: &str) -> CompileResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, source)?;
    Ok(())
}

/// Linker flags for the generated C: raylib programs pull the full X11
/// stack, everything else just links libm. A raylib import with a directory
/// part contributes that directory via `-L`.
pub fn link_flags(headers: &[String]) -> Vec<String> {
    let raylib = headers
        .iter()
        .find(|h| Path::new(h).file_name().and_then(|n| n.to_str()) == Some("raylib.h"));

    match raylib {
        Some(header) => {
            let mut flags = Vec::new();
            if let Some(dir) = Path::new(header)
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
            {
                flags.push(format!("-L{}", dir.display()));
            }
            for flag in ["-lraylib", "-lm", "-lpthread", "-ldl", "-lrt", "-lX11"] {
                flags.push(flag.to_string());
            }
            flags
        }
        None => vec!["-lm".to_string()],
    }
}

/// Compile the C file with gcc
pub fn compile_c(c_path: &Path, bin_path: &Path, headers: &[String]) -> CompileResult<()> {
    let mut cmd = Command::new("gcc");
    cmd.arg(c_path).arg("-o").arg(bin_path);
    for flag in link_flags(headers) {
        cmd.arg(flag);
    }

    let output = cmd.output()?;
    if !output.status.success() {
        return Err(CompileError::build(format!(
            "gcc failed:\n{}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(())
}

/// Run the produced binary; a non-zero exit is a build error
pub fn run_binary(bin_path: &Path) -> CompileResult<()> {
    let status = Command::new(bin_path).status()?;
    if !status.success() {
        return Err(CompileError::build(format!(
            "{} exited with status {}",
            bin_path.display(),
            status.code().unwrap_or(-1)
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_paths_default() {
        let (c, bin) = output_paths(Path::new("demo/game.ahoy"));
        assert_eq!(c, PathBuf::from("output/game.c"));
        assert_eq!(bin, PathBuf::from("output/game"));
    }

    #[test]
    fn test_output_paths_test_input() {
        let (c, bin) = output_paths(Path::new("proj/test/input/case1.ahoy"));
        assert_eq!(c, PathBuf::from("proj/test/output/case1.c"));
        assert_eq!(bin, PathBuf::from("proj/test/output/case1"));
    }

    #[test]
    fn test_link_flags_plain() {
        assert_eq!(link_flags(&[]), vec!["-lm".to_string()]);
        assert_eq!(link_flags(&["math.h".to_string()]), vec!["-lm".to_string()]);
    }

    #[test]
    fn test_link_flags_raylib() {
        let flags = link_flags(&["raylib.h".to_string()]);
        assert_eq!(flags[0], "-lraylib");
        assert!(flags.contains(&"-lX11".to_string()));
        assert!(!flags.iter().any(|f| f.starts_with("-L")));
    }

    #[test]
    fn test_link_flags_raylib_with_dir() {
        let flags = link_flags(&["vendor/raylib/raylib.h".to_string()]);
        assert_eq!(flags[0], "-Lvendor/raylib");
        assert_eq!(flags[1], "-lraylib");
    }

    #[test]
    fn test_compile_to_c_end_to_end() {
        let base = std::env::temp_dir().join(format!("ahoyc_driver_{}", std::process::id()));
        fs::create_dir_all(&base).unwrap();
        fs::write(base.join("hello.ahoy"), "print(\"hello\")\n").unwrap();

        let program = compile_to_c(&base.join("hello.ahoy")).unwrap();
        assert!(program.c_source.contains("printf(\"hello\\n\")"));
        assert!(program.headers.is_empty());

        fs::remove_dir_all(&base).unwrap();
    }

    #[test]
    fn test_compile_to_c_reports_diagnostics() {
        let base = std::env::temp_dir().join(format!("ahoyc_driver_bad_{}", std::process::id()));
        fs::create_dir_all(&base).unwrap();
        fs::write(base.join("bad.ahoy"), "x = $\n").unwrap();

        let err = compile_to_c(&base.join("bad.ahoy")).unwrap_err();
        assert!(matches!(err, CompileError::Parse { .. }));

        fs::remove_dir_all(&base).unwrap();
    }
}
