//! ahoyc - Ahoy to C transpiler
//!
//! Usage: ahoyc -f <file> [-r] [--lint]

use anyhow::{bail, Context};
use clap::Parser as ClapParser;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use ahoy_compiler::common::{CompileError, Diagnostic, DiagnosticReporter};
use ahoy_compiler::driver;
use ahoy_compiler::frontend::lexer::tokenize;
use ahoy_compiler::frontend::parser::parse_lint;

#[derive(ClapParser, Debug)]
#[command(name = "ahoyc")]
#[command(version = "0.1.0")]
#[command(about = "Ahoy to C transpiler", long_about = None)]
struct Args {
    /// Input source file (.ahoy)
    #[arg(short = 'f', value_name = "FILE", required = true)]
    file: PathBuf,

    /// Compile the generated C with gcc and run the binary
    #[arg(short = 'r')]
    run: bool,

    /// Parse only; report syntax errors with line and column
    #[arg(long)]
    lint: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    if args.lint {
        return lint(&args.file);
    }
    compile(args)
}

fn lint(path: &Path) -> anyhow::Result<()> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let tokens = tokenize(&source);
    let (_, diagnostics) = parse_lint(&tokens, &path.display().to_string());

    if diagnostics.is_empty() {
        println!("no syntax errors found in {}", path.display());
        return Ok(());
    }
    for diagnostic in &diagnostics {
        eprintln!("{diagnostic}");
    }
    bail!("{} syntax error(s)", diagnostics.len());
}

fn compile(args: &Args) -> anyhow::Result<()> {
    let program = match driver::compile_to_c(&args.file) {
        Ok(program) => program,
        Err(CompileError::Parse { diagnostics }) => {
            report_diagnostics(&diagnostics);
            bail!("{} syntax error(s)", diagnostics.len());
        }
        Err(e) => return Err(e.into()),
    };

    let (c_path, bin_path) = driver::output_paths(&args.file);
    driver::write_c_file(&c_path, &program.c_source)?;
    if args.verbose {
        eprintln!("wrote {}", c_path.display());
    }

    if args.run {
        driver::compile_c(&c_path, &bin_path, &program.headers)?;
        if args.verbose {
            eprintln!("running {}", bin_path.display());
        }
        driver::run_binary(&bin_path)?;
    }

    Ok(())
}

/// Render parse diagnostics with source context where the files are readable
fn report_diagnostics(diagnostics: &[Diagnostic]) {
    let mut reporter = DiagnosticReporter::new();
    let mut file_ids: HashMap<String, usize> = HashMap::new();

    for diagnostic in diagnostics {
        let Some(file) = &diagnostic.file else {
            eprintln!("{diagnostic}");
            continue;
        };
        let file_id = match file_ids.get(file) {
            Some(id) => *id,
            None => {
                let source = fs::read_to_string(file).unwrap_or_default();
                let id = reporter.add_file(file.clone(), source);
                file_ids.insert(file.clone(), id);
                id
            }
        };
        reporter.report(file_id, diagnostic);
    }
}
