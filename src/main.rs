#![allow(unused_assignments)]

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use cpe::{CpeError, CpeResult, EnvFormat, QueryTable, Rendered};

/// Creative Property Expression tool
///
/// Parses and renders CPE templates against query data.
#[derive(Parser)]
#[command(name = "cpe")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging (overrides CPE_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the parse result as JSON
    Parse {
        #[command(flatten)]
        input: TemplateInput,
    },

    /// Evaluate a template and print the result
    Render {
        #[command(flatten)]
        input: TemplateInput,

        #[command(flatten)]
        env: EnvInput,

        /// Output format: text (default), json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Evaluate a hand-built AST given as JSON
    EvalAst {
        /// JSON file holding the tree, or '-' for stdin
        file: PathBuf,

        #[command(flatten)]
        env: EnvInput,

        /// Output format: text (default), json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Report code blocks that fall back to literal text
    Check {
        #[command(flatten)]
        input: TemplateInput,

        /// Treat any fallback as an error
        #[arg(long)]
        strict: bool,
    },
}

#[derive(Args)]
struct TemplateInput {
    /// Template file, or '-' for stdin
    #[arg(required_unless_present = "expr", conflicts_with = "expr")]
    file: Option<PathBuf>,

    /// Template text given inline
    #[arg(short, long)]
    expr: Option<String>,
}

#[derive(Args)]
struct EnvInput {
    /// Environment file: {"queries": {...}} as JSON or YAML, or '-' for stdin
    #[arg(long)]
    env: Option<PathBuf>,

    /// Environment format: json, yaml (default: from the file extension)
    #[arg(long)]
    env_format: Option<String>,
}

fn main() -> ExitCode {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))
    .ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Parse { input } => cmd_parse(input),
        Commands::Render { input, env, format } => cmd_render(input, env, format),
        Commands::EvalAst { file, env, format } => cmd_eval_ast(file, env, format),
        Commands::Check { input, strict } => cmd_check(input, strict),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let exit_code = match &e {
                CpeError::IoError { .. } => ExitCode::from(3),
                _ => ExitCode::from(1),
            };
            eprintln!("{:?}", miette::Report::new(e));
            exit_code
        }
    }
}

fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::new().filter_or("CPE_LOG", "warn"));
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.format_timestamp(None).init();
}

fn is_stdin(path: &Path) -> bool {
    path.to_str() == Some("-") || path.to_str() == Some("/dev/stdin")
}

/// Read a file, or stdin for '-'
fn read_source(path: &Path) -> CpeResult<String> {
    if is_stdin(path) {
        let mut source = String::new();
        std::io::stdin()
            .read_to_string(&mut source)
            .map_err(|e| CpeError::io_error(format!("failed to read stdin: {}", e)))?;
        return Ok(source);
    }
    std::fs::read_to_string(path)
        .map_err(|e| CpeError::io_error(format!("failed to read {}: {}", path.display(), e)))
}

impl TemplateInput {
    /// The template source and a name for messages
    fn read(&self) -> CpeResult<(String, String)> {
        match (&self.expr, &self.file) {
            (Some(expr), _) => Ok((expr.clone(), "<expr>".to_string())),
            (None, Some(file)) if is_stdin(file) => Ok((read_source(file)?, "<stdin>".to_string())),
            (None, Some(file)) => Ok((read_source(file)?, file.display().to_string())),
            (None, None) => Err(CpeError::io_error("no template given")),
        }
    }

    fn uses_stdin(&self) -> bool {
        self.expr.is_none() && self.file.as_deref().is_some_and(is_stdin)
    }
}

impl EnvInput {
    /// Load the query table, or an empty one when no file was given
    fn load(&self) -> CpeResult<QueryTable> {
        let Some(path) = &self.env else {
            return Ok(QueryTable::new());
        };

        let format = match &self.env_format {
            Some(fmt) => EnvFormat::parse(fmt).ok_or_else(|| {
                CpeError::environment_error(format!(
                    "unknown environment format '{}'. Use: json, yaml",
                    fmt
                ))
            })?,
            None => EnvFormat::from_path(path),
        };

        let content = read_source(path)?;
        let table = cpe::load_environment(&content, format)?;
        log::debug!(
            "loaded environment from {} ({} sources)",
            path.display(),
            table.names().count()
        );
        Ok(table)
    }

    fn uses_stdin(&self) -> bool {
        self.env.as_deref().is_some_and(is_stdin)
    }
}

fn print_rendered(value: &Rendered, format: &str) -> CpeResult<()> {
    match format {
        "text" => println!("{}", value),
        "json" => println!("{}", value.to_json()),
        other => {
            return Err(CpeError::io_error(format!(
                "unknown output format '{}'. Use: text, json",
                other
            )))
        }
    }
    Ok(())
}

fn cmd_parse(input: TemplateInput) -> CpeResult<()> {
    let (source, _) = input.read()?;
    let template = cpe::parse(&source);
    let json = serde_json::to_string_pretty(&template)
        .map_err(|e| CpeError::io_error(format!("failed to serialize parse result: {}", e)))?;
    println!("{}", json);
    Ok(())
}

fn cmd_render(input: TemplateInput, env: EnvInput, format: String) -> CpeResult<()> {
    if input.uses_stdin() && env.uses_stdin() {
        return Err(CpeError::io_error(
            "template and environment cannot both be read from stdin",
        ));
    }

    let (source, _) = input.read()?;
    let table = env.load()?;
    let value = cpe::render(&source, &table)?;
    print_rendered(&value, &format)
}

fn cmd_eval_ast(file: PathBuf, env: EnvInput, format: String) -> CpeResult<()> {
    if is_stdin(&file) && env.uses_stdin() {
        return Err(CpeError::io_error(
            "AST and environment cannot both be read from stdin",
        ));
    }

    let content = read_source(&file)?;
    let json: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
        CpeError::io_error(format!("failed to parse {} as JSON: {}", file.display(), e))
    })?;
    let table = env.load()?;
    let value = cpe::evaluate_json(&json, &table)?;
    print_rendered(&value, &format)
}

fn cmd_check(input: TemplateInput, strict: bool) -> CpeResult<()> {
    let (source, name) = input.read()?;
    let (_, warnings) = cpe::parse_with_warnings(&source);

    for w in &warnings {
        eprintln!("warning: {}:{}:{}: {}", name, w.line, w.column, w.message);
        eprintln!("{:?}", miette::Report::new(w.cause.clone()));
    }

    if strict && !warnings.is_empty() {
        return Err(CpeError::strict_check_failed(warnings.len()));
    }

    if warnings.is_empty() {
        eprintln!("{}: OK", name);
    } else {
        eprintln!("{}: {} warning(s)", name, warnings.len());
    }
    Ok(())
}
