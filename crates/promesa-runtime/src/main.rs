use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use promesa_ast::ast::{Expr, Program};
use promesa_globals::find_globals;
use promesa_parse::parse_str;
use promesa_runtime::{
    capture_with, on_eval_stack, Env, FutureConfig, Interpreter, OnError, OnReference,
    StrategyKind,
};
use tracing_subscriber::EnvFilter;

/// Maximum source file size in bytes (1MB)
const MAX_SOURCE_SIZE: usize = 1_000_000;

#[derive(Parser, Debug)]
#[command(name = "promesa")]
#[command(about = "Promesa: futures with pluggable evaluation strategies")]
struct Cli {
    /// Log future creation and forcing
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute a program and print its final value
    Run {
        /// Path to source file
        file: String,

        /// Load future settings from a JSON file (flags below override it)
        #[arg(long)]
        config: Option<String>,

        /// eager, lazy or sequential
        #[arg(long)]
        strategy: Option<StrategyKind>,

        /// With the sequential strategy, defer evaluation to first read
        #[arg(long)]
        lazy: bool,

        /// Evaluate futures in the calling scope instead of an isolated one
        #[arg(long)]
        no_local: bool,

        /// throw or return
        #[arg(long)]
        on_error: Option<OnError>,

        /// ignore, warning or error
        #[arg(long)]
        on_reference: Option<OnReference>,

        /// Package to attach to every future (repeatable)
        #[arg(long = "package")]
        packages: Vec<String>,
    },

    /// Parse a source file and dump the AST
    Parse {
        /// Path to source file
        file: String,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Pretty)]
        format: Format,
    },

    /// Show what a future over the whole program would capture
    Globals {
        /// Path to source file
        file: String,
    },
}

#[derive(ValueEnum, Clone, Debug)]
enum Format {
    Pretty,
    Json,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            file,
            config,
            strategy,
            lazy,
            no_local,
            on_error,
            on_reference,
            packages,
        } => {
            let code = on_eval_stack(move || -> anyhow::Result<i32> {
                let mut cfg = match config {
                    Some(path) => {
                        let src = std::fs::read_to_string(&path)
                            .with_context(|| format!("failed to read config file '{path}'"))?;
                        FutureConfig::from_json_str(&src)
                            .with_context(|| format!("invalid config file '{path}'"))?
                    }
                    None => FutureConfig::default(),
                };
                if let Some(s) = strategy {
                    cfg = cfg.with_strategy(s);
                }
                cfg.lazy |= lazy;
                if no_local {
                    cfg.local = false;
                }
                if let Some(p) = on_error {
                    cfg.on_error = p;
                }
                if let Some(p) = on_reference {
                    cfg.on_reference = p;
                }
                cfg.packages.extend(packages);
                cmd_run(&file, cfg)
            })??;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }

        Commands::Parse { file, format } => cmd_parse(&file, format),

        Commands::Globals { file } => cmd_globals(&file),
    }
}

fn load(path: &str) -> anyhow::Result<Program> {
    let src = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read source file '{}': {}", path, e))?;

    if src.len() > MAX_SOURCE_SIZE {
        eprintln!(
            "Error: source file exceeds {}MB limit ({} bytes)",
            MAX_SOURCE_SIZE / 1_000_000,
            src.len()
        );
        std::process::exit(1);
    }

    parse_str(path, &src)
}

/// Returns the process exit code.
fn cmd_run(file: &str, config: FutureConfig) -> anyhow::Result<i32> {
    let program = load(file)?;
    let mut interp = Interpreter::new(config);
    match interp.run(&program) {
        Ok(value) => {
            println!("{value}");
            Ok(0)
        }
        Err(e) => {
            eprintln!("{}", e.report());
            Ok(1)
        }
    }
}

fn cmd_parse(file: &str, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let program = load(file)?;
    match format {
        Format::Pretty => println!("{:#?}", program),
        Format::Json => println!("{}", serde_json::to_string_pretty(&program)?),
    }
    Ok(())
}

fn cmd_globals(file: &str) -> Result<(), Box<dyn std::error::Error>> {
    let program = load(file)?;
    let expr = Expr::Block(program.body);
    let globals = find_globals(&expr);
    let capture = capture_with(&expr, &Env::default(), &FutureConfig::default());
    let report = serde_json::json!({
        "globals": globals.names,
        "packages": globals.packages,
        "fingerprint": capture.fingerprint(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
