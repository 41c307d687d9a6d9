use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use skillgate_core::pipeline::context::PipelineContext;
use skillgate_core::report::{model::ToolInfo, render};
use skillgate_core::util::atomic::write_atomic;
use skillgate_core::{IntakeError, RunMode, RunOptions};

mod args;

use args::{Args, Command, OutputFormat, RunFlags};

/// Exit code when configuration is unreadable or invalid.
const CONFIG_ERROR_EXIT: i32 = 2;

fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();

    match &args.command {
        Command::Route(flags) => execute(&args, RunMode::Intake, flags),
        Command::Scan { mode, flags } => execute(&args, (*mode).into(), flags),
        Command::Taxonomy => taxonomy(&args),
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,skillgate_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn execute(args: &Args, mode: RunMode, flags: &RunFlags) -> Result<()> {
    let tool = ToolInfo {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: args.commit.clone(),
    };
    let options = RunOptions {
        root: args.root.clone(),
        config_path: args.config.clone(),
        mode,
        dry_run: flags.dry_run,
    };

    let report = match skillgate_core::run(&options, tool) {
        Ok(report) => report,
        Err(err) => exit_on_config_error(err)?,
    };

    match &flags.report {
        Some(path) => write_atomic(path, serde_json::to_string_pretty(&report)?.as_bytes())?,
        None => {
            let output = match args.format {
                OutputFormat::Json => serde_json::to_string_pretty(&report)?,
                OutputFormat::Text => render::render_text(&report),
            };
            print!("{output}");
        }
    }

    std::process::exit(report.summary.exit_code);
}

fn taxonomy(args: &Args) -> Result<()> {
    let ctx = match PipelineContext::load(&args.root, args.config.as_deref()) {
        Ok(ctx) => ctx,
        Err(err) => exit_on_config_error(err.into())?,
    };

    match args.format {
        OutputFormat::Json => {
            let categories: Vec<_> = ctx
                .taxonomy
                .categories()
                .iter()
                .map(|c| {
                    serde_json::json!({
                        "name": c.name,
                        "folder": c.folder,
                        "keywords": c.keywords,
                    })
                })
                .collect();
            let listing = serde_json::json!({
                "categories": categories,
                "fallback": ctx.taxonomy.fallback(),
            });
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        OutputFormat::Text => {
            for (rank, c) in ctx.taxonomy.categories().iter().enumerate() {
                println!("{:>2}. {} ({})", rank + 1, c.name, c.folder);
            }
            println!("fallback: {}", ctx.taxonomy.fallback());
        }
    }

    Ok(())
}

/// Configuration errors fail closed with a dedicated exit code; anything
/// else propagates.
fn exit_on_config_error<T>(err: anyhow::Error) -> Result<T> {
    if err
        .downcast_ref::<IntakeError>()
        .is_some_and(IntakeError::is_config)
    {
        eprintln!("error: {err:#}");
        std::process::exit(CONFIG_ERROR_EXIT);
    }
    Err(err)
}
