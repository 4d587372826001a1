//! elk-infra - ELK logging stack topology for AWS ECS
//!
//! This is the main entry point for the elk-infra CLI.

mod cli;

use anyhow::Result;
use cli::commands::CommandContext;
use cli::{Cli, Commands, OutputFormat};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Application version information
const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    let cli = Cli::parse_args();

    init_logging(cli.verbosity(), cli.output);

    if cli.verbosity() >= 2 {
        eprintln!("elk-infra v{}", VERSION);
    }

    let mut ctx = CommandContext::new(&cli);

    let exit_code = match run(&cli, &mut ctx) {
        Ok(code) => code,
        Err(e) => {
            ctx.output.error(&e.to_string());
            exit_code_for(&e)
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: &Cli, ctx: &mut CommandContext) -> Result<i32> {
    match &cli.command {
        Commands::Synth(args) => args.execute(ctx),
        Commands::Plan(args) => args.execute(ctx),
        Commands::Graph(args) => args.execute(ctx),
        Commands::Outputs(args) => args.execute(ctx),
        Commands::Validate(args) => args.execute(ctx),
        Commands::Init(args) => args.execute(ctx),
    }
}

/// Exit status for a failed command; library errors carry their own code
fn exit_code_for(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<elk_infra::Error>()
        .map(elk_infra::Error::exit_code)
        .unwrap_or(1)
}

/// Initialize logging based on verbosity level
fn init_logging(verbosity: u8, output: OutputFormat) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // stdout carries documents, logs always go to stderr
    if output == OutputFormat::Json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(verbosity >= 3)
                    .with_writer(std::io::stderr),
            )
            .with(env_filter)
            .init();
    }
}
