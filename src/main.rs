use anyhow::Result;
use clap::{Parser, Subcommand};
use repopipe::{init_tracing, LogFormat, ParameterArgs};

/// Source repository plus CI/CD pipeline, synthesized as one CloudFormation stack
#[derive(Parser)]
#[command(name = "repopipe")]
#[command(version)]
#[command(about = "Synthesize a CodeCommit repository and its delivery pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    params: ParameterArgs,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the CloudFormation template and asset manifest
    Synth(repopipe::synth::SynthArgs),
    /// Print resolved parameters, derived names and the chosen payload
    Plan,
    /// Create or update the stack in the target account (needs --features provision)
    Deploy(repopipe::deploy::DeployArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref(), cli.log_format);

    match cli.command {
        Commands::Synth(args) => repopipe::synth::run(args, &cli.params),
        Commands::Plan => repopipe::plan::run(&cli.params),
        Commands::Deploy(args) => repopipe::deploy::run(args, &cli.params),
    }
}
