pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "cloudpilot",
    about = "CloudPilot operator CLI",
    long_about = "Inspect CloudPilot configuration, check readiness, list capabilities, and run single turns against the sandbox cloud.",
    after_help = "Examples:\n  cloudpilot doctor --json\n  cloudpilot capabilities\n  cloudpilot ask --message \"List my EC2 instances\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, the capability registry, and the validation gate")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Print the capability catalog as JSON")]
    Capabilities,
    #[command(about = "Run one turn through the rule-based reasoner and the sandbox cloud")]
    Ask {
        #[arg(long, help = "User message to process")]
        message: String,
        #[arg(long, requires = "secret_access_key", help = "Access key id for mutating requests")]
        access_key_id: Option<String>,
        #[arg(long, requires = "access_key_id", help = "Secret access key paired with the key id")]
        secret_access_key: Option<String>,
        #[arg(long, help = "Region for supplied credentials (defaults to cloud.default_region)")]
        region: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Capabilities => commands::capabilities::run(),
        Command::Ask { message, access_key_id, secret_access_key, region } => {
            let credentials = match (access_key_id, secret_access_key) {
                (Some(access_key_id), Some(secret_access_key)) => {
                    Some(commands::ask::CredentialArgs { access_key_id, secret_access_key, region })
                }
                _ => None,
            };
            commands::ask::run(&message, credentials)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
