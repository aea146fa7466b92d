// Entrypoint for the reassignment tool.
// - Keeps `main` small: load configuration, build the API client and hand
//   it to the UI flow.
// - Exit codes: 0 on success or operator cancel, 1 on any failure.

use std::path::PathBuf;
use std::process::ExitCode;

use asm_reassign::api::ApiClient;
use asm_reassign::config::{Config, ServerMap};
use asm_reassign::token::TokenIssuer;
use asm_reassign::ui::{self, RunOutcome, TerminalConsole};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Reassign an Apple School Manager device to another MDM server.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// TOML file mapping menu names to server ids.
    #[arg(long, env = "ASM_SERVERS_FILE")]
    servers: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List the management servers known to Apple School Manager.
    Servers,
}

fn init_logging() {
    // Diagnostics go to stderr; the default level keeps the prompts clean.
    let filter = EnvFilter::try_from_env("ASM_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<RunOutcome> {
    let config = Config::from_env();
    let credentials = config.load_credentials()?;
    let issuer = TokenIssuer::new(&credentials)?;
    let api = ApiClient::from_config(&config, issuer)?;
    let mut console = TerminalConsole::new();

    let outcome = match cli.command {
        Some(Command::Servers) => ui::show_servers(&api, &mut console)?,
        None => {
            let servers = ServerMap::load(cli.servers.as_deref())?;
            ui::run(&api, &servers, &mut console)?
        }
    };
    Ok(outcome)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    match run(cli) {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_arguments_runs_interactive_flow() {
        let cli = Cli::try_parse_from(["asm-reassign"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn servers_subcommand_parses() {
        let cli = Cli::try_parse_from(["asm-reassign", "servers"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Servers)));
    }

    #[test]
    fn mapping_file_flag_parses() {
        let cli = Cli::try_parse_from(["asm-reassign", "--servers", "/etc/asm/servers.toml"]).unwrap();
        assert_eq!(cli.servers.unwrap(), PathBuf::from("/etc/asm/servers.toml"));
    }

    #[test]
    fn mapping_file_flag_falls_back_to_environment() {
        use clap::CommandFactory;
        let cmd = Cli::command();
        let arg = cmd
            .get_arguments()
            .find(|a| a.get_id() == "servers")
            .unwrap();
        assert_eq!(arg.get_env(), Some(std::ffi::OsStr::new("ASM_SERVERS_FILE")));
    }

    #[test]
    fn unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["asm-reassign", "delete"]).is_err());
    }
}
