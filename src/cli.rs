//! Command-line surface

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "shadow-agent",
    version,
    about = "Supervises a managed process and reconciles its configuration from a device-shadow document"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Supervise the given program, driving it from shadow state
    Run {
        /// Program to supervise
        command: String,
        /// Arguments passed to the program
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_subcommand_is_a_usage_error() {
        let err = Cli::try_parse_from(["shadow-agent"]).unwrap_err();
        assert!(err.use_stderr());
    }

    #[test]
    fn run_collects_command_and_trailing_args() {
        let cli = Cli::try_parse_from(["shadow-agent", "run", "node-red", "-p", "1880"]).unwrap();
        let Command::Run { command, args } = cli.command;
        assert_eq!(command, "node-red");
        assert_eq!(args, vec!["-p".to_string(), "1880".to_string()]);
    }
}
