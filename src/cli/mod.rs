//! Command-line interface.

use clap::{Parser, Subcommand};

/// Site administration backend: accounts, login and admin approval codes
#[derive(Parser, Debug)]
#[command(name = "site-admin")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Run the HTTP API until Ctrl+C (default)
    Serve {
        /// Override `server.port`
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Write a default config.toml in the current directory
    Init,
}

impl Cli {
    #[must_use]
    pub fn command(&self) -> Commands {
        self.command.unwrap_or(Commands::Serve { port: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_the_default() {
        let cli = Cli::parse_from(["site-admin"]);
        assert_eq!(cli.command(), Commands::Serve { port: None });
    }

    #[test]
    fn parses_port_override_and_init() {
        let cli = Cli::parse_from(["site-admin", "serve", "--port", "8080"]);
        assert_eq!(cli.command(), Commands::Serve { port: Some(8080) });

        let cli = Cli::parse_from(["site-admin", "init"]);
        assert_eq!(cli.command(), Commands::Init);
    }
}
