//! CLI module - Command-line interface for rosterd

use clap::{Parser, Subcommand};

/// rosterd - self-hosted team directory
#[derive(Parser)]
#[command(name = "rosterd")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the web server
    Serve,

    /// Create an account from the command line.
    ///
    /// This is the administrative creation path: unlike self-registration
    /// it may mint privileged accounts.
    CreateUser {
        /// Login username (unique, case-insensitive)
        username: String,

        /// Display name (defaults to the username)
        #[arg(long)]
        display_name: Option<String>,

        /// Password; must satisfy the complexity policy
        #[arg(long)]
        password: String,

        /// Create a privileged account instead of a standard one
        #[arg(long)]
        privileged: bool,
    },

    /// Create default config file
    Init,
}
