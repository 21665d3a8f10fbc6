use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "ontable")]
#[command(about = "Weigh your options together, face to face")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the CLI config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Name shown to other devices in a room
    #[arg(long, global = true, value_name = "NAME")]
    pub name: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new decision
    New {
        /// Decision title
        title: String,
        /// Option to weigh (repeat for each option)
        #[arg(short, long = "option", value_name = "TITLE", required = true)]
        options: Vec<String>,
    },
    /// List saved decisions
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a decision with its scores
    Show {
        /// Decision ID or unique ID prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a decision
    Delete {
        /// Decision ID or unique ID prefix
        id: String,
    },
    /// Add a pro to an option
    Pro {
        /// Decision ID or unique ID prefix
        id: String,
        /// Option title or ID
        option: String,
        /// What speaks for the option
        text: Vec<String>,
        /// Importance from 1 to 5
        #[arg(short, long, default_value = "3")]
        weight: u8,
    },
    /// Add a con to an option
    Con {
        /// Decision ID or unique ID prefix
        id: String,
        /// Option title or ID
        option: String,
        /// What speaks against the option
        text: Vec<String>,
        /// Importance from 1 to 5
        #[arg(short, long, default_value = "3")]
        weight: u8,
    },
    /// Settle a decision on one option
    Resolve {
        /// Decision ID or unique ID prefix
        id: String,
        /// Option title or ID
        option: String,
    },
    /// Encode or decode a room invitation link
    Invite {
        /// Join code to encode
        #[arg(long, conflicts_with = "decode", required_unless_present = "decode")]
        code: Option<String>,
        /// Host display name to embed
        #[arg(long, requires = "code")]
        host: Option<String>,
        /// Invitation link to decode
        #[arg(long, value_name = "LINK")]
        decode: Option<String>,
    },
    /// Host a room for a decision on the local network
    Host {
        /// Decision ID or unique ID prefix
        id: String,
    },
    /// Join a room by code or invitation link
    Join {
        /// Six character join code or ontable:// link
        code: String,
        /// Seconds to search for the room
        #[arg(long, default_value = "30")]
        wait: u64,
    },
    /// Run a simulated room with several guests
    Demo {
        /// Number of simulated guests
        #[arg(short, long, default_value = "3")]
        guests: usize,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
