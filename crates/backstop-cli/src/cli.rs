use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "backstop")]
#[command(bin_name = "backstop")]
#[command(version)]
#[command(about = "Manage backup exclusion rules and review scans of a running backstop daemon")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        help = "Write a diagnostics log under ~/.config/backstop/diagnostics"
    )]
    pub diagnostics: bool,
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Backend socket; overrides BACKSTOP_SOCKET and settings.toml"
    )]
    pub socket: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    #[command(about = "Show the backend scan status")]
    Status,
    #[command(about = "Inspect the saved configuration")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    #[command(about = "Edit exclusion rules")]
    Rule {
        #[command(subcommand)]
        command: RuleCommand,
    },
    #[command(about = "Edit watched directories")]
    Dir {
        #[command(subcommand)]
        command: DirCommand,
    },
    #[command(about = "Edit paths the scanner never enters")]
    Skip {
        #[command(subcommand)]
        command: SkipCommand,
    },
    #[command(about = "Turn the no-include switch on or off")]
    NoInclude {
        #[arg(action = ArgAction::Set, value_name = "BOOL")]
        value: bool,
    },
    #[command(about = "Run, review and apply a full scan interactively")]
    Scan,
    #[command(about = "Show or change whether the daemon starts at login")]
    Autostart {
        #[arg(value_enum)]
        state: Option<Switch>,
    },
    #[command(about = "Read or write the backend key-value store")]
    Prop {
        #[command(subcommand)]
        command: PropCommand,
    },
    #[command(about = "Show or change the interface language")]
    Language { code: Option<String> },
    #[command(about = "Show exclusion metrics")]
    Stats,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Print rules, directories and skips")]
    Show,
}

#[derive(Debug, Subcommand)]
pub enum RuleCommand {
    #[command(about = "Add an empty merge rule")]
    Add { name: String },
    #[command(about = "Rename a rule")]
    Rename { old: String, new: String },
    #[command(about = "Remove a rule")]
    Remove { name: String },
    #[command(about = "Switch a rule between concrete and merge form")]
    Kind {
        name: String,
        #[arg(value_enum)]
        kind: KindArg,
    },
    #[command(about = "Replace the body of a rule")]
    Set {
        name: String,
        #[arg(long = "exclude", value_name = "PATTERN")]
        excludes: Vec<String>,
        #[arg(long = "if-exists", value_name = "FILE")]
        if_exists: Vec<String>,
        #[arg(
            long = "merge",
            value_name = "RULE",
            conflicts_with_all = ["excludes", "if_exists"]
        )]
        merge: Vec<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum DirCommand {
    #[command(about = "Watch a directory")]
    Add { path: String },
    #[command(about = "Stop watching a directory")]
    Remove { path: String },
    #[command(about = "Set the rules applied to a watched directory")]
    Rules { path: String, rules: Vec<String> },
}

#[derive(Debug, Subcommand)]
pub enum SkipCommand {
    #[command(about = "Skip a path")]
    Add { path: String },
    #[command(about = "Stop skipping a path")]
    Remove { path: String },
}

#[derive(Debug, Subcommand)]
pub enum PropCommand {
    #[command(about = "Print a stored value as JSON")]
    Get { key: String },
    #[command(about = "Store a value; JSON is parsed, anything else is kept as a string")]
    Set { key: String, value: String },
    #[command(about = "Delete a stored value")]
    Del { key: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Concrete,
    Merge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Switch {
    On,
    Off,
}

impl Command {
    /// Whether the command takes over the terminal.
    pub fn is_interactive(&self) -> bool {
        matches!(self, Self::Scan)
    }
}
