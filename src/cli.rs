// Command-line surface: argument parsing with `clap` and the table of what
// each command needs before it can run.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Upload, download and manage files on a OneDrive drive.
#[derive(Debug, Parser)]
#[command(name = "driveup", version, about)]
pub struct Cli {
    /// Path to the config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Only print errors, no progress output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Create a config file interactively
    Config,
    /// Authorize the app and store the tokens in the config
    Login,
    /// Create a folder
    Mkdir { path: String },
    /// List the contents of a folder
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Delete a file or folder
    Rm { path: String },
    /// Upload a local file into a remote folder
    Upload { local: PathBuf, path: String },
    /// Download a remote file into a local folder
    Download { source: String, local_dir: PathBuf },
    /// Show the metadata of an item
    Info { path: String },
    /// Print the SHA1 hash of a file
    Sha1 { path: String },
    /// Print the SHA256 hash of a file
    Sha256 { path: String },
}

/// What has to be in place before a command runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirements {
    /// A config file must exist and load.
    pub config: bool,
    /// A (possibly renewed) access token must be present.
    pub token: bool,
}

const NOTHING: Requirements = Requirements {
    config: false,
    token: false,
};
const CONFIG_ONLY: Requirements = Requirements {
    config: true,
    token: false,
};
const CONFIG_AND_TOKEN: Requirements = Requirements {
    config: true,
    token: true,
};

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Config => "config",
            Command::Login => "login",
            Command::Mkdir { .. } => "mkdir",
            Command::Ls { .. } => "ls",
            Command::Rm { .. } => "rm",
            Command::Upload { .. } => "upload",
            Command::Download { .. } => "download",
            Command::Info { .. } => "info",
            Command::Sha1 { .. } => "sha1",
            Command::Sha256 { .. } => "sha256",
        }
    }

    pub fn requirements(&self) -> Requirements {
        requirements(self.name()).unwrap_or(CONFIG_AND_TOKEN)
    }
}

const REQUIREMENTS: &[(&str, Requirements)] = &[
    ("config", NOTHING),
    ("login", CONFIG_ONLY),
    ("mkdir", CONFIG_AND_TOKEN),
    ("ls", CONFIG_AND_TOKEN),
    ("rm", CONFIG_AND_TOKEN),
    ("upload", CONFIG_AND_TOKEN),
    ("download", CONFIG_AND_TOKEN),
    ("info", CONFIG_AND_TOKEN),
    ("sha1", CONFIG_AND_TOKEN),
    ("sha256", CONFIG_AND_TOKEN),
];

/// Look up a command by name.
pub fn requirements(name: &str) -> Option<Requirements> {
    REQUIREMENTS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, r)| *r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_flags_and_arguments() {
        let cli = Cli::try_parse_from(["driveup", "-c", "/tmp/c.json", "-q", "upload", "a.bin", "/docs"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.json")));
        assert!(cli.quiet);
        match cli.command {
            Command::Upload { local, path } => {
                assert_eq!(local, PathBuf::from("a.bin"));
                assert_eq!(path, "/docs");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn argument_counts_are_enforced() {
        assert!(Cli::try_parse_from(["driveup", "upload", "a.bin"]).is_err());
        assert!(Cli::try_parse_from(["driveup", "info"]).is_err());
        assert!(Cli::try_parse_from(["driveup", "sha1", "a", "b"]).is_err());
        assert!(Cli::try_parse_from(["driveup", "-q", "-v", "login"]).is_err());
    }

    #[test]
    fn ls_defaults_to_root() {
        let cli = Cli::try_parse_from(["driveup", "ls"]).unwrap();
        assert!(matches!(cli.command, Command::Ls { ref path } if path == "/"));
    }

    #[test]
    fn requirement_table() {
        assert_eq!(requirements("config"), Some(NOTHING));
        assert_eq!(requirements("login"), Some(CONFIG_ONLY));
        assert_eq!(requirements("download"), Some(CONFIG_AND_TOKEN));
        assert_eq!(requirements("migrate"), None);
        assert_eq!(Command::Login.requirements(), CONFIG_ONLY);
        assert!(Command::Rm { path: "/a".into() }.requirements().token);
    }
}
