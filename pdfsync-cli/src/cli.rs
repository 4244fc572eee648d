use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

const QUICKSTART_HELP: &str = "\
Get started:
  pdfsync --root /mnt/tablet add paper.pdf --author Turing --year 1936
  pdfsync send <key>          Put a PDF on the tablet
  pdfsync check               Look for files annotated on the tablet
  pdfsync get                 Bring every tracked file back";

#[derive(Parser, Debug)]
#[command(name = "pdfsync", version)]
#[command(about = "Sync PDF attachments between a reference library and an external folder")]
#[command(after_help = QUICKSTART_HELP)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Settings file (TOML); defaults to the user config directory
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Library database
    #[arg(long, global = true)]
    pub library: Option<PathBuf>,

    /// Directory holding imported attachment files
    #[arg(long, global = true)]
    pub storage: Option<PathBuf>,

    /// External folder, overriding the settings file
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Do not ask before large batches
    #[arg(long, short, global = true)]
    pub yes: bool,

    /// How to settle files changed on both sides
    #[arg(long, global = true, value_enum, default_value_t = ConflictPolicy::Ask)]
    pub on_conflict: ConflictPolicy,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Import a PDF into the library
    Add {
        file: PathBuf,

        #[arg(long)]
        title: Option<String>,

        /// Creator last name (repeatable)
        #[arg(long = "author", short)]
        authors: Vec<String>,

        #[arg(long)]
        year: Option<String>,

        /// Journal or publication
        #[arg(long)]
        publication: Option<String>,
    },

    /// Send attachments to the external folder
    Send {
        #[arg(required = true)]
        keys: Vec<String>,

        /// Project folder label from the settings
        #[arg(long, short)]
        project: Option<String>,
    },

    /// Retrieve files from the external folder (all tracked files when no key is given)
    Get { keys: Vec<String> },

    /// Check tracked files for changes made on the external folder
    Check { keys: Vec<String> },

    /// Show sync status (all tracked files when no key is given)
    Status { keys: Vec<String> },

    /// Manage the reading list
    Reading {
        #[command(subcommand)]
        action: ReadingAction,
    },

    /// Print the effective settings as TOML
    Config {
        /// Also write them to the settings file
        #[arg(long)]
        save: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ReadingAction {
    Add { keys: Vec<String> },
    Remove { keys: Vec<String> },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ConflictPolicy {
    /// Prompt for every conflict
    #[default]
    Ask,
    /// Keep the external copy
    External,
    /// Keep the library copy
    Internal,
    /// Leave conflicting files alone
    Skip,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_send_with_project() {
        let cli = Cli::try_parse_from([
            "pdfsync", "--root", "/mnt/tablet", "send", "K1", "K2", "-p", "thesis", "-vv",
        ])
        .unwrap();

        assert_eq!(cli.global.root, Some(PathBuf::from("/mnt/tablet")));
        assert_eq!(cli.global.verbose, 2);
        match cli.command {
            Command::Send { keys, project } => {
                assert_eq!(keys, vec!["K1", "K2"]);
                assert_eq!(project.as_deref(), Some("thesis"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_send_requires_keys() {
        assert!(Cli::try_parse_from(["pdfsync", "send"]).is_err());
    }

    #[test]
    fn test_parse_config_save() {
        let cli = Cli::try_parse_from(["pdfsync", "config", "--save"]).unwrap();
        assert!(matches!(cli.command, Command::Config { save: true }));
    }

    #[test]
    fn test_conflict_policy_flag() {
        let cli = Cli::try_parse_from(["pdfsync", "get", "--on-conflict", "internal"]).unwrap();
        assert_eq!(cli.global.on_conflict, ConflictPolicy::Internal);
        assert!(matches!(cli.command, Command::Get { keys } if keys.is_empty()));
    }
}
