//! CLI command definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments for avakin
#[derive(Parser, Debug)]
#[command(name = "avakin")]
#[command(author, version, about = "Multi-agent development assistant with project and global knowledge")]
#[command(long_about = r#"
Avakin plans and builds software projects with a team of agent roles.

Plan mode: describe the project and refine the blueprint with the Architect,
then /approve it. Build mode: the blueprint is scaffolded, coded, reviewed and
validated; later messages become modification requests and `avakin fix`
(or /fix) reviews and repairs a traceback.

Configuration files are loaded from (in priority order):
1. --config <path>            Explicit config file
2. <project>/avakin.toml      Project-level config
3. ~/.config/avakin/config.toml   Global config
Environment variables prefixed with AVAKIN_ (nested with __) override files.

Example:
  avakin                                  Interactive session in the current directory
  avakin ingest docs/ --global            Add documents to the global knowledge store
  avakin query "how are tokens refreshed"
  avakin models set coder openai/gpt-4o --fallback ollama/qwen2.5-coder
  avakin fix --file traceback.txt
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Project root (defaults to the current directory)
    #[arg(short, long, value_name = "DIR", global = true)]
    pub project: Option<PathBuf>,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Show configuration file locations and exit
    #[arg(long)]
    pub show_config: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Start the interactive session (default)
    Chat,

    /// Add a file or directory to a knowledge store
    Ingest {
        /// File or directory to ingest
        path: PathBuf,

        #[command(flatten)]
        target: KnowledgeTarget,
    },

    /// Retrieve the chunks most similar to a query
    Query {
        /// Query text
        text: String,

        /// Number of chunks to return
        #[arg(short, default_value_t = 5)]
        k: usize,

        /// Search the project store only
        #[arg(long, conflicts_with = "global_only")]
        no_global: bool,

        /// Search the global store only
        #[arg(long)]
        global_only: bool,
    },

    /// Re-embed a store with the configured embedding model
    Rebuild {
        #[command(flatten)]
        target: KnowledgeTarget,
    },

    /// Show or change model bindings
    Models {
        #[command(subcommand)]
        action: Option<ModelsAction>,
    },

    /// Manage plugins
    Plugins {
        #[command(subcommand)]
        action: Option<PluginsAction>,
    },

    /// Review and fix the project using an error traceback
    Fix {
        /// Read the traceback from a file instead of stdin
        #[arg(short, long, value_name = "PATH")]
        file: Option<PathBuf>,
    },
}

/// Which knowledge store a command targets
#[derive(Args, Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnowledgeTarget {
    /// Target the global store instead of the project store
    #[arg(long)]
    pub global: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ModelsAction {
    /// Current role bindings (default)
    List,

    /// Models the configured providers report as available
    Available,

    /// Bind a role to a model and save it to the global config
    Set {
        /// Role name (architect, coder, reviewer, validator, chat, or a plugin role)
        role: String,

        /// Model as provider/name, e.g. ollama/llama3.1
        model: String,

        /// Backend used when the primary is unavailable
        #[arg(long, value_name = "MODEL")]
        fallback: Option<String>,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum PluginsAction {
    /// Discovered plugins and their state (default)
    List,

    /// Enable a plugin
    Enable { name: String },

    /// Disable a plugin
    Disable { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_means_interactive() {
        let cli = Cli::try_parse_from(["avakin", "-vv"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_models_set_with_fallback() {
        let cli = Cli::try_parse_from([
            "avakin",
            "models",
            "set",
            "coder",
            "openai/gpt-4o",
            "--fallback",
            "ollama/llama3.1",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Some(Command::Models {
                action: Some(ModelsAction::Set {
                    role: "coder".into(),
                    model: "openai/gpt-4o".into(),
                    fallback: Some("ollama/llama3.1".into()),
                })
            })
        );
    }

    #[test]
    fn test_query_scope_flags_conflict() {
        assert!(
            Cli::try_parse_from(["avakin", "query", "x", "--no-global", "--global-only"]).is_err()
        );
        let cli = Cli::try_parse_from(["avakin", "query", "x", "-k", "3", "--global-only"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Query { k: 3, global_only: true, .. })
        ));
    }

    #[test]
    fn test_global_project_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["avakin", "ingest", "docs", "--global", "-p", "/work/app"])
            .unwrap();
        assert_eq!(cli.project, Some(PathBuf::from("/work/app")));
        assert!(matches!(
            cli.command,
            Some(Command::Ingest { target: KnowledgeTarget { global: true }, .. })
        ));
    }
}
