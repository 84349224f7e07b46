//! CLI command definitions for yacht-maint
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod seed;

use crate::types::Level;
use clap::{Parser, Subcommand};

/// Fleet maintenance tracking from the command line
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    /// Output format: markdown (default) or json
    #[arg(short, long, default_value = "markdown", global = true)]
    pub format: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List yachts, optionally only those assigned to an engineer
    Yachts {
        #[arg(long)]
        engineer: Option<String>,
    },

    /// List engineers and whether each is assigned to a yacht
    Engineers {
        #[arg(long)]
        yacht: String,
    },

    /// Toggle one engineer's assignment to a yacht
    Assign {
        #[arg(long)]
        engineer: String,
        #[arg(long)]
        yacht: String,
    },

    /// Print the category folder tree
    Tree {
        /// Only include tasks assigned to this yacht
        #[arg(long)]
        yacht: Option<String>,

        /// Also list folders and links left out of the tree
        #[arg(long)]
        report: bool,
    },

    /// List a yacht's tasks by priority
    YachtTasks {
        #[arg(long)]
        yacht: String,
    },

    /// Mark a task complete within one category folder
    Complete {
        #[arg(long)]
        task: String,
        #[arg(long)]
        category: String,
        /// Clear the completion mark instead
        #[arg(long)]
        undo: bool,
    },

    /// Replace the set of categories a task is filed under
    Categories {
        #[arg(long)]
        task: String,
        /// Category ids; none clears every link
        categories: Vec<String>,
    },

    /// Record a measurement result for a yacht's task
    Record {
        #[arg(long)]
        yacht: String,
        #[arg(long)]
        task: String,
        /// Numeric reading
        #[arg(long)]
        value: Option<f64>,
        /// Level reading: Full, Half, Low or Empty
        #[arg(long)]
        level: Option<Level>,
    },

    /// List results recorded for a yacht, newest first
    Results {
        #[arg(long)]
        yacht: String,
    },

    /// Load a small demo fleet into the configured store
    Seed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_record_with_level() {
        let cli = Cli::parse_from([
            "yacht-maint", "record", "--yacht", "y1", "--task", "t1", "--level", "half",
        ]);
        match cli.command {
            Command::Record { level, value, .. } => {
                assert_eq!(level, Some(Level::Half));
                assert_eq!(value, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.log, "2");
    }

    #[test]
    fn categories_accepts_empty_list() {
        let cli = Cli::parse_from(["yacht-maint", "--format", "json", "categories", "--task", "t1"]);
        assert_eq!(cli.format, "json");
        assert!(matches!(cli.command, Command::Categories { ref categories, .. } if categories.is_empty()));
    }

    #[test]
    fn rejects_unknown_level() {
        assert!(
            Cli::try_parse_from([
                "yacht-maint", "record", "--yacht", "y1", "--task", "t1", "--level", "brimming",
            ])
            .is_err()
        );
    }
}
