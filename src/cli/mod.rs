//! Command-line interface for todo
//!
//! This module defines the CLI structure using clap derive macros.
//! Command implementations live in `task`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::error::Result;
use crate::storage::DATA_DIR_ENV;

mod task;

/// todo - a personal todo list with reminders
#[derive(Parser, Debug)]
#[command(name = "todo")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Data directory (defaults to the platform data directory)
    #[arg(long, global = true, env = DATA_DIR_ENV)]
    pub dir: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Write store change events as JSON lines to a file, or `-` for stdout
    #[arg(long, global = true)]
    pub events: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List tasks in display order with their positions
    List {
        /// Only show tasks whose title contains this text
        filter: Option<String>,

        /// Show the built-in demo tasks instead of the saved list
        #[arg(long)]
        seed: bool,
    },

    /// Add a task
    Add {
        /// Task title
        title: String,

        /// Longer description
        #[arg(short, long)]
        description: Option<String>,

        /// Priority: low, medium, high
        #[arg(short, long)]
        priority: Option<String>,

        /// Schedule a reminder at "YYYY-MM-DD HH:MM" (local time)
        #[arg(long)]
        remind_at: Option<String>,
    },

    /// Edit a task
    Edit {
        /// Task ID (or unique prefix)
        id: String,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New description
        #[arg(short, long)]
        description: Option<String>,

        /// New priority: low, medium, high
        #[arg(short, long)]
        priority: Option<String>,

        /// Schedule a reminder at "YYYY-MM-DD HH:MM" (local time)
        #[arg(long, conflicts_with = "no_remind")]
        remind_at: Option<String>,

        /// Turn the reminder off
        #[arg(long)]
        no_remind: bool,
    },

    /// Show one task
    Show {
        /// Task ID (or unique prefix)
        id: String,
    },

    /// Mark a task completed
    Done {
        /// Task ID (or unique prefix)
        id: String,
    },

    /// Mark a task not completed
    Undone {
        /// Task ID (or unique prefix)
        id: String,
    },

    /// Flip a task's completion
    Toggle {
        /// Task ID (or unique prefix)
        id: String,
    },

    /// Remove tasks by their positions in `todo list`
    Rm {
        /// Positions as shown by `todo list`
        #[arg(required = true)]
        positions: Vec<usize>,

        /// Positions refer to the list filtered by this text
        #[arg(long)]
        filter: Option<String>,
    },

    /// Remove all completed tasks
    ClearCompleted,

    /// Remove every task
    Clear,

    /// Show reminders waiting for delivery
    Reminders,
}

/// Options shared by every command
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    pub dir: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
    pub events: Option<String>,
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let global = GlobalOptions {
            dir: self.dir,
            json: self.json,
            quiet: self.quiet,
            events: self.events,
        };

        match self.command {
            Commands::List { filter, seed } => task::run_list(
                &global,
                task::ListOptions {
                    filter: filter.unwrap_or_default(),
                    seed,
                },
            ),
            Commands::Add {
                title,
                description,
                priority,
                remind_at,
            } => task::run_add(
                &global,
                task::AddOptions {
                    title,
                    description,
                    priority,
                    remind_at,
                },
            ),
            Commands::Edit {
                id,
                title,
                description,
                priority,
                remind_at,
                no_remind,
            } => task::run_edit(
                &global,
                task::EditOptions {
                    id,
                    title,
                    description,
                    priority,
                    remind_at,
                    no_remind,
                },
            ),
            Commands::Show { id } => task::run_show(&global, &id),
            Commands::Done { id } => {
                task::run_set_completed(&global, &id, task::CompletionChange::Complete)
            }
            Commands::Undone { id } => {
                task::run_set_completed(&global, &id, task::CompletionChange::Reopen)
            }
            Commands::Toggle { id } => {
                task::run_set_completed(&global, &id, task::CompletionChange::Toggle)
            }
            Commands::Rm { positions, filter } => task::run_rm(
                &global,
                task::RmOptions {
                    positions,
                    filter: filter.unwrap_or_default(),
                },
            ),
            Commands::ClearCompleted => task::run_clear_completed(&global),
            Commands::Clear => task::run_clear(&global),
            Commands::Reminders => task::run_reminders(&global),
        }
    }
}
