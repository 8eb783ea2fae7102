//! CLI interface for Convodesk
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Convodesk: a chat assistant next to your todo list
#[derive(Parser, Debug)]
#[command(name = "convodesk")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start an interactive chat session
    Chat {
        /// Seed template file (overrides chat.template_path)
        #[arg(short, long, value_name = "PATH")]
        template: Option<PathBuf>,

        /// Resume a saved session
        #[arg(short, long, value_name = "ID")]
        session: Option<String>,
    },

    /// List saved chat sessions
    Sessions {
        /// Number of sessions to show (default: 10)
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Manage the todo list
    Todo {
        #[command(subcommand)]
        action: TodoAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Todo list actions
#[derive(Subcommand, Debug)]
pub enum TodoAction {
    /// List all todos
    List,

    /// Add a todo
    Add {
        /// Title of the todo
        title: String,

        /// Optional description
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Show one todo
    Show {
        /// Todo ID
        id: String,
    },

    /// Mark a todo as completed
    Done {
        /// Todo ID
        id: String,
    },

    /// Edit a todo
    Edit {
        /// Todo ID
        id: String,

        /// New title
        #[arg(short, long)]
        title: Option<String>,

        /// New description
        #[arg(short, long)]
        description: Option<String>,

        /// Set completion state
        #[arg(long)]
        completed: Option<bool>,
    },

    /// Remove a todo
    Remove {
        /// Todo ID
        id: String,
    },
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
}
