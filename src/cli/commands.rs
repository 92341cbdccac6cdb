//! Command definitions for the Tomato CLI.
//!
//! Uses clap derive macro for argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::types::Action;

// ============================================================================
// CLI Structure
// ============================================================================

/// Tomato - a pomodoro timer daemon with a distraction blocker
#[derive(Parser, Debug)]
#[command(
    name = "tomato",
    version,
    about = "Pomodoro timer daemon and control client",
    long_about = "A background pomodoro timer.\n\
                  `tomato daemon` runs the timer and the distraction blocker; \
                  the other commands talk to it over a local socket.",
    propagate_version = true
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Control socket path (defaults to ~/.tomato/tomato.sock)
    #[arg(long, global = true, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

// ============================================================================
// Subcommands
// ============================================================================

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the timer daemon in the foreground
    Daemon {
        /// Keep interval history in memory only
        #[arg(long)]
        ephemeral: bool,
    },

    /// Show current timer status
    Status,

    /// Start the timer (resumes when paused)
    Start,

    /// Pause the running timer
    Pause,

    /// Resume a paused timer
    Resume,

    /// End the current phase and move to the next one
    Skip,

    /// Return to a fresh work phase
    Reset,

    /// Turn the distraction blocker on or off
    ToggleBlock,

    /// Block outside focus intervals too
    ToggleAlways,

    /// Print a one-line status for status bars
    Line,

    /// Show today's progress and the last seven days
    Stats,

    /// Generate shell completion scripts
    Completions {
        /// Shell type for completion script
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

impl Commands {
    /// Returns the control action a client command sends, if any.
    pub fn action(&self) -> Option<Action> {
        match self {
            Commands::Status | Commands::Line | Commands::Stats => Some(Action::Status),
            Commands::Start => Some(Action::Start),
            Commands::Pause => Some(Action::Pause),
            Commands::Resume => Some(Action::Resume),
            Commands::Skip => Some(Action::Skip),
            Commands::Reset => Some(Action::Reset),
            Commands::ToggleBlock => Some(Action::ToggleBlock),
            Commands::ToggleAlways => Some(Action::ToggleAlwaysBlock),
            Commands::Daemon { .. } | Commands::Completions { .. } => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
