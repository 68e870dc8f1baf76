use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "colloquy",
    version,
    about = "Local voice assistant: listen, converse, speak"
)]
pub struct Cli {
    /// Path to the settings file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the assistant (default if no subcommand)
    Run {
        /// Override the interrupt mode ("always" or "wait")
        #[arg(long)]
        interrupt_mode: Option<String>,

        /// Override the wake word; an empty string disables gating
        #[arg(long)]
        wake_word: Option<String>,

        /// Override the conversation model endpoint
        #[arg(long)]
        endpoint: Option<String>,

        /// Override the conversation model id
        #[arg(long)]
        model: Option<String>,
    },

    /// List audio input and output devices
    Devices,

    /// Check the conversation endpoint and print hardware auto-selection
    Check,
}
