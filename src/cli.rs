//! CLI argument surface (spec §6). Deliberately thin — this module only
//! defines the command shape; `main.rs` wires each command to the core.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "neuronos", author, version, about = "Local agent runtime", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Number of inference threads.
    #[arg(short = 't', long, global = true)]
    pub threads: Option<usize>,

    /// Max tokens to generate.
    #[arg(short = 'n', long, global = true)]
    pub max_tokens: Option<u32>,

    /// Max agent steps before forced stop.
    #[arg(short = 's', long, global = true)]
    pub max_steps: Option<usize>,

    #[arg(long, global = true)]
    pub temp: Option<f32>,

    /// Inline GBNF grammar overriding the tool-call grammar.
    #[arg(long, global = true)]
    pub grammar: Option<String>,

    /// Directory to scan for GGUF models.
    #[arg(long, global = true)]
    pub models: Option<PathBuf>,

    #[arg(long, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print detected hardware capabilities.
    Hwinfo,

    /// Scan a directory for GGUF models and print scored candidates.
    Scan {
        #[arg(default_value = ".")]
        dir: PathBuf,
    },

    /// Auto-select the best-fit model under `--models`, then run a task.
    Auto {
        #[command(subcommand)]
        mode: AutoMode,
    },

    /// Operate on an explicitly named model file.
    Model {
        path: PathBuf,
        #[command(subcommand)]
        mode: ModelMode,
    },
}

#[derive(Subcommand, Debug)]
pub enum AutoMode {
    Generate { prompt: String },
    Agent { prompt: String },
}

#[derive(Subcommand, Debug)]
pub enum ModelMode {
    Info,
    Generate { prompt: String },
    Agent { prompt: String },
    Chat { prompt: Option<String> },
}
