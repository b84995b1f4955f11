//! CLI parse: clap types for lessonforge. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// lessonforge - generate lesson content from documents, links, and web search
#[derive(Parser)]
#[command(name = "lessonforge")]
#[command(about = "Two-phase lesson generation: outline first, content after review")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory (workspace config is read from <workspace>/config)
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Company the request is made for (falls back to LESSONFORGE_COMPANY)
    #[arg(long)]
    pub company: Option<String>,

    /// Enable verbose logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Disable logging
    #[arg(long)]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Classify, index, and outline a lesson; prints the outline and workflow token
    Start {
        /// Lesson name
        #[arg(long)]
        lesson: String,
        /// Course the lesson belongs to
        #[arg(long)]
        course: String,
        /// Learner profile or lesson description
        #[arg(long, default_value = "")]
        description: String,
        /// Lesson type (theoretical, practical, training)
        #[arg(long)]
        lesson_type: Option<String>,
        /// Document to upload (repeatable)
        #[arg(long = "doc")]
        docs: Vec<PathBuf>,
        /// Link to index (repeatable)
        #[arg(long = "link")]
        links: Vec<String>,
        /// Use web search
        #[arg(long)]
        web: bool,
        /// Include images
        #[arg(long)]
        images: bool,
    },
    /// Replace the outline of a workflow with a JSON object read from a file
    Revise {
        /// Workflow token
        #[arg(long)]
        token: String,
        /// JSON file mapping submodule titles to descriptions
        #[arg(long)]
        outline: PathBuf,
    },
    /// Generate the lesson content for a reviewed outline
    Complete {
        /// Workflow token
        #[arg(long)]
        token: String,
        /// Write the markdown document here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show recorded progress events for a workflow
    Events {
        /// Workflow token
        #[arg(long)]
        token: String,
    },
    /// Show the latest retrieval index built for a lesson
    Index {
        /// Lesson name
        #[arg(long)]
        lesson: String,
        /// Course name
        #[arg(long)]
        course: String,
    },
}
