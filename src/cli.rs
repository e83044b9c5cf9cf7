use clap::Parser;

use crate::merge::MergeConfig;

#[derive(Parser)]
#[command(name = "feed-splice")]
#[command(version = "0.3.0")]
#[command(about = "Incremental merge engine for a bracket-markup social feed")]
pub struct Args {
    /// Path to the existing markup (the current managed-block body)
    pub existing: String,

    /// Path to the incoming markup; omit to just canonicalize the existing file
    pub incoming: Option<String>,

    /// Merge clock in unix milliseconds (defaults to wall-clock time)
    #[arg(long)]
    pub now_ms: Option<u64>,

    /// Characters of content prefix compared by the comment duplicate check
    #[arg(long, default_value = "20")]
    pub dedup_prefix: usize,

    /// Print entity counts of the merged set as JSON to stderr
    #[arg(long)]
    pub stats: bool,

    /// Wrap the output in the managed-block sentinel markers
    #[arg(long)]
    pub wrap: bool,

    /// Write the merged markup to this file instead of stdout
    #[arg(long)]
    pub output: Option<String>,
}

impl Args {
    pub fn merge_config(&self) -> MergeConfig {
        MergeConfig {
            dedup_prefix_chars: self.dedup_prefix,
        }
    }
}
