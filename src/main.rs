use clap::Parser;
use colored::*;
use tracing_subscriber::EnvFilter;

use feed_splice::cli::Args;
use feed_splice::merge::merge;
use feed_splice::orchestrator::{now_ms, wrap_block};
use feed_splice::parser::parse;
use feed_splice::serializer::serialize;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("{} {}", "error:".bright_red().bold(), e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let existing_text = std::fs::read_to_string(&args.existing)?;
    let existing = parse(&existing_text);

    let merged = match &args.incoming {
        Some(path) => {
            let incoming_text = std::fs::read_to_string(path)?;
            let incoming = parse(&incoming_text);
            let clock = args.now_ms.unwrap_or_else(now_ms);
            merge(&existing, &incoming, clock, &args.merge_config())
        }
        // No incoming file: parse and re-serialize, which canonicalizes
        // ordering and drops malformed tokens.
        None => existing,
    };

    let body = serialize(&merged);
    let rendered = if args.wrap { wrap_block(&body) } else { body };

    match &args.output {
        Some(path) => std::fs::write(path, &rendered)?,
        None => println!("{rendered}"),
    }

    if args.stats {
        let stats = serde_json::json!({
            "posts": merged.posts.len(),
            "comments": merged.comments.len(),
            "hot_searches": merged.hot_searches.len(),
            "ranking_lists": merged.ranking_lists.len(),
            "has_follower_stats": merged.follower_stats.is_some(),
        });
        eprintln!("{}", serde_json::to_string_pretty(&stats)?);
    }

    eprintln!(
        "{} {} posts, {} comments",
        "merged:".bright_green().bold(),
        merged.posts.len(),
        merged.comments.len()
    );
    Ok(())
}
