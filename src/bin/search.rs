use anyhow::Result;
use clap::Parser;
use rulebench::embeddings::build_embedder;
use rulebench::{Config, Corpus, RetrieverKind};
use std::path::PathBuf;

/// Run one query against one retriever and print the ranking.
#[derive(Parser, Debug)]
#[command(name = "search")]
struct Args {
    /// Query text
    query: String,

    /// section, sentence or hybrid
    #[arg(long, default_value = "hybrid")]
    retriever: String,

    /// Number of results
    #[arg(short = 'k', long, default_value_t = 5)]
    top_k: usize,

    /// Config file (default: $RULEBENCH_CONFIG or ./config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.query.trim().is_empty() {
        anyhow::bail!("Query cannot be empty");
    }

    let config = match &args.config {
        Some(path) => {
            let _ = dotenv::dotenv();
            Config::from_path(path)?
        }
        None => Config::load()?,
    };
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.bench.log_level.as_str()),
    )
    .init();

    let kind: RetrieverKind = args.retriever.parse()?;
    if kind == RetrieverKind::Baseline {
        anyhow::bail!("The baseline retriever only accepts precomputed query vectors; use the rulebench binary");
    }

    let corpus = Corpus::load(&config.bench.corpus_path)?;
    let embedder = build_embedder(&config.embeddings)?;
    let mut retriever = kind.create(&config, embedder);
    retriever.build_index(&corpus)?;

    let (results, metrics) = retriever.retrieve_with_metrics(&args.query, args.top_k)?;

    println!("\n╔══════════════════════════════════════════════════════════════════════════════╗");
    println!("║ RuleBench Search Results                                                     ║");
    println!("╚══════════════════════════════════════════════════════════════════════════════╝");
    println!("\nRetriever: {}", retriever.name());
    println!("Query: \"{}\"\n", args.query);

    if results.is_empty() {
        println!("No results found.");
    } else {
        for (rank, result) in results.iter().enumerate() {
            println!("─────────────────────────────────────────────────────────────────────────────");
            println!("Rank #{}: {} (score: {:.4})", rank + 1, result.section_id, result.score);
            println!("Title: {}", result.title);

            let preview: String = result.content.chars().take(200).collect();
            let ellipsis = if result.content.chars().count() > 200 { "..." } else { "" };
            println!("\n{}{}", preview, ellipsis);

            if !result.metadata.is_empty() {
                let mut keys: Vec<&String> = result.metadata.keys().collect();
                keys.sort();
                for key in keys {
                    println!("  {}: {}", key, result.metadata[key]);
                }
            }
        }
        println!("─────────────────────────────────────────────────────────────────────────────");
    }

    println!(
        "\nFound {} results in {:.2}ms",
        metrics.result_count, metrics.latency_ms
    );

    Ok(())
}
