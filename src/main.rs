use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rulebench::db::{vectors, Db};
use rulebench::embeddings::build_embedder;
use rulebench::eval::render_comparison_table;
use rulebench::search::BaselineRetriever;
use rulebench::{BenchError, Config, Corpus, Evaluator, Retriever, RetrieverKind};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Retrieval quality benchmark over rulebook sections.
#[derive(Parser, Debug)]
#[command(name = "rulebench", version)]
struct Args {
    /// Config file (default: $RULEBENCH_CONFIG or ./config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,

    /// Retrievers to evaluate, comma-separated
    #[arg(long, value_delimiter = ',', default_value = "baseline,section,sentence,hybrid")]
    retrievers: Vec<String>,

    /// Results per query (default: largest configured k)
    #[arg(long)]
    max_k: Option<usize>,

    /// Results file (default: bench.results_path)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Log every question's ranking
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load precomputed vectors ({"<id>": [f32, ...]}) into the baseline vector store
    ImportVectors {
        /// Section vectors keyed by section id
        #[arg(long)]
        sections: Option<PathBuf>,

        /// Query vectors keyed by question id
        #[arg(long)]
        queries: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            let _ = dotenv::dotenv();
            Config::from_path(path)
        }
        None => Config::load(),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.bench.log_level.as_str()),
    )
    .init();

    match &args.command {
        Some(Command::ImportVectors { sections, queries }) => {
            import_vectors(&config, sections.as_deref(), queries.as_deref())
        }
        None => run_benchmark(&config, &args),
    }
}

fn read_vector_file(path: &Path) -> Result<Vec<(String, Vec<f32>)>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let map: HashMap<String, Vec<f32>> =
        serde_json::from_str(&raw).with_context(|| format!("Invalid vector file {}", path.display()))?;
    let mut rows: Vec<(String, Vec<f32>)> = map.into_iter().collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(rows)
}

fn import_vectors(config: &Config, sections: Option<&Path>, queries: Option<&Path>) -> Result<()> {
    let db_path = config
        .baseline
        .vectors_db
        .as_ref()
        .context("baseline.vectors_db is not set in the config")?;
    let db = Db::new(db_path);
    vectors::ensure_schema(&db)?;

    if sections.is_none() && queries.is_none() {
        anyhow::bail!("Nothing to import: pass --sections and/or --queries");
    }
    if let Some(path) = sections {
        let written = vectors::store_section_vectors(&db, &read_vector_file(path)?)?;
        println!("Imported {} section vectors into {}", written, db_path.display());
    }
    if let Some(path) = queries {
        let written = vectors::store_query_vectors(&db, &read_vector_file(path)?)?;
        println!("Imported {} query vectors into {}", written, db_path.display());
    }
    Ok(())
}

fn parse_kinds(names: &[String]) -> Result<Vec<RetrieverKind>> {
    let mut kinds = Vec::new();
    for name in names {
        let kind: RetrieverKind = name.parse()?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    if kinds.is_empty() {
        anyhow::bail!("No retrievers selected");
    }
    Ok(kinds)
}

fn run_benchmark(config: &Config, args: &Args) -> Result<()> {
    let kinds = parse_kinds(&args.retrievers)?;

    let mut corpus = Corpus::load(&config.bench.corpus_path)
        .with_context(|| format!("Failed to load corpus {}", config.bench.corpus_path.display()))?;

    let query_vectors = match &config.baseline.vectors_db {
        Some(path) => {
            let db = Db::new(path);
            vectors::ensure_schema(&db)?;
            let attached = corpus.attach_vectors(vectors::load_section_vectors(&db)?);
            log::info!("Attached {} stored vectors to corpus sections", attached);
            Some(vectors::load_query_vectors(&db)?)
        }
        None => None,
    };

    let evaluator = Evaluator::new(&config.bench.ground_truth_path, &config.bench.k_values)?;
    let max_k = args
        .max_k
        .unwrap_or_else(|| config.max_k().max(evaluator.max_k()));
    if max_k < evaluator.max_k() {
        anyhow::bail!(
            "--max-k {} is below the largest evaluated k ({}); Recall@k would be computed on truncated rankings",
            max_k,
            evaluator.max_k()
        );
    }

    let embedder = if kinds.iter().any(|k| *k != RetrieverKind::Baseline) {
        Some(build_embedder(&config.embeddings)?)
    } else {
        None
    };

    println!("\n╔══════════════════════════════════════════════════════════════════════════════╗");
    println!("║ RuleBench Retrieval Benchmark                                                ║");
    println!("╚══════════════════════════════════════════════════════════════════════════════╝");
    println!(
        "\nCorpus: {} sections | Questions: {} | max_k: {}\n",
        corpus.len(),
        evaluator.questions().len(),
        max_k
    );

    let mut results = Vec::with_capacity(kinds.len());
    for kind in kinds {
        let build_start = Instant::now();
        let result = match kind {
            RetrieverKind::Baseline => {
                let query_vectors = query_vectors
                    .as_ref()
                    .context("The baseline retriever needs baseline.vectors_db with stored query vectors")?;
                let mut retriever = BaselineRetriever::new();
                retriever.build_index(&corpus)?;
                log::info!("Built {} in {:?}", retriever.name(), build_start.elapsed());

                evaluator.evaluate_with(&retriever.name(), max_k, args.verbose, |question, k| {
                    let query_vec = query_vectors.get(&question.id).ok_or_else(|| {
                        BenchError::InvalidInput(format!("no stored query vector for question {}", question.id))
                    })?;
                    retriever.retrieve_with_embedding(query_vec, k)
                })?
            }
            other => {
                let embedder = embedder.clone().context("embedder not initialised")?;
                let mut retriever = other.create(config, embedder);
                retriever
                    .build_index(&corpus)
                    .with_context(|| format!("Failed to build {}", retriever.name()))?;
                log::info!("Built {} in {:?}", retriever.name(), build_start.elapsed());

                evaluator.evaluate_retriever(retriever.as_ref(), max_k, args.verbose)?
            }
        };
        println!(
            "  {:<48} MRR {:.4}  ({} questions)",
            result.retriever_name, result.mrr, result.num_questions
        );
        results.push(result);
    }

    println!("\n=== Comparison (sorted by MRR) ===\n");
    print!("{}", render_comparison_table(&results));

    let output = args.output.as_ref().unwrap_or(&config.bench.results_path);
    evaluator.save_results(&results, output)?;
    println!("\nResults written to {}", output.display());

    Ok(())
}
