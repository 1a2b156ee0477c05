use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use newsdb_core::config::{Config, Settings};
use newsdb_core::types::{BuildMode, IndexTarget, RetrievalMode, SearchFilters, SourceKind};
use newsdb_hybrid::{best_per_document, Answer, BuildReport, IndexStatus, Retrieved, Retriever};

#[derive(Parser)]
#[command(name = "newsdb", about = "Index and search a newsletter archive")]
struct Cli {
	/// Directory holding config.toml; relative paths resolve against it.
	#[arg(short = 'C', long, global = true, default_value = ".")]
	config_dir: PathBuf,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Build and inspect the indexes.
	Index {
		#[command(subcommand)]
		action: IndexAction,
	},
	/// Search the archive.
	Search {
		#[command(subcommand)]
		mode: SearchMode,
	},
	/// Answer a question from the archive with cited sources.
	Ask {
		question: String,
		#[command(flatten)]
		filters: FilterArgs,
		/// Override the configured generation model.
		#[arg(long)]
		model: Option<String>,
	},
}

#[derive(Subcommand)]
enum IndexAction {
	/// Index new and changed newsletters, drop deleted ones.
	Build {
		/// Clear the indexes and rebuild everything.
		#[arg(long)]
		reindex: bool,
		#[arg(long, conflicts_with = "vector_only")]
		fts_only: bool,
		#[arg(long)]
		vector_only: bool,
	},
	Status,
	/// Check the indexes against the recorded state.
	Verify,
}

#[derive(Subcommand)]
enum SearchMode {
	Keyword {
		query: String,
		#[command(flatten)]
		filters: FilterArgs,
	},
	Semantic {
		query: String,
		#[command(flatten)]
		filters: FilterArgs,
	},
	Hybrid {
		query: String,
		#[command(flatten)]
		filters: FilterArgs,
	},
}

#[derive(Args, Clone)]
struct FilterArgs {
	/// Maximum number of results.
	#[arg(short = 'n', long)]
	limit: Option<usize>,
	/// Only newsletters whose sender address or name contains this text.
	#[arg(short = 's', long)]
	sender: Option<String>,
	/// Earliest date, YYYY-MM-DD.
	#[arg(long)]
	since: Option<NaiveDate>,
	/// Latest date, YYYY-MM-DD.
	#[arg(long)]
	until: Option<NaiveDate>,
}

impl FilterArgs {
	fn filters(&self) -> SearchFilters {
		SearchFilters { sender: self.sender.clone(), since: self.since, until: self.until }
	}
}

fn init_tracing() {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();
	let cli = Cli::parse();
	let settings = Config::load_in(&cli.config_dir)
		.and_then(|c| c.settings())
		.with_context(|| format!("loading configuration from {}", cli.config_dir.display()))?;

	match cli.command {
		Command::Index { action } => run_index(&settings, action).await,
		Command::Search { mode } => {
			let (mode, query, filters) = match mode {
				SearchMode::Keyword { query, filters } => (RetrievalMode::Keyword, query, filters),
				SearchMode::Semantic { query, filters } => (RetrievalMode::Semantic, query, filters),
				SearchMode::Hybrid { query, filters } => (RetrievalMode::Hybrid, query, filters),
			};
			run_search(&settings, mode, &query, &filters).await
		}
		Command::Ask { question, filters, model } => run_ask(&settings, &question, &filters, model.as_deref()).await,
	}
}

async fn open(settings: &Settings, show_progress: bool) -> anyhow::Result<Arc<Retriever>> {
	newsdb_hybrid::open(settings, show_progress)
		.await
		.with_context(|| format!("opening index at {}", settings.paths.index_dir.display()))
}

async fn run_index(settings: &Settings, action: IndexAction) -> anyhow::Result<()> {
	let retriever = open(settings, std::io::stderr().is_terminal()).await?;
	let manager = retriever.manager();
	match action {
		IndexAction::Build { reindex, fts_only, vector_only } => {
			let mode = if reindex { BuildMode::Full } else { BuildMode::Incremental };
			let target = match (fts_only, vector_only) {
				(true, _) => IndexTarget::FtsOnly,
				(_, true) => IndexTarget::VectorOnly,
				_ => IndexTarget::Both,
			};
			let report = manager.build(mode, target).await.context("index build failed")?;
			print_report(&report);
		}
		IndexAction::Status => print_status(&manager.status().await.context("reading index status")?),
		IndexAction::Verify => {
			let summary = manager.verify().await.context("index verification failed")?;
			println!(
				"✅ Indexes consistent: {} keyword artifacts, {} vector artifacts",
				summary.keyword_artifacts, summary.vector_artifacts
			);
		}
	}
	Ok(())
}

fn print_report(report: &BuildReport) {
	println!("📊 Build finished in {:.1}s", report.elapsed_ms as f64 / 1000.0);
	println!(
		"   new {}  changed {}  unchanged {}  deleted {}",
		report.new, report.changed, report.unchanged, report.deleted
	);
	println!(
		"   succeeded {}  failed {}  artifact writes {}",
		report.succeeded, report.failed, report.artifact_writes
	);
	for f in &report.failures {
		println!("   ⚠️  {} [{}]: {}", f.doc_id, f.kind, f.message);
	}
}

fn print_status(status: &IndexStatus) {
	println!("Documents: {}", status.total);
	println!("   indexed {}  stale {}  unindexed {}", status.indexed, status.stale, status.unindexed);
	println!("Chunks: {} keyword, {} vector", status.keyword_chunks, status.vector_chunks);
	println!("Embedding model: {}", status.model_version);
	match status.last_build {
		Some(at) => println!("Last build: {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
		None => println!("Last build: never"),
	}
	if !status.failed.is_empty() {
		println!("Failed ({}):", status.failed.len());
		for id in &status.failed {
			println!("   {id}");
		}
	}
}

async fn run_search(settings: &Settings, mode: RetrievalMode, query: &str, args: &FilterArgs) -> anyhow::Result<()> {
	let retriever = open(settings, false).await?;
	let limit = args.limit.unwrap_or(retriever.default_limit());
	let results = retriever.retrieve(query, mode, &args.filters(), limit).await.context("search failed")?;
	let results = best_per_document(results);
	if results.is_empty() {
		println!("No results.");
		return Ok(());
	}
	for (i, r) in results.iter().enumerate() {
		print_hit(i + 1, r);
	}
	Ok(())
}

fn print_hit(rank: usize, r: &Retrieved) {
	let source = match r.hit.source {
		SourceKind::Text => "keyword",
		SourceKind::Vector => "semantic",
		SourceKind::Hybrid => "both",
	};
	println!(
		"{rank:>2}. {} ({}) {} <{}>  [{:.3} {source}]",
		r.meta.title,
		r.meta.date.format("%Y-%m-%d"),
		r.meta.publication,
		r.meta.sender,
		r.hit.score
	);
	println!("    {}", r.hit.doc_id);
	let excerpt = r.hit.snippet.clone().unwrap_or_else(|| excerpt(&r.hit.text, 200));
	println!("    {}\n", excerpt.replace('\n', " "));
}

fn excerpt(text: &str, max_chars: usize) -> String {
	let mut out: String = text.chars().take(max_chars).collect();
	if text.chars().count() > max_chars {
		out.push_str("...");
	}
	out
}

async fn run_ask(settings: &Settings, question: &str, args: &FilterArgs, model: Option<&str>) -> anyhow::Result<()> {
	let retriever = open(settings, false).await?;
	let limit = args.limit.unwrap_or(retriever.default_limit());
	let assembler = newsdb_hybrid::assembler(settings, retriever).context("setting up answer generation")?;
	let answer = assembler.answer(question, &args.filters(), limit, model).await.context("answering failed")?;
	print_answer(&answer);
	Ok(())
}

fn print_answer(answer: &Answer) {
	if let Some(warning) = &answer.warning {
		println!("⚠️  {warning}\n");
	}
	match &answer.text {
		Some(text) => println!("{text}\n"),
		None => {
			for chunk in &answer.chunks {
				let marker = answer.citations.iter().find(|c| c.doc_id == chunk.hit.doc_id).map_or(0, |c| c.marker);
				println!("[{marker}] {}\n", excerpt(chunk.hit.text.trim(), 400).replace('\n', " "));
			}
		}
	}
	if !answer.citations.is_empty() {
		println!("Sources:");
		for c in &answer.citations {
			println!("  [{}] \"{}\" - {} <{}> ({})", c.marker, c.title, c.publication, c.sender, c.date.format("%Y-%m-%d"));
		}
	}
}
