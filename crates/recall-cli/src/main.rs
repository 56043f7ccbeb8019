//! Recall - conversational memory from the command line
//!
//! The `recall` command runs the memory engine in-process.
//!
//! ## Commands
//!
//! - `chat`: read messages from stdin, print the recalled context for each
//! - `replay`: run a transcript and print one JSON outcome per turn
//! - `status`: run a transcript and print per-user activation status
//! - `config`: print or check the effective configuration

mod telemetry;
mod transcript;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use recall_core::{ContextBudget, EngineConfig, MemoryEngine, TurnOutcome};
use serde::Serialize;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "recall")]
#[command(version = recall_core::VERSION)]
#[command(about = "Activation-based memory retrieval for chat agents", long_about = None)]
struct Cli {
	/// Enable verbose output
	#[arg(short, long, global = true)]
	verbose: bool,

	/// Emit JSON-formatted log lines
	#[arg(long, global = true)]
	json: bool,

	/// TOML config file; RECALL_* variables override its values
	#[arg(short, long, global = true, env = "RECALL_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// Read one message per line from stdin and show what is recalled
	Chat {
		/// User the messages belong to
		#[arg(short, long, default_value = "default")]
		user: String,

		#[command(flatten)]
		budget: BudgetArgs,
	},

	/// Run a transcript and print each turn's outcome as a JSON line
	Replay {
		/// Transcript file (`user: text` or JSON object per line)
		file: PathBuf,

		#[command(flatten)]
		budget: BudgetArgs,
	},

	/// Run a transcript quietly and print per-user status
	Status {
		/// Transcript file
		file: PathBuf,
	},

	/// Inspect the effective configuration
	Config {
		#[command(subcommand)]
		action: ConfigAction,
	},
}

#[derive(Subcommand)]
enum ConfigAction {
	/// Print the configuration as TOML
	Show,
	/// Validate the configuration and exit
	Check,
}

#[derive(clap::Args, Clone, Copy, Debug, Default)]
struct BudgetArgs {
	/// Override the maximum number of recalled memories
	#[arg(long)]
	max_items: Option<usize>,

	/// Override the maximum recalled characters
	#[arg(long)]
	max_chars: Option<usize>,
}

impl BudgetArgs {
	fn resolve(self, default: &ContextBudget) -> ContextBudget {
		ContextBudget {
			max_items: self.max_items.unwrap_or(default.max_items),
			max_chars: self.max_chars.unwrap_or(default.max_chars),
			..*default
		}
	}
}

#[derive(Serialize)]
struct ReplayRecord<'a> {
	user_id: &'a str,
	text: &'a str,
	#[serde(flatten)]
	outcome: &'a TurnOutcome,
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
	telemetry::init_tracing(cli.json, level);

	let config =
		EngineConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

	match cli.command {
		Commands::Chat { user, budget } => cmd_chat(config, &user, budget),
		Commands::Replay { file, budget } => cmd_replay(config, &file, budget),
		Commands::Status { file } => cmd_status(config, &file),
		Commands::Config { action } => cmd_config(&config, &action),
	}
}

fn build_engine(config: EngineConfig) -> Result<MemoryEngine> {
	MemoryEngine::new(config).context("Failed to build memory engine")
}

fn cmd_chat(config: EngineConfig, user: &str, budget: BudgetArgs) -> Result<()> {
	let engine = build_engine(config)?;
	let budget = budget.resolve(&engine.config().budget);
	let stdin = io::stdin();
	let mut out = io::stdout().lock();

	for line in stdin.lock().lines() {
		let line = line.context("Failed to read stdin")?;
		if line.trim().is_empty() {
			continue;
		}
		let outcome = match engine.process_turn_with_budget(user, &line, &budget) {
			Ok(outcome) => outcome,
			Err(err) if err.is_input() => {
				warn!(error = %err, "message skipped");
				writeln!(out, "! {err}")?;
				continue;
			}
			Err(err) => return Err(err.into()),
		};
		print_turn(&mut out, &outcome)?;
	}

	engine.stats().flush();
	Ok(())
}

fn print_turn(out: &mut impl Write, outcome: &TurnOutcome) -> io::Result<()> {
	let m = &outcome.metrics;
	for entry in &outcome.context.entries {
		writeln!(out, "  [{}] {} ({:.3})", entry.id, entry.content, entry.score)?;
	}
	let degraded = if m.degraded.any() { " degraded" } else { "" };
	writeln!(
		out,
		"  -- turn {}: {} recalled of {} candidates ({} active) in {}us{degraded}",
		m.turn, m.memory_hits, m.candidates_considered, m.candidates_active, m.latency_us
	)
}

fn run_transcript(
	engine: &MemoryEngine,
	path: &Path,
	budget: &ContextBudget,
	mut on_turn: impl FnMut(&transcript::Turn, &TurnOutcome) -> Result<()>,
) -> Result<usize> {
	let turns = transcript::read(path)?;
	let mut processed = 0;
	for (index, turn) in turns.iter().enumerate() {
		let outcome = engine
			.process_turn_with_budget(&turn.user_id, &turn.text, budget)
			.with_context(|| format!("Turn {} for user {:?} rejected", index + 1, turn.user_id))?;
		on_turn(turn, &outcome)?;
		processed += 1;
	}
	Ok(processed)
}

fn cmd_replay(config: EngineConfig, path: &Path, budget: BudgetArgs) -> Result<()> {
	let engine = build_engine(config)?;
	let budget = budget.resolve(&engine.config().budget);
	let mut out = io::stdout().lock();

	let processed = run_transcript(&engine, path, &budget, |turn, outcome| {
		let record = ReplayRecord {
			user_id: &turn.user_id,
			text: &turn.text,
			outcome,
		};
		serde_json::to_writer(&mut out, &record)?;
		writeln!(out)?;
		Ok(())
	})?;

	let stats = engine.stats_snapshot();
	info!(
		turns = processed,
		memory_hits = stats.memory_hits,
		degraded_turns = stats.degraded_turns,
		"replay finished"
	);
	Ok(())
}

fn cmd_status(config: EngineConfig, path: &Path) -> Result<()> {
	let engine = build_engine(config)?;
	let budget = engine.config().budget;
	let _ = run_transcript(&engine, path, &budget, |_, _| Ok(()))?;

	let mut out = io::stdout().lock();
	writeln!(
		out,
		"{:<16} {:>6} {:>6} {:>7} {:>6} {:>6}",
		"USER", "TOTAL", "ACTIVE", "DORMANT", "EDGES", "TURNS"
	)?;
	for status in engine.status_all() {
		writeln!(
			out,
			"{:<16} {:>6} {:>6} {:>7} {:>6} {:>6}",
			status.user_id, status.total, status.active, status.dormant, status.edges, status.turns
		)?;
	}

	let stats = engine.stats_snapshot();
	writeln!(
		out,
		"\n{} turns, {} memories recalled, {} stored, {} evicted, {} degraded turns",
		stats.turns,
		stats.memory_hits,
		stats.memories_stored,
		stats.memories_evicted,
		stats.degraded_turns
	)?;
	Ok(())
}

fn cmd_config(config: &EngineConfig, action: &ConfigAction) -> Result<()> {
	match action {
		ConfigAction::Show => {
			let text = config
				.to_toml_string()
				.context("Failed to serialize configuration")?;
			print!("{text}");
		}
		ConfigAction::Check => {
			config.validate().context("Configuration is invalid")?;
			println!("configuration ok");
		}
	}
	Ok(())
}
