use std::{error::Error, path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand, ValueEnum};
use social_concepts::{Concepts, DocStore, ItemId, LimitKind, MemoryStore};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, Level};
use tracing_subscriber::fmt;

#[derive(Parser, Debug)]
#[command(about = "Line oriented admin shell over the limited items of a store")]
struct Args {
	/// Storage engine to run against.
	#[arg(long, value_enum, default_value_t = Backend::Memory)]
	backend: Backend,
	/// Database directory of the RocksDB engine.
	#[arg(long, env = "ROCKSDB_PATH", default_value = "rocksdb_data")]
	db_path: PathBuf,
	/// Log level
	#[arg(long, default_value = "info")]
	log_level: Level,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
	Memory,
	#[cfg(feature = "rocksdb")]
	Rocksdb,
}

/// One line of input.
#[derive(Parser, Debug)]
#[command(no_binary_name = true, disable_help_flag = true)]
struct Line {
	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Start tracking an item.
	Create {
		#[arg(value_enum)]
		kind: LimitKind,
		item: String,
		#[arg(default_value_t = 0)]
		count: u64,
	},
	/// Show the record of an item.
	Get {
		#[arg(value_enum)]
		kind: LimitKind,
		item: String,
	},
	/// Show the count of an item.
	Count {
		#[arg(value_enum)]
		kind: LimitKind,
		item: String,
	},
	/// Add to the count of an item.
	Increment {
		#[arg(value_enum)]
		kind: LimitKind,
		item: String,
		#[arg(default_value_t = 1, allow_negative_numbers = true)]
		delta: i64,
	},
	/// Stop tracking an item.
	Delete {
		#[arg(value_enum)]
		kind: LimitKind,
		item: String,
	},
	/// Remove every item of a kind.
	Reset {
		#[arg(value_enum)]
		kind: LimitKind,
	},
	/// List the kinds and their ceilings.
	Kinds,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	dotenv::dotenv().ok();

	let args = Args::parse();

	let subscriber = fmt::Subscriber::builder()
		.with_max_level(args.log_level)
		.with_writer(std::io::stderr)
		.finish();
	tracing::subscriber::set_global_default(subscriber)?;

	info!(task = "tracing_setup", result = "success", "tracing successfully set up");
	info!(backend = ?args.backend, db_path = %args.db_path.display(), "starting admin shell");

	match args.backend {
		Backend::Memory => serve(Arc::new(MemoryStore::new())).await,
		#[cfg(feature = "rocksdb")]
		Backend::Rocksdb => {
			let store = social_concepts::storage::rocksdb::RocksDbStore::open(&args.db_path)?;
			info!("Opened RocksDB at {}", args.db_path.display());
			serve(Arc::new(store)).await
		},
	}
}

/// Reads commands from stdin until it is closed.
async fn serve<S: DocStore>(store: Arc<S>) -> Result<(), Box<dyn Error>> {
	let concepts = Concepts::new(store);
	let mut lines = BufReader::new(tokio::io::stdin()).lines();

	while let Some(line) = lines.next_line().await? {
		if line.trim().is_empty() {
			continue
		}

		let command = match Line::try_parse_from(line.split_whitespace()) {
			Ok(Line { command }) => command,
			Err(e) => {
				eprintln!("{}", e);
				continue
			},
		};

		match run(&concepts, command).await {
			Ok(output) => println!("{}", output),
			Err(e) => {
				error!("Command failed: {}", e);
				println!("error: {}", e);
			},
		}
	}

	Ok(())
}

async fn run<S: DocStore>(
	concepts: &Concepts<S>,
	command: Command,
) -> Result<String, Box<dyn Error + Send + Sync>> {
	let output = match command {
		Command::Create { kind, item, count } => {
			let record = concepts.limited(kind).create(ItemId::new(item), count).await?;
			serde_json::to_string(&record)?
		},
		Command::Get { kind, item } => {
			let record = concepts.limited(kind).get(&ItemId::new(item)).await?;
			serde_json::to_string(&record)?
		},
		Command::Count { kind, item } =>
			concepts.limited(kind).get_count(&ItemId::new(item)).await?.to_string(),
		Command::Increment { kind, item, delta } => {
			let record = concepts.limited(kind).increment(&ItemId::new(item), delta).await?;
			serde_json::to_string(&record)?
		},
		Command::Delete { kind, item } => {
			concepts.limited(kind).delete(&ItemId::new(item)).await?;
			"ok".to_string()
		},
		Command::Reset { kind } => {
			concepts.limited(kind).reset().await?;
			"ok".to_string()
		},
		Command::Kinds => LimitKind::ALL
			.iter()
			.map(|kind| format!("{} max={} partition={}", kind, kind.max_limit(), kind.partition()))
			.collect::<Vec<_>>()
			.join("\n"),
	};

	Ok(output)
}
