use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use color_eyre::eyre;
use serde::Serialize;
use uuid::Uuid;

use urag_domain::Reference;
use urag_service::{
	AskRequest, SearchConversationsRequest, SearchSettings, SemanticSearchRequest, UragService,
};
use urag_storage::{
	ChatStore, MemoryChatStore,
	db::{Db, PgChatStore},
	qdrant::QdrantBackend,
};

#[derive(Debug, Parser)]
#[command(
	version = urag_cli::VERSION,
	rename_all = "kebab",
	styles = urag_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Load, chunk, embed and store documents.
	Ingest {
		#[arg(required = true, value_name = "FILE")]
		files: Vec<PathBuf>,
	},
	/// Semantic search over stored chunks.
	Search {
		query: String,
		#[arg(long)]
		limit: Option<u32>,
		/// Largest squared distance a hit may have (0.0-1.0).
		#[arg(long)]
		threshold: Option<f32>,
		/// E.g. `filename == "a.txt"` or `source:a.txt`.
		#[arg(long)]
		filter: Option<String>,
	},
	/// Answer a question from stored documents and, optionally, the web.
	Ask {
		query: String,
		/// `file:NAME` or `web:URL`. Repeatable.
		#[arg(long = "reference", short = 'r', value_parser = urag_cli::parse_reference)]
		references: Vec<Reference>,
		/// Continue an existing conversation.
		#[arg(long)]
		conversation: Option<Uuid>,
		/// Let the model decide whether to search the web.
		#[arg(long)]
		web: bool,
	},
	/// List the file names currently indexed.
	Documents,
	/// Remove stored chunks by file name or id.
	Delete {
		#[arg(long, conflicts_with = "id", required_unless_present = "id")]
		filename: Option<String>,
		#[arg(long)]
		id: Option<i64>,
	},
	/// Inspect stored conversations.
	#[command(subcommand)]
	History(History),
}

#[derive(Debug, Subcommand)]
pub enum History {
	List,
	Show {
		id: Uuid,
	},
	Search {
		query: String,
		#[arg(long)]
		limit: Option<u32>,
	},
	Delete {
		id: Uuid,
	},
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = urag_config::load(&args.config)?;

	urag_cli::init_tracing(&config.service.log_level);

	let service = connect(config).await?;

	match args.command {
		Command::Ingest { files } => {
			let mut reports = Vec::with_capacity(files.len());

			for path in files {
				reports.push(service.ingest_document(&path).await?);
			}

			print_json(&reports)
		},
		Command::Search { query, limit, threshold, filter } => {
			let settings = SearchSettings { limit, distance_threshold: threshold, metadata_filter: filter };

			print_json(&service.semantic_search(SemanticSearchRequest { query, settings }).await?)
		},
		Command::Ask { query, references, conversation, web } => {
			let request = AskRequest {
				query,
				references,
				is_initial: conversation.is_none(),
				conversation_id: conversation,
				web_search_enabled: web,
			};

			print_json(&service.ask(request).await?)
		},
		Command::Documents => print_json(&service.list_documents().await?),
		Command::Delete { filename, id } => {
			match (filename, id) {
				(Some(filename), _) => service.delete_by_filename(&filename).await?,
				(None, Some(id)) => service.delete_by_id(id).await?,
				(None, None) => return Err(eyre::eyre!("pass --filename or --id.")),
			}

			print_json(&serde_json::json!({ "success": true }))
		},
		Command::History(History::List) => print_json(&service.list_conversations().await?),
		Command::History(History::Show { id }) => print_json(&service.get_conversation(id).await?),
		Command::History(History::Search { query, limit }) => print_json(
			&service.search_conversations(SearchConversationsRequest { query, limit }).await?,
		),
		Command::History(History::Delete { id }) => {
			service.delete_conversation(id).await?;

			print_json(&serde_json::json!({ "success": true }))
		},
	}
}

async fn connect(config: urag_config::Config) -> color_eyre::Result<UragService> {
	let vectors = Arc::new(QdrantBackend::new(&config.storage.qdrant)?);
	let chats: Arc<dyn ChatStore> = match config.storage.postgres.as_ref() {
		Some(postgres) => {
			let db = Db::connect(postgres).await?;

			db.ensure_schema().await?;

			Arc::new(PgChatStore::new(db))
		},
		None => {
			tracing::warn!("No Postgres configured; conversations last only for this process.");

			Arc::new(MemoryChatStore::new())
		},
	};

	Ok(UragService::new(config, vectors, chats))
}

fn print_json<T>(value: &T) -> color_eyre::Result<()>
where
	T: Serialize,
{
	println!("{}", serde_json::to_string_pretty(value)?);

	Ok(())
}
