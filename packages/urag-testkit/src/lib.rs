//! Shared fixtures for integration tests: throwaway Postgres databases, Qdrant collection
//! bookkeeping and deterministic stand-ins for remote models.

mod error;

pub use error::{Error, Result};

use std::{
	collections::{HashSet, VecDeque},
	env,
	str::FromStr,
	sync::Mutex,
	thread,
	time::Duration,
};

use qdrant_client::Qdrant;
use sqlx::{
	ConnectOptions, Connection, Executor,
	postgres::{PgConnectOptions, PgConnection},
};
use tokio::{runtime::Builder, time};
use uuid::Uuid;

const ADMIN_DATABASES: [&str; 2] = ["postgres", "template1"];
const QDRANT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// A database created for one test and dropped afterwards, together with the Qdrant
/// collections the test asked names for.
pub struct TestDatabase {
	name: String,
	dsn: String,
	admin_options: PgConnectOptions,
	collections: Mutex<HashSet<String>>,
	cleaned: bool,
}
impl TestDatabase {
	pub async fn new(base_dsn: &str) -> Result<Self> {
		let base_options = PgConnectOptions::from_str(base_dsn)
			.map_err(|err| Error::InvalidDsn(err.to_string()))?;
		let (admin_options, mut admin_conn) = connect_admin(&base_options).await?;
		let name = format!("urag_test_{}", Uuid::new_v4().simple());

		admin_conn.execute(format!(r#"CREATE DATABASE "{name}""#).as_str()).await?;

		let dsn = base_options.database(&name).to_url_lossy().to_string();

		Ok(Self { name, dsn, admin_options, collections: Mutex::new(HashSet::new()), cleaned: false })
	}

	pub fn dsn(&self) -> &str {
		&self.dsn
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Returns a collection name unique to this database and schedules it for deletion.
	pub fn collection_name(&self, prefix: &str) -> String {
		let collection = format!("{prefix}_{}", self.name);

		self.collections.lock().unwrap_or_else(|err| err.into_inner()).insert(collection.clone());

		collection
	}

	pub async fn cleanup(mut self) -> Result<()> {
		let collections = self.tracked_collections();
		let qdrant = delete_qdrant_collections(&collections).await;
		let postgres = drop_database(&self.name, &self.admin_options).await;

		self.cleaned = true;

		qdrant.and(postgres)
	}

	fn tracked_collections(&self) -> Vec<String> {
		self.collections.lock().unwrap_or_else(|err| err.into_inner()).iter().cloned().collect()
	}
}
impl Drop for TestDatabase {
	fn drop(&mut self) {
		if self.cleaned {
			return;
		}

		let name = self.name.clone();
		let admin_options = self.admin_options.clone();
		let collections = self.tracked_collections();
		// The test runtime may already be shutting down, so cleanup gets a runtime of its own.
		let cleanup = thread::spawn(move || {
			let runtime = match Builder::new_current_thread().enable_all().build() {
				Ok(runtime) => runtime,
				Err(err) => {
					eprintln!("Test cleanup could not start a runtime: {err}.");

					return;
				},
			};

			if let Err(err) = runtime.block_on(delete_qdrant_collections(&collections)) {
				eprintln!("{err}.");
			}
			if let Err(err) = runtime.block_on(drop_database(&name, &admin_options)) {
				eprintln!("{err}.");
			}
		});
		let _ = cleanup.join();
	}
}

/// Replies handed out in order, one per call. Lets a fake provider follow a script.
pub struct ScriptedReplies<T> {
	replies: Mutex<VecDeque<T>>,
}
impl<T> ScriptedReplies<T> {
	pub fn new(replies: impl IntoIterator<Item = T>) -> Self {
		Self { replies: Mutex::new(replies.into_iter().collect()) }
	}

	pub fn push(&self, reply: T) {
		self.replies.lock().unwrap_or_else(|err| err.into_inner()).push_back(reply);
	}

	pub fn next(&self) -> Option<T> {
		self.replies.lock().unwrap_or_else(|err| err.into_inner()).pop_front()
	}

	pub fn remaining(&self) -> usize {
		self.replies.lock().unwrap_or_else(|err| err.into_inner()).len()
	}
}

pub fn env_dsn() -> Option<String> {
	env::var("URAG_PG_DSN").ok()
}

pub fn env_qdrant_url() -> Option<String> {
	env::var("URAG_QDRANT_URL").ok()
}

/// Bag-of-words embedding over a fixed vocabulary, L2-normalized.
///
/// Component `i` counts case-insensitive occurrences of `vocabulary[i]` as a whole word. Text
/// without any vocabulary word maps to the zero vector.
pub fn keyword_embedding(text: &str, vocabulary: &[&str]) -> Vec<f32> {
	let words = text
		.split(|ch: char| !ch.is_alphanumeric())
		.filter(|word| !word.is_empty())
		.map(str::to_lowercase)
		.collect::<Vec<_>>();
	let mut vector = vocabulary
		.iter()
		.map(|term| {
			let term = term.to_lowercase();

			words.iter().filter(|word| **word == term).count() as f32
		})
		.collect::<Vec<_>>();
	let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();

	if norm > 0.0 {
		for value in &mut vector {
			*value /= norm;
		}
	}

	vector
}

async fn connect_admin(base_options: &PgConnectOptions) -> Result<(PgConnectOptions, PgConnection)> {
	let mut failures = Vec::new();

	for database in ADMIN_DATABASES {
		let options = base_options.clone().database(database);

		match PgConnection::connect_with(&options).await {
			Ok(conn) => return Ok((options, conn)),
			Err(err) => failures.push(format!("{database}: {err}")),
		}
	}

	Err(Error::AdminUnavailable(failures.join("; ")))
}

async fn drop_database(name: &str, admin_options: &PgConnectOptions) -> Result<()> {
	let mut conn = PgConnection::connect_with(admin_options)
		.await
		.map_err(|err| Error::Cleanup(format!("admin connection for {name:?}: {err}")))?;

	// Pooled connections from the test may still be open.
	let _ = sqlx::query(
		"\
SELECT pg_terminate_backend(pid)
FROM pg_stat_activity
WHERE datname = $1 AND pid <> pg_backend_pid()",
	)
	.bind(name)
	.fetch_all(&mut conn)
	.await;

	conn.execute(format!(r#"DROP DATABASE IF EXISTS "{name}""#).as_str())
		.await
		.map_err(|err| Error::Cleanup(format!("drop database {name:?}: {err}")))?;

	Ok(())
}

async fn delete_qdrant_collections(collections: &[String]) -> Result<()> {
	if collections.is_empty() {
		return Ok(());
	}

	let Some(url) = env_qdrant_url() else {
		eprintln!("Set URAG_QDRANT_URL to delete {} test collection(s).", collections.len());

		return Ok(());
	};
	let client = Qdrant::from_url(&url).build()?;
	let mut failures = Vec::new();

	for collection in collections {
		match time::timeout(QDRANT_CALL_TIMEOUT, client.delete_collection(collection.clone())).await
		{
			Ok(Ok(_)) => {},
			Ok(Err(err)) => failures.push(format!("{collection}: {err}")),
			Err(_) => failures.push(format!("{collection}: timed out")),
		}
	}

	if failures.is_empty() {
		Ok(())
	} else {
		Err(Error::Cleanup(format!("Qdrant collections {}", failures.join("; "))))
	}
}
