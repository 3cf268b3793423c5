use clap::builder::{
	Styles,
	styling::{AnsiColor, Effects},
};
use tracing_subscriber::EnvFilter;

use urag_domain::Reference;

/// `<crate version>-<git sha>-<target triple>`, shown by `--version`.
pub const VERSION: &str = concat!(
	env!("CARGO_PKG_VERSION"),
	"-",
	env!("VERGEN_GIT_SHA"),
	"-",
	env!("VERGEN_CARGO_TARGET_TRIPLE"),
);

pub fn styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Cyan.on_default() | Effects::BOLD)
		.usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
		.literal(AnsiColor::Green.on_default() | Effects::BOLD)
		.placeholder(AnsiColor::Yellow.on_default())
		.error(AnsiColor::Red.on_default() | Effects::BOLD)
}

/// Logs go to stderr so stdout stays machine-readable.
pub fn init_tracing(log_level: &str) {
	let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// Parses `file:NAME` or `web:URL`.
pub fn parse_reference(raw: &str) -> Result<Reference, String> {
	let (kind, source) =
		raw.split_once(':').ok_or_else(|| format!("expected file:NAME or web:URL, got {raw:?}"))?;
	let source = source.trim();

	if source.is_empty() {
		return Err(format!("reference {raw:?} has an empty source"));
	}

	match kind.trim().to_ascii_lowercase().as_str() {
		"file" => Ok(Reference::file(source)),
		"web" => Ok(Reference::web(source)),
		other => Err(format!("unknown reference type {other:?}; use file or web")),
	}
}
