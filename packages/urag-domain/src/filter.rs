//! Boolean filter expressions over the stored `filename` and `id` fields.
//!
//! Accepted forms:
//!
//! - `filename == "a.txt"`, `filename != 'b.txt'`, `id == 42`
//! - `filename in ["a.txt", "b.txt"]`
//! - `and`/`&&`, `or`/`||`, `not`/`!`, parentheses
//! - the shorthand `field:value`, where `value` may be a bare word such as `a.txt`
//!
//! `source` is accepted as an alias of `filename`. An empty or whitespace-only string means no
//! filter.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

const MAX_FILTER_DEPTH: usize = 8;
const MAX_FILTER_NODES: usize = 32;
const MAX_IN_LIST_ITEMS: usize = 64;
const MAX_STRING_BYTES: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("at offset {position}: {message}")]
pub struct FilterParseError {
	pub position: usize,
	pub message: String,
}
impl FilterParseError {
	fn new(position: usize, message: impl Into<String>) -> Self {
		Self { position, message: message.into() }
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterField {
	Filename,
	Id,
}
impl FilterField {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Filename => "filename",
			Self::Id => "id",
		}
	}

	fn parse(raw: &str, position: usize) -> Result<Self, FilterParseError> {
		match raw.to_ascii_lowercase().as_str() {
			"filename" | "source" => Ok(Self::Filename),
			"id" => Ok(Self::Id),
			other => Err(FilterParseError::new(
				position,
				format!("field '{other}' is not in allowlist: filename, id."),
			)),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
	Int(i64),
	Text(String),
}
impl Display for FilterValue {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Int(value) => write!(f, "{value}"),
			Self::Text(value) => f.write_str(&quote_literal(value)),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FilterExpr {
	And { args: Vec<FilterExpr> },
	Or { args: Vec<FilterExpr> },
	Not { expr: Box<FilterExpr> },
	Eq { field: FilterField, value: FilterValue },
	Neq { field: FilterField, value: FilterValue },
	In { field: FilterField, values: Vec<FilterValue> },
}
impl FilterExpr {
	pub fn evaluate(&self, id: i64, filename: &str) -> bool {
		match self {
			Self::And { args } => args.iter().all(|arg| arg.evaluate(id, filename)),
			Self::Or { args } => args.iter().any(|arg| arg.evaluate(id, filename)),
			Self::Not { expr } => !expr.evaluate(id, filename),
			Self::Eq { field, value } => field_matches(*field, value, id, filename),
			Self::Neq { field, value } => !field_matches(*field, value, id, filename),
			Self::In { field, values } =>
				values.iter().any(|value| field_matches(*field, value, id, filename)),
		}
	}
}
impl Display for FilterExpr {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::And { args } => write_joined(f, args, " and "),
			Self::Or { args } => write_joined(f, args, " or "),
			Self::Not { expr } => write!(f, "not ({expr})"),
			Self::Eq { field, value } => write!(f, "{} == {value}", field.as_str()),
			Self::Neq { field, value } => write!(f, "{} != {value}", field.as_str()),
			Self::In { field, values } => {
				write!(f, "{} in [", field.as_str())?;

				for (index, value) in values.iter().enumerate() {
					if index > 0 {
						f.write_str(", ")?;
					}

					write!(f, "{value}")?;
				}

				f.write_str("]")
			},
		}
	}
}

/// A parsed filter, or the absence of one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFilter {
	expr: Option<FilterExpr>,
}
impl MetadataFilter {
	pub fn none() -> Self {
		Self::default()
	}

	pub fn parse(raw: &str) -> Result<Self, FilterParseError> {
		if raw.trim().is_empty() {
			return Ok(Self::none());
		}

		let tokens = tokenize(raw)?;
		let mut parser = Parser { tokens, cursor: 0, nodes: 0, end: raw.len() };
		let expr = parser.parse_or(1)?;

		if let Some(token) = parser.peek() {
			return Err(FilterParseError::new(token.position, "unexpected trailing input."));
		}

		Ok(Self { expr: Some(expr) })
	}

	pub fn filename_eq(filename: impl Into<String>) -> Self {
		Self {
			expr: Some(FilterExpr::Eq {
				field: FilterField::Filename,
				value: FilterValue::Text(filename.into()),
			}),
		}
	}

	pub fn id_eq(id: i64) -> Self {
		Self { expr: Some(FilterExpr::Eq { field: FilterField::Id, value: FilterValue::Int(id) }) }
	}

	pub fn expr(&self) -> Option<&FilterExpr> {
		self.expr.as_ref()
	}

	pub fn is_empty(&self) -> bool {
		self.expr.is_none()
	}

	pub fn matches(&self, id: i64, filename: &str) -> bool {
		self.expr.as_ref().is_none_or(|expr| expr.evaluate(id, filename))
	}
}
impl Display for MetadataFilter {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match &self.expr {
			Some(expr) => write!(f, "{expr}"),
			None => Ok(()),
		}
	}
}

/// Double-quotes `value`, escaping backslashes and quotes.
pub fn quote_literal(value: &str) -> String {
	let mut quoted = String::with_capacity(value.len() + 2);

	quoted.push('"');

	for ch in value.chars() {
		if matches!(ch, '"' | '\\') {
			quoted.push('\\');
		}

		quoted.push(ch);
	}

	quoted.push('"');

	quoted
}

fn field_matches(field: FilterField, value: &FilterValue, id: i64, filename: &str) -> bool {
	match (field, value) {
		(FilterField::Filename, FilterValue::Text(expected)) => filename == expected,
		(FilterField::Id, FilterValue::Int(expected)) => id == *expected,
		_ => false,
	}
}

fn write_joined(f: &mut Formatter<'_>, args: &[FilterExpr], separator: &str) -> std::fmt::Result {
	f.write_str("(")?;

	for (index, arg) in args.iter().enumerate() {
		if index > 0 {
			f.write_str(separator)?;
		}

		write!(f, "{arg}")?;
	}

	f.write_str(")")
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
	Word(String),
	Quoted(String),
	LParen,
	RParen,
	LBracket,
	RBracket,
	Comma,
	Colon,
	EqEq,
	NotEq,
	And,
	Or,
	Not,
}

#[derive(Debug, Clone)]
struct Token {
	kind: TokenKind,
	position: usize,
}

fn tokenize(raw: &str) -> Result<Vec<Token>, FilterParseError> {
	let mut tokens = Vec::new();
	let mut chars = raw.char_indices().peekable();

	while let Some(&(position, ch)) = chars.peek() {
		let kind = match ch {
			c if c.is_whitespace() => {
				chars.next();

				continue;
			},
			'(' => single(&mut chars, TokenKind::LParen),
			')' => single(&mut chars, TokenKind::RParen),
			'[' => single(&mut chars, TokenKind::LBracket),
			']' => single(&mut chars, TokenKind::RBracket),
			',' => single(&mut chars, TokenKind::Comma),
			':' => single(&mut chars, TokenKind::Colon),
			'=' => {
				chars.next();

				match chars.next() {
					Some((_, '=')) => TokenKind::EqEq,
					_ => return Err(FilterParseError::new(position, "expected '=='.")),
				}
			},
			'!' => {
				chars.next();

				if matches!(chars.peek(), Some((_, '='))) {
					chars.next();

					TokenKind::NotEq
				} else {
					TokenKind::Not
				}
			},
			'&' | '|' => {
				chars.next();

				match chars.next() {
					Some((_, next)) if next == ch =>
						if ch == '&' { TokenKind::And } else { TokenKind::Or },
					_ => return Err(FilterParseError::new(position, format!("expected '{ch}{ch}'."))),
				}
			},
			'"' | '\'' => TokenKind::Quoted(read_quoted(&mut chars, position, ch)?),
			c if is_word_char(c) => {
				let mut word = String::new();

				while let Some(&(_, next)) = chars.peek() {
					if !is_word_char(next) {
						break;
					}

					word.push(next);
					chars.next();
				}

				match word.to_ascii_lowercase().as_str() {
					"and" => TokenKind::And,
					"or" => TokenKind::Or,
					"not" => TokenKind::Not,
					_ => TokenKind::Word(word),
				}
			},
			other =>
				return Err(FilterParseError::new(position, format!("unexpected character '{other}'."))),
		};

		tokens.push(Token { kind, position });
	}

	Ok(tokens)
}

fn single(
	chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
	kind: TokenKind,
) -> TokenKind {
	chars.next();

	kind
}

fn read_quoted(
	chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
	position: usize,
	quote: char,
) -> Result<String, FilterParseError> {
	let mut value = String::new();

	chars.next();

	loop {
		match chars.next() {
			Some((_, '\\')) => match chars.next() {
				Some((_, escaped)) => value.push(escaped),
				None => break,
			},
			Some((_, ch)) if ch == quote => {
				if value.len() > MAX_STRING_BYTES {
					return Err(FilterParseError::new(
						position,
						format!("string literal exceeds {MAX_STRING_BYTES} bytes."),
					));
				}

				return Ok(value);
			},
			Some((_, ch)) => value.push(ch),
			None => break,
		}
	}

	Err(FilterParseError::new(position, "unterminated string literal."))
}

fn is_word_char(ch: char) -> bool {
	ch.is_alphanumeric() || matches!(ch, '_' | '.' | '-' | '/')
}

struct Parser {
	tokens: Vec<Token>,
	cursor: usize,
	nodes: usize,
	end: usize,
}
impl Parser {
	fn peek(&self) -> Option<&Token> {
		self.tokens.get(self.cursor)
	}

	fn next(&mut self) -> Option<Token> {
		let token = self.tokens.get(self.cursor).cloned();

		if token.is_some() {
			self.cursor += 1;
		}

		token
	}

	fn position(&self) -> usize {
		self.peek().map(|token| token.position).unwrap_or(self.end)
	}

	fn eat(&mut self, kind: &TokenKind) -> bool {
		if self.peek().is_some_and(|token| &token.kind == kind) {
			self.cursor += 1;

			true
		} else {
			false
		}
	}

	fn expect(&mut self, kind: &TokenKind, label: &str) -> Result<(), FilterParseError> {
		if self.eat(kind) {
			Ok(())
		} else {
			Err(FilterParseError::new(self.position(), format!("expected {label}.")))
		}
	}

	fn node(&mut self, expr: FilterExpr) -> Result<FilterExpr, FilterParseError> {
		self.nodes += 1;

		if self.nodes > MAX_FILTER_NODES {
			return Err(FilterParseError::new(
				self.position(),
				format!("filter exceeds {MAX_FILTER_NODES} nodes."),
			));
		}

		Ok(expr)
	}

	fn check_depth(&self, depth: usize) -> Result<(), FilterParseError> {
		if depth > MAX_FILTER_DEPTH {
			return Err(FilterParseError::new(
				self.position(),
				format!("filter nesting exceeds depth {MAX_FILTER_DEPTH}."),
			));
		}

		Ok(())
	}

	fn parse_or(&mut self, depth: usize) -> Result<FilterExpr, FilterParseError> {
		self.check_depth(depth)?;

		let mut args = vec![self.parse_and(depth)?];

		while self.eat(&TokenKind::Or) {
			args.push(self.parse_and(depth)?);
		}

		if args.len() == 1 {
			return Ok(args.remove(0));
		}

		self.node(FilterExpr::Or { args })
	}

	fn parse_and(&mut self, depth: usize) -> Result<FilterExpr, FilterParseError> {
		let mut args = vec![self.parse_unary(depth)?];

		while self.eat(&TokenKind::And) {
			args.push(self.parse_unary(depth)?);
		}

		if args.len() == 1 {
			return Ok(args.remove(0));
		}

		self.node(FilterExpr::And { args })
	}

	fn parse_unary(&mut self, depth: usize) -> Result<FilterExpr, FilterParseError> {
		if self.eat(&TokenKind::Not) {
			self.check_depth(depth + 1)?;

			let expr = self.parse_unary(depth + 1)?;

			return self.node(FilterExpr::Not { expr: Box::new(expr) });
		}
		if self.eat(&TokenKind::LParen) {
			let expr = self.parse_or(depth + 1)?;

			self.expect(&TokenKind::RParen, "')'")?;

			return Ok(expr);
		}

		self.parse_comparison()
	}

	fn parse_comparison(&mut self) -> Result<FilterExpr, FilterParseError> {
		let position = self.position();
		let field = match self.next() {
			Some(Token { kind: TokenKind::Word(word), position }) =>
				FilterField::parse(&word, position)?,
			_ => return Err(FilterParseError::new(position, "expected a field name.")),
		};
		let op_position = self.position();

		match self.next().map(|token| token.kind) {
			Some(TokenKind::EqEq | TokenKind::Colon) => {
				let value = self.parse_value(field)?;

				self.node(FilterExpr::Eq { field, value })
			},
			Some(TokenKind::NotEq) => {
				let value = self.parse_value(field)?;

				self.node(FilterExpr::Neq { field, value })
			},
			Some(TokenKind::Word(word)) if word.eq_ignore_ascii_case("in") => {
				self.expect(&TokenKind::LBracket, "'['")?;

				let mut values = Vec::new();

				if !self.eat(&TokenKind::RBracket) {
					loop {
						values.push(self.parse_value(field)?);

						if values.len() > MAX_IN_LIST_ITEMS {
							return Err(FilterParseError::new(
								self.position(),
								format!("in list exceeds {MAX_IN_LIST_ITEMS} items."),
							));
						}
						if self.eat(&TokenKind::RBracket) {
							break;
						}

						self.expect(&TokenKind::Comma, "',' or ']'")?;
					}
				}

				if values.is_empty() {
					return Err(FilterParseError::new(op_position, "in list must not be empty."));
				}

				self.node(FilterExpr::In { field, values })
			},
			_ => Err(FilterParseError::new(op_position, "expected '==', '!=', ':' or 'in'.")),
		}
	}

	fn parse_value(&mut self, field: FilterField) -> Result<FilterValue, FilterParseError> {
		let position = self.position();
		let raw = match self.next().map(|token| token.kind) {
			Some(TokenKind::Word(word)) => word,
			Some(TokenKind::Quoted(text)) => text,
			_ => return Err(FilterParseError::new(position, "expected a value.")),
		};

		match field {
			FilterField::Filename => Ok(FilterValue::Text(raw)),
			FilterField::Id => raw.parse::<i64>().map(FilterValue::Int).map_err(|_| {
				FilterParseError::new(position, format!("id value '{raw}' is not an integer."))
			}),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn blank_filter_matches_everything() {
		let filter = MetadataFilter::parse("   ").expect("parse failed");

		assert!(filter.is_empty());
		assert!(filter.matches(7, "anything.txt"));
	}

	#[test]
	fn shorthand_accepts_bare_filenames() {
		let filter = MetadataFilter::parse("filename:a.txt").expect("parse failed");

		assert_eq!(filter, MetadataFilter::filename_eq("a.txt"));
		assert!(filter.matches(1, "a.txt"));
		assert!(!filter.matches(1, "b.txt"));
	}

	#[test]
	fn boolean_operators_compose() {
		let filter = MetadataFilter::parse(
			"(source == 'a.txt' || filename in [\"b.txt\", c.txt]) && !id == 3",
		)
		.expect("parse failed");

		assert!(filter.matches(1, "a.txt"));
		assert!(filter.matches(2, "c.txt"));
		assert!(!filter.matches(3, "a.txt"));
		assert!(!filter.matches(1, "d.txt"));
	}

	#[test]
	fn rendering_round_trips_through_the_parser() {
		let filter = MetadataFilter::parse("not (filename != \"we\\\"ird.txt\") and id in [1, 2]")
			.expect("parse failed");
		let reparsed = MetadataFilter::parse(&filter.to_string()).expect("reparse failed");

		assert_eq!(filter, reparsed);
	}

	#[test]
	fn rejects_unknown_fields_and_bad_ids() {
		let err = MetadataFilter::parse("page == 2").expect_err("expected an error");

		assert_eq!(err.position, 0);
		assert!(err.message.contains("allowlist"));
		assert!(MetadataFilter::parse("id == abc").is_err());
		assert!(MetadataFilter::parse("filename == 'open").is_err());
		assert!(MetadataFilter::parse("filename == a.txt id == 2").is_err());
	}

	#[test]
	fn enforces_depth_and_node_limits() {
		let deep = format!("{}id == 1{}", "(".repeat(MAX_FILTER_DEPTH + 1), ")".repeat(MAX_FILTER_DEPTH + 1));
		let wide = (0..=MAX_FILTER_NODES).map(|id| format!("id == {id}")).collect::<Vec<_>>().join(" or ");

		assert!(MetadataFilter::parse(&deep).is_err());
		assert!(MetadataFilter::parse(&wide).is_err());
	}

	#[test]
	fn quote_literal_escapes_quotes_and_backslashes() {
		assert_eq!(quote_literal(r#"a"b\c"#), r#""a\"b\\c""#);
	}
}
