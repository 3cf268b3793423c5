pub mod conversation;
pub mod evidence;
pub mod filter;
pub mod metadata;

mod error;

pub use conversation::{
	Conversation, ConversationSummary, ConversationTurn, MessagePreview, Role, Source, WebSource,
};
pub use error::{Error, Result};
pub use evidence::{
	Chunk, EvidenceBundle, IndexedVector, Reference, ReferenceKind, SearchHit, VectorRecord,
	WebResult,
};
pub use filter::{FilterExpr, FilterField, FilterParseError, FilterValue, MetadataFilter};
pub use metadata::{ExtraValue, Metadata};
