pub mod documents;
pub mod memory;
pub mod tree;

pub use documents::{Document, DocumentStore, Query};
pub use memory::{InMemoryDocumentStore, InMemoryTreeStore};
pub use tree::{BatchWrite, ConnectionId, TreeOp, TreeStore, TreeSubscription};
