//! Content-addressed storage shared with the snapshot root.

mod store;

pub use store::{BlobInfo, ContentStore};
