//! Remote file editing: plain replacement and structured JSON merge.

mod files;
mod merge;

pub use files::{EditAck, RemoteFileEditor};
pub use merge::{merge_documents, MergeRule, MergeStrategy, DEFAULT_ID_REF};
