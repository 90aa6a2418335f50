pub mod attachments;
pub mod documents;
