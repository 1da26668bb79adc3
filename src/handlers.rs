pub mod contracts;
pub mod attachments;
pub mod audit;
pub mod admin;
