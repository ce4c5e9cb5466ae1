pub mod block;
pub mod entry;
pub mod project;
pub mod report;
pub mod token;
