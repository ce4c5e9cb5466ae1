pub mod codec;
pub mod constraint;
pub mod encoding;
pub mod ledger;
pub mod locator;
pub mod pipeline;
pub mod project;
pub mod qa;
pub mod rebuild;
pub mod verify;
pub mod workflow;
