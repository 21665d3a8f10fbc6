pub mod common;
pub mod completions;
pub mod decisions;
pub mod demo;
pub mod invite;
pub mod room;
