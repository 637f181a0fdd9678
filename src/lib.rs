//! Interactive shell library: job control, history, completion and the
//! input editor, exposed for embedding and testing.

pub mod completion;
pub mod config;
pub mod display;
pub mod history;
pub mod input;
pub mod jobs;
pub mod parser;
pub mod services;
pub mod session;
pub mod shell;
pub mod terminal;
