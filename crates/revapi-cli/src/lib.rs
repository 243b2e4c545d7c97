//! Administrative command line for the Rev API.

pub mod cli_args;
pub mod middleware;
pub mod prompt;

pub use cli_args::Cli;
pub use middleware::{InvocationOptions, Middleware};
pub use prompt::TerminalPrompter;
