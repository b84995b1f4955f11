//! CLI domain: parse, route, and output only.
//! No pipeline logic; the route table dispatches to [`crate::pipeline::GenerationPipeline`].

mod output;
mod parse;
mod route;

pub use output::{format_document, map_error};
pub use parse::{Cli, Commands};
pub use route::RunContext;
