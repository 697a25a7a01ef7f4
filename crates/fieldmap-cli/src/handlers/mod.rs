//! Command handlers for CLI subcommands
//!
//! Each subcommand lives in its own module; shared file loading is in
//! [`utils`].

mod completions;
mod parse;
mod transform;
mod utils;
mod validate;

pub use completions::handle_completions;
pub use parse::handle_parse;
pub use transform::handle_transform;
pub use validate::handle_validate;

#[cfg(test)]
mod tests;
