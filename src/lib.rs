//! Ferrule library
//!
//! Core functionality for the Ferrule build tool: configuration, the module
//! graph bundler, the stylesheet chain, the native module builder, static
//! asset copying and the development server.

pub mod assets;
pub mod bundler;
pub mod cli;
pub mod config;
pub mod error;
pub mod native;
pub mod resolver;
pub mod server;
pub mod styles;
pub mod transform;
pub mod utils;

pub use bundler::Bundler;
pub use cli::Cli;
pub use config::Config;
pub use error::{BuildError, BuildResult};
