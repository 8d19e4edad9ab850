pub mod config;
pub mod error;
pub mod logging;

pub mod engine;
pub mod index;
pub mod pipeline;
pub mod resolver;
pub mod scanner;
pub mod script;
pub mod sink;
pub mod watch;

pub use config::{ResolverMode, ScriptPathMode, Settings};
pub use engine::OutputEngine;
pub use error::{OutsyncError, Result};
