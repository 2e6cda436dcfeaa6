//! SOMA application: component wiring, configuration and the line shell.

pub mod app;
pub mod config;
pub mod shell;
pub mod status;

pub use app::{builtin_modules, Soma, BUILTIN_RENDER_SCHEME};
pub use config::{ConfigError, SomaConfig};
pub use shell::{Command, Outcome, ParseError, Shell};
pub use status::{Concern, ErrorSlots};
