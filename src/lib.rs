// repopipe - command-line front end
//
// Loads parameters from flags and parameters.toml, runs the synthesis in
// repopipe-core and writes or deploys the result.

mod init;

pub mod deploy;
pub mod params;
pub mod plan;
pub mod synth;

pub use init::{init_tracing, LogFormat};
pub use params::ParameterArgs;
pub use synth::{TemplateFormat, DEFAULT_STACK_NAME};
