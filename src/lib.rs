// Library root
// -----------
// Release automation for the Sphinx Bootstrap theme. The binary
// (`main.rs`) only parses arguments and hands off to `cli::run`.
//
// Module responsibilities:
// - `shell`: runs external commands inside a scoped working directory.
// - `config`: git-config credentials and endpoint settings.
// - `api`: GitHub downloads API client and the storage upload.
// - `tasks`: the release tasks themselves (clean, sdist, gh_upload, ...).
// - `cli`: clap definitions and task dispatch.
pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod shell;
pub mod tasks;

pub use error::ReleaseError;
