// Failure taxonomy for release tasks. Everything here is fatal for the
// running task; callers wrap these in `anyhow` with extra context.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReleaseError {
    /// An external command exited unsuccessfully (or was killed).
    #[error("command `{command}` failed with {status}")]
    CommandFailed { command: String, status: String },

    /// A required `git config github.<key>` value is not set.
    #[error("missing configuration value `github.{0}` (set it with `git config github.{0} <value>`)")]
    MissingConfig(String),

    #[error("Did not find current zip files ({0}). Please create them with `gh_bundle` first.")]
    MissingArtifacts(String),

    /// The hosting API answered with a non-2xx status.
    #[error("{method} {url} failed: {status} - {body}")]
    Api {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("response is missing required field `{0}`")]
    MissingField(&'static str),
}
