// Configuration: GitHub credentials come from the repository's git config
// (`github.user`, `github.password`, `github.token`); endpoints and the
// repository name come from environment variables with sensible defaults.

use anyhow::Result;

use crate::error::ReleaseError;
use crate::shell::Shell;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_UPLOAD_URL: &str = "https://github.s3.amazonaws.com/";
pub const DEFAULT_REPO: &str = "sphinx-bootstrap-theme";

/// `git config <key>` exit status for an unset key.
const GIT_CONFIG_UNSET: i32 = 1;

/// Read `github.<key>` from git config. Unset (git exits 1) and empty
/// values are both reported as `None`; any other git failure is an error.
pub fn config(shell: &Shell, key: &str) -> Result<Option<String>> {
    let name = format!("github.{}", key);
    let value = shell.try_capture("git", &["config", &name], GIT_CONFIG_UNSET)?;
    Ok(value.filter(|v| !v.is_empty()))
}

/// Credentials used for HTTP Basic auth against the API.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub user: String,
    pub password: Option<String>,
    pub token: Option<String>,
}

impl Credentials {
    pub fn from_git_config(shell: &Shell) -> Result<Self> {
        let user = config(shell, "user")?.ok_or_else(|| ReleaseError::MissingConfig("user".into()))?;
        let creds = Credentials {
            user,
            password: config(shell, "password")?,
            token: config(shell, "token")?,
        };
        // fail early rather than sending "user:" to the API
        creds.secret()?;
        Ok(creds)
    }

    /// Password, falling back to the token when no password is configured.
    pub fn secret(&self) -> Result<&str, ReleaseError> {
        self.password
            .as_deref()
            .or(self.token.as_deref())
            .ok_or_else(|| ReleaseError::MissingConfig("password".into()))
    }
}

/// Endpoints and target repository.
#[derive(Clone, Debug)]
pub struct Settings {
    pub api_url: String,
    pub upload_url: String,
    pub repo: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            api_url: DEFAULT_API_URL.into(),
            upload_url: DEFAULT_UPLOAD_URL.into(),
            repo: DEFAULT_REPO.into(),
        }
    }
}

impl Settings {
    /// Create settings from `GITHUB_API_URL`, `GITHUB_UPLOAD_URL` and
    /// `GITHUB_REPO`, falling back to the defaults above.
    pub fn from_env() -> Self {
        let defaults = Settings::default();
        Settings {
            api_url: std::env::var("GITHUB_API_URL").unwrap_or(defaults.api_url),
            upload_url: std::env::var("GITHUB_UPLOAD_URL").unwrap_or(defaults.upload_url),
            repo: std::env::var("GITHUB_REPO").unwrap_or(defaults.repo),
        }
    }
}
