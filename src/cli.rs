// Command-line surface: one subcommand per release task. Task names use
// underscores (`gh_upload`), and the colon argument form
// `gh_upload:True` is rewritten to `gh_upload --tag` before parsing.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

use crate::api::GitHubClient;
use crate::shell::Shell;
use crate::tasks;

#[derive(Parser, Debug)]
#[command(
    name = "bootstrap-release",
    version,
    about = "Release tasks for the Sphinx Bootstrap theme"
)]
pub struct Cli {
    #[command(subcommand)]
    pub task: Task,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    /// Project directory (defaults to the current directory)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Task {
    /// Clean build files
    Clean,
    /// Build the demo documentation
    Demo,
    /// Package into a source distribution
    Sdist,
    /// Register the package on PyPI
    #[command(name = "pypi_register")]
    PypiRegister,
    /// Build and upload the package to PyPI
    #[command(name = "pypi_upload")]
    PypiUpload,
    /// Create zip file upload bundles
    #[command(name = "gh_bundle")]
    GhBundle {
        /// Use the git tag instead of the commit hash as suffix
        #[arg(long)]
        tag: bool,
    },
    /// List GitHub downloads
    #[command(name = "gh_downloads")]
    GhDownloads,
    /// Upload new zip files to GitHub downloads
    #[command(name = "gh_upload")]
    GhUpload {
        /// Use the git tag instead of the commit hash as suffix
        #[arg(long)]
        tag: bool,
    },
}

fn is_truthy(value: &str) -> bool {
    matches!(value, "True" | "true" | "1" | "yes")
}

/// Rewrite `task:value` / `task:tag=value` arguments into `task [--tag]`.
/// The program name is passed through untouched.
pub fn expand_task_args(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    let mut out = Vec::new();
    for (i, arg) in args.into_iter().enumerate() {
        let split = match arg.to_str() {
            Some(s) if i > 0 && !s.starts_with('-') => s.split_once(':'),
            _ => None,
        };
        match split {
            Some((task, value)) => {
                let value = value.strip_prefix("tag=").unwrap_or(value);
                out.push(OsString::from(task));
                if is_truthy(value) {
                    out.push(OsString::from("--tag"));
                }
            }
            None => out.push(arg),
        }
    }
    out
}

/// Dispatch a parsed command line.
pub fn run(cli: Cli) -> Result<()> {
    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    let shell = Shell::new(root);

    match cli.task {
        Task::Clean => tasks::clean(&shell),
        Task::Demo => tasks::demo(&shell),
        Task::Sdist => tasks::sdist(&shell),
        Task::PypiRegister => tasks::pypi_register(&shell),
        Task::PypiUpload => tasks::pypi_upload(&shell),
        Task::GhBundle { tag } => tasks::gh_bundle(&shell, tag),
        Task::GhDownloads => tasks::gh_downloads(&GitHubClient::connect(&shell)?),
        Task::GhUpload { tag } => {
            tasks::gh_upload(&shell, tag, GitHubClient::connect)?;
            Ok(())
        }
    }
}
