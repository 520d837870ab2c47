// Release tasks: cleaning, demo build, PyPI packaging and the GitHub
// bundle/upload flow. Each task is a thin, sequential composition of the
// shell runner and the downloads API.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::api::{Download, DownloadsApi};
use crate::error::ReleaseError;
use crate::shell::Shell;

pub const BUILD_DIRS: [&str; 4] = ["dist", "build", "demo/build", "sphinx_bootstrap_theme.egg-info"];

pub const SDIST_RST_FILES: [&str; 2] = ["README.rst", "HISTORY.rst"];

pub const THEME_ASSETS_DIR: &str = "sphinx_bootstrap_theme/bootstrap";
pub const BUILD_DIR: &str = "build";
pub const BASE_ZIP: &str = "bootstrap.zip";

/// File name of the suffixed bundle, e.g. `bootstrap-v0.1.6.zip`.
pub fn suffixed_zip(suffix: &str) -> String {
    format!("bootstrap-{}.zip", suffix)
}

// ---------------------------------------------------------------------------
// Misc
// ---------------------------------------------------------------------------

/// Remove build output. Missing directories are fine.
pub fn clean(shell: &Shell) -> Result<()> {
    for dir in BUILD_DIRS {
        shell.remove_dir_all(dir)?;
    }

    let root = shell.cwd();
    let entries = fs::read_dir(&root).with_context(|| format!("Failed to list {}", root.display()))?;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().ends_with(".egg-info") && entry.path().is_dir() {
            shell.remove_dir_all(&name)?;
        }
    }
    Ok(())
}

pub fn demo(shell: &Shell) -> Result<()> {
    let _demo = shell.lcd("demo");
    shell.run("make", &["html"])
}

// ---------------------------------------------------------------------------
// PyPI
// ---------------------------------------------------------------------------

/// Temporary `.txt` copies of the `.rst` files setup.py reads. The copies
/// are removed when this value is dropped, whether or not the packaging
/// command succeeded.
pub struct DistFiles<'a> {
    shell: &'a Shell,
    staged: Vec<PathBuf>,
}

impl<'a> DistFiles<'a> {
    pub fn stage(shell: &'a Shell) -> Result<Self> {
        let mut files = DistFiles {
            shell,
            staged: Vec::new(),
        };
        for rst in SDIST_RST_FILES {
            let txt = Path::new(rst).with_extension("txt");
            // registered before copying so a half-done stage is still cleaned
            files.staged.push(txt.clone());
            shell.copy(rst, &txt)?;
        }
        Ok(files)
    }

    pub fn staged(&self) -> &[PathBuf] {
        &self.staged
    }
}

impl Drop for DistFiles<'_> {
    fn drop(&mut self) {
        for txt in &self.staged {
            if let Err(e) = self.shell.remove_file(txt) {
                warn!(file = %txt.display(), error = %e, "failed to remove temporary file");
            }
        }
    }
}

/// Run `action` with the `.txt` copies in place.
pub fn with_dist_files<T>(shell: &Shell, action: impl FnOnce(&Shell) -> Result<T>) -> Result<T> {
    let _files = DistFiles::stage(shell)?;
    action(shell)
}

pub fn sdist(shell: &Shell) -> Result<()> {
    with_dist_files(shell, |sh| sh.run("python", &["setup.py", "sdist"]))
}

/// Register the package on PyPI. May need a tweaked ~/.pypirc.
pub fn pypi_register(shell: &Shell) -> Result<()> {
    with_dist_files(shell, |sh| sh.run("python", &["setup.py", "register"]))
}

pub fn pypi_upload(shell: &Shell) -> Result<()> {
    with_dist_files(shell, |sh| sh.run("python", &["setup.py", "sdist", "upload"]))
}

// ---------------------------------------------------------------------------
// GitHub
// ---------------------------------------------------------------------------

/// Build suffix: the closest tag description when `tag` is set, otherwise
/// the full commit hash of HEAD.
pub fn get_suffix(shell: &Shell, tag: bool) -> Result<String> {
    if tag {
        shell.capture("git", &["describe", "--always", "--tag"])
    } else {
        shell.capture("git", &["rev-parse", "HEAD"])
    }
}

/// Create `build/bootstrap.zip` and its suffixed copy from the theme assets.
pub fn gh_bundle(shell: &Shell, tag: bool) -> Result<()> {
    let suffix = get_suffix(shell, tag)?;

    info!("Cleaning old build files.");
    clean(shell)?;

    shell.create_dir_all(BUILD_DIR)?;
    let base_zip = shell.path(BUILD_DIR).join(BASE_ZIP);
    let base_zip = base_zip.to_string_lossy().into_owned();

    info!("Bundling new files.");
    {
        let _assets = shell.lcd(THEME_ASSETS_DIR);
        shell.run("zip", &["-r", base_zip.as_str(), "."])?;
    }

    let _build = shell.lcd(BUILD_DIR);
    shell.copy(BASE_ZIP, suffixed_zip(&suffix))?;

    info!("Verifying contents.");
    shell.run("unzip", &["-l", BASE_ZIP])
}

/// One line per download: `created_at: name (id)`.
pub fn format_download(download: &Download) -> Result<String> {
    Ok(format!(
        "{}: {} ({})",
        download.created_at(),
        download.name()?,
        download.id()?
    ))
}

pub fn gh_downloads(api: &impl DownloadsApi) -> Result<()> {
    println!("Downloads:");
    for download in api.list_downloads()? {
        println!("{}", format_download(&download)?);
    }
    Ok(())
}

/// What `gh_upload` ended up doing.
#[derive(Debug)]
pub enum UploadOutcome {
    /// The suffixed bundle is already on GitHub; nothing was touched.
    AlreadyPresent,
    /// Records for the base and suffixed bundles, in upload order.
    Uploaded(Vec<Download>),
}

/// Upload the bundles built by `gh_bundle`.
///
/// The API client is only created by `connect` once the local zip files
/// are known to exist, so a missing build never touches the network.
pub fn gh_upload<A, F>(shell: &Shell, tag: bool, connect: F) -> Result<UploadOutcome>
where
    A: DownloadsApi,
    F: FnOnce(&Shell) -> Result<A>,
{
    let suffix = get_suffix(shell, tag)?;
    let suffix_file = suffixed_zip(&suffix);
    let base_zip = shell.path(BUILD_DIR).join(BASE_ZIP);
    let suffix_zip = shell.path(BUILD_DIR).join(&suffix_file);

    let missing: Vec<String> = [&base_zip, &suffix_zip]
        .iter()
        .filter(|p| !p.exists())
        .map(|p| p.display().to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ReleaseError::MissingArtifacts(missing.join(", ")).into());
    }

    let api = connect(shell)?;
    let mut by_name: HashMap<String, Download> = api
        .list_downloads()?
        .into_iter()
        .filter_map(|d| {
            let name = d.name().ok()?.to_string();
            Some((name, d))
        })
        .collect();

    if by_name.contains_key(&suffix_file) {
        println!("Found suffixed zip file already. Skipping");
        return Ok(UploadOutcome::AlreadyPresent);
    }

    if let Some(existing) = by_name.remove(BASE_ZIP) {
        println!("Removing current base zip file.");
        let result = api.delete_download(&existing)?;
        println!("Result: {}", serde_json::to_string_pretty(&result)?);
    }

    let mut uploaded = Vec::with_capacity(2);
    for (label, path) in [("base", &base_zip), ("suffixed", &suffix_zip)] {
        println!("Upload new {} zip file.", label);
        let meta = upload_with_spinner(&api, path, &suffix)?;
        println!("\nResult: {}", meta.to_pretty_json());
        uploaded.push(meta);
    }
    Ok(UploadOutcome::Uploaded(uploaded))
}

fn upload_with_spinner(api: &impl DownloadsApi, path: &Path, suffix: &str) -> Result<Download> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    spinner.set_message(format!("Uploading {}...", path.display()));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = api.create_and_upload_download(path, suffix, None);
    spinner.finish_and_clear();
    result
}
