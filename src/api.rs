// API client module: a small blocking HTTP client for the GitHub REST API
// (legacy downloads endpoints) plus the signed form-post that pushes file
// bytes to object storage.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::blocking::{multipart, Client};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

use crate::config::{Credentials, Settings};
use crate::error::ReleaseError;
use crate::shell::Shell;

/// A download record as returned by the API. The full shape is owned by
/// GitHub, so it stays a loose JSON mapping; only `id` and `name` are
/// required.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Download(pub Map<String, Value>);

impl Download {
    pub fn name(&self) -> Result<&str, ReleaseError> {
        self.0
            .get("name")
            .and_then(Value::as_str)
            .ok_or(ReleaseError::MissingField("name"))
    }

    /// The record id rendered as a path segment (GitHub sends a number).
    pub fn id(&self) -> Result<String, ReleaseError> {
        match self.0.get("id") {
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(Value::String(s)) => Ok(s.clone()),
            _ => Err(ReleaseError::MissingField("id")),
        }
    }

    pub fn created_at(&self) -> &str {
        self.0.get("created_at").and_then(Value::as_str).unwrap_or("")
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.0).unwrap_or_else(|_| format!("{:?}", self.0))
    }
}

/// Body of the "create download" request.
#[derive(Serialize, Deserialize, Debug)]
pub struct NewDownload {
    pub name: String,
    pub size: u64,
    pub description: String,
}

/// Signed upload policy embedded in a freshly created download record.
#[derive(Deserialize, Debug, Clone)]
pub struct UploadPolicy {
    pub path: String,
    pub acl: String,
    pub name: String,
    pub accesskeyid: String,
    pub policy: String,
    pub signature: String,
    pub mime_type: String,
}

impl UploadPolicy {
    pub fn from_download(meta: &Download) -> Result<Self> {
        serde_json::from_value(Value::Object(meta.0.clone()))
            .context("Download record does not carry a usable upload policy")
    }

    /// Text fields of the storage form-post, in the order storage expects
    /// them (the file part always goes last).
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("key", self.path.clone()),
            ("acl", self.acl.clone()),
            ("success_action_status", "201".to_string()),
            ("Filename", self.name.clone()),
            ("AWSAccessKeyId", self.accesskeyid.clone()),
            ("Policy", self.policy.clone()),
            ("Signature", self.signature.clone()),
            ("Content-Type", self.mime_type.clone()),
        ]
    }
}

/// Operations the release tasks need from the hosting platform.
pub trait DownloadsApi {
    fn list_downloads(&self) -> Result<Vec<Download>>;

    fn delete_download(&self, download: &Download) -> Result<Value>;

    /// Create the download record for `file_path`, then push its bytes to
    /// storage. Returns the record with `file_path` added.
    fn create_and_upload_download(
        &self,
        file_path: &Path,
        suffix: &str,
        description: Option<&str>,
    ) -> Result<Download>;
}

/// Join the API base with a relative path. An empty path is the base itself.
pub fn api_url(base: &str, path: &str) -> String {
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), path)
}

/// `Authorization` value for HTTP Basic auth.
pub fn basic_auth(user: &str, secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", user, secret)))
}

pub fn default_description(suffix: &str) -> String {
    format!("Pre-packaged sphinx theme for {}.", suffix)
}

#[derive(Clone)]
pub struct GitHubClient {
    client: Client,
    settings: Settings,
    credentials: Credentials,
}

impl GitHubClient {
    pub fn new(settings: Settings, credentials: Credentials) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(GitHubClient {
            client,
            settings,
            credentials,
        })
    }

    /// Settings from the environment, credentials from git config.
    pub fn connect(shell: &Shell) -> Result<Self> {
        Self::new(Settings::from_env(), Credentials::from_git_config(shell)?)
    }

    fn auth_headers(&self) -> Result<HeaderMap> {
        let secret = self.credentials.secret()?;
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&basic_auth(&self.credentials.user, secret))
            .context("Credentials are not valid in an HTTP header")?;
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    fn downloads_path(&self) -> String {
        format!("repos/{}/{}/downloads", self.credentials.user, self.settings.repo)
    }

    /// Perform an authenticated API request and decode the JSON reply.
    /// An empty reply decodes to an empty object.
    pub fn request(
        &self,
        path: &str,
        method: Method,
        headers: HeaderMap,
        body: Option<String>,
    ) -> Result<Value> {
        let url = api_url(&self.settings.api_url, path);
        debug!(%method, %url, "api request");

        let mut req = self
            .client
            .request(method.clone(), &url)
            .headers(headers)
            .headers(self.auth_headers()?);
        if let Some(body) = body {
            req = req.body(body);
        }

        let res = req
            .send()
            .with_context(|| format!("Failed to send {} {}", method, url))?;
        let status = res.status();
        let txt = res.text().context("Failed to read API response")?;
        if !status.is_success() {
            return Err(ReleaseError::Api {
                method: method.to_string(),
                url,
                status: status.as_u16(),
                body: txt,
            }
            .into());
        }

        if txt.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        serde_json::from_str(&txt).context("Parsing API response json")
    }

    /// Multipart POST of the file to storage, authenticated by the signed
    /// policy rather than by user credentials.
    fn upload_to_storage(&self, policy: &UploadPolicy, file_path: &Path) -> Result<()> {
        let file = File::open(file_path)
            .with_context(|| format!("Failed to open {}", file_path.display()))?;
        let len = file.metadata().context("Failed to stat upload file")?.len();

        let part = multipart::Part::reader_with_length(file, len)
            .file_name(policy.name.clone())
            .mime_str(&policy.mime_type)
            .context("Invalid mime type in upload policy")?;
        let form = policy
            .form_fields()
            .into_iter()
            .fold(multipart::Form::new(), |form, (k, v)| form.text(k, v))
            .part("file", part);

        let url = &self.settings.upload_url;
        info!(file = %file_path.display(), %url, "uploading to storage");
        let res = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .context("Failed to send storage upload")?;
        if !res.status().is_success() {
            let status = res.status();
            let txt = res.text().unwrap_or_else(|_| "".into());
            return Err(ReleaseError::Api {
                method: "POST".into(),
                url: url.clone(),
                status: status.as_u16(),
                body: txt,
            }
            .into());
        }
        Ok(())
    }
}

impl DownloadsApi for GitHubClient {
    fn list_downloads(&self) -> Result<Vec<Download>> {
        let value = self.request(&self.downloads_path(), Method::GET, HeaderMap::new(), None)?;
        serde_json::from_value(value).context("Parsing downloads list")
    }

    fn delete_download(&self, download: &Download) -> Result<Value> {
        let path = format!("{}/{}", self.downloads_path(), download.id()?);
        self.request(&path, Method::DELETE, HeaderMap::new(), None)
    }

    fn create_and_upload_download(
        &self,
        file_path: &Path,
        suffix: &str,
        description: Option<&str>,
    ) -> Result<Download> {
        let description = match description {
            Some(d) if !d.is_empty() => d.to_string(),
            _ => default_description(suffix),
        };
        let name = file_path
            .file_name()
            .and_then(|s| s.to_str())
            .with_context(|| format!("No file name in {}", file_path.display()))?
            .to_string();
        let size = std::fs::metadata(file_path)
            .with_context(|| format!("Failed to stat {}", file_path.display()))?
            .len();

        // Part 1: create the resource.
        let body = serde_json::to_string(&NewDownload {
            name,
            size,
            description,
        })?;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let created = self.request(&self.downloads_path(), Method::POST, headers, Some(body))?;
        let mut meta: Download =
            serde_json::from_value(created).context("Parsing created download")?;
        meta.insert("file_path", file_path.display().to_string());

        // Part 2: push the bytes.
        let policy = UploadPolicy::from_download(&meta)?;
        self.upload_to_storage(&policy, file_path)?;
        Ok(meta)
    }
}
