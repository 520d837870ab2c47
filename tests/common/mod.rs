// Shared fakes for the task tests: a scripted command executor and an
// in-memory downloads API that records every call.
#![allow(dead_code)]

use anyhow::Result;
use bootstrap_release::api::{Download, DownloadsApi};
use bootstrap_release::shell::{Execution, Executor, Invocation, Shell};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

pub type Calls<T> = Rc<RefCell<Vec<T>>>;

pub fn ok(stdout: &str) -> Execution {
    Execution {
        success: true,
        code: Some(0),
        status: "exit status: 0".into(),
        stdout: stdout.into(),
    }
}

pub fn fail() -> Execution {
    Execution {
        success: false,
        code: Some(1),
        status: "exit status: 1".into(),
        stdout: String::new(),
    }
}

pub struct Scripted {
    calls: Calls<Invocation>,
    handler: Box<dyn Fn(&Invocation) -> Execution>,
}

impl Executor for Scripted {
    fn execute(&self, invocation: &Invocation, _capture: bool) -> Result<Execution> {
        self.calls.borrow_mut().push(invocation.clone());
        Ok((self.handler)(invocation))
    }
}

/// Answers the two suffix queries; everything else succeeds silently.
pub fn git_answers(invocation: &Invocation) -> Execution {
    match (invocation.program.as_str(), invocation.args.first().map(String::as_str)) {
        ("git", Some("describe")) => ok("v0.1.6-3-g1a2b3c4\n"),
        ("git", Some("rev-parse")) => ok("abc123\n"),
        _ => ok(""),
    }
}

pub fn scripted_shell(
    root: &Path,
    handler: impl Fn(&Invocation) -> Execution + 'static,
) -> (Shell, Calls<Invocation>) {
    let calls: Calls<Invocation> = Rc::default();
    let executor = Scripted {
        calls: calls.clone(),
        handler: Box::new(handler),
    };
    (Shell::with_executor(root, executor), calls)
}

/// Scratch project with the files setup.py packaging expects.
pub fn project() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("README.rst"), "Sphinx Bootstrap Theme\n").unwrap();
    fs::write(dir.path().join("HISTORY.rst"), "History\n=======\n").unwrap();
    dir
}

pub fn touch(root: &Path, rel: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"PK").unwrap();
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    List,
    Delete(String),
    Upload { file: String, suffix: String },
}

pub fn download(id: u64, name: &str) -> Download {
    serde_json::from_value(json!({
        "id": id,
        "name": name,
        "created_at": "2013-01-05T21:12:49Z",
    }))
    .unwrap()
}

pub struct FakeDownloads {
    pub remote: Vec<Download>,
    pub calls: Calls<Call>,
}

impl FakeDownloads {
    pub fn new(remote: Vec<Download>) -> (Self, Calls<Call>) {
        let calls: Calls<Call> = Rc::default();
        (
            FakeDownloads {
                remote,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

impl DownloadsApi for FakeDownloads {
    fn list_downloads(&self) -> Result<Vec<Download>> {
        self.calls.borrow_mut().push(Call::List);
        Ok(self.remote.clone())
    }

    fn delete_download(&self, download: &Download) -> Result<Value> {
        self.calls
            .borrow_mut()
            .push(Call::Delete(download.name()?.to_string()));
        Ok(json!({}))
    }

    fn create_and_upload_download(
        &self,
        file_path: &Path,
        suffix: &str,
        _description: Option<&str>,
    ) -> Result<Download> {
        let file = file_path.file_name().unwrap().to_string_lossy().into_owned();
        let mut calls = self.calls.borrow_mut();
        calls.push(Call::Upload {
            file: file.clone(),
            suffix: suffix.to_string(),
        });
        let mut meta = download(100 + calls.len() as u64, &file);
        meta.insert("file_path", PathBuf::from(file_path).display().to_string());
        Ok(meta)
    }
}
