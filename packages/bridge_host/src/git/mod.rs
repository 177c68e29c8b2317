//! `git` category handlers (spec §4.8): `status`, `diff`, `show`, `stage`,
//! `unstage`, `discard`, `branch`. Grounded on the teacher's `git/executor.rs`
//! (`run_git`) and `git/status.rs` (porcelain parsing) kept close to
//! verbatim; `diff`/`show`/`branch` are the teacher's plain-text git
//! invocations without the teacher's tree-sitter structural-diff layer,
//! which has no counterpart in this spec.

pub mod executor;
pub mod status;

use serde::Serialize;

use crate::error::HandlerError;
use executor::run_git;
pub use status::{parse_porcelain_status, GitStatusResponse};

pub async fn status(working_dir: &str) -> Result<GitStatusResponse, HandlerError> {
    let output = run_git(working_dir, &["status", "--porcelain=v2", "--branch"])
        .await
        .map_err(HandlerError::handler)?;
    Ok(parse_porcelain_status(&output))
}

#[derive(Serialize)]
pub struct DiffResponse {
    pub diff: String,
}

pub async fn diff(
    working_dir: &str,
    file_path: Option<&str>,
    staged: bool,
) -> Result<DiffResponse, HandlerError> {
    let mut args: Vec<&str> = vec!["diff"];
    if staged {
        args.push("--staged");
    }
    if let Some(path) = file_path {
        args.push("--");
        args.push(path);
    }
    let diff = run_git(working_dir, &args).await.map_err(HandlerError::handler)?;
    Ok(DiffResponse { diff })
}

pub async fn show(
    working_dir: &str,
    file_path: &str,
    reference: Option<&str>,
) -> Result<DiffResponse, HandlerError> {
    let spec = format!("{}:{file_path}", reference.unwrap_or("HEAD"));
    let content = run_git(working_dir, &["show", &spec])
        .await
        .map_err(HandlerError::handler)?;
    Ok(DiffResponse { diff: content })
}

pub async fn stage(working_dir: &str, file_path: &str) -> Result<(), HandlerError> {
    run_git(working_dir, &["add", "--", file_path])
        .await
        .map(|_| ())
        .map_err(HandlerError::handler)
}

pub async fn unstage(working_dir: &str, file_path: &str) -> Result<(), HandlerError> {
    run_git(working_dir, &["restore", "--staged", "--", file_path])
        .await
        .map(|_| ())
        .map_err(HandlerError::handler)
}

pub async fn discard(working_dir: &str, file_path: &str) -> Result<(), HandlerError> {
    run_git(working_dir, &["checkout", "--", file_path])
        .await
        .map(|_| ())
        .map_err(HandlerError::handler)
}

#[derive(Serialize)]
pub struct BranchInfo {
    pub name: String,
    pub current: bool,
}

#[derive(Serialize)]
pub struct BranchResponse {
    pub current: String,
    pub branches: Vec<BranchInfo>,
}

pub async fn branch(working_dir: &str) -> Result<BranchResponse, HandlerError> {
    let current = run_git(working_dir, &["rev-parse", "--abbrev-ref", "HEAD"])
        .await
        .map_err(HandlerError::handler)?
        .trim()
        .to_string();

    let output = run_git(working_dir, &["branch", "--format=%(refname:short)"])
        .await
        .map_err(HandlerError::handler)?;

    let branches = output
        .lines()
        .filter(|l| !l.is_empty())
        .map(|name| BranchInfo {
            name: name.to_string(),
            current: name == current,
        })
        .collect();

    Ok(BranchResponse { current, branches })
}
