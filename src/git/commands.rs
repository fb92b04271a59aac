//! Git plumbing wrappers using [`tokio::process::Command`].
//!
//! Every function shells out to the system `git` binary inside one
//! repository. Output is parsed here; no keeper policy lives in this module.

use crate::error::{PruneError, PruneResult};
use crate::image;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Tree entry mode of a symbolic link
const SYMLINK_MODE: &str = "120000";

/// One line of `git cat-file -p <tree>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: String,
    pub kind: String,
    pub oid: String,
    pub name: String,
}

impl TreeEntry {
    /// Whether this entry is a symlink stored as a blob
    pub fn is_symlink_blob(&self) -> bool {
        self.mode == SYMLINK_MODE && self.kind == "blob"
    }
}

/// Handle on one git repository
#[derive(Debug, Clone)]
pub struct Git {
    repo: PathBuf,
}

impl Git {
    /// Open the repository at `repo`
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }

    /// Create an empty repository at `path` with `main` as initial branch
    #[instrument(fields(path = %path.display()))]
    pub async fn init(path: &Path) -> PruneResult<Self> {
        let output = Command::new("git")
            .arg("init")
            .arg("--quiet")
            .args(["-b", "main"])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| PruneError::command_failed("git init", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PruneError::git("git init", stderr.trim()));
        }

        debug!("repository initialised");
        Ok(Self::new(path))
    }

    /// Repository path
    pub fn path(&self) -> &Path {
        &self.repo
    }

    /// Run `git -C <repo> <args>` and return stdout
    pub async fn run(&self, args: &[&str]) -> PruneResult<String> {
        let command = format!("git {}", args.join(" "));
        debug!(repo = %self.repo.display(), %command, "running git");

        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| PruneError::command_failed(&command, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PruneError::git(command, stderr.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Identifiers referenced by the symlinks under `path_prefix` at `commit`
    #[instrument(skip(self))]
    pub async fn list_symlink_targets(
        &self,
        commit: &str,
        path_prefix: &str,
    ) -> PruneResult<Vec<String>> {
        let tree = format!("{}:{}", commit, path_prefix.trim_end_matches('/'));
        let listing = self.run(&["cat-file", "-p", &tree]).await?;

        let mut targets = Vec::new();
        for entry in parse_tree(&listing).into_iter().filter(TreeEntry::is_symlink_blob) {
            let target = self.run(&["cat-file", "blob", &entry.oid]).await?;
            targets.push(target.trim().to_string());
        }

        debug!(count = targets.len(), "symlink targets");
        Ok(targets)
    }

    /// Identifiers added between the merge base of `base_ref` and `head_ref`
    #[instrument(skip(self))]
    pub async fn diff_added_identifiers(
        &self,
        base_ref: &str,
        head_ref: &str,
        path_prefix: &str,
    ) -> PruneResult<Vec<String>> {
        let range = format!("{base_ref}...{head_ref}");
        let diff = self
            .run(&["diff", "--no-color", "--no-ext-diff", &range, "--", path_prefix])
            .await?;
        Ok(parse_added_identifiers(&diff))
    }

    /// Names of refs matching `patterns`
    pub async fn for_each_ref(&self, patterns: &[&str]) -> PruneResult<Vec<String>> {
        let mut args = vec!["for-each-ref", "--format=%(refname)"];
        args.extend_from_slice(patterns);
        let stdout = self.run(&args).await?;

        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Fetch `refspecs` from `remote` in one round trip
    pub async fn fetch(&self, remote: &str, refspecs: &[String]) -> PruneResult<()> {
        let mut args = vec!["fetch", "--quiet", "--no-tags", remote];
        args.extend(refspecs.iter().map(String::as_str));
        self.run(&args).await?;
        Ok(())
    }

    /// URL of the named remote
    pub async fn remote_url(&self, name: &str) -> PruneResult<String> {
        let url = self.run(&["remote", "get-url", name]).await?;
        Ok(url.trim().to_string())
    }
}

/// Parse `git cat-file -p <tree>` output.
///
/// Format: `<mode> SP <type> SP <oid> TAB <name>`
pub fn parse_tree(listing: &str) -> Vec<TreeEntry> {
    listing
        .lines()
        .filter_map(|line| {
            let (meta, name) = line.split_once('\t')?;
            let mut fields = meta.split_whitespace();
            Some(TreeEntry {
                mode: fields.next()?.to_string(),
                kind: fields.next()?.to_string(),
                oid: fields.next()?.to_string(),
                name: name.to_string(),
            })
        })
        .collect()
}

/// Added lines of a unified diff that look like image identifiers
pub fn parse_added_identifiers(diff: &str) -> Vec<String> {
    diff.lines()
        .filter_map(image::added_identifier)
        .map(str::to_string)
        .collect()
}
