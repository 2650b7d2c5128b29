//! # Source Fetching
//!
//! Fetches the properties template from a Git repository at a pinned revision.
//!
//! Every fetch gets its own checkout directory under the configured base
//! directory. The directory is removed when the fetch finishes, whether it
//! succeeded, failed or hit the deadline, so concurrent reconciliations never
//! share working trees.
//!
//! The checkout is a shallow fetch of exactly one revision:
//!
//! ```text
//! git init <dir>
//! git remote add origin <repoUrl>
//! git fetch --depth 1 --no-tags origin <revision>
//! git checkout --detach FETCH_HEAD
//! git rev-parse HEAD
//! git submodule update --init --recursive --depth 1   (only with .gitmodules)
//! ```
//!
//! Credentials and the CA bundle are handed to git through `GIT_CONFIG_*`
//! environment variables so they never appear in the process arguments.

use crate::constants::SYSTEM_CA_BUNDLE_PATHS;
use crate::crd::PropertyConfigSpec;
use crate::observability::metrics;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::ffi::OsStr;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, info_span, warn, Instrument};

/// What to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRequest {
    pub repo_url: String,
    pub revision: String,
    pub properties_path: String,
    /// Extra PEM trust anchors on the controller filesystem
    pub ca_path: Option<PathBuf>,
}

impl SourceRequest {
    #[must_use]
    pub fn from_spec(spec: &PropertyConfigSpec) -> Self {
        Self {
            repo_url: spec.repo_url.clone(),
            revision: spec.revision.clone(),
            properties_path: spec.properties_path.clone(),
            ca_path: (!spec.ca_path.is_empty()).then(|| PathBuf::from(&spec.ca_path)),
        }
    }
}

/// Raw template bytes and the commit they were read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedSource {
    /// Full commit id of the checked out HEAD
    pub commit: String,
    pub contents: Vec<u8>,
}

/// Step of the fetch that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStage {
    Workspace,
    Clone,
    Checkout,
    ResolveHead,
    ReadFile,
    Timeout,
}

impl fmt::Display for FetchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FetchStage::Workspace => "workspace",
            FetchStage::Clone => "clone",
            FetchStage::Checkout => "checkout",
            FetchStage::ResolveHead => "resolve-head",
            FetchStage::ReadFile => "read-file",
            FetchStage::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// Fetch failure
///
/// `commit` is set once HEAD has been resolved, so file errors name the exact
/// commit that was inspected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub stage: FetchStage,
    pub commit: Option<String>,
    pub message: String,
}

impl FetchError {
    #[must_use]
    pub fn new(stage: FetchStage, commit: Option<String>, message: impl Into<String>) -> Self {
        Self {
            stage,
            commit,
            message: message.into(),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.commit {
            Some(commit) => write!(
                f,
                "git {} failed at commit {commit}: {}",
                self.stage, self.message
            ),
            None => write!(f, "git {} failed: {}", self.stage, self.message),
        }
    }
}

impl std::error::Error for FetchError {}

/// Username and password (or token) for HTTPS git remotes
#[derive(Clone, PartialEq, Eq)]
pub struct GitCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for GitCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl GitCredentials {
    /// `Authorization` header value for HTTP basic auth
    #[must_use]
    pub fn basic_auth_header(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Authorization: Basic {token}")
    }
}

/// Supplies git credentials at fetch time
pub trait CredentialProvider: Send + Sync + fmt::Debug {
    /// `None` means the remote is accessed anonymously
    fn credentials(&self) -> Option<GitCredentials>;
}

/// Reads credentials from two environment variables on every fetch
#[derive(Debug, Clone)]
pub struct EnvCredentialProvider {
    username_var: String,
    password_var: String,
}

impl EnvCredentialProvider {
    #[must_use]
    pub fn new(username_var: &str, password_var: &str) -> Self {
        Self {
            username_var: username_var.to_string(),
            password_var: password_var.to_string(),
        }
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn credentials(&self) -> Option<GitCredentials> {
        let username = std::env::var(&self.username_var).unwrap_or_default();
        let password = std::env::var(&self.password_var).unwrap_or_default();
        if username.is_empty() && password.is_empty() {
            return None;
        }
        Some(GitCredentials { username, password })
    }
}

/// Fixed credentials, or none at all
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialProvider(Option<GitCredentials>);

impl StaticCredentialProvider {
    #[must_use]
    pub fn none() -> Self {
        Self(None)
    }

    #[must_use]
    pub fn new(username: &str, password: &str) -> Self {
        Self(Some(GitCredentials {
            username: username.to_string(),
            password: password.to_string(),
        }))
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn credentials(&self) -> Option<GitCredentials> {
        self.0.clone()
    }
}

/// Retrieves template bytes for a request
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, request: &SourceRequest) -> Result<FetchedSource, FetchError>;
}

/// Fetches through the git CLI
#[derive(Debug)]
pub struct GitSourceFetcher {
    git_binary: String,
    checkout_base_dir: PathBuf,
    timeout: Duration,
    credentials: Arc<dyn CredentialProvider>,
}

impl GitSourceFetcher {
    #[must_use]
    pub fn new(
        git_binary: &str,
        checkout_base_dir: PathBuf,
        timeout: Duration,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            git_binary: git_binary.to_string(),
            checkout_base_dir,
            timeout,
            credentials,
        }
    }

    async fn fetch_in_workspace(
        &self,
        request: &SourceRequest,
    ) -> Result<FetchedSource, FetchError> {
        let workspace_err = |e: std::io::Error| {
            FetchError::new(
                FetchStage::Workspace,
                None,
                format!(
                    "cannot create checkout directory under {}: {e}",
                    self.checkout_base_dir.display()
                ),
            )
        };
        tokio::fs::create_dir_all(&self.checkout_base_dir)
            .await
            .map_err(workspace_err)?;
        // Dropped on every exit path, including cancellation by the deadline
        let workspace = tempfile::Builder::new()
            .prefix("checkout-")
            .tempdir_in(&self.checkout_base_dir)
            .map_err(workspace_err)?;
        let checkout = workspace.path().join("repo");

        let mut git_config = Vec::new();
        if let Some(credentials) = self.credentials.credentials() {
            git_config.push((
                "http.extraHeader".to_string(),
                credentials.basic_auth_header(),
            ));
        }
        let ca_bundle = prepare_ca_bundle(request.ca_path.as_deref(), workspace.path()).await?;
        if let Some(bundle) = &ca_bundle {
            git_config.push((
                "http.sslCAInfo".to_string(),
                bundle.display().to_string(),
            ));
        }
        let git = Git {
            binary: &self.git_binary,
            config: git_config,
            ca_bundle,
        };

        git.run(None, [OsStr::new("init"), OsStr::new("--quiet"), checkout.as_os_str()])
            .await
            .map_err(|e| FetchError::new(FetchStage::Workspace, None, e))?;
        git.run(Some(&checkout), ["remote", "add", "origin", request.repo_url.as_str()])
            .await
            .map_err(|e| FetchError::new(FetchStage::Workspace, None, e))?;

        git.run(
            Some(&checkout),
            ["fetch", "--depth", "1", "--no-tags", "origin", request.revision.as_str()],
        )
        .await
        .map_err(|e| {
            FetchError::new(
                FetchStage::Clone,
                None,
                format!(
                    "cannot fetch revision {} from {}: {e}",
                    request.revision, request.repo_url
                ),
            )
        })?;

        git.run(Some(&checkout), ["checkout", "--quiet", "--detach", "FETCH_HEAD"])
            .await
            .map_err(|e| {
                FetchError::new(
                    FetchStage::Checkout,
                    None,
                    format!("cannot check out revision {}: {e}", request.revision),
                )
            })?;

        let commit = git
            .run(Some(&checkout), ["rev-parse", "HEAD"])
            .await
            .map_err(|e| FetchError::new(FetchStage::ResolveHead, None, e))?
            .trim()
            .to_string();
        debug!(commit = %commit, "Resolved revision {}", request.revision);

        if tokio::fs::try_exists(checkout.join(".gitmodules"))
            .await
            .unwrap_or(false)
        {
            git.run(
                Some(&checkout),
                ["submodule", "update", "--init", "--recursive", "--depth", "1"],
            )
            .await
            .map_err(|e| {
                FetchError::new(
                    FetchStage::Clone,
                    Some(commit.clone()),
                    format!("cannot update submodules: {e}"),
                )
            })?;
        }

        let contents = read_properties_file(&checkout, &request.properties_path)
            .await
            .map_err(|e| FetchError::new(FetchStage::ReadFile, Some(commit.clone()), e))?;

        Ok(FetchedSource { commit, contents })
    }
}

#[async_trait]
impl SourceFetcher for GitSourceFetcher {
    async fn fetch(&self, request: &SourceRequest) -> Result<FetchedSource, FetchError> {
        let span = info_span!(
            "git.fetch",
            repository.url = %request.repo_url,
            revision = %request.revision,
            path = %request.properties_path,
        );
        let start = Instant::now();
        metrics::increment_git_fetch_total();

        let result = match tokio::time::timeout(self.timeout, self.fetch_in_workspace(request))
            .instrument(span)
            .await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::new(
                FetchStage::Timeout,
                None,
                format!(
                    "fetch of {} did not finish within {}s",
                    request.repo_url,
                    self.timeout.as_secs()
                ),
            )),
        };

        metrics::observe_git_fetch_duration(start.elapsed().as_secs_f64());
        match &result {
            Ok(fetched) => info!(
                commit = %fetched.commit,
                "Fetched {} from {}",
                request.properties_path,
                request.repo_url
            ),
            Err(e) => {
                metrics::increment_git_fetch_errors_total();
                warn!(stage = %e.stage, "{e}");
            }
        }
        result
    }
}

/// git invocation with a fixed set of config overrides
struct Git<'a> {
    binary: &'a str,
    config: Vec<(String, String)>,
    /// Takes precedence over an inherited `GIT_SSL_CAINFO`
    ca_bundle: Option<PathBuf>,
}

impl Git<'_> {
    /// Run git, returning stdout on success and trimmed stderr on failure
    async fn run<I, S>(&self, dir: Option<&Path>, args: I) -> Result<String, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(self.binary);
        command
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_CONFIG_COUNT", self.config.len().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (index, (key, value)) in self.config.iter().enumerate() {
            command
                .env(format!("GIT_CONFIG_KEY_{index}"), key)
                .env(format!("GIT_CONFIG_VALUE_{index}"), value);
        }
        // git prefers GIT_SSL_CAINFO over http.sslCAInfo
        if let Some(bundle) = &self.ca_bundle {
            command.env("GIT_SSL_CAINFO", bundle);
        }
        if let Some(dir) = dir {
            command.current_dir(dir);
        }

        let output = command
            .output()
            .await
            .map_err(|e| format!("cannot run {}: {e}", self.binary))?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.is_empty() {
                Err(format!("git exited with {}", output.status))
            } else {
                Err(stderr)
            }
        }
    }
}

/// Write the system roots plus `ca_path` into the workspace
///
/// Returns `None` when no extra CA applies and git should use its default trust.
async fn prepare_ca_bundle(
    ca_path: Option<&Path>,
    workspace: &Path,
) -> Result<Option<PathBuf>, FetchError> {
    let Some(ca_path) = ca_path else {
        return Ok(None);
    };
    match tokio::fs::metadata(ca_path).await {
        Ok(meta) if meta.is_file() => {}
        _ => {
            warn!(
                "caPath {} is not a readable file, using default trust roots",
                ca_path.display()
            );
            return Ok(None);
        }
    }

    let custom = tokio::fs::read(ca_path).await.map_err(|e| {
        FetchError::new(
            FetchStage::Workspace,
            None,
            format!("cannot read caPath {}: {e}", ca_path.display()),
        )
    })?;
    let mut bundle = system_ca_bundle().await.unwrap_or_default();
    if !bundle.is_empty() && !bundle.ends_with(b"\n") {
        bundle.push(b'\n');
    }
    bundle.extend_from_slice(&custom);

    let bundle_path = workspace.join("ca-bundle.pem");
    tokio::fs::write(&bundle_path, &bundle).await.map_err(|e| {
        FetchError::new(
            FetchStage::Workspace,
            None,
            format!("cannot write CA bundle: {e}"),
        )
    })?;
    Ok(Some(bundle_path))
}

/// Contents of the first system CA bundle found
async fn system_ca_bundle() -> Option<Vec<u8>> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Ok(path) = std::env::var("SSL_CERT_FILE") {
        candidates.push(PathBuf::from(path));
    }
    candidates.extend(SYSTEM_CA_BUNDLE_PATHS.iter().map(PathBuf::from));
    for candidate in candidates {
        if let Ok(bytes) = tokio::fs::read(&candidate).await {
            return Some(bytes);
        }
    }
    None
}

/// Resolve `relative` inside the checkout, rejecting paths that leave it
///
/// A leading `/` is accepted and treated as the repository root.
pub fn resolve_properties_path(root: &Path, relative: &str) -> Result<PathBuf, String> {
    let trimmed = relative.trim_start_matches('/');
    if trimmed.is_empty() {
        return Err("propertiesPath is empty".to_string());
    }
    let path = Path::new(trimmed);
    if path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(format!(
            "propertiesPath {relative} must stay inside the repository"
        ));
    }
    Ok(root.join(path))
}

async fn read_properties_file(root: &Path, relative: &str) -> Result<Vec<u8>, String> {
    let candidate = resolve_properties_path(root, relative)?;
    let not_found = |e: std::io::Error| format!("cannot read properties file {relative}: {e}");

    // Symlinks inside the repository must not point outside it
    let resolved = tokio::fs::canonicalize(&candidate).await.map_err(not_found)?;
    let canonical_root = tokio::fs::canonicalize(root).await.map_err(not_found)?;
    if !resolved.starts_with(&canonical_root) {
        return Err(format!(
            "propertiesPath {relative} must stay inside the repository"
        ));
    }
    tokio::fs::read(&resolved).await.map_err(not_found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_properties_path_accepts_relative_and_leading_slash() {
        let root = Path::new("/work/repo");
        assert_eq!(
            resolve_properties_path(root, "config/app.properties").unwrap(),
            PathBuf::from("/work/repo/config/app.properties")
        );
        assert_eq!(
            resolve_properties_path(root, "/config/app.properties").unwrap(),
            PathBuf::from("/work/repo/config/app.properties")
        );
    }

    #[test]
    fn test_resolve_properties_path_rejects_escapes() {
        let root = Path::new("/work/repo");
        assert!(resolve_properties_path(root, "../secrets").is_err());
        assert!(resolve_properties_path(root, "config/../../etc/passwd").is_err());
        assert!(resolve_properties_path(root, "").is_err());
        assert!(resolve_properties_path(root, "/").is_err());
    }

    #[test]
    fn test_basic_auth_header() {
        let credentials = GitCredentials {
            username: "bot".to_string(),
            password: "s3cret".to_string(),
        };
        // base64("bot:s3cret")
        assert_eq!(
            credentials.basic_auth_header(),
            "Authorization: Basic Ym90OnMzY3JldA=="
        );
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let credentials = GitCredentials {
            username: "bot".to_string(),
            password: "s3cret".to_string(),
        };
        let printed = format!("{credentials:?}");
        assert!(printed.contains("bot"));
        assert!(!printed.contains("s3cret"));
    }

    #[test]
    fn test_env_credential_provider() {
        let provider = EnvCredentialProvider::new("PCC_TEST_GIT_USER", "PCC_TEST_GIT_TOKEN");
        assert_eq!(provider.credentials(), None);

        std::env::set_var("PCC_TEST_GIT_TOKEN", "token");
        let credentials = provider.credentials().unwrap();
        assert_eq!(credentials.username, "");
        assert_eq!(credentials.password, "token");
        std::env::remove_var("PCC_TEST_GIT_TOKEN");
    }

    #[test]
    fn test_fetch_error_display_names_commit() {
        let err = FetchError::new(
            FetchStage::ReadFile,
            Some("0123abcd".to_string()),
            "cannot read properties file app.properties: not found",
        );
        assert_eq!(
            err.to_string(),
            "git read-file failed at commit 0123abcd: cannot read properties file app.properties: not found"
        );
    }

    #[tokio::test]
    async fn test_missing_ca_path_uses_default_trust() {
        let workspace = tempfile::tempdir().unwrap();
        let bundle = prepare_ca_bundle(
            Some(Path::new("/definitely/not/here.pem")),
            workspace.path(),
        )
        .await
        .unwrap();
        assert_eq!(bundle, None);
    }

    #[tokio::test]
    async fn test_ca_bundle_appends_custom_roots() {
        let workspace = tempfile::tempdir().unwrap();
        let custom = workspace.path().join("custom.pem");
        tokio::fs::write(&custom, b"-----BEGIN CERTIFICATE-----\nTEST\n-----END CERTIFICATE-----\n")
            .await
            .unwrap();

        let bundle = prepare_ca_bundle(Some(&custom), workspace.path())
            .await
            .unwrap()
            .unwrap();
        let contents = tokio::fs::read_to_string(bundle).await.unwrap();
        assert!(contents.ends_with("-----BEGIN CERTIFICATE-----\nTEST\n-----END CERTIFICATE-----\n"));
    }
}
