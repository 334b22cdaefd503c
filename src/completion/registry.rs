use crate::{
    Result, error,
    paths::{FileMode, Paths, write_atomic},
    shell::Shell,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use snafu::{OptionExt, ResultExt};
use std::{
    collections::BTreeMap,
    io::Read,
    path::PathBuf,
    sync::OnceLock,
    time::Duration,
};

/// Where the completion-script catalog lives.
pub const DEFAULT_REGISTRY_URL: &str =
    "https://raw.githubusercontent.com/NikitaCOEUR/dirvana/main/registry/v1/completion-scripts.yml";

/// The cached catalog is considered fresh for this long.
pub const REGISTRY_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Relative path probed in dev mode before any cache or network access.
const DEV_REGISTRY_PATH: &str = "registry/v1/completion-scripts.yml";

const MAX_REGISTRY_BYTES: u64 = 4 * 1024 * 1024;
const MAX_SCRIPT_BYTES: u64 = 4 * 1024 * 1024;

const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// The parsed completion-script catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tools: BTreeMap<String, RegistryTool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryTool {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub homepage: String,
    pub script: ScriptSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptSource {
    pub url: String,
    #[serde(default)]
    pub sha256: String,
}

/// Process-wide HTTP client, shared by every download. Tests inject their own
/// client (and base URL) through [`RegistryClient`] instead of touching this.
pub(crate) fn shared_client() -> reqwest::blocking::Client {
    static CLIENT: OnceLock<reqwest::blocking::Client> = OnceLock::new();
    CLIENT
        .get_or_init(|| {
            reqwest::blocking::Client::builder()
                .user_agent(format!(
                    "dirvana/{} ({})",
                    env!("CARGO_PKG_VERSION"),
                    env!("CARGO_PKG_REPOSITORY")
                ))
                .timeout(HTTP_TIMEOUT)
                .connect_timeout(HTTP_CONNECT_TIMEOUT)
                .build()
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "falling back to default HTTP client");
                    reqwest::blocking::Client::new()
                })
        })
        .clone()
}

/// Loads the catalog and fetches completion scripts.
///
/// Uses blocking HTTP; callers running inside the completion race hop through
/// `spawn_blocking` first.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    paths: Paths,
    client: reqwest::blocking::Client,
    base_url: String,
    dev_mode: bool,
    dev_root: PathBuf,
}

impl RegistryClient {
    pub fn new(paths: Paths, dev_mode: bool) -> Self {
        Self {
            paths,
            client: shared_client(),
            base_url: DEFAULT_REGISTRY_URL.to_string(),
            dev_mode,
            dev_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_client(mut self, client: reqwest::blocking::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_dev_root(mut self, dev_root: PathBuf) -> Self {
        self.dev_root = dev_root;
        self
    }

    /// Load the registry catalog:
    /// 1. dev mode with a checked-out catalog -> parse it, no network
    /// 2. cache younger than [`REGISTRY_TTL`] -> parse it
    /// 3. fetch, persist (plus a `.hash` sidecar), return
    /// 4. fetch failed -> an expired cache is still better than nothing
    pub fn load(&self) -> Result<Registry> {
        if self.dev_mode {
            let dev_path = self.dev_root.join(DEV_REGISTRY_PATH);
            if dev_path.is_file() {
                tracing::debug!(path = %dev_path.display(), "dev mode: loading local registry");
                let bytes = std::fs::read(&dev_path).map_err(|source| error::Error::Io {
                    path: dev_path.clone(),
                    source,
                })?;
                return parse_registry(&bytes, &dev_path.display().to_string());
            }
        }

        let cache_path = self.paths.registry_file();
        if let Some(age) = file_age(&cache_path) {
            if age < REGISTRY_TTL {
                if let Ok(bytes) = std::fs::read(&cache_path) {
                    match parse_registry(&bytes, &cache_path.display().to_string()) {
                        Ok(registry) => return Ok(registry),
                        Err(e) => {
                            tracing::warn!(error = %e, "cached registry unparseable; refetching");
                        }
                    }
                }
            }
        }

        match self.fetch_and_persist() {
            Ok(registry) => Ok(registry),
            Err(fetch_err) => {
                if let Ok(bytes) = std::fs::read(&cache_path) {
                    tracing::warn!(
                        error = %fetch_err,
                        "registry fetch failed; using expired cache"
                    );
                    return parse_registry(&bytes, &cache_path.display().to_string());
                }
                Err(fetch_err)
            }
        }
    }

    /// Make sure the completion script for `tool` exists on disk, downloading
    /// it from the registry if needed, and return its path.
    ///
    /// The `shell` parameter exists for interface symmetry only: every script
    /// is written to the bash cache location because the bash runner serves
    /// all shells.
    pub fn ensure_script(&self, tool: &str, shell: Shell) -> Result<PathBuf> {
        if shell != Shell::Bash {
            tracing::debug!(%shell, tool, "completion scripts always land in the bash cache");
        }

        let target = self.paths.script_path(tool);
        if target.is_file() {
            return Ok(target);
        }

        let registry = self.load()?;
        let entry = registry
            .tools
            .get(tool)
            .with_context(|| error::NotFoundSnafu {
                resource: format!("registry entry for tool '{tool}'"),
            })?;

        let bytes = download(&self.client, &entry.script.url, MAX_SCRIPT_BYTES)?;

        if !entry.script.sha256.is_empty() {
            let actual = sha256_hex(&bytes);
            if !actual.eq_ignore_ascii_case(&entry.script.sha256) {
                return error::ScriptHashMismatchSnafu {
                    resource: tool.to_string(),
                    expected: entry.script.sha256.clone(),
                    actual,
                }
                .fail();
            }
        }

        write_atomic(&target, &bytes, FileMode::Shared)?;
        tracing::debug!(tool, path = %target.display(), "downloaded completion script");
        Ok(target)
    }

    fn fetch_and_persist(&self) -> Result<Registry> {
        let bytes = download(&self.client, &self.base_url, MAX_REGISTRY_BYTES)?;
        let registry = parse_registry(&bytes, &self.base_url)?;

        let cache_path = self.paths.registry_file();
        if let Err(e) = write_atomic(&cache_path, &bytes, FileMode::Shared) {
            tracing::warn!(error = %e, "failed to persist registry cache");
        } else if let Err(e) = write_atomic(
            &self.paths.registry_hash_file(),
            sha256_hex(&bytes).as_bytes(),
            FileMode::Shared,
        ) {
            tracing::warn!(error = %e, "failed to persist registry hash sidecar");
        }

        Ok(registry)
    }
}

/// Validate a download URL: only http/https with a non-empty host.
pub fn validate_url(raw: &str) -> Result<url::Url> {
    let parsed = url::Url::parse(raw).map_err(|_| error::Error::InvalidRegistryUrl {
        url: raw.to_string(),
    })?;

    let scheme_ok = matches!(parsed.scheme(), "http" | "https");
    let host_ok = parsed.host_str().is_some_and(|h| !h.is_empty());
    if !scheme_ok || !host_ok {
        return error::InvalidRegistryUrlSnafu {
            url: raw.to_string(),
        }
        .fail();
    }

    Ok(parsed)
}

/// Download a URL, refusing anything that is not a plain 200 or that exceeds
/// `cap` bytes. A Content-Length above the cap short-circuits the refusal;
/// the streamed read enforces it regardless.
pub fn download(client: &reqwest::blocking::Client, raw_url: &str, cap: u64) -> Result<Vec<u8>> {
    let url = validate_url(raw_url)?;

    let response = client
        .get(url.clone())
        .send()
        .with_context(|_| error::HttpRequestSnafu {
            url: raw_url.to_string(),
        })?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return error::HttpStatusSnafu {
            url: raw_url.to_string(),
            status: status.as_u16(),
        }
        .fail();
    }

    if response.content_length().is_some_and(|len| len > cap) {
        return error::DownloadTooLargeSnafu {
            url: raw_url.to_string(),
            cap,
        }
        .fail();
    }

    let mut body = Vec::new();
    response
        .take(cap + 1)
        .read_to_end(&mut body)
        .map_err(|source| error::Error::Io {
            path: PathBuf::from(raw_url),
            source,
        })?;

    if body.len() as u64 > cap {
        return error::DownloadTooLargeSnafu {
            url: raw_url.to_string(),
            cap,
        }
        .fail();
    }

    Ok(body)
}

fn parse_registry(bytes: &[u8], origin: &str) -> Result<Registry> {
    serde_yaml::from_slice(bytes).with_context(|_| error::RegistryParseSnafu {
        origin: origin.to_string(),
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn file_age(path: &std::path::Path) -> Option<Duration> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    std::time::SystemTime::now().duration_since(modified).ok()
}
