//! GitHub git-data REST client.
//!
//! Endpoints used, all under `{api_url}/repos/{owner}/{name}/git/`:
//!
//! | Operation            | Request                              |
//! |----------------------|--------------------------------------|
//! | `get_ref`            | `GET ref/heads/{branch}`             |
//! | `get_commit`         | `GET commits/{sha}`                  |
//! | `get_tree_recursive` | `GET trees/{sha}?recursive=1`        |
//! | `get_blob`           | `GET blobs/{sha}`                    |
//! | `create_tree`        | `POST trees`                         |
//! | `create_commit`      | `POST commits`                       |
//! | `set_ref`            | `PATCH refs/heads/{branch}` (or `POST refs` for a new branch) |

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use treesync_core::types::{
    Blob, BlobHash, Commit, CommitHash, TreeEntry, TreeHash, TreeSnapshot,
};
use treesync_core::SiteConfig;

use crate::error::RemoteError;
use crate::store::{EncodedBlob, ObjectStore, TreeItem};

const USER_AGENT: &str = concat!("treesync/", env!("CARGO_PKG_VERSION"));
const ACCEPT: &str = "application/vnd.github+json";

pub struct GitHubClient {
    agent: ureq::Agent,
    repo_url: String,
    branch: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: RefObject,
}

#[derive(Debug, Deserialize)]
struct RefObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ShaOnly {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: String,
    #[serde(default)]
    message: String,
    tree: ShaOnly,
    #[serde(default)]
    parents: Vec<ShaOnly>,
}

impl From<CommitResponse> for Commit {
    fn from(c: CommitResponse) -> Self {
        Commit {
            hash: CommitHash(c.sha),
            message: c.message,
            tree: TreeHash(c.tree.sha),
            parents: c.parents.into_iter().map(|p| CommitHash(p.sha)).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    sha: String,
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

impl GitHubClient {
    /// Client for the repository and branch in `config`. Fails when the
    /// repository is not `owner/name` or no token is available.
    pub fn from_config(config: &SiteConfig) -> Result<Self, RemoteError> {
        let (owner, name) = config.owner_and_name()?;
        let token = config.token().ok_or_else(|| {
            RemoteError::Core(treesync_core::CoreError::InvalidConfig(format!(
                "no token configured; set {} or `token` in config.yaml",
                treesync_core::config::TOKEN_ENV
            )))
        })?;
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(10))
            .timeout_read(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build();
        Ok(Self {
            agent,
            repo_url: repo_url(&config.api_url, owner, name),
            branch: config.branch.clone(),
            token,
        })
    }

    fn url(&self, tail: &str) -> String {
        format!("{}/git/{}", self.repo_url, tail)
    }

    fn request(&self, method: &str, url: &str) -> ureq::Request {
        self.agent
            .request(method, url)
            .set("Authorization", &format!("token {}", self.token))
            .set("Accept", ACCEPT)
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, tail: &str) -> Result<T, RemoteError> {
        let url = self.url(tail);
        tracing::debug!("GET {url}");
        let response = self.request("GET", &url).call().map_err(map_ureq)?;
        decode(response)
    }

    fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        tail: &str,
        body: Value,
    ) -> Result<T, RemoteError> {
        let url = self.url(tail);
        tracing::debug!("{method} {url}");
        let response = self
            .request(method, &url)
            .send_json(body)
            .map_err(map_ureq)?;
        decode(response)
    }
}

fn repo_url(api_url: &str, owner: &str, name: &str) -> String {
    format!("{}/repos/{owner}/{name}", api_url.trim_end_matches('/'))
}

fn decode<T: serde::de::DeserializeOwned>(response: ureq::Response) -> Result<T, RemoteError> {
    response
        .into_json()
        .map_err(|e| RemoteError::Decode(format!("invalid response body: {e}")))
}

fn map_ureq(err: ureq::Error) -> RemoteError {
    match err {
        ureq::Error::Status(status, response) => {
            let body = response.into_string().unwrap_or_default();
            RemoteError::Http {
                status,
                message: api_message(&body),
            }
        }
        ureq::Error::Transport(t) => RemoteError::Transport(t.to_string()),
    }
}

/// The `message` field of a GitHub error body, or the body itself.
fn api_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

fn tree_body(blobs: &[Blob]) -> Value {
    let items: Vec<TreeItem> = blobs.iter().map(TreeItem::from).collect();
    json!({ "tree": items })
}

fn commit_body(tree: &TreeHash, message: &str, parent: Option<&CommitHash>) -> Value {
    let parents: Vec<&str> = parent.map(CommitHash::as_str).into_iter().collect();
    json!({ "message": message, "tree": tree.as_str(), "parents": parents })
}

impl ObjectStore for GitHubClient {
    fn get_ref(&self) -> Result<Option<CommitHash>, RemoteError> {
        match self.get_json::<RefResponse>(&format!("ref/heads/{}", self.branch)) {
            Ok(r) => Ok(Some(CommitHash(r.object.sha))),
            // 404: no such branch; 409: repository has no commits at all.
            Err(RemoteError::Http { status: 404 | 409, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn get_commit(&self, id: &CommitHash) -> Result<Commit, RemoteError> {
        self.get_json::<CommitResponse>(&format!("commits/{id}"))
            .map(Commit::from)
    }

    fn get_tree_recursive(&self, tree: &TreeHash) -> Result<TreeSnapshot, RemoteError> {
        let r: TreeResponse = self.get_json(&format!("trees/{tree}?recursive=1"))?;
        if r.truncated {
            tracing::warn!(
                "tree {} listing was truncated by the API; some blobs are missing",
                r.sha
            );
        }
        Ok(TreeSnapshot {
            hash: Some(TreeHash(r.sha)),
            entries: r.tree,
        })
    }

    fn get_blob(&self, hash: &BlobHash) -> Result<EncodedBlob, RemoteError> {
        self.get_json(&format!("blobs/{hash}"))
    }

    fn create_tree(&mut self, blobs: &[Blob]) -> Result<TreeHash, RemoteError> {
        let r: ShaOnly = self.send_json("POST", "trees", tree_body(blobs))?;
        Ok(TreeHash(r.sha))
    }

    fn create_commit(&mut self, tree: &TreeHash, message: &str) -> Result<Commit, RemoteError> {
        let parent = self.get_ref()?;
        let r: CommitResponse =
            self.send_json("POST", "commits", commit_body(tree, message, parent.as_ref()))?;
        Ok(r.into())
    }

    fn set_ref(&mut self, commit: &CommitHash) -> Result<(), RemoteError> {
        let tail = format!("refs/heads/{}", self.branch);
        let patched: Result<Value, RemoteError> =
            self.send_json("PATCH", &tail, json!({ "sha": commit.as_str(), "force": false }));
        match patched {
            Ok(_) => Ok(()),
            Err(RemoteError::Http { status: 404 | 422, .. }) => {
                tracing::info!("branch {} does not exist yet; creating it", self.branch);
                let body = json!({ "ref": format!("refs/heads/{}", self.branch), "sha": commit.as_str() });
                self.send_json::<Value>("POST", "refs", body).map(|_| ())
            }
            Err(e) => Err(e),
        }
    }
}
