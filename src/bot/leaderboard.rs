// src/bot/leaderboard.rs - Named points entries in a remote versioned document

use async_trait::async_trait;
use base64::Engine as _;
use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::types::{BotError, BotResult, ScoreEntry};

/// Revision for optimistic concurrency; opaque, supplied by the store
pub type Revision = String;

/// The leaderboard document lives in an external versioned store. `put` must
/// fail with `BotError::Conflict` when the supplied revision is stale.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn fetch(&self) -> BotResult<(Vec<ScoreEntry>, Revision)>;

    async fn put(
        &self,
        entries: &[ScoreEntry],
        revision: &Revision,
        message: &str,
    ) -> BotResult<()>;
}

/// GitHub repository file as the document store (contents API).
/// The revision token is the blob SHA GitHub hands back on every read.
pub struct GitHubDocumentStore {
    client: reqwest::Client,
    token: String,
    owner: String,
    repo: String,
    path: String,
    branch: String,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    content: String,
    sha: String,
}

impl GitHubDocumentStore {
    pub fn new(token: String, owner: String, repo: String, path: String, branch: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            owner,
            repo,
            path,
            branch,
        }
    }

    fn contents_url(&self) -> String {
        format!(
            "https://api.github.com/repos/{}/{}/contents/{}",
            self.owner, self.repo, self.path
        )
    }
}

#[async_trait]
impl DocumentStore for GitHubDocumentStore {
    async fn fetch(&self) -> BotResult<(Vec<ScoreEntry>, Revision)> {
        let response = self
            .client
            .get(self.contents_url())
            .query(&[("ref", self.branch.as_str())])
            .header("Authorization", format!("token {}", self.token))
            .header("User-Agent", "guardbot")
            .send()
            .await
            .map_err(|e| BotError::Storage(format!("leaderboard fetch failed: {e}")))?;

        if !response.status().is_success() {
            return Err(BotError::Storage(format!(
                "leaderboard fetch returned {}",
                response.status()
            )));
        }

        let body: ContentsResponse = response
            .json()
            .await
            .map_err(|e| BotError::Storage(format!("bad contents response: {e}")))?;

        // GitHub wraps base64 content at 60 columns
        let raw: String = body.content.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(raw)
            .map_err(|e| BotError::Storage(format!("bad document encoding: {e}")))?;
        let entries: Vec<ScoreEntry> = serde_json::from_slice(&bytes)
            .map_err(|e| BotError::Storage(format!("bad document contents: {e}")))?;

        debug!("Fetched leaderboard: {} entries at {}", entries.len(), body.sha);
        Ok((entries, body.sha))
    }

    async fn put(
        &self,
        entries: &[ScoreEntry],
        revision: &Revision,
        message: &str,
    ) -> BotResult<()> {
        let json = serde_json::to_vec_pretty(entries)
            .map_err(|e| BotError::Storage(format!("serialize failed: {e}")))?;
        let content = base64::engine::general_purpose::STANDARD.encode(json);

        let response = self
            .client
            .put(self.contents_url())
            .header("Authorization", format!("token {}", self.token))
            .header("User-Agent", "guardbot")
            .json(&serde_json::json!({
                "message": message,
                "content": content,
                "sha": revision,
                "branch": self.branch,
            }))
            .send()
            .await
            .map_err(|e| BotError::Storage(format!("leaderboard update failed: {e}")))?;

        match response.status().as_u16() {
            200 | 201 => Ok(()),
            // Stale sha: somebody updated the document underneath us
            409 | 422 => Err(BotError::Conflict),
            status => Err(BotError::Storage(format!(
                "leaderboard update returned {status}"
            ))),
        }
    }
}

/// In-memory document store; the default when no remote repo is configured,
/// and the test double for the CAS loop.
#[derive(Default)]
pub struct MemoryDocumentStore {
    state: std::sync::Mutex<(Vec<ScoreEntry>, u64)>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn fetch(&self) -> BotResult<(Vec<ScoreEntry>, Revision)> {
        let state = self.state.lock().unwrap();
        Ok((state.0.clone(), state.1.to_string()))
    }

    async fn put(
        &self,
        entries: &[ScoreEntry],
        revision: &Revision,
        _message: &str,
    ) -> BotResult<()> {
        let mut state = self.state.lock().unwrap();
        if *revision != state.1.to_string() {
            return Err(BotError::Conflict);
        }
        state.0 = entries.to_vec();
        state.1 += 1;
        Ok(())
    }
}

/// Outcome of an add-points request
#[derive(Debug, Clone, PartialEq)]
pub enum PointsOutcome {
    Updated { name: String, total: f64 },
    /// Unknown name: the issuing admin must confirm creation with yes/no
    NeedsConfirmation { name: String, delta: f64 },
}

/// Outcome of a yes/no confirmation reply
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmOutcome {
    Created { name: String, points: f64 },
    Cancelled,
    NothingPending,
}

/// Points leaderboard service: read-modify-write with a bounded
/// retry-on-conflict loop around every mutation.
pub struct Leaderboard {
    store: Arc<dyn DocumentStore>,
    pending: RwLock<HashMap<i64, (String, f64)>>,
    max_retries: u32,
    pub website_url: Option<String>,
}

impl Leaderboard {
    pub fn new(store: Arc<dyn DocumentStore>, website_url: Option<String>) -> Self {
        Self {
            store,
            pending: RwLock::new(HashMap::new()),
            max_retries: 3,
            website_url,
        }
    }

    fn find_index(entries: &[ScoreEntry], name: &str) -> Option<usize> {
        entries
            .iter()
            .position(|e| e.name.eq_ignore_ascii_case(name))
    }

    fn sort(entries: &mut [ScoreEntry]) {
        entries.sort_by(|a, b| b.points.partial_cmp(&a.points).unwrap_or(std::cmp::Ordering::Equal));
    }

    /// Run one read-modify-write cycle, retrying on revision conflicts.
    /// The mutator returns Ok(Some(value)) to commit, Ok(None) to bail
    /// without writing.
    async fn mutate<T, F>(&self, message: &str, mut mutator: F) -> BotResult<Option<T>>
    where
        F: FnMut(&mut Vec<ScoreEntry>) -> BotResult<Option<T>>,
        T: Clone,
    {
        for attempt in 0..=self.max_retries {
            let (mut entries, revision) = self.store.fetch().await?;
            let value = match mutator(&mut entries)? {
                Some(v) => v,
                None => return Ok(None),
            };
            Self::sort(&mut entries);

            match self.store.put(&entries, &revision, message).await {
                Ok(()) => return Ok(Some(value)),
                Err(BotError::Conflict) => {
                    warn!(
                        "Leaderboard revision conflict on '{}' (attempt {}/{})",
                        message,
                        attempt + 1,
                        self.max_retries + 1
                    );
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        Err(BotError::Storage("leaderboard update kept conflicting".to_string()))
    }

    /// Add (or subtract) points. Creating a brand-new entry is held back
    /// until the issuer confirms, matching the two-step admin flow.
    pub async fn add_points(
        &self,
        issuer_id: i64,
        name: &str,
        delta: f64,
    ) -> BotResult<PointsOutcome> {
        let updated = self
            .mutate(&format!("Add {delta} points to {name}"), |entries| {
                Ok(Self::find_index(entries, name).map(|i| {
                    entries[i].points += delta;
                    (entries[i].name.clone(), entries[i].points)
                }))
            })
            .await?;

        match updated {
            Some((name, total)) => Ok(PointsOutcome::Updated { name, total }),
            None => {
                self.pending
                    .write()
                    .await
                    .insert(issuer_id, (name.to_string(), delta));
                Ok(PointsOutcome::NeedsConfirmation {
                    name: name.to_string(),
                    delta,
                })
            }
        }
    }

    /// Resolve a pending entry-creation confirmation for this issuer
    pub async fn confirm_pending(&self, issuer_id: i64, accept: bool) -> BotResult<ConfirmOutcome> {
        let Some((name, delta)) = self.pending.write().await.remove(&issuer_id) else {
            return Ok(ConfirmOutcome::NothingPending);
        };
        if !accept {
            return Ok(ConfirmOutcome::Cancelled);
        }

        self.mutate(&format!("Create {name} with {delta} points"), |entries| {
            if Self::find_index(entries, &name).is_none() {
                entries.push(ScoreEntry {
                    name: name.clone(),
                    points: delta,
                });
            }
            Ok(Some(()))
        })
        .await?;

        info!("Created leaderboard entry '{}' with {} points", name, delta);
        Ok(ConfirmOutcome::Created { name, points: delta })
    }

    pub async fn has_pending(&self, issuer_id: i64) -> bool {
        self.pending.read().await.contains_key(&issuer_id)
    }

    /// Rename an entry; the new name must be free
    pub async fn rename(&self, old_name: &str, new_name: &str) -> BotResult<()> {
        self.mutate(&format!("Rename {old_name} to {new_name}"), |entries| {
            let index = Self::find_index(entries, old_name)
                .ok_or_else(|| BotError::NotFound(old_name.to_string()))?;
            if Self::find_index(entries, new_name).is_some() {
                return Err(BotError::Validation(format!(
                    "name '{new_name}' is already taken"
                )));
            }
            entries[index].name = new_name.to_string();
            Ok(Some(()))
        })
        .await?;
        Ok(())
    }

    pub async fn remove(&self, name: &str) -> BotResult<()> {
        self.mutate(&format!("Remove entry {name}"), |entries| {
            let index = Self::find_index(entries, name)
                .ok_or_else(|| BotError::NotFound(name.to_string()))?;
            entries.remove(index);
            Ok(Some(()))
        })
        .await?;
        Ok(())
    }

    pub async fn top(&self, limit: usize) -> BotResult<Vec<ScoreEntry>> {
        let (mut entries, _) = self.store.fetch().await?;
        Self::sort(&mut entries);
        entries.truncate(limit);
        Ok(entries)
    }

    pub async fn list(&self) -> BotResult<Vec<ScoreEntry>> {
        let (mut entries, _) = self.store.fetch().await?;
        Self::sort(&mut entries);
        Ok(entries)
    }

    /// Ranked text rendering shared by the top and list commands
    pub fn render(&self, entries: &[ScoreEntry], title: &str, truncated: bool) -> String {
        if entries.is_empty() {
            return "Leaderboard is empty.".to_string();
        }
        let mut text = format!("🏆 {title}:\n\n");
        for (index, entry) in entries.iter().enumerate() {
            text.push_str(&format!("{}. {}: {}\n", index + 1, entry.name, entry.points));
        }
        if truncated {
            if let Some(ref url) = self.website_url {
                text.push_str(&format!("\n📄 Full leaderboard:\n{url}"));
            }
        }
        text
    }
}
