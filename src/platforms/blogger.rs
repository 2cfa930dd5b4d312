// ABOUTME: Blogger adapter: pull/push over the v3 API, polling for new posts, pruning Markdown mirrors
// ABOUTME: Each long-running task mints its own access tokens and owns its KnownPosts set

use super::{Destination, Markdown, MirrorReconciler, Platform, PlatformKind, Source, WatchableSource};
use crate::api::BloggerApi;
use crate::auth::Authorizer;
use crate::config::BloggerConfig;
use crate::convert::{html_to_markdown, markdown_to_html};
use crate::model::{BloggerPost, NewBloggerPost, OAuthCredentials, Post, TransferOptions};
use crate::summary::summarizer_for;
use crate::util::markdown_filename;
use crate::watch::{with_retry, RetryPolicy};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use reqwest::Url;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Remote ids a watch task has already seen.
#[derive(Debug, Default)]
pub struct KnownPosts {
    ids: HashSet<String>,
    baselined: bool,
}

/// What one poll of the listing means for the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cycle {
    /// First poll: everything listed is treated as already known.
    Baseline { seeded: usize },
    /// Later polls: ids that disappeared, and new ids in listing order.
    Changes {
        removed: Vec<String>,
        added: Vec<String>,
    },
}

impl KnownPosts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn is_baselined(&self) -> bool {
        self.baselined
    }

    pub fn observe<'a, I>(&mut self, listing: I) -> Cycle
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut listed = HashSet::new();
        let mut ordered = Vec::new();
        for id in listing {
            if listed.insert(id) {
                ordered.push(id);
            }
        }

        if !self.baselined {
            self.baselined = true;
            self.ids = ordered.iter().map(|id| id.to_string()).collect();
            return Cycle::Baseline {
                seeded: self.ids.len(),
            };
        }

        let mut removed: Vec<String> = self
            .ids
            .iter()
            .filter(|id| !listed.contains(id.as_str()))
            .cloned()
            .collect();
        removed.sort();
        for id in &removed {
            self.ids.remove(id);
        }

        let mut added = Vec::new();
        for id in ordered {
            if self.ids.insert(id.to_string()) {
                added.push(id.to_string());
            }
        }

        Cycle::Changes { removed, added }
    }
}

/// A freshly minted access token and the blog it is used against.
#[derive(Clone)]
pub struct Session {
    pub access_token: String,
    pub blog_id: String,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("blog_id", &self.blog_id)
            .finish()
    }
}

/// Path component of a post URL, e.g. `/2024/01/hello.html`.
pub fn post_path(url: &str) -> Result<String> {
    let url = url.trim();
    // a bare path is used as given
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.to_string(),
    };
    if path.is_empty() || path == "/" {
        return Err(Error::InvalidField {
            field: "post_url".into(),
            expected: "a URL with a post path",
        });
    }
    Ok(path)
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::missing_field(field))
}

fn timestamp(value: Option<String>, field: &str) -> Result<DateTime<FixedOffset>> {
    let raw = required(value, field)?;
    DateTime::parse_from_rfc3339(&raw).map_err(|_| Error::InvalidField {
        field: field.to_string(),
        expected: "an RFC 3339 timestamp",
    })
}

/// Convert an API post into a Post. Title, content, url and both dates are required.
pub fn post_from_remote(remote: BloggerPost) -> Result<Post> {
    let title = required(remote.title, "title")?;
    let html = remote
        .content
        .ok_or_else(|| Error::missing_field("content"))?;
    let canonical_url = required(remote.url, "url")?;
    let published_at = timestamp(remote.published, "published")?;
    let updated_at = timestamp(remote.updated, "updated")?;

    Ok(Post {
        title,
        markdown: html_to_markdown(&html),
        html,
        canonical_url,
        published_at: Some(published_at),
        updated_at: Some(updated_at),
        tags: remote.labels,
        ..Default::default()
    })
}

pub struct Blogger {
    name: String,
    blog_url: String,
    overwrite: bool,
    generate_llm_descriptions: bool,
    api: BloggerApi,
    auth: Arc<dyn Authorizer>,
    retry: RetryPolicy,
}

impl fmt::Debug for Blogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blogger")
            .field("name", &self.name)
            .field("blog_url", &self.blog_url)
            .field("overwrite", &self.overwrite)
            .field("generate_llm_descriptions", &self.generate_llm_descriptions)
            .finish()
    }
}

impl Blogger {
    pub fn new(config: &BloggerConfig, api: BloggerApi, auth: Arc<dyn Authorizer>) -> Self {
        Blogger {
            name: config.name.clone(),
            blog_url: config.blog_url.clone(),
            overwrite: config.overwrite,
            generate_llm_descriptions: config.generate_llm_descriptions,
            api,
            auth,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn blog_id(&self, access_token: &str) -> Result<String> {
        let blog = self.api.blog_by_url(access_token, &self.blog_url).await?;
        debug!(blog_url = %self.blog_url, blog_id = %blog.id, "Resolved blog");
        Ok(blog.id)
    }

    /// Mint an access token and resolve the blog id.
    pub async fn session(&self, credentials: &OAuthCredentials) -> Result<Session> {
        let pair = self
            .auth
            .authorize(
                &credentials.client_id,
                &credentials.client_secret,
                &credentials.refresh_token,
            )
            .await?;
        let blog_id = self.blog_id(&pair.access_token).await?;
        Ok(Session {
            access_token: pair.access_token,
            blog_id,
        })
    }

    async fn describe(&self, post: &Post, options: &TransferOptions) -> Result<String> {
        let llm = options
            .llm
            .as_ref()
            .ok_or(Error::MissingOption("llm_provider"))?;
        summarizer_for(llm)?.summarize(&post.title, &post.markdown).await
    }

    /// One poll: refresh, list, diff, pull and send what is new. `Ok(false)` means stop.
    async fn watch_cycle(
        &self,
        known: &mut KnownPosts,
        options: &TransferOptions,
        posts: &mpsc::Sender<Post>,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let credentials = options.credentials()?;
        let session = with_retry(&self.retry, "authorize", || self.session(credentials)).await?;
        let listing = with_retry(&self.retry, "list posts", || {
            self.api
                .list_live_posts(&session.access_token, &session.blog_id, false)
        })
        .await?;

        let added = match known.observe(listing.iter().map(|p| p.id.as_str())) {
            Cycle::Baseline { seeded } => {
                info!(source = %self.name, seeded, "Recorded existing posts");
                return Ok(true);
            }
            Cycle::Changes { removed, added } => {
                for id in &removed {
                    debug!(source = %self.name, id = %id, "Post no longer listed");
                }
                added
            }
        };

        let cycle_options = TransferOptions {
            access_token: Some(session.access_token.clone()),
            blog_id: Some(session.blog_id.clone()),
            ..options.clone()
        };

        for id in added {
            let url = match listing.iter().find(|p| p.id == id).and_then(|p| p.url.clone()) {
                Some(url) => url,
                None => {
                    let remote = with_retry(&self.retry, "fetch post", || {
                        self.api
                            .post_by_id(&session.access_token, &session.blog_id, &id)
                    })
                    .await?;
                    required(remote.url, "url")?
                }
            };
            info!(source = %self.name, id = %id, url = %url, "New post found");

            let pull_options = TransferOptions {
                post_url: Some(url),
                ..cycle_options.clone()
            };
            let post = with_retry(&self.retry, "pull", || self.pull(&pull_options)).await?;

            tokio::select! {
                _ = cancel.cancelled() => return Ok(false),
                sent = posts.send(post) => {
                    if sent.is_err() {
                        debug!(source = %self.name, "Post receiver closed");
                        return Ok(false);
                    }
                }
            }
        }
        Ok(true)
    }

    /// One cleanup pass against `mirror`. Returns the number of files removed.
    async fn reconcile_cycle(&self, mirror: &Markdown, options: &TransferOptions) -> Result<usize> {
        let credentials = options.credentials()?;
        let session = with_retry(&self.retry, "authorize", || self.session(credentials)).await?;
        let listing = with_retry(&self.retry, "list posts", || {
            self.api
                .list_live_posts(&session.access_token, &session.blog_id, false)
        })
        .await?;

        let expected: HashSet<String> = listing
            .iter()
            .filter_map(|p| p.title.as_deref())
            .filter(|t| !t.is_empty())
            .map(markdown_filename)
            .collect();

        let removed = mirror.prune_unexpected(&expected).await?;
        if removed.is_empty() {
            debug!(source = %self.name, mirror = %mirror.name(), "Mirror is up to date");
        }
        Ok(removed.len())
    }
}

impl Platform for Blogger {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PlatformKind {
        PlatformKind::Blogger
    }
}

#[async_trait]
impl Source for Blogger {
    async fn pull(&self, options: &TransferOptions) -> Result<Post> {
        let token = options.access_token()?;
        let blog_id = options.blog_id()?;
        let url = options
            .post_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or(Error::MissingOption("post_url"))?;
        let path = post_path(url)?;

        let remote = self.api.post_by_path(token, blog_id, &path).await?;
        let mut post = post_from_remote(remote)?;

        if self.generate_llm_descriptions {
            post.description = self.describe(&post, options).await?;
        }

        info!(title = %post.title, source = %self.name, "Pulled post");
        Ok(post)
    }
}

#[async_trait]
impl Destination for Blogger {
    async fn push(&self, post: &Post, options: &TransferOptions) -> Result<()> {
        if post.title.is_empty() {
            return Err(Error::missing_field("title"));
        }
        let token = options.access_token()?;
        let blog_id = options.blog_id()?;

        let existing = self.api.list_live_posts(token, blog_id, false).await?;
        let duplicates: Vec<&BloggerPost> = existing
            .iter()
            .filter(|p| p.title.as_deref() == Some(post.title.as_str()))
            .collect();

        if !duplicates.is_empty() {
            if !self.overwrite {
                return Err(Error::AlreadyExists(format!(
                    "post \"{}\" on {}",
                    post.title, self.name
                )));
            }
            for duplicate in duplicates {
                self.api.delete_post(token, blog_id, &duplicate.id).await?;
                info!(title = %post.title, id = %duplicate.id, "Moved existing post to trash");
            }
        }

        if !post.canonical_url.is_empty() {
            warn!(
                canonical_url = %post.canonical_url,
                "Blogger cannot set a canonical URL; it will not be set"
            );
        }

        let html = if post.html.is_empty() {
            markdown_to_html(&post.markdown)
        } else {
            post.html.clone()
        };
        let created = self
            .api
            .create_post(
                token,
                blog_id,
                &NewBloggerPost {
                    title: &post.title,
                    content: &html,
                    labels: &post.tags,
                },
            )
            .await?;

        info!(
            title = %post.title,
            id = %created.id,
            url = created.url.as_deref().unwrap_or_default(),
            destination = %self.name,
            "Published post"
        );
        Ok(())
    }
}

#[async_trait]
impl WatchableSource for Blogger {
    async fn watch(
        &self,
        interval: Duration,
        options: TransferOptions,
        posts: mpsc::Sender<Post>,
        errors: mpsc::Sender<Error>,
        cancel: CancellationToken,
    ) {
        let mut known = KnownPosts::new();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately; the first poll waits one interval
        ticker.tick().await;

        info!(
            source = %self.name,
            interval_secs = interval.as_secs(),
            "Watching for new posts"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(source = %self.name, "Watch task shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.watch_cycle(&mut known, &options, &posts, &cancel).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => {
                            error!(source = %self.name, error = %e, "Watch cycle failed");
                            let _ = errors.send(e).await;
                            break;
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl MirrorReconciler for Blogger {
    async fn reconcile(
        &self,
        interval: Duration,
        mirror: Arc<Markdown>,
        options: TransferOptions,
        errors: mpsc::Sender<Error>,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        info!(
            source = %self.name,
            mirror = %mirror.name(),
            interval_secs = interval.as_secs(),
            "Cleanup task started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(source = %self.name, mirror = %mirror.name(), "Cleanup task shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.reconcile_cycle(&mirror, &options).await {
                        Ok(0) => {}
                        Ok(removed) => info!(mirror = %mirror.name(), removed, "Cleanup pass completed"),
                        Err(e) => {
                            error!(source = %self.name, error = %e, "Cleanup pass failed");
                            let _ = errors.send(e).await;
                            break;
                        }
                    }
                }
            }
        }
    }
}
