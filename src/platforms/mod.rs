// ABOUTME: Platform capability traits and the closed set of adapters built from configuration
// ABOUTME: Capabilities are chosen at construction; no runtime downcasting

pub mod blogger;
pub mod load;
pub mod markdown;

pub use blogger::{Blogger, Cycle, KnownPosts};
pub use load::{load, Services};
pub use markdown::Markdown;

use crate::model::{Post, TransferOptions};
use crate::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformKind {
    Blogger,
    Markdown,
}

impl PlatformKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKind::Blogger => "blogger",
            PlatformKind::Markdown => "markdown",
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait Platform: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> PlatformKind;
}

#[async_trait]
pub trait Source: Platform {
    async fn pull(&self, options: &TransferOptions) -> Result<Post>;
}

#[async_trait]
pub trait Destination: Platform {
    async fn push(&self, post: &Post, options: &TransferOptions) -> Result<()>;
}

/// A source that can be polled for newly published posts.
#[async_trait]
pub trait WatchableSource: Source {
    /// Runs until cancelled or until an error is reported on `errors`.
    async fn watch(
        &self,
        interval: Duration,
        options: TransferOptions,
        posts: mpsc::Sender<Post>,
        errors: mpsc::Sender<Error>,
        cancel: CancellationToken,
    );
}

/// A source that can prune a Markdown mirror of posts it no longer has.
#[async_trait]
pub trait MirrorReconciler: Source {
    async fn reconcile(
        &self,
        interval: Duration,
        mirror: Arc<Markdown>,
        options: TransferOptions,
        errors: mpsc::Sender<Error>,
        cancel: CancellationToken,
    );
}

#[derive(Clone)]
pub enum SourceAdapter {
    Blogger(Arc<Blogger>),
    Markdown(Arc<Markdown>),
}

impl SourceAdapter {
    pub fn as_source(&self) -> &dyn Source {
        match self {
            SourceAdapter::Blogger(b) => b.as_ref(),
            SourceAdapter::Markdown(m) => m.as_ref(),
        }
    }

    pub fn as_watchable(&self) -> Option<Arc<dyn WatchableSource>> {
        match self {
            SourceAdapter::Blogger(b) => Some(b.clone() as Arc<dyn WatchableSource>),
            SourceAdapter::Markdown(_) => None,
        }
    }

    pub fn as_reconciler(&self) -> Option<Arc<dyn MirrorReconciler>> {
        match self {
            SourceAdapter::Blogger(b) => Some(b.clone() as Arc<dyn MirrorReconciler>),
            SourceAdapter::Markdown(_) => None,
        }
    }

    pub fn name(&self) -> &str {
        self.as_source().name()
    }

    pub fn kind(&self) -> PlatformKind {
        self.as_source().kind()
    }

    /// Options for pulling `specifier`: a post URL for Blogger, a file path for Markdown.
    pub async fn prepare(&self, base: &TransferOptions, specifier: &str) -> Result<TransferOptions> {
        match self {
            SourceAdapter::Blogger(blogger) => {
                let session = blogger.session(base.credentials()?).await?;
                Ok(TransferOptions {
                    post_url: Some(specifier.to_string()),
                    access_token: Some(session.access_token),
                    blog_id: Some(session.blog_id),
                    ..base.clone()
                })
            }
            SourceAdapter::Markdown(_) => Ok(TransferOptions {
                file_path: Some(PathBuf::from(specifier)),
                ..base.clone()
            }),
        }
    }
}

impl fmt::Debug for SourceAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceAdapter({} {})", self.kind(), self.name())
    }
}

#[derive(Clone)]
pub enum DestinationAdapter {
    Blogger(Arc<Blogger>),
    Markdown(Arc<Markdown>),
}

impl DestinationAdapter {
    pub fn as_destination(&self) -> &dyn Destination {
        match self {
            DestinationAdapter::Blogger(b) => b.as_ref(),
            DestinationAdapter::Markdown(m) => m.as_ref(),
        }
    }

    pub fn as_markdown(&self) -> Option<Arc<Markdown>> {
        match self {
            DestinationAdapter::Markdown(m) => Some(m.clone()),
            DestinationAdapter::Blogger(_) => None,
        }
    }

    pub fn name(&self) -> &str {
        self.as_destination().name()
    }

    pub fn kind(&self) -> PlatformKind {
        self.as_destination().kind()
    }

    /// Blogger destinations need a fresh access token and their own blog id.
    pub async fn prepare(&self, base: &TransferOptions) -> Result<TransferOptions> {
        match self {
            DestinationAdapter::Blogger(blogger) => {
                let session = blogger.session(base.credentials()?).await?;
                Ok(TransferOptions {
                    access_token: Some(session.access_token),
                    blog_id: Some(session.blog_id),
                    ..base.clone()
                })
            }
            DestinationAdapter::Markdown(_) => Ok(base.clone()),
        }
    }
}

impl fmt::Debug for DestinationAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DestinationAdapter({} {})", self.kind(), self.name())
    }
}
