// ABOUTME: Markdown-with-frontmatter directory adapter, optionally backed by a git repository
// ABOUTME: Files are named <slug(title)>.md and marked managed so cleanup only touches its own files

use super::{Destination, Platform, PlatformKind, Source};
use crate::config::MarkdownConfig;
use crate::convert::{html_to_markdown, markdown_to_html};
use crate::frontmatter::{from_metadata_block, render_document, split_document, FrontmatterMapping};
use crate::git::Repo;
use crate::model::{Post, TransferOptions};
use crate::storage::{write_atomic, CONTENT_MODE};
use crate::util::markdown_filename;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct Markdown {
    name: String,
    content_dir: Option<PathBuf>,
    git_dir: Option<PathBuf>,
    mapping: FrontmatterMapping,
    overwrite: bool,
}

impl Markdown {
    pub fn new(config: &MarkdownConfig) -> Self {
        Markdown {
            name: config.name.clone(),
            content_dir: config.content_dir.clone(),
            git_dir: config.git_dir.clone(),
            mapping: config.frontmatter_mapping.clone(),
            overwrite: config.overwrite,
        }
    }

    pub fn content_dir(&self) -> Result<&Path> {
        self.content_dir
            .as_deref()
            .ok_or(Error::MissingOption("content_dir"))
    }

    fn repo(&self) -> Result<Option<Repo>> {
        match &self.git_dir {
            Some(git_dir) => Ok(Some(Repo::open(git_dir, self.content_dir()?)?)),
            None => Ok(None),
        }
    }

    /// Parse a whole file: frontmatter through the mapping, body kept as Markdown.
    pub fn parse_document(&self, text: &str) -> Result<Post> {
        let (block, body) = split_document(text)?;
        let mut post = from_metadata_block(&block, &self.mapping)?;
        if post.title.is_empty() {
            return Err(Error::missing_field("title"));
        }
        post.markdown = body.to_string();
        post.html = markdown_to_html(body);
        Ok(post)
    }

    /// Render the file this adapter would write for `post`.
    pub fn render(&self, post: &Post) -> Result<String> {
        let mut post = post.clone();
        post.managed = true;
        if post.markdown.is_empty() && !post.html.is_empty() {
            post.markdown = html_to_markdown(&post.html);
        }
        render_document(&post, &self.mapping)
    }

    /// `file_path` relative to the content directory first, then as given.
    fn resolve(&self, file_path: &Path) -> PathBuf {
        if let Some(dir) = &self.content_dir {
            let candidate = dir.join(file_path);
            if candidate.is_file() {
                return candidate;
            }
        }
        file_path.to_path_buf()
    }

    /// Delete managed files whose names are not in `expected`. Returns the removed paths.
    ///
    /// Files without the managed marker, or whose frontmatter cannot be parsed, are kept.
    pub async fn prune_unexpected(&self, expected: &HashSet<String>) -> Result<Vec<PathBuf>> {
        let dir = self.content_dir()?;
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "Content directory does not exist yet");
            return Ok(Vec::new());
        }
        let repo = self.repo()?;
        let mut removed = Vec::new();

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if expected.contains(&file_name) {
                continue;
            }

            let path = entry.path();
            let text = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    debug!(file = %path.display(), error = %e, "Skipping unreadable file");
                    continue;
                }
            };
            let post = match self.parse_document(&text) {
                Ok(post) => post,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Skipping file with unparseable frontmatter");
                    continue;
                }
            };
            if !post.managed {
                continue;
            }

            fs::remove_file(&path)?;
            info!(file = %path.display(), title = %post.title, "Removed post no longer on the source");
            if let Some(repo) = &repo {
                repo.record_change(&path, &format!("Remove {}", file_name))
                    .await?;
            }
            removed.push(path);
        }

        Ok(removed)
    }
}

impl Platform for Markdown {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PlatformKind {
        PlatformKind::Markdown
    }
}

#[async_trait]
impl Source for Markdown {
    async fn pull(&self, options: &TransferOptions) -> Result<Post> {
        let file_path = options
            .file_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(Error::MissingOption("file_path"))?;
        let path = self.resolve(file_path);
        debug!(file = %path.display(), "Reading post");

        let text = fs::read_to_string(&path)?;
        let post = self.parse_document(&text)?;
        if post.canonical_url.is_empty() {
            debug!(file = %path.display(), "No canonical URL in frontmatter");
        }
        info!(title = %post.title, source = %self.name, "Pulled post");
        Ok(post)
    }
}

#[async_trait]
impl Destination for Markdown {
    async fn push(&self, post: &Post, _options: &TransferOptions) -> Result<()> {
        if post.title.is_empty() {
            return Err(Error::missing_field("title"));
        }
        let file_name = markdown_filename(&post.title);
        if file_name.len() <= crate::util::MARKDOWN_EXTENSION.len() + 1 {
            return Err(Error::InvalidField {
                field: "title".into(),
                expected: "a title with at least one letter or digit",
            });
        }

        let dir = self.content_dir()?;
        let repo = self.repo()?;
        let path = dir.join(&file_name);

        if path.exists() {
            if !self.overwrite {
                return Err(Error::already_exists_path(&path));
            }
            info!(file = %path.display(), "Replacing existing post");
        }

        let document = self.render(post)?;
        write_atomic(&path, document.as_bytes(), CONTENT_MODE)?;
        info!(file = %path.display(), destination = %self.name, "Wrote post");

        if let Some(repo) = repo {
            repo.record_change(&path, &format!("Update {}", file_name))
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use tempfile::TempDir;

    fn adapter(dir: &Path, overwrite: bool) -> Markdown {
        Markdown::new(&MarkdownConfig {
            name: "mirror".into(),
            content_dir: Some(dir.to_path_buf()),
            git_dir: None,
            overwrite,
            frontmatter_mapping: FrontmatterMapping::default(),
        })
    }

    fn sample() -> Post {
        Post {
            title: "Hello".into(),
            html: "<p>Hi <em>there</em></p>".into(),
            markdown: "Hi *there*".into(),
            canonical_url: "https://x.example/2024/01/hello.html".into(),
            published_at: DateTime::parse_from_rfc3339("2024-01-05T09:37:00-07:00").ok(),
            tags: vec!["rust".into()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_push_writes_managed_file() {
        let temp = TempDir::new().unwrap();
        let md = adapter(temp.path(), false);
        md.push(&sample(), &TransferOptions::default()).await.unwrap();

        let text = fs::read_to_string(temp.path().join("hello.md")).unwrap();
        assert!(text.starts_with("---\n"));
        assert!(text.contains("title: Hello\n"));
        assert!(text.contains("managed: true\n"));
        assert!(text.ends_with("---\n\nHi *there*"));
    }

    #[tokio::test]
    async fn test_push_without_overwrite_fails_on_existing() {
        let temp = TempDir::new().unwrap();
        let md = adapter(temp.path(), false);
        md.push(&sample(), &TransferOptions::default()).await.unwrap();

        let mut changed = sample();
        changed.markdown = "Changed".into();
        let err = md.push(&changed, &TransferOptions::default()).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));

        let text = fs::read_to_string(temp.path().join("hello.md")).unwrap();
        assert!(text.ends_with("Hi *there*"));
    }

    #[tokio::test]
    async fn test_push_with_overwrite_replaces() {
        let temp = TempDir::new().unwrap();
        let md = adapter(temp.path(), true);
        md.push(&sample(), &TransferOptions::default()).await.unwrap();

        let mut changed = sample();
        changed.markdown = "Changed".into();
        md.push(&changed, &TransferOptions::default()).await.unwrap();

        let text = fs::read_to_string(temp.path().join("hello.md")).unwrap();
        assert!(text.ends_with("\n\nChanged"));
    }

    #[tokio::test]
    async fn test_push_derives_markdown_from_html() {
        let temp = TempDir::new().unwrap();
        let md = adapter(temp.path(), false);
        let post = Post {
            title: "Only Html".into(),
            html: "<p>Plain words</p>".into(),
            ..Default::default()
        };
        md.push(&post, &TransferOptions::default()).await.unwrap();
        let text = fs::read_to_string(temp.path().join("only-html.md")).unwrap();
        assert!(text.ends_with("Plain words"));
    }

    #[tokio::test]
    async fn test_push_rejects_unsluggable_title() {
        let temp = TempDir::new().unwrap();
        let md = adapter(temp.path(), false);
        let post = Post {
            title: "!!!".into(),
            ..Default::default()
        };
        assert!(matches!(
            md.push(&post, &TransferOptions::default()).await,
            Err(Error::InvalidField { .. })
        ));
    }

    #[tokio::test]
    async fn test_pull_round_trips_push() {
        let temp = TempDir::new().unwrap();
        let md = adapter(temp.path(), false);
        md.push(&sample(), &TransferOptions::default()).await.unwrap();

        // relative to the content directory
        let options = TransferOptions {
            file_path: Some(PathBuf::from("hello.md")),
            ..Default::default()
        };
        let pulled = md.pull(&options).await.unwrap();
        let expected = sample();
        assert_eq!(pulled.title, expected.title);
        assert_eq!(pulled.canonical_url, expected.canonical_url);
        assert_eq!(pulled.published_at, expected.published_at);
        assert_eq!(pulled.tags, expected.tags);
        assert_eq!(pulled.markdown, expected.markdown);
        assert!(pulled.html.contains("<em>there</em>"));
        assert!(pulled.managed);
    }

    #[tokio::test]
    async fn test_pull_falls_back_to_given_path() {
        let content = TempDir::new().unwrap();
        let elsewhere = TempDir::new().unwrap();
        let file = elsewhere.path().join("draft.md");
        fs::write(&file, "---\ntitle: Draft\n---\n\nBody").unwrap();

        let md = adapter(content.path(), false);
        let options = TransferOptions {
            file_path: Some(file),
            ..Default::default()
        };
        let post = md.pull(&options).await.unwrap();
        assert_eq!(post.title, "Draft");
        assert_eq!(post.markdown, "Body");
    }

    #[tokio::test]
    async fn test_pull_errors() {
        let temp = TempDir::new().unwrap();
        let md = adapter(temp.path(), false);

        assert!(matches!(
            md.pull(&TransferOptions::default()).await,
            Err(Error::MissingOption("file_path"))
        ));

        let missing = TransferOptions {
            file_path: Some(PathBuf::from("nope.md")),
            ..Default::default()
        };
        assert!(matches!(md.pull(&missing).await, Err(Error::Filesystem(_))));

        fs::write(temp.path().join("untitled.md"), "---\ndescription: x\n---\n\nBody").unwrap();
        let untitled = TransferOptions {
            file_path: Some(PathBuf::from("untitled.md")),
            ..Default::default()
        };
        assert!(matches!(
            md.pull(&untitled).await,
            Err(Error::MissingField { .. })
        ));
    }

    #[test]
    fn test_parse_document_uses_custom_mapping() {
        let temp = TempDir::new().unwrap();
        let md = Markdown::new(&MarkdownConfig {
            name: "site".into(),
            content_dir: Some(temp.path().to_path_buf()),
            git_dir: None,
            overwrite: false,
            frontmatter_mapping: FrontmatterMapping {
                canonical_url: "canonical".into(),
                ..Default::default()
            },
        });
        let post = md
            .parse_document("---\ntitle: T\ncanonical: https://a.example/t\n---\n\n# Heading\n")
            .unwrap();
        assert_eq!(post.canonical_url, "https://a.example/t");
        assert_eq!(post.html, "<h1>Heading</h1>\n");
    }

    #[tokio::test]
    async fn test_prune_only_removes_unexpected_managed_files() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        fs::write(dir.join("kept.md"), "---\ntitle: Kept\nmanaged: true\n---\n\nx").unwrap();
        fs::write(dir.join("gone.md"), "---\ntitle: Gone\nmanaged: true\n---\n\nx").unwrap();
        fs::write(dir.join("handwritten.md"), "---\ntitle: Mine\n---\n\nx").unwrap();
        fs::write(dir.join("broken.md"), "---\ntitle: [unclosed\n---\n\nx").unwrap();
        fs::write(dir.join("notes.txt"), "no frontmatter here").unwrap();
        fs::create_dir(dir.join("images")).unwrap();

        let md = adapter(dir, false);
        let expected: HashSet<String> = ["kept.md".to_string()].into_iter().collect();
        let removed = md.prune_unexpected(&expected).await.unwrap();

        assert_eq!(removed, vec![dir.join("gone.md")]);
        assert!(dir.join("kept.md").exists());
        assert!(dir.join("handwritten.md").exists());
        assert!(dir.join("broken.md").exists());
        assert!(dir.join("notes.txt").exists());
        assert!(dir.join("images").is_dir());
    }

    #[tokio::test]
    async fn test_prune_missing_directory_is_noop() {
        let temp = TempDir::new().unwrap();
        let md = adapter(&temp.path().join("not-yet"), false);
        assert!(md
            .prune_unexpected(&HashSet::new())
            .await
            .unwrap()
            .is_empty());
    }

    fn git(dir: &Path, args: &[&str]) -> Option<String> {
        let output = std::process::Command::new("git")
            .current_dir(dir)
            .args(args)
            .output()
            .ok()?;
        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// A git repository with a `posts/` mirror, or `None` when git is unavailable.
    fn git_mirror(root: &Path, overwrite: bool) -> Option<Markdown> {
        git(root, &["init", "-q"])?;
        git(root, &["config", "user.email", "test@example.com"])?;
        git(root, &["config", "user.name", "Test"])?;
        git(root, &["config", "commit.gpgsign", "false"])?;
        Some(Markdown::new(&MarkdownConfig {
            name: "mirror".into(),
            content_dir: Some(root.join("posts")),
            git_dir: Some(root.to_path_buf()),
            overwrite,
            frontmatter_mapping: FrontmatterMapping::default(),
        }))
    }

    #[tokio::test]
    async fn test_overwrite_with_identical_post_in_git_mirror() {
        let temp = TempDir::new().unwrap();
        let Some(md) = git_mirror(temp.path(), true) else {
            return;
        };
        let post = Post {
            title: "Hello".into(),
            markdown: "Hi".into(),
            ..Default::default()
        };

        md.push(&post, &TransferOptions::default()).await.unwrap();
        md.push(&post, &TransferOptions::default()).await.unwrap();

        let log = git(temp.path(), &["log", "--format=%s"]).unwrap();
        assert_eq!(log.lines().collect::<Vec<_>>(), vec!["Update hello.md"]);
    }

    #[tokio::test]
    async fn test_prune_commits_removal_in_git_mirror() {
        let temp = TempDir::new().unwrap();
        let Some(md) = git_mirror(temp.path(), false) else {
            return;
        };
        let post = Post {
            title: "Gone".into(),
            markdown: "x".into(),
            ..Default::default()
        };
        md.push(&post, &TransferOptions::default()).await.unwrap();

        let removed = md.prune_unexpected(&HashSet::new()).await.unwrap();
        assert_eq!(removed.len(), 1);
        let log = git(temp.path(), &["log", "--format=%s"]).unwrap();
        assert_eq!(log.lines().next(), Some("Remove gone.md"));
    }
}
