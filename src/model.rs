// ABOUTME: Platform-agnostic post model, per-call transfer options, and Blogger API payloads
// ABOUTME: Tolerant parsing with optional fields; required fields are checked by the adapters

use crate::{Error, Result};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// A single logical post as it moves between platforms.
///
/// `published_at`/`updated_at` of `None` mean "unset" and are never serialized.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Post {
    pub title: String,
    pub html: String,
    pub markdown: String,
    pub canonical_url: String,
    pub published_at: Option<DateTime<FixedOffset>>,
    pub updated_at: Option<DateTime<FixedOffset>>,
    pub description: String,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    /// Set when the file was written by this tool; gates reconciliation deletes.
    pub managed: bool,
}

/// Long-lived OAuth client credentials a watch task needs to mint its own access tokens.
#[derive(Clone, Default, PartialEq)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAi,
    Ollama,
}

impl FromStr for LlmProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(LlmProvider::OpenAi),
            "ollama" => Ok(LlmProvider::Ollama),
            other => Err(Error::Config(format!(
                "unknown LLM provider `{}` (expected \"openai\" or \"ollama\")",
                other
            ))),
        }
    }
}

/// Parameters for the description generator.
#[derive(Clone, PartialEq)]
pub struct LlmOptions {
    pub provider: LlmProvider,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
}

impl fmt::Debug for LlmOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmOptions")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .finish()
    }
}

/// Per-call parameters. Each adapter reads the subset it needs.
#[derive(Debug, Clone, Default)]
pub struct TransferOptions {
    /// Remote post to pull (Blogger).
    pub post_url: Option<String>,
    /// Local file to pull (Markdown).
    pub file_path: Option<PathBuf>,
    pub access_token: Option<String>,
    pub blog_id: Option<String>,
    /// Needed by watch and cleanup cycles to refresh their own access token.
    pub credentials: Option<OAuthCredentials>,
    pub llm: Option<LlmOptions>,
}

impl TransferOptions {
    pub fn access_token(&self) -> Result<&str> {
        self.access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(Error::MissingOption("access_token"))
    }

    pub fn blog_id(&self) -> Result<&str> {
        self.blog_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(Error::MissingOption("blog_id"))
    }

    pub fn credentials(&self) -> Result<&OAuthCredentials> {
        self.credentials
            .as_ref()
            .ok_or(Error::MissingOption("credentials"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blog {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// A post as returned by the Blogger v3 API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BloggerPost {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub published: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostList {
    #[serde(default)]
    pub items: Vec<BloggerPost>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Body for creating a post.
#[derive(Debug, Clone, Serialize)]
pub struct NewBloggerPost<'a> {
    pub title: &'a str,
    pub content: &'a str,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    pub labels: &'a [String],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blogger_post_deserialize_minimal() {
        let json = r#"{"id": "123"}"#;
        let post: BloggerPost = serde_json::from_str(json).unwrap();
        assert_eq!(post.id, "123");
        assert!(post.title.is_none());
        assert!(post.labels.is_empty());
    }

    #[test]
    fn test_blogger_post_deserialize_full() {
        let json = r#"{
            "kind": "blogger#post",
            "id": "7706273476706534553",
            "title": "Hello",
            "content": "<p>Hi</p>",
            "url": "https://x.example/2024/01/hello.html",
            "published": "2024-01-05T09:37:00-07:00",
            "updated": "2024-01-06T10:00:00-07:00",
            "labels": ["rust", "sync"]
        }"#;
        let post: BloggerPost = serde_json::from_str(json).unwrap();
        assert_eq!(post.title.as_deref(), Some("Hello"));
        assert_eq!(post.labels, vec!["rust", "sync"]);
    }

    #[test]
    fn test_post_list_without_items() {
        // Blogger omits `items` entirely for an empty blog
        let list: PostList = serde_json::from_str(r#"{"kind": "blogger#postList"}"#).unwrap();
        assert!(list.items.is_empty());
        assert!(list.next_page_token.is_none());

        let list: PostList =
            serde_json::from_str(r#"{"items": [{"id": "1"}], "nextPageToken": "abc"}"#).unwrap();
        assert_eq!(list.items.len(), 1);
        assert_eq!(list.next_page_token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_new_post_skips_empty_labels() {
        let body = NewBloggerPost {
            title: "T",
            content: "<p>c</p>",
            labels: &[],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("labels").is_none());
    }

    #[test]
    fn test_llm_provider_parse() {
        assert_eq!("OpenAI".parse::<LlmProvider>().unwrap(), LlmProvider::OpenAi);
        assert_eq!("ollama".parse::<LlmProvider>().unwrap(), LlmProvider::Ollama);
        assert!(matches!(
            "claude".parse::<LlmProvider>(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_transfer_options_accessors() {
        let options = TransferOptions {
            access_token: Some(String::new()),
            blog_id: Some("42".into()),
            ..Default::default()
        };
        assert!(matches!(
            options.access_token(),
            Err(Error::MissingOption("access_token"))
        ));
        assert_eq!(options.blog_id().unwrap(), "42");
        assert!(options.credentials().is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_secrets() {
        let creds = OAuthCredentials {
            client_id: "id".into(),
            client_secret: "shh".into(),
            refresh_token: "rt".into(),
        };
        let printed = format!("{:?}", creds);
        assert!(!printed.contains("shh"));
        assert!(!printed.contains("\"rt\""));
    }
}
