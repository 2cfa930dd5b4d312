// ABOUTME: Async HTTP client for the Blogger v3 API
// ABOUTME: Bearer auth on every call, fail-fast errors for non-success statuses

use crate::model::{Blog, BloggerPost, NewBloggerPost, PostList};
use crate::{Error, Result};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, trace};

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/blogger/v3";
const PAGE_SIZE: &str = "100";

pub(crate) fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.len() <= max_chars {
        return s.to_string();
    }

    // Find a valid UTF-8 boundary at or before max_chars
    let mut boundary = max_chars;
    while boundary > 0 && !s.is_char_boundary(boundary) {
        boundary -= 1;
    }

    if boundary == 0 {
        return String::new();
    }

    format!("{}...", &s[..boundary])
}

#[derive(Debug, Clone)]
pub struct BloggerApi {
    client: Client,
    base_url: String,
}

impl BloggerApi {
    pub fn new(base_url: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("crossblog/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(BloggerApi {
            client,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.into())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: reqwest::Method, endpoint: &str, token: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, endpoint);
        self.client
            .request(method, url)
            .bearer_auth(token)
            .header("Accept", "application/json")
    }

    async fn check(endpoint: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(Error::Api {
            endpoint: endpoint.into(),
            status: status.as_u16(),
            message: truncate_str(&message, 100),
        })
    }

    async fn send<T: DeserializeOwned>(&self, endpoint: &str, request: RequestBuilder) -> Result<T> {
        let response = Self::check(endpoint, request.send().await?).await?;

        // Get response text for better error messages
        let body = response.text().await?;
        trace!(endpoint, body = %truncate_str(&body, 500), "Blogger response");
        serde_json::from_str(&body).map_err(|e| {
            debug!(endpoint, error = %e, body = %truncate_str(&body, 500), "Failed to parse response");
            Error::Parse(e)
        })
    }

    /// Resolve a blog's id from its public URL.
    pub async fn blog_by_url(&self, token: &str, blog_url: &str) -> Result<Blog> {
        let endpoint = "/blogs/byurl";
        let request = self
            .request(reqwest::Method::GET, endpoint, token)
            .query(&[("url", blog_url)]);
        self.send(endpoint, request).await
    }

    /// Fetch a post by its path, e.g. `/2024/01/hello.html`.
    pub async fn post_by_path(&self, token: &str, blog_id: &str, path: &str) -> Result<BloggerPost> {
        let endpoint = format!("/blogs/{}/posts/bypath", blog_id);
        let request = self
            .request(reqwest::Method::GET, &endpoint, token)
            .query(&[("path", path)]);
        self.send(&endpoint, request).await
    }

    pub async fn post_by_id(&self, token: &str, blog_id: &str, post_id: &str) -> Result<BloggerPost> {
        let endpoint = format!("/blogs/{}/posts/{}", blog_id, post_id);
        let request = self.request(reqwest::Method::GET, &endpoint, token);
        self.send(&endpoint, request).await
    }

    /// Every live (published) post, following pagination to the end.
    pub async fn list_live_posts(
        &self,
        token: &str,
        blog_id: &str,
        fetch_bodies: bool,
    ) -> Result<Vec<BloggerPost>> {
        let endpoint = format!("/blogs/{}/posts", blog_id);
        let fetch_bodies = if fetch_bodies { "true" } else { "false" };
        let mut posts = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .request(reqwest::Method::GET, &endpoint, token)
                .query(&[
                    ("status", "LIVE"),
                    ("fetchBodies", fetch_bodies),
                    ("maxResults", PAGE_SIZE),
                ]);
            if let Some(page) = &page_token {
                request = request.query(&[("pageToken", page.as_str())]);
            }

            let page: PostList = self.send(&endpoint, request).await?;
            posts.extend(page.items);
            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        debug!(blog_id, count = posts.len(), "Listed live posts");
        Ok(posts)
    }

    pub async fn create_post(
        &self,
        token: &str,
        blog_id: &str,
        post: &NewBloggerPost<'_>,
    ) -> Result<BloggerPost> {
        let endpoint = format!("/blogs/{}/posts", blog_id);
        let request = self
            .request(reqwest::Method::POST, &endpoint, token)
            .json(post);
        self.send(&endpoint, request).await
    }

    /// Move a post to the trash rather than deleting it outright.
    pub async fn delete_post(&self, token: &str, blog_id: &str, post_id: &str) -> Result<()> {
        let endpoint = format!("/blogs/{}/posts/{}", blog_id, post_id);
        let request = self
            .request(reqwest::Method::DELETE, &endpoint, token)
            .query(&[("useTrash", "true")]);
        Self::check(&endpoint, request.send().await?).await?;
        Ok(())
    }
}
