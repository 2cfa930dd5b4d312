// ABOUTME: End-to-end tests: publish from a mocked Blogger into a Markdown mirror, then watch it
// ABOUTME: Adapters are built through the loader exactly as the binary builds them

use async_trait::async_trait;
use crossblog::api::BloggerApi;
use crossblog::auth::{ConsentFlow, OAuthClient};
use crossblog::config::{Config, MarkdownConfig};
use crossblog::model::OAuthCredentials;
use crossblog::platforms::{load, DestinationAdapter, Markdown, Services, SourceAdapter};
use crossblog::publish::publish;
use crossblog::watch::{spawn_watch, RetryPolicy, WatchSettings};
use crossblog::{Error, Result, TransferOptions};
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BLOG_URL: &str = "https://x.example";
const HELLO_URL: &str = "https://x.example/2024/01/hello.html";

struct NoConsent;

#[async_trait]
impl ConsentFlow for NoConsent {
    async fn obtain_refresh_token(&self, _client_id: &str, _client_secret: &str) -> Result<String> {
        Err(Error::Auth("consent is not available in tests".into()))
    }
}

fn config(mirror: &Path, overwrite: bool) -> Config {
    let yaml = format!(
        r#"
sources:
  - name: blog-a
    type: blogger
    blog_url: "{BLOG_URL}"
destinations:
  - name: mirror
    type: markdown
    content_dir: {dir:?}
    overwrite: {overwrite}
"#,
        dir = mirror.display().to_string(),
    );
    Config::from_yaml(&yaml).unwrap()
}

fn services(server: &MockServer) -> Services {
    Services {
        api: BloggerApi::new(Some(server.uri())).unwrap(),
        authorizer: Arc::new(
            OAuthClient::new(Some(format!("{}/token", server.uri())), Arc::new(NoConsent)).unwrap(),
        ),
        retry: RetryPolicy::immediate(1),
    }
}

fn base_options() -> TransferOptions {
    TransferOptions {
        credentials: Some(OAuthCredentials {
            client_id: "id".into(),
            client_secret: "secret".into(),
            refresh_token: "rt".into(),
        }),
        ..Default::default()
    }
}

fn load_one(
    config: &Config,
    services: &Services,
) -> (SourceAdapter, Vec<DestinationAdapter>) {
    let (sources, destinations) = load(
        config,
        services,
        &["blog-a".to_string()],
        &["mirror".to_string()],
    )
    .unwrap();
    (sources.into_iter().next().unwrap(), destinations)
}

fn remote_post(id: &str, title: &str, slug: &str) -> serde_json::Value {
    json!({
        "id": id,
        "title": title,
        "content": format!("<p>{} body</p>", title),
        "url": format!("{}/2024/01/{}.html", BLOG_URL, slug),
        "published": "2024-01-05T09:37:00-07:00",
        "updated": "2024-01-06T10:00:00-07:00",
        "labels": ["rust"]
    })
}

/// Token endpoint and blog lookup, shared by every scenario.
async fn mount_session(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access"
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/blogs/byurl"))
        .and(query_param("url", BLOG_URL))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "42" })))
        .mount(server)
        .await;
}

async fn mount_post(server: &MockServer, id: &str, title: &str, slug: &str) {
    Mock::given(method("GET"))
        .and(path("/blogs/42/posts/bypath"))
        .and(query_param("path", format!("/2024/01/{}.html", slug)))
        .respond_with(ResponseTemplate::new(200).set_body_json(remote_post(id, title, slug)))
        .mount(server)
        .await;
}

fn read_mirrored(dir: &Path, file: &str) -> crossblog::Post {
    let reader = Markdown::new(&MarkdownConfig {
        name: "reader".into(),
        content_dir: Some(dir.to_path_buf()),
        git_dir: None,
        overwrite: false,
        frontmatter_mapping: Default::default(),
    });
    let text = fs::read_to_string(dir.join(file)).unwrap();
    reader.parse_document(&text).unwrap()
}

async fn wait_for(file: &Path) -> bool {
    for _ in 0..100 {
        if file.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn test_publish_blogger_post_into_mirror() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    mount_post(&server, "1", "Hello", "hello").await;
    let mirror = TempDir::new().unwrap();

    let services = services(&server);
    let (source, destinations) = load_one(&config(mirror.path(), false), &services);

    let post = publish(&source, HELLO_URL, &destinations, &base_options(), false)
        .await
        .unwrap();
    assert_eq!(post.title, "Hello");

    let mirrored = read_mirrored(mirror.path(), "hello.md");
    assert_eq!(mirrored.title, "Hello");
    assert_eq!(mirrored.canonical_url, HELLO_URL);
    assert_eq!(mirrored.tags, vec!["rust"]);
    assert!(mirrored.managed);
    assert_eq!(mirrored.markdown.trim(), "Hello body");

    // a second run without overwrite refuses to clobber the file
    let err = publish(&source, HELLO_URL, &destinations, &base_options(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(_)));
}

#[tokio::test]
async fn test_publish_with_overwrite_replaces_file() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    mount_post(&server, "1", "Hello", "hello").await;
    let mirror = TempDir::new().unwrap();
    fs::write(mirror.path().join("hello.md"), "---\ntitle: Hello\n---\n\nstale").unwrap();

    let services = services(&server);
    let (source, destinations) = load_one(&config(mirror.path(), true), &services);
    publish(&source, HELLO_URL, &destinations, &base_options(), false)
        .await
        .unwrap();

    let mirrored = read_mirrored(mirror.path(), "hello.md");
    assert_eq!(mirrored.markdown.trim(), "Hello body");
    assert_eq!(mirrored.canonical_url, HELLO_URL);
}

#[tokio::test]
async fn test_watch_mirrors_only_new_posts() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    // the first listing is the baseline; later listings add a post
    Mock::given(method("GET"))
        .and(path("/blogs/42/posts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [remote_post("1", "Hello", "hello")]
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/blogs/42/posts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                remote_post("2", "Second Post", "second-post"),
                remote_post("1", "Hello", "hello")
            ]
        })))
        .mount(&server)
        .await;
    mount_post(&server, "1", "Hello", "hello").await;
    mount_post(&server, "2", "Second Post", "second-post").await;
    let mirror = TempDir::new().unwrap();

    let services = services(&server);
    let (source, destinations) = load_one(&config(mirror.path(), false), &services);
    let settings = WatchSettings {
        interval: Duration::from_millis(50),
        cleanup_interval: Duration::from_secs(3600),
        retry: RetryPolicy::immediate(1),
    };
    let handle = spawn_watch(&source, destinations, base_options(), &settings).unwrap();

    assert!(wait_for(&mirror.path().join("second-post.md")).await);
    handle.shutdown().await.unwrap();

    assert!(!mirror.path().join("hello.md").exists());
    assert_eq!(read_mirrored(mirror.path(), "second-post.md").title, "Second Post");
}

#[tokio::test]
async fn test_cleanup_prunes_managed_files_only() {
    let server = MockServer::start().await;
    mount_session(&server).await;
    Mock::given(method("GET"))
        .and(path("/blogs/42/posts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [remote_post("1", "Hello", "hello")]
        })))
        .mount(&server)
        .await;
    let mirror = TempDir::new().unwrap();
    let gone = mirror.path().join("gone.md");
    fs::write(mirror.path().join("hello.md"), "---\ntitle: Hello\nmanaged: true\n---\n\nx").unwrap();
    fs::write(&gone, "---\ntitle: Gone\nmanaged: true\n---\n\nx").unwrap();
    fs::write(mirror.path().join("mine.md"), "---\ntitle: Mine\n---\n\nx").unwrap();

    let services = services(&server);
    let (source, destinations) = load_one(&config(mirror.path(), false), &services);
    let settings = WatchSettings {
        interval: Duration::from_secs(3600),
        cleanup_interval: Duration::from_millis(50),
        retry: RetryPolicy::immediate(1),
    };
    let handle = spawn_watch(&source, destinations, base_options(), &settings).unwrap();

    let mut pruned = false;
    for _ in 0..100 {
        if !gone.exists() {
            pruned = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    handle.shutdown().await.unwrap();

    assert!(pruned);
    assert!(mirror.path().join("hello.md").exists());
    assert!(mirror.path().join("mine.md").exists());
}

#[tokio::test]
async fn test_watch_stops_on_revoked_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })),
        )
        .mount(&server)
        .await;
    let mirror = TempDir::new().unwrap();

    let services = services(&server);
    let (source, destinations) = load_one(&config(mirror.path(), false), &services);
    let settings = WatchSettings {
        interval: Duration::from_millis(50),
        cleanup_interval: Duration::from_secs(3600),
        retry: RetryPolicy::immediate(1),
    };
    let handle = spawn_watch(&source, destinations, base_options(), &settings).unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("watch should stop on its own");
    assert!(matches!(outcome, Err(Error::Api { status: 400, .. })));
}
