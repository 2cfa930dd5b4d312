// ABOUTME: OAuth credential manager: refresh-token exchange and first-time consent
// ABOUTME: Stateless per call; a caller-supplied refresh token is always echoed back unchanged

use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const BLOGGER_SCOPE: &str = "https://www.googleapis.com/auth/blogger";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080/callback";

#[derive(Clone, PartialEq, Eq)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Mints access tokens. An empty `refresh_token` starts the consent flow first.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<CredentialPair>;
}

/// The interactive, one-time step that yields a long-lived refresh token.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConsentFlow: Send + Sync {
    async fn obtain_refresh_token(&self, client_id: &str, client_secret: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

async fn request_token(
    http: &Client,
    token_url: &str,
    form: &[(&str, &str)],
) -> Result<TokenResponse> {
    let response = http.post(token_url).form(form).send().await?;

    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(Error::Api {
            endpoint: token_url.into(),
            status: status.as_u16(),
            message: crate::api::truncate_str(&message, 100),
        });
    }

    let body = response.text().await?;
    Ok(serde_json::from_str(&body)?)
}

fn http_client() -> Result<Client> {
    Ok(Client::builder().timeout(Duration::from_secs(30)).build()?)
}

pub struct OAuthClient {
    http: Client,
    token_url: String,
    consent: Arc<dyn ConsentFlow>,
}

impl OAuthClient {
    pub fn new(token_url: Option<String>, consent: Arc<dyn ConsentFlow>) -> Result<Self> {
        Ok(OAuthClient {
            http: http_client()?,
            token_url: token_url.unwrap_or_else(|| GOOGLE_TOKEN_URL.into()),
            consent,
        })
    }

    async fn exchange_refresh_token(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<String> {
        let response = request_token(
            &self.http,
            &self.token_url,
            &[
                ("grant_type", "refresh_token"),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("refresh_token", refresh_token),
            ],
        )
        .await?;

        if response.refresh_token.is_some() {
            debug!("Provider issued a new refresh token; keeping the one supplied");
        }
        response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Auth("token endpoint returned no access token".into()))
    }
}

#[async_trait]
impl Authorizer for OAuthClient {
    async fn authorize(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<CredentialPair> {
        if client_id.is_empty() || client_secret.is_empty() {
            return Err(Error::Auth("client id and client secret are required".into()));
        }

        let refresh_token = if refresh_token.is_empty() {
            info!("No refresh token provided, starting OAuth consent flow");
            self.consent
                .obtain_refresh_token(client_id, client_secret)
                .await?
        } else {
            debug!("Using provided refresh token");
            refresh_token.to_string()
        };

        let access_token = self
            .exchange_refresh_token(client_id, client_secret, &refresh_token)
            .await?;

        Ok(CredentialPair {
            access_token,
            refresh_token,
        })
    }
}

/// Consent by copy-paste: open the Google consent page, read the code back from stdin.
pub struct BrowserConsent {
    http: Client,
    auth_url: String,
    token_url: String,
    redirect_uri: String,
}

impl BrowserConsent {
    pub fn new(token_url: Option<String>, redirect_uri: Option<String>) -> Result<Self> {
        Ok(BrowserConsent {
            http: http_client()?,
            auth_url: GOOGLE_AUTH_URL.into(),
            token_url: token_url.unwrap_or_else(|| GOOGLE_TOKEN_URL.into()),
            redirect_uri: redirect_uri.unwrap_or_else(|| DEFAULT_REDIRECT_URI.into()),
        })
    }

    pub fn consent_url(&self, client_id: &str) -> Result<Url> {
        Url::parse_with_params(
            &self.auth_url,
            &[
                ("client_id", client_id),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", BLOGGER_SCOPE),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| Error::Config(format!("invalid OAuth URL: {}", e)))
    }
}

/// Accept either the bare authorization code or the full redirected URL.
fn extract_code(pasted: &str) -> Option<String> {
    let pasted = pasted.trim();
    if pasted.is_empty() {
        return None;
    }
    match Url::parse(pasted) {
        Ok(url) => url
            .query_pairs()
            .find(|(k, _)| k == "code")
            .map(|(_, v)| v.into_owned()),
        Err(_) => Some(pasted.to_string()),
    }
}

#[async_trait]
impl ConsentFlow for BrowserConsent {
    async fn obtain_refresh_token(&self, client_id: &str, client_secret: &str) -> Result<String> {
        let url = self.consent_url(client_id)?;

        println!("Open this link to authorize access to Blogger:\n\n{}\n", url);
        if let Err(e) = open::that(url.as_str()) {
            warn!(error = %e, "Could not open a browser; use the link above");
        }
        println!("Paste the authorization code (or the full redirected URL) below:");

        let line = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await
        .map_err(|e| Error::Auth(format!("consent prompt failed: {}", e)))??;

        let code = extract_code(&line)
            .ok_or_else(|| Error::Auth("no authorization code entered".into()))?;

        let response = request_token(
            &self.http,
            &self.token_url,
            &[
                ("grant_type", "authorization_code"),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("code", code.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
            ],
        )
        .await?;

        response.refresh_token.filter(|t| !t.is_empty()).ok_or_else(|| {
            Error::Auth(
                "consent did not return a refresh token; revoke the app's access and retry".into(),
            )
        })
    }
}
