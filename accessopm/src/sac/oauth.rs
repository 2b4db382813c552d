use crate::sac::SacError;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use url::Url;

// a token this close to expiry is already considered stale
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

// used when the token endpoint doesn't say
const DEFAULT_EXPIRES_IN: u64 = 3600;

#[derive(Clone, Debug)]
pub struct SacSettings {
    pub api_url: Url,
    pub token_url: Url,
    pub client_id: String,
    pub client_secret: SecretString,
}

impl SacSettings {

    /*
     * The token endpoint defaults to {api}/v1/oauth/token.
     */
    pub fn new(api_url: &str, token_url: Option<&str>, client_id: &str, client_secret: SecretString) -> Result<Self, SacError> {
	let api = api_url.trim_end_matches('/');
	let token_url = match token_url {
	    Some(url) => Url::parse(url)?,
	    None => Url::parse(&format!("{}/v1/oauth/token", api))?,
	};

	Ok(SacSettings{
	    api_url: Url::parse(api)?,
	    token_url,
	    client_id: client_id.to_string(),
	    client_secret,
	})
    }

    pub fn endpoint(&self, path: &str) -> Result<Url, SacError> {
	Ok(Url::parse(&format!("{}{}", self.api_url.as_str().trim_end_matches('/'), path))?)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/*
 * Client-credentials grant with a cached access token. Concurrent callers
 * wait on the same refresh.
 */
pub struct TokenSource {
    http: reqwest::Client,
    token_url: Url,
    client_id: String,
    client_secret: SecretString,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenSource {

    pub fn new(http: reqwest::Client, settings: &SacSettings) -> Self {
	TokenSource{
	    http,
	    token_url: settings.token_url.clone(),
	    client_id: settings.client_id.clone(),
	    client_secret: settings.client_secret.clone(),
	    cached: Mutex::new(None),
	}
    }

    pub async fn token(&self) -> Result<String, SacError> {
	let mut cached = self.cached.lock().await;

	if let Some(token) = cached.as_ref() {
	    if Instant::now() < token.refresh_at {
		return Ok(token.value.clone());
	    }
	}

	log::debug!("requesting a new access token from {}", self.token_url);

	let response = self.http.post(self.token_url.clone())
	    .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
	    .form(&[("grant_type", "client_credentials")])
	    .send()
	    .await?;

	let status = response.status();
	let body = response.bytes().await?;
	if !status.is_success() {
	    return Err(SacError::Token(format!("token endpoint answered {}: {}", status.as_u16(), String::from_utf8_lossy(&body))));
	}

	let granted: TokenResponse = serde_json::from_slice(&body)?;
	let lifetime = Duration::from_secs(granted.expires_in.unwrap_or(DEFAULT_EXPIRES_IN));

	*cached = Some(CachedToken{
	    value: granted.access_token.clone(),
	    refresh_at: Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN),
	});

	Ok(granted.access_token)
    }

    /* the next call to token() fetches a fresh one */
    pub async fn invalidate(&self) {
	*self.cached.lock().await = None;
    }
}
