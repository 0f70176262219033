//! Logging in to Dune the way the web app does. Fragile by nature, everything that knows about
//! cookies, csrf tokens and the session endpoint lives here.

use std::{fmt, sync::Arc};

use anyhow::Context;
use format_url::FormatUrl;
use reqwest::{
    cookie::{CookieStore, Jar},
    header::{HeaderMap, HeaderValue},
    StatusCode, Url,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    env::{obfuscate, ENV_CONFIG},
    performance::TimedExt,
};

use super::DuneError;

pub const BASE_URL: &str = "https://dune.com";

const REFRESH_COOKIE_NAME: &str = "auth-refresh";

#[derive(Clone)]
pub struct DuneCredentials {
    pub username: String,
    pub password: String,
}

impl DuneCredentials {
    pub fn from_env() -> anyhow::Result<Self> {
        let username = ENV_CONFIG
            .dune_user
            .clone()
            .context("DUNE_USER is required in env to log in to dune")?;
        let password = ENV_CONFIG
            .dune_password
            .clone()
            .context("DUNE_PASSWORD is required in env to log in to dune")?;
        Ok(Self { username, password })
    }
}

impl fmt::Debug for DuneCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuneCredentials")
            .field("username", &self.username)
            .field("password", &"****")
            .finish()
    }
}

/// An authenticated session. Owns the HTTP client whose cookie jar the login filled, a new login
/// replaces the whole thing.
#[derive(Clone)]
pub struct Session {
    client: reqwest::Client,
    csrf: String,
    auth_refresh: String,
    token: String,
}

impl Session {
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn csrf(&self) -> &str {
        &self.csrf
    }

    pub fn auth_refresh(&self) -> &str {
        &self.auth_refresh
    }

    /// Bearer token for the GraphQL endpoint.
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("csrf", &obfuscate(&self.csrf))
            .field("auth_refresh", &obfuscate(&self.auth_refresh))
            .field("token", &obfuscate(&self.token))
            .finish()
    }
}

#[derive(Deserialize)]
struct CsrfResponse {
    csrf: String,
}

#[derive(Serialize)]
struct LoginForm<'a> {
    action: &'static str,
    username: &'a str,
    password: &'a str,
    csrf: &'a str,
    next: &'a str,
}

#[derive(Deserialize)]
struct SessionTokenResponse {
    token: String,
}

fn refresh_token_from_cookies(cookies: &str) -> Option<String> {
    cookies
        .split(';')
        .map(str::trim)
        .find_map(|cookie| cookie.strip_prefix(REFRESH_COOKIE_NAME)?.strip_prefix('='))
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

// Dune's auth endpoints reject requests that don't look like they come from the web app.
fn browser_headers(base_url: &str) -> Result<HeaderMap, DuneError> {
    let mut headers = HeaderMap::new();
    let origin = HeaderValue::from_str(base_url)
        .map_err(|err| DuneError::Auth(format!("invalid base url {base_url}: {err}")))?;
    headers.insert("origin", origin);
    headers.insert(
        "sec-ch-ua",
        HeaderValue::from_static(
            r#"" Not A;Brand";v="99", "Chromium";v="90", "Google Chrome";v="90""#,
        ),
    );
    headers.insert("sec-ch-ua-mobile", HeaderValue::from_static("?0"));
    headers.insert("sec-fetch-dest", HeaderValue::from_static("empty"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("cors"));
    headers.insert("sec-fetch-site", HeaderValue::from_static("same-site"));
    headers.insert("dnt", HeaderValue::from_static("1"));
    Ok(headers)
}

pub struct SessionManager {
    base_url: String,
    credentials: DuneCredentials,
}

impl SessionManager {
    pub fn new(credentials: DuneCredentials) -> Self {
        Self::new_with_url(BASE_URL, credentials)
    }

    pub fn new_with_url(base_url: &str, credentials: DuneCredentials) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    fn url(&self, path: &str) -> String {
        FormatUrl::new(&self.base_url)
            .with_path_template(path)
            .format_url()
    }

    /// Runs the full login sequence against a fresh cookie jar. Nothing is retried here, a failed
    /// step fails the login.
    pub async fn login(&self) -> Result<Session, DuneError> {
        info!(username = %self.credentials.username, "logging in to dune");

        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .default_headers(browser_headers(&self.base_url)?)
            .build()?;

        // Visiting the login page sets the cookies the auth endpoints expect.
        client
            .get(self.url("/auth/login"))
            .send()
            .timed("login_page")
            .await?
            .error_for_status()?;

        let csrf = client
            .post(self.url("/api/auth/csrf"))
            .send()
            .timed("csrf")
            .await?
            .error_for_status()?
            .json::<CsrfResponse>()
            .await
            .map_err(|err| DuneError::Auth(format!("no csrf token in response: {err}")))?
            .csrf;
        debug!("got csrf token");

        let form = LoginForm {
            action: "login",
            username: &self.credentials.username,
            password: &self.credentials.password,
            csrf: &csrf,
            next: &self.base_url,
        };
        client
            .post(self.url("/api/auth"))
            .json(&form)
            .send()
            .timed("credentials")
            .await?;

        let cookie_url = Url::parse(&self.base_url)
            .map_err(|err| DuneError::Auth(format!("invalid base url {}: {err}", self.base_url)))?;
        let auth_refresh = jar
            .cookies(&cookie_url)
            .and_then(|cookies| {
                cookies
                    .to_str()
                    .ok()
                    .and_then(refresh_token_from_cookies)
            })
            .ok_or_else(|| {
                DuneError::Auth(format!(
                    "no {REFRESH_COOKIE_NAME} cookie after submitting credentials"
                ))
            })?;
        debug!("got refresh cookie");

        let res = client
            .post(self.url("/api/auth/session"))
            .send()
            .timed("session_token")
            .await?;
        if res.status() != StatusCode::OK {
            return Err(DuneError::Auth(format!(
                "fetching session token failed, status = {}",
                res.status()
            )));
        }
        let token = res
            .json::<SessionTokenResponse>()
            .await
            .map_err(|err| DuneError::Auth(format!("no session token in response: {err}")))?
            .token;

        info!("logged in to dune");

        Ok(Session {
            client,
            csrf,
            auth_refresh,
            token,
        })
    }
}
