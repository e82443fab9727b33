//! The base transport the pipeline sends through.

use crate::endpoints::{resolve_url, CSRF_TOKEN, LOGIN, LOGOUT, REFRESH_TOKEN, REGISTER};
use crate::request::summarize_body;
use crate::{HttpError, HttpRequest, HttpResponse, HttpResult};
use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use parking_lot::Mutex;
use reqwest::header::SET_COOKIE;
use reqwest::Client;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

/// Sends one request and returns whatever the backend answered.
///
/// A transport never interprets status codes: any response that arrives is
/// `Ok`. Errors mean nothing usable came back.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> HttpResult<HttpResponse>;

    /// Current value of a cookie held for the backend, if the transport keeps
    /// a cookie jar.
    fn cookie(&self, _name: &str) -> Option<String> {
        None
    }

    /// Drop cached cookies by name.
    fn clear_cookies(&self, _names: &[&str]) {}
}

/// Credentialed reqwest transport: keeps one cookie jar for the backend so
/// the CSRF and session cookies travel with every request.
pub struct ReqwestTransport {
    client: Client,
    base_url: Url,
    jar: Arc<Jar>,
    /// Every cookie path the backend has scoped a cookie to. The jar keys
    /// cookies by path, so clearing has to expire each one.
    cookie_paths: Mutex<BTreeSet<String>>,
}

impl ReqwestTransport {
    /// Create a transport for `base_url` with a per-request timeout.
    pub fn new(base_url: Url, timeout: Duration) -> HttpResult<Self> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(jar.clone())
            .timeout(timeout)
            .build()
            .map_err(|e| HttpError::Request(format!("failed to build HTTP client: {}", e)))?;

        let mut cookie_paths = BTreeSet::new();
        for endpoint in [CSRF_TOKEN, LOGIN, REGISTER, LOGOUT, REFRESH_TOKEN] {
            let url = resolve_url(&base_url, endpoint)?;
            cookie_paths.extend(path_prefixes(url.path()));
        }

        Ok(Self {
            client,
            base_url,
            jar,
            cookie_paths: Mutex::new(cookie_paths),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn record_cookie_paths(&self, url: &Url, headers: &reqwest::header::HeaderMap) {
        let mut paths = self.cookie_paths.lock();
        for value in headers.get_all(SET_COOKIE) {
            if let Ok(value) = value.to_str() {
                paths.insert(set_cookie_path(value, url));
            }
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> HttpResult<HttpResponse> {
        let url = resolve_url(&self.base_url, &request.path)?;
        debug!(method = %request.method, url = %url, "Sending request");

        let mut builder = self
            .client
            .request(request.method.clone(), url.clone())
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(HttpError::from_send_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        self.record_cookie_paths(&url, &headers);
        let body = response
            .text()
            .await
            .map_err(|e| HttpError::Body(e.to_string()))?;

        trace!(status = status.as_u16(), body = %summarize_body(&body), "Received response");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    fn cookie(&self, name: &str) -> Option<String> {
        let header = self.jar.cookies(&self.base_url)?;
        let header = header.to_str().ok()?;
        parse_cookie_header(header, name)
    }

    fn clear_cookies(&self, names: &[&str]) {
        let paths: Vec<String> = self.cookie_paths.lock().iter().cloned().collect();
        for path in &paths {
            let mut url = self.base_url.clone();
            url.set_path(path);
            for name in names {
                self.jar
                    .add_cookie_str(&format!("{}=; Max-Age=0; Path={}", name, path), &url);
            }
        }
        debug!(cookies = ?names, paths = paths.len(), "Cleared cookies");
    }
}

/// `/a/b` yields `/`, `/a`, `/a/`, `/a/b`.
fn path_prefixes(path: &str) -> Vec<String> {
    let mut prefixes = vec!["/".to_string()];
    let mut current = String::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        current.push('/');
        current.push_str(segment);
        prefixes.push(current.clone());
        prefixes.push(format!("{}/", current));
    }
    if !path.ends_with('/') {
        prefixes.pop();
    }
    prefixes
}

/// The path a `Set-Cookie` value is stored under: its `Path` attribute, or
/// the directory of the request path when absent.
fn set_cookie_path(set_cookie: &str, request_url: &Url) -> String {
    let explicit = set_cookie.split(';').skip(1).find_map(|attr| {
        let (key, value) = attr.trim().split_once('=')?;
        let value = value.trim();
        (key.trim().eq_ignore_ascii_case("path") && value.starts_with('/'))
            .then(|| value.to_string())
    });

    explicit.unwrap_or_else(|| {
        let path = request_url.path();
        match path.rfind('/') {
            Some(0) | None => "/".to_string(),
            Some(idx) => path[..idx].to_string(),
        }
    })
}

/// Find one cookie in a `Cookie` request header value (`a=1; b=2`).
pub(crate) fn parse_cookie_header(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name && !value.is_empty()).then(|| value.to_string())
    })
}
