//! Backend endpoint paths and URL resolution.

use crate::HttpResult;
use url::Url;

/// CSRF token bootstrap endpoint (relative to the base URL).
pub const CSRF_TOKEN: &str = "csrf-token";
/// Email/password login.
pub const LOGIN: &str = "/api/auth/login";
/// Account registration.
pub const REGISTER: &str = "/api/auth/register";
/// Server-side logout.
pub const LOGOUT: &str = "/api/auth/logout";
/// Session refresh using the refresh cookie.
pub const REFRESH_TOKEN: &str = "/api/auth/refreshToken";

/// Cookie the backend sets with the CSRF token.
pub const CSRF_COOKIE: &str = "csrf-cookie";
/// Header the CSRF token is echoed back in.
pub const CSRF_HEADER: &str = "X-CSRF-TOKEN";
/// Credential cookies dropped when a session cannot be refreshed.
pub const CREDENTIAL_COOKIES: [&str; 2] = ["access_token", "refresh_token"];

const AUTH_ENDPOINTS: [&str; 4] = [LOGIN, REGISTER, REFRESH_TOKEN, LOGOUT];

fn normalize(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    path.trim_matches('/')
}

/// Returns true if `path` is one of the authentication endpoints.
///
/// A 401 from these endpoints means bad credentials or a dead refresh
/// cookie, never an expired access token, so it must not trigger a refresh.
pub fn is_auth_endpoint(path: &str) -> bool {
    let path = match Url::parse(path) {
        Ok(url) => url.path().to_string(),
        Err(_) => path.to_string(),
    };
    let path = normalize(&path);
    AUTH_ENDPOINTS
        .iter()
        .any(|endpoint| path == normalize(endpoint) || path.ends_with(&format!("/{}", normalize(endpoint))))
}

/// Resolve a request path against the base URL.
///
/// Absolute URLs are used as-is. Relative paths are appended to the base
/// path, with or without a leading slash, so `/api/auth/login` against
/// `https://shop.example/v1/` becomes `https://shop.example/v1/api/auth/login`.
pub fn resolve_url(base: &Url, path: &str) -> HttpResult<Url> {
    if let Ok(url) = Url::parse(path) {
        return Ok(url);
    }

    let base_str = base.as_str();
    let base_str = base_str.split(['?', '#']).next().unwrap_or(base_str);
    let joined = format!(
        "{}/{}",
        base_str.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Ok(Url::parse(&joined)?)
}
