use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING};
use reqwest::Client;

pub const APP_USER_AGENT: &str = "BalatroInstanceManager/0.1.0";

/// Shared client for release lookups and downloads. GitHub rejects
/// requests without a user agent.
pub fn build_http_client() -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    default_headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/vnd.github+json, */*"),
    );

    Client::builder()
        .user_agent(APP_USER_AGENT)
        .default_headers(default_headers)
        .build()
}
