//! Network access seam for the offline proxy.

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: String,
    pub url: String,
    /// Top-level page navigation (falls back to the cached app shell).
    pub navigate: bool,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            navigate: false,
        }
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        Self {
            navigate: true,
            ..Self::get(url)
        }
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchedResponse {
    pub fn ok(content_type: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            content_type: Some(content_type.into()),
            body: body.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    InvalidRequest(String),
    Network(String),
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRequest(message) => write!(f, "invalid request: {message}"),
            Self::Network(message) => write!(f, "network error: {message}"),
        }
    }
}

impl Error for FetchError {}

/// Performs one network request.
pub trait Fetcher {
    fn fetch(&self, request: &FetchRequest) -> Result<FetchedResponse, FetchError>;
}

impl<T: Fetcher + ?Sized> Fetcher for &T {
    fn fetch(&self, request: &FetchRequest) -> Result<FetchedResponse, FetchError> {
        (**self).fetch(request)
    }
}

/// Blocking HTTP fetcher.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|err| FetchError::InvalidRequest(err.to_string()))?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, request: &FetchRequest) -> Result<FetchedResponse, FetchError> {
        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|err| FetchError::InvalidRequest(err.to_string()))?;
        let response = self
            .client
            .request(method, request.url.as_str())
            .send()
            .map_err(|err| FetchError::Network(err.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .map_err(|err| FetchError::Network(err.to_string()))?
            .to_vec();

        Ok(FetchedResponse {
            status,
            content_type,
            body,
        })
    }
}
