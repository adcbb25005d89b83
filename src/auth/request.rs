use axum::http::{request::Parts, HeaderMap, HeaderName, HeaderValue};
use std::{collections::HashMap, net::IpAddr};

/// The parts of an inbound request the pipeline looks at.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyRequest {
    pub client_ip: Option<IpAddr>,
    pub path: String,
    pub headers: HeaderMap,
    pub query: HashMap<String, String>,
}

impl ApiKeyRequest {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Build from HTTP request parts. With `trust_forwarded_for` the proxy headers
    /// win over the socket peer address.
    #[must_use]
    pub fn from_parts(parts: &Parts, peer: Option<IpAddr>, trust_forwarded_for: bool) -> Self {
        let forwarded = if trust_forwarded_for {
            extract_client_ip(&parts.headers)
        } else {
            None
        };
        Self {
            client_ip: forwarded.or(peer),
            path: parts.uri.path().to_string(),
            headers: parts.headers.clone(),
            query: parse_query(parts.uri.query().unwrap_or_default()),
        }
    }

    #[must_use]
    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    /// Invalid names or values are ignored.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    #[must_use]
    pub fn with_query(mut self, raw: &str) -> Self {
        self.query.extend(parse_query(raw));
        self
    }

    #[must_use]
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(name)
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
    }

    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

/// First `X-Forwarded-For` entry, then `X-Real-IP`.
#[must_use]
pub fn extract_client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .and_then(|value| value.parse().ok());
    if forwarded.is_some() {
        return forwarded;
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .and_then(|value| value.parse().ok())
}

#[must_use]
pub fn parse_query(raw: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(raw.as_bytes())
        .into_owned()
        .collect()
}
