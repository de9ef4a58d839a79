// Import of the credentials structure from the crate's root. It supplies the
// bearer token injected into every outgoing request.
use crate::credentials::ApiCredentials;
use crate::error::SyncError;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::path::Path;

/// Enumeration representing the types of HTTP request methods.
///
/// This enum is used throughout the crate to specify the HTTP method for
/// requests. Body-carrying variants (`Put`, `Post`) hold the JSON payload so
/// a request is fully described by `(method, url, params)`.
#[derive(Clone, Debug)]
pub enum HttpMethod {
    Get,
    Put(serde_json::Value),
    Post(serde_json::Value),
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put(_) => "PUT",
            HttpMethod::Post(_) => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// The materialized result of an executed request: status code, body text and
/// the parsed `Link` header relations.
///
/// Status-code policy deliberately lives with the caller: a read treats
/// non-2xx as a fetch error, a create wants exactly 201, and the calendar
/// delete path even accepts some 200 responses. The gateway only reports.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    /// `(relation name, locator)` pairs from the `Link` header.
    pub links: Vec<(String, String)>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserializes the body into the requested type.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, SyncError> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Locator of the next page, if the server advertised one. Only the
    /// relation literally named `next` is followed.
    pub fn next_link(&self) -> Option<String> {
        self.links
            .iter()
            .find(|(rel, _)| rel == "next")
            .map(|(_, url)| url.clone())
    }
}

/// Abstraction over the authenticated HTTP transport.
///
/// The synchronization core talks to the LMS exclusively through this trait,
/// which keeps the components testable with scripted in-memory gateways.
/// `execute` covers the JSON API; `download` streams a binary attachment
/// straight to disk without buffering it in memory.
pub trait Gateway {
    fn execute(
        &self,
        method: HttpMethod,
        url: &str,
        params: &[(String, String)],
    ) -> Result<HttpResponse, SyncError>;

    fn download(&self, url: &str, dest: &Path) -> Result<(), SyncError>;
}

/// Production `Gateway` backed by a blocking `reqwest` client.
///
/// One client is constructed per gateway and reused for every request so the
/// underlying connection pool is shared. All requests carry the bearer token
/// from the injected credentials. No retry or backoff is performed; a single
/// failure is surfaced to the caller as-is.
pub struct HttpGateway {
    credentials: ApiCredentials,
    client: reqwest::blocking::Client,
}

impl HttpGateway {
    pub fn new(credentials: ApiCredentials) -> Self {
        HttpGateway {
            credentials,
            client: reqwest::blocking::Client::new(),
        }
    }

    pub fn credentials(&self) -> &ApiCredentials {
        &self.credentials
    }
}

impl Gateway for HttpGateway {
    fn execute(
        &self,
        method: HttpMethod,
        url: &str,
        params: &[(String, String)],
    ) -> Result<HttpResponse, SyncError> {
        // Build the request according to the HTTP method.
        let request_builder = match &method {
            HttpMethod::Get => self
                .client
                .get(url)
                .bearer_auth(&self.credentials.token)
                .query(params),
            HttpMethod::Put(body) => self
                .client
                .put(url)
                .bearer_auth(&self.credentials.token)
                .json(body),
            HttpMethod::Post(body) => self
                .client
                .post(url)
                .bearer_auth(&self.credentials.token)
                .json(body),
            HttpMethod::Delete => self
                .client
                .delete(url)
                .bearer_auth(&self.credentials.token)
                .query(params), // DELETE may also carry query parameters
        };

        let response = request_builder.send()?;

        let status = response.status().as_u16();
        let links = response
            .headers()
            .get(reqwest::header::LINK)
            .and_then(|value| value.to_str().ok())
            .map(parse_link_header)
            .unwrap_or_default();
        let body = response.text()?;

        Ok(HttpResponse {
            status,
            body,
            links,
        })
    }

    fn download(&self, url: &str, dest: &Path) -> Result<(), SyncError> {
        let mut response = self
            .client
            .get(url)
            .bearer_auth(&self.credentials.token)
            .send()?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            return Err(SyncError::RemoteFetch { status, body });
        }

        let mut file = File::create(dest)?;
        // Streams the body to the file chunk by chunk.
        response
            .copy_to(&mut file)
            .map_err(|e| SyncError::Transport(e.to_string()))?;
        Ok(())
    }
}

/// Parses a `Link` header into `(relation, locator)` pairs.
///
/// The header is a comma-separated list of entries of the form
/// `<https://...>; rel="next"`. Entries that do not follow that shape are
/// ignored rather than rejected, since servers append extra parameters.
pub fn parse_link_header(header: &str) -> Vec<(String, String)> {
    let mut links = Vec::new();
    for entry in header.split(',') {
        let entry = entry.trim();
        let url = match (entry.find('<'), entry.find('>')) {
            (Some(start), Some(end)) if start < end => &entry[start + 1..end],
            _ => continue,
        };
        let rel = entry
            .split(';')
            .skip(1)
            .map(str::trim)
            .find_map(|param| param.strip_prefix("rel="))
            .map(|value| value.trim_matches('"').to_string());
        if let Some(rel) = rel {
            links.push((rel, url.to_string()));
        }
    }
    links
}
