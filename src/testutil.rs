//! In-memory gateway and renderer doubles used by the per-module tests.

use crate::connection::{Gateway, HttpMethod, HttpResponse};
use crate::error::SyncError;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// One recorded gateway call: method name, url, and the JSON body for writes.
#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub method: String,
    pub url: String,
    pub body: Option<Value>,
}

/// Scripted `Gateway` double.
///
/// Responses are queued per `(method, url)` key and popped in order; when a
/// queue runs dry the last response is replayed, which keeps idempotence
/// tests (same request issued twice) short. An unscripted request answers
/// 404 with an empty body.
#[derive(Default)]
pub struct FakeGateway {
    responses: RefCell<HashMap<String, Vec<HttpResponse>>>,
    exhausted: RefCell<HashMap<String, HttpResponse>>,
    downloads: HashMap<String, Vec<u8>>,
    pub calls: RefCell<Vec<RecordedCall>>,
    pub downloaded: RefCell<Vec<String>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        FakeGateway::default()
    }

    fn key(method: &str, url: &str) -> String {
        format!("{} {}", method, url)
    }

    pub fn respond(&mut self, method: &str, url: &str, status: u16, body: &str) {
        self.respond_with_links(method, url, status, body, Vec::new());
    }

    pub fn respond_json(&mut self, method: &str, url: &str, status: u16, body: &Value) {
        self.respond(method, url, status, &body.to_string());
    }

    pub fn respond_with_links(
        &mut self,
        method: &str,
        url: &str,
        status: u16,
        body: &str,
        links: Vec<(String, String)>,
    ) {
        self.responses
            .borrow_mut()
            .entry(Self::key(method, url))
            .or_default()
            .push(HttpResponse {
                status,
                body: body.to_string(),
                links,
            });
    }

    pub fn serve_download(&mut self, url: &str, content: &[u8]) {
        self.downloads.insert(url.to_string(), content.to_vec());
    }

    /// Recorded calls matching the given method name.
    pub fn calls_with_method(&self, method: &str) -> Vec<RecordedCall> {
        self.calls
            .borrow()
            .iter()
            .filter(|call| call.method == method)
            .cloned()
            .collect()
    }
}

impl Gateway for FakeGateway {
    fn execute(
        &self,
        method: HttpMethod,
        url: &str,
        _params: &[(String, String)],
    ) -> Result<HttpResponse, SyncError> {
        let body = match &method {
            HttpMethod::Put(body) | HttpMethod::Post(body) => Some(body.clone()),
            _ => None,
        };
        self.calls.borrow_mut().push(RecordedCall {
            method: method.as_str().to_string(),
            url: url.to_string(),
            body,
        });

        let key = Self::key(method.as_str(), url);
        let mut responses = self.responses.borrow_mut();
        if let Some(queue) = responses.get_mut(&key) {
            if !queue.is_empty() {
                let response = queue.remove(0);
                self.exhausted
                    .borrow_mut()
                    .insert(key.clone(), response.clone());
                return Ok(response);
            }
        }
        if let Some(last) = self.exhausted.borrow().get(&key) {
            return Ok(last.clone());
        }
        Ok(HttpResponse {
            status: 404,
            body: String::new(),
            links: Vec::new(),
        })
    }

    fn download(&self, url: &str, dest: &Path) -> Result<(), SyncError> {
        self.downloaded.borrow_mut().push(url.to_string());
        match self.downloads.get(url) {
            Some(content) => {
                fs::write(dest, content)?;
                Ok(())
            }
            None => Err(SyncError::RemoteFetch {
                status: 404,
                body: format!("no such file: {}", url),
            }),
        }
    }
}

/// `DocumentRenderer` double: renders a fixed string, or fails on demand.
pub struct FakeRenderer {
    pub output: String,
    pub fail: bool,
    pub rendered: RefCell<Vec<String>>,
}

impl FakeRenderer {
    pub fn new(output: &str) -> Self {
        FakeRenderer {
            output: output.to_string(),
            fail: false,
            rendered: RefCell::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        FakeRenderer {
            output: String::new(),
            fail: true,
            rendered: RefCell::new(Vec::new()),
        }
    }
}

impl crate::materialize::DocumentRenderer for FakeRenderer {
    fn render(&self, source: &Path) -> Result<String, SyncError> {
        self.rendered
            .borrow_mut()
            .push(source.to_string_lossy().into_owned());
        if self.fail {
            Err(SyncError::Render("renderer exploded".to_string()))
        } else {
            Ok(self.output.clone())
        }
    }
}
