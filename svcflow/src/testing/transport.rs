//! Scripted transport.

use crate::errors::TransportError;
use crate::transport::{HttpMethod, HttpRequest, HttpResponse, Transport};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

type Scripted = Result<HttpResponse, TransportError>;

/// A [`Transport`] that replays canned responses per route.
///
/// Routes are a method plus a path; a request matches when its URL ends
/// with the path. Responses for a route are returned in the order they
/// were scripted, and the last one repeats forever, which makes
/// "still pending" scripts one line long. A request with no scripted
/// route fails with `TransportError::InvalidRequest`.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<(HttpMethod, String), VecDeque<Scripted>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    /// Creates a transport with no routes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a response for a route.
    #[must_use]
    pub fn respond(self, method: HttpMethod, path: impl Into<String>, response: HttpResponse) -> Self {
        self.push(method, path.into(), Ok(response));
        self
    }

    /// Scripts a JSON response for a route.
    #[must_use]
    pub fn respond_json(
        self,
        method: HttpMethod,
        path: impl Into<String>,
        status_code: u16,
        body: serde_json::Value,
    ) -> Self {
        self.respond(method, path, HttpResponse::json(status_code, body))
    }

    /// Scripts a transport error for a route.
    #[must_use]
    pub fn fail(self, method: HttpMethod, path: impl Into<String>, error: TransportError) -> Self {
        self.push(method, path.into(), Err(error));
        self
    }

    fn push(&self, method: HttpMethod, path: String, scripted: Scripted) {
        self.routes
            .lock()
            .entry((method, path))
            .or_default()
            .push_back(scripted);
    }

    /// Returns every request received, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Returns how many requests hit a path.
    #[must_use]
    pub fn calls_to(&self, path: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|req| req.url.ends_with(path))
            .count()
    }

    fn next_response(&self, request: &HttpRequest) -> Scripted {
        let mut routes = self.routes.lock();
        // Longest matching path wins, so "/aiservice" does not shadow
        // "/aiservice/datasets".
        let key = routes
            .keys()
            .filter(|(method, path)| *method == request.method && request.url.ends_with(path.as_str()))
            .max_by_key(|(_, path)| path.len())
            .cloned();

        let Some(queue) = key.and_then(|key| routes.get_mut(&key)) else {
            return Err(TransportError::InvalidRequest(format!(
                "no scripted response for {} {}",
                request.method, request.url
            )));
        };
        if queue.len() > 1 {
            queue
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::InvalidRequest("empty script".to_string())))
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(TransportError::InvalidRequest("empty script".to_string())))
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let response = self.next_response(&request);
        self.requests.lock().push(request);
        response
    }
}
