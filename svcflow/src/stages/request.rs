//! Request templates.
//!
//! A stage's request is described as data: a method, a path, query
//! parameters and a JSON body whose leaves are either literals or
//! references to context keys. Every referenced key is a declared input
//! of the stage, so the pipeline can check the wiring before it runs.

use crate::context::{value_to_text, StageInputs};
use crate::errors::FailureReason;
use crate::transport::{HttpMethod, HttpRequest};
use serde_json::{Map, Value};

/// A value in a request template.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValue {
    /// A fixed value.
    Literal(Value),
    /// The value of a context key.
    FromContext(String),
    /// A JSON object whose fields are themselves templates.
    Object(Vec<(String, TemplateValue)>),
}

impl TemplateValue {
    /// Creates a literal.
    #[must_use]
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// Creates a context reference.
    #[must_use]
    pub fn from_context(key: impl Into<String>) -> Self {
        Self::FromContext(key.into())
    }

    /// Creates an object template.
    #[must_use]
    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, TemplateValue)>) -> Self {
        Self::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    fn collect_keys(&self, keys: &mut Vec<String>) {
        match self {
            Self::Literal(_) => {}
            Self::FromContext(key) => {
                if !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
            Self::Object(fields) => {
                for (_, value) in fields {
                    value.collect_keys(keys);
                }
            }
        }
    }

    fn render(&self, inputs: &StageInputs) -> Result<Value, FailureReason> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::FromContext(key) => inputs
                .get(key)
                .cloned()
                .ok_or_else(|| FailureReason::missing_input(key.clone())),
            Self::Object(fields) => {
                let mut object = Map::new();
                for (name, value) in fields {
                    object.insert(name.clone(), value.render(inputs)?);
                }
                Ok(Value::Object(object))
            }
        }
    }
}

/// The request a stage issues.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestTemplate {
    method: HttpMethod,
    path: String,
    query: Vec<(String, TemplateValue)>,
    body: Option<TemplateValue>,
}

impl RequestTemplate {
    /// Creates a template for a path relative to the API base URL.
    #[must_use]
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Creates a GET template.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    /// Creates a POST template.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: TemplateValue) -> Self {
        self.query.push((name.into(), value));
        self
    }

    /// Sets the JSON body.
    #[must_use]
    pub fn body(mut self, body: TemplateValue) -> Self {
        self.body = Some(body);
        self
    }

    /// Returns the method.
    #[must_use]
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Returns the path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Context keys the template reads, in first-use order.
    #[must_use]
    pub fn referenced_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        for (_, value) in &self.query {
            value.collect_keys(&mut keys);
        }
        if let Some(body) = &self.body {
            body.collect_keys(&mut keys);
        }
        keys
    }

    /// Renders the request against resolved inputs.
    ///
    /// # Errors
    ///
    /// Returns `FailureReason::MissingInput` if a referenced key was not
    /// resolved.
    pub fn render(&self, base_url: &str, inputs: &StageInputs) -> Result<HttpRequest, FailureReason> {
        let mut request = HttpRequest::new(self.method, join_url(base_url, &self.path));
        for (name, value) in &self.query {
            request = request.with_query(name.clone(), value_to_text(&value.render(inputs)?));
        }
        if let Some(body) = &self.body {
            request = request.with_body(body.render(inputs)?);
        }
        Ok(request)
    }
}

/// Joins a base URL and a path with exactly one slash between them.
#[must_use]
pub fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
