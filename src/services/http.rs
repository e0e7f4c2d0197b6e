/// Outbound HTTP requests for tool nodes
///
/// `HttpCall` is the resolved configuration of an HTTP tool node as it comes from the
/// canvas. It is turned into a transport-neutral `HttpRequest` and handed to an
/// `HttpSender`; the response is interpreted into the node's output value.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::UpstreamServiceError;

/// One header or query parameter row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub enabled: bool,
}

impl KeyValue {
    fn pair(&self) -> (String, String) {
        let value = match &self.value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        (self.key.clone(), value)
    }
}

/// Configuration of an HTTP tool node after template resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpCall {
    #[serde(default = "default_method")]
    pub http_method: String,
    pub url: String,
    #[serde(default)]
    pub headers: Vec<KeyValue>,
    #[serde(default)]
    pub include_query_params: bool,
    #[serde(default)]
    pub query_params: Vec<KeyValue>,
    #[serde(default)]
    pub include_body: bool,
    #[serde(default)]
    pub body_content: Option<Value>,
    #[serde(default)]
    pub auth_type: Option<String>,
    #[serde(default)]
    pub credential_id: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl HttpCall {
    /// Auth type and credential id, only when both are set
    pub fn auth(&self) -> Option<(&str, &str)> {
        let auth_type = self.auth_type.as_deref().filter(|s| !s.is_empty())?;
        let credential_id = self.credential_id.as_deref().filter(|s| !s.is_empty())?;
        Some((auth_type, credential_id))
    }

    /// Build the wire request; `auth` is appended after the enabled headers
    pub fn into_request(self, auth: Option<(String, String)>) -> HttpRequest {
        let mut headers: Vec<(String, String)> = self
            .headers
            .iter()
            .filter(|h| h.enabled)
            .map(KeyValue::pair)
            .collect();
        headers.extend(auth);

        let query = if self.include_query_params {
            self.query_params
                .iter()
                .filter(|q| q.enabled && !q.key.is_empty())
                .map(KeyValue::pair)
                .collect()
        } else {
            Vec::new()
        };

        let body = self
            .body_content
            .filter(|_| self.include_body)
            .filter(is_truthy)
            .map(|b| b.to_string());

        HttpRequest {
            method: self.http_method.to_uppercase(),
            url: self.url,
            headers,
            query,
            body,
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(_) => true,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    /// Already JSON-encoded
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into() }
    }

    pub fn json(status: u16, body: Value) -> Self {
        Self::new(status, body.to_string())
    }
}

#[async_trait]
pub trait HttpSender: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, UpstreamServiceError>;
}

/// Turn a raw response into the node's output
///
/// Non-2xx is an error. A JSON body with a non-empty `errors` field is an error.
/// Bodies that are not JSON come back as `{"status_code", "text"}`.
pub fn interpret_response(response: HttpResponse) -> Result<Value, UpstreamServiceError> {
    if !(200..300).contains(&response.status) {
        return Err(UpstreamServiceError::HttpStatus {
            status: response.status,
            body: response.body,
        });
    }

    match serde_json::from_str::<Value>(&response.body) {
        Ok(data) => {
            if let Some(errors) = data.get("errors").filter(|e| is_truthy(e)) {
                return Err(UpstreamServiceError::ApiErrors(errors.to_string()));
            }
            Ok(data)
        }
        Err(_) => Ok(json!({
            "status_code": response.status,
            "text": response.body,
        })),
    }
}

/// `HttpSender` over a shared reqwest client
#[derive(Debug, Clone)]
pub struct ReqwestSender {
    client: reqwest::Client,
}

impl ReqwestSender {
    pub fn new(timeout: Duration) -> Result<Self, UpstreamServiceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl ReqwestSender {
    /// Translate the request onto the client; JSON is the default body type
    fn prepare(&self, request: HttpRequest) -> Result<reqwest::RequestBuilder, UpstreamServiceError> {
        let mut builder = match request.method.as_str() {
            "GET" => self.client.get(&request.url),
            "POST" => self.client.post(&request.url),
            "PUT" => self.client.put(&request.url),
            "DELETE" => self.client.delete(&request.url),
            "PATCH" => self.client.patch(&request.url),
            "HEAD" => self.client.head(&request.url),
            other => {
                return Err(UpstreamServiceError::InvalidConfig(format!(
                    "Unsupported HTTP method: {}",
                    other
                )))
            }
        };

        let has_content_type = request.header("content-type").is_some();
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = request.body {
            if !has_content_type {
                builder = builder.header("Content-Type", "application/json");
            }
            builder = builder.body(body);
        }
        Ok(builder)
    }
}

#[async_trait]
impl HttpSender for ReqwestSender {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, UpstreamServiceError> {
        tracing::debug!("🌍 HTTP Request: {} {}", request.method, request.url);

        let response = self.prepare(request)?.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        tracing::debug!("📡 Response status: {}", status);
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(state: Value) -> HttpCall {
        serde_json::from_value(state).unwrap()
    }

    #[test]
    fn builds_request_from_canvas_fields() {
        let c = call(json!({
            "httpMethod": "post",
            "url": "https://api.example.com/users",
            "headers": [
                {"key": "X-On", "value": "1", "enabled": true},
                {"key": "X-Off", "value": "0", "enabled": false}
            ],
            "includeQueryParams": true,
            "queryParams": [
                {"key": "page", "value": 2, "enabled": true},
                {"key": "", "value": "skip", "enabled": true}
            ],
            "includeBody": true,
            "bodyContent": {"name": "Ada"}
        }));
        let req = c.into_request(Some(("Authorization".into(), "Bearer t".into())));

        assert_eq!(req.method, "POST");
        assert_eq!(
            req.headers,
            vec![
                ("X-On".to_string(), "1".to_string()),
                ("Authorization".to_string(), "Bearer t".to_string())
            ]
        );
        assert_eq!(req.query, vec![("page".to_string(), "2".to_string())]);
        assert_eq!(req.body.as_deref(), Some(r#"{"name":"Ada"}"#));
    }

    #[test]
    fn body_and_query_are_gated_by_their_flags() {
        let c = call(json!({
            "url": "https://x",
            "queryParams": [{"key": "a", "value": "b", "enabled": true}],
            "bodyContent": {"k": 1}
        }));
        assert!(c.auth().is_none());
        let req = c.into_request(None);
        assert_eq!(req.method, "GET");
        assert!(req.query.is_empty());
        assert!(req.body.is_none());
    }

    #[test]
    fn auth_requires_both_type_and_credential() {
        let c = call(json!({"url": "u", "authType": "bearer", "credentialId": ""}));
        assert!(c.auth().is_none());
        let c = call(json!({"url": "u", "authType": "bearer", "credentialId": "c1"}));
        assert_eq!(c.auth(), Some(("bearer", "c1")));
    }

    #[test]
    fn interprets_responses() {
        assert_eq!(
            interpret_response(HttpResponse::json(200, json!({"id": 7}))).unwrap(),
            json!({"id": 7})
        );
        assert_eq!(
            interpret_response(HttpResponse::new(201, "created")).unwrap(),
            json!({"status_code": 201, "text": "created"})
        );
        assert_eq!(
            interpret_response(HttpResponse::json(200, json!({"data": 1, "errors": []}))).unwrap(),
            json!({"data": 1, "errors": []})
        );
        assert!(matches!(
            interpret_response(HttpResponse::json(200, json!({"errors": [{"message": "bad"}]}))),
            Err(UpstreamServiceError::ApiErrors(_))
        ));
        assert!(matches!(
            interpret_response(HttpResponse::new(404, "nope")),
            Err(UpstreamServiceError::HttpStatus { status: 404, .. })
        ));
    }

    #[test]
    fn reqwest_request_defaults_to_json_body() {
        let sender = ReqwestSender::new(Duration::from_secs(5)).unwrap();
        let req = call(json!({
            "httpMethod": "put",
            "url": "https://api.example.com/items",
            "includeQueryParams": true,
            "queryParams": [{"key": "v", "value": "2", "enabled": true}],
            "includeBody": true,
            "bodyContent": {"k": 1}
        }))
        .into_request(None);

        let built = sender.prepare(req).unwrap().build().unwrap();
        assert_eq!(built.method(), reqwest::Method::PUT);
        assert_eq!(built.url().as_str(), "https://api.example.com/items?v=2");
        assert_eq!(built.headers()["content-type"], "application/json");
        assert_eq!(built.body().and_then(|b| b.as_bytes()), Some(&br#"{"k":1}"#[..]));
    }

    #[test]
    fn reqwest_request_keeps_caller_content_type() {
        let sender = ReqwestSender::new(Duration::from_secs(5)).unwrap();
        let req = call(json!({
            "httpMethod": "post",
            "url": "https://api.example.com/form",
            "headers": [{"key": "Content-Type", "value": "text/plain", "enabled": true}],
            "includeBody": true,
            "bodyContent": "hello"
        }))
        .into_request(None);

        let built = sender.prepare(req).unwrap().build().unwrap();
        let types: Vec<_> = built.headers().get_all("content-type").iter().collect();
        assert_eq!(types, vec!["text/plain"]);

        let bad = call(json!({"httpMethod": "trace", "url": "https://x"})).into_request(None);
        assert!(matches!(sender.prepare(bad), Err(UpstreamServiceError::InvalidConfig(_))));
    }
}
