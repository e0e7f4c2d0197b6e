/// Email delivery through the mail provider's HTTP API
///
/// A mail node is an HTTP call in disguise: its configuration is validated and
/// rewritten into an `HttpCall` that POSTs to the provider endpoint.

use serde_json::{json, Value};

use super::http::HttpCall;
use crate::error::UpstreamServiceError;

pub const DEFAULT_MAIL_ENDPOINT: &str = "https://api.resend.com/emails";

const REQUIRED_FIELDS: [&str; 5] = ["fromEmail", "toEmails", "subject", "body", "credentialId"];

/// Build the provider request from a resolved mail node configuration
pub fn build_mail_call(config: &Value, endpoint: &str) -> Result<HttpCall, UpstreamServiceError> {
    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| !present(config.get(*field)))
        .collect();
    if !missing.is_empty() {
        return Err(UpstreamServiceError::InvalidConfig(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }

    let field = |name: &str| config.get(name).cloned().unwrap_or(Value::Null);
    let list = |name: &str| config.get(name).cloned().unwrap_or_else(|| json!([]));

    let auth_type = config
        .get("authType")
        .and_then(Value::as_str)
        .unwrap_or("bearer")
        .to_string();

    Ok(HttpCall {
        http_method: "POST".to_string(),
        url: endpoint.to_string(),
        headers: Vec::new(),
        include_query_params: false,
        query_params: Vec::new(),
        include_body: true,
        body_content: Some(json!({
            "from": field("fromEmail"),
            "to": field("toEmails"),
            "cc": list("ccEmails"),
            "bcc": list("bccEmails"),
            "subject": field("subject"),
            "html": field("body"),
        })),
        auth_type: Some(auth_type),
        credential_id: config
            .get("credentialId")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

fn present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_every_missing_field() {
        let err = build_mail_call(&json!({"subject": "Hi", "toEmails": []}), DEFAULT_MAIL_ENDPOINT)
            .unwrap_err();
        assert_eq!(
            err,
            UpstreamServiceError::InvalidConfig(
                "Missing required fields: fromEmail, toEmails, body, credentialId".into()
            )
        );
    }

    #[test]
    fn builds_post_with_defaults() {
        let call = build_mail_call(
            &json!({
                "fromEmail": "a@x.dev",
                "toEmails": ["b@x.dev"],
                "subject": "Hi",
                "body": "<p>yo</p>",
                "credentialId": "resend"
            }),
            DEFAULT_MAIL_ENDPOINT,
        )
        .unwrap();

        assert_eq!(call.http_method, "POST");
        assert_eq!(call.url, DEFAULT_MAIL_ENDPOINT);
        assert_eq!(call.auth(), Some(("bearer", "resend")));
        let body = call.body_content.unwrap();
        assert_eq!(body["cc"], json!([]));
        assert_eq!(body["html"], json!("<p>yo</p>"));
        assert_eq!(body["to"], json!(["b@x.dev"]));
    }
}
