//! End-to-end runs through the public runner API against collaborator fakes

use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use nodeflow::{
    error::{CompilationError, EngineError, UpstreamServiceError},
    runtime::{
        context::OutputKeying, engine::TraversalStrategy, events::RunEvent,
        executor::NodeExecutor, runner::WorkflowRunner,
    },
    services::{
        credentials::Credential,
        http::HttpResponse,
        mock::{InMemoryCredentialStore, MockCollaborators, RecordingHttpSender, ScriptedLlmClient},
    },
    workflow::types::{Edge, Node, Workflow},
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

fn credentials() -> InMemoryCredentialStore {
    InMemoryCredentialStore::new()
        .with(Credential {
            id: "crm".into(),
            credential_type: "bearer-token".into(),
            bearer_token: Some("crm-token".into()),
            ..Default::default()
        })
        .with(Credential {
            id: "openai".into(),
            credential_type: "api-key".into(),
            api_key_value: Some("sk-test".into()),
            ..Default::default()
        })
        .with(Credential {
            id: "resend".into(),
            credential_type: "bearer-token".into(),
            bearer_token: Some("re_123".into()),
            ..Default::default()
        })
}

fn runner(mocks: &MockCollaborators, traversal: TraversalStrategy) -> WorkflowRunner {
    let executor = NodeExecutor::new(mocks.collaborators(), OutputKeying::NodeType)
        .with_mail_endpoint("https://mail.test/emails");
    WorkflowRunner::new(Arc::new(executor), traversal)
}

fn form_to_crm() -> Workflow {
    Workflow {
        id: "lead-intake".into(),
        name: "Lead intake".into(),
        nodes: vec![
            Node::new("form", "form-trigger").with_output(json!({"name": "Amresh", "plan": "pro"})),
            Node::new("crm", "http-programming-tool")
                .with_label("Create lead")
                .with_state(json!({
                    "httpMethod": "post",
                    "url": "https://api.example.com/{{$form-trigger.name}}",
                    "headers": [
                        {"key": "X-Plan", "value": "{{$form-trigger.plan}}", "enabled": true},
                        {"key": "X-Debug", "value": "1", "enabled": false}
                    ],
                    "includeBody": true,
                    "bodyContent": {"lead": "{{$form-trigger.name}}"},
                    "authType": "bearer",
                    "credentialId": "crm"
                })),
        ],
        edges: vec![Edge::new("e1", "form", "crm")],
        ..Default::default()
    }
}

#[tokio::test]
async fn form_submission_reaches_the_http_tool_resolved() {
    let mocks = MockCollaborators::new(
        credentials(),
        RecordingHttpSender::new().respond_with(HttpResponse::json(201, json!({"id": 7}))),
        ScriptedLlmClient::new(),
    );

    let ctx = runner(&mocks, TraversalStrategy::Sequential)
        .invoke(&form_to_crm(), None, &CancellationToken::new())
        .await
        .unwrap();

    let requests = mocks.http.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.method, "POST");
    assert_eq!(request.url, "https://api.example.com/Amresh");
    assert_eq!(request.header("x-plan"), Some("pro"));
    assert_eq!(request.header("X-Debug"), None);
    assert_eq!(request.header("Authorization"), Some("Bearer crm-token"));
    let body: Value = serde_json::from_str(request.body.as_deref().unwrap()).unwrap();
    assert_eq!(body, json!({"lead": "Amresh"}));

    assert_eq!(ctx.input["form-trigger"], json!({"name": "Amresh", "plan": "pro"}));
    assert_eq!(ctx.input["http-programming-tool"], json!({"id": 7}));
}

#[tokio::test]
async fn webhook_payload_replaces_cached_trigger_output() {
    let mocks = MockCollaborators::new(credentials(), RecordingHttpSender::new(), ScriptedLlmClient::new());

    runner(&mocks, TraversalStrategy::Sequential)
        .invoke(&form_to_crm(), Some(json!({"name": "Priya", "plan": "free"})), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(mocks.http.requests()[0].url, "https://api.example.com/Priya");
}

#[tokio::test]
async fn ai_summary_flows_into_an_email() {
    let mocks = MockCollaborators::new(
        credentials(),
        RecordingHttpSender::new(),
        ScriptedLlmClient::new().reply(r#"{"summary": "hot lead"}"#),
    );
    let wf = Workflow {
        id: "triage".into(),
        nodes: vec![
            Node::new("t", "manual-trigger").with_output(json!({"note": "wants a demo"})),
            Node::new("ai", "open-ai-tool").with_state(json!({
                "credential_id": "openai",
                "model": "gpt-4o-mini",
                "prompt": "Summarise: {{$manual-trigger.note}}"
            })),
            Node::new("mail", "mail-other-tool").with_state(json!({
                "fromEmail": "bot@example.com",
                "toEmails": ["sales@example.com"],
                "subject": "New lead",
                "body": "<p>{{$open-ai-tool.result.summary}}</p>",
                "credentialId": "resend"
            })),
        ],
        edges: vec![Edge::new("1", "t", "ai"), Edge::new("2", "ai", "mail")],
        ..Default::default()
    };

    let ctx = runner(&mocks, TraversalStrategy::Sequential)
        .invoke(&wf, None, &CancellationToken::new())
        .await
        .unwrap();

    let llm = mocks.llm.requests();
    assert_eq!(llm.len(), 1);
    assert_eq!(llm[0].user_prompt, "Summarise: wants a demo");
    assert_eq!(llm[0].api_key, "sk-test");
    assert_eq!(ctx.input["open-ai-tool"], json!({"result": {"summary": "hot lead"}}));

    let sent = mocks.http.requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].url, "https://mail.test/emails");
    assert_eq!(sent[0].header("Authorization"), Some("Bearer re_123"));
    let body: Value = serde_json::from_str(sent[0].body.as_deref().unwrap()).unwrap();
    assert_eq!(body["html"], json!("<p>hot lead</p>"));
    assert_eq!(body["to"], json!(["sales@example.com"]));
}

fn failing_second_node() -> (MockCollaborators, Workflow) {
    let mocks = MockCollaborators::new(
        credentials(),
        RecordingHttpSender::new().respond_with(HttpResponse::new(500, "upstream down")),
        ScriptedLlmClient::new(),
    );
    let wf = Workflow {
        id: "fragile".into(),
        nodes: vec![
            Node::new("t", "manual-trigger").with_output(json!({})),
            Node::new("a", "text-other-tool")
                .with_label("First")
                .with_state(json!({"fields": [{"label": "step", "value": "one"}]})),
            Node::new("b", "http-programming-tool")
                .with_label("Second")
                .with_state(json!({"url": "https://api.example.com/ping"})),
            Node::new("c", "text-other-tool")
                .with_label("Third")
                .with_state(json!({"fields": [{"label": "step", "value": "three"}]})),
        ],
        edges: vec![
            Edge::new("1", "t", "a"),
            Edge::new("2", "a", "b"),
            Edge::new("3", "b", "c"),
        ],
        ..Default::default()
    };
    (mocks, wf)
}

#[tokio::test]
async fn invoke_names_the_failing_node() {
    let (mocks, wf) = failing_second_node();
    let err = runner(&mocks, TraversalStrategy::Sequential)
        .invoke(&wf, None, &CancellationToken::new())
        .await
        .unwrap_err();

    match &err {
        EngineError::Execution(e) => {
            assert_eq!(e.node_id.as_deref(), Some("b"));
            assert_eq!(e.node_name.as_deref(), Some("Second"));
            assert_eq!(
                e.cause,
                UpstreamServiceError::HttpStatus { status: 500, body: "upstream down".into() }
            );
        }
        other => panic!("expected an execution error, got {:?}", other),
    }
    assert_eq!(mocks.http.requests().len(), 1);
}

fn oversized_sleep() -> Workflow {
    Workflow {
        id: "forever".into(),
        nodes: vec![
            Node::new("t", "manual-trigger").with_output(json!({})),
            Node::new("nap", "sleep-other-tool")
                .with_label("Nap")
                .with_state(json!({"duration": 1e300, "unit": "minutes"})),
        ],
        edges: vec![Edge::new("1", "t", "nap")],
        ..Default::default()
    }
}

#[tokio::test]
async fn out_of_range_sleep_is_a_config_error() {
    let mocks = MockCollaborators::new(credentials(), RecordingHttpSender::new(), ScriptedLlmClient::new());
    let err = runner(&mocks, TraversalStrategy::Sequential)
        .invoke(&oversized_sleep(), None, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        EngineError::Execution(e) => {
            assert_eq!(e.node_id.as_deref(), Some("nap"));
            assert!(matches!(e.cause, UpstreamServiceError::InvalidConfig(_)));
        }
        other => panic!("expected an execution error, got {:?}", other),
    }
}

#[tokio::test]
async fn out_of_range_sleep_still_ends_the_stream() {
    let mocks = MockCollaborators::new(credentials(), RecordingHttpSender::new(), ScriptedLlmClient::new());
    let stream = runner(&mocks, TraversalStrategy::Sequential)
        .stream(&oversized_sleep(), None, CancellationToken::new())
        .unwrap();

    let events: Vec<RunEvent> = tokio::time::timeout(Duration::from_secs(3), stream.collect())
        .await
        .expect("stream ended");
    match events.last() {
        Some(RunEvent::Failed { failed_node_id, .. }) => assert_eq!(failed_node_id.as_deref(), Some("nap")),
        other => panic!("expected a failed event, got {:?}", other),
    }
}

#[tokio::test]
async fn dropping_the_stream_stops_later_nodes() {
    let mocks = MockCollaborators::new(credentials(), RecordingHttpSender::new(), ScriptedLlmClient::new());
    let wf = Workflow {
        id: "abandoned".into(),
        nodes: vec![
            Node::new("t", "manual-trigger").with_output(json!({})),
            Node::new("wait", "sleep-other-tool").with_state(json!({"duration": 200, "unit": "milliseconds"})),
            Node::new("h", "http-programming-tool").with_state(json!({"url": "https://api.example.com/late"})),
        ],
        edges: vec![Edge::new("1", "t", "wait"), Edge::new("2", "wait", "h")],
        ..Default::default()
    };

    let mut stream = runner(&mocks, TraversalStrategy::Sequential)
        .stream(&wf, None, CancellationToken::new())
        .unwrap();
    match stream.next().await {
        Some(RunEvent::Progress { chunk }) => assert_eq!(chunk.node_id, "t"),
        other => panic!("expected trigger progress, got {:?}", other),
    }
    drop(stream);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(mocks.http.requests().is_empty());
}

#[tokio::test]
async fn stream_reports_progress_then_the_failure() {
    let (mocks, wf) = failing_second_node();
    let events: Vec<RunEvent> = runner(&mocks, TraversalStrategy::Sequential)
        .stream(&wf, None, CancellationToken::new())
        .unwrap()
        .collect()
        .await;

    let progressed: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::Progress { chunk } => Some(chunk.node_id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(progressed, vec!["t", "a"]);

    match events.last() {
        Some(RunEvent::Failed { failed_node_name, failed_node_id, error }) => {
            assert_eq!(failed_node_name.as_deref(), Some("Second"));
            assert_eq!(failed_node_id.as_deref(), Some("b"));
            assert!(error.contains("500"));
        }
        other => panic!("expected a failed event, got {:?}", other),
    }
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
}

#[tokio::test]
async fn compile_errors_stop_before_any_side_effect() {
    let mocks = MockCollaborators::new(credentials(), RecordingHttpSender::new(), ScriptedLlmClient::new());
    let mut wf = form_to_crm();
    wf.nodes.push(Node::new("js", "javascript-programming-tool"));
    wf.edges.push(Edge::new("e2", "crm", "js"));

    let err = runner(&mocks, TraversalStrategy::Sequential)
        .invoke(&wf, None, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        EngineError::Compilation(CompilationError::UnknownNodeType {
            node_id: "js".into(),
            node_type: "javascript-programming-tool".into(),
        })
    );
    assert!(mocks.http.requests().is_empty());
}

#[tokio::test]
async fn layered_traversal_runs_siblings_and_keeps_both_outputs() {
    let mocks = MockCollaborators::new(credentials(), RecordingHttpSender::new(), ScriptedLlmClient::new());
    let wf = Workflow {
        id: "fan-out".into(),
        nodes: vec![
            Node::new("t", "manual-trigger").with_output(json!({"city": "Pune"})),
            Node::new("h", "http-programming-tool")
                .with_state(json!({"url": "https://weather.test/{{$manual-trigger.city}}"})),
            Node::new("x", "text-other-tool")
                .with_state(json!({"fields": [{"label": "city", "value": "{{$manual-trigger.city}}"}]})),
        ],
        edges: vec![Edge::new("1", "t", "h"), Edge::new("2", "t", "x")],
        ..Default::default()
    };

    let ctx = runner(&mocks, TraversalStrategy::Layered)
        .invoke(&wf, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(mocks.http.requests()[0].url, "https://weather.test/Pune");
    assert_eq!(ctx.input["text-other-tool"], json!({"city": "Pune"}));
    assert_eq!(ctx.input["http-programming-tool"], json!({}));
}
