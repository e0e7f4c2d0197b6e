/// In-process collaborator fakes
///
/// Used by unit and integration tests to run workflows without network or database
/// access. Every fake records what it was asked so tests can assert on the exact
/// request a node produced.

use async_trait::async_trait;
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use super::{
    credentials::{Credential, CredentialStore},
    http::{HttpRequest, HttpResponse, HttpSender},
    llm::{LlmClient, LlmRequest},
    Collaborators,
};
use crate::error::UpstreamServiceError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Fixed set of credentials keyed by id
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    credentials: HashMap<String, Credential>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, credential: Credential) -> Self {
        self.credentials.insert(credential.id.clone(), credential);
        self
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get_credential(&self, id: &str) -> Result<Option<Credential>, UpstreamServiceError> {
        Ok(self.credentials.get(id).cloned())
    }
}

/// Records every request; replies from a queue, then with a fallback `200 {}`
#[derive(Debug)]
pub struct RecordingHttpSender {
    requests: Mutex<Vec<HttpRequest>>,
    replies: Mutex<VecDeque<Result<HttpResponse, UpstreamServiceError>>>,
    fallback: HttpResponse,
}

impl Default for RecordingHttpSender {
    fn default() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            replies: Mutex::new(VecDeque::new()),
            fallback: HttpResponse::new(200, "{}"),
        }
    }
}

impl RecordingHttpSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for the next unanswered request
    pub fn respond_with(self, response: HttpResponse) -> Self {
        lock(&self.replies).push_back(Ok(response));
        self
    }

    /// Queue a transport failure for the next unanswered request
    pub fn fail_with(self, error: UpstreamServiceError) -> Self {
        lock(&self.replies).push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl HttpSender for RecordingHttpSender {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, UpstreamServiceError> {
        lock(&self.requests).push(request);
        lock(&self.replies)
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

/// Replies with queued text, then echoes `{"echo": <user prompt>}`
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    requests: Mutex<Vec<LlmRequest>>,
    replies: Mutex<VecDeque<Result<String, UpstreamServiceError>>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        lock(&self.replies).push_back(Ok(text.into()));
        self
    }

    pub fn fail_with(self, error: UpstreamServiceError) -> Self {
        lock(&self.replies).push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn invoke(&self, request: LlmRequest) -> Result<String, UpstreamServiceError> {
        let echo = serde_json::json!({ "echo": request.user_prompt }).to_string();
        lock(&self.requests).push(request);
        lock(&self.replies).pop_front().unwrap_or(Ok(echo))
    }
}

/// Fakes bundled together, with handles kept for assertions
#[derive(Debug, Clone)]
pub struct MockCollaborators {
    pub credentials: Arc<InMemoryCredentialStore>,
    pub http: Arc<RecordingHttpSender>,
    pub llm: Arc<ScriptedLlmClient>,
}

impl Default for MockCollaborators {
    fn default() -> Self {
        Self::new(
            InMemoryCredentialStore::new(),
            RecordingHttpSender::new(),
            ScriptedLlmClient::new(),
        )
    }
}

impl MockCollaborators {
    pub fn new(
        credentials: InMemoryCredentialStore,
        http: RecordingHttpSender,
        llm: ScriptedLlmClient,
    ) -> Self {
        Self {
            credentials: Arc::new(credentials),
            http: Arc::new(http),
            llm: Arc::new(llm),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            credentials: self.credentials.clone(),
            http: self.http.clone(),
            llm: self.llm.clone(),
        }
    }
}
