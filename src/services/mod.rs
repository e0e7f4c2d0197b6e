/// External collaborators used by node handlers
///
/// Each concern sits behind a trait so the engine can run against real services in
/// production and against `mock` fakes in tests.

pub mod credentials;
pub mod http;
pub mod llm;
pub mod mail;
pub mod mock;

use std::sync::Arc;

pub use credentials::{Credential, CredentialStore, SqliteCredentialStore};
pub use http::{HttpCall, HttpRequest, HttpResponse, HttpSender, ReqwestSender};
pub use llm::{ChatCompletionsClient, LlmClient, LlmProvider, LlmRequest};

/// Handles to every collaborator a node may call
#[derive(Clone)]
pub struct Collaborators {
    pub credentials: Arc<dyn CredentialStore>,
    pub http: Arc<dyn HttpSender>,
    pub llm: Arc<dyn LlmClient>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
