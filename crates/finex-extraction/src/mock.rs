use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use finex_core::error::{ProviderError, Result};

use crate::provider::{ChatProvider, ExtractionRequest};

/// A provider that replays scripted answers and records every request.
///
/// Scripted entries are consumed in order; once they run out, the repeating
/// response (if any) is returned for every further call.
#[derive(Default)]
pub struct MockProvider {
    script: Mutex<VecDeque<std::result::Result<String, ProviderError>>>,
    repeat: Option<String>,
    requests: Mutex<Vec<ExtractionRequest>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, response: impl Into<String>) -> Self {
        self.push(Ok(response.into()))
    }

    pub fn with_error(self, error: ProviderError) -> Self {
        self.push(Err(error))
    }

    pub fn repeating(mut self, response: impl Into<String>) -> Self {
        self.repeat = Some(response.into());
        self
    }

    fn push(self, entry: std::result::Result<String, ProviderError>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(entry);
        }
        self
    }

    pub fn requests(&self) -> Vec<ExtractionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &ExtractionRequest) -> Result<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match (next, &self.repeat) {
            (Some(entry), _) => entry.map_err(Into::into),
            (None, Some(repeat)) => Ok(repeat.clone()),
            (None, None) => Ok("{}".to_string()),
        }
    }
}
