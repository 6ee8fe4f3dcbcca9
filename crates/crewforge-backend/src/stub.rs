//! Scripted generator backend for tests.
//!
//! `StubBackend` plays back a fixed script of responses and records every
//! invocation it receives, so engine tests can assert both what was sent
//! and how failure handling reacted to what came back. No network, no
//! credentials.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crewforge_utils::error::GeneratorError;

use crate::types::{GeneratorBackend, GeneratorInvocation, GeneratorResult};

/// Generator backend that plays back a pre-recorded script.
pub struct StubBackend {
    script: Mutex<VecDeque<Result<String, GeneratorError>>>,
    calls: Arc<Mutex<Vec<GeneratorInvocation>>>,
    delay: Option<Duration>,
}

impl StubBackend {
    /// Create a stub that answers calls with `script` entries in order.
    #[must_use]
    pub fn with_script(script: Vec<Result<String, GeneratorError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }

    /// Delay every call by `delay` before answering; lets tests exercise
    /// call timeouts and cancellation deterministically.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared handle to the recorded invocations.
    #[must_use]
    pub fn call_log(&self) -> Arc<Mutex<Vec<GeneratorInvocation>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl GeneratorBackend for StubBackend {
    async fn invoke(&self, inv: GeneratorInvocation) -> Result<GeneratorResult, GeneratorError> {
        self.calls.lock().unwrap().push(inv.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(text)) => Ok(GeneratorResult::new(text, "stub", inv.model)),
            Some(Err(e)) => Err(e),
            None => Err(GeneratorError::Transport(
                "stub script exhausted".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    #[tokio::test]
    async fn plays_back_script_in_order() {
        let stub = StubBackend::with_script(vec![
            Ok("first".to_string()),
            Err(GeneratorError::Transport("boom".to_string())),
        ]);

        let inv = GeneratorInvocation::new(
            "stage",
            "model",
            Duration::from_secs(1),
            vec![Message::user("hello")],
        );

        let first = stub.invoke(inv.clone()).await.unwrap();
        assert_eq!(first.text, "first");
        assert_eq!(first.provider, "stub");

        let second = stub.invoke(inv.clone()).await.unwrap_err();
        assert!(matches!(second, GeneratorError::Transport(_)));

        // Script exhausted.
        let third = stub.invoke(inv).await.unwrap_err();
        assert!(third.to_string().contains("exhausted"));
    }

    #[tokio::test]
    async fn records_invocations() {
        let stub = StubBackend::with_script(vec![Ok("ok".to_string())]);
        let calls = stub.call_log();

        let inv = GeneratorInvocation::new(
            "requirements",
            "model",
            Duration::from_secs(1),
            vec![Message::system("narrative"), Message::user("instructions")],
        );
        stub.invoke(inv).await.unwrap();

        let recorded = calls.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].stage, "requirements");
        assert_eq!(recorded[0].messages.len(), 2);
    }
}
