//! Scripted provider for orchestrator and agent tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mindrelay_core::error::ProviderError;
use mindrelay_core::provider::*;
use tokio::sync::mpsc;

/// What the next call does.
#[derive(Debug, Clone)]
pub enum Script {
    Reply(&'static str),
    Stream(Vec<&'static str>),
    /// Streams these deltas, then breaks off mid-stream.
    Partial(Vec<&'static str>),
    Fail,
    /// Never resolves.
    Hang,
}

#[derive(Debug, Default)]
pub struct Calls {
    models: Mutex<Vec<String>>,
    requests: Mutex<Vec<ChatRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    listings: AtomicUsize,
}

impl Calls {
    pub fn count(&self) -> usize {
        self.models.lock().unwrap().len()
    }

    pub fn models(&self) -> Vec<String> {
        self.models.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn listings(&self) -> usize {
        self.listings.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self, request: &ChatRequest) {
        self.models.lock().unwrap().push(request.model.clone());
        self.requests.lock().unwrap().push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ScriptedProvider {
    script: Mutex<VecDeque<Script>>,
    calls: Arc<Calls>,
    hang_listing: bool,
}

/// A provider that plays `script` in order and fails once it runs out.
pub fn scripted(script: Vec<Script>) -> (Arc<dyn Provider>, Arc<Calls>) {
    build(script, false)
}

/// Like [`scripted`], but `list_models` never returns.
pub fn scripted_with_hung_listing(script: Vec<Script>) -> (Arc<dyn Provider>, Arc<Calls>) {
    build(script, true)
}

fn build(script: Vec<Script>, hang_listing: bool) -> (Arc<dyn Provider>, Arc<Calls>) {
    let calls = Arc::new(Calls::default());
    let provider = ScriptedProvider {
        script: Mutex::new(script.into()),
        calls: Arc::clone(&calls),
        hang_listing,
    };
    (Arc::new(provider), calls)
}

impl ScriptedProvider {
    fn next(&self) -> Script {
        self.script.lock().unwrap().pop_front().unwrap_or(Script::Fail)
    }
}

fn injected() -> ProviderError {
    ProviderError::ApiError {
        status_code: 500,
        message: "injected failure".into(),
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.calls.enter(&request);
        let step = self.next();
        // Give a concurrent caller the chance to overlap.
        tokio::task::yield_now().await;

        let result = match step {
            Script::Reply(text) => Ok(text.to_string()),
            Script::Stream(parts) => Ok(parts.concat()),
            Script::Partial(_) | Script::Fail => Err(injected()),
            Script::Hang => never().await,
        };
        self.calls.leave();

        result.map(|content| ChatResponse {
            content,
            usage: None,
            model: request.model,
        })
    }

    async fn stream(&self, request: ChatRequest) -> Result<ChunkReceiver, ProviderError> {
        self.calls.enter(&request);
        let step = self.next();
        tokio::task::yield_now().await;

        let (parts, interrupted): (Vec<&str>, bool) = match step {
            Script::Reply(text) => (vec![text], false),
            Script::Stream(parts) => (parts, false),
            Script::Partial(parts) => (parts, true),
            Script::Fail => {
                self.calls.leave();
                return Err(injected());
            }
            Script::Hang => never().await,
        };
        self.calls.leave();

        let (tx, rx) = mpsc::channel(parts.len() + 1);
        for part in parts {
            let _ = tx.try_send(Ok(StreamChunk::delta(part)));
        }
        let last = if interrupted {
            Err(ProviderError::StreamInterrupted("connection reset".into()))
        } else {
            Ok(StreamChunk::finished())
        };
        let _ = tx.try_send(last);
        Ok(rx)
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        self.calls.listings.fetch_add(1, Ordering::SeqCst);
        if self.hang_listing {
            return never().await;
        }
        Ok(Vec::new())
    }
}

async fn never<T>() -> T {
    std::future::pending().await
}
