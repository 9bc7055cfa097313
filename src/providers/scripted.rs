//! Deterministic generation capability.
//!
//! Replays a fixed list of responses and counts calls. Used by tests and by
//! `organize --dry-run` style flows that must not reach a real model.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::traits::{GenerationError, GenerationRequest, Generator};

/// One scripted reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedReply {
    /// Return this text.
    Text(String),
    /// Return this text after sleeping (for timeout tests).
    Delayed(String, Duration),
    /// Fail with this error.
    Fail(GenerationError),
}

/// Generator that replays scripted replies in order.
///
/// Once the queue is drained the last reply repeats. An empty script
/// reports the generator as unavailable.
#[derive(Debug)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<ScriptedReply>>,
    last: Mutex<Option<ScriptedReply>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    /// Create a generator from replies.
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with the same text.
    pub fn always(text: impl Into<String>) -> Self {
        Self::new(vec![ScriptedReply::Text(text.into())])
    }

    /// Answer with each text in turn, then repeat the last one.
    pub fn sequence<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            texts
                .into_iter()
                .map(|t| ScriptedReply::Text(t.into()))
                .collect(),
        )
    }

    /// Number of generate calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn next_reply(&self) -> Option<ScriptedReply> {
        let mut replies = self.replies.lock().ok()?;
        let mut last = self.last.lock().ok()?;
        if let Some(reply) = replies.pop_front() {
            *last = Some(reply);
        }
        last.clone()
    }
}

impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request.prompt.clone());
        }

        match self.next_reply() {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Delayed(text, delay)) => {
                std::thread::sleep(delay);
                Ok(text)
            }
            Some(ScriptedReply::Fail(err)) => Err(err),
            None => Err(GenerationError::Unavailable("no scripted replies".to_string())),
        }
    }
}
