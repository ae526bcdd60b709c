//! Answerer behavior against stub language models.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use docqa_core::{AnswerOutcome, DocQaError, LlmClient, Prompt, Result};
use docqa_rag::{ContextAnswerer, INSUFFICIENT_CONTEXT_REPLY, NO_CONTEXT_MESSAGE};

/// Records every prompt and replies with a fixed answer.
struct RecordingLlm {
    reply: String,
    prompts: Mutex<Vec<Prompt>>,
}

impl RecordingLlm {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn last_prompt(&self) -> Prompt {
        self.prompts.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl LlmClient for RecordingLlm {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.clone());
        Ok(self.reply.clone())
    }

    fn model(&self) -> &str {
        "recording"
    }
}

struct FailingLlm {
    calls: AtomicUsize,
}

#[async_trait]
impl LlmClient for FailingLlm {
    async fn generate(&self, _prompt: &Prompt) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(DocQaError::LlmError("upstream returned 503".to_string()))
    }

    fn model(&self) -> &str {
        "failing"
    }
}

struct SlowLlm;

#[async_trait]
impl LlmClient for SlowLlm {
    async fn generate(&self, _prompt: &Prompt) -> Result<String> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok("too late".to_string())
    }

    fn model(&self) -> &str {
        "slow"
    }
}

fn paris() -> Vec<String> {
    vec!["The capital of France is Paris.".to_string()]
}

fn recipes() -> Vec<String> {
    vec![
        "Whisk two eggs with a pinch of salt before folding in the flour.".to_string(),
        "Simmer the tomato sauce for twenty minutes, stirring occasionally.".to_string(),
    ]
}

#[tokio::test]
async fn test_empty_context_skips_model() {
    let llm = RecordingLlm::new("should not be used");
    let answerer = ContextAnswerer::new(llm.clone());

    let outcome = answerer.answer("What is the capital?", &[]).await;

    assert_eq!(
        outcome,
        AnswerOutcome::NoContext {
            text: NO_CONTEXT_MESSAGE.to_string()
        }
    );
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_answer_uses_context_verbatim() {
    let llm = RecordingLlm::new("  Paris.\n");
    let answerer = ContextAnswerer::new(llm.clone());

    let outcome = answerer
        .answer("What is the capital of France?", &paris())
        .await;

    assert_eq!(
        outcome,
        AnswerOutcome::Answered {
            text: "Paris.".to_string()
        }
    );
    let prompt = llm.last_prompt();
    assert!(prompt.user.contains("The capital of France is Paris."));
    assert!(prompt.user.contains("What is the capital of France?"));
    assert!(prompt.system.contains(INSUFFICIENT_CONTEXT_REPLY));
}

#[tokio::test]
async fn test_prompt_keeps_at_most_five_contexts_in_order() {
    let llm = RecordingLlm::new("ok");
    let answerer = ContextAnswerer::new(llm.clone());
    let contexts: Vec<String> = (1..=7).map(|i| format!("Context number {i}.")).collect();

    answerer.answer("Which contexts?", &contexts).await;

    let prompt = llm.last_prompt();
    for i in 1..=5 {
        assert!(prompt.user.contains(&format!("Context number {i}.")));
    }
    assert!(!prompt.user.contains("Context number 6."));
    assert!(!prompt.user.contains("Context number 7."));
    assert!(
        prompt.user.find("Context number 1.").unwrap()
            < prompt.user.find("Context number 2.").unwrap()
    );
    assert!(prompt
        .user
        .contains("Context number 1.\n\nContext number 2."));
}

#[tokio::test]
async fn test_max_contexts_is_configurable() {
    let llm = RecordingLlm::new("ok");
    let answerer = ContextAnswerer::new(llm.clone()).with_max_contexts(2);
    let contexts: Vec<String> = (1..=4).map(|i| format!("Context number {i}.")).collect();

    let prompt = answerer.build_prompt("q", &contexts);
    assert!(prompt.user.contains("Context number 2."));
    assert!(!prompt.user.contains("Context number 3."));
}

#[tokio::test]
async fn test_failure_degrades_with_excerpt() {
    let llm = Arc::new(FailingLlm {
        calls: AtomicUsize::new(0),
    });
    let answerer = ContextAnswerer::new(llm.clone());
    let long_context = "x".repeat(500);

    let outcome = answerer
        .answer("Anything?", &[long_context, "second".to_string()])
        .await;

    assert!(outcome.is_degraded());
    assert_eq!(llm.calls.load(Ordering::SeqCst), 1);

    let text = outcome.text();
    assert!(text.starts_with("Error generating answer: "));
    assert!(text.contains("upstream returned 503"));
    let expected_tail = format!("\n\nRelevant context:\n{}...", "x".repeat(300));
    assert!(text.ends_with(&expected_tail));
    assert!(!text.contains("second"));
}

#[tokio::test]
async fn test_blank_model_reply_degrades() {
    let llm = RecordingLlm::new("   \n");
    let answerer = ContextAnswerer::new(llm);

    let outcome = answerer.answer("What is the capital?", &paris()).await;

    match outcome {
        AnswerOutcome::Degraded { text, reason } => {
            assert!(reason.contains("empty"));
            assert!(text.contains("The capital of France is Paris."));
        }
        other => panic!("expected degraded outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn test_timeout_degrades() {
    let answerer =
        ContextAnswerer::new(Arc::new(SlowLlm)).with_timeout(Duration::from_millis(50));

    let outcome = answerer.answer("What is the capital?", &paris()).await;

    match outcome {
        AnswerOutcome::Degraded { reason, .. } => assert!(reason.contains("timed out")),
        other => panic!("expected degraded outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn test_excerpt_counts_characters() {
    let llm = Arc::new(FailingLlm {
        calls: AtomicUsize::new(0),
    });
    let answerer = ContextAnswerer::new(llm).with_excerpt_chars(3);

    let outcome = answerer.answer("q", &["été à Paris".to_string()]).await;
    assert!(outcome.text().ends_with("\n\nRelevant context:\nété..."));
}

#[tokio::test]
async fn test_unrelated_context_gets_insufficiency_reply() {
    let reply = format!("{INSUFFICIENT_CONTEXT_REPLY}.");
    let llm = RecordingLlm::new(&reply);
    let answerer = ContextAnswerer::new(llm.clone());

    let outcome = answerer
        .answer("What is the capital of France?", &recipes())
        .await;

    assert_eq!(outcome, AnswerOutcome::Answered { text: reply });
    assert_eq!(llm.calls(), 1);

    let prompt = llm.last_prompt();
    assert!(prompt.system.contains(INSUFFICIENT_CONTEXT_REPLY));
    assert!(prompt.user.contains(&recipes().join("\n\n")));
    assert!(prompt.user.contains("What is the capital of France?"));
    assert!(!prompt.user.contains("Paris"));
}
