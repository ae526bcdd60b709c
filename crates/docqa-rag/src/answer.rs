//! Context-constrained answer generation
//!
//! The model only ever sees the retrieved chunks and is told to say so when
//! they are not enough. Generation failures are not propagated: the caller
//! gets a [`AnswerOutcome::Degraded`] carrying an excerpt of the best chunk.

use std::sync::Arc;
use std::time::Duration;

use docqa_core::{AnswerOutcome, DocQaError, LlmClient, Prompt};

use crate::PromptBuilder;

/// Returned verbatim when retrieval produced no context
pub const NO_CONTEXT_MESSAGE: &str =
    "I don't have enough information in the uploaded document to answer that question.";

/// Phrase the model is instructed to use when the context is insufficient
pub const INSUFFICIENT_CONTEXT_REPLY: &str =
    "The document doesn't contain enough information to fully answer this question";

/// Maximum number of contexts placed in the prompt
pub const DEFAULT_MAX_CONTEXTS: usize = 5;

/// Length of the excerpt returned with a degraded answer
pub const DEFAULT_EXCERPT_CHARS: usize = 300;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const SYSTEM_PROMPT: &str = "You are an expert document analyst. Answer questions using ONLY \
the information in the supplied document context.";

const RULES: &[&str] = &[
    "Extract and synthesize information directly from the context.",
    "Quote or paraphrase the document's wording when relevant.",
    "Do not add external knowledge or information that is not in the context.",
    "Use every relevant detail from the context and organize the answer clearly.",
];

/// Answers questions strictly from supplied context
pub struct ContextAnswerer {
    llm: Arc<dyn LlmClient>,
    max_contexts: usize,
    excerpt_chars: usize,
    timeout: Duration,
}

impl ContextAnswerer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            max_contexts: DEFAULT_MAX_CONTEXTS,
            excerpt_chars: DEFAULT_EXCERPT_CHARS,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_max_contexts(mut self, max_contexts: usize) -> Self {
        self.max_contexts = max_contexts.max(1);
        self
    }

    pub fn with_excerpt_chars(mut self, excerpt_chars: usize) -> Self {
        self.excerpt_chars = excerpt_chars;
        self
    }

    /// Upper bound on a single generation call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Prompt for the first `max_contexts` contexts, in the order given
    pub fn build_prompt(&self, question: &str, contexts: &[String]) -> Prompt {
        let system = format!(
            "{SYSTEM_PROMPT}\n\nIf the context lacks sufficient information, explicitly state: \
             \"{INSUFFICIENT_CONTEXT_REPLY}\"."
        );

        let builder = contexts
            .iter()
            .take(self.max_contexts)
            .fold(PromptBuilder::new().system(system), |b, c| b.add_context(c.as_str()));

        RULES
            .iter()
            .fold(builder.question(question), |b, rule| b.add_instruction(*rule))
            .build()
    }

    /// Answer `question` from `contexts`
    ///
    /// Empty `contexts` short-circuits to [`NO_CONTEXT_MESSAGE`] without
    /// calling the model.
    pub async fn answer(&self, question: &str, contexts: &[String]) -> AnswerOutcome {
        let Some(best) = contexts.first() else {
            return AnswerOutcome::NoContext {
                text: NO_CONTEXT_MESSAGE.to_string(),
            };
        };

        let prompt = self.build_prompt(question, contexts);

        match self.generate(&prompt).await {
            Ok(text) => AnswerOutcome::Answered { text },
            Err(e) => {
                let reason = match e {
                    DocQaError::GenerationFailure(reason) => reason,
                    other => other.to_string(),
                };
                tracing::warn!(
                    model = self.llm.model(),
                    error = %reason,
                    "Answer generation failed, returning context excerpt"
                );

                let excerpt: String = best.chars().take(self.excerpt_chars).collect();
                AnswerOutcome::Degraded {
                    text: format!(
                        "Error generating answer: {reason}\n\nRelevant context:\n{excerpt}..."
                    ),
                    reason,
                }
            }
        }
    }

    async fn generate(&self, prompt: &Prompt) -> docqa_core::Result<String> {
        let text = tokio::time::timeout(self.timeout, self.llm.generate(prompt))
            .await
            .map_err(|_| {
                DocQaError::GenerationFailure(format!(
                    "generation timed out after {}s",
                    self.timeout.as_secs_f32()
                ))
            })??;

        let text = text.trim();
        if text.is_empty() {
            return Err(DocQaError::GenerationFailure(
                "model returned an empty answer".to_string(),
            ));
        }
        Ok(text.to_string())
    }
}
