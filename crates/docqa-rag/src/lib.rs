//! docqa RAG - Retrieval-augmented question answering over single documents
//!
//! This crate wires the pipeline together:
//! - `DocumentQaService` normalizes, chunks and indexes document text,
//!   and answers questions from the chunks retrieved for them
//! - `ContextAnswerer` constrains the language model to retrieved context
//! - LLM clients for OpenAI-compatible and Ollama backends
//! - A moka-backed cache for query embeddings
//!
//! Author: hephaex@gmail.com

use docqa_core::Prompt;

pub mod answer;
pub mod cache;
pub mod llm;
pub mod pipeline;

pub use answer::{ContextAnswerer, INSUFFICIENT_CONTEXT_REPLY, NO_CONTEXT_MESSAGE};
pub use cache::{CacheConfig, CacheStats, CacheStatsReport, CachedEmbeddingClient, EmbeddingCache};
pub use llm::{create_llm_client, OllamaClient, OpenAiClient};
pub use pipeline::{AnswerSource, DocumentQaService, QaAnswer};

// ============================================================================
// Prompt Templates
// ============================================================================

/// Builder for structured prompts
///
/// System instructions go to the system turn; context, question and
/// instructions are laid out as tagged sections of the user turn.
pub struct PromptBuilder {
    system_instruction: String,
    context_sections: Vec<String>,
    question: String,
    instructions: Vec<String>,
}

impl PromptBuilder {
    /// Create a new prompt builder
    pub fn new() -> Self {
        Self {
            system_instruction: String::new(),
            context_sections: Vec::new(),
            question: String::new(),
            instructions: Vec::new(),
        }
    }

    /// Set system instruction
    pub fn system(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    /// Add a context section
    pub fn add_context(mut self, context: impl Into<String>) -> Self {
        self.context_sections.push(context.into());
        self
    }

    /// Set the question
    pub fn question(mut self, q: impl Into<String>) -> Self {
        self.question = q.into();
        self
    }

    /// Add an instruction
    pub fn add_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instructions.push(instruction.into());
        self
    }

    /// Build the final prompt
    ///
    /// Context sections are separated by a blank line.
    pub fn build(self) -> Prompt {
        let mut user = String::new();

        if !self.context_sections.is_empty() {
            user.push_str("<context>\n");
            user.push_str(&self.context_sections.join("\n\n"));
            user.push_str("\n</context>\n\n");
        }

        if !self.question.is_empty() {
            user.push_str("<question>\n");
            user.push_str(&self.question);
            user.push_str("\n</question>\n\n");
        }

        if !self.instructions.is_empty() {
            user.push_str("<instructions>\n");
            for (i, inst) in self.instructions.iter().enumerate() {
                user.push_str(&format!("{}. {}\n", i + 1, inst));
            }
            user.push_str("</instructions>\n");
        }

        Prompt::new(self.system_instruction, user.trim_end())
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
