//! Prompt templates shared by the summarizer, test-set generator and
//! answer generator. The offline chat model keys off the system prompts.

pub const SUMMARY_SYSTEM: &str = "You write short factual summaries of document passages for a search index.";
pub const TESTSET_SYSTEM: &str =
    "You write one evaluation question about a passage. Reply with JSON: {\"question\": ..., \"ground_truth\": ...}.";
pub const ANSWER_SYSTEM: &str = "You answer questions using only the provided context. Say so if the context is insufficient.";

pub const TEXT_MARKER: &str = "Text:\n";
pub const CONTEXT_MARKER: &str = "Context:\n";
pub const QUESTION_MARKER: &str = "\n\nQuestion:";
pub const CONTEXT_SEPARATOR: &str = "\n---\n";

pub fn summary_prompt(text: &str, max_words: usize) -> String {
    format!("Summarize the text in at most {max_words} words.\n\n{TEXT_MARKER}{text}")
}

pub fn testset_prompt(text: &str) -> String {
    format!("Write a question answerable from the text and its answer.\n\n{TEXT_MARKER}{text}")
}

pub fn answer_prompt(question: &str, contexts: &[String]) -> String {
    format!("{CONTEXT_MARKER}{}{QUESTION_MARKER} {question}", contexts.join(CONTEXT_SEPARATOR))
}

/// Text following `TEXT_MARKER`, or the whole prompt when absent.
pub fn body_of(prompt: &str) -> &str {
    prompt.split_once(TEXT_MARKER).map_or(prompt, |(_, body)| body)
}

/// Context block and question of an answer prompt.
pub fn split_answer_prompt(prompt: &str) -> (&str, &str) {
    let rest = prompt.strip_prefix(CONTEXT_MARKER).unwrap_or(prompt);
    match rest.rsplit_once(QUESTION_MARKER) {
        Some((ctx, q)) => (ctx, q.trim()),
        None => (rest, ""),
    }
}
