//! Prompt assembly for first-turn and follow-up questions.

use glimpse_rs_memory::ScoredMemory;

/// Render the first-turn prompt: question, recalled notes, then the page text
/// cut to `context_chars` characters.
pub fn first_turn_prompt(
    question: &str,
    page_context: &str,
    memories: &[ScoredMemory],
    context_chars: usize,
) -> String {
    let context: String = page_context.chars().take(context_chars).collect();
    format!(
        "Based on the following page content, please answer this question concisely:\n\n\
         Question: {question}\n\n{}Page Context:\n{context}",
        memory_block(memories)
    )
}

/// Notes section injected ahead of the page context; empty without memories.
pub fn memory_block(memories: &[ScoredMemory]) -> String {
    if memories.is_empty() {
        return String::new();
    }
    let mut block = String::from("Relevant notes from your memory:\n");
    for memory in memories {
        block.push_str(&format!(
            "- [saved from {}] {}\n",
            memory.record.source_url, memory.record.text
        ));
    }
    block.push('\n');
    block
}
