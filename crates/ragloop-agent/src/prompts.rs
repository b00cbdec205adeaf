use ragloop_core::types::Document;

use crate::graph::ReactStep;

/// Prepended to answers produced without any verified relevant source.
pub const LOW_CONFIDENCE_CAVEAT: &str =
    "[Low confidence] No verified relevant source was found; this answer may be incomplete.\n\n";

/// Returned in place of an answer when generation fails.
pub const UNAVAILABLE_ANSWER: &str =
    "Sorry, I am temporarily unable to answer this question. Please try again later.";

pub fn analyze(question: &str) -> String {
    format!(
        "You are routing questions for a document question-answering assistant.\n\
         Decide whether answering the question requires looking up the document corpus.\n\
         Greetings, small talk and questions about the assistant itself do not.\n\
         Anything that asks about facts, people, places or events in the documents does.\n\n\
         Question: {question}\n\n\
         Reply with exactly one word: retrieve or respond_directly."
    )
}

pub fn grade(question: &str, document: &Document) -> String {
    format!(
        "You are grading whether a retrieved passage helps answer a question.\n\
         It is relevant if it contains keywords or meaning related to the question.\n\
         It does not need to answer the question completely.\n\n\
         Passage ({source}):\n{content}\n\n\
         Question: {question}\n\n\
         Reply with JSON only: {{\"relevant\": true}} or {{\"relevant\": false}}.",
        source = document.source_label(),
        content = document.content,
    )
}

pub fn rewrite(original: &str, current: &str) -> String {
    format!(
        "A search over the document corpus with the query below returned nothing useful.\n\
         Rewrite the query so a semantic search is more likely to find relevant passages.\n\
         Keep the intent of the original question. Use names and concrete terms.\n\n\
         Original question: {original}\n\
         Failed query: {current}\n\n\
         Reply with only the rewritten question on a single line."
    )
}

/// Generator prompt. `context` empty means the question is answered
/// without retrieval.
pub fn generate(question: &str, context: &[&Document]) -> String {
    if context.is_empty() {
        return format!(
            "You are a helpful assistant for a document question-answering system.\n\
             Answer the user directly and concisely.\n\n\
             Question: {question}"
        );
    }

    let passages = context
        .iter()
        .enumerate()
        .map(|(i, doc)| format!("[{}] ({})\n{}", i + 1, doc.source_label(), doc.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Answer the question using the passages below. Cite passages as [n].\n\
         If the passages do not contain the answer, say so instead of guessing.\n\n\
         Passages:\n{passages}\n\n\
         Question: {question}"
    )
}

/// Returned when the reasoning agent still gives no answer after being forced to.
pub const REACT_NO_ANSWER: &str =
    "Sorry, I could not reach an answer within the allowed number of steps.";

/// Reasoning-agent prompt. `history` holds the rounds so far; `force_answer`
/// demands an answer now.
pub fn react(question: &str, max_steps: u32, history: &[ReactStep], force_answer: bool) -> String {
    let mut rounds = String::new();
    for step in history {
        rounds.push_str(&format!(
            "Thought: {}\nAction: {}\nAction Input: {}\nObservation: {}\n\n",
            step.thought, step.action, step.input, step.observation
        ));
    }
    if force_answer {
        rounds.push_str("You must give the final answer now, using the Answer: format.\n\n");
    }

    format!(
        "You are a question-answering assistant for a document corpus using the ReAct \
         (Reasoning and Acting) method.\n\
         Work in a loop of Thought, Action and Observation, then finish with an Answer.\n\n\
         Available tool:\n\
         - retrieve: search the documents. Its input is a search query.\n\n\
         Reply in exactly one of these formats.\n\n\
         To search:\n\
         Thought: <why you need to search and what for>\n\
         Action: retrieve\n\
         Action Input: <search query>\n\n\
         To answer:\n\
         Thought: <why you can answer now>\n\
         Answer: <the final answer, at most three sentences>\n\n\
         Rules:\n\
         - One Thought per reply, followed by one Action or one Answer.\n\
         - After an Action, wait for its Observation.\n\
         - Use at most {max_steps} Actions, then answer.\n\
         - Base the Answer on the Observations. If they are not enough, say you do not know.\n\n\
         Question: {question}\n\n\
         {rounds}\
         Begin!"
    )
}

/// Observation text for a `retrieve` action.
pub fn observation(docs: &[Document]) -> String {
    if docs.is_empty() {
        return "No relevant information found.".to_string();
    }
    docs.iter()
        .enumerate()
        .map(|(i, doc)| format!("[passage {}] ({})\n{}", i + 1, doc.source_label(), doc.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}
