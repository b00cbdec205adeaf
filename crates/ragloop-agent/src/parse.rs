//! Lenient parsing of model replies for the decision nodes.
//!
//! Every parser returns `None` when the reply is ambiguous; callers decide
//! the safe default.

use serde::Deserialize;

use crate::graph::QueryRoute;

/// Drop `<think>...</think>` blocks emitted by reasoning models.
pub fn strip_reasoning(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<think>") {
        out.push_str(&rest[..start]);
        match rest[start..].find("</think>") {
            Some(end) => rest = &rest[start + end + "</think>".len()..],
            // Unclosed block: everything after it is reasoning.
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

/// Extract a JSON object from a reply that may wrap it in code fences or prose.
pub fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end > start {
                return &trimmed[start..=end];
            }
        }
    }
    trimmed
}

#[derive(Deserialize)]
struct RouteReply {
    #[serde(alias = "route", alias = "decision")]
    action: String,
}

#[derive(Deserialize)]
struct RelevanceReply {
    #[serde(alias = "binary_score", alias = "score")]
    relevant: RelevanceValue,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RelevanceValue {
    Bool(bool),
    Text(String),
}

fn route_from_label(label: &str) -> Option<QueryRoute> {
    let label = label.trim().to_lowercase();
    let direct = label.contains("respond_directly") || label.contains("respond directly");
    let retrieve = label.contains("retrieve");
    match (direct, retrieve) {
        (true, false) => Some(QueryRoute::RespondDirectly),
        (false, true) => Some(QueryRoute::Retrieve),
        _ => None,
    }
}

/// Parse the analyzer's reply into a route.
pub fn parse_route(reply: &str) -> Option<QueryRoute> {
    let reply = strip_reasoning(reply);
    if let Ok(parsed) = serde_json::from_str::<RouteReply>(extract_json(&reply)) {
        return route_from_label(&parsed.action);
    }
    route_from_label(&reply)
}

fn relevance_from_text(text: &str) -> Option<bool> {
    let text = text.trim().to_lowercase();
    let text = text.trim_matches(|c: char| !c.is_alphanumeric() && c != ' ');
    if text.is_empty() {
        return None;
    }
    if text.contains("not relevant") || text.contains("irrelevant") {
        return Some(false);
    }
    let first = text.split_whitespace().next().unwrap_or("");
    match first {
        "no" | "false" => Some(false),
        "yes" | "true" => Some(true),
        _ if text.contains("relevant") => Some(true),
        _ => None,
    }
}

/// Parse a grader reply into a verdict.
pub fn parse_relevance(reply: &str) -> Option<bool> {
    let reply = strip_reasoning(reply);
    if let Ok(parsed) = serde_json::from_str::<RelevanceReply>(extract_json(&reply)) {
        return match parsed.relevant {
            RelevanceValue::Bool(b) => Some(b),
            RelevanceValue::Text(s) => relevance_from_text(&s),
        };
    }
    relevance_from_text(&reply)
}

/// Clean up a rewritten question: drop reasoning, labels and quotes, and
/// keep the first non-empty line.
pub fn parse_rewrite(reply: &str) -> Option<String> {
    let reply = strip_reasoning(reply);
    let line = reply.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = ["Rewritten question:", "Question:", "Rewrite:"]
        .iter()
        .find_map(|prefix| line.strip_prefix(prefix))
        .unwrap_or(line)
        .trim();
    let line = line.trim_matches(|c: char| c == '"' || c == '\'' || c == '“' || c == '”');
    let line = line.trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

/// One reply of the reasoning agent.
#[derive(Debug, Clone, PartialEq)]
pub enum ReactTurn {
    Act {
        thought: String,
        action: String,
        input: String,
    },
    Answer {
        thought: String,
        answer: String,
    },
}

fn after_label<'a>(text: &'a str, label: &str) -> Option<&'a str> {
    text.find(label).map(|i| &text[i + label.len()..])
}

/// Parse a `Thought:` / `Action:` / `Action Input:` or `Thought:` / `Answer:`
/// reply. `None` when there is no usable thought.
pub fn parse_react(reply: &str) -> Option<ReactTurn> {
    let reply = strip_reasoning(reply);

    let rest = after_label(&reply, "Thought:")?;
    let end = ["\nAction:", "\nAnswer:"]
        .iter()
        .filter_map(|label| rest.find(label))
        .min()
        .unwrap_or(rest.len());
    let thought = rest[..end].trim().to_string();
    if thought.is_empty() {
        return None;
    }

    if let Some(answer) = after_label(&reply, "Answer:").map(str::trim) {
        if !answer.is_empty() {
            return Some(ReactTurn::Answer {
                thought,
                answer: answer.to_string(),
            });
        }
    }

    let action = after_label(&reply, "Action:")
        .map(|rest| {
            rest.trim_start()
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect::<String>()
        })
        .unwrap_or_default();
    let input = after_label(&reply, "Action Input:")
        .and_then(|rest| rest.trim_start().lines().next())
        .map(|line| line.trim().to_string())
        .unwrap_or_default();

    Some(ReactTurn::Act {
        thought,
        action,
        input,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_reasoning() {
        assert_eq!(strip_reasoning("<think>hmm</think>\nanswer"), "answer");
        assert_eq!(strip_reasoning("a<think>x</think>b<think>y</think>c"), "abc");
        assert_eq!(strip_reasoning("before<think>never closed"), "before");
        assert_eq!(strip_reasoning("plain"), "plain");
    }

    #[test]
    fn test_extract_json_from_code_fence() {
        let text = "Sure:\n```json\n{\"relevant\": true}\n```";
        assert_eq!(extract_json(text), "{\"relevant\": true}");
    }

    #[test]
    fn test_parse_route_variants() {
        assert_eq!(parse_route("retrieve"), Some(QueryRoute::Retrieve));
        assert_eq!(parse_route("RESPOND_DIRECTLY"), Some(QueryRoute::RespondDirectly));
        assert_eq!(
            parse_route(r#"{"action": "respond_directly"}"#),
            Some(QueryRoute::RespondDirectly)
        );
        assert_eq!(
            parse_route("<think>they greet me</think>respond_directly"),
            Some(QueryRoute::RespondDirectly)
        );
    }

    #[test]
    fn test_parse_route_ambiguous() {
        assert_eq!(parse_route("I cannot decide"), None);
        assert_eq!(parse_route("retrieve or respond_directly"), None);
        assert_eq!(parse_route(""), None);
    }

    #[test]
    fn test_parse_relevance_json() {
        assert_eq!(parse_relevance(r#"{"relevant": true}"#), Some(true));
        assert_eq!(parse_relevance(r#"{"relevant": false}"#), Some(false));
        assert_eq!(parse_relevance(r#"{"binary_score": "yes"}"#), Some(true));
    }

    #[test]
    fn test_parse_relevance_keywords() {
        assert_eq!(parse_relevance("yes"), Some(true));
        assert_eq!(parse_relevance("Yes."), Some(true));
        assert_eq!(parse_relevance("no"), Some(false));
        assert_eq!(parse_relevance("This document is not relevant."), Some(false));
        assert_eq!(parse_relevance("irrelevant"), Some(false));
        assert_eq!(parse_relevance("relevant"), Some(true));
    }

    #[test]
    fn test_parse_relevance_garbage() {
        assert_eq!(parse_relevance("maybe?"), None);
        assert_eq!(parse_relevance(""), None);
    }

    #[test]
    fn test_parse_rewrite() {
        assert_eq!(
            parse_rewrite("Rewritten question: \"Who forged the golden cudgel?\"\n"),
            Some("Who forged the golden cudgel?".to_string())
        );
        assert_eq!(
            parse_rewrite("<think>let me see</think>\n\nWhere is Flower Fruit Mountain?"),
            Some("Where is Flower Fruit Mountain?".to_string())
        );
        assert_eq!(parse_rewrite("   \n  "), None);
        assert_eq!(parse_rewrite("\"\""), None);
    }

    #[test]
    fn test_parse_react_action() {
        let reply = "Thought: I need the birth story.\n\
                     Action: retrieve\n\
                     Action Input: Sun Wukong born from stone\n";
        assert_eq!(
            parse_react(reply),
            Some(ReactTurn::Act {
                thought: "I need the birth story.".into(),
                action: "retrieve".into(),
                input: "Sun Wukong born from stone".into(),
            })
        );
    }

    #[test]
    fn test_parse_react_answer_after_reasoning_block() {
        let reply = "<think>draft</think>\n\
                     Thought: The passage says so.\n\
                     Answer: He was born from a stone egg.";
        assert_eq!(
            parse_react(reply),
            Some(ReactTurn::Answer {
                thought: "The passage says so.".into(),
                answer: "He was born from a stone egg.".into(),
            })
        );
    }

    #[test]
    fn test_parse_react_multiline_thought_and_unknown_action() {
        let reply = "Thought: first line\nsecond line\nAction: browse\nAction Input: web";
        match parse_react(reply) {
            Some(ReactTurn::Act {
                thought, action, ..
            }) => {
                assert_eq!(thought, "first line\nsecond line");
                assert_eq!(action, "browse");
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_parse_react_requires_thought() {
        assert_eq!(parse_react("Action: retrieve\nAction Input: x"), None);
        assert_eq!(parse_react("Thought:   \nAnswer: yes"), None);
        assert_eq!(parse_react("I do not know the format"), None);
    }
}
