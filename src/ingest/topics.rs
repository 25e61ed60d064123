//! Keyword topic detection

/// Fixed vocabulary of development topics
const TOPICS: &[&str] = &[
    "authentication", "auth", "login", "jwt", "oauth",
    "testing", "test", "unit test", "integration test",
    "bug", "fix", "error", "issue", "debug",
    "performance", "optimization", "optimize", "slow",
    "refactor", "refactoring", "cleanup",
    "feature", "implement", "add", "create",
    "database", "sql", "query", "schema",
    "api", "endpoint", "rest", "graphql",
    "typescript", "javascript", "react", "node",
    "css", "style", "styling", "tailwind",
    "security", "vulnerability", "xss", "csrf",
    "deploy", "deployment", "ci/cd", "docker",
];

const MAX_TOPICS: usize = 10;

/// Topics whose keyword occurs in `text` (case-insensitive substring
/// match), in vocabulary order, at most ten.
pub fn detect_topics(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TOPICS
        .iter()
        .filter(|topic| lower.contains(*topic))
        .take(MAX_TOPICS)
        .map(|topic| topic.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_topics() {
        let topics = detect_topics("Add OAuth login and a Docker deployment");
        assert_eq!(topics, vec!["auth", "login", "oauth", "add", "deploy", "deployment", "docker"]);
    }

    #[test]
    fn test_no_topics() {
        assert!(detect_topics("hello there").is_empty());
    }

    #[test]
    fn test_topic_cap() {
        let text = TOPICS.join(" ");
        assert_eq!(detect_topics(&text).len(), MAX_TOPICS);
    }
}
