//! Keyword-based intent detection for code questions.

use serde::{Deserialize, Serialize};

/// What a question asks the code index to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    CodeSearch,
    ExplainCode,
    FindImplementation,
    TraceDependencies,
    FindUsages,
    AnalyzeComplexity,
    SuggestRefactor,
    FindBugs,
    GenerateDocs,
    FindSimilarCode,
}

impl Capability {
    pub const ALL: [Capability; 10] = [
        Capability::CodeSearch,
        Capability::ExplainCode,
        Capability::FindImplementation,
        Capability::TraceDependencies,
        Capability::FindUsages,
        Capability::AnalyzeComplexity,
        Capability::SuggestRefactor,
        Capability::FindBugs,
        Capability::GenerateDocs,
        Capability::FindSimilarCode,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CodeSearch => "code_search",
            Self::ExplainCode => "explain_code",
            Self::FindImplementation => "find_implementation",
            Self::TraceDependencies => "trace_dependencies",
            Self::FindUsages => "find_usages",
            Self::AnalyzeComplexity => "analyze_complexity",
            Self::SuggestRefactor => "suggest_refactor",
            Self::FindBugs => "find_bugs",
            Self::GenerateDocs => "generate_docs",
            Self::FindSimilarCode => "find_similar_code",
        }
    }

    /// Lowercase phrases that signal this capability.
    #[must_use]
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::CodeSearch => &["find", "search", "locate", "where is", "show me"],
            Self::ExplainCode => &["explain", "how does", "what does", "understand", "describe"],
            Self::FindImplementation => {
                &["implementation", "implemented", "code for", "logic for"]
            }
            Self::TraceDependencies => {
                &["dependencies", "depends on", "uses", "imports", "requires"]
            }
            Self::FindUsages => &["used by", "calls", "references", "usage of"],
            Self::AnalyzeComplexity => &["complexity", "performance", "optimize", "slow"],
            Self::SuggestRefactor => &["refactor", "improve", "clean up", "better way"],
            Self::FindBugs => &["bug", "error", "issue", "problem", "broken", "not working"],
            Self::GenerateDocs => &["document", "docs", "documentation", "comments"],
            Self::FindSimilarCode => &["similar", "like this", "duplicate", "same as"],
        }
    }

    /// Path globs where code for this capability usually lives.
    #[must_use]
    pub fn file_hints(self) -> &'static [&'static str] {
        match self {
            Self::FindImplementation => &["**/services/**", "**/lib/**", "**/src/**"],
            Self::TraceDependencies => &["**/package.json", "**/requirements.txt", "**/go.mod"],
            Self::GenerateDocs => &["**/README.md", "**/docs/**"],
            _ => &[],
        }
    }

    /// Extra instruction appended to the completion system prompt.
    #[must_use]
    pub fn hint(self) -> &'static str {
        match self {
            Self::CodeSearch => "Point to where the relevant code lives.",
            Self::ExplainCode => "Walk through what the code does step by step.",
            Self::FindImplementation => "Identify the code that implements the behaviour asked about.",
            Self::TraceDependencies => "Describe what the code depends on and imports.",
            Self::FindUsages => "List where the code is called or referenced.",
            Self::AnalyzeComplexity => "Comment on complexity and performance hot spots.",
            Self::SuggestRefactor => "Suggest concrete refactorings.",
            Self::FindBugs => "Look for defects and error-prone logic.",
            Self::GenerateDocs => "Draft documentation for the code.",
            Self::FindSimilarCode => "Compare the snippets and note duplication.",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const STOP_WORDS: &[&str] = &[
    "what", "where", "how", "is", "are", "the", "a", "an", "in", "on", "for", "to", "of", "this",
    "that",
];

const MAX_SEARCH_TERMS: usize = 5;

/// Question keywords and the path globs they point at.
const FILE_PATTERNS: &[(&str, &[&str])] = &[
    ("component", &["**/components/**", "**/ui/**"]),
    ("service", &["**/services/**", "**/api/**"]),
    ("model", &["**/models/**", "**/entities/**"]),
    ("database", &["**/db/**", "**/migrations/**", "**/schema/**"]),
    ("auth", &["**/auth/**", "**/security/**"]),
    ("api", &["**/api/**", "**/routes/**", "**/controllers/**"]),
    ("test", &["**/*.test.*", "**/*.spec.*", "**/tests/**"]),
    ("config", &["**/config/**", "**/*.config.*"]),
    ("util", &["**/utils/**", "**/helpers/**", "**/lib/**"]),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryIntent {
    /// Never empty; defaults to `code_search`.
    pub capabilities: Vec<Capability>,
    pub search_terms: Vec<String>,
    /// Keyword globs followed by capability hints, without duplicates.
    pub file_patterns: Vec<String>,
}

impl QueryIntent {
    /// Joined capability hints for the system prompt.
    #[must_use]
    pub fn prompt_hint(&self) -> String {
        self.capabilities
            .iter()
            .map(|c| c.hint())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Detect capabilities by keyword and extract search terms and path globs.
#[must_use]
pub fn analyze(question: &str) -> QueryIntent {
    let capabilities = detect_capabilities(question);
    let mut file_patterns = extract_file_patterns(question);
    for hint in capabilities.iter().flat_map(|c| c.file_hints()) {
        if !file_patterns.iter().any(|p| p == hint) {
            file_patterns.push((*hint).to_string());
        }
    }
    QueryIntent {
        capabilities,
        search_terms: extract_search_terms(question),
        file_patterns,
    }
}

#[must_use]
pub fn detect_capabilities(question: &str) -> Vec<Capability> {
    let lower = question.to_lowercase();
    let found: Vec<_> = Capability::ALL
        .into_iter()
        .filter(|c| c.keywords().iter().any(|k| lower.contains(k)))
        .collect();
    if found.is_empty() {
        vec![Capability::CodeSearch]
    } else {
        found
    }
}

/// Path globs for file-type keywords in `question` (`auth` → `**/auth/**`),
/// first occurrence order.
#[must_use]
pub fn extract_file_patterns(question: &str) -> Vec<String> {
    let lower = question.to_lowercase();
    let mut patterns: Vec<String> = Vec::new();
    for (keyword, globs) in FILE_PATTERNS {
        if !lower.contains(keyword) {
            continue;
        }
        for glob in *globs {
            if !patterns.iter().any(|p| p == glob) {
                patterns.push((*glob).to_string());
            }
        }
    }
    patterns
}

/// Quoted phrases verbatim, then up to five lowercase non-stop-words longer
/// than two characters.
#[must_use]
pub fn extract_search_terms(question: &str) -> Vec<String> {
    let quoted = question
        .split('"')
        .skip(1)
        .step_by(2)
        .map(str::to_string);

    let words = question
        .to_lowercase()
        .split_whitespace()
        .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(w))
        .take(MAX_SEARCH_TERMS)
        .map(str::to_string)
        .collect::<Vec<_>>();

    quoted.chain(words).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_code_search() {
        assert_eq!(detect_capabilities("tokenizer"), [Capability::CodeSearch]);
    }

    #[test]
    fn detects_multiple_capabilities_in_table_order() {
        let caps = detect_capabilities("Explain why the login is so slow");
        assert_eq!(caps, [Capability::ExplainCode, Capability::AnalyzeComplexity]);
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        assert!(detect_capabilities("Where Is the config loader").contains(&Capability::CodeSearch));
        assert!(detect_capabilities("there's a BUG in parsing").contains(&Capability::FindBugs));
    }

    #[test]
    fn search_terms_drop_stop_words_and_short_words() {
        let terms = extract_search_terms("Where is the retry logic for an upload?");
        assert_eq!(terms, ["retry", "logic", "upload?"]);
    }

    #[test]
    fn quoted_phrases_come_first() {
        let terms = extract_search_terms(r#"find "parse_config" and "load env" usage"#);
        assert_eq!(terms[..2], ["parse_config", "load env"]);
        assert!(terms.contains(&"find".to_string()));
    }

    #[test]
    fn unquoted_terms_capped_at_five() {
        let terms = extract_search_terms("alpha bravo charlie delta echo foxtrot golf");
        assert_eq!(terms.len(), 5);
        assert_eq!(terms.last().map(String::as_str), Some("echo"));
    }

    #[test]
    fn analyze_builds_prompt_hint() {
        let intent = analyze("refactor the session cache");
        assert_eq!(intent.capabilities, [Capability::SuggestRefactor]);
        assert_eq!(intent.prompt_hint(), "Suggest concrete refactorings.");
    }

    #[test]
    fn keywords_map_to_path_globs() {
        let patterns = extract_file_patterns("How does the Auth API check tokens?");
        assert_eq!(
            patterns,
            [
                "**/auth/**",
                "**/security/**",
                "**/api/**",
                "**/routes/**",
                "**/controllers/**",
            ]
        );
        assert!(extract_file_patterns("rotate the ledger").is_empty());
    }

    #[test]
    fn shared_globs_listed_once() {
        // "service" and "api" both point at **/api/**.
        let patterns = extract_file_patterns("payment service api");
        assert_eq!(patterns.iter().filter(|p| *p == "**/api/**").count(), 1);
    }

    #[test]
    fn capability_hints_follow_keyword_globs() {
        let intent = analyze("show the implementation of the util helpers");
        assert!(intent.capabilities.contains(&Capability::FindImplementation));
        assert_eq!(
            intent.file_patterns,
            [
                "**/utils/**",
                "**/helpers/**",
                "**/lib/**",
                "**/services/**",
                "**/src/**",
            ]
        );
        assert!(Capability::CodeSearch.file_hints().is_empty());
    }

    #[test]
    fn capability_serializes_snake_case() {
        let json = serde_json::to_string(&Capability::FindSimilarCode).unwrap();
        assert_eq!(json, "\"find_similar_code\"");
    }
}
