//! Quality rules applied to checkpoint output.
//!
//! Rules are pure: the same text always yields the same verdict.

/// One quality check. Returns a reason per problem found; empty means pass.
pub trait Rule: Send + Sync {
    fn name(&self) -> &str;

    fn check(&self, text: &str) -> Vec<String>;
}

/// Outcome of running a [`RuleSet`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Verdict {
    /// Reasons in rule order, then in each rule's own order
    pub reasons: Vec<String>,
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        self.reasons.is_empty()
    }

    pub fn joined_reasons(&self) -> String {
        self.reasons.join("; ")
    }
}

/// Reject text shorter than a character threshold (after trimming).
#[derive(Debug, Clone)]
pub struct MinLength {
    pub min_chars: usize,
}

impl Rule for MinLength {
    fn name(&self) -> &str {
        "min_length"
    }

    fn check(&self, text: &str) -> Vec<String> {
        let len = text.trim().chars().count();
        if len < self.min_chars {
            vec![format!(
                "too brief ({} characters, minimum {})",
                len, self.min_chars
            )]
        } else {
            Vec::new()
        }
    }
}

/// Every keyword must appear somewhere (case-insensitive substring).
#[derive(Debug, Clone)]
pub struct RequiredKeywords {
    pub keywords: Vec<String>,
}

impl RequiredKeywords {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
        }
    }
}

impl Rule for RequiredKeywords {
    fn name(&self) -> &str {
        "required_keywords"
    }

    fn check(&self, text: &str) -> Vec<String> {
        let haystack = text.to_lowercase();
        self.keywords
            .iter()
            .filter(|k| !haystack.contains(&k.to_lowercase()))
            .map(|k| format!("missing required topic: {}", k))
            .collect()
    }
}

/// At least one line must be dedicated to a topic: after list or heading markup, the
/// line starts with the topic word.
#[derive(Debug, Clone)]
pub struct TopicLine {
    pub topic: String,
}

impl TopicLine {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
        }
    }

    fn line_matches(&self, line: &str) -> bool {
        let stripped = line
            .trim_start_matches(|c: char| {
                c.is_whitespace() || c.is_ascii_digit() || "#*-_.>)".contains(c)
            })
            .to_lowercase();
        let topic = self.topic.to_lowercase();
        match stripped.strip_prefix(&topic) {
            Some(rest) => !rest.starts_with(|c: char| c.is_alphanumeric()),
            None => false,
        }
    }
}

impl Rule for TopicLine {
    fn name(&self) -> &str {
        "topic_line"
    }

    fn check(&self, text: &str) -> Vec<String> {
        if text.lines().any(|line| self.line_matches(line)) {
            Vec::new()
        } else {
            vec![format!("no line dedicated to {}", self.topic)]
        }
    }
}

/// An ordered collection of rules.
#[derive(Default)]
pub struct RuleSet {
    rules: Vec<Box<dyn Rule>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, rule: impl Rule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Default checks for a structural analysis.
    pub fn structural_analysis() -> Self {
        Self::new()
            .with_rule(MinLength { min_chars: 100 })
            .with_rule(RequiredKeywords::new([
                "genre",
                "conflict",
                "stakes",
                "protagonist",
            ]))
            .with_rule(TopicLine::new("stakes"))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn validate(&self, text: &str) -> Verdict {
        Verdict {
            reasons: self.rules.iter().flat_map(|r| r.check(text)).collect(),
        }
    }
}

impl std::fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|r| r.name()))
            .finish()
    }
}
