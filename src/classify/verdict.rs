//! Turning free-form model answers into verdicts.

use once_cell::sync::Lazy;
use regex::Regex;

/// Canonical negative answer.
pub const NO: &str = "No";

/// Answers that mean "no match" however they are phrased.
const NEGATIVE_EXACT: &[&str] = &["no", "none", "no match", "no match detected"];

const NEGATIVE_PHRASES: &[&str] = &[
    "does not contain",
    "not contain any",
    "no match is detected",
    "no match was found",
    "no specific",
    "output format - no",
    "output format: no",
    "final answer\n\nno",
    "therefore, no",
    "not detected",
    "does not match",
    "not relate to",
    "no tokens",
];

/// Stock lead-ins some models put before a free-form answer.
static LEAD_IN: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?i)I detected a |This appears to be a |Match detected: ").ok()
});

/// Classification of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Nothing matched.
    No,
    /// A match, with its `[type, arg1, arg2]` components when bracketed.
    Match {
        /// Answer as recorded.
        answer: String,
        /// First bracketed component.
        kind: String,
        /// Second bracketed component.
        arg1: String,
        /// Remainder of the bracketed list.
        arg2: String,
    },
}

impl Verdict {
    /// Classifies a raw completion.
    #[must_use]
    pub fn from_completion(raw: &str) -> Self {
        Self::parse(&normalize(raw))
    }

    /// Parses a normalized answer, such as one stored in a previous report.
    ///
    /// A leading `[a, b, c]` splits into at most three components; anything
    /// else that is not negative is kept whole with empty components.
    #[must_use]
    pub fn parse(answer: &str) -> Self {
        let answer = answer.trim();
        if answer.is_empty() || is_negative(answer) || answer.to_lowercase().contains("the message") {
            return Self::No;
        }

        let (kind, arg1, arg2) = answer
            .strip_prefix('[')
            .and_then(|rest| rest.split_once(']'))
            .map(|(inner, _)| {
                let mut parts = inner.splitn(3, ',').map(|p| p.trim().to_string());
                (
                    parts.next().unwrap_or_default(),
                    parts.next().unwrap_or_default(),
                    parts.next().unwrap_or_default(),
                )
            })
            .unwrap_or_default();

        Self::Match {
            answer: answer.to_string(),
            kind,
            arg1,
            arg2,
        }
    }

    /// Whether this is a match.
    #[must_use]
    pub const fn is_match(&self) -> bool {
        matches!(self, Self::Match { .. })
    }

    /// The answer as written to the report.
    #[must_use]
    pub fn answer(&self) -> &str {
        match self {
            Self::No => NO,
            Self::Match { answer, .. } => answer,
        }
    }

    /// Match type, empty for negatives and unstructured answers.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::No => "",
            Self::Match { kind, .. } => kind,
        }
    }
}

/// Reduces a raw completion to `No`, a bracketed list, or cleaned text.
#[must_use]
pub fn normalize(raw: &str) -> String {
    let answer = strip_thinking(raw.trim());

    if is_negative(answer) {
        return NO.to_string();
    }
    if let Some(bracketed) = first_bracketed(answer) {
        return bracketed.to_string();
    }
    if answer.split_whitespace().count() <= 3 {
        return NO.to_string();
    }

    LEAD_IN.as_ref().map_or_else(
        || answer.to_string(),
        |re| re.replace_all(answer, "").into_owned(),
    )
}

/// Text after the last `</think>`, or the input when there is no reasoning block.
fn strip_thinking(answer: &str) -> &str {
    match (answer.find("<think>"), answer.rfind("</think>")) {
        (Some(open), Some(close)) if open < close => answer[close + "</think>".len()..].trim(),
        _ => answer,
    }
}

fn is_negative(answer: &str) -> bool {
    let lower = answer.to_lowercase();
    NEGATIVE_EXACT.contains(&lower.trim_end_matches('.'))
        || NEGATIVE_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

fn first_bracketed(answer: &str) -> Option<&str> {
    let open = answer.find('[')?;
    let close = answer[open..].find(']')?;
    Some(&answer[open..=open + close])
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("No" ; "bare no")]
    #[test_case("none." ; "none with period")]
    #[test_case("The text does not contain any pattern from the list." ; "verbose negative")]
    #[test_case("Reasoning...\nOutput format - No" ; "format trailer")]
    #[test_case("maybe not sure" ; "short answer")]
    #[test_case("<think>there is a [Remind, x] in context</think>\nNo" ; "thinking then no")]
    #[test_case("" ; "empty")]
    fn test_negative_completions(raw: &str) {
        assert_eq!(Verdict::from_completion(raw), Verdict::No);
    }

    #[test]
    fn test_bracketed_answer_is_extracted() {
        let raw = "<think>p appears alone</think>\nOutput format - [Remind, next dip of BTC, buy ETH, and BTC]";
        let verdict = Verdict::from_completion(raw);

        assert_eq!(
            verdict,
            Verdict::Match {
                answer: "[Remind, next dip of BTC, buy ETH, and BTC]".to_string(),
                kind: "Remind".to_string(),
                arg1: "next dip of BTC".to_string(),
                arg2: "buy ETH, and BTC".to_string(),
            }
        );
    }

    #[test]
    fn test_partial_bracket_components() {
        let verdict = Verdict::parse("[SendTo, Sid]");
        assert_eq!(verdict.kind(), "SendTo");
        let Verdict::Match { arg1, arg2, .. } = verdict else {
            panic!("expected a match");
        };
        assert_eq!(arg1, "Sid");
        assert_eq!(arg2, "");
    }

    #[test]
    fn test_long_unstructured_answer_is_kept() {
        let verdict = Verdict::from_completion("I detected a reminder to water the plants tomorrow");
        assert!(verdict.is_match());
        assert_eq!(verdict.answer(), "reminder to water the plants tomorrow");
        assert_eq!(verdict.kind(), "");
    }

    #[test]
    fn test_stored_answers_reparse() {
        assert_eq!(Verdict::parse("No"), Verdict::No);
        assert_eq!(Verdict::parse("[Recommend, Songs]").kind(), "Recommend");
        assert_eq!(Verdict::parse("The message is just a greeting"), Verdict::No);
    }
}
