use serde::Serialize;

/// Verdict extracted from free-text crew output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    True,
    False,
    Misleading,
    Unknown,
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::True => "TRUE",
            Verdict::False => "FALSE",
            Verdict::Misleading => "MISLEADING",
            Verdict::Unknown => "no clear verdict",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify the first line mentioning `verdict:` (case-insensitive).
///
/// Keywords are checked in priority order: true, false, misleading.
pub fn classify_verdict(result: &str) -> Verdict {
    let lowered = result.to_lowercase();
    let Some(line) = lowered.lines().find(|line| line.contains("verdict:")) else {
        return Verdict::Unknown;
    };

    if line.contains("true") {
        Verdict::True
    } else if line.contains("false") {
        Verdict::False
    } else if line.contains("misleading") {
        Verdict::Misleading
    } else {
        Verdict::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_documented_examples() {
        assert_eq!(classify_verdict("Summary...\nVerdict: TRUE."), Verdict::True);
        assert_eq!(classify_verdict("Verdict: This is FALSE"), Verdict::False);
        assert_eq!(
            classify_verdict("notes\nVerdict: somewhat MISLEADING\n"),
            Verdict::Misleading
        );
        assert_eq!(classify_verdict("The claim is false."), Verdict::Unknown);
    }

    #[test]
    fn only_first_verdict_line_counts() {
        let text = "verdict: unclear\nVerdict: TRUE";
        assert_eq!(classify_verdict(text), Verdict::Unknown);
    }

    #[test]
    fn true_has_priority_over_false() {
        assert_eq!(
            classify_verdict("Final verdict: partly true, partly false"),
            Verdict::True
        );
    }

    #[test]
    fn labels() {
        assert_eq!(Verdict::Unknown.to_string(), "no clear verdict");
        assert_eq!(Verdict::Misleading.label(), "MISLEADING");
    }
}
