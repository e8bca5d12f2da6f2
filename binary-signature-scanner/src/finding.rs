// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Findings emitted by rule evaluation. */

use {
    crate::facts::StructuralFlag,
    serde::Serialize,
    std::{
        cmp::Ordering,
        fmt::{Display, Formatter},
        path::PathBuf,
    },
    strum::{Display as StrumDisplay, EnumIter, EnumString},
};

/// How serious a finding is.
///
/// Variants are declared in ascending order of severity.
#[derive(
    Clone,
    Copy,
    Debug,
    EnumIter,
    EnumString,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    StrumDisplay,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Severity {
    Classification,
    Pedantic,
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Single letter code used in text output.
    pub fn code(&self) -> char {
        match self {
            Self::Classification => 'C',
            Self::Pedantic => 'P',
            Self::Info => 'I',
            Self::Warning => 'W',
            Self::Error => 'E',
        }
    }
}

/// The fact that caused a rule to match.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Evidence {
    /// A matched substring and the offset of the string containing it.
    String { value: String, offset: u64 },
    Symbol { name: String },
    Flag { flag: StructuralFlag, detail: String },
    /// Matched fragment of normalized source text.
    Text { excerpt: String },
    /// A package relationship, as written.
    Dependency { relation: String },
    Misspelling {
        word: String,
        correction: String,
        offset: u64,
    },
    /// A negated condition held.
    Absent { what: String },
    /// The artifact could not be scanned.
    Failure { message: String },
}

impl Display for Evidence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String { value, .. } => f.write_str(value),
            Self::Symbol { name } => f.write_str(name),
            Self::Flag { flag, detail } if detail.is_empty() => write!(f, "{}", flag),
            Self::Flag { flag, detail } => write!(f, "{} ({})", flag, detail),
            Self::Text { excerpt } => f.write_str(excerpt),
            Self::Dependency { relation } => f.write_str(relation),
            Self::Misspelling {
                word, correction, ..
            } => write!(f, "{} -> {}", word, correction),
            Self::Absent { what } => write!(f, "no {}", what),
            Self::Failure { message } => f.write_str(message),
        }
    }
}

/// A tag reported against an artifact.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Finding {
    pub rule_id: String,
    pub tag: String,
    pub severity: Severity,
    pub artifact: PathBuf,
    pub evidence: Evidence,
    pub explanation: String,
}

impl Finding {
    /// Compare findings in report order.
    ///
    /// Most severe first, then by tag, artifact path and rule id.
    pub fn report_order(&self, other: &Self) -> Ordering {
        other
            .severity
            .cmp(&self.severity)
            .then_with(|| self.tag.cmp(&other.tag))
            .then_with(|| self.artifact.cmp(&other.artifact))
            .then_with(|| self.rule_id.cmp(&other.rule_id))
    }
}

impl Display for Finding {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}: {} {}",
            self.severity.code(),
            self.artifact.display(),
            self.tag,
            self.evidence
        )
    }
}

/// Sort findings into report order.
pub fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by(Finding::report_order);
}

#[cfg(test)]
mod test {
    use {super::*, std::str::FromStr};

    fn finding(rule_id: &str, tag: &str, severity: Severity, artifact: &str) -> Finding {
        Finding {
            rule_id: rule_id.to_string(),
            tag: tag.to_string(),
            severity,
            artifact: PathBuf::from(artifact),
            evidence: Evidence::Symbol {
                name: "x".to_string(),
            },
            explanation: String::new(),
        }
    }

    #[test]
    fn severity_names() -> Result<(), strum::ParseError> {
        assert_eq!(Severity::from_str("error")?, Severity::Error);
        assert_eq!(Severity::from_str("classification")?, Severity::Classification);
        assert!(Severity::from_str("fatal").is_err());
        assert_eq!(Severity::Pedantic.to_string(), "pedantic");
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Pedantic > Severity::Classification);

        Ok(())
    }

    #[test]
    fn ordering() {
        let mut findings = vec![
            finding("b", "zzz", Severity::Warning, "usr/bin/a"),
            finding("a", "aaa", Severity::Info, "usr/bin/a"),
            finding("c", "zzz", Severity::Warning, "usr/bin/0"),
            finding("d", "mmm", Severity::Error, "usr/bin/z"),
            finding("a2", "zzz", Severity::Warning, "usr/bin/0"),
        ];
        sort_findings(&mut findings);

        assert_eq!(
            findings
                .iter()
                .map(|f| f.rule_id.as_str())
                .collect::<Vec<_>>(),
            vec!["d", "a2", "c", "b", "a"]
        );
    }

    #[test]
    fn display() {
        let mut f = finding("r", "embedded-zlib", Severity::Error, "usr/bin/foo");
        f.evidence = Evidence::String {
            value: "deflate 1.2.3.3".to_string(),
            offset: 64,
        };
        assert_eq!(f.to_string(), "E: usr/bin/foo: embedded-zlib deflate 1.2.3.3");

        assert_eq!(
            Evidence::Flag {
                flag: StructuralFlag::MissingLfs,
                detail: "open".to_string()
            }
            .to_string(),
            "missing-lfs (open)"
        );
        assert_eq!(
            Evidence::Misspelling {
                word: "teh".to_string(),
                correction: "the".to_string(),
                offset: 0
            }
            .to_string(),
            "teh -> the"
        );
    }
}
