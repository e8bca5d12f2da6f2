// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Declarative rules and the registry holding them.

Rules are defined in YAML:

```yaml
rules:
  - id: embedded-zlib
    tag: embedded-zlib
    severity: error
    explanation: "{path} embeds a copy of zlib: {evidence}"
    matcher:
      string-contains: "deflate 1.2.3.3 Copyright 1995-2006 Jean-loup Gailly"
```

A matcher is a single key mapping naming a primitive or a combinator.
Primitives are `string-contains`, `string-matches`, `symbol-present`,
`flag-set`, `text-contains`, `depends-on` and `spelling-error`. Combinators
are `all` and `any`, which take a list of matchers, and `not`, which takes a
single matcher.

A [RuleRegistry] is immutable once loaded and may be shared freely between
threads.
*/

use {
    crate::{
        dependency::PackagePattern,
        error::{Result, ScanError},
        facts::{FactSet, StructuralFlag},
        finding::{Evidence, Severity},
        source::normalize_whitespace,
        spelling::find_misspelling,
    },
    once_cell::sync::Lazy,
    regex::{Captures, Regex},
    serde::Deserialize,
    serde_yaml::Value,
    std::{
        collections::HashSet,
        fmt::{Display, Formatter},
        path::Path,
        str::FromStr,
    },
};

/// Placeholders recognized in explanation templates.
static RE_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{(tag|path|evidence)\}").expect("placeholder regex should compile")
});

/// Rules compiled into the crate.
const BUILTIN_RULES: &str = include_str!("../rules/default.yaml");

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RegistryDefinition {
    rules: Vec<RuleDefinition>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleDefinition {
    id: Option<String>,
    tag: Option<String>,
    severity: Option<String>,
    explanation: Option<String>,
    matcher: Option<Value>,
}

/// A predicate over a [FactSet].
#[derive(Clone, Debug)]
pub enum Matcher {
    /// Some extracted string contains the literal.
    StringContains(String),
    /// Some extracted string matches the regular expression.
    StringMatches(Regex),
    /// The symbol is among the referenced symbols.
    SymbolPresent(String),
    FlagSet(StructuralFlag),
    /// Whitespace normalized source text contains the normalized literal.
    TextContains(String),
    /// The package relationships name a matching package.
    DependsOn(PackagePattern),
    /// An extracted string contains a known misspelling.
    SpellingError,
    All(Vec<Matcher>),
    Any(Vec<Matcher>),
    Not(Box<Matcher>),
}

impl Matcher {
    /// Compile a matcher from its YAML definition.
    fn from_value(rule: &str, value: &Value) -> Result<Self> {
        let (name, argument) = match value {
            Value::String(name) => (name.as_str(), &Value::Null),
            Value::Mapping(map) if map.len() == 1 => {
                // Length checked above.
                let (key, argument) = map.iter().next().ok_or_else(|| {
                    ScanError::invalid_rule(rule, "matcher must have exactly one key")
                })?;

                let name = key
                    .as_str()
                    .ok_or_else(|| ScanError::invalid_rule(rule, "matcher name must be a string"))?;

                (name, argument)
            }
            _ => {
                return Err(ScanError::invalid_rule(
                    rule,
                    "matcher must be a mapping with exactly one key",
                ));
            }
        };

        let literal = || -> Result<String> {
            match argument.as_str() {
                Some(s) if !s.is_empty() => Ok(s.to_string()),
                Some(_) => Err(ScanError::invalid_rule(
                    rule,
                    format!("{} literal must not be empty", name),
                )),
                None => Err(ScanError::invalid_rule(
                    rule,
                    format!("{} requires a string argument", name),
                )),
            }
        };

        let children = || -> Result<Vec<Matcher>> {
            let values = argument.as_sequence().ok_or_else(|| {
                ScanError::invalid_rule(rule, format!("{} requires a list of matchers", name))
            })?;

            if values.is_empty() {
                return Err(ScanError::invalid_rule(
                    rule,
                    format!("{} requires at least one matcher", name),
                ));
            }

            values.iter().map(|v| Self::from_value(rule, v)).collect()
        };

        Ok(match name {
            "string-contains" => Self::StringContains(literal()?),
            "string-matches" => Self::StringMatches(
                Regex::new(&literal()?)
                    .map_err(|e| ScanError::invalid_rule(rule, format!("invalid regex: {}", e)))?,
            ),
            "symbol-present" => Self::SymbolPresent(literal()?),
            "flag-set" => {
                let flag = literal()?;
                Self::FlagSet(StructuralFlag::from_str(&flag).map_err(|_| {
                    ScanError::invalid_rule(rule, format!("unknown flag: {}", flag))
                })?)
            }
            "text-contains" => {
                let text = normalize_whitespace(&literal()?);
                if text.is_empty() {
                    return Err(ScanError::invalid_rule(
                        rule,
                        "text-contains literal must not be empty",
                    ));
                }
                Self::TextContains(text)
            }
            "depends-on" => {
                let pattern = literal()?;
                if pattern == "*" {
                    return Err(ScanError::invalid_rule(
                        rule,
                        "depends-on pattern must name a package",
                    ));
                }
                Self::DependsOn(PackagePattern::new(&pattern))
            }
            "spelling-error" => {
                if !argument.is_null() {
                    return Err(ScanError::invalid_rule(
                        rule,
                        "spelling-error takes no argument",
                    ));
                }
                Self::SpellingError
            }
            "all" => Self::All(children()?),
            "any" => Self::Any(children()?),
            "not" => Self::Not(Box::new(Self::from_value(rule, argument)?)),
            _ => {
                return Err(ScanError::invalid_rule(
                    rule,
                    format!("unknown matcher: {}", name),
                ));
            }
        })
    }

    /// Check a matcher constructed in code for the constraints enforced on YAML.
    fn validate(&self, rule: &str) -> Result<()> {
        match self {
            Self::StringContains(s) | Self::SymbolPresent(s) if s.is_empty() => Err(
                ScanError::invalid_rule(rule, format!("{} literal must not be empty", self.name())),
            ),
            Self::StringMatches(re) if re.as_str().is_empty() => Err(ScanError::invalid_rule(
                rule,
                "string-matches literal must not be empty",
            )),
            Self::TextContains(s) if normalize_whitespace(s).is_empty() => Err(
                ScanError::invalid_rule(rule, "text-contains literal must not be empty"),
            ),
            Self::DependsOn(pattern) if pattern.is_empty() => Err(ScanError::invalid_rule(
                rule,
                "depends-on pattern must name a package",
            )),
            Self::All(matchers) | Self::Any(matchers) => {
                if matchers.is_empty() {
                    return Err(ScanError::invalid_rule(
                        rule,
                        format!("{} requires at least one matcher", self.name()),
                    ));
                }

                matchers.iter().try_for_each(|m| m.validate(rule))
            }
            Self::Not(matcher) => matcher.validate(rule),
            _ => Ok(()),
        }
    }

    /// The YAML name of this matcher.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StringContains(_) => "string-contains",
            Self::StringMatches(_) => "string-matches",
            Self::SymbolPresent(_) => "symbol-present",
            Self::FlagSet(_) => "flag-set",
            Self::TextContains(_) => "text-contains",
            Self::DependsOn(_) => "depends-on",
            Self::SpellingError => "spelling-error",
            Self::All(_) => "all",
            Self::Any(_) => "any",
            Self::Not(_) => "not",
        }
    }

    /// Test the matcher against facts, returning the evidence of a match.
    ///
    /// When several facts satisfy a primitive, the first one wins: strings by
    /// offset, symbols in symbol table order.
    pub fn find(&self, facts: &FactSet) -> Option<Evidence> {
        match self {
            Self::StringContains(literal) => facts
                .strings()
                .iter()
                .find(|s| s.value.contains(literal.as_str()))
                .map(|s| Evidence::String {
                    value: literal.clone(),
                    offset: s.offset,
                }),
            Self::StringMatches(re) => facts.strings().iter().find_map(|s| {
                re.find(&s.value).map(|m| Evidence::String {
                    value: m.as_str().to_string(),
                    offset: s.offset,
                })
            }),
            Self::SymbolPresent(name) => facts
                .referenced_symbols()
                .iter()
                .find(|s| &s.name == name)
                .map(|s| Evidence::Symbol {
                    name: s.name.clone(),
                }),
            Self::FlagSet(flag) => facts.flag(*flag).map(|detail| Evidence::Flag {
                flag: *flag,
                detail: detail.to_string(),
            }),
            Self::TextContains(fragment) => facts
                .text()
                .filter(|text| text.contains(fragment.as_str()))
                .map(|_| Evidence::Text {
                    excerpt: fragment.clone(),
                }),
            Self::DependsOn(pattern) => facts
                .depends()
                .and_then(|depends| depends.find_package(pattern))
                .map(|dep| Evidence::Dependency {
                    relation: dep.to_string(),
                }),
            Self::SpellingError => find_misspelling(facts.strings()).map(|m| {
                Evidence::Misspelling {
                    word: m.word,
                    correction: m.correction.to_string(),
                    offset: m.offset,
                }
            }),
            Self::All(matchers) => {
                let evidence = matchers
                    .iter()
                    .map(|m| m.find(facts))
                    .collect::<Option<Vec<_>>>()?;

                let first = evidence
                    .iter()
                    .position(|e| !matches!(e, Evidence::Absent { .. }))
                    .unwrap_or(0);

                evidence.into_iter().nth(first)
            }
            Self::Any(matchers) => matchers.iter().find_map(|m| m.find(facts)),
            Self::Not(matcher) => match matcher.find(facts) {
                Some(_) => None,
                None => Some(Evidence::Absent {
                    what: matcher.to_string(),
                }),
            },
        }
    }
}

impl Display for Matcher {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let join = |f: &mut Formatter<'_>, name: &str, matchers: &[Matcher]| {
            write!(f, "{}(", name)?;
            for (i, m) in matchers.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", m)?;
            }
            f.write_str(")")
        };

        match self {
            Self::StringContains(s) => write!(f, "string-contains {:?}", s),
            Self::StringMatches(re) => write!(f, "string-matches /{}/", re.as_str()),
            Self::SymbolPresent(s) => write!(f, "symbol-present {}", s),
            Self::FlagSet(flag) => write!(f, "flag-set {}", flag),
            Self::TextContains(s) => write!(f, "text-contains {:?}", s),
            Self::DependsOn(pattern) => write!(f, "depends-on {}", pattern),
            Self::SpellingError => f.write_str("spelling-error"),
            Self::All(matchers) => join(f, "all", matchers),
            Self::Any(matchers) => join(f, "any", matchers),
            Self::Not(m) => write!(f, "not({})", m),
        }
    }
}

/// A declarative rule producing a tag.
#[derive(Clone, Debug)]
pub struct Rule {
    id: String,
    tag: String,
    severity: Severity,
    matcher: Matcher,
    explanation: String,
}

impl Rule {
    fn from_definition(index: usize, def: RuleDefinition) -> Result<Self> {
        let id = match def.id {
            Some(id) if !id.trim().is_empty() => id,
            Some(_) => {
                return Err(ScanError::invalid_rule(
                    format!("#{}", index + 1),
                    "id must not be empty",
                ))
            }
            None => {
                return Err(ScanError::invalid_rule(
                    format!("#{}", index + 1),
                    "missing field: id",
                ))
            }
        };

        let tag = def
            .tag
            .filter(|tag| !tag.trim().is_empty())
            .ok_or_else(|| ScanError::invalid_rule(&id, "missing field: tag"))?;

        let severity = def
            .severity
            .ok_or_else(|| ScanError::invalid_rule(&id, "missing field: severity"))?;
        let severity = Severity::from_str(&severity)
            .map_err(|_| ScanError::invalid_rule(&id, format!("unknown severity: {}", severity)))?;

        let matcher = def
            .matcher
            .ok_or_else(|| ScanError::invalid_rule(&id, "missing field: matcher"))?;
        let matcher = Matcher::from_value(&id, &matcher)?;

        Ok(Self {
            explanation: def.explanation.unwrap_or_else(|| "{evidence}".to_string()),
            id,
            tag,
            severity,
            matcher,
        })
    }

    /// Construct a rule directly.
    ///
    /// The rule is held to the same requirements as rules loaded from YAML.
    pub fn new(
        id: impl ToString,
        tag: impl ToString,
        severity: Severity,
        matcher: Matcher,
        explanation: impl ToString,
    ) -> Result<Self> {
        let id = id.to_string();
        if id.trim().is_empty() {
            return Err(ScanError::invalid_rule(id, "id must not be empty"));
        }

        let tag = tag.to_string();
        if tag.trim().is_empty() {
            return Err(ScanError::invalid_rule(id, "tag must not be empty"));
        }

        matcher.validate(&id)?;

        Ok(Self {
            id,
            tag,
            severity,
            matcher,
            explanation: explanation.to_string(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// The unexpanded explanation template.
    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    /// Expand the explanation template for a match.
    ///
    /// Placeholders are substituted in a single pass, so braces appearing in
    /// the substituted values are left alone.
    pub fn explain(&self, evidence: &Evidence, path: &Path) -> String {
        RE_PLACEHOLDER
            .replace_all(&self.explanation, |caps: &Captures| match &caps[1] {
                "tag" => self.tag.clone(),
                "path" => path.display().to_string(),
                _ => evidence.to_string(),
            })
            .into_owned()
    }
}

/// An ordered, immutable collection of rules.
#[derive(Clone, Debug, Default)]
pub struct RuleRegistry {
    rules: Vec<Rule>,
}

impl RuleRegistry {
    /// Load rules from YAML source.
    ///
    /// Any invalid rule fails the whole load.
    pub fn load(source: &str) -> Result<Self> {
        let definition: RegistryDefinition = serde_yaml::from_str(source)
            .map_err(|e| ScanError::invalid_rule("<registry>", e))?;

        Self::from_rules(
            definition
                .rules
                .into_iter()
                .enumerate()
                .map(|(index, def)| Rule::from_definition(index, def))
                .collect::<Result<Vec<_>>>()?,
        )
    }

    /// Construct an instance from already compiled rules.
    pub fn from_rules(rules: Vec<Rule>) -> Result<Self> {
        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(ScanError::invalid_rule(&rule.id, "duplicate rule id"));
            }
        }

        Ok(Self { rules })
    }

    /// Load rules from a YAML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let source = std::fs::read_to_string(path).map_err(|e| ScanError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::load(&source)
    }

    /// The registry compiled into this crate.
    pub fn builtin() -> Result<Self> {
        Self::load(BUILTIN_RULES)
    }

    /// Rules in registry order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
