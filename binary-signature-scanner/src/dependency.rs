// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Package relationship expressions.

Binary packages declare relationships like
`python3 (>= 3.9), python3-numpy-abi9 | python3-numpy (<< 1:1.22)`. Some lint
rules only make sense in combination with those relationships, e.g. an
extension module compiled against the NumPy C API must depend on the ABI
virtual package. This module parses such expressions and answers questions
about them.
*/

use {
    crate::{
        error::{Result, ScanError},
        package_version::PackageVersion,
    },
    once_cell::sync::Lazy,
    regex::Regex,
    std::{
        collections::BTreeMap,
        fmt::{Display, Formatter},
        str::FromStr,
    },
};

/// Regular expression to parse a single package relationship.
///
/// Build profiles (`<!nocheck>`) are accepted but do not affect matching.
pub static RE_DEPENDENCY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        ^\s*
        # Package name, optionally followed by a multi-arch qualifier.
        (?P<package>[a-z0-9][a-z0-9+.\-]*)
        (?::(?P<qualifier>[a-z0-9\-]+))?
        \s*
        # Optional version constraint. `<` and `>` are deprecated forms.
        (?:
            \(
                \s*
                (?P<relop>(<<|<=|>=|>>|=|<|>))
                \s*
                (?P<version>[^\s)]+)
                \s*
            \)
        )?
        \s*
        # Optional architecture restriction list.
        (?:
            \[
                (?P<arch>[^\]]*)
            \]
        )?
        \s*
        # Zero or more build profile groups.
        (?:<[^>]*>\s*)*
        $
    ",
    )
    .expect("regex should be valid")
});

/// A relational operator in a versioned relationship.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VersionRelation {
    /// `<<`
    StrictlyEarlier,
    /// `<=` (and the deprecated `<`)
    EarlierOrEqual,
    /// `=`
    ExactlyEqual,
    /// `>=` (and the deprecated `>`)
    LaterOrEqual,
    /// `>>`
    StrictlyLater,
}

impl VersionRelation {
    fn as_str(&self) -> &'static str {
        match self {
            Self::StrictlyEarlier => "<<",
            Self::EarlierOrEqual => "<=",
            Self::ExactlyEqual => "=",
            Self::LaterOrEqual => ">=",
            Self::StrictlyLater => ">>",
        }
    }
}

impl FromStr for VersionRelation {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "<<" => Ok(Self::StrictlyEarlier),
            "<=" | "<" => Ok(Self::EarlierOrEqual),
            "=" => Ok(Self::ExactlyEqual),
            ">=" | ">" => Ok(Self::LaterOrEqual),
            ">>" => Ok(Self::StrictlyLater),
            _ => Err(ScanError::DependencyParse(format!(
                "unknown version relation: {}",
                s
            ))),
        }
    }
}

/// A version constraint on a single package.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VersionConstraint {
    pub relation: VersionRelation,
    pub version: PackageVersion,
}

impl VersionConstraint {
    /// Whether a concrete version satisfies this constraint.
    pub fn matches(&self, version: &PackageVersion) -> bool {
        let ordering = version.cmp(&self.version);

        match self.relation {
            VersionRelation::StrictlyEarlier => ordering.is_lt(),
            VersionRelation::EarlierOrEqual => ordering.is_le(),
            VersionRelation::ExactlyEqual => ordering.is_eq(),
            VersionRelation::LaterOrEqual => ordering.is_ge(),
            VersionRelation::StrictlyLater => ordering.is_gt(),
        }
    }
}

/// A dependency on a single package.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SingleDependency {
    pub package: String,
    /// Multi-arch qualifier, e.g. `any` in `python3:any`.
    pub qualifier: Option<String>,
    pub constraint: Option<VersionConstraint>,
    /// Architecture restriction list, e.g. `[amd64 i386]`.
    pub architectures: Vec<String>,
}

impl SingleDependency {
    pub fn parse(s: &str) -> Result<Self> {
        let caps = RE_DEPENDENCY
            .captures(s)
            .ok_or_else(|| ScanError::DependencyParse(s.to_string()))?;

        let constraint = match (caps.name("relop"), caps.name("version")) {
            (Some(relop), Some(version)) => Some(VersionConstraint {
                relation: VersionRelation::from_str(relop.as_str())?,
                version: PackageVersion::parse(version.as_str())
                    .map_err(|e| ScanError::DependencyParse(format!("{:?}: {}", s, e)))?,
            }),
            _ => None,
        };

        Ok(Self {
            package: caps["package"].to_string(),
            qualifier: caps.name("qualifier").map(|x| x.as_str().to_string()),
            constraint,
            architectures: caps
                .name("arch")
                .map(|x| x.as_str().split_whitespace().map(|a| a.to_string()).collect())
                .unwrap_or_default(),
        })
    }

    /// Whether a package known by `name` satisfies this dependency.
    pub fn satisfied_by(&self, name: &str, available: &AvailablePackage) -> bool {
        if name != self.package {
            return false;
        }

        match (&self.constraint, available) {
            (None, _) => true,
            // Virtual packages never satisfy versioned relationships.
            (Some(_), AvailablePackage::Virtual) => false,
            (Some(constraint), AvailablePackage::Real(version)) => constraint.matches(version),
        }
    }
}

impl Display for SingleDependency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.package)?;
        if let Some(qualifier) = &self.qualifier {
            write!(f, ":{}", qualifier)?;
        }
        if let Some(constraint) = &self.constraint {
            write!(
                f,
                " ({} {})",
                constraint.relation.as_str(),
                constraint.version
            )?;
        }
        if !self.architectures.is_empty() {
            write!(f, " [{}]", self.architectures.join(" "))?;
        }

        Ok(())
    }
}

/// A set of alternatives, any of which satisfies the relationship.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DependencyAlternatives(Vec<SingleDependency>);

impl DependencyAlternatives {
    pub fn iter(&self) -> impl Iterator<Item = &SingleDependency> {
        self.0.iter()
    }

    /// Resolve this relationship against a set of available packages.
    ///
    /// Returns the names of the packages that satisfy it. An empty result
    /// means the relationship cannot be satisfied.
    pub fn satisfied_by<'a>(
        &self,
        available: &'a BTreeMap<String, AvailablePackage>,
    ) -> Vec<&'a str> {
        let mut res = vec![];

        for dep in &self.0 {
            if let Some((name, package)) = available.get_key_value(&dep.package) {
                if dep.satisfied_by(name, package) && !res.contains(&name.as_str()) {
                    res.push(name.as_str());
                }
            }
        }

        res
    }
}

impl Display for DependencyAlternatives {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let parts = self.0.iter().map(|x| x.to_string()).collect::<Vec<_>>();
        f.write_str(&parts.join(" | "))
    }
}

/// A package known to be installable when resolving relationships.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AvailablePackage {
    /// A real package at a concrete version.
    Real(PackageVersion),
    /// A virtual package made available through `Provides`.
    Virtual,
}

/// A parsed relationship field, like the value of `Depends`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DependencyList {
    relations: Vec<DependencyAlternatives>,
}

impl DependencyList {
    /// Parse a relationship field value.
    ///
    /// Empty input yields an empty list.
    pub fn parse(s: &str) -> Result<Self> {
        let mut relations = vec![];

        for relation in s.split(',') {
            let relation = relation.trim();

            if relation.is_empty() {
                if s.trim().is_empty() {
                    continue;
                }

                return Err(ScanError::DependencyParse(format!(
                    "empty relationship in {:?}",
                    s
                )));
            }

            relations.push(DependencyAlternatives(
                relation
                    .split('|')
                    .map(SingleDependency::parse)
                    .collect::<Result<Vec<_>>>()?,
            ));
        }

        Ok(Self { relations })
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DependencyAlternatives> {
        self.relations.iter()
    }

    /// Iterate over every package named anywhere in this list.
    pub fn packages(&self) -> impl Iterator<Item = &SingleDependency> {
        self.relations.iter().flat_map(|x| x.iter())
    }

    /// Find the first package whose name matches a pattern.
    pub fn find_package(&self, pattern: &PackagePattern) -> Option<&SingleDependency> {
        self.packages().find(|dep| pattern.matches(&dep.package))
    }

    /// Relationships that cannot be satisfied by the available packages.
    pub fn unsatisfied<'a>(
        &'a self,
        available: &BTreeMap<String, AvailablePackage>,
    ) -> Vec<&'a DependencyAlternatives> {
        self.relations
            .iter()
            .filter(|relation| relation.satisfied_by(available).is_empty())
            .collect()
    }
}

impl Display for DependencyList {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let parts = self
            .relations
            .iter()
            .map(|x| x.to_string())
            .collect::<Vec<_>>();
        f.write_str(&parts.join(", "))
    }
}

impl FromStr for DependencyList {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A package name pattern.
///
/// Either an exact name or a prefix ending in `*`, e.g. `python3-numpy-abi*`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackagePattern {
    name: String,
    prefix: bool,
}

impl PackagePattern {
    pub fn new(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) => Self {
                name: prefix.to_string(),
                prefix: true,
            },
            None => Self {
                name: pattern.to_string(),
                prefix: false,
            },
        }
    }

    /// Whether the pattern names no package at all, e.g. a bare `*`.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    pub fn matches(&self, package: &str) -> bool {
        if self.prefix {
            package.starts_with(&self.name)
        } else {
            package == self.name
        }
    }
}

impl Display for PackagePattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.name, if self.prefix { "*" } else { "" })
    }
}
