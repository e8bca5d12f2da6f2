// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Checking package relationships against a package index.

A package index is text in the format of a Debian `Packages` file: paragraphs
of `Field: value` lines separated by blank lines. Indented lines continue the
previous field.

[PackageIndex::check()] reports, for each package in the index, the `Depends`,
`Recommends` and `Pre-Depends` relationships that no package in the index
satisfies. Packages named in `Provides` are available as virtual packages.
*/

use {
    crate::{
        dependency::{AvailablePackage, DependencyList},
        error::{Result, ScanError},
        package_version::PackageVersion,
    },
    serde::Serialize,
    std::{
        collections::BTreeMap,
        fmt::{Display, Formatter},
    },
    strum::{Display as StrumDisplay, EnumIter, IntoEnumIterator},
};

/// A relationship field checked for satisfiability.
#[derive(
    Clone, Copy, Debug, EnumIter, Eq, Ord, PartialEq, PartialOrd, Serialize, StrumDisplay,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RelationField {
    PreDepends,
    Depends,
    Recommends,
}

impl RelationField {
    /// The field name as it appears in a control paragraph.
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::PreDepends => "Pre-Depends",
            Self::Depends => "Depends",
            Self::Recommends => "Recommends",
        }
    }

    fn noun(&self, plural: bool) -> &'static str {
        match (self, plural) {
            (Self::PreDepends, false) => "pre-dependency",
            (Self::PreDepends, true) => "pre-dependencies",
            (Self::Depends, false) => "dependency",
            (Self::Depends, true) => "dependencies",
            (Self::Recommends, false) => "recommendation",
            (Self::Recommends, true) => "recommendations",
        }
    }
}

/// A package described by a paragraph of a package index.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackageEntry {
    pub name: String,
    pub version: PackageVersion,
    /// Virtual packages made available by this package.
    pub provides: Vec<String>,
    pub relations: BTreeMap<RelationField, DependencyList>,
}

impl PackageEntry {
    fn from_fields(fields: &BTreeMap<String, String>) -> Result<Self> {
        let field = |name: &str| fields.get(&name.to_ascii_lowercase()).map(|x| x.as_str());

        let name = field("Package")
            .ok_or_else(|| ScanError::ControlParse("paragraph without Package field".into()))?
            .to_string();

        let version = field("Version").ok_or_else(|| {
            ScanError::ControlParse(format!("package {} has no Version field", name))
        })?;
        let version = PackageVersion::parse(version)?;

        let provides = match field("Provides") {
            Some(value) => DependencyList::parse(value)?
                .packages()
                .map(|dep| dep.package.clone())
                .collect(),
            None => vec![],
        };

        let mut relations = BTreeMap::new();
        for relation in RelationField::iter() {
            if let Some(value) = field(relation.field_name()) {
                relations.insert(relation, DependencyList::parse(value)?);
            }
        }

        Ok(Self {
            name,
            version,
            provides,
            relations,
        })
    }
}

/// Relationships of one package that cannot be satisfied.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub struct UnsatisfiedRelations {
    pub package: String,
    pub field: RelationField,
    pub relations: Vec<String>,
}

impl Display for UnsatisfiedRelations {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} {}",
            self.package,
            self.field.noun(self.relations.len() > 1),
            self.relations.join(", ")
        )
    }
}

/// The packages of a package index.
#[derive(Clone, Debug, Default)]
pub struct PackageIndex {
    packages: Vec<PackageEntry>,
}

impl PackageIndex {
    /// Parse a `Packages` file.
    pub fn parse(s: &str) -> Result<Self> {
        let mut packages = vec![];
        let mut fields = BTreeMap::new();
        let mut current: Option<String> = None;

        for (number, line) in s.lines().enumerate() {
            if line.trim().is_empty() {
                if !fields.is_empty() {
                    packages.push(PackageEntry::from_fields(&fields)?);
                    fields.clear();
                }
                current = None;
                continue;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                let name = current.as_ref().ok_or_else(|| {
                    ScanError::ControlParse(format!(
                        "line {}: continuation without a field",
                        number + 1
                    ))
                })?;

                if let Some(value) = fields.get_mut(name) {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }

            let (name, value) = line.split_once(':').ok_or_else(|| {
                ScanError::ControlParse(format!("line {}: missing colon", number + 1))
            })?;

            // Field names are case insensitive.
            let name = name.trim().to_ascii_lowercase();
            fields.insert(name.clone(), value.trim().to_string());
            current = Some(name);
        }

        if !fields.is_empty() {
            packages.push(PackageEntry::from_fields(&fields)?);
        }

        Ok(Self { packages })
    }

    pub fn packages(&self) -> &[PackageEntry] {
        &self.packages
    }

    /// Packages available for resolving relationships.
    ///
    /// A real package always wins over a virtual package of the same name.
    pub fn available(&self) -> BTreeMap<String, AvailablePackage> {
        let mut available = BTreeMap::new();

        for package in &self.packages {
            available.insert(
                package.name.clone(),
                AvailablePackage::Real(package.version.clone()),
            );
        }

        for package in &self.packages {
            for provided in &package.provides {
                available
                    .entry(provided.clone())
                    .or_insert(AvailablePackage::Virtual);
            }
        }

        available
    }

    /// Relationships of indexed packages that the index cannot satisfy.
    ///
    /// Results are sorted by package name, then field.
    pub fn check(&self) -> Vec<UnsatisfiedRelations> {
        let available = self.available();

        let mut res = self
            .packages
            .iter()
            .flat_map(|package| {
                let available = &available;

                package
                    .relations
                    .iter()
                    .filter_map(move |(field, list)| {
                        let unsatisfied = list.unsatisfied(available);
                        if unsatisfied.is_empty() {
                            None
                        } else {
                            Some(UnsatisfiedRelations {
                                package: package.name.clone(),
                                field: *field,
                                relations: unsatisfied.iter().map(|x| x.to_string()).collect(),
                            })
                        }
                    })
            })
            .collect::<Vec<_>>();

        res.sort();

        res
    }
}
