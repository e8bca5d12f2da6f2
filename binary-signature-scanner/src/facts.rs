// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Facts extracted from an artifact.

A [FactSet] is plain data. Rules are evaluated against it but never write to
it, so no rule can observe the outcome of another.
*/

use {
    crate::{
        artifact::ArtifactKind, dependency::DependencyList, elf::SymbolReference,
        strings::ExtractedString,
    },
    serde::Serialize,
    std::{
        collections::{BTreeMap, BTreeSet},
        path::{Path, PathBuf},
    },
    strum::{Display, EnumIter, EnumString},
};

/// A format specific property of an artifact.
#[derive(
    Clone, Copy, Debug, Display, EnumIter, EnumString, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum StructuralFlag {
    /// A large file sensitive function is used without its 64-bit variant.
    MissingLfs,
    /// A shared library lacks a versioned SONAME.
    UnversionedShlib,
    /// An executable without any dynamic linking information.
    StaticallyLinked,
    /// `DT_RPATH` or `DT_RUNPATH` is set.
    UsesRpath,
    /// Compiled against the NumPy C API.
    UsesNumpyCAbi,
}

/// Everything known about a single artifact.
#[derive(Clone, Debug, Serialize)]
pub struct FactSet {
    pub(crate) artifact: PathBuf,
    pub(crate) kind: ArtifactKind,
    pub(crate) strings: Vec<ExtractedString>,
    pub(crate) referenced_symbols: Vec<SymbolReference>,
    pub(crate) defined_symbols: BTreeSet<String>,
    pub(crate) functions: BTreeSet<String>,
    pub(crate) flags: BTreeMap<StructuralFlag, String>,
    pub(crate) text: Option<String>,
    #[serde(skip)]
    pub(crate) depends: Option<DependencyList>,
}

impl FactSet {
    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// Printable strings, ordered by offset.
    pub fn strings(&self) -> &[ExtractedString] {
        &self.strings
    }

    /// Symbols the artifact links against.
    ///
    /// Presence here is a linkage fact, not proof that the symbol is called.
    pub fn referenced_symbols(&self) -> &[SymbolReference] {
        &self.referenced_symbols
    }

    pub fn references_symbol(&self, name: &str) -> bool {
        self.referenced_symbols.iter().any(|s| s.name == name)
    }

    pub fn defined_symbols(&self) -> &BTreeSet<String> {
        &self.defined_symbols
    }

    /// Library functions referenced by the artifact.
    ///
    /// For ELF files these are undefined function symbols. For source text these
    /// are identifiers in call position.
    pub fn functions(&self) -> &BTreeSet<String> {
        &self.functions
    }

    /// Structural flags with a human readable detail.
    pub fn flags(&self) -> &BTreeMap<StructuralFlag, String> {
        &self.flags
    }

    pub fn flag(&self, flag: StructuralFlag) -> Option<&str> {
        self.flags.get(&flag).map(|x| x.as_str())
    }

    /// Whitespace normalized content of source text artifacts.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Relationships of the package shipping the artifact, if known.
    pub fn depends(&self) -> Option<&DependencyList> {
        self.depends.as_ref()
    }
}
