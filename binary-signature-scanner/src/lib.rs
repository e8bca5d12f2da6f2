// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Binary signature scanning.

This crate finds notable properties of Linux binaries, shared libraries and
source files: embedded copies of well-known libraries, use of obsolete
functions, missing large file support and similar packaging problems.

The canonical home of this crate is <https://github.com/indygreg/PyOxidizer>. Please file issues
and pull requests there.

# A Tour of Functionality

Scanning is split into two independent phases.

First, an [artifact::Artifact] is turned into a [facts::FactSet] by
[extract::extract()]. Facts are printable strings (see [strings]), dynamic
symbol references (see [elf]), lexical facts about source text (see
[source]) and structural flags such as [facts::StructuralFlag::MissingLfs].
Extraction fails with [error::ScanError::MalformedArtifact] if an ELF
container cannot be parsed and never returns partial facts.

Second, a [rules::RuleRegistry] of declarative [rules::Rule] is evaluated
against the facts by [evaluate::evaluate()], producing [finding::Finding]
values. Rules are written in YAML; [rules::RuleRegistry::builtin()] returns a
registry compiled into the crate. Evaluation cannot fail and never emits more
than one finding per rule.

[scan::Scanner] ties the phases together for batches of files, running them
in parallel and turning per-file failures into findings.

Rules may also consult the `Depends` relationships of the package shipping an
artifact. The [dependency] and [package_version] modules implement parsing and
evaluation of Debian package relationships for this purpose, and [packages]
checks the relationships of a whole package index for satisfiability.
*/

pub mod artifact;
pub mod dependency;
pub mod elf;
pub mod error;
pub mod evaluate;
pub mod extract;
pub mod facts;
pub mod finding;
pub mod package_version;
pub mod packages;
pub mod rules;
pub mod scan;
pub mod source;
pub mod spelling;
pub mod strings;
#[cfg(test)]
mod testutil;
