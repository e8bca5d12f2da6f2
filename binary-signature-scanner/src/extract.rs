// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Fact extraction.

[extract()] turns an [Artifact] into a [FactSet]. It knows nothing about
rules. Extraction is all-or-nothing: either every fact is populated or an
error is returned.
*/

use {
    crate::{
        artifact::{Artifact, ArtifactKind},
        elf::{analyze_elf_data, ElfFacts},
        error::{Result, ScanError},
        facts::{FactSet, StructuralFlag},
        source::analyze_source_text,
        strings::{extract_strings, ExtractedString, DEFAULT_MIN_STRING_LENGTH},
    },
    log::debug,
    object::elf,
    once_cell::sync::Lazy,
    regex::Regex,
    std::collections::{BTreeMap, BTreeSet},
};

/// Functions whose default variant uses a 32-bit `off_t` on 32-bit ABIs.
///
/// Building with `-D_FILE_OFFSET_BITS=64` redirects each of these to its `64`
/// suffixed variant.
pub const LFS_SENSITIVE_FUNCTIONS: &[&str] = &[
    "alphasort",
    "creat",
    "fgetpos",
    "fopen",
    "freopen",
    "fseeko",
    "fsetpos",
    "fstat",
    "fstatat",
    "fstatfs",
    "fstatvfs",
    "ftello",
    "ftruncate",
    "ftw",
    "getrlimit",
    "glob",
    "lockf",
    "lseek",
    "lstat",
    "mkostemp",
    "mkstemp",
    "mmap",
    "nftw",
    "open",
    "openat",
    "posix_fadvise",
    "posix_fallocate",
    "pread",
    "preadv",
    "pwrite",
    "pwritev",
    "readdir",
    "readdir_r",
    "scandir",
    "sendfile",
    "setrlimit",
    "stat",
    "statfs",
    "statvfs",
    "tmpfile",
    "truncate",
];

/// Printed by the NumPy `import_array()` machinery on ABI mismatch.
static NUMPY_ABI_GUARD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"module compiled against ABI version (?:0x)?%x but this version of numpy is (?:0x)?%x",
    )
    .expect("numpy regex should compile")
});

static VERSIONED_SONAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\.so\.\d|-\d[\w.]*\.so$)").expect("soname regex should compile")
});

/// Options influencing fact extraction.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ExtractOptions {
    /// Minimum length of extracted strings, in characters.
    pub min_string_length: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            min_string_length: DEFAULT_MIN_STRING_LENGTH,
        }
    }
}

/// Find the first large file sensitive function used without its 64-bit variant.
fn find_missing_lfs(functions: impl Fn(&str) -> bool) -> Option<&'static str> {
    LFS_SENSITIVE_FUNCTIONS
        .iter()
        .copied()
        .find(|name| functions(*name) && !functions(format!("{}64", name).as_str()))
}

fn numpy_guard(strings: &[ExtractedString]) -> Option<String> {
    strings
        .iter()
        .find(|s| NUMPY_ABI_GUARD_RE.is_match(&s.value))
        .map(|s| s.value.clone())
}

fn extract_elf(artifact: &Artifact, options: &ExtractOptions) -> Result<FactSet> {
    let ElfFacts {
        class64,
        object_type,
        strings,
        references,
        exports,
        has_dynamic_section,
        shared_object_name,
        rpath,
        runpath,
        ..
    } = analyze_elf_data(artifact.content(), options.min_string_length)
        .map_err(|e| ScanError::malformed(artifact.path(), e))?;

    let functions = references
        .iter()
        .filter(|r| r.function)
        .map(|r| r.name.clone())
        .collect::<BTreeSet<_>>();

    let mut flags = BTreeMap::new();

    // 64-bit ABIs have a 64-bit off_t natively.
    if !class64 {
        if let Some(function) = find_missing_lfs(|name| functions.contains(name)) {
            flags.insert(StructuralFlag::MissingLfs, function.to_string());
        }
    }

    if artifact.kind() == ArtifactKind::SharedLibrary {
        match &shared_object_name {
            None => {
                flags.insert(StructuralFlag::UnversionedShlib, "no SONAME".to_string());
            }
            Some(soname) if !VERSIONED_SONAME_RE.is_match(soname) => {
                flags.insert(StructuralFlag::UnversionedShlib, soname.clone());
            }
            Some(_) => {}
        }
    }

    if object_type == elf::ET_EXEC && !has_dynamic_section {
        flags.insert(StructuralFlag::StaticallyLinked, String::new());
    }

    if let Some(path) = runpath.or(rpath) {
        flags.insert(StructuralFlag::UsesRpath, path);
    }

    if let Some(guard) = numpy_guard(&strings) {
        flags.insert(StructuralFlag::UsesNumpyCAbi, guard);
    }

    Ok(FactSet {
        artifact: artifact.path().to_path_buf(),
        kind: artifact.kind(),
        strings,
        referenced_symbols: references,
        defined_symbols: exports,
        functions,
        flags,
        text: None,
        depends: artifact.depends().cloned(),
    })
}

fn extract_source(artifact: &Artifact, options: &ExtractOptions) -> FactSet {
    let text = String::from_utf8_lossy(artifact.content());
    let source = analyze_source_text(&text);
    let strings = extract_strings(artifact.content(), options.min_string_length, 0);

    let mut flags = BTreeMap::new();

    if !source.defines_file_offset_bits_64 {
        if let Some(function) = find_missing_lfs(|name| source.called_functions.contains(name)) {
            flags.insert(StructuralFlag::MissingLfs, function.to_string());
        }
    }

    if source.called_functions.contains("import_array") {
        flags.insert(StructuralFlag::UsesNumpyCAbi, "import_array".to_string());
    } else if let Some(guard) = numpy_guard(&strings) {
        flags.insert(StructuralFlag::UsesNumpyCAbi, guard);
    }

    FactSet {
        artifact: artifact.path().to_path_buf(),
        kind: artifact.kind(),
        strings,
        referenced_symbols: vec![],
        defined_symbols: BTreeSet::new(),
        functions: source.called_functions,
        flags,
        text: Some(source.normalized_text),
        depends: artifact.depends().cloned(),
    }
}

/// Extract facts from an artifact.
///
/// Fails with [ScanError::MalformedArtifact] if an artifact declared as an ELF
/// file cannot be parsed as one. The result is a pure function of the
/// artifact and options.
pub fn extract(artifact: &Artifact, options: &ExtractOptions) -> Result<FactSet> {
    let facts = if artifact.kind().is_elf() {
        extract_elf(artifact, options)?
    } else {
        extract_source(artifact, options)
    };

    debug!(
        "{}: extracted {} strings, {} symbol references, {} flags",
        artifact.path().display(),
        facts.strings.len(),
        facts.referenced_symbols.len(),
        facts.flags.len()
    );

    Ok(facts)
}
