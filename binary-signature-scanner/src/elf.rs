// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! ELF file analysis. */

use {
    crate::strings::{extract_strings, ExtractedString},
    object::{
        elf,
        read::elf::{Dyn, FileHeader as ElfFileHeader, SectionHeader, Sym},
        Endianness, FileKind, SectionIndex,
    },
    serde::Serialize,
    std::collections::{BTreeSet, HashSet},
    thiserror::Error,
};

/// Reasons an ELF file could not be analyzed.
#[derive(Debug, Error)]
pub enum ElfError {
    #[error("not an ELF file ({0:?})")]
    NotElf(FileKind),

    #[error("ELF parse error: {0}")]
    Parse(#[from] object::read::Error),
}

/// An undefined dynamic symbol, to be resolved by the dynamic linker.
///
/// This records that the object *links against* a symbol. It says nothing about
/// whether any code path actually calls it.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize)]
pub struct SymbolReference {
    pub name: String,
    /// GNU symbol version, e.g. `GLIBC_2.2.5`.
    pub version: Option<String>,
    /// Whether the symbol is a function (or untyped).
    #[serde(skip)]
    pub function: bool,
}

/// Facts about an ELF file relevant to linting.
#[derive(Clone, Debug, Default)]
pub struct ElfFacts {
    pub class64: bool,
    pub object_type: u16,
    /// Printable strings from readable data sections, ordered by file offset.
    pub strings: Vec<ExtractedString>,
    /// Undefined dynamic symbols in symbol table order, deduplicated.
    pub references: Vec<SymbolReference>,
    /// Defined dynamic symbols.
    pub exports: BTreeSet<String>,
    pub has_dynamic_section: bool,
    pub needed_libraries: Vec<String>,
    pub shared_object_name: Option<String>,
    pub rpath: Option<String>,
    pub runpath: Option<String>,
}

/// Analyze ELF file data.
///
/// Errors if the data is not an ELF file or the ELF structures are corrupt.
pub fn analyze_elf_data(data: &[u8], min_string_length: usize) -> Result<ElfFacts, ElfError> {
    match FileKind::parse(data)? {
        FileKind::Elf32 => Ok(analyze_elf::<elf::FileHeader32<Endianness>>(
            data,
            min_string_length,
        )?),
        FileKind::Elf64 => Ok(analyze_elf::<elf::FileHeader64<Endianness>>(
            data,
            min_string_length,
        )?),
        kind => Err(ElfError::NotElf(kind)),
    }
}

fn analyze_elf<Elf: ElfFileHeader<Endian = Endianness>>(
    data: &[u8],
    min_string_length: usize,
) -> object::read::Result<ElfFacts> {
    let f = Elf::parse(data)?;
    let endian = f.endian()?;

    let mut facts = ElfFacts {
        class64: f.is_class_64(),
        object_type: f.e_type(endian),
        ..Default::default()
    };

    let sections = f.sections(endian, data)?;
    let versions = sections.versions(endian, data)?;
    let mut seen_references = HashSet::new();

    if sections.is_empty() {
        // Without section headers we can't tell data from code.
        facts.strings = extract_strings(data, min_string_length, 0);
    }

    for (section_index, section) in sections.iter().enumerate() {
        let section_type = section.sh_type(endian);
        let flags: u64 = section.sh_flags(endian).into();

        if section_type == elf::SHT_PROGBITS
            && flags & u64::from(elf::SHF_ALLOC) != 0
            && flags & u64::from(elf::SHF_EXECINSTR) == 0
        {
            facts.strings.extend(extract_strings(
                section.data(endian, data)?,
                min_string_length,
                section.sh_offset(endian).into(),
            ));
        }

        if section_type == elf::SHT_DYNSYM {
            if let Some(symbols) =
                section.symbols(endian, data, &sections, SectionIndex(section_index))?
            {
                let strings = symbols.strings();

                for (symbol_index, symbol) in symbols.iter().enumerate() {
                    // Index 0 is the reserved null symbol.
                    if symbol_index == 0 {
                        continue;
                    }

                    let name = String::from_utf8_lossy(symbol.name(endian, strings)?).to_string();
                    if name.is_empty() {
                        continue;
                    }

                    if !symbol.is_undefined(endian) {
                        facts.exports.insert(name);
                        continue;
                    }

                    let version = if let Some(versions) = &versions {
                        let index = versions.version_index(endian, symbol_index);
                        versions
                            .version(index)?
                            .map(|v| String::from_utf8_lossy(v.name()).to_string())
                    } else {
                        None
                    };

                    if !seen_references.insert(name.clone()) {
                        continue;
                    }

                    facts.references.push(SymbolReference {
                        name,
                        version,
                        function: matches!(symbol.st_type(), elf::STT_FUNC | elf::STT_NOTYPE),
                    });
                }
            }
        }

        if let Some((entries, index)) = section.dynamic(endian, data)? {
            facts.has_dynamic_section = true;
            let strings = sections.strings(endian, data, index).unwrap_or_default();

            for entry in entries {
                let string = || -> object::read::Result<String> {
                    Ok(String::from_utf8_lossy(entry.string(endian, strings)?).to_string())
                };

                match entry.tag32(endian) {
                    Some(elf::DT_NEEDED) => facts.needed_libraries.push(string()?),
                    Some(elf::DT_SONAME) => facts.shared_object_name = Some(string()?),
                    Some(elf::DT_RPATH) => facts.rpath = Some(string()?),
                    Some(elf::DT_RUNPATH) => facts.runpath = Some(string()?),
                    Some(elf::DT_NULL) => break,
                    _ => {}
                }
            }
        }
    }

    facts.strings.sort_by_key(|s| s.offset);

    Ok(facts)
}

#[cfg(test)]
mod test {
    use {super::*, crate::testutil::ElfBuilder};

    #[test]
    fn elf64_executable() -> Result<(), ElfError> {
        let data = ElfBuilder::new64()
            .string("Hello world!")
            .import("printf")
            .import("memcpy")
            .import("printf")
            .import_object("stdout")
            .export("main")
            .build();

        let facts = analyze_elf_data(&data, 4)?;
        assert!(facts.class64);
        assert_eq!(facts.object_type, elf::ET_EXEC);
        assert_eq!(
            facts
                .strings
                .iter()
                .map(|s| s.value.as_str())
                .collect::<Vec<_>>(),
            vec!["Hello world!"]
        );
        assert_eq!(
            facts
                .references
                .iter()
                .map(|r| (r.name.as_str(), r.function))
                .collect::<Vec<_>>(),
            vec![("printf", true), ("memcpy", true), ("stdout", false)]
        );
        assert!(facts.exports.contains("main"));
        assert!(facts.has_dynamic_section);
        assert_eq!(facts.needed_libraries, vec!["libc.so.6"]);
        assert_eq!(facts.shared_object_name, None);

        Ok(())
    }

    #[test]
    fn repeated_imports_keep_first_occurrence() -> Result<(), ElfError> {
        let names = (0..500).map(|i| format!("sym{}", i % 50)).collect::<Vec<_>>();
        let data = names
            .iter()
            .fold(ElfBuilder::new64(), |builder, name| builder.import(name))
            .build();

        let facts = analyze_elf_data(&data, 4)?;
        assert_eq!(
            facts
                .references
                .iter()
                .map(|r| r.name.clone())
                .collect::<Vec<_>>(),
            names[0..50].to_vec()
        );

        Ok(())
    }

    #[test]
    fn elf32_shared_object() -> Result<(), ElfError> {
        let data = ElfBuilder::new32()
            .shared_object()
            .soname("libfoo.so.1")
            .runpath("/opt/foo/lib")
            .import("open")
            .string("first string")
            .string("second string")
            .build();

        let facts = analyze_elf_data(&data, 4)?;
        assert!(!facts.class64);
        assert_eq!(facts.object_type, elf::ET_DYN);
        assert_eq!(facts.shared_object_name.as_deref(), Some("libfoo.so.1"));
        assert_eq!(facts.runpath.as_deref(), Some("/opt/foo/lib"));
        assert_eq!(facts.references[0].name, "open");
        assert_eq!(facts.strings.len(), 2);
        assert!(facts.strings[0].offset < facts.strings[1].offset);

        // Offsets are file offsets.
        let first = &facts.strings[0];
        let offset = first.offset as usize;
        assert_eq!(&data[offset..offset + first.value.len()], b"first string");

        Ok(())
    }

    #[test]
    fn static_executable() -> Result<(), ElfError> {
        let data = ElfBuilder::new64().static_executable().build();

        let facts = analyze_elf_data(&data, 4)?;
        assert!(!facts.has_dynamic_section);
        assert!(facts.references.is_empty());

        Ok(())
    }

    #[test]
    fn malformed() {
        let data = ElfBuilder::new64().build();

        assert!(analyze_elf_data(&data[0..20], 4).is_err());
        assert!(analyze_elf_data(b"\x7fELF", 4).is_err());
        assert!(analyze_elf_data(b"#!/bin/sh\necho hello\n", 4).is_err());
        assert!(analyze_elf_data(b"", 4).is_err());
    }
}
