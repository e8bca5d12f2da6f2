// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Units of analysis. */

use {
    crate::{
        dependency::DependencyList,
        error::{Result, ScanError},
    },
    object::{elf, Endianness, FileKind},
    serde::Serialize,
    std::path::{Path, PathBuf},
    strum::{Display, EnumString},
};

/// The declared flavor of an artifact.
#[derive(Clone, Copy, Debug, Display, EnumString, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ArtifactKind {
    /// An executable ELF file.
    Binary,
    /// An ELF shared object.
    SharedLibrary,
    /// A source or otherwise textual file.
    SourceText,
}

impl ArtifactKind {
    /// Whether artifacts of this kind must be ELF containers.
    pub fn is_elf(&self) -> bool {
        matches!(self, Self::Binary | Self::SharedLibrary)
    }

    /// Guess the kind of an artifact from its name and content.
    ///
    /// ELF objects of type `ET_DYN` named like `*.so*` are shared libraries.
    /// Other ELF files are binaries (including position independent
    /// executables). Everything else is treated as text.
    pub fn detect(path: &Path, data: &[u8]) -> Self {
        let object_type = match FileKind::parse(data) {
            Ok(FileKind::Elf32) => elf_object_type::<elf::FileHeader32<Endianness>>(data),
            Ok(FileKind::Elf64) => elf_object_type::<elf::FileHeader64<Endianness>>(data),
            // A corrupt ELF file is still an ELF file and must fail extraction.
            _ if data.starts_with(&elf::ELFMAG) => None,
            _ => return Self::SourceText,
        };

        let looks_like_shlib = path
            .file_name()
            .map(|name| {
                let name = name.to_string_lossy();
                name.ends_with(".so") || name.contains(".so.")
            })
            .unwrap_or(false);

        match object_type {
            Some(elf::ET_DYN) if looks_like_shlib => Self::SharedLibrary,
            _ => Self::Binary,
        }
    }
}

fn elf_object_type<Elf: object::read::elf::FileHeader<Endian = Endianness>>(
    data: &[u8],
) -> Option<u16> {
    let header = Elf::parse(data).ok()?;
    let endian = header.endian().ok()?;

    Some(header.e_type(endian))
}

/// An immutable input to a scan.
///
/// Content is read once and never mutated. Ownership of the buffer belongs to
/// whoever scans the artifact and it is released when the artifact is dropped.
#[derive(Clone, Debug)]
pub struct Artifact {
    path: PathBuf,
    content: Vec<u8>,
    kind: ArtifactKind,
    depends: Option<DependencyList>,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>, content: Vec<u8>, kind: ArtifactKind) -> Self {
        Self {
            path: path.into(),
            content,
            kind,
            depends: None,
        }
    }

    /// Read an artifact from the filesystem.
    ///
    /// If `kind` is `None`, it is detected from the content.
    pub fn from_path(path: impl AsRef<Path>, kind: Option<ArtifactKind>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read(path).map_err(|source| ScanError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let kind = kind.unwrap_or_else(|| ArtifactKind::detect(path, &content));

        Ok(Self::new(path, content, kind))
    }

    /// Attach the package relationships of the package shipping this artifact.
    #[must_use]
    pub fn with_depends(mut self, depends: DependencyList) -> Self {
        self.depends = Some(depends);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn depends(&self) -> Option<&DependencyList> {
        self.depends.as_ref()
    }
}
