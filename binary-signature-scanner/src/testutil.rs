// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Synthesizes small little-endian ELF images for tests.
//!
//! The images only carry what fact extraction looks at: a `.rodata` section,
//! the dynamic symbol and string tables and a `.dynamic` section. They have no
//! program headers and cannot be executed.

use object::elf::{
    DT_NEEDED, DT_NULL, DT_RUNPATH, DT_SONAME, ELFCLASS32, ELFCLASS64, ELFDATA2LSB, ELFMAG,
    EM_386, EM_X86_64, ET_DYN, ET_EXEC, EV_CURRENT, SHF_ALLOC, SHF_WRITE, SHT_DYNAMIC, SHT_DYNSYM,
    SHT_PROGBITS, SHT_STRTAB, STB_GLOBAL, STT_FUNC, STT_OBJECT,
};

#[derive(Clone, Debug)]
pub struct ElfBuilder {
    class64: bool,
    object_type: u16,
    rodata: Vec<u8>,
    imports: Vec<(String, u8)>,
    exports: Vec<String>,
    needed: Vec<String>,
    soname: Option<String>,
    runpath: Option<String>,
    dynamic: bool,
}

struct Section {
    name: &'static str,
    typ: u32,
    flags: u32,
    data: Vec<u8>,
    link: u32,
    info: u32,
    entsize: u64,
}

impl ElfBuilder {
    fn new(class64: bool) -> Self {
        Self {
            class64,
            object_type: ET_EXEC,
            rodata: vec![0],
            imports: vec![],
            exports: vec![],
            needed: vec!["libc.so.6".into()],
            soname: None,
            runpath: None,
            dynamic: true,
        }
    }

    /// A 64-bit executable.
    pub fn new64() -> Self {
        Self::new(true)
    }

    /// A 32-bit executable.
    pub fn new32() -> Self {
        Self::new(false)
    }

    /// Mark the image as `ET_DYN`.
    pub fn shared_object(mut self) -> Self {
        self.object_type = ET_DYN;
        self
    }

    /// Drop all dynamic linking information.
    pub fn static_executable(mut self) -> Self {
        self.dynamic = false;
        self
    }

    /// Append a NUL terminated string constant to `.rodata`.
    pub fn string(mut self, s: &str) -> Self {
        self.rodata.extend_from_slice(s.as_bytes());
        self.rodata.push(0);
        self
    }

    /// Append raw bytes to `.rodata`.
    pub fn bytes(mut self, data: &[u8]) -> Self {
        self.rodata.extend_from_slice(data);
        self
    }

    /// Add an undefined function symbol.
    pub fn import(mut self, name: &str) -> Self {
        self.imports.push((name.into(), STT_FUNC));
        self
    }

    /// Add an undefined data symbol.
    pub fn import_object(mut self, name: &str) -> Self {
        self.imports.push((name.into(), STT_OBJECT));
        self
    }

    /// Add a defined function symbol.
    pub fn export(mut self, name: &str) -> Self {
        self.exports.push(name.into());
        self
    }

    pub fn soname(mut self, soname: &str) -> Self {
        self.soname = Some(soname.into());
        self
    }

    pub fn runpath(mut self, runpath: &str) -> Self {
        self.runpath = Some(runpath.into());
        self
    }

    fn word(&self, out: &mut Vec<u8>, value: u64) {
        if self.class64 {
            out.extend_from_slice(&value.to_le_bytes());
        } else {
            out.extend_from_slice(&(value as u32).to_le_bytes());
        }
    }

    fn symbol(&self, out: &mut Vec<u8>, name: u32, info: u8, shndx: u16) {
        out.extend_from_slice(&name.to_le_bytes());
        if self.class64 {
            out.push(info);
            out.push(0);
            out.extend_from_slice(&shndx.to_le_bytes());
            out.extend_from_slice(&0u64.to_le_bytes());
            out.extend_from_slice(&0u64.to_le_bytes());
        } else {
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes());
            out.push(info);
            out.push(0);
            out.extend_from_slice(&shndx.to_le_bytes());
        }
    }

    fn sections(&self) -> Vec<Section> {
        let mut sections = vec![Section {
            name: ".rodata",
            typ: SHT_PROGBITS,
            flags: SHF_ALLOC,
            data: self.rodata.clone(),
            link: 0,
            info: 0,
            entsize: 0,
        }];

        if !self.dynamic {
            return sections;
        }

        let mut dynstr = vec![0u8];
        let mut add_string = |s: &str| -> u32 {
            let offset = dynstr.len() as u32;
            dynstr.extend_from_slice(s.as_bytes());
            dynstr.push(0);
            offset
        };

        let imports = self
            .imports
            .iter()
            .map(|(name, typ)| (add_string(name.as_str()), *typ))
            .collect::<Vec<_>>();
        let exports = self
            .exports
            .iter()
            .map(|name| add_string(name.as_str()))
            .collect::<Vec<_>>();
        let needed = self
            .needed
            .iter()
            .map(|name| add_string(name.as_str()))
            .collect::<Vec<_>>();
        let soname = self.soname.as_deref().map(|x| add_string(x));
        let runpath = self.runpath.as_deref().map(|x| add_string(x));

        // Section indices: 1 .rodata, 2 .dynstr, 3 .dynsym, 4 .dynamic.
        let mut dynsym = vec![];
        self.symbol(&mut dynsym, 0, 0, 0);
        for (name, typ) in imports {
            self.symbol(&mut dynsym, name, (STB_GLOBAL << 4) | typ, 0);
        }
        for name in exports {
            self.symbol(&mut dynsym, name, (STB_GLOBAL << 4) | STT_FUNC, 1);
        }

        let mut dynamic = vec![];
        for name in needed {
            self.word(&mut dynamic, DT_NEEDED.into());
            self.word(&mut dynamic, name as u64);
        }
        if let Some(soname) = soname {
            self.word(&mut dynamic, DT_SONAME.into());
            self.word(&mut dynamic, soname as u64);
        }
        if let Some(runpath) = runpath {
            self.word(&mut dynamic, DT_RUNPATH.into());
            self.word(&mut dynamic, runpath as u64);
        }
        self.word(&mut dynamic, DT_NULL.into());
        self.word(&mut dynamic, 0);

        let (symbol_size, dyn_size) = if self.class64 { (24, 16) } else { (16, 8) };

        sections.push(Section {
            name: ".dynstr",
            typ: SHT_STRTAB,
            flags: SHF_ALLOC,
            data: dynstr,
            link: 0,
            info: 0,
            entsize: 0,
        });
        sections.push(Section {
            name: ".dynsym",
            typ: SHT_DYNSYM,
            flags: SHF_ALLOC,
            data: dynsym,
            link: 2,
            info: 1,
            entsize: symbol_size,
        });
        sections.push(Section {
            name: ".dynamic",
            typ: SHT_DYNAMIC,
            flags: SHF_WRITE | SHF_ALLOC,
            data: dynamic,
            link: 2,
            info: 0,
            entsize: dyn_size,
        });

        sections
    }

    pub fn build(&self) -> Vec<u8> {
        let mut sections = self.sections();

        let mut shstrtab = vec![0u8];
        let mut names = vec![];
        for section in &sections {
            names.push(shstrtab.len() as u32);
            shstrtab.extend_from_slice(section.name.as_bytes());
            shstrtab.push(0);
        }
        names.push(shstrtab.len() as u32);
        shstrtab.extend_from_slice(b".shstrtab\0");

        sections.push(Section {
            name: ".shstrtab",
            typ: SHT_STRTAB,
            flags: 0,
            data: shstrtab,
            link: 0,
            info: 0,
            entsize: 0,
        });

        let (header_size, section_header_size) = if self.class64 { (64, 64) } else { (52, 40) };

        // Lay out section contents after the header, 8 byte aligned.
        let mut body = vec![];
        let mut offsets = vec![];
        for section in &sections {
            while (header_size + body.len()) % 8 != 0 {
                body.push(0);
            }
            offsets.push((header_size + body.len()) as u64);
            body.extend_from_slice(&section.data);
        }
        while (header_size + body.len()) % 8 != 0 {
            body.push(0);
        }
        let section_headers_offset = (header_size + body.len()) as u64;
        let section_count = sections.len() as u16 + 1;

        let mut out = ELFMAG.to_vec();
        out.push(if self.class64 { ELFCLASS64 } else { ELFCLASS32 });
        out.push(ELFDATA2LSB);
        out.push(EV_CURRENT);
        out.extend_from_slice(&[0u8; 9]);
        out.extend_from_slice(&self.object_type.to_le_bytes());
        out.extend_from_slice(&(if self.class64 { EM_X86_64 } else { EM_386 }).to_le_bytes());
        out.extend_from_slice(&u32::from(EV_CURRENT).to_le_bytes());
        self.word(&mut out, 0); // e_entry
        self.word(&mut out, 0); // e_phoff
        self.word(&mut out, section_headers_offset);
        out.extend_from_slice(&0u32.to_le_bytes()); // e_flags
        out.extend_from_slice(&(header_size as u16).to_le_bytes());
        out.extend_from_slice(&(if self.class64 { 56u16 } else { 32u16 }).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // e_phnum
        out.extend_from_slice(&(section_header_size as u16).to_le_bytes());
        out.extend_from_slice(&section_count.to_le_bytes());
        out.extend_from_slice(&(section_count - 1).to_le_bytes()); // e_shstrndx
        assert_eq!(out.len(), header_size);

        out.extend_from_slice(&body);

        // Null section header.
        out.resize(out.len() + section_header_size, 0);

        for ((section, offset), name) in sections.iter().zip(offsets).zip(names) {
            let start = out.len();
            out.extend_from_slice(&name.to_le_bytes());
            out.extend_from_slice(&section.typ.to_le_bytes());
            self.word(&mut out, section.flags.into());
            self.word(&mut out, 0); // sh_addr
            self.word(&mut out, offset);
            self.word(&mut out, section.data.len() as u64);
            out.extend_from_slice(&section.link.to_le_bytes());
            out.extend_from_slice(&section.info.to_le_bytes());
            self.word(&mut out, 1); // sh_addralign
            self.word(&mut out, section.entsize);
            assert_eq!(out.len() - start, section_header_size);
        }

        out
    }
}
