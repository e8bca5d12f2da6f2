// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Lexical analysis of C-like source text. */

use {once_cell::sync::Lazy, regex::Regex, std::collections::BTreeSet};

static CALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("call regex should compile")
});

static FILE_OFFSET_BITS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*#\s*define\s+_FILE_OFFSET_BITS\s+64\b")
        .expect("feature macro regex should compile")
});

/// Words that look like calls but are not.
const NON_CALLS: &[&str] = &[
    "defined", "do", "else", "for", "if", "return", "sizeof", "switch", "while",
];

/// Facts derived from source text.
#[derive(Clone, Debug, Default)]
pub struct SourceFacts {
    /// Identifiers in call position.
    pub called_functions: BTreeSet<String>,
    /// Whether `_FILE_OFFSET_BITS` is defined to `64`.
    pub defines_file_offset_bits_64: bool,
    /// Source with all whitespace runs collapsed to a single space.
    pub normalized_text: String,
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn analyze_source_text(text: &str) -> SourceFacts {
    let called_functions = CALL_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|name| !NON_CALLS.contains(name))
        .map(|name| name.to_string())
        .collect::<BTreeSet<_>>();

    SourceFacts {
        called_functions,
        defines_file_offset_bits_64: FILE_OFFSET_BITS_RE.is_match(text),
        normalized_text: normalize_whitespace(text),
    }
}

#[cfg(test)]
mod test {
    use {super::*, indoc::indoc};

    #[test]
    fn calls() {
        let facts = analyze_source_text(indoc! {r#"
            #include <fcntl.h>

            int
            do_open (char *file) {
              if (file == NULL)
                return -1;
              return open (file, O_RDONLY);
            }
        "#});

        assert_eq!(
            facts
                .called_functions
                .iter()
                .map(|x| x.as_str())
                .collect::<Vec<_>>(),
            vec!["do_open", "open"]
        );
        assert!(!facts.defines_file_offset_bits_64);
    }

    #[test]
    fn file_offset_bits() {
        let facts = analyze_source_text("#define _FILE_OFFSET_BITS 64\n#include <stdio.h>\n");
        assert!(facts.defines_file_offset_bits_64);

        let facts = analyze_source_text("#define _FILE_OFFSET_BITS 32\n");
        assert!(!facts.defines_file_offset_bits_64);
    }

    #[test]
    fn normalization() {
        assert_eq!(
            normalize_whitespace("  The fall-through\n    switches\tin  UTF-8\n"),
            "The fall-through switches in UTF-8"
        );
    }
}
