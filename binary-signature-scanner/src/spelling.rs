// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Detection of common misspellings in embedded strings. */

use {
    crate::strings::ExtractedString,
    once_cell::sync::Lazy,
    regex::Regex,
    serde::Serialize,
    std::collections::HashMap,
};

/// Misspelled word and its correction.
const CORRECTIONS: &[(&str, &str)] = &[
    ("accesible", "accessible"),
    ("accomodate", "accommodate"),
    ("accross", "across"),
    ("acheive", "achieve"),
    ("adress", "address"),
    ("agressive", "aggressive"),
    ("allready", "already"),
    ("alot", "a lot"),
    ("arguement", "argument"),
    ("begining", "beginning"),
    ("calender", "calendar"),
    ("commited", "committed"),
    ("completly", "completely"),
    ("continous", "continuous"),
    ("definately", "definitely"),
    ("dependant", "dependent"),
    ("existant", "existent"),
    ("exprimental", "experimental"),
    ("explicitely", "explicitly"),
    ("finaly", "finally"),
    ("immediatly", "immediately"),
    ("independant", "independent"),
    ("iz", "is"),
    ("lenght", "length"),
    ("neccessary", "necessary"),
    ("nees", "needs"),
    ("occured", "occurred"),
    ("occurence", "occurrence"),
    ("paramter", "parameter"),
    ("posible", "possible"),
    ("recieve", "receive"),
    ("seperate", "separate"),
    ("speling", "spelling"),
    ("succesful", "successful"),
    ("teh", "the"),
    ("thier", "their"),
    ("untill", "until"),
    ("wich", "which"),
    ("writting", "writing"),
];

static CORRECTIONS_INDEX: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| CORRECTIONS.iter().copied().collect());

/// Runs of letters, digits and apostrophes.
static RE_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{Alphabetic}\p{N}']+").expect("word regex should compile"));

/// A misspelled word found in a string.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Misspelling {
    pub word: String,
    pub correction: &'static str,
    /// Offset of the word within the artifact.
    pub offset: u64,
}

/// Look up the correction for a single word.
///
/// Capitalized words (`Nees`) are assumed to be proper nouns and are skipped.
/// Other words are checked case-insensitively, so `tEH` is caught.
pub fn correction(word: &str) -> Option<&'static str> {
    let mut chars = word.chars();
    let first = chars.next()?;

    if first.is_uppercase() && chars.all(|c| !c.is_uppercase()) {
        return None;
    }

    CORRECTIONS_INDEX.get(word.to_lowercase().as_str()).copied()
}

/// Find the first misspelled word in a sequence of strings.
pub fn find_misspelling(strings: &[ExtractedString]) -> Option<Misspelling> {
    strings.iter().find_map(|s| {
        RE_WORD.find_iter(&s.value).find_map(|word| {
            correction(word.as_str()).map(|correction| Misspelling {
                word: word.as_str().to_string(),
                correction,
                offset: s.offset + word.start() as u64,
            })
        })
    })
}
