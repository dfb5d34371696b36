//! Language-aware text normalization.
//!
//! Archived mail is mostly Dutch, so folding strips the diacritics that
//! Dutch and neighbouring Latin-script languages use (`ë`, `é`, `ï`, `ĳ`, ...)
//! and the stop-word list covers both Dutch and English function words.

use std::collections::BTreeSet;

/// Case-folds `text` and strips diacritics.
#[must_use]
pub fn fold(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars().flat_map(char::to_lowercase) {
        match c {
            'ß' => out.push_str("ss"),
            'æ' => out.push_str("ae"),
            'œ' => out.push_str("oe"),
            'ĳ' => out.push_str("ij"),
            _ => out.push(fold_char(c)),
        }
    }
    out
}

fn fold_char(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => 'a',
        'ç' | 'ć' | 'č' | 'ĉ' => 'c',
        'ď' | 'đ' => 'd',
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => 'e',
        'ğ' | 'ģ' => 'g',
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' | 'ı' => 'i',
        'ķ' => 'k',
        'ł' | 'ľ' | 'ļ' => 'l',
        'ñ' | 'ń' | 'ň' | 'ņ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => 'o',
        'ŕ' | 'ř' => 'r',
        'ś' | 'š' | 'ş' => 's',
        'ť' | 'ţ' => 't',
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' | 'ų' => 'u',
        'ý' | 'ÿ' => 'y',
        'ź' | 'ż' | 'ž' => 'z',
        other => other,
    }
}

/// Folds `text` and collapses runs of whitespace into single spaces.
///
/// Used for phrase matching against subjects; an all-whitespace input
/// normalizes to the empty string.
#[must_use]
pub fn normalize_phrase(text: &str) -> String {
    fold(text).split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits `text` into folded terms with stop-words removed, in input order.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    fold(text)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|term| !term.is_empty() && !is_stop_word(term))
        .map(ToString::to_string)
        .collect()
}

/// Distinct terms of `text`.
#[must_use]
pub fn terms(text: &str) -> BTreeSet<String> {
    tokenize(text).into_iter().collect()
}

/// Returns `true` for Dutch and English function words.
///
/// Expects an already folded term.
#[must_use]
pub fn is_stop_word(term: &str) -> bool {
    matches!(
        term,
        // Dutch
        "aan" | "al" | "als" | "bij" | "dan" | "dat" | "de" | "deze" | "die" | "dit"
            | "door" | "een" | "en" | "er" | "had" | "heeft" | "hebben" | "het" | "hij"
            | "hun" | "ik" | "in" | "is" | "je" | "kan" | "kunnen" | "maar" | "met"
            | "mijn" | "moet" | "naar" | "niet" | "nog" | "of" | "om" | "ons" | "onze"
            | "ook" | "op" | "over" | "te" | "tot" | "u" | "uit" | "van" | "voor" | "was"
            | "wat" | "we" | "wel" | "werd" | "wij" | "wordt" | "worden" | "ze" | "zij"
            | "zijn" | "zo" | "zou"
            // English
            | "a" | "an" | "and" | "are" | "as" | "at" | "be" | "by" | "for" | "from"
            | "has" | "have" | "it" | "its" | "on" | "or" | "that" | "the" | "this"
            | "to" | "were" | "will" | "with"
    )
}
