// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyword matching for book and note searches.
//!
//! Both searches try, in order: the whole keyword as a case-insensitive
//! substring, then each whitespace-separated sub-token, then a
//! keyword-length-specific fallback.

use marginalia_core::{Book, Note};

/// Keywords up to this many characters get the fuzzy note fallback.
const FUZZY_MAX_CHARS: usize = 3;

/// Whether `book`'s title or author matches `keyword`.
pub fn book_matches(book: &Book, keyword: &str) -> bool {
    let keyword = keyword.trim().to_lowercase();
    if keyword.is_empty() {
        return false;
    }
    let title = book.title.to_lowercase();
    let author = book.author.as_deref().unwrap_or_default().to_lowercase();
    let hit = |needle: &str| title.contains(needle) || author.contains(needle);

    if hit(&keyword) || sub_tokens(&keyword).any(hit) {
        return true;
    }

    // A single ideograph is matched by containment on its own.
    let mut chars = keyword.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => title.contains(c) || author.contains(c),
        _ => false,
    }
}

/// Whether any searchable text of `note` matches `keyword`.
pub fn note_matches(note: &Note, keyword: &str) -> bool {
    let keyword = keyword.trim().to_lowercase();
    if keyword.is_empty() {
        return false;
    }
    let text = note.full_text().to_lowercase();

    if text.contains(&keyword) || sub_tokens(&keyword).any(|t| text.contains(t)) {
        return true;
    }

    // Short keywords: every character must appear somewhere in the note.
    keyword.chars().count() <= FUZZY_MAX_CHARS
        && keyword
            .chars()
            .filter(|c| !c.is_whitespace())
            .all(|c| text.contains(c))
}

/// Whitespace-separated parts, only when there is more than one.
fn sub_tokens(keyword: &str) -> impl Iterator<Item = &str> {
    let multi = keyword.split_whitespace().nth(1).is_some();
    keyword.split_whitespace().filter(move |_| multi)
}
