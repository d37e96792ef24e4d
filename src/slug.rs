//! URL slug derivation for article and subject titles.
//!
//! Every title is mapped to a lowercase ASCII identifier that doubles as the
//! output filename stem:
//! - `"Hello, World!"` → `"hello-world"`
//! - `"Rust 2024: What's New?"` → `"rust-2024-what-s-new"`
//! - `"___"` → `""`
//!
//! An empty slug is a legal return value. Storage rejects it at write time;
//! the generator never validates it.

/// Derive a URL-safe slug from free text.
///
/// Lowercases the input, collapses every maximal run of characters outside
/// `[a-z0-9]` to a single `-`, and trims leading and trailing dashes.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Pick a free slug for a new or renamed entity.
///
/// Returns `slug` unchanged when it is free, otherwise the first
/// of `slug-2`, `slug-3`, … that is free. The storage layer calls this on
/// writes; `check` uses it to suggest renames for colliding slugs.
pub fn disambiguate(slug: &str, is_taken: impl Fn(&str) -> bool) -> String {
    if !is_taken(slug) {
        return slug.to_string();
    }
    (2u64..)
        .map(|n| format!("{slug}-{n}"))
        .find(|candidate| !is_taken(candidate))
        .unwrap_or_else(|| slug.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn punctuation_and_trailing_space_collapse() {
        assert_eq!(slugify("Hello, World!  "), "hello-world");
    }

    #[test]
    fn no_alphanumerics_yields_empty() {
        assert_eq!(slugify("___"), "");
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("  -- !! "), "");
    }

    #[test]
    fn leading_separators_trimmed() {
        assert_eq!(slugify("  --Intro"), "intro");
    }

    #[test]
    fn digits_preserved() {
        assert_eq!(slugify("Rust 2024: What's New?"), "rust-2024-what-s-new");
    }

    #[test]
    fn non_ascii_letters_are_separators() {
        assert_eq!(slugify("Café au lait"), "caf-au-lait");
        assert_eq!(slugify("日本語"), "");
    }

    #[test]
    fn underscores_become_dashes() {
        assert_eq!(slugify("snake_case_title"), "snake-case-title");
    }

    #[test]
    fn slugify_is_idempotent() {
        let once = slugify("A  Tale -- of Two   Cities");
        assert_eq!(slugify(&once), once);
    }

    #[test]
    fn disambiguate_free_slug_unchanged() {
        let taken: HashSet<&str> = HashSet::new();
        assert_eq!(disambiguate("hello", |s| taken.contains(s)), "hello");
    }

    #[test]
    fn disambiguate_appends_first_free_suffix() {
        let taken: HashSet<&str> = ["hello", "hello-2"].into_iter().collect();
        assert_eq!(disambiguate("hello", |s| taken.contains(s)), "hello-3");
    }
}
