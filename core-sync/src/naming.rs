//! File and folder name templates
//!
//! | Wildcard | Value |
//! |----------|-------|
//! | `%a` | first creator; `A_B` for two, `A_et_al` for more |
//! | `%y` | year |
//! | `%t` | title, truncated to 80 characters (file names only) |
//! | `%j` | journal or publication |
//!
//! Unknown wildcards are kept literally. Every rendered piece is sanitized
//! for use as a path component.

use bridge_traits::BibliographicInfo;
use std::path::PathBuf;

use crate::paths::sanitize_component;

const MAX_TITLE_CHARS: usize = 80;

fn authors(info: &BibliographicInfo) -> String {
    match info.creators.as_slice() {
        [] => String::new(),
        [one] => one.clone(),
        [first, second] => format!("{}_{}", first, second),
        [first, ..] => format!("{}_et_al", first),
    }
}

fn render(template: &str, info: &BibliographicInfo, allow_title: bool) -> String {
    let mut rendered = String::new();
    let mut chars = template.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            rendered.push(c);
            continue;
        }

        match chars.next() {
            Some('a') => rendered.push_str(&authors(info)),
            Some('y') => rendered.push_str(info.year.as_deref().unwrap_or_default()),
            Some('t') if allow_title => {
                rendered.extend(info.title.chars().take(MAX_TITLE_CHARS));
            }
            Some('j') => rendered.push_str(info.publication.as_deref().unwrap_or_default()),
            Some(other) => {
                rendered.push('%');
                rendered.push(other);
            }
            None => rendered.push('%'),
        }
    }

    rendered
}

/// Render a file name from `template`, keeping `extension` (with its dot)
///
/// Returns `None` when the template renders to nothing usable, so the
/// caller can fall back to the source name.
pub fn render_file_name(
    template: &str,
    info: &BibliographicInfo,
    extension: &str,
) -> Option<String> {
    let stem = sanitize_component(&render(template, info, true));
    let stem = stem.trim_matches('_');
    if stem.is_empty() {
        return None;
    }
    Some(format!("{}{}", stem, extension))
}

/// Render a relative subfolder path; `/` in the template separates levels
/// and empty levels are dropped
pub fn render_subfolder(template: &str, info: &BibliographicInfo) -> PathBuf {
    template
        .split('/')
        .map(|segment| sanitize_component(&render(segment, info, false)))
        .map(|segment| segment.trim_matches('_').to_string())
        .filter(|segment| !segment.is_empty())
        .collect()
}
