//! Types and functions for parsing and formatting MediaWiki title strings.

use crate::config::{Configuration, Namespace, NamespaceCase};
use html_escape::decode_html_entities;
use std::borrow::Cow;

/// A normalised page title.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Title {
    /// The namespace ID of the title.
    namespace: i32,

    /// The location of the namespace delimiter in the title, if one exists.
    ///
    /// ```text
    /// Namespace:Title/Sub/Page
    ///          ^
    /// ```
    ns_delimiter: Option<usize>,

    /// The full title text, without fragment.
    text: String,
}

impl Title {
    /// Creates a title from a known namespace plus unnormalised title text.
    pub fn from_parts(namespace: &Namespace, title: &str) -> Self {
        let title = normalize(title);
        let mut text = String::with_capacity(namespace.name.len() + 1 + title.len());

        let ns_delimiter = (!namespace.name.is_empty()).then(|| {
            text += &namespace.name;
            text.push(':');
            namespace.name.len()
        });

        if namespace.case == NamespaceCase::FirstLetter
            && let Some(first) = title.chars().next()
            && first.is_lowercase()
        {
            text.extend(first.to_uppercase());
            text += &title[first.len_utf8()..];
        } else {
            text += &title;
        }

        Self {
            namespace: namespace.id,
            ns_delimiter,
            text,
        }
    }

    /// Creates a new [`Title`] from a title string, using `default_ns` when the
    /// text has no recognised namespace prefix. A leading `:` selects the main
    /// namespace.
    ///
    /// In MediaWiki, this is like `newFromText`.
    pub fn new(text: &str, default_ns: i32, config: &Configuration) -> Self {
        let text = normalize(text);
        let (default_ns, text) = match text.strip_prefix(':') {
            Some(rest) => (Namespace::MAIN, rest.trim_start()),
            None => (default_ns, &*text),
        };

        let (ns, text) = text
            .split_once(':')
            .and_then(|(lhs, rhs)| {
                config
                    .namespace_by_name(lhs.trim_end())
                    .map(|ns| (Cow::Borrowed(ns), rhs.trim_start()))
            })
            .unwrap_or_else(|| (namespace_or_main(config, default_ns), text));

        let text = text.split_once('#').map_or(text, |(text, _)| text.trim_end());
        Self::from_parts(&ns, text)
    }

    /// The parent path of the page.
    ///
    /// ```text
    /// Namespace:Title/Sub/Page
    ///           ^^^^^^^^^
    /// ```
    pub fn base_text(&self) -> &str {
        let text = self.text();
        text.rsplit_once('/').map_or(text, |(base, _)| base)
    }

    /// The full text of the title, including namespace.
    pub fn key(&self) -> &str {
        &self.text
    }

    /// The namespace ID of the title.
    pub fn namespace(&self) -> i32 {
        self.namespace
    }

    /// The namespace part of the title.
    ///
    /// ```text
    /// Namespace:Title/Sub/Page
    /// ^^^^^^^^^
    /// ```
    pub fn ns_text(&self) -> &str {
        &self.text[..self.ns_delimiter.unwrap_or(0)]
    }

    /// The root path of the page.
    ///
    /// ```text
    /// Namespace:Title/Sub/Page
    ///           ^^^^^
    /// ```
    pub fn root_text(&self) -> &str {
        let text = self.text();
        text.split_once('/').map_or(text, |(root, _)| root)
    }

    /// The subpage path of the page.
    ///
    /// ```text
    /// Namespace:Title/Sub/Page
    ///                     ^^^^
    /// ```
    pub fn subpage_text(&self) -> &str {
        let text = self.text();
        text.rsplit_once('/').map_or(text, |(_, sub)| sub)
    }

    /// The path of the page, without namespace.
    ///
    /// ```text
    /// Namespace:Title/Sub/Page
    ///           ^^^^^^^^^^^^^^
    /// ```
    pub fn text(&self) -> &str {
        &self.text[self.ns_delimiter.map_or(0, |d| d + 1)..]
    }
}

impl core::fmt::Display for Title {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Returns the namespace with the given ID, or a bare main namespace if the
/// configuration does not know it.
fn namespace_or_main(config: &Configuration, id: i32) -> Cow<'_, Namespace> {
    config
        .namespace(id)
        .or_else(|| config.namespace(Namespace::MAIN))
        .map_or_else(
            || {
                Cow::Owned(Namespace {
                    id: Namespace::MAIN,
                    name: String::new(),
                    canonical: None,
                    aliases: Vec::new(),
                    case: NamespaceCase::FirstLetter,
                    subpages: false,
                    content: true,
                })
            },
            Cow::Borrowed,
        )
}

/// Returns true if the given character `c` is a bidirectional text control
/// character.
fn bidi(c: char) -> bool {
    ('\u{200e}'..='\u{200f}').contains(&c) || ('\u{202a}'..='\u{202e}').contains(&c)
}

/// Returns true if the character `c` is considered like whitespace in title
/// text.
fn spacelike(c: char) -> bool {
    c == '_' || c.is_whitespace()
}

/// Normalises a title text part by decoding HTML entities, dropping bidi
/// controls, and converting runs of whitespace and underscores to a single
/// space. Leading and trailing whitespace is removed.
pub fn normalize(text: &str) -> Cow<'_, str> {
    let decoded = decode_html_entities(text);
    let mut out = String::with_capacity(decoded.len());
    let mut pending_space = false;
    for c in decoded.chars() {
        if bidi(c) {
            continue;
        } else if spacelike(c) {
            pending_space = !out.is_empty();
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(c);
        }
    }

    if out == text {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize() {
        assert_eq!(super::normalize("A b"), Cow::Borrowed("A b"));
        assert_eq!(super::normalize("A_b"), "A b");
        assert_eq!(super::normalize("A__  __b"), "A b");
        assert_eq!(super::normalize("   A b   "), "A b");
        assert_eq!(super::normalize("\u{200e}A b   \u{202e}"), "A b");
        assert_eq!(super::normalize("A&amp;b"), "A&b");
    }

    #[test]
    fn namespaces() {
        let config = Configuration::default();

        let title = Title::new("foo_bar", Namespace::TEMPLATE, &config);
        assert_eq!(title.key(), "Template:Foo bar");
        assert_eq!(title.namespace(), Namespace::TEMPLATE);
        assert_eq!(title.text(), "Foo bar");
        assert_eq!(title.ns_text(), "Template");

        let title = Title::new("module:test/data", Namespace::MAIN, &config);
        assert_eq!(title.key(), "Module:Test/data");
        assert_eq!(title.base_text(), "Test");
        assert_eq!(title.subpage_text(), "data");

        let title = Title::new(":Main page#Section", Namespace::TEMPLATE, &config);
        assert_eq!(title.key(), "Main page");
        assert_eq!(title.namespace(), Namespace::MAIN);

        let title = Title::new("Project:About", Namespace::MAIN, &config);
        assert_eq!(title.key(), "Wiktionary:About");

        let title = Title::new("Unknown:thing", Namespace::MAIN, &config);
        assert_eq!(title.key(), "Unknown:thing");
    }
}
