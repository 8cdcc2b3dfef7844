//! Strip markers: opaque placeholders for content which must not be touched
//! by later expansion.
//!
//! A strip marker is the text ``\x7f'"`UNIQ--{kind}-{counter}-QINU`"'\x7f``,
//! where `counter` is eight uppercase hexadecimal digits. Counters are kept
//! per kind, start at zero for every page, and are never reused.

use regex::Regex;
use std::{borrow::Cow, collections::HashMap, sync::LazyLock};

/// The text which starts every strip marker.
pub const MARKER_PREFIX: &str = "\x7f'\"`UNIQ-";

/// The text which ends every strip marker.
pub const MARKER_SUFFIX: &str = "-QINU`\"'\x7f";

/// Matches one strip marker, capturing its kind and counter. Kinds are tag
/// names, which may contain hyphens.
static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("\x7f'\"`UNIQ--([^\x7f]+?)-([0-9A-F]{8})-QINU`\"'\x7f").unwrap()
});

/// The strip markers minted while expanding one page.
#[derive(Debug, Default)]
pub struct StripMarkers {
    /// The next counter for each kind.
    counters: HashMap<String, u32>,
    /// The payload of each minted marker, keyed by marker text.
    payloads: HashMap<String, String>,
}

impl StripMarkers {
    /// Mints a new marker of the given `kind` wrapping `payload`.
    pub fn mint(&mut self, kind: &str, payload: impl Into<String>) -> String {
        let counter = self.counters.entry(kind.to_string()).or_default();
        let marker = format!("{MARKER_PREFIX}-{kind}-{counter:08X}{MARKER_SUFFIX}");
        *counter += 1;
        self.payloads.insert(marker.clone(), payload.into());
        marker
    }

    /// Forgets every minted marker and resets all counters.
    pub fn reset(&mut self) {
        self.counters.clear();
        self.payloads.clear();
    }

    /// Returns the payload of the given marker.
    pub fn get(&self, marker: &str) -> Option<&str> {
        self.payloads.get(marker).map(String::as_str)
    }

    /// Returns the number of markers minted since the last reset.
    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    /// Returns true if no markers were minted since the last reset.
    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    /// Replaces every known marker in `text` with the result of `f`, which
    /// receives the marker kind and payload. Unknown markers are kept.
    pub fn replace<'a, F>(&self, text: &'a str, mut f: F) -> Cow<'a, str>
    where
        F: FnMut(&str, &str) -> Option<String>,
    {
        MARKER.replace_all(text, |caps: &regex::Captures<'_>| {
            let marker = &caps[0];
            self.get(marker)
                .and_then(|payload| f(&caps[1], payload))
                .unwrap_or_else(|| marker.to_string())
        })
    }

    /// Replaces every known marker in `text` with its payload.
    pub fn unstrip<'a>(&self, text: &'a str) -> Cow<'a, str> {
        self.replace(text, |_, payload| Some(payload.to_string()))
    }
}

/// Removes every strip marker from `text`.
pub fn kill_markers(text: &str) -> Cow<'_, str> {
    MARKER.replace_all(text, "")
}

/// Calls `f` on every run of text in `text` between strip markers, keeping
/// the markers themselves unchanged.
pub(crate) fn for_each_non_marker<F>(text: &str, mut f: F) -> String
where
    F: FnMut(&str) -> String,
{
    let mut out = String::with_capacity(text.len());
    let mut flushed = 0;
    for marker in MARKER.find_iter(text) {
        out += &f(&text[flushed..marker.start()]);
        out += marker.as_str();
        flushed = marker.end();
    }
    out += &f(&text[flushed..]);
    out
}

/// Returns the kind of the strip marker `marker`, if it is one.
pub fn marker_kind(marker: &str) -> Option<&str> {
    MARKER
        .captures(marker)
        .filter(|caps| caps[0].len() == marker.len())
        .and_then(|caps| caps.get(1))
        .map(|kind| kind.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_per_kind_and_never_reused() {
        let mut markers = StripMarkers::default();
        let a = markers.mint("nowiki", "");
        let b = markers.mint("nowiki", "");
        let h = markers.mint("h", "");
        assert_eq!(a, "\x7f'\"`UNIQ--nowiki-00000000-QINU`\"'\x7f");
        assert_eq!(b, "\x7f'\"`UNIQ--nowiki-00000001-QINU`\"'\x7f");
        assert_eq!(h, "\x7f'\"`UNIQ--h-00000000-QINU`\"'\x7f");
        assert_eq!(markers.len(), 3);

        markers.reset();
        assert!(markers.is_empty());
        assert_eq!(markers.mint("nowiki", "x"), a);
    }

    #[test]
    fn hex_counter() {
        let mut markers = StripMarkers::default();
        let last = (0..=26).map(|_| markers.mint("ref", "")).last().unwrap();
        assert_eq!(last, "\x7f'\"`UNIQ--ref-0000001A-QINU`\"'\x7f");
        assert_eq!(marker_kind(&last), Some("ref"));
    }

    #[test]
    fn hyphenated_kinds() {
        let mut markers = StripMarkers::default();
        let marker = markers.mint("syntax-highlight", "<pre>x</pre>");
        assert_eq!(marker_kind(&marker), Some("syntax-highlight"));
        assert_eq!(markers.unstrip(&format!("a{marker}b")), "a<pre>x</pre>b");
        assert_eq!(kill_markers(&format!("a{marker}b{marker}c")), "abc");
    }

    #[test]
    fn unstrip_and_kill() {
        let mut markers = StripMarkers::default();
        let a = markers.mint("nowiki", "<nowiki>[[x]]</nowiki>");
        let text = format!("a{a}b\x7f'\"`UNIQ--nowiki-000000FF-QINU`\"'\x7fc");
        assert_eq!(
            markers.unstrip(&text),
            "a<nowiki>[[x]]</nowiki>b\x7f'\"`UNIQ--nowiki-000000FF-QINU`\"'\x7fc"
        );
        assert_eq!(kill_markers(&text), "abc");
        assert_eq!(marker_kind("nope"), None);
        assert_eq!(
            for_each_non_marker(&format!("x{a}y"), str::to_uppercase),
            format!("X{a}Y")
        );
    }
}
