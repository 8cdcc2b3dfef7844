//! Text functions shared by the expander and the Scribunto libraries which do
//! not correspond to Lua built-ins.

use crate::title;
use html_escape::NAMED_ENTITIES;
use std::borrow::Cow;

/// Which entities [`decode_html`] should decode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Entities {
    /// Numeric references plus `&lt;`, `&gt;`, `&amp;`, `&quot;`, and
    /// `&nbsp;`.
    Basic,
    /// Every named entity.
    All,
}

/// Encodes section heading text into a format suitable for use as a URL anchor.
pub fn anchor_encode(s: &str) -> String {
    let s = decode_html(s.trim_ascii(), Entities::All);
    let id = title::normalize(&s).replace(' ', "_");
    url_encode(&id).to_string()
}

/// Decodes HTML entities according to the Wikitext rules.
pub fn decode_html(text: &str, entities: Entities) -> Cow<'_, str> {
    const MAX_LEN: usize = {
        let mut max = 0;
        let mut entities = NAMED_ENTITIES.as_slice();
        while let [(name, _), rest @ ..] = entities {
            if name.len() > max {
                max = name.len();
            }
            entities = rest;
        }
        max + b";".len()
    };

    let bytes = text.as_bytes();
    let entity_ranges = memchr::memchr_iter(b'&', bytes).filter_map(|start| {
        let next = start + "&".len();
        memchr::memchr(b';', &bytes[next..(next + MAX_LEN).min(bytes.len())])
            .map(|len| start..(next + len + b";".len()))
    });

    let mut flushed = 0;
    let mut out = String::new();
    for range in entity_ranges {
        // An entity that was swallowed by the previous match.
        if range.start < flushed {
            continue;
        }

        let mut char = [0; 4];
        let name = &text[range.start + 1..range.end - 1];
        let value = if let Some(number) = name.strip_prefix('#') {
            if let Some(hex) = number.strip_prefix(['X', 'x']) {
                u32::from_str_radix(hex, 16)
            } else {
                number.parse::<u32>()
            }
            .ok()
            .and_then(char::from_u32)
            .map(|c| &*c.encode_utf8(&mut char))
        } else if entities == Entities::All
            || matches!(name, "lt" | "gt" | "amp" | "quot" | "nbsp")
        {
            NAMED_ENTITIES
                .binary_search_by(|(t_name, _)| t_name.cmp(&name.as_bytes()))
                .ok()
                .map(|index| NAMED_ENTITIES[index].1)
        } else {
            None
        };

        if let Some(value) = value {
            out += &text[flushed..range.start];
            out += value;
            flushed = range.end;
        }
    }

    if flushed != 0 {
        out += &text[flushed..];
        Cow::Owned(out)
    } else {
        Cow::Borrowed(text)
    }
}

/// Encodes the characters `<`, `>`, `&`, `"`, and non-breaking spaces as HTML
/// entities.
pub fn encode_html(text: &str) -> Cow<'_, str> {
    if !text.contains(['<', '>', '&', '"', '\u{a0}']) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '<' => out += "&lt;",
            '>' => out += "&gt;",
            '&' => out += "&amp;",
            '"' => out += "&quot;",
            '\u{a0}' => out += "&nbsp;",
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Percent-encodes a URL part.
#[inline]
pub fn url_encode(input: &str) -> percent_encoding::PercentEncode<'_> {
    percent_encoding::utf8_percent_encode(input, &ALPHABET)
}

/// The alphabet of characters to percent-encode when encoding anchors and
/// URLs.
const ALPHABET: percent_encoding::AsciiSet = percent_encoding::CONTROLS
    .add(b'%')
    .add(b'#')
    .add(b'\'')
    .add(b'"')
    .add(b'&')
    .add(b'<')
    .add(b'>')
    .add(b'[')
    .add(b']')
    .add(b'{')
    .add(b'}')
    .add(b'|')
    .add(b' ');

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_basic() {
        assert_eq!(
            decode_html("hello & world", Entities::Basic),
            Cow::Borrowed("hello & world"),
            "non-entity should remain as-is"
        );
        assert_eq!(
            decode_html("&lt;-&vert;-&#124;-&#x7c;", Entities::Basic),
            "<-&vert;-|-|",
            "semantic entities should remain as-is"
        );
        assert_eq!(
            decode_html("a&nbsp;b&amp;c", Entities::Basic),
            "a\u{a0}b&c",
            "basic named entities should decode"
        );
        assert_eq!(
            decode_html("hello&;world", Entities::Basic),
            Cow::Borrowed("hello&;world"),
            "invalid empty entity should remain as-is"
        );
    }

    #[test]
    fn decode_all() {
        assert_eq!(
            decode_html("&lt;-&vert;-&#124;-&#x7c;", Entities::All),
            "<-|-|-|"
        );
        assert_eq!(
            decode_html("hello&oops;world", Entities::All),
            Cow::Borrowed("hello&oops;world"),
            "invalid entity should remain as-is"
        );
        assert_eq!(
            decode_html("hello&nbsp world", Entities::All),
            Cow::Borrowed("hello&nbsp world"),
            "html5 entity termination rules should not be used"
        );
        assert_eq!(
            decode_html("hello&&nbsp;world", Entities::All),
            "hello&\u{a0}world",
            "incomplete entity should not interfere with later entity"
        );
    }

    #[test]
    fn anchors() {
        assert_eq!(anchor_encode("&#42;"), anchor_encode("&#x2A;"));
        assert_eq!(anchor_encode("&#42;"), "*");
        assert_eq!(anchor_encode(" Etymology  1 "), "Etymology_1");
        assert_eq!(anchor_encode("a&amp;b"), "a%26b");
    }

    #[test]
    fn encode() {
        assert_eq!(encode_html("<a href=\"x\">&</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
        assert_eq!(encode_html("plain"), Cow::Borrowed("plain"));
    }
}
