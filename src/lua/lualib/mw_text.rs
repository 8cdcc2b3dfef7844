//! MediaWiki Scribunto Lua text support library.

// This code is (very, very loosely) adapted from mediawiki-extensions-Scribunto
// <https://github.com/wikimedia/mediawiki-extensions-Scribunto>.
//
// The upstream copyright is:
//
// SPDX-License-Identifier: GPL-2.0-or-later

use super::{prelude::*, yield_host_call};
use crate::{
    common::{Entities, decode_html},
    lua::{
        HostCall, UnstripMode,
        stdlib::{find_pattern, find_plain, is_plain},
    },
    renderer::{State, kill_markers},
};
use core::fmt::Write as _;
use piccolo::Stack;
use std::borrow::Cow;

/// The text support library.
#[derive(gc_arena::Collect, Default)]
#[collect(require_static)]
pub(super) struct TextLibrary;

impl TextLibrary {
    /// Decodes HTML entities. Unless `decode_named` is true, only the basic
    /// named entities and numeric references are decoded.
    fn decode<'gc>(
        &self,
        ctx: Context<'gc>,
        (text, decode_named): (VmString<'gc>, Option<bool>),
    ) -> Result<VmString<'gc>, VmError<'gc>> {
        let entities = if decode_named == Some(true) {
            Entities::All
        } else {
            Entities::Basic
        };
        Ok(match decode_html(text.to_str()?, entities) {
            Cow::Borrowed(_) => text,
            Cow::Owned(text) => ctx.intern(text.as_bytes()),
        })
    }

    /// Encodes HTML special characters as entities. If `charset` is given, its
    /// characters are encoded instead, as numeric references.
    fn encode<'gc>(
        &self,
        ctx: Context<'gc>,
        (text, charset): (VmString<'gc>, Option<VmString<'gc>>),
    ) -> Result<VmString<'gc>, VmError<'gc>> {
        let text = text.to_str()?;
        let mut out = String::with_capacity(text.len());
        if let Some(charset) = charset {
            let charset = charset_chars(charset.to_str()?);
            for c in text.chars() {
                if charset.contains(&c) {
                    let _ = write!(out, "&#{};", u32::from(c));
                } else {
                    out.push(c);
                }
            }
        } else {
            for c in text.chars() {
                match c {
                    '<' => out += "&lt;",
                    '>' => out += "&gt;",
                    '&' => out += "&amp;",
                    '"' => out += "&quot;",
                    '\'' => out += "&#039;",
                    '\u{a0}' => out += "&nbsp;",
                    c => out.push(c),
                }
            }
        }
        Ok(ctx.intern(out.as_bytes()))
    }

    /// Converts a JSON string into a Lua value.
    fn json_decode<'gc>(
        &self,
        ctx: Context<'gc>,
        (value, _flags): (VmString<'_>, Value<'_>),
    ) -> Result<Value<'gc>, VmError<'gc>> {
        let ser = piccolo_util::serde::ser::Serializer::new(ctx, <_>::default());
        let mut deser = serde_json::Deserializer::from_slice(value.as_bytes());
        Ok(serde_transcode::transcode(&mut deser, ser)?)
    }

    /// Converts a Lua value into a JSON string.
    fn json_encode<'gc>(
        &self,
        ctx: Context<'gc>,
        (value, _flags): (Value<'_>, Value<'_>),
    ) -> Result<VmString<'gc>, VmError<'gc>> {
        let deser = piccolo_util::serde::de::Deserializer::from_value(value);
        let mut ser = serde_json::Serializer::new(vec![]);
        serde_transcode::transcode(deser, &mut ser)?;
        Ok(ctx.intern(&ser.into_inner()))
    }

    /// Removes all strip markers from the text.
    fn kill_markers<'gc>(
        &self,
        ctx: Context<'gc>,
        text: VmString<'gc>,
    ) -> Result<VmString<'gc>, VmError<'gc>> {
        Ok(match kill_markers(text.to_str()?) {
            Cow::Borrowed(_) => text,
            Cow::Owned(text) => ctx.intern(text.as_bytes()),
        })
    }

    /// Escapes Wikitext so that it renders as literal text.
    fn nowiki<'gc>(
        &self,
        ctx: Context<'gc>,
        text: VmString<'gc>,
    ) -> Result<VmString<'gc>, VmError<'gc>> {
        Ok(ctx.intern(nowiki(text.to_str()?).as_bytes()))
    }

    /// Splits text on every match of the pattern `sep`, or on the literal
    /// text `sep` if `plain` is true. A separator matching the empty string
    /// splits between every character.
    fn split<'gc>(
        &self,
        ctx: Context<'gc>,
        (text, sep, plain): (VmString<'gc>, VmString<'gc>, Option<Value<'gc>>),
    ) -> Result<Table<'gc>, VmError<'gc>> {
        let text = text.to_str()?.chars().collect::<Vec<_>>();
        let sep = sep.to_str()?.chars().collect::<Vec<_>>();
        let plain = plain.is_some_and(Value::to_bool) || is_plain(&sep);

        let table = Table::new(&ctx);
        let mut index = 1_i64;
        let mut push = |part: &[char]| {
            let part = part.iter().collect::<String>();
            let result = table.set(ctx, index, ctx.intern(part.as_bytes()));
            index += 1;
            result
        };

        let mut start = 0;
        loop {
            let found = if plain {
                find_plain(&text, &sep, start)
            } else {
                find_pattern(&text, &sep, start)
                    .map_err(|error| error.to_string().into_value(ctx))?
                    .map(|found| found.range)
            };
            match found {
                None => {
                    push(&text[start..])?;
                    break;
                }
                Some(range) if range.is_empty() => {
                    let end = (range.start + 1).min(text.len());
                    push(&text[start..end])?;
                    if end >= text.len() {
                        break;
                    }
                    start = end;
                }
                Some(range) => {
                    push(&text[start..range.start])?;
                    start = range.end;
                }
            }
        }
        Ok(table)
    }

    /// Creates an HTML tag. Attribute values of `true` are written without a
    /// value and `false` values are skipped. A `nil` content creates only an
    /// opening tag and a `false` content creates a self-closing tag.
    fn tag<'gc>(
        &self,
        ctx: Context<'gc>,
        (name, attrs, content): (VmString<'gc>, Option<Table<'gc>>, Value<'gc>),
    ) -> Result<VmString<'gc>, VmError<'gc>> {
        let name = name.to_str()?;

        let mut attrs = attrs
            .into_iter()
            .flatten()
            .map(|(key, value)| {
                let Value::String(key) = key else {
                    return Err("mw.text.tag: attribute key is not a string"
                        .into_value(ctx)
                        .into());
                };
                let key = key.to_str()?;
                Ok(match value {
                    Value::Boolean(true) => Some(format!(" {key}")),
                    Value::Boolean(false) | Value::Nil => None,
                    value => {
                        let value = value.into_string(ctx).ok_or_else(|| {
                            VmError::from(
                                format!("mw.text.tag: invalid value for attribute '{key}'")
                                    .into_value(ctx),
                            )
                        })?;
                        Some(format!(r#" {key}="{}""#, encode_attr(value.to_str()?)))
                    }
                })
            })
            .filter_map(Result::transpose)
            .collect::<Result<Vec<_>, VmError<'gc>>>()?;
        attrs.sort_unstable();

        let mut out = format!("<{name}{}", attrs.concat());
        match content {
            Value::Nil => out.push('>'),
            Value::Boolean(false) => out += " />",
            content => {
                let content = content.into_string(ctx).ok_or_else(|| {
                    VmError::from("mw.text.tag: content must be a string".into_value(ctx))
                })?;
                let _ = write!(out, ">{}</{name}>", content.to_str()?);
            }
        }
        Ok(ctx.intern(out.as_bytes()))
    }

    /// Removes characters in `charset` from both ends of the text. The default
    /// charset is ASCII whitespace.
    fn trim<'gc>(
        &self,
        ctx: Context<'gc>,
        (text, charset): (VmString<'gc>, Option<VmString<'gc>>),
    ) -> Result<VmString<'gc>, VmError<'gc>> {
        let source = text.to_str()?;
        let trimmed = if let Some(charset) = charset {
            let charset = charset_chars(charset.to_str()?);
            source.trim_matches(|c| charset.contains(&c))
        } else {
            source.trim_matches(['\t', '\r', '\n', '\x0c', ' '])
        };
        Ok(if trimmed.len() == source.len() {
            text
        } else {
            ctx.intern(trimmed.as_bytes())
        })
    }

    /// A trampoline for the [`HostCall::Unstrip`] host call which restores
    /// `<nowiki>` text and removes all other strip markers.
    fn unstrip<'gc>(
        &self,
        ctx: Context<'gc>,
        mut stack: Stack<'gc, '_>,
    ) -> Result<CallbackReturn<'gc>, VmError<'gc>> {
        let text = stack.consume::<VmString<'gc>>(ctx)?;
        yield_host_call(
            ctx,
            stack,
            HostCall::Unstrip {
                text: text.to_str()?.to_string(),
                mode: UnstripMode::Unstrip,
            },
        )
    }

    /// A trampoline for the [`HostCall::Unstrip`] host call which restores
    /// `<nowiki>` text and retains other strip markers.
    fn unstrip_no_wiki<'gc>(
        &self,
        ctx: Context<'gc>,
        mut stack: Stack<'gc, '_>,
    ) -> Result<CallbackReturn<'gc>, VmError<'gc>> {
        let text = stack.consume::<VmString<'gc>>(ctx)?;
        yield_host_call(
            ctx,
            stack,
            HostCall::Unstrip {
                text: text.to_str()?.to_string(),
                mode: UnstripMode::UnstripNoWiki,
            },
        )
    }
}

impl MwInterface for TextLibrary {
    const NAME: &str = "mw.text";
    const CODE: &[u8] = include_bytes!("./modules/mw.text.lua");

    fn register(ctx: Context<'_>) -> Table<'_> {
        interface! {
            using Self, ctx;

            decode = decode,
            encode = encode,
            jsonDecode = json_decode,
            jsonEncode = json_encode,
            killMarkers = kill_markers,
            nowiki = nowiki,
            split = split,
            tag = tag,
            trim = trim,
            ~unstrip = unstrip,
            ~unstripNoWiki = unstrip_no_wiki,
        }
    }

    fn setup<'gc>(&self, ctx: Context<'gc>) -> Result<Table<'gc>, RuntimeError> {
        Ok(table! {
            using ctx;

            and = " and ",
            comma = ", ",
            ellipsis = "…",
        })
    }
}

/// Returns the characters of a charset argument. A leading `%` escapes the
/// following character.
fn charset_chars(charset: &str) -> Vec<char> {
    let mut chars = Vec::new();
    let mut iter = charset.chars();
    while let Some(c) = iter.next() {
        match c {
            '%' => chars.extend(iter.next()),
            c => chars.push(c),
        }
    }
    chars
}

/// Encodes an attribute value.
fn encode_attr(value: &str) -> Cow<'_, str> {
    if value.contains(['<', '>', '&', '"', '\'', '\u{a0}']) {
        let mut out = String::with_capacity(value.len());
        for c in value.chars() {
            match c {
                '<' => out += "&lt;",
                '>' => out += "&gt;",
                '&' => out += "&amp;",
                '"' => out += "&quot;",
                '\'' => out += "&#039;",
                '\u{a0}' => out += "&nbsp;",
                c => out.push(c),
            }
        }
        Cow::Owned(out)
    } else {
        Cow::Borrowed(value)
    }
}

/// Escapes every character and sequence with Wikitext meaning.
fn nowiki(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut line_start = true;
    for c in text.chars() {
        let escape = matches!(
            c,
            '"' | '&' | '\'' | '<' | '=' | '>' | '[' | ']' | '{' | '|' | '}'
        ) || (line_start && matches!(c, '#' | '*' | ':' | ';' | ' ' | '\t' | '\n'));
        if escape {
            let _ = write!(out, "&#{};", u32::from(c));
        } else {
            out.push(c);
        }
        line_start = c == '\n';
    }

    out.replace("----", "&#45;---")
        .replace("__", "_&#95;")
        .replace("://", "&#58;//")
        .replace("ISBN ", "ISBN&#32;")
        .replace("RFC ", "RFC&#32;")
        .replace("PMID ", "PMID&#32;")
}

/// The text of a `<nowiki>` strip marker payload, escaped for output.
fn nowiki_content(payload: &str) -> String {
    let content = payload
        .find('>')
        .filter(|start| !payload[..*start].ends_with('/'))
        .and_then(|start| {
            let end = payload.rfind("</")?;
            (end > start).then(|| &payload[start + 1..end])
        })
        .unwrap_or_default();
    content.replace('<', "&lt;").replace('>', "&gt;")
}

/// Replaces `<nowiki>` markers in the given `text` with their escaped text,
/// and removes other markers in [`UnstripMode::Unstrip`] mode.
pub(super) fn unstrip(state: &State<'_>, text: &str, mode: UnstripMode) -> String {
    let result = state.strip_markers.replace(text, |kind, payload| {
        if kind == "nowiki" {
            Some(nowiki_content(payload))
        } else if mode == UnstripMode::Unstrip {
            Some(String::new())
        } else {
            None
        }
    });

    match mode {
        UnstripMode::Unstrip => kill_markers(&result).into_owned(),
        UnstripMode::UnstripNoWiki => result.into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nowiki_escapes() {
        assert_eq!(nowiki("[[a]]"), "&#91;&#91;a&#93;&#93;");
        assert_eq!(nowiki("*a\n#b"), "&#42;a\n&#35;b");
        assert_eq!(nowiki("x----y__z http://q"), "x&#45;---y_&#95;z http&#58;//q");
    }

    #[test]
    fn nowiki_payload() {
        assert_eq!(nowiki_content("<nowiki>a<b></nowiki>"), "a&lt;b&gt;");
        assert_eq!(nowiki_content("<nowiki/>"), "");
        assert_eq!(nowiki_content("<nowiki a=\"1\">x</nowiki>"), "x");
    }

    #[test]
    fn charset() {
        assert_eq!(charset_chars("ab%-"), ['a', 'b', '-']);
        assert_eq!(encode_attr("a\"b"), "a&quot;b");
    }
}
