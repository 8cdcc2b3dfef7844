//! MediaWiki Scribunto Lua URI support library.

// This code is (very, very loosely) adapted from mediawiki-extensions-Scribunto
// <https://github.com/wikimedia/mediawiki-extensions-Scribunto>.
//
// The upstream copyright is:
//
// SPDX-License-Identifier: GPL-2.0-or-later

use super::prelude::*;
use crate::{common::anchor_encode, renderer::kill_markers};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// Characters encoded in the `QUERY` and `PATH` modes.
const RAW: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Characters encoded in the `WIKI` mode.
const WIKI: &AsciiSet = &RAW
    .remove(b';')
    .remove(b'@')
    .remove(b'$')
    .remove(b'!')
    .remove(b'*')
    .remove(b'(')
    .remove(b')')
    .remove(b',')
    .remove(b'/')
    .remove(b':');

/// A URI encoding mode.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Mode {
    /// Spaces become `+`.
    Query,
    /// Spaces become `%20`.
    Path,
    /// Spaces become `_`, and some reserved characters are kept.
    Wiki,
}

impl Mode {
    /// Parses an encoding mode name. The default mode is `QUERY`.
    fn from_value<'gc>(ctx: Context<'gc>, value: Option<VmString<'gc>>) -> Result<Self, VmError<'gc>> {
        Ok(match value.as_ref().map(VmString::as_bytes) {
            None | Some(b"QUERY") => Self::Query,
            Some(b"PATH") => Self::Path,
            Some(b"WIKI") => Self::Wiki,
            Some(_) => {
                return Err("bad argument #2 to 'encode' (expected QUERY, PATH, or WIKI)"
                    .into_value(ctx)
                    .into());
            }
        })
    }
}

/// The URI support library.
#[derive(gc_arena::Collect, Default)]
#[collect(require_static)]
pub(crate) struct UriLibrary;

impl UriLibrary {
    /// Encodes the input string for use within a URL fragment-part.
    fn anchor_encode<'gc>(
        &self,
        ctx: Context<'gc>,
        s: VmString<'gc>,
    ) -> Result<VmString<'gc>, VmError<'gc>> {
        let s = kill_markers(s.to_str()?);
        Ok(ctx.intern(anchor_encode(&s).as_bytes()))
    }

    /// Percent-decodes a string.
    fn decode<'gc>(
        &self,
        ctx: Context<'gc>,
        (s, mode): (VmString<'gc>, Option<VmString<'gc>>),
    ) -> Result<VmString<'gc>, VmError<'gc>> {
        let s = s.to_str()?;
        let s = match Mode::from_value(ctx, mode)? {
            Mode::Query => s.replace('+', " "),
            Mode::Path => s.to_string(),
            Mode::Wiki => s.replace('_', " "),
        };
        Ok(ctx.intern(&percent_decode_str(&s).collect::<Vec<_>>()))
    }

    /// Percent-encodes a string.
    fn encode<'gc>(
        &self,
        ctx: Context<'gc>,
        (s, mode): (VmString<'gc>, Option<VmString<'gc>>),
    ) -> Result<VmString<'gc>, VmError<'gc>> {
        let s = s.to_str()?;
        Ok(ctx.intern(encode(s, Mode::from_value(ctx, mode)?).as_bytes()))
    }
}

impl MwInterface for UriLibrary {
    const NAME: &str = "mw.uri";
    const CODE: &[u8] = include_bytes!("./modules/mw.uri.lua");

    fn register(ctx: Context<'_>) -> Table<'_> {
        interface! {
            using Self, ctx;

            anchorEncode = anchor_encode,
            decode = decode,
            encode = encode,
        }
    }

    fn setup<'gc>(&self, ctx: Context<'gc>) -> Result<Table<'gc>, RuntimeError> {
        Ok(Table::new(&ctx))
    }
}

/// Percent-encodes `s` in the given mode.
fn encode(s: &str, mode: Mode) -> String {
    match mode {
        Mode::Query => utf8_percent_encode(s, RAW).to_string().replace("%20", "+"),
        Mode::Path => utf8_percent_encode(s, RAW).to_string(),
        Mode::Wiki => utf8_percent_encode(&s.replace(' ', "_"), WIKI).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_modes() {
        assert_eq!(encode("a b&c", Mode::Query), "a+b%26c");
        assert_eq!(encode("a b&c", Mode::Path), "a%20b%26c");
        assert_eq!(encode("a b:c/(d)", Mode::Wiki), "a_b:c/(d)");
        assert_eq!(encode("é", Mode::Path), "%C3%A9");
    }
}
