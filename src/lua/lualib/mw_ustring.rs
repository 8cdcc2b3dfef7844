//! MediaWiki Scribunto Lua Unicode string support library.

// This code is (very, very loosely) adapted from mediawiki-extensions-Scribunto
// <https://github.com/wikimedia/mediawiki-extensions-Scribunto>.
//
// The upstream copyright is:
//
// SPDX-License-Identifier: GPL-2.0-or-later

use super::prelude::*;
use crate::lua::stdlib::{find_lua, gmatch_lua, gsub_lua};
use piccolo::Stack;
use unicode_normalization::UnicodeNormalization as _;

/// The maximum length, in bytes, allowed for input strings.
const STRING_LENGTH_LIMIT: usize = 2048 * 1024;

/// The maximum length, in bytes, allowed for patterns.
const PATTERN_LENGTH_LIMIT: usize = 10000;

/// The Unicode-aware Lua string support library.
#[derive(gc_arena::Collect, Default)]
#[collect(require_static)]
pub(super) struct UstringLibrary;

impl UstringLibrary {
    /// Creates a UTF-8 string from a sequence of Unicode code points.
    fn r#char<'gc>(
        &self,
        ctx: Context<'gc>,
        mut stack: Stack<'gc, '_>,
    ) -> Result<CallbackReturn<'gc>, VmError<'gc>> {
        if stack.len() > STRING_LENGTH_LIMIT {
            return Err("too many arguments to 'char'".into_value(ctx))?;
        }

        let value = stack
            .drain(..)
            .enumerate()
            .map(|(k, v)| {
                let v = v.to_integer().ok_or_else(|| {
                    anyhow::anyhow!("bad argument #{} to 'char' (integer expected)", k + 1)
                })?;
                let v = u32::try_from(v).map_err(RuntimeError::new)?;
                char::try_from(v).map_err(RuntimeError::new)
            })
            .collect::<Result<String, _>>()?;

        stack.replace(ctx, ctx.intern(value.as_bytes()));
        Ok(CallbackReturn::Return)
    }

    /// Returns the code points between 1-indexed characters `start` and `end`.
    fn code_point<'gc>(
        &self,
        ctx: Context<'gc>,
        mut stack: Stack<'gc, '_>,
    ) -> Result<CallbackReturn<'gc>, VmError<'gc>> {
        let (s, start, end) = stack.consume::<(VmString<'_>, Option<i64>, Option<i64>)>(ctx)?;
        check_string("codepoint", ctx, s)?;

        let start = start.unwrap_or(1);
        let end = end.unwrap_or(start);
        let s = s.to_str()?;
        let (start, count) = char_range(s, start, end);
        for c in s.chars().skip(start).take(count) {
            stack.push_back(Value::Integer(u32::from(c).into()));
        }

        Ok(CallbackReturn::Return)
    }

    /// Finds a pattern in a string, optionally starting from the 1-indexed
    /// character `init`. Returns the 1-indexed character positions of the
    /// match followed by its captures.
    fn find<'gc>(
        &self,
        ctx: Context<'gc>,
        stack: Stack<'gc, '_>,
    ) -> Result<CallbackReturn<'gc>, VmError<'gc>> {
        check_pattern_args("find", ctx, &stack)?;
        find_lua::<char>(ctx, stack, "find", true)
    }

    /// Returns an iterator over the successive matches of a pattern.
    fn gmatch<'gc>(
        &self,
        ctx: Context<'gc>,
        stack: Stack<'gc, '_>,
    ) -> Result<CallbackReturn<'gc>, VmError<'gc>> {
        check_pattern_args("gmatch", ctx, &stack)?;
        gmatch_lua::<char>(ctx, stack, "gmatch")
    }

    /// Replaces matches of a pattern using a string, table, or function.
    fn gsub<'gc>(
        &self,
        ctx: Context<'gc>,
        stack: Stack<'gc, '_>,
    ) -> Result<CallbackReturn<'gc>, VmError<'gc>> {
        check_pattern_args("gsub", ctx, &stack)?;
        gsub_lua::<char>(ctx, stack, "gsub")
    }

    /// Returns true if the input string is valid UTF-8.
    fn is_utf8<'gc>(&self, ctx: Context<'gc>, s: VmString<'_>) -> Result<bool, VmError<'gc>> {
        check_string("isutf8", ctx, s)?;
        Ok(s.to_str().is_ok())
    }

    /// Returns the length of the input string in Unicode characters, or nil if
    /// it is not valid UTF-8.
    fn len<'gc>(&self, ctx: Context<'gc>, s: VmString<'_>) -> Result<Value<'gc>, VmError<'gc>> {
        check_string("len", ctx, s)?;
        Ok(s.to_str().map_or(Ok(Value::Nil), |s| {
            i64::try_from(s.chars().count()).map(Value::Integer)
        })?)
    }

    /// Converts a string to lowercase.
    fn lower<'gc>(
        &self,
        ctx: Context<'gc>,
        s: VmString<'_>,
    ) -> Result<VmString<'gc>, VmError<'gc>> {
        check_string("lower", ctx, s)?;
        Ok(ctx.intern(s.to_str()?.to_lowercase().as_bytes()))
    }

    /// Matches a pattern in a string, returning its captures or the whole
    /// match.
    fn r#match<'gc>(
        &self,
        ctx: Context<'gc>,
        stack: Stack<'gc, '_>,
    ) -> Result<CallbackReturn<'gc>, VmError<'gc>> {
        check_pattern_args("match", ctx, &stack)?;
        find_lua::<char>(ctx, stack, "match", false)
    }

    /// Returns the characters between 1-indexed characters `start` and `end`.
    fn sub<'gc>(
        &self,
        ctx: Context<'gc>,
        (s, start, end): (VmString<'gc>, Option<i64>, Option<i64>),
    ) -> Result<VmString<'gc>, VmError<'gc>> {
        check_string("sub", ctx, s)?;
        let text = s.to_str()?;
        let (start, count) = char_range(text, start.unwrap_or(1), end.unwrap_or(-1));
        let sub = text.chars().skip(start).take(count).collect::<String>();
        Ok(if sub.len() == text.len() {
            s
        } else {
            ctx.intern(sub.as_bytes())
        })
    }

    /// Converts the input string to NFC form.
    fn to_nfc<'gc>(&self, ctx: Context<'gc>, s: VmString<'gc>) -> Result<Value<'gc>, VmError<'gc>> {
        check_string("toNFC", ctx, s)?;
        Ok(s.to_str().map_or(Value::Nil, |s| {
            ctx.intern(s.nfc().collect::<String>().as_bytes()).into()
        }))
    }

    /// Converts the input string to NFD form.
    fn to_nfd<'gc>(&self, ctx: Context<'gc>, s: VmString<'gc>) -> Result<Value<'gc>, VmError<'gc>> {
        check_string("toNFD", ctx, s)?;
        Ok(s.to_str().map_or(Value::Nil, |s| {
            ctx.intern(s.nfd().collect::<String>().as_bytes()).into()
        }))
    }

    /// Converts a string to uppercase.
    fn upper<'gc>(
        &self,
        ctx: Context<'gc>,
        s: VmString<'_>,
    ) -> Result<VmString<'gc>, VmError<'gc>> {
        check_string("upper", ctx, s)?;
        Ok(ctx.intern(s.to_str()?.to_uppercase().as_bytes()))
    }
}

impl MwInterface for UstringLibrary {
    const NAME: &str = "mw.ustring";
    const CODE: &[u8] = include_bytes!("./modules/mw.ustring.lua");

    fn register(ctx: Context<'_>) -> Table<'_> {
        interface! {
            using Self, ctx;

            ~ r#char = r#char,
            ~ codepoint = code_point,
            ~ find = find,
            ~ gmatch = gmatch,
            ~ gsub = gsub,
            isutf8 = is_utf8,
            len = len,
            lower = lower,
            ~ r#match = r#match,
            sub = sub,
            upper = upper,
            toNFC = to_nfc,
            toNFD = to_nfd,
        }
    }

    // Clippy: The value is constant and known to be in range.
    #[allow(clippy::cast_possible_wrap)]
    fn setup<'gc>(&self, ctx: Context<'gc>) -> Result<Table<'gc>, RuntimeError> {
        Ok(table! {
            using ctx;

            stringLengthLimit = STRING_LENGTH_LIMIT as i64,
            patternLengthLimit = PATTERN_LENGTH_LIMIT as i64,
        })
    }
}

/// Validates that the given string is below the size limit.
#[inline]
fn check_string<'gc>(func: &str, ctx: Context<'gc>, s: VmString<'_>) -> Result<(), VmError<'gc>> {
    // Clippy: The value is constant and known to be in range.
    #[allow(clippy::cast_possible_wrap)]
    if s.len() > STRING_LENGTH_LIMIT as i64 {
        Err(format!(
            "bad argument #1 to '{func}' (string is longer than {STRING_LENGTH_LIMIT} bytes)"
        )
        .into_value(ctx))?
    } else {
        Ok(())
    }
}

/// Validates the subject and pattern arguments of a pattern function.
fn check_pattern_args<'gc>(
    func: &str,
    ctx: Context<'gc>,
    stack: &Stack<'gc, '_>,
) -> Result<(), VmError<'gc>> {
    if let Some(s) = stack.get(0).into_string(ctx) {
        check_string(func, ctx, s)?;
    }
    if let Some(pattern) = stack.get(1).into_string(ctx)
        && pattern.as_bytes().len() > PATTERN_LENGTH_LIMIT
    {
        return Err(format!(
            "bad argument #2 to '{func}' (pattern is longer than {PATTERN_LENGTH_LIMIT} bytes)"
        )
        .into_value(ctx)
        .into());
    }
    Ok(())
}

/// Converts the 1-based, inclusive, possibly negative character indices
/// `start` and `end` into a 0-based start index and character count.
fn char_range(s: &str, start: i64, end: i64) -> (usize, usize) {
    let len = i64::try_from(s.chars().count()).unwrap_or(i64::MAX);
    let resolve = |index: i64| if index < 0 { len + index + 1 } else { index };
    let start = resolve(start).max(1);
    let end = resolve(end).min(len);
    if start > end {
        (0, 0)
    } else {
        (
            usize::try_from(start - 1).unwrap_or_default(),
            usize::try_from(end - start + 1).unwrap_or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges() {
        assert_eq!(char_range("héllo", 1, -1), (0, 5));
        assert_eq!(char_range("héllo", 2, 3), (1, 2));
        assert_eq!(char_range("héllo", -3, -2), (2, 2));
        assert_eq!(char_range("héllo", 4, 2), (0, 0));
        assert_eq!(char_range("héllo", 0, 100), (0, 5));
    }
}
