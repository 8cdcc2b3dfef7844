//! Lua 5.1-compatible string functions.
//!
//! The pattern functions are generic over [`Unit`], so `mw.ustring` reuses
//! them with character positions instead of byte positions.

mod format;
mod gsub;
mod pattern;

use crate::lua::prelude::*;
use core::cell::Cell;
pub(crate) use gsub::gsub_lua;
use pattern::{Capture, Matcher};
pub(crate) use pattern::{Unit, find as find_pattern, find_plain, is_plain};
use piccolo::TypeError;
use std::borrow::Cow;

/// Loads the string functions missing from the piccolo core library.
pub(super) fn load_string(ctx: Context<'_>) -> Result<(), TypeError> {
    let string = ctx.get_global::<Table<'_>>("string")?;

    string.set_field(
        ctx,
        "rep",
        Callback::from_fn(&ctx, |ctx, _, mut stack| {
            let (s, times, sep) = stack.consume::<(VmString<'_>, i64, Option<VmString<'_>>)>(ctx)?;
            let times = usize::try_from(times).unwrap_or(0);
            let sep = sep.map_or(&b""[..], |sep| sep.as_bytes());
            let mut out = Vec::with_capacity((s.as_bytes().len() + sep.len()) * times);
            for index in 0..times {
                if index != 0 {
                    out.extend_from_slice(sep);
                }
                out.extend_from_slice(s.as_bytes());
            }
            stack.replace(ctx, ctx.intern(&out));
            Ok(CallbackReturn::Return)
        }),
    );

    string.set_field(
        ctx,
        "find",
        Callback::from_fn(&ctx, |ctx, _, stack| find_lua::<u8>(ctx, stack, "find", true)),
    );
    string.set_field(
        ctx,
        "match",
        Callback::from_fn(&ctx, |ctx, _, stack| find_lua::<u8>(ctx, stack, "match", false)),
    );
    string.set_field(
        ctx,
        "gmatch",
        Callback::from_fn(&ctx, |ctx, _, stack| gmatch_lua::<u8>(ctx, stack, "gmatch")),
    );
    string.set_field(ctx, "gfind", string.get_value(ctx, "gmatch"));
    string.set_field(
        ctx,
        "gsub",
        Callback::from_fn(&ctx, |ctx, _, stack| gsub_lua::<u8>(ctx, stack, "gsub")),
    );
    string.set_field(ctx, "format", Callback::from_fn(&ctx, format::format_lua));

    Ok(())
}

/// Converts a message into a Lua error value.
pub(crate) fn lua_error<'gc>(ctx: Context<'gc>, message: impl core::fmt::Display) -> VmError<'gc> {
    message.to_string().into_value(ctx).into()
}

/// Reads the 1-indexed argument `n` as a string. Numbers are converted.
pub(crate) fn string_arg<'gc>(
    ctx: Context<'gc>,
    stack: &Stack<'gc, '_>,
    n: usize,
    name: &str,
) -> Result<VmString<'gc>, VmError<'gc>> {
    let value = stack.get(n - 1);
    value.into_string(ctx).ok_or_else(|| {
        lua_error(
            ctx,
            format!(
                "bad argument #{n} to '{name}' (string expected, got {})",
                value.type_name()
            ),
        )
    })
}

/// Reads the optional 1-indexed argument `n` as an integer.
fn integer_arg<'gc>(
    ctx: Context<'gc>,
    stack: &Stack<'gc, '_>,
    n: usize,
    name: &str,
) -> Result<Option<i64>, VmError<'gc>> {
    match stack.get(n - 1) {
        Value::Nil => Ok(None),
        value => value.to_integer().map(Some).ok_or_else(|| {
            lua_error(
                ctx,
                format!(
                    "bad argument #{n} to '{name}' (number expected, got {})",
                    value.type_name()
                ),
            )
        }),
    }
}

/// Splits the string argument `n` into pattern units.
fn decode<'a, 'gc, U: Unit>(
    ctx: Context<'gc>,
    bytes: &'a [u8],
    n: usize,
    name: &str,
) -> Result<Cow<'a, [U]>, VmError<'gc>> {
    U::decode(bytes).ok_or_else(|| {
        lua_error(
            ctx,
            format!("bad argument #{n} to '{name}' (string is not UTF-8)"),
        )
    })
}

/// Converts a 1-based start position, which counts from the end when
/// negative, into a 0-based index no greater than `len`.
pub(crate) fn start_index(init: Option<i64>, len: usize) -> usize {
    let init = init.unwrap_or(1);
    let init = if init < 0 {
        i64::try_from(len).unwrap_or(i64::MAX) + init + 1
    } else {
        init
    };
    usize::try_from(init - 1).map_or(0, |at| at.min(len))
}

/// Converts a 0-based unit index into a 1-based Lua position.
fn position<'gc>(at: usize) -> Value<'gc> {
    Value::Integer(i64::try_from(at).map_or(i64::MAX, |at| at + 1))
}

/// Converts an exclusive 0-based end index into an inclusive 1-based Lua
/// position.
fn end_position<'gc>(at: usize) -> Value<'gc> {
    Value::Integer(i64::try_from(at).unwrap_or(i64::MAX))
}

/// Converts a capture into a Lua value.
pub(crate) fn capture_value<'gc, U: Unit>(
    ctx: Context<'gc>,
    input: &[U],
    capture: &Capture,
) -> Value<'gc> {
    match capture {
        Capture::Text(range) => {
            let mut out = Vec::with_capacity(range.len());
            U::encode(&input[range.clone()], &mut out);
            ctx.intern(&out).into()
        }
        Capture::Position(at) => position(*at),
    }
}

/// Implements `find` and `match`. `find` returns the 1-indexed inclusive
/// bounds of the match followed by its captures, whereas `match` returns only
/// the captures, or the whole match if the pattern has none.
pub(crate) fn find_lua<'gc, U: Unit>(
    ctx: Context<'gc>,
    mut stack: Stack<'gc, '_>,
    name: &str,
    is_find: bool,
) -> Result<CallbackReturn<'gc>, VmError<'gc>> {
    let s = string_arg(ctx, &stack, 1, name)?;
    let pattern = string_arg(ctx, &stack, 2, name)?;
    let init = integer_arg(ctx, &stack, 3, name)?;
    let plain = is_find && stack.get(3).to_bool();
    stack.clear();

    let input = decode::<U>(ctx, s.as_bytes(), 1, name)?;
    let pattern = decode::<U>(ctx, pattern.as_bytes(), 2, name)?;
    let init = start_index(init, input.len());

    if is_find && (plain || is_plain(&pattern)) {
        match find_plain(&input, &pattern, init) {
            Some(range) => stack.into_back(ctx, (position(range.start), end_position(range.end))),
            None => stack.push_back(Value::Nil),
        }
        return Ok(CallbackReturn::Return);
    }

    let found = find_pattern(&input, &pattern, init).map_err(|error| lua_error(ctx, error))?;
    match found {
        Some(found) if is_find => {
            stack.into_back(ctx, (position(found.range.start), end_position(found.range.end)));
            for capture in &found.captures {
                stack.push_back(capture_value(ctx, &input, capture));
            }
        }
        Some(found) => {
            for capture in found.values().iter() {
                stack.push_back(capture_value(ctx, &input, capture));
            }
        }
        None => stack.push_back(Value::Nil),
    }
    Ok(CallbackReturn::Return)
}

/// Implements `gmatch`, returning an iterator over successive matches.
pub(crate) fn gmatch_lua<'gc, U: Unit>(
    ctx: Context<'gc>,
    mut stack: Stack<'gc, '_>,
    name: &str,
) -> Result<CallbackReturn<'gc>, VmError<'gc>> {
    let s = string_arg(ctx, &stack, 1, name)?;
    let pattern = string_arg(ctx, &stack, 2, name)?;
    let input = decode::<U>(ctx, s.as_bytes(), 1, name)?.into_owned();
    let pattern = decode::<U>(ctx, pattern.as_bytes(), 2, name)?.into_owned();

    let next = Cell::new(0);
    let iterator = Callback::from_fn(&ctx, move |ctx, _, mut stack| {
        stack.clear();
        let mut matcher = Matcher::new(&input, &pattern);
        while next.get() <= input.len() {
            let start = next.get();
            if let Some(found) = matcher.match_at(start).map_err(|error| lua_error(ctx, error))? {
                next.set(if found.range.end == start {
                    start + 1
                } else {
                    found.range.end
                });
                for capture in found.values().iter() {
                    stack.push_back(capture_value(ctx, &input, capture));
                }
                return Ok(CallbackReturn::Return);
            }
            next.set(start + 1);
        }
        stack.push_back(Value::Nil);
        Ok(CallbackReturn::Return)
    });

    stack.replace(ctx, iterator);
    Ok(CallbackReturn::Return)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_positions() {
        assert_eq!(start_index(None, 5), 0);
        assert_eq!(start_index(Some(3), 5), 2);
        assert_eq!(start_index(Some(-2), 5), 3);
        assert_eq!(start_index(Some(-20), 5), 0);
        assert_eq!(start_index(Some(0), 5), 0);
        assert_eq!(start_index(Some(20), 5), 5);
    }
}
