//! Global substitution.

use super::{
    capture_value, decode, integer_arg, lua_error,
    pattern::{Capture, Match, Matcher, PatternError, Unit},
    string_arg,
};
use crate::lua::prelude::*;
use piccolo::{Function, MetaMethod, SequenceReturn, async_sequence};

/// The maximum length of an `__index` table chain.
const MAX_INDEX_CHAIN: usize = 100;

/// A substitution in progress.
///
/// Matching and replacing are separate steps so that a replacement can come
/// from a Lua call which yields back to the VM between matches.
pub(crate) struct Substitution<U> {
    input: Vec<U>,
    pattern: Vec<U>,
    anchored: bool,
    limit: usize,
    count: usize,
    position: usize,
    done: bool,
    output: Vec<u8>,
}

impl<U: Unit> Substitution<U> {
    /// Creates a substitution of at most `limit` matches.
    pub fn new(input: Vec<U>, mut pattern: Vec<U>, limit: Option<i64>) -> Self {
        let anchored = pattern.first() == Some(&U::from_ascii(b'^'));
        if anchored {
            pattern.remove(0);
        }
        Self {
            output: Vec::with_capacity(input.len()),
            input,
            pattern,
            anchored,
            limit: limit.map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(0)),
            count: 0,
            position: 0,
            done: false,
        }
    }

    /// The text being substituted.
    pub fn input(&self) -> &[U] {
        &self.input
    }

    /// Finds the next match. The caller must pass it to
    /// [`Self::replace`] before asking for another.
    pub fn next(&mut self) -> Result<Option<Match>, PatternError> {
        while !self.done && self.count < self.limit {
            let found = Matcher::new(&self.input, &self.pattern).match_at(self.position)?;
            if found.is_some() {
                self.count += 1;
                return Ok(found);
            }
            self.advance(None);
        }
        Ok(None)
    }

    /// Replaces a match with `text`, or keeps the original text if `text` is
    /// `None`.
    pub fn replace(&mut self, found: &Match, text: Option<&[u8]>) {
        match text {
            Some(text) => self.output.extend_from_slice(text),
            None => U::encode(&self.input[found.range.clone()], &mut self.output),
        }
        self.advance(Some(found.range.end));
    }

    /// Returns the result and the number of matches.
    pub fn finish(mut self) -> (Vec<u8>, usize) {
        U::encode(&self.input[self.position..], &mut self.output);
        (self.output, self.count)
    }

    fn advance(&mut self, end: Option<usize>) {
        match end {
            Some(end) if end > self.position => self.position = end,
            _ if self.position < self.input.len() => {
                U::encode(&self.input[self.position..=self.position], &mut self.output);
                self.position += 1;
            }
            _ => self.done = true,
        }
        if self.anchored {
            self.done = true;
        }
    }
}

/// Implements `gsub` for a string, table, or function replacement.
pub(crate) fn gsub_lua<'gc, U: Unit>(
    ctx: Context<'gc>,
    mut stack: Stack<'gc, '_>,
    name: &str,
) -> Result<CallbackReturn<'gc>, VmError<'gc>> {
    let s = string_arg(ctx, &stack, 1, name)?;
    let pattern = string_arg(ctx, &stack, 2, name)?;
    let repl = stack.get(2);
    let limit = integer_arg(ctx, &stack, 4, name)?;
    stack.clear();

    let input = decode::<U>(ctx, s.as_bytes(), 1, name)?.into_owned();
    let pattern = decode::<U>(ctx, pattern.as_bytes(), 2, name)?.into_owned();
    let mut engine = Substitution::new(input, pattern, limit);
    let next = |engine: &mut Substitution<U>| engine.next().map_err(|error| lua_error(ctx, error));

    match repl {
        Value::String(_) | Value::Integer(_) | Value::Number(_) => {
            let repl = repl.into_string(ctx);
            let repl = repl.as_ref().map_or(&b""[..], |repl| repl.as_bytes());
            while let Some(found) = next(&mut engine)? {
                let text = expand(engine.input(), repl, &found).map_err(|error| lua_error(ctx, error))?;
                engine.replace(&found, Some(&text));
            }
        }
        Value::Function(function) => return Ok(gsub_with_calls(ctx, engine, function, None)),
        Value::Table(table) => {
            if let Some(function) = index_function(ctx, table) {
                return Ok(gsub_with_calls(ctx, engine, function, Some(table)));
            }
            while let Some(found) = next(&mut engine)? {
                let key = capture_value(ctx, engine.input(), &found.values()[0]);
                let value = lookup(ctx, table, key);
                apply(ctx, &mut engine, &found, value)?;
            }
        }
        other => {
            return Err(lua_error(
                ctx,
                format!(
                    "bad argument #3 to '{name}' (string/function/table expected, got {})",
                    other.type_name()
                ),
            ));
        }
    }

    let (output, count) = engine.finish();
    stack.into_back(ctx, (ctx.intern(&output), i64::try_from(count)?));
    Ok(CallbackReturn::Return)
}

/// Runs a substitution whose replacements come from calling Lua.
fn gsub_with_calls<'gc, U: Unit>(
    ctx: Context<'gc>,
    mut engine: Substitution<U>,
    function: Function<'gc>,
    table: Option<Table<'gc>>,
) -> CallbackReturn<'gc> {
    let sequence = async_sequence(&ctx, move |locals, mut seq| {
        let function = locals.stash(&ctx, function);
        let table = table.map(|table| locals.stash(&ctx, table));
        async move {
            loop {
                let pending = seq.try_enter(|ctx, locals, _, mut stack| {
                    while let Some(found) =
                        engine.next().map_err(|error| lua_error(ctx, error))?
                    {
                        let bottom = stack.len();
                        let Some(table) = &table else {
                            for capture in found.values().iter() {
                                stack.push_back(capture_value(ctx, engine.input(), capture));
                            }
                            return Ok(Some((bottom, found)));
                        };
                        let table = locals.fetch(table);
                        let key = capture_value(ctx, engine.input(), &found.values()[0]);
                        let value = table.get_value(ctx, key);
                        if value.is_nil() {
                            stack.into_back(ctx, (table, key));
                            return Ok(Some((bottom, found)));
                        }
                        apply(ctx, &mut engine, &found, value)?;
                    }
                    Ok(None)
                })?;

                let Some((bottom, found)) = pending else {
                    break;
                };
                seq.call(&function, bottom).await?;
                seq.try_enter(|ctx, _, _, mut stack| {
                    let value = stack.get(bottom);
                    stack.resize(bottom);
                    apply(ctx, &mut engine, &found, value)
                })?;
            }

            seq.try_enter(|ctx, _, _, mut stack| {
                let (output, count) = engine.finish();
                stack.into_back(ctx, (ctx.intern(&output), i64::try_from(count)?));
                Ok(())
            })?;
            Ok(SequenceReturn::Return)
        }
    });

    CallbackReturn::Sequence(sequence)
}

/// Returns the `__index` function of a table, if it has one.
fn index_function<'gc>(ctx: Context<'gc>, table: Table<'gc>) -> Option<Function<'gc>> {
    match table.metatable()?.get_value(ctx, MetaMethod::Index) {
        Value::Function(function) => Some(function),
        _ => None,
    }
}

/// Looks up a key, following `__index` tables.
fn lookup<'gc>(ctx: Context<'gc>, mut table: Table<'gc>, key: Value<'gc>) -> Value<'gc> {
    for _ in 0..MAX_INDEX_CHAIN {
        let value = table.get_value(ctx, key);
        if !value.is_nil() {
            return value;
        }
        match table.metatable().map(|meta| meta.get_value(ctx, MetaMethod::Index)) {
            Some(Value::Table(next)) => table = next,
            _ => break,
        }
    }
    Value::Nil
}

/// Applies a replacement value from a table or function. `nil` and `false`
/// keep the original text.
fn apply<'gc, U: Unit>(
    ctx: Context<'gc>,
    engine: &mut Substitution<U>,
    found: &Match,
    value: Value<'gc>,
) -> Result<(), VmError<'gc>> {
    match value {
        Value::Nil | Value::Boolean(false) => engine.replace(found, None),
        Value::String(text) => engine.replace(found, Some(text.as_bytes())),
        Value::Integer(_) | Value::Number(_) => {
            engine.replace(found, Some(value.display().to_string().as_bytes()));
        }
        other => {
            return Err(lua_error(
                ctx,
                format!("invalid replacement value (a {})", other.type_name()),
            ));
        }
    }
    Ok(())
}

/// Expands `%0`-`%9` and `%%` in a replacement string.
fn expand<U: Unit>(input: &[U], repl: &[u8], found: &Match) -> Result<Vec<u8>, PatternError> {
    let mut out = Vec::with_capacity(repl.len());
    let mut bytes = repl.iter();
    while let Some(&b) = bytes.next() {
        if b != b'%' {
            out.push(b);
            continue;
        }
        match bytes.next() {
            None => return Err(PatternError::Replacement),
            Some(b'0') => U::encode(&input[found.range.clone()], &mut out),
            Some(&digit @ b'1'..=b'9') => {
                let values = found.values();
                match values.get(usize::from(digit - b'1')) {
                    Some(Capture::Text(range)) => U::encode(&input[range.clone()], &mut out),
                    Some(Capture::Position(at)) => {
                        out.extend_from_slice((at + 1).to_string().as_bytes());
                    }
                    None => return Err(PatternError::CaptureIndex),
                }
            }
            Some(&other) => out.push(other),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn substitute(input: &str, pattern: &str, repl: &str, limit: Option<i64>) -> (String, usize) {
        let mut engine = Substitution::new(input.as_bytes().to_vec(), pattern.as_bytes().to_vec(), limit);
        while let Some(found) = engine.next().unwrap() {
            let text = expand(engine.input(), repl.as_bytes(), &found).unwrap();
            engine.replace(&found, Some(&text));
        }
        let (output, count) = engine.finish();
        (String::from_utf8(output).unwrap(), count)
    }

    #[test]
    fn replacement_strings() {
        assert_eq!(substitute("hello world", "o", "0", None), ("hell0 w0rld".into(), 2));
        assert_eq!(substitute("hello world", "o", "0", Some(1)), ("hell0 world".into(), 1));
        assert_eq!(substitute("abc", "", "-", None), ("-a-b-c-".into(), 4));
        assert_eq!(substitute("a=1, b=2", "(%w+)=(%w+)", "%2=%1", None), ("1=a, 2=b".into(), 2));
        assert_eq!(substitute("abc", "%w", "<%0%%>", None), ("<a%><b%><c%>".into(), 3));
        assert_eq!(substitute("  trim  ", "^%s+", "", None), ("trim  ".into(), 1));
        assert_eq!(substitute("x", "^y", "z", None), ("x".into(), 0));
    }

    #[test]
    fn replacement_errors() {
        let mut engine = Substitution::new(b"abc".to_vec(), b"b".to_vec(), None);
        let found = engine.next().unwrap().unwrap();
        assert_eq!(expand(engine.input(), b"%2", &found), Err(PatternError::CaptureIndex));
        assert_eq!(expand(engine.input(), b"x%", &found), Err(PatternError::Replacement));
        assert_eq!(expand(engine.input(), b"%1", &found), Ok(b"b".to_vec()));
    }
}
