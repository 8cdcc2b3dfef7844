//! Lua 5.1-compatible additions to the piccolo core library.
//!
//! Scribunto modules are written for Lua 5.1, so they expect a few globals
//! which Lua 5.4 removed, the Lua pattern functions, and some table and maths
//! functions which the piccolo core library does not provide.

mod math;
mod string;

use super::prelude::*;
pub(crate) use string::{find_lua, find_pattern, find_plain, gmatch_lua, gsub_lua, is_plain};
use piccolo::TypeError;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Loads Lua 5.1-compatible global functions and variables.
pub fn load_compat(ctx: Context<'_>) -> Result<(), TypeError> {
    let table = ctx.get_global::<Table<'_>>("table")?;
    ctx.set_global("unpack", table.get_value(ctx, "unpack"));
    ctx.set_global("_G", ctx.globals());

    if ctx.get_global_value("io").is_nil() {
        ctx.set_global("io", Table::new(&ctx));
    }

    load_table(ctx, table);
    string::load_string(ctx)?;
    math::load_math(ctx)
}

/// Loads the parts of the OS library which are safe to expose.
pub fn load_os(ctx: Context<'_>) {
    let os = Table::new(&ctx);
    let epoch = Instant::now();
    os.set_field(
        ctx,
        "clock",
        Callback::from_fn(&ctx, move |ctx, _, mut stack| {
            stack.replace(ctx, epoch.elapsed().as_secs_f64());
            Ok(CallbackReturn::Return)
        }),
    );
    os.set_field(
        ctx,
        "time",
        Callback::from_fn(&ctx, |ctx, _, mut stack| {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |time| time.as_secs());
            stack.replace(ctx, i64::try_from(now).unwrap_or(i64::MAX));
            Ok(CallbackReturn::Return)
        }),
    );
    ctx.set_global("os", os);
}

/// Adds the table functions used by common modules.
fn load_table<'gc>(ctx: Context<'gc>, table: Table<'gc>) {
    table.set_field(
        ctx,
        "concat",
        Callback::from_fn(&ctx, |ctx, _, mut stack| {
            let (list, sep, i, j) =
                stack.consume::<(Table<'_>, Option<VmString<'_>>, Option<i64>, Option<i64>)>(ctx)?;
            let sep = sep.map_or(&b""[..], |sep| sep.as_bytes());
            let start = i.unwrap_or(1);
            let mut out = Vec::new();
            for index in start..=j.unwrap_or_else(|| list.length()) {
                if index != start {
                    out.extend_from_slice(sep);
                }
                match list.get_value(ctx, index) {
                    Value::String(s) => out.extend_from_slice(s.as_bytes()),
                    value @ (Value::Integer(_) | Value::Number(_)) => {
                        out.extend_from_slice(value.display().to_string().as_bytes());
                    }
                    value => {
                        return Err(format!(
                            "invalid value (at index {index}) in table for 'concat': {}",
                            value.type_name()
                        )
                        .into_value(ctx)
                        .into());
                    }
                }
            }
            stack.replace(ctx, ctx.intern(&out));
            Ok(CallbackReturn::Return)
        }),
    );

    table.set_field(
        ctx,
        "insert",
        Callback::from_fn(&ctx, |ctx, _, mut stack| {
            let (list, pos, value) = match stack.len() {
                0..=1 => return Err("wrong number of arguments to 'insert'".into_value(ctx).into()),
                2 => {
                    let (list, value) = stack.consume::<(Table<'_>, Value<'_>)>(ctx)?;
                    (list, list.length() + 1, value)
                }
                _ => stack.consume::<(Table<'_>, i64, Value<'_>)>(ctx)?,
            };
            let len = list.length();
            if pos < 1 || pos > len + 1 {
                return Err("bad argument #2 to 'insert' (position out of bounds)"
                    .into_value(ctx)
                    .into());
            }
            for index in (pos..=len).rev() {
                list.set(ctx, index + 1, list.get_value(ctx, index))?;
            }
            list.set(ctx, pos, value)?;
            Ok(CallbackReturn::Return)
        }),
    );

    table.set_field(
        ctx,
        "remove",
        Callback::from_fn(&ctx, |ctx, _, mut stack| {
            let (list, pos) = stack.consume::<(Table<'_>, Option<i64>)>(ctx)?;
            let len = list.length();
            let pos = pos.unwrap_or(len);
            if len == 0 && pos == 0 {
                stack.replace(ctx, Value::Nil);
                return Ok(CallbackReturn::Return);
            }
            if pos < 1 || pos > len + 1 {
                return Err("bad argument #2 to 'remove' (position out of bounds)"
                    .into_value(ctx)
                    .into());
            }
            let removed = list.get_value(ctx, pos);
            for index in pos..len {
                list.set(ctx, index, list.get_value(ctx, index + 1))?;
            }
            if pos <= len {
                list.set(ctx, len, Value::Nil)?;
            }
            stack.replace(ctx, removed);
            Ok(CallbackReturn::Return)
        }),
    );

    table.set_field(
        ctx,
        "getn",
        Callback::from_fn(&ctx, |ctx, _, mut stack| {
            let list = stack.consume::<Table<'_>>(ctx)?;
            stack.replace(ctx, list.length());
            Ok(CallbackReturn::Return)
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use piccolo::{Executor, Lua};

    fn run(code: &str) -> String {
        let mut lua = Lua::core();
        lua.try_enter(|ctx| {
            load_compat(ctx)?;
            load_os(ctx);
            Ok(())
        })
        .unwrap();
        let ex = lua
            .try_enter(|ctx| {
                let closure = Closure::load(ctx, None, code.as_bytes())?;
                Ok(ctx.stash(Executor::start(ctx, closure.into(), ())))
            })
            .unwrap();
        lua.finish(&ex).unwrap();
        lua.try_enter(|ctx| {
            let result = ctx.fetch(&ex).take_result::<VmString<'_>>(ctx)??;
            Ok(result.to_str()?.to_string())
        })
        .unwrap()
    }

    #[test]
    fn table_functions() {
        assert_eq!(
            run("local t = {'a', 'c'}; table.insert(t, 2, 'b'); table.insert(t, 'd'); \
                 return table.concat(t, ',')"),
            "a,b,c,d"
        );
        assert_eq!(
            run("local t = {1, 2, 3}; local x = table.remove(t, 1); \
                 return x .. ':' .. table.concat(t, '-')"),
            "1:2-3"
        );
        assert_eq!(run("return table.concat({1, 2, 3}, '', 2, 3)"), "23");
        assert_eq!(run("return string.rep('ab', 3, '-')"), "ab-ab-ab");
        assert_eq!(run("return tostring(unpack({'x'}) == 'x' and _G == _G._G)"), "true");
    }

    #[test]
    fn pattern_functions() {
        assert_eq!(run("return tostring(string.find('hello world', 'o w'))"), "5");
        assert_eq!(
            run("local s, e, k = ('key = value'):find('(%w+)%s*='); return s .. e .. k"),
            "15key"
        );
        assert_eq!(run("return tostring(string.find('a.b', '.', 1, true))"), "2");
        assert_eq!(run("return string.match('  trim me  ', '^%s*(.-)%s*$')"), "trim me");
        assert_eq!(run("return (string.match('2024-05-06', '(%d+)-(%d+)', 3))"), "24");
        assert_eq!(
            run("local out = {}; for k, v in string.gmatch('a=1, b=2', '(%w+)=(%w+)') do \
                 out[#out + 1] = v .. k end; return table.concat(out, ',')"),
            "1a,2b"
        );
        assert_eq!(
            run("local s, n = string.gsub('hello world', '(%w+)', '<%1>'); return s .. n"),
            "<hello> <world>2"
        );
    }

    #[test]
    fn gsub_with_lua_replacements() {
        assert_eq!(
            run("return (string.gsub('$name is $age', '%$(%w+)', { name = 'Ann', age = 3 }))"),
            "Ann is 3"
        );
        assert_eq!(
            run("return (string.gsub('abc', '%w', function (c) \
                 if c ~= 'b' then return c:upper() end end))"),
            "AbC"
        );
        assert_eq!(
            run("local t = setmetatable({}, { __index = function (_, k) return '[' .. k .. ']' end }); \
                 return (string.gsub('x y', '%w', t))"),
            "[x] [y]"
        );
        assert_eq!(
            run("local ok, err = pcall(string.gsub, 'x', '(', ''); return tostring(err)"),
            "unfinished capture"
        );
    }

    #[test]
    fn format_and_math() {
        assert_eq!(
            run("return string.format('%5.2f|%-3d|%s|%x|%q', 3.14159, 7, 'hi', 255, 'a\"b')"),
            " 3.14|7  |hi|ff|\"a\\\"b\""
        );
        assert_eq!(run("return string.format('%d%%', 12.7)"), "12%");
        assert_eq!(run("return tostring(math.max('10', 9))"), "10");
        assert_eq!(run("return tostring(math.mod(7, 3)) .. tostring(math.mod(-7, 3))"), "1-1");
        assert_eq!(run("return string.format('%g', math.log10(1000))"), "3");
        assert_eq!(run("return string.format('%g', math.pow(2, 10))"), "1024");
    }
}
