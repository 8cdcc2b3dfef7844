//! Lua 5.1 additions to the maths library.

use super::string::lua_error;
use crate::lua::prelude::*;
use piccolo::{Function, TypeError};

/// Loads the maths functions which Lua 5.1 modules expect.
pub(super) fn load_math(ctx: Context<'_>) -> Result<(), TypeError> {
    let math = ctx.get_global::<Table<'_>>("math")?;

    // Lua 5.4 no longer converts numeric strings here
    for name in ["min", "max"] {
        let original = ctx.stash(math.get::<_, Function<'_>>(ctx, name)?);
        math.set_field(
            ctx,
            name,
            Callback::from_fn(&ctx, move |ctx, _, mut stack| {
                for index in 0..stack.len() {
                    if let Value::String(_) = stack[index]
                        && let Some(number) = stack[index].to_numeric()
                    {
                        stack[index] = number;
                    }
                }
                Ok(CallbackReturn::Call {
                    function: ctx.fetch(&original),
                    then: None,
                })
            }),
        );
    }

    math.set_field(
        ctx,
        "mod",
        Callback::from_fn(&ctx, |ctx, _, mut stack| {
            let (lhs, rhs) = stack.consume::<(Value<'_>, Value<'_>)>(ctx)?;
            let result = match (lhs, rhs) {
                (Value::Integer(lhs), Value::Integer(rhs)) if rhs != 0 => {
                    Value::Integer(lhs.wrapping_rem(rhs))
                }
                _ => Value::Number(number(ctx, lhs, 1, "mod")? % number(ctx, rhs, 2, "mod")?),
            };
            stack.replace(ctx, result);
            Ok(CallbackReturn::Return)
        }),
    );

    unary(ctx, math, "log10", f64::log10);
    unary(ctx, math, "cosh", f64::cosh);
    unary(ctx, math, "sinh", f64::sinh);
    unary(ctx, math, "tanh", f64::tanh);

    math.set_field(
        ctx,
        "pow",
        Callback::from_fn(&ctx, |ctx, _, mut stack| {
            let (x, y) = stack.consume::<(Value<'_>, Value<'_>)>(ctx)?;
            let result = number(ctx, x, 1, "pow")?.powf(number(ctx, y, 2, "pow")?);
            stack.replace(ctx, result);
            Ok(CallbackReturn::Return)
        }),
    );

    math.set_field(
        ctx,
        "atan2",
        Callback::from_fn(&ctx, |ctx, _, mut stack| {
            let (y, x) = stack.consume::<(Value<'_>, Value<'_>)>(ctx)?;
            let result = number(ctx, y, 1, "atan2")?.atan2(number(ctx, x, 2, "atan2")?);
            stack.replace(ctx, result);
            Ok(CallbackReturn::Return)
        }),
    );

    math.set_field(
        ctx,
        "ldexp",
        Callback::from_fn(&ctx, |ctx, _, mut stack| {
            let (m, e) = stack.consume::<(Value<'_>, i64)>(ctx)?;
            let e = i32::try_from(e.clamp(-2000, 2000)).unwrap_or_default();
            stack.replace(ctx, number(ctx, m, 1, "ldexp")? * 2_f64.powi(e));
            Ok(CallbackReturn::Return)
        }),
    );

    math.set_field(
        ctx,
        "frexp",
        Callback::from_fn(&ctx, |ctx, _, mut stack| {
            let x = stack.consume::<Value<'_>>(ctx)?;
            let (mantissa, exponent) = frexp(number(ctx, x, 1, "frexp")?);
            stack.into_back(ctx, (mantissa, exponent));
            Ok(CallbackReturn::Return)
        }),
    );

    Ok(())
}

/// Adds a one-argument floating point function.
fn unary<'gc>(ctx: Context<'gc>, math: Table<'gc>, name: &'static str, op: fn(f64) -> f64) {
    math.set_field(
        ctx,
        name,
        Callback::from_fn(&ctx, move |ctx, _, mut stack| {
            let x = stack.consume::<Value<'_>>(ctx)?;
            stack.replace(ctx, op(number(ctx, x, 1, name)?));
            Ok(CallbackReturn::Return)
        }),
    );
}

/// Reads a numeric argument, accepting numeric strings.
fn number<'gc>(ctx: Context<'gc>, value: Value<'gc>, n: usize, name: &str) -> Result<f64, VmError<'gc>> {
    value.to_number().ok_or_else(|| {
        lua_error(
            ctx,
            format!(
                "bad argument #{n} to '{name}' (number expected, got {})",
                value.type_name()
            ),
        )
    })
}

/// Splits a number into a mantissa in `[0.5, 1)` and a power of two.
// Clippy: The exponent of a finite f64 is within ±1100.
#[allow(clippy::cast_possible_truncation)]
fn frexp(x: f64) -> (f64, i64) {
    if x == 0.0 || !x.is_finite() {
        return (x, 0);
    }
    let exponent = x.abs().log2().floor() as i64 + 1;
    let mantissa = x / 2_f64.powi(i32::try_from(exponent).unwrap_or_default());
    // Rounding in log2 can leave the mantissa a hair outside the range
    if mantissa.abs() >= 1.0 {
        (mantissa / 2.0, exponent + 1)
    } else if mantissa.abs() < 0.5 {
        (mantissa * 2.0, exponent - 1)
    } else {
        (mantissa, exponent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frexp_ranges() {
        assert_eq!(frexp(8.0), (0.5, 4));
        assert_eq!(frexp(-3.0), (-0.75, 2));
        assert_eq!(frexp(0.0), (0.0, 0));
        assert_eq!(frexp(1.0), (0.5, 1));
    }
}
