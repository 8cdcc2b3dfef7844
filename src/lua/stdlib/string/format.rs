//! Lua 5.1-compatible `string.format`.

use super::lua_error;
use crate::lua::prelude::*;

/// Formats a string from values taken off the stack.
pub(super) fn format_lua<'gc>(
    ctx: Context<'gc>,
    _: Execution<'gc, '_>,
    mut stack: Stack<'gc, '_>,
) -> Result<CallbackReturn<'gc>, VmError<'gc>> {
    let format = stack.from_front::<VmString<'_>>(ctx)?;
    let mut args = stack.drain(..).collect::<Vec<_>>().into_iter();
    let mut argument = 1;
    let mut out = Vec::with_capacity(format.as_bytes().len());

    let mut rest = format.as_bytes();
    while let Some(at) = memchr::memchr(b'%', rest) {
        out.extend_from_slice(&rest[..at]);
        rest = &rest[at + 1..];
        if let Some((b'%', tail)) = rest.split_first() {
            out.push(b'%');
            rest = tail;
            continue;
        }

        let (spec, tail) =
            Spec::parse(rest).ok_or_else(|| lua_error(ctx, "invalid format (width or precision too long)"))?;
        rest = tail;
        argument += 1;
        let value = args.next().ok_or_else(|| {
            lua_error(ctx, format!("bad argument #{argument} to 'format' (no value)"))
        })?;
        let number = || {
            value.to_number().ok_or_else(|| {
                lua_error(
                    ctx,
                    format!(
                        "bad argument #{argument} to 'format' (number expected, got {})",
                        value.type_name()
                    ),
                )
            })
        };

        // Clippy: C conversions truncate and reinterpret by definition.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        match spec.conversion {
            b'c' => out.push(number()? as i64 as u8),
            b'd' | b'i' => spec.signed(&mut out, number()? as i64),
            b'u' | b'o' | b'x' | b'X' => spec.unsigned(&mut out, number()? as i64 as u64),
            b'e' | b'E' | b'f' | b'F' | b'g' | b'G' => spec.float(&mut out, number()?),
            b'q' => {
                let value = value.into_string(ctx).ok_or_else(|| {
                    lua_error(ctx, format!("bad argument #{argument} to 'format' (string expected)"))
                })?;
                quote(&mut out, value.as_bytes());
            }
            b's' => {
                let value = value.into_string(ctx).ok_or_else(|| {
                    lua_error(
                        ctx,
                        format!(
                            "bad argument #{argument} to 'format' (string expected, got {})",
                            value.type_name()
                        ),
                    )
                })?;
                let bytes = value.as_bytes();
                let bytes = &bytes[..spec.precision.map_or(bytes.len(), |p| p.min(bytes.len()))];
                spec.pad(&mut out, b"", bytes, false);
            }
            other => {
                return Err(lua_error(
                    ctx,
                    format!("invalid option '%{}' to 'format'", char::from(other)),
                ));
            }
        }
    }
    out.extend_from_slice(rest);

    stack.replace(ctx, ctx.intern(&out));
    Ok(CallbackReturn::Return)
}

/// Writes a string in a form which Lua can read back.
fn quote(out: &mut Vec<u8>, value: &[u8]) {
    out.push(b'"');
    for &b in value {
        match b {
            b'"' | b'\\' | b'\n' => out.extend_from_slice(&[b'\\', b]),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\0' => out.extend_from_slice(b"\\000"),
            _ => out.push(b),
        }
    }
    out.push(b'"');
}

/// A conversion specification.
#[derive(Debug, Default)]
#[allow(clippy::struct_excessive_bools)]
struct Spec {
    left: bool,
    plus: bool,
    space: bool,
    alt: bool,
    zero: bool,
    width: usize,
    precision: Option<usize>,
    conversion: u8,
}

impl Spec {
    /// Parses the specification following a `%`. Widths and precisions have
    /// at most two digits.
    fn parse(mut rest: &[u8]) -> Option<(Self, &[u8])> {
        let mut spec = Self::default();
        while let Some((&flag, tail)) = rest.split_first() {
            match flag {
                b'-' => spec.left = true,
                b'+' => spec.plus = true,
                b' ' => spec.space = true,
                b'#' => spec.alt = true,
                b'0' => spec.zero = true,
                _ => break,
            }
            rest = tail;
        }
        let (width, tail) = digits(rest)?;
        spec.width = width.unwrap_or(0);
        rest = tail;
        if let Some((b'.', tail)) = rest.split_first() {
            let (precision, tail) = digits(tail)?;
            spec.precision = Some(precision.unwrap_or(0));
            rest = tail;
        }
        let (&conversion, rest) = rest.split_first()?;
        spec.conversion = conversion;
        Some((spec, rest))
    }

    fn sign(&self, negative: bool) -> &'static [u8] {
        if negative {
            b"-"
        } else if self.plus {
            b"+"
        } else if self.space {
            b" "
        } else {
            b""
        }
    }

    /// Writes `body` after `prefix`, padded to the field width.
    fn pad(&self, out: &mut Vec<u8>, prefix: &[u8], body: &[u8], numeric: bool) {
        let fill = self.width.saturating_sub(prefix.len() + body.len());
        if self.left {
            out.extend_from_slice(prefix);
            out.extend_from_slice(body);
            out.resize(out.len() + fill, b' ');
        } else if self.zero && numeric {
            out.extend_from_slice(prefix);
            out.resize(out.len() + fill, b'0');
            out.extend_from_slice(body);
        } else {
            out.resize(out.len() + fill, b' ');
            out.extend_from_slice(prefix);
            out.extend_from_slice(body);
        }
    }

    /// Applies an integer precision, which is a minimum digit count.
    fn integer_body(&self, digits: String, zero: bool) -> String {
        match self.precision {
            Some(0) if zero => String::new(),
            Some(precision) => format!("{digits:0>precision$}"),
            None => digits,
        }
    }

    fn signed(&self, out: &mut Vec<u8>, value: i64) {
        let body = self.integer_body(value.unsigned_abs().to_string(), value == 0);
        let numeric = self.precision.is_none();
        self.pad(out, self.sign(value < 0), body.as_bytes(), numeric);
    }

    fn unsigned(&self, out: &mut Vec<u8>, value: u64) {
        let digits = match self.conversion {
            b'o' => format!("{value:o}"),
            b'x' => format!("{value:x}"),
            b'X' => format!("{value:X}"),
            _ => value.to_string(),
        };
        let mut body = self.integer_body(digits, value == 0);
        let prefix: &[u8] = match self.conversion {
            b'x' if self.alt && value != 0 => b"0x",
            b'X' if self.alt && value != 0 => b"0X",
            _ => b"",
        };
        if self.conversion == b'o' && self.alt && !body.starts_with('0') {
            body.insert(0, '0');
        }
        self.pad(out, prefix, body.as_bytes(), self.precision.is_none());
    }

    fn float(&self, out: &mut Vec<u8>, value: f64) {
        let upper = self.conversion.is_ascii_uppercase();
        let sign = self.sign(value.is_sign_negative() && !value.is_nan());
        let value = value.abs();
        if !value.is_finite() {
            let body = match (value.is_nan(), upper) {
                (true, false) => "nan",
                (true, true) => "NAN",
                (false, false) => "inf",
                (false, true) => "INF",
            };
            self.pad(out, sign, body.as_bytes(), false);
            return;
        }

        let precision = self.precision.unwrap_or(6);
        let body = match self.conversion.to_ascii_lowercase() {
            b'e' => exponential(value, precision, self.alt),
            b'f' => {
                let mut body = format!("{value:.precision$}");
                if self.alt && precision == 0 {
                    body.push('.');
                }
                body
            }
            _ => general(value, precision, self.alt),
        };
        let body = if upper { body.to_ascii_uppercase() } else { body };
        self.pad(out, sign, body.as_bytes(), true);
    }
}

/// Reads up to two decimal digits.
fn digits(s: &[u8]) -> Option<(Option<usize>, &[u8])> {
    let len = s.iter().take_while(|b| b.is_ascii_digit()).count();
    if len > 2 {
        return None;
    }
    let value = s[..len]
        .iter()
        .fold(0, |value, b| value * 10 + usize::from(b - b'0'));
    Some(((len != 0).then_some(value), &s[len..]))
}

/// Formats a non-negative number as `%e` does.
fn exponential(value: f64, precision: usize, alt: bool) -> String {
    let formatted = format!("{value:.precision$e}");
    let (mantissa, exponent) = formatted.split_once('e').unwrap_or((&formatted, "0"));
    let (exp_sign, exp_digits) = match exponent.strip_prefix('-') {
        Some(digits) => ('-', digits),
        None => ('+', exponent),
    };
    let dot = if alt && precision == 0 { "." } else { "" };
    format!("{mantissa}{dot}e{exp_sign}{exp_digits:0>2}")
}

/// Formats a non-negative number as `%g` does.
fn general(value: f64, precision: usize, alt: bool) -> String {
    let precision = precision.max(1);
    let exponent = if value == 0.0 {
        0
    } else {
        format!("{value:.prec$e}", prec = precision - 1)
            .split_once('e')
            .and_then(|(_, exponent)| exponent.parse::<i64>().ok())
            .unwrap_or(0)
    };
    let precision_i = i64::try_from(precision).unwrap_or(i64::MAX);
    let body = if exponent < -4 || exponent >= precision_i {
        exponential(value, precision - 1, alt)
    } else {
        let decimals = usize::try_from(precision_i - 1 - exponent).unwrap_or(0);
        format!("{value:.decimals$}")
    };
    if alt {
        return body;
    }
    match body.split_once('e') {
        Some((mantissa, exponent)) => format!("{}e{exponent}", trim_fraction(mantissa)),
        None => trim_fraction(&body).to_string(),
    }
}

/// Removes trailing zeros after a decimal point, and the point if nothing
/// remains after it.
fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(format: &str) -> Spec {
        Spec::parse(format.as_bytes()).unwrap().0
    }

    fn signed(format: &str, value: i64) -> String {
        let mut out = Vec::new();
        spec(format).signed(&mut out, value);
        String::from_utf8(out).unwrap()
    }

    fn float(format: &str, value: f64) -> String {
        let mut out = Vec::new();
        spec(format).float(&mut out, value);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn integers() {
        assert_eq!(signed("d", 42), "42");
        assert_eq!(signed("5d", -42), "  -42");
        assert_eq!(signed("-5d|", 7), "7    ");
        assert_eq!(signed("05d", -42), "-0042");
        assert_eq!(signed("+d", 3), "+3");
        assert_eq!(signed(".3d", 5), "005");
        let mut out = Vec::new();
        spec("#x").unsigned(&mut out, 255);
        spec("04X").unsigned(&mut out, 10);
        spec("o").unsigned(&mut out, 8);
        assert_eq!(out, b"0xff000A10");
    }

    #[test]
    fn floats() {
        assert_eq!(float("f", 1.5), "1.500000");
        assert_eq!(float(".2f", 2.675), "2.67");
        assert_eq!(float("8.3f", -3.14159), "  -3.142");
        assert_eq!(float("e", 12345.678), "1.234568e+04");
        assert_eq!(float(".1E", 0.000_12), "1.2E-04");
        assert_eq!(float("g", 100_000.0), "100000");
        assert_eq!(float("g", 1_000_000.0), "1e+06");
        assert_eq!(float("g", 0.0001), "0.0001");
        assert_eq!(float("g", 0.5), "0.5");
        assert_eq!(float(".14g", 0.1), "0.1");
        assert_eq!(float("f", f64::INFINITY), "inf");
    }

    #[test]
    fn quoting() {
        let mut out = Vec::new();
        quote(&mut out, b"a \"b\"\n\0");
        assert_eq!(out, b"\"a \\\"b\\\"\\\n\\000\"");
    }

    #[test]
    fn long_widths_are_rejected() {
        assert!(Spec::parse(b"100d").is_none());
        assert_eq!(spec("10.4f").width, 10);
    }
}
