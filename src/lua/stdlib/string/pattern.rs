//! Lua 5.1 pattern matching.
//!
//! The matcher is generic over the unit of text so that the same engine serves
//! both the byte-oriented `string` library and the character-oriented
//! `mw.ustring` library. Positions are always indices into the unit slice.

use core::ops::Range;
use std::borrow::Cow;
use unicode_general_category::{GeneralCategory, get_general_category};

/// The maximum number of captures in a single pattern.
const MAX_CAPTURES: usize = 32;

/// The maximum matcher recursion depth.
const MAX_DEPTH: usize = 200;

/// A pattern matching error.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub(crate) enum PatternError {
    #[error("malformed pattern (ends with '%')")]
    EndsWithPercent,
    #[error("malformed pattern (missing ']')")]
    MissingBracket,
    #[error("missing '[' after '%f' in pattern")]
    FrontierWithoutSet,
    #[error("malformed pattern (missing arguments to '%b')")]
    BalanceArguments,
    #[error("invalid capture index")]
    CaptureIndex,
    #[error("invalid pattern capture")]
    PatternCapture,
    #[error("unfinished capture")]
    UnfinishedCapture,
    #[error("too many captures")]
    TooManyCaptures,
    #[error("pattern too complex")]
    TooComplex,
    #[error("invalid use of '%' in replacement string")]
    Replacement,
}

type Result<T, E = PatternError> = core::result::Result<T, E>;

/// A unit of text which patterns operate on.
pub(crate) trait Unit: Copy + Ord + 'static {
    /// Converts an ASCII byte to a unit.
    fn from_ascii(b: u8) -> Self;

    /// Returns the unit as an ASCII byte, if it is one.
    fn to_ascii(self) -> Option<u8>;

    /// Tests the unit against the lowercase class letter `class`. Returns
    /// `None` if `class` is not a class letter.
    fn in_class(self, class: u8) -> Option<bool>;

    /// Splits a Lua string into units, or returns `None` if the string is
    /// not valid for this unit type.
    fn decode(bytes: &[u8]) -> Option<Cow<'_, [Self]>>;

    /// Appends the encoded form of `units` to `out`.
    fn encode(units: &[Self], out: &mut Vec<u8>);
}

impl Unit for u8 {
    fn from_ascii(b: u8) -> Self {
        b
    }

    fn to_ascii(self) -> Option<u8> {
        self.is_ascii().then_some(self)
    }

    fn in_class(self, class: u8) -> Option<bool> {
        Some(match class {
            b'a' => self.is_ascii_alphabetic(),
            b'c' => self.is_ascii_control(),
            b'd' => self.is_ascii_digit(),
            b'l' => self.is_ascii_lowercase(),
            b'p' => self.is_ascii_punctuation(),
            b's' => matches!(self, b' ' | b'\t'..=b'\r'),
            b'u' => self.is_ascii_uppercase(),
            b'w' => self.is_ascii_alphanumeric(),
            b'x' => self.is_ascii_hexdigit(),
            b'z' => self == 0,
            _ => return None,
        })
    }

    fn decode(bytes: &[u8]) -> Option<Cow<'_, [Self]>> {
        Some(Cow::Borrowed(bytes))
    }

    fn encode(units: &[Self], out: &mut Vec<u8>) {
        out.extend_from_slice(units);
    }
}

impl Unit for char {
    fn from_ascii(b: u8) -> Self {
        char::from(b)
    }

    fn to_ascii(self) -> Option<u8> {
        u8::try_from(self).ok().filter(u8::is_ascii)
    }

    fn in_class(self, class: u8) -> Option<bool> {
        // Clippy: Verbosity is not a useful thing here.
        #[allow(clippy::enum_glob_use)]
        use GeneralCategory::*;
        let category = get_general_category(self);
        let letter = matches!(
            category,
            LowercaseLetter | ModifierLetter | OtherLetter | TitlecaseLetter | UppercaseLetter
        );
        Some(match class {
            b'a' => letter,
            b'c' => category == Control,
            b'd' => category == DecimalNumber,
            b'l' => category == LowercaseLetter,
            b'p' => matches!(
                category,
                ClosePunctuation
                    | ConnectorPunctuation
                    | DashPunctuation
                    | FinalPunctuation
                    | InitialPunctuation
                    | OpenPunctuation
                    | OtherPunctuation
            ),
            b's' => {
                matches!(self, '\t'..='\r')
                    || matches!(category, SpaceSeparator | LineSeparator | ParagraphSeparator)
            }
            b'u' => category == UppercaseLetter,
            b'w' => letter || category == DecimalNumber,
            b'x' => matches!(self, '0'..='9' | 'A'..='F' | 'a'..='f' | '０'..='９' | 'Ａ'..='Ｆ' | 'ａ'..='ｆ'),
            b'z' => self == '\0',
            _ => return None,
        })
    }

    fn decode(bytes: &[u8]) -> Option<Cow<'_, [Self]>> {
        core::str::from_utf8(bytes)
            .ok()
            .map(|s| Cow::Owned(s.chars().collect()))
    }

    fn encode(units: &[Self], out: &mut Vec<u8>) {
        let mut buf = [0; 4];
        for c in units {
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
    }
}

/// A single captured value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum Capture {
    /// A captured substring.
    Text(Range<usize>),
    /// A position capture `()`.
    Position(usize),
}

/// A successful match.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Match {
    /// The range of the whole match.
    pub range: Range<usize>,
    /// The explicit captures, in pattern order.
    pub captures: Vec<Capture>,
}

impl Match {
    /// Returns the captures, or the whole match if there were no explicit
    /// captures.
    pub fn values(&self) -> Cow<'_, [Capture]> {
        if self.captures.is_empty() {
            Cow::Owned(vec![Capture::Text(self.range.clone())])
        } else {
            Cow::Borrowed(&self.captures)
        }
    }
}

/// Returns true if the pattern contains no magic characters.
pub(crate) fn is_plain<U: Unit>(pattern: &[U]) -> bool {
    !pattern.iter().any(|c| {
        c.to_ascii()
            .is_some_and(|c| b"^$*+?.([%-".contains(&c))
    })
}

/// Finds the literal `needle` in `input` at or after `init`.
pub(crate) fn find_plain<U: Unit>(input: &[U], needle: &[U], init: usize) -> Option<Range<usize>> {
    if needle.is_empty() {
        return (init <= input.len()).then_some(init..init);
    }
    input
        .get(init..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|at| init + at..init + at + needle.len())
}

/// Finds the first match of `pattern` in `input` at or after `init`. A leading
/// `^` anchors the match to `init`.
pub(crate) fn find<U: Unit>(input: &[U], pattern: &[U], init: usize) -> Result<Option<Match>> {
    let (anchored, pattern) = match pattern.split_first() {
        Some((first, rest)) if *first == U::from_ascii(b'^') => (true, rest),
        _ => (false, pattern),
    };
    let mut matcher = Matcher::new(input, pattern);
    for start in init..=input.len() {
        if let Some(found) = matcher.match_at(start)? {
            return Ok(Some(found));
        }
        if anchored {
            break;
        }
    }
    Ok(None)
}

/// A capture slot during matching.
#[derive(Clone, Copy, Debug)]
enum Slot {
    Open(usize),
    Position(usize),
    Closed(usize, usize),
}

/// A pattern matcher over one input.
pub(crate) struct Matcher<'a, U> {
    input: &'a [U],
    pattern: &'a [U],
    depth: usize,
    slots: Vec<Slot>,
}

impl<'a, U: Unit> Matcher<'a, U> {
    /// Creates a matcher for `pattern` over `input`. The pattern is matched
    /// literally from its first unit, so any anchor must already be removed.
    pub fn new(input: &'a [U], pattern: &'a [U]) -> Self {
        Self {
            input,
            pattern,
            depth: 0,
            slots: Vec::new(),
        }
    }

    /// Tries to match the whole pattern starting exactly at `start`.
    pub fn match_at(&mut self, start: usize) -> Result<Option<Match>> {
        self.depth = 0;
        self.slots.clear();
        let Some(end) = self.step(start, 0)? else {
            return Ok(None);
        };
        let captures = self
            .slots
            .iter()
            .map(|slot| match *slot {
                Slot::Open(_) => Err(PatternError::UnfinishedCapture),
                Slot::Position(at) => Ok(Capture::Position(at)),
                Slot::Closed(from, to) => Ok(Capture::Text(from..to)),
            })
            .collect::<Result<_>>()?;
        Ok(Some(Match {
            range: start..end,
            captures,
        }))
    }

    fn is(&self, p: usize, b: u8) -> bool {
        self.pattern.get(p) == Some(&U::from_ascii(b))
    }

    /// Matches from input position `s` and pattern position `p`, returning
    /// the end of the match.
    fn step(&mut self, s: usize, p: usize) -> Result<Option<usize>> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(PatternError::TooComplex);
        }
        let result = self.step_inner(s, p);
        self.depth -= 1;
        result
    }

    fn step_inner(&mut self, mut s: usize, mut p: usize) -> Result<Option<usize>> {
        loop {
            let Some(&current) = self.pattern.get(p) else {
                return Ok(Some(s));
            };
            match current.to_ascii() {
                Some(b'(') => {
                    return if self.is(p + 1, b')') {
                        self.open_capture(s, p + 2, Slot::Position(s))
                    } else {
                        self.open_capture(s, p + 1, Slot::Open(s))
                    };
                }
                Some(b')') => return self.close_capture(s, p + 1),
                Some(b'$') if p + 1 == self.pattern.len() => {
                    return Ok((s == self.input.len()).then_some(s));
                }
                Some(b'%') if self.is(p + 1, b'b') => {
                    match self.balance(s, p + 2)? {
                        Some(end) => {
                            s = end;
                            p += 4;
                            continue;
                        }
                        None => return Ok(None),
                    }
                }
                Some(b'%') if self.is(p + 1, b'f') => {
                    p += 2;
                    if !self.is(p, b'[') {
                        return Err(PatternError::FrontierWithoutSet);
                    }
                    let end = self.class_end(p)?;
                    let previous = s.checked_sub(1).map_or(U::from_ascii(0), |at| self.input[at]);
                    let next = self.input.get(s).copied().unwrap_or(U::from_ascii(0));
                    if !self.in_set(previous, p, end - 1) && self.in_set(next, p, end - 1) {
                        p = end;
                        continue;
                    }
                    return Ok(None);
                }
                Some(b'%')
                    if self
                        .pattern
                        .get(p + 1)
                        .and_then(|c| c.to_ascii())
                        .is_some_and(|c| c.is_ascii_digit()) =>
                {
                    match self.back_reference(s, p + 1)? {
                        Some(end) => {
                            s = end;
                            p += 2;
                            continue;
                        }
                        None => return Ok(None),
                    }
                }
                _ => {}
            }

            let end = self.class_end(p)?;
            let matched = self
                .input
                .get(s)
                .is_some_and(|&c| self.single(c, p, end));
            match self.pattern.get(end).and_then(|c| c.to_ascii()) {
                Some(b'?') => {
                    if matched && let Some(found) = self.step(s + 1, end + 1)? {
                        return Ok(Some(found));
                    }
                    p = end + 1;
                }
                Some(b'+') => {
                    return if matched {
                        self.max_expand(s + 1, p, end)
                    } else {
                        Ok(None)
                    };
                }
                Some(b'*') => return self.max_expand(s, p, end),
                Some(b'-') => return self.min_expand(s, p, end),
                _ => {
                    if !matched {
                        return Ok(None);
                    }
                    s += 1;
                    p = end;
                }
            }
        }
    }

    fn max_expand(&mut self, s: usize, p: usize, end: usize) -> Result<Option<usize>> {
        let count = self.input[s..]
            .iter()
            .take_while(|&&c| self.single(c, p, end))
            .count();
        for extra in (0..=count).rev() {
            if let Some(found) = self.step(s + extra, end + 1)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    fn min_expand(&mut self, mut s: usize, p: usize, end: usize) -> Result<Option<usize>> {
        loop {
            if let Some(found) = self.step(s, end + 1)? {
                return Ok(Some(found));
            }
            if self.input.get(s).is_some_and(|&c| self.single(c, p, end)) {
                s += 1;
            } else {
                return Ok(None);
            }
        }
    }

    fn open_capture(&mut self, s: usize, p: usize, slot: Slot) -> Result<Option<usize>> {
        if self.slots.len() >= MAX_CAPTURES {
            return Err(PatternError::TooManyCaptures);
        }
        self.slots.push(slot);
        let result = self.step(s, p)?;
        if result.is_none() {
            self.slots.pop();
        }
        Ok(result)
    }

    fn close_capture(&mut self, s: usize, p: usize) -> Result<Option<usize>> {
        let index = self
            .slots
            .iter()
            .rposition(|slot| matches!(slot, Slot::Open(_)))
            .ok_or(PatternError::PatternCapture)?;
        let Slot::Open(from) = self.slots[index] else {
            return Err(PatternError::PatternCapture);
        };
        self.slots[index] = Slot::Closed(from, s);
        let result = self.step(s, p)?;
        if result.is_none() {
            self.slots[index] = Slot::Open(from);
        }
        Ok(result)
    }

    fn balance(&self, s: usize, p: usize) -> Result<Option<usize>> {
        let (Some(&open), Some(&close)) = (self.pattern.get(p), self.pattern.get(p + 1)) else {
            return Err(PatternError::BalanceArguments);
        };
        if self.input.get(s) != Some(&open) {
            return Ok(None);
        }
        let mut level = 1_usize;
        for (at, &c) in self.input.iter().enumerate().skip(s + 1) {
            if c == close {
                level -= 1;
                if level == 0 {
                    return Ok(Some(at + 1));
                }
            } else if c == open {
                level += 1;
            }
        }
        Ok(None)
    }

    fn back_reference(&self, s: usize, p: usize) -> Result<Option<usize>> {
        let index = self.pattern[p]
            .to_ascii()
            .map(|c| usize::from(c - b'0'))
            .and_then(|index| index.checked_sub(1))
            .ok_or(PatternError::CaptureIndex)?;
        let Some(&Slot::Closed(from, to)) = self.slots.get(index) else {
            return Err(PatternError::CaptureIndex);
        };
        let captured = &self.input[from..to];
        Ok(self
            .input
            .get(s..s + captured.len())
            .filter(|candidate| *candidate == captured)
            .map(|_| s + captured.len()))
    }

    /// Returns the pattern position after the single-unit class at `p`.
    fn class_end(&self, mut p: usize) -> Result<usize> {
        let first = self.pattern[p];
        p += 1;
        if first == U::from_ascii(b'%') {
            return if p < self.pattern.len() {
                Ok(p + 1)
            } else {
                Err(PatternError::EndsWithPercent)
            };
        }
        if first == U::from_ascii(b'[') {
            if self.is(p, b'^') {
                p += 1;
            }
            loop {
                let Some(&c) = self.pattern.get(p) else {
                    return Err(PatternError::MissingBracket);
                };
                p += 1;
                if c == U::from_ascii(b'%') && p < self.pattern.len() {
                    p += 1;
                }
                if self.is(p, b']') {
                    return Ok(p + 1);
                }
            }
        }
        Ok(p)
    }

    /// Tests one input unit against the single-unit class at `p..end`.
    fn single(&self, c: U, p: usize, end: usize) -> bool {
        let class = self.pattern[p];
        match class.to_ascii() {
            Some(b'.') => true,
            Some(b'%') => class_matches(c, self.pattern[p + 1]),
            Some(b'[') => self.in_set(c, p, end - 1),
            _ => class == c,
        }
    }

    /// Tests one input unit against the set `[...]` spanning `p..=close`.
    fn in_set(&self, c: U, mut p: usize, close: usize) -> bool {
        let mut found = true;
        p += 1;
        if self.is(p, b'^') {
            found = false;
            p += 1;
        }
        while p < close {
            let item = self.pattern[p];
            if item == U::from_ascii(b'%') {
                p += 1;
                if class_matches(c, self.pattern[p]) {
                    return found;
                }
                p += 1;
            } else if self.is(p + 1, b'-') && p + 2 < close {
                if item <= c && c <= self.pattern[p + 2] {
                    return found;
                }
                p += 3;
            } else {
                if item == c {
                    return found;
                }
                p += 1;
            }
        }
        !found
    }
}

/// Tests `c` against the escaped class letter `class`. Uppercase letters
/// negate the class and non-letters match themselves.
fn class_matches<U: Unit>(c: U, class: U) -> bool {
    let Some(letter) = class.to_ascii() else {
        return c == class;
    };
    match c.in_class(letter.to_ascii_lowercase()) {
        Some(matched) => matched != letter.is_ascii_uppercase(),
        None => c == class,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(input: &str, pattern: &str) -> Option<(Range<usize>, Vec<Capture>)> {
        find(input.as_bytes(), pattern.as_bytes(), 0)
            .unwrap()
            .map(|found| (found.range, found.captures))
    }

    fn chars(input: &str, pattern: &str) -> Option<Range<usize>> {
        let input = input.chars().collect::<Vec<_>>();
        let pattern = pattern.chars().collect::<Vec<_>>();
        find(&input, &pattern, 0).unwrap().map(|found| found.range)
    }

    #[test]
    fn classes_and_quantifiers() {
        assert_eq!(bytes("hello world", "o w"), Some((4..7, vec![])));
        assert_eq!(bytes("  key = value", "%a+"), Some((2..5, vec![])));
        assert_eq!(bytes("abc123", "%d*$"), Some((3..6, vec![])));
        assert_eq!(bytes("aaab", "a-b"), Some((0..4, vec![])));
        assert_eq!(bytes("color colour", "colou?r"), Some((0..5, vec![])));
        assert_eq!(bytes("x=1", "^%s*x"), Some((0..1, vec![])));
        assert_eq!(bytes(" x=1", "^x"), None);
        assert_eq!(bytes("A-z", "[%u-]+"), Some((0..2, vec![])));
        assert_eq!(bytes("q9", "[^%a]"), Some((1..2, vec![])));
        assert_eq!(bytes("b", "[a-c]"), Some((0..1, vec![])));
    }

    #[test]
    fn captures() {
        assert_eq!(
            bytes("key = value", "(%w+)%s*=%s*(%w+)"),
            Some((0..11, vec![Capture::Text(0..3), Capture::Text(6..11)]))
        );
        assert_eq!(
            bytes("abc", "()b()"),
            Some((1..2, vec![Capture::Position(1), Capture::Position(2)]))
        );
        assert_eq!(
            bytes("say 'hi' there", "(['\"])(.-)%1"),
            Some((4..8, vec![Capture::Text(4..5), Capture::Text(5..7)]))
        );
    }

    #[test]
    fn balance_and_frontier() {
        assert_eq!(bytes("f(a(b)c) d", "%b()"), Some((1..8, vec![])));
        assert_eq!(bytes("THE (quick) fox", "%f[%a]%a+"), Some((0..3, vec![])));
        assert_eq!(bytes("the fox", "%f[%a]fox"), Some((4..7, vec![])));
    }

    #[test]
    fn unicode_classes() {
        assert_eq!(chars("12 héllo", "%a+"), Some(3..8));
        assert_eq!(chars("日本語テキスト", "[語テ]+"), Some(2..4));
        assert_eq!(chars("über", "^.b"), Some(0..2));
    }

    #[test]
    fn errors() {
        let fail = |pattern: &str| find(b"abc".as_slice(), pattern.as_bytes(), 0).unwrap_err();
        assert_eq!(fail("a%"), PatternError::EndsWithPercent);
        assert_eq!(fail("[a"), PatternError::MissingBracket);
        assert_eq!(fail("(a"), PatternError::UnfinishedCapture);
        assert_eq!(fail("a)"), PatternError::PatternCapture);
        assert_eq!(fail("%f"), PatternError::FrontierWithoutSet);
        assert_eq!(fail("%b"), PatternError::BalanceArguments);
        assert_eq!(fail("(a)%2"), PatternError::CaptureIndex);
        let deep = "a*".repeat(MAX_DEPTH + 10);
        assert_eq!(fail(&deep), PatternError::TooComplex);
    }

    #[test]
    fn plain_search() {
        assert_eq!(find_plain(b"a.b.c".as_slice(), b".c".as_slice(), 0), Some(3..5));
        assert_eq!(find_plain(b"abc".as_slice(), b"".as_slice(), 3), Some(3..3));
        assert_eq!(find_plain(b"abc".as_slice(), b"x".as_slice(), 0), None);
        assert!(is_plain(b"hello world".as_slice()));
        assert!(!is_plain(b"a.b".as_slice()));
    }
}
