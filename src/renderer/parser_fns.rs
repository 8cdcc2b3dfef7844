//! Parser function and variable implementations.
//!
//! <https://www.mediawiki.org/wiki/Help:Extension:ParserFunctions>

// Clippy: Functions signatures all conform to a specific API; inline modules
// are clearer with wildcard import.
#![allow(clippy::unnecessary_wraps, clippy::wildcard_imports)]

use super::{
    Result, State,
    stack::{FnArgs, StackFrame},
    strip_markers::{for_each_non_marker, kill_markers},
    template::{call_module, extension_tag},
};
use crate::{
    common::{Entities, anchor_encode, decode_html, url_encode},
    config::Namespace,
    lua::fetch_language_name,
    title::Title,
};
use core::{fmt::Write as _, iter};
use regex::Regex;
use std::{borrow::Cow, sync::LazyLock};

/// The function signature of a parser function.
type ParserFn = fn(&mut String, &mut State<'_>, &FnArgs<'_>) -> Result;

/// The function signature of a variable.
type VariableFn = fn(&mut String, &mut State<'_>, &StackFrame<'_>) -> Result;

mod cond {
    //! Flow control parser functions.

    use super::*;

    /// `{{#if: condition | consequent (!condition.trim().is_empty()) | alternate }}`
    pub fn r#if(out: &mut String, state: &mut State<'_>, arguments: &FnArgs<'_>) -> Result {
        let lhs_is_empty = arguments
            .eval(state, 0)?
            .is_none_or(|value| decode_trim(value).is_empty());
        let index = 1 + usize::from(lhs_is_empty);
        if let Some(value) = arguments.eval(state, index)?.map(trim) {
            write!(out, "{value}")?;
        }

        Ok(())
    }

    /// `{{#ifeq: lhs | rhs | consequent (lhs == rhs) | alternate }}`
    pub fn if_eq(out: &mut String, state: &mut State<'_>, arguments: &FnArgs<'_>) -> Result {
        let lhs = arguments.eval(state, 0)?.map_or("".into(), decode_trim);
        let rhs = arguments.eval(state, 1)?.map_or("".into(), decode_trim);
        let is_eq = fuzzy_cmp(&lhs, &rhs);
        if let Some(value) = arguments.eval(state, 2 + usize::from(!is_eq))?.map(trim) {
            write!(out, "{value}")?;
        }

        Ok(())
    }

    /// `{{#iferror: condition | consequent (error) | alternate (no error) }}`
    pub fn if_error(out: &mut String, state: &mut State<'_>, arguments: &FnArgs<'_>) -> Result {
        static I_AM_BAD: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r#"<(?:strong|span|p|div)\s(?:[^\s>]*\s+)*?class="(?:[^"\s>]*\s+)*?error(?:\s[^">]*)?""#).unwrap()
        });

        let lhs = arguments.eval(state, 0)?;
        let is_error = lhs.as_deref().is_some_and(|lhs| I_AM_BAD.is_match(lhs));

        if is_error {
            if let Some(value) = arguments.eval(state, 1)?.map(trim) {
                write!(out, "{value}")?;
            }
        } else if let Some(value) = arguments.eval(state, 2)?.map(trim) {
            write!(out, "{value}")?;
        } else if let Some(value) = lhs.map(trim) {
            write!(out, "{value}")?;
        }

        Ok(())
    }

    /// `{{#ifexist: title | consequent (exists) | alternate }}`
    pub fn if_exist(out: &mut String, state: &mut State<'_>, arguments: &FnArgs<'_>) -> Result {
        let exists = arguments.eval(state, 0)?.map(trim).is_some_and(|value| {
            let db = &state.statics.db;
            db.contains(&db.title(Namespace::MAIN, &value))
        });
        if let Some(value) = arguments.eval(state, 1 + usize::from(!exists))?.map(trim) {
            write!(out, "{value}")?;
        }

        Ok(())
    }

    /// `{{#switch: match | case [| case ...] = value | default }}`
    pub fn switch(out: &mut String, state: &mut State<'_>, arguments: &FnArgs<'_>) -> Result {
        let lhs = arguments.eval(state, 0)?.map_or("".into(), decode_trim);
        let mut found = false;
        let mut default = None;

        let len = arguments.len();
        for index in 1..len {
            let Some((name, value)) = arguments.name_value(state, index)? else {
                break;
            };

            // A bare case falls through to the next `k=v`, and a bare final
            // case is the default
            match name {
                Some(name) => {
                    let name = decode_trim(Cow::Owned(name));
                    if found || fuzzy_cmp(&lhs, &name) {
                        write!(out, "{}", value.trim_ascii())?;
                        return Ok(());
                    }
                    if name == "#default" {
                        default = Some(value);
                    }
                }
                None if index + 1 == len => default = Some(value),
                None => {
                    found |= fuzzy_cmp(&lhs, &decode_trim(Cow::Borrowed(&value)));
                }
            }
        }

        if let Some(value) = default {
            write!(out, "{}", value.trim_ascii())?;
        }

        Ok(())
    }
}

mod ext {
    //! Tag and script parser functions.

    use super::*;

    /// `{{#tag: tag_name [| content [| attribute [= value] ...]] }}`
    pub fn extension_tag(
        out: &mut String,
        state: &mut State<'_>,
        arguments: &FnArgs<'_>,
    ) -> Result {
        let Some(name) = arguments.eval(state, 0)? else {
            return Ok(());
        };
        let content = arguments.eval(state, 1)?;

        let mut attrs = Vec::new();
        for index in 2..arguments.len() {
            match arguments.name_value(state, index)? {
                Some((Some(key), value)) => {
                    let value = value.trim();
                    let value = value
                        .strip_prefix('"')
                        .and_then(|v| v.strip_suffix('"'))
                        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                        .unwrap_or(value);
                    attrs.push((Some(key), value.to_string()));
                }
                Some((None, value)) => attrs.push((None, value.trim().to_string())),
                None => {}
            }
        }

        let tag = super::extension_tag(state, &name, &attrs, content.as_deref());
        *out += &tag;
        Ok(())
    }

    /// `{{#invoke: module | function [| argument [= value] ...] }}`
    pub fn invoke(out: &mut String, state: &mut State<'_>, arguments: &FnArgs<'_>) -> Result {
        call_module(out, state, arguments)
    }

    /// `{{#language: code [| in language] }}`
    pub fn language(out: &mut String, state: &mut State<'_>, arguments: &FnArgs<'_>) -> Result {
        if let Some(code) = arguments.eval(state, 0)?.map(trim) {
            let target = arguments.eval(state, 1)?.map(trim);
            let target = target.as_deref().filter(|target| !target.is_empty());
            match fetch_language_name(&code, target) {
                Some(name) => write!(out, "{name}")?,
                None => write!(out, "{code}")?,
            }
        }
        Ok(())
    }
}

mod string {
    //! String manipulation functions.

    use super::*;

    /// `{{anchorencode: text }}`
    pub fn anchor_encode(
        out: &mut String,
        state: &mut State<'_>,
        arguments: &FnArgs<'_>,
    ) -> Result {
        if let Some(text) = arguments.eval(state, 0)?.map(trim) {
            let text = kill_markers(&text);
            write!(out, "{}", super::anchor_encode(&text))?;
        }

        Ok(())
    }

    /// `{{lc: string }}`
    pub fn lc(out: &mut String, state: &mut State<'_>, arguments: &FnArgs<'_>) -> Result {
        if let Some(value) = arguments.eval(state, 0)?.map(trim) {
            *out += &for_each_non_marker(&value, str::to_lowercase);
        }
        Ok(())
    }

    /// `{{lcfirst: string }}`
    pub fn lc_first(out: &mut String, state: &mut State<'_>, arguments: &FnArgs<'_>) -> Result {
        if let Some(value) = arguments.eval(state, 0)?.map(trim) {
            let mut text = value.chars();
            if let Some(first) = text.next() {
                write!(out, "{}{}", first.to_lowercase(), text.as_str())?;
            }
        }
        Ok(())
    }

    /// `{{padleft: string | length [| padding value] }}`
    pub fn pad_left(out: &mut String, state: &mut State<'_>, arguments: &FnArgs<'_>) -> Result {
        pad(out, state, arguments, true)
    }

    /// `{{padright: string | length [| padding value] }}`
    pub fn pad_right(out: &mut String, state: &mut State<'_>, arguments: &FnArgs<'_>) -> Result {
        pad(out, state, arguments, false)
    }

    fn pad(out: &mut String, state: &mut State<'_>, arguments: &FnArgs<'_>, left: bool) -> Result {
        let (Some(value), Some(len)) = (
            arguments.eval(state, 0)?.map(trim),
            arguments.eval(state, 1)?.map(trim),
        ) else {
            return Ok(());
        };

        // MediaWiki caps the length at 500
        let len = len.parse::<usize>().unwrap_or(0).min(500);
        let value_len = value.chars().count();
        let pad = arguments.eval(state, 2)?.map_or(Cow::Borrowed("0"), trim);
        let padding = if value_len < len && !pad.is_empty() {
            iter::repeat(pad.chars())
                .flatten()
                .take(len - value_len)
                .collect::<String>()
        } else {
            String::new()
        };

        if left {
            write!(out, "{padding}{value}")?;
        } else {
            write!(out, "{value}{padding}")?;
        }
        Ok(())
    }

    /// `{{uc: string }}`
    pub fn uc(out: &mut String, state: &mut State<'_>, arguments: &FnArgs<'_>) -> Result {
        if let Some(value) = arguments.eval(state, 0)?.map(trim) {
            *out += &for_each_non_marker(&value, str::to_uppercase);
        }
        Ok(())
    }

    /// `{{ucfirst: string }}`
    pub fn uc_first(out: &mut String, state: &mut State<'_>, arguments: &FnArgs<'_>) -> Result {
        if let Some(value) = arguments.eval(state, 0)?.map(trim) {
            let mut text = value.chars();
            if let Some(first) = text.next() {
                write!(out, "{}{}", first.to_uppercase(), text.as_str())?;
            }
        }
        Ok(())
    }

    /// `{{urlencode: string }}`
    pub fn url_encode(out: &mut String, state: &mut State<'_>, arguments: &FnArgs<'_>) -> Result {
        if let Some(value) = arguments.eval(state, 0)?.map(trim) {
            write!(out, "{}", super::url_encode(&value).to_string().replace("%20", "+"))?;
        }
        Ok(())
    }
}

mod title {
    //! Title and namespace functions.

    use super::*;

    /// `{{ns: namespace name or id }}`
    pub fn namespace_by_name_or_id(
        out: &mut String,
        state: &mut State<'_>,
        arguments: &FnArgs<'_>,
    ) -> Result {
        let value = arguments.eval(state, 0)?.map(trim);
        let config = state.statics.db.config();
        let ns = value.and_then(|value| {
            if let Ok(id) = value.parse::<i32>() {
                config.namespace(id)
            } else {
                config.namespace_by_name(&value)
            }
        });
        if let Some(ns) = ns {
            write!(out, "{}", ns.name)?;
        }

        Ok(())
    }
}

mod vars {
    //! Page and site variables.

    use super::*;

    /// The title of the page being expanded.
    fn page_title<'a>(sp: &'a StackFrame<'_>) -> &'a Title {
        &sp.page_frame().title
    }

    /// `{{!}}`
    pub fn pipe(out: &mut String, _: &mut State<'_>, _: &StackFrame<'_>) -> Result {
        out.push('|');
        Ok(())
    }

    /// `{{=}}`
    pub fn equals(out: &mut String, _: &mut State<'_>, _: &StackFrame<'_>) -> Result {
        out.push('=');
        Ok(())
    }

    /// `{{BASEPAGENAME}}`
    pub fn base_page_name(out: &mut String, _: &mut State<'_>, sp: &StackFrame<'_>) -> Result {
        *out += page_title(sp).base_text();
        Ok(())
    }

    /// `{{FULLPAGENAME}}`
    pub fn full_page_name(out: &mut String, _: &mut State<'_>, sp: &StackFrame<'_>) -> Result {
        *out += page_title(sp).key();
        Ok(())
    }

    /// `{{NAMESPACE}}`
    pub fn namespace(out: &mut String, _: &mut State<'_>, sp: &StackFrame<'_>) -> Result {
        *out += page_title(sp).ns_text();
        Ok(())
    }

    /// `{{NAMESPACENUMBER}}`
    pub fn namespace_number(out: &mut String, _: &mut State<'_>, sp: &StackFrame<'_>) -> Result {
        write!(out, "{}", page_title(sp).namespace())?;
        Ok(())
    }

    /// `{{PAGENAME}}`
    pub fn page_name(out: &mut String, _: &mut State<'_>, sp: &StackFrame<'_>) -> Result {
        *out += page_title(sp).text();
        Ok(())
    }

    /// `{{ROOTPAGENAME}}`
    pub fn root_page_name(out: &mut String, _: &mut State<'_>, sp: &StackFrame<'_>) -> Result {
        *out += page_title(sp).root_text();
        Ok(())
    }

    /// `{{SITENAME}}`
    pub fn site_name(out: &mut String, state: &mut State<'_>, _: &StackFrame<'_>) -> Result {
        *out += &state.statics.db.config().site_name;
        Ok(())
    }

    /// `{{SUBPAGENAME}}`
    pub fn sub_page_name(out: &mut String, _: &mut State<'_>, sp: &StackFrame<'_>) -> Result {
        *out += page_title(sp).subpage_text();
        Ok(())
    }
}

/// Known parser functions, by lowercase name.
static PARSER_FUNCTIONS: phf::Map<&'static str, ParserFn> = phf::phf_map! {
    "#if" => cond::r#if,
    "#ifeq" => cond::if_eq,
    "#iferror" => cond::if_error,
    "#ifexist" => cond::if_exist,
    "#switch" => cond::switch,

    "#invoke" => ext::invoke,
    "#language" => ext::language,
    "#tag" => ext::extension_tag,
    "tag" => ext::extension_tag,

    "anchorencode" => string::anchor_encode,
    "lc" => string::lc,
    "lcfirst" => string::lc_first,
    "padleft" => string::pad_left,
    "padright" => string::pad_right,
    "uc" => string::uc,
    "ucfirst" => string::uc_first,
    "urlencode" => string::url_encode,

    "ns" => title::namespace_by_name_or_id,
};

/// Known variables, by exact name.
static VARIABLES: phf::Map<&'static str, VariableFn> = phf::phf_map! {
    "!" => vars::pipe,
    "=" => vars::equals,
    "BASEPAGENAME" => vars::base_page_name,
    "FULLPAGENAME" => vars::full_page_name,
    "NAMESPACE" => vars::namespace,
    "NAMESPACENUMBER" => vars::namespace_number,
    "PAGENAME" => vars::page_name,
    "ROOTPAGENAME" => vars::root_page_name,
    "SITENAME" => vars::site_name,
    "SUBPAGENAME" => vars::sub_page_name,
};

/// Returns true if `callee` is the lowercase name of a known parser function.
pub(super) fn is_parser_fn(callee: &str) -> bool {
    PARSER_FUNCTIONS.contains_key(callee)
}

/// Returns the implementation of the variable `name`, if one exists.
pub(super) fn variable(name: &str) -> Option<VariableFn> {
    VARIABLES.get(name).copied()
}

/// Renders a parser function. Unknown functions render nothing.
pub(crate) fn call_parser_fn(
    out: &mut String,
    state: &mut State<'_>,
    arguments: &FnArgs<'_>,
) -> Result {
    if let Some(parser_fn) = PARSER_FUNCTIONS.get(arguments.callee) {
        parser_fn(out, state, arguments)
    } else {
        log::warn!("unknown parser function {}", arguments.callee);
        Ok(())
    }
}

/// Compares two values as numbers if both of them are numbers, otherwise as
/// strings.
fn fuzzy_cmp(lhs: &str, rhs: &str) -> bool {
    let lhs = lhs.trim_ascii();
    let rhs = rhs.trim_ascii();
    if let (Ok(lhs), Ok(rhs)) = (lhs.parse::<i64>(), rhs.parse::<i64>()) {
        lhs == rhs
    } else if let (Ok(lhs), Ok(rhs)) = (lhs.parse::<f64>(), rhs.parse::<f64>()) {
        lhs == rhs
    } else {
        lhs == rhs
    }
}

/// Decodes HTML entities and trims ASCII whitespace from the value.
fn decode_trim(value: Cow<'_, str>) -> Cow<'_, str> {
    match value {
        Cow::Borrowed(value) => match decode_html(value, Entities::Basic) {
            Cow::Borrowed(value) => Cow::Borrowed(value.trim_ascii()),
            Cow::Owned(value) => Cow::Owned(value.trim_ascii().to_string()),
        },
        Cow::Owned(value) => Cow::Owned(decode_html(&value, Entities::Basic).trim_ascii().to_string()),
    }
}

/// Trims ASCII whitespace from the value.
///
/// Parser functions receive their arguments untrimmed, so they must trim
/// their own strings.
fn trim(value: Cow<'_, str>) -> Cow<'_, str> {
    match value {
        Cow::Borrowed(value) => Cow::Borrowed(value.trim_ascii()),
        Cow::Owned(value) => Cow::Owned(value.trim_ascii().to_string()),
    }
}
