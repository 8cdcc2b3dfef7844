//! Template, module, and extension tag calls.

use super::{
    Error, Result, State,
    expand::{eval, expand_nodes},
    parser_fns,
    preprocess::{self, Braces, Inclusion},
    stack::{Arguments, FnArg, FnArgs, StackFrame},
    strip_markers::kill_markers,
};
use crate::{common::encode_html, config::Namespace, lua, title::Title};
use core::fmt::Write as _;
use regex::Regex;
use std::{borrow::Cow, sync::LazyLock};
use unicode_normalization::{UnicodeNormalization as _, is_nfc};

/// Renders a template expression.
pub(super) fn render_template(
    out: &mut String,
    state: &mut State<'_>,
    sp: &StackFrame<'_>,
    source: &str,
    braces: &Braces,
) -> Result {
    let target = eval(state, sp, source, &braces.parts[0].nodes)?;
    let target = target.trim();
    let arguments = &braces.parts[1..];

    if arguments.is_empty()
        && let Some(variable) = parser_fns::variable(target)
    {
        return variable(out, state, sp);
    }

    if let Some((callee, first)) = target.split_once(':') {
        let callee = callee.trim().to_lowercase();
        if parser_fns::is_parser_fn(&callee) {
            let mut args = Vec::with_capacity(braces.parts.len());
            args.push(FnArg::Text(Cow::Borrowed(first)));
            args.extend(arguments.iter().map(FnArg::Part));
            let args = FnArgs::new(sp, &callee, source, args);
            return parser_fns::call_parser_fn(out, state, &args);
        }
    }

    if !is_valid_target(target) {
        // Not a template after all, so the expression is just text
        *out += "{{";
        *out += target;
        for part in arguments {
            out.push('|');
            expand_nodes(out, state, sp, source, &part.nodes)?;
        }
        *out += "}}";
        return Ok(());
    }

    let callee = Title::new(target, Namespace::TEMPLATE, state.statics.db.config());
    let args = FnArgs::new(sp, "", source, arguments.iter().map(FnArg::Part).collect());
    let arguments = args.arguments(state, 0)?;
    call_template(out, state, sp, callee, arguments)
}

/// Returns true if the given template target could be the name of a page.
fn is_valid_target(target: &str) -> bool {
    !target.is_empty()
        && !target.contains(['<', '>', '[', ']', '{', '}', '|', '\x7f'])
        && !target.starts_with('#')
}

/// Transcludes a template.
pub(crate) fn call_template(
    out: &mut String,
    state: &mut State<'_>,
    sp: &StackFrame<'_>,
    callee: Title,
    arguments: Arguments,
) -> Result {
    let Some(template) = state.statics.db.get(&callee) else {
        log::warn!("No template found for '{callee}'");
        write!(out, "[[:{}]]", callee.key())?;
        return Ok(());
    };
    let template = state.statics.db.resolve_redirects(template);

    let max_depth = state.statics.db.config().limits.max_depth;
    let sp = match sp.chain(callee, arguments, max_depth) {
        Ok(sp) => sp,
        Err(err @ Error::StackOverflow(_)) => return render_error(out, &err),
        Err(err) => return Err(err),
    };

    log::trace!("Expanding {}", template.title);
    let parsed = state.parse_cached(&template.title, &template.body);
    expand_nodes(out, state, &sp, &parsed.source, &parsed.nodes)
}

/// Calls a Lua function.
pub(super) fn call_module(out: &mut String, state: &mut State<'_>, arguments: &FnArgs<'_>) -> Result {
    let Some(callee) = arguments.eval(state, 0)? else {
        log::warn!("tried to call #invoke with no module name");
        return Ok(());
    };
    let callee = Title::new(callee.trim(), Namespace::MODULE, state.statics.db.config());

    let fn_name = arguments
        .eval(state, 1)?
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());
    let Some(fn_name) = fn_name else {
        log::warn!("{callee}: {}", Error::MissingFunctionName);
        return render_error(out, &Error::MissingFunctionName);
    };

    let Some(code) = state.statics.db.get(&callee) else {
        log::warn!("could not load module {callee}");
        arguments.sp.backtrace();
        write!(out, "[[:{}]]", callee.key())?;
        return Ok(());
    };
    let code = state.statics.db.resolve_redirects(code);

    let max_depth = state.statics.db.config().limits.max_depth;
    let frame_args = arguments.arguments(state, 2)?;
    let sp = match arguments.sp.chain(callee.clone(), frame_args, max_depth) {
        Ok(sp) => sp,
        Err(err @ Error::StackOverflow(_)) => return render_error(out, &err),
        Err(err) => return Err(err),
    };

    log::trace!("Invoking {}|{fn_name}", code.title);
    let result = lua::run_vm(state, &sp, &code, &fn_name).map_err(|err| Error::Module {
        name: code.title.clone(),
        fn_name: fn_name.clone(),
        err: Box::new(err),
    });

    match result {
        Ok(result) if is_nfc(&result) => *out += &result,
        Ok(result) => out.extend(result.nfc()),
        Err(err) => {
            log::error!("{}: {err:#}", sp.title);
            let kind = if err.is_timeout() {
                "Lua timeout error"
            } else {
                "Lua execution error"
            };
            write!(
                out,
                r#"<strong class="error">{kind} in {} function {}</strong>"#,
                encode_html(callee.key()),
                encode_html(&fn_name)
            )?;
        }
    }

    Ok(())
}

/// Writes an inline diagnostic for an error which only affects one branch of
/// the expansion.
fn render_error(out: &mut String, err: &Error) -> Result {
    write!(
        out,
        r#"<strong class="error">{}</strong>"#,
        encode_html(&err.to_string())
    )?;
    Ok(())
}

/// Renders an extension tag call from a parser function or a script.
///
/// Registered extension tags become a strip marker whose payload is the
/// whole tag. Other tags are returned as literal markup.
pub(crate) fn extension_tag(
    state: &mut State<'_>,
    name: &str,
    attrs: &[(Option<String>, String)],
    content: Option<&str>,
) -> String {
    let name = kill_markers(name).trim().to_ascii_lowercase();
    let mut tag = format!("<{name}");
    for (key, value) in attrs {
        tag.push(' ');
        match key {
            Some(key) => {
                let _ = write!(tag, r#"{}="{}""#, key.trim(), encode_html(value));
            }
            None => tag += value,
        }
    }
    match content {
        Some(content) => {
            let _ = write!(tag, ">{content}</{name}>");
        }
        None => tag += "/>",
    }

    if state.statics.db.config().is_extension_tag(&name) {
        state.strip_markers.mint(&name, tag)
    } else {
        tag
    }
}

/// Expands Wikitext on behalf of a script, in the context of the given frame.
///
/// If `headings` is true, heading lines in the result get an `h` strip marker
/// after their opening `=` run.
pub(crate) fn preprocess_for_script(
    state: &mut State<'_>,
    sp: &StackFrame<'_>,
    text: &str,
    headings: bool,
) -> Result<String> {
    static HEADING: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^(=+)([^=\n]+)(=+)[ \t]*$").unwrap());

    let inclusion = if sp.depth == 0 {
        Inclusion::Direct
    } else {
        Inclusion::Transclude
    };
    let parsed = preprocess::parse(text, inclusion, state.statics.db.config());
    let expanded = eval(state, sp, &parsed.source, &parsed.nodes)?;
    if !headings {
        return Ok(expanded);
    }

    let strip_markers = &mut *state.strip_markers;
    let result = HEADING.replace_all(&expanded, |caps: &regex::Captures<'_>| {
        if caps[1] == caps[3] {
            let marker = strip_markers.mint("h", &caps[0]);
            format!("{}{marker}{}{}", &caps[1], &caps[2], &caps[3])
        } else {
            caps[0].to_string()
        }
    });
    Ok(result.into_owned())
}
