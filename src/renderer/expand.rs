//! Recursive expansion of scanned Wikitext.

use super::{
    Result, State,
    preprocess::{Braces, Node},
    stack::StackFrame,
    template::render_template,
};

/// Expands the given nodes into `out`.
pub(super) fn expand_nodes(
    out: &mut String,
    state: &mut State<'_>,
    sp: &StackFrame<'_>,
    source: &str,
    nodes: &[Node],
) -> Result {
    for node in nodes {
        match node {
            Node::Text(range) => *out += &source[range.clone()],
            Node::Template(braces) => render_template(out, state, sp, source, braces)?,
            Node::Argument(braces) => render_parameter(out, state, sp, source, braces)?,
            Node::Link(inner) => {
                *out += "[[";
                expand_nodes(out, state, sp, source, inner)?;
                *out += "]]";
            }
            Node::ExtTag { name, range } => {
                let marker = state.strip_markers.mint(name, &source[range.clone()]);
                *out += &marker;
            }
        }
    }
    Ok(())
}

/// Expands the given nodes into a new string.
pub(super) fn eval(
    state: &mut State<'_>,
    sp: &StackFrame<'_>,
    source: &str,
    nodes: &[Node],
) -> Result<String> {
    let mut out = String::new();
    expand_nodes(&mut out, state, sp, source, nodes)?;
    Ok(out)
}

/// Renders a template parameter.
fn render_parameter(
    out: &mut String,
    state: &mut State<'_>,
    sp: &StackFrame<'_>,
    source: &str,
    braces: &Braces,
) -> Result {
    let name = eval(state, sp, source, &braces.parts[0].nodes)?;

    if let Some(value) = sp.arguments.get(name.trim()) {
        *out += value;
    } else if let Some(default) = braces.parts.get(1) {
        // The default is everything after the first pipe, so `=` is not
        // special here
        expand_nodes(out, state, sp, source, &default.nodes)?;
    } else {
        *out += "{{{";
        *out += &name;
        *out += "}}}";
    }

    Ok(())
}
