//! A balanced-delimiter scanner which splits Wikitext into the constructs that
//! matter for template expansion.
//!
//! Only templates (`{{...}}`), template parameters (`{{{...}}}`), links
//! (`[[...]]`), extension tags, comments, and inclusion control tags are
//! recognised. Everything else is text. Unclosed constructs are text, too.
//!
//! The scan is a single pass with an explicit stack of open constructs. A run
//! of closing braces closes as many of the innermost opening braces as it can,
//! three for a parameter or else two for a template, so five braces are a
//! template whose target is a parameter and six are a parameter whose name is
//! a parameter.

use crate::config::Configuration;
use std::ops::Range;

/// How a page is being used.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Inclusion {
    /// The page is being rendered directly.
    Direct,
    /// The page is being transcluded into another page.
    Transclude,
}

/// A piece of scanned Wikitext.
#[derive(Debug)]
pub(crate) enum Node {
    /// Plain text.
    Text(Range<usize>),
    /// A template, parser function, or variable.
    Template(Braces),
    /// A template parameter.
    Argument(Braces),
    /// A wikilink. Pipes inside a link do not separate template arguments.
    Link(Vec<Node>),
    /// An extension tag, including its body and end tag.
    ExtTag {
        /// The lowercased tag name.
        name: String,
        /// The source range of the whole tag.
        range: Range<usize>,
    },
}

/// The parts of a brace construct.
#[derive(Debug)]
pub(crate) struct Braces {
    /// The source range of the whole construct, including the braces.
    pub range: Range<usize>,
    /// The `|`-separated parts. The first part is the target.
    pub parts: Vec<Part>,
}

/// One `|`-separated part of a brace construct.
#[derive(Debug)]
pub(crate) struct Part {
    /// The source range of the part.
    pub range: Range<usize>,
    /// The content of the part.
    pub nodes: Vec<Node>,
    /// If this part is `name=value`, the index of the [`Node::Text`] holding
    /// the `=`.
    pub eq: Option<usize>,
}

impl Part {
    /// The nodes of the name of a `name=value` part.
    pub fn name(&self) -> Option<&[Node]> {
        self.eq.map(|eq| &self.nodes[..eq])
    }

    /// The nodes of the value of the part, which is the whole part when it is
    /// not `name=value`.
    pub fn value(&self) -> &[Node] {
        self.eq.map_or(&self.nodes, |eq| &self.nodes[eq + 1..])
    }

    /// Creates a new part, splitting at the first top-level `=` if the text
    /// before it could be a parameter name.
    fn new(source: &str, range: Range<usize>, mut nodes: Vec<Node>) -> Self {
        let eq = nodes.iter().enumerate().find_map(|(index, node)| {
            if let Node::Text(text) = node {
                source[text.clone()].find('=').map(|at| (index, text.start + at))
            } else {
                None
            }
        });

        let eq = eq
            .filter(|(_, at)| !source[range.start..*at].contains(['<', '>', '"', '\'']))
            .map(|(index, at)| {
                let Node::Text(text) = nodes.remove(index) else {
                    unreachable!()
                };
                let mut insert_at = index;
                if text.start < at {
                    nodes.insert(insert_at, Node::Text(text.start..at));
                    insert_at += 1;
                }
                nodes.insert(insert_at, Node::Text(at..at + 1));
                if at + 1 < text.end {
                    nodes.insert(insert_at + 1, Node::Text(at + 1..text.end));
                }
                insert_at
            });

        Self { range, nodes, eq }
    }
}

/// A scanned Wikitext document.
#[derive(Debug)]
pub(crate) struct Parsed {
    /// The source text, after `<onlyinclude>` extraction.
    pub source: String,
    /// The scanned nodes.
    pub nodes: Vec<Node>,
}

impl Parsed {
    /// The approximate heap size of this document.
    pub fn size(&self) -> usize {
        self.source.len() + self.nodes.len() * size_of::<Node>()
    }
}

/// The most opening delimiters which may be waiting for a close at once.
/// Openers beyond this are text, which bounds the depth of the scanned tree.
const MAX_OPEN: usize = 120;

/// Scans a Wikitext document.
pub(crate) fn parse(text: &str, inclusion: Inclusion, config: &Configuration) -> Parsed {
    let source = if inclusion == Inclusion::Transclude {
        only_include(text).unwrap_or_else(|| text.to_string())
    } else {
        text.to_string()
    };

    let nodes = Scanner {
        source: &source,
        lower: source.to_ascii_lowercase(),
        pos: 0,
        inclusion,
        config,
        stack: Vec::new(),
        open: 0,
        root: Vec::new(),
    }
    .run();

    Parsed { source, nodes }
}

/// Returns the concatenated contents of every `<onlyinclude>` section, if
/// there are any.
fn only_include(text: &str) -> Option<String> {
    const START: &str = "<onlyinclude>";
    const END: &str = "</onlyinclude>";

    let lower = text.to_ascii_lowercase();
    let mut start = lower.find(START)?;
    let mut out = String::new();
    loop {
        let body = start + START.len();
        let end = lower[body..].find(END).map_or(text.len(), |end| body + end);
        out += &text[body..end];
        match lower[end..].find(START) {
            Some(next) => start = end + next,
            None => break,
        }
    }
    Some(out)
}

/// The kind of an open construct.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Opener {
    /// A run of `{`.
    Brace,
    /// A run of `[`.
    Link,
}

impl Opener {
    /// The opener for a delimiter byte, which may be an opening or closing
    /// delimiter.
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'{' | b'}' => Some(Self::Brace),
            b'[' | b']' => Some(Self::Link),
            _ => None,
        }
    }
}

/// An open construct waiting for its closing delimiters.
#[derive(Debug)]
struct Piece {
    /// The kind of construct.
    opener: Opener,
    /// The position of the first unmatched opening delimiter.
    start: usize,
    /// The number of unmatched opening delimiters.
    count: usize,
    /// The finished `|`-separated parts.
    parts: Vec<Part>,
    /// The start of the current part.
    part_start: usize,
    /// The nodes of the current part.
    nodes: Vec<Node>,
}

impl Piece {
    /// Finishes the current part at `pos`.
    fn separate(&mut self, source: &str, pos: usize) {
        let nodes = core::mem::take(&mut self.nodes);
        self.parts.push(Part::new(source, self.part_start..pos, nodes));
        self.part_start = pos + 1;
    }
}

/// The result of scanning something that looks like a tag.
enum Tag {
    /// Not a tag; treat as text.
    Text,
    /// A tag or comment which produces no output.
    Skip,
    /// An extension tag.
    Node(Node),
}

/// Wikitext scanner state.
struct Scanner<'a> {
    /// The source text.
    source: &'a str,
    /// The source text, ASCII-lowercased, for tag searches.
    lower: String,
    /// The current position.
    pos: usize,
    /// How the document is being used.
    inclusion: Inclusion,
    /// Site configuration.
    config: &'a Configuration,
    /// The open constructs, innermost last.
    stack: Vec<Piece>,
    /// The total number of unmatched opening delimiters on the stack.
    open: usize,
    /// The top-level nodes.
    root: Vec<Node>,
}

impl Scanner<'_> {
    /// Scans the whole document in one pass. Constructs still open at the
    /// end of input become text, keeping any finished constructs inside
    /// them.
    fn run(mut self) -> Vec<Node> {
        let source = self.source;
        let bytes = source.as_bytes();
        let mut text_start = 0;

        while let Some(&byte) = bytes.get(self.pos) {
            let doubled = bytes.get(self.pos + 1) == Some(&byte);
            match byte {
                b'{' | b'[' if doubled => {
                    let run = run_length(bytes, self.pos);
                    let take = run.min(MAX_OPEN - self.open);
                    if take < 2 {
                        self.pos += run;
                        continue;
                    }
                    let start = self.pos + run - take;
                    self.text(text_start..start);
                    self.pos += run;
                    self.open += take;
                    self.stack.push(Piece {
                        opener: if byte == b'{' { Opener::Brace } else { Opener::Link },
                        start,
                        count: take,
                        parts: Vec::new(),
                        part_start: self.pos,
                        nodes: Vec::new(),
                    });
                    text_start = self.pos;
                }
                b'}' | b']' if doubled && self.top() == Opener::from_byte(byte) => {
                    self.text(text_start..self.pos);
                    self.close(run_length(bytes, self.pos));
                    text_start = self.pos;
                }
                b'|' if self.top() == Some(Opener::Brace) => {
                    self.text(text_start..self.pos);
                    if let Some(piece) = self.stack.last_mut() {
                        piece.separate(source, self.pos);
                    }
                    self.pos += 1;
                    text_start = self.pos;
                }
                b'<' => {
                    let start = self.pos;
                    match self.tag() {
                        Tag::Text => self.pos = start + 1,
                        Tag::Skip => {
                            self.text(text_start..start);
                            text_start = self.pos;
                        }
                        Tag::Node(node) => {
                            self.text(text_start..start);
                            self.push(node);
                            text_start = self.pos;
                        }
                    }
                }
                _ => self.pos += 1,
            }
        }

        self.text(text_start..self.pos);
        while let Some(piece) = self.stack.pop() {
            self.break_piece(piece);
        }
        self.root
    }

    /// The kind of the innermost open construct.
    fn top(&self) -> Option<Opener> {
        self.stack.last().map(|piece| piece.opener)
    }

    /// Appends a node to the innermost open construct, merging adjacent text.
    fn push(&mut self, node: Node) {
        let nodes = match self.stack.last_mut() {
            Some(piece) => &mut piece.nodes,
            None => &mut self.root,
        };
        if let Node::Text(range) = &node
            && let Some(Node::Text(last)) = nodes.last_mut()
            && last.end == range.start
        {
            last.end = range.end;
            return;
        }
        nodes.push(node);
    }

    /// Appends a text node, if `range` is not empty.
    fn text(&mut self, range: Range<usize>) {
        if !range.is_empty() {
            self.push(Node::Text(range));
        }
    }

    /// Closes the innermost construct with a run of `run` closing delimiters
    /// at the current position. A brace construct closes as a parameter if
    /// three braces match, otherwise as a template. Leftover opening
    /// delimiters stay open around the finished node.
    fn close(&mut self, run: usize) {
        let Some(mut piece) = self.stack.pop() else {
            return;
        };

        let matched = run.min(piece.count);
        let width = if piece.opener == Opener::Brace && matched >= 3 { 3 } else { 2 };
        let start = piece.start + piece.count - width;
        let end = self.pos + width;

        let node = match piece.opener {
            Opener::Link => Node::Link(core::mem::take(&mut piece.nodes)),
            Opener::Brace => {
                piece.separate(self.source, self.pos);
                let braces = Braces {
                    range: start..end,
                    parts: core::mem::take(&mut piece.parts),
                };
                if width == 3 {
                    Node::Argument(braces)
                } else {
                    Node::Template(braces)
                }
            }
        };

        piece.count -= width;
        self.open -= width;
        self.pos = end;

        if piece.count >= 2 {
            piece.part_start = start;
            piece.nodes = vec![node];
            self.stack.push(piece);
        } else {
            self.open -= piece.count;
            self.text(piece.start..piece.start + piece.count);
            self.push(node);
        }
    }

    /// Turns an unclosed construct back into text in its parent.
    fn break_piece(&mut self, piece: Piece) {
        let Piece {
            start,
            count,
            parts,
            part_start,
            nodes,
            ..
        } = piece;

        self.open -= count;
        self.text(start..start + count);
        let segments = parts
            .into_iter()
            .map(|part| (part.range.start, part.nodes))
            .chain([(part_start, nodes)]);
        for (index, (at, nodes)) in segments.enumerate() {
            if index != 0 {
                self.text(at - 1..at);
            }
            for node in nodes {
                self.push(node);
            }
        }
    }

    /// Scans something starting with `<`.
    fn tag(&mut self) -> Tag {
        let start = self.pos;
        if self.lower[start..].starts_with("<!--") {
            self.pos = self.lower[start + 4..]
                .find("-->")
                .map_or(self.source.len(), |end| start + 4 + end + 3);
            return Tag::Skip;
        }

        let bytes = self.lower.as_bytes();
        let mut name_start = start + 1;
        let is_end = bytes.get(name_start) == Some(&b'/');
        if is_end {
            name_start += 1;
        }
        let name_end = name_start
            + bytes[name_start..]
                .iter()
                .take_while(|b| b.is_ascii_alphanumeric() || **b == b'-')
                .count();
        if name_end == name_start
            || !matches!(bytes.get(name_end), Some(b' ' | b'\t' | b'\n' | b'/' | b'>'))
        {
            return Tag::Text;
        }

        let Some(gt) = memchr::memchr(b'>', &bytes[name_end..]).map(|at| name_end + at) else {
            return Tag::Text;
        };
        let self_closing = bytes[gt - 1] == b'/';
        let tag_end = gt + 1;
        let name = &self.lower[name_start..name_end];

        if matches!(name, "noinclude" | "includeonly" | "onlyinclude") {
            let hidden = match self.inclusion {
                Inclusion::Transclude => name == "noinclude",
                Inclusion::Direct => name == "includeonly",
            };
            self.pos = if hidden && !is_end && !self_closing {
                self.end_tag(name, tag_end)
                    .map_or(self.source.len(), |range| range.end)
            } else {
                tag_end
            };
            return Tag::Skip;
        }

        if is_end || !self.config.is_extension_tag(name) {
            return Tag::Text;
        }

        let end = if self_closing {
            tag_end
        } else if let Some(range) = self.end_tag(name, tag_end) {
            range.end
        } else {
            return Tag::Text;
        };

        self.pos = end;
        Tag::Node(Node::ExtTag {
            name: name.to_string(),
            range: start..end,
        })
    }

    /// Finds the end tag `</name>` at or after `from`.
    fn end_tag(&self, name: &str, from: usize) -> Option<Range<usize>> {
        let needle = format!("</{name}");
        let mut from = from;
        while let Some(at) = self.lower[from..].find(&needle) {
            let start = from + at;
            let after = start + needle.len();
            let rest = &self.lower[after..];
            let spaces = rest.len() - rest.trim_start().len();
            if rest[spaces..].starts_with('>') {
                return Some(start..after + spaces + 1);
            }
            from = after;
        }
        None
    }
}

/// The length of the run of identical bytes starting at `pos`.
fn run_length(bytes: &[u8], pos: usize) -> usize {
    let byte = bytes[pos];
    bytes[pos..].iter().take_while(|b| **b == byte).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(text: &str) -> Parsed {
        parse(text, Inclusion::Direct, &Configuration::default())
    }

    fn texts<'a>(parsed: &'a Parsed, nodes: &[Node]) -> Vec<&'a str> {
        nodes
            .iter()
            .map(|node| match node {
                Node::Text(range) => &parsed.source[range.clone()],
                Node::Template(_) => "<template>",
                Node::Argument(_) => "<argument>",
                Node::Link(_) => "<link>",
                Node::ExtTag { .. } => "<ext>",
            })
            .collect()
    }

    #[test]
    fn nested_templates() {
        let parsed = scan("a{{b|{{c|d}}|e=f}}g");
        assert_eq!(texts(&parsed, &parsed.nodes), ["a", "<template>", "g"]);
        let Node::Template(braces) = &parsed.nodes[1] else {
            panic!("expected template");
        };
        assert_eq!(braces.parts.len(), 3);
        assert_eq!(texts(&parsed, &braces.parts[1].nodes), ["<template>"]);
        let named = &braces.parts[2];
        assert_eq!(texts(&parsed, named.name().unwrap()), ["e"]);
        assert_eq!(texts(&parsed, named.value()), ["f"]);
    }

    #[test]
    fn pipes_in_links_do_not_split() {
        let parsed = scan("{{a|[[b|c]]|d}}");
        let Node::Template(braces) = &parsed.nodes[0] else {
            panic!("expected template");
        };
        assert_eq!(braces.parts.len(), 3);
        assert_eq!(texts(&parsed, &braces.parts[1].nodes), ["<link>"]);
    }

    #[test]
    fn brace_runs() {
        let parsed = scan("{{{{{1}}}}}");
        let Node::Template(braces) = &parsed.nodes[0] else {
            panic!("expected template");
        };
        assert_eq!(texts(&parsed, &braces.parts[0].nodes), ["<argument>"]);

        let parsed = scan("{{{x}}");
        assert_eq!(texts(&parsed, &parsed.nodes), ["{", "<template>"]);

        let parsed = scan("{{{{{{a}}}}}}");
        let Node::Argument(braces) = &parsed.nodes[0] else {
            panic!("expected argument");
        };
        assert_eq!(texts(&parsed, &braces.parts[0].nodes), ["<argument>"]);
    }

    #[test]
    fn unclosed() {
        let parsed = scan("a {{b|{{c}} [[d");
        assert_eq!(
            texts(&parsed, &parsed.nodes),
            ["a {{b|", "<template>", " [[d"]
        );

        let parsed = scan("{{a|[[b}}");
        assert_eq!(texts(&parsed, &parsed.nodes), ["{{a|[[b}}"]);

        let parsed = scan("{{{{x}}}}");
        assert_eq!(texts(&parsed, &parsed.nodes), ["{", "<argument>", "}"]);
    }

    #[test]
    fn many_unclosed_braces() {
        let text = "{{a|".repeat(5000);
        let parsed = scan(&text);
        assert_eq!(texts(&parsed, &parsed.nodes), [text.as_str()]);

        let text = format!("{}{{{{b}}}}", "{{a|x=".repeat(50));
        let parsed = scan(&text);
        assert_eq!(parsed.nodes.len(), 2);
        let Node::Template(braces) = &parsed.nodes[1] else {
            panic!("expected template");
        };
        assert_eq!(&parsed.source[braces.range.clone()], "{{b}}");
    }

    #[test]
    fn nesting_depth_is_bounded() {
        fn depth(nodes: &[Node]) -> usize {
            nodes
                .iter()
                .map(|node| match node {
                    Node::Link(inner) => 1 + depth(inner),
                    Node::Template(braces) | Node::Argument(braces) => {
                        1 + braces
                            .parts
                            .iter()
                            .map(|part| depth(&part.nodes))
                            .max()
                            .unwrap_or(0)
                    }
                    _ => 0,
                })
                .max()
                .unwrap_or(0)
        }

        let text = format!("{}x{}", "[[".repeat(20000), "]]".repeat(20000));
        let parsed = scan(&text);
        assert!(depth(&parsed.nodes) <= MAX_OPEN / 2);

        let text = format!("{}x{}", "{{a|".repeat(20000), "}}".repeat(20000));
        let parsed = scan(&text);
        assert!(depth(&parsed.nodes) <= MAX_OPEN / 2);
    }

    #[test]
    fn names_with_markup_are_positional() {
        let parsed = scan(r#"{{a|<span style="x">y</span>|b = c}}"#);
        let Node::Template(braces) = &parsed.nodes[0] else {
            panic!("expected template");
        };
        assert!(braces.parts[1].eq.is_none());
        assert_eq!(texts(&parsed, braces.parts[2].name().unwrap()), ["b "]);
        assert_eq!(texts(&parsed, braces.parts[2].value()), [" c"]);
    }

    #[test]
    fn tags_and_comments() {
        let parsed = scan("a<!-- {{x}} -->b<nowiki>{{y|z}}</nowiki >c<br>");
        assert_eq!(texts(&parsed, &parsed.nodes), ["a", "b", "<ext>", "c<br>"]);
        let Node::ExtTag { name, range } = &parsed.nodes[2] else {
            panic!("expected extension tag");
        };
        assert_eq!(name, "nowiki");
        assert_eq!(&parsed.source[range.clone()], "<nowiki>{{y|z}}</nowiki >");

        let parsed = scan("a<ref>unclosed");
        assert_eq!(texts(&parsed, &parsed.nodes), ["a<ref>unclosed"]);

        let parsed = scan("a<!-- unclosed");
        assert_eq!(texts(&parsed, &parsed.nodes), ["a"]);
    }

    #[test]
    fn inclusion() {
        let config = Configuration::default();
        let text = "a<noinclude>b</noinclude>c<includeonly>d</includeonly>e";

        let parsed = parse(text, Inclusion::Direct, &config);
        assert_eq!(texts(&parsed, &parsed.nodes), ["a", "b", "c", "e"]);

        let parsed = parse(text, Inclusion::Transclude, &config);
        assert_eq!(texts(&parsed, &parsed.nodes), ["a", "c", "d", "e"]);

        let parsed = parse(
            "x<onlyinclude>a</onlyinclude>y<onlyinclude>b</onlyinclude>z",
            Inclusion::Transclude,
            &config,
        );
        assert_eq!(parsed.source, "ab");
    }
}
