//! Template and module call stack frames.

use super::{Error, Result, State, expand::eval, preprocess::Part};
use crate::title::Title;
use indexmap::IndexMap;
use std::borrow::Cow;

/// The arguments of a stack frame.
///
/// Keys are always strings. A key that looks like a number is only equal to
/// another key with exactly the same text, so `"0"`, `"00"`, and `"1"` are
/// three different arguments.
#[derive(Clone, Debug, Default)]
pub(crate) struct Arguments {
    /// The argument values, in first-seen order.
    values: IndexMap<String, String>,
    /// The ordinal of the last positional argument.
    positional: usize,
}

impl Arguments {
    /// Adds the next positional argument. The value is not trimmed.
    pub fn push_positional(&mut self, value: String) {
        self.positional += 1;
        self.values.insert(self.positional.to_string(), value);
    }

    /// Adds a named argument. The name and value are trimmed.
    pub fn insert_named(&mut self, name: &str, value: &str) {
        self.insert(name.trim().to_string(), value.trim().to_string());
    }

    /// Adds an argument with the exact given key and value. A later argument
    /// with the same key replaces an earlier one.
    pub fn insert(&mut self, key: String, value: String) {
        self.values.insert(key, value);
    }

    /// Returns the argument with the given key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Returns an iterator over all arguments in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of arguments.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Arguments
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut args = Self::default();
        for (key, value) in iter {
            args.insert(key.into(), value.into());
        }
        args
    }
}

/// A template transclusion or module call stack frame.
#[derive(Debug)]
pub(crate) struct StackFrame<'a> {
    /// The title of the page (template or module) rendered by this frame.
    pub title: Title,
    /// The arguments passed in from the parent.
    pub arguments: Arguments,
    /// The parent stack frame.
    pub parent: Option<&'a StackFrame<'a>>,
    /// The number of frames above the root frame.
    pub depth: usize,
}

impl<'a> StackFrame<'a> {
    /// Creates a new root stack frame for the page with the given title.
    pub fn root(title: Title) -> Self {
        Self {
            title,
            arguments: Arguments::default(),
            parent: None,
            depth: 0,
        }
    }

    /// Creates a new child stack frame for the given title with the given
    /// arguments.
    ///
    /// Returns [`Error::StackOverflow`] if the new frame would be deeper than
    /// `max_depth`.
    pub fn chain(&'a self, title: Title, arguments: Arguments, max_depth: usize) -> Result<Self> {
        if self.depth >= max_depth {
            log::warn!("Expansion depth exceeded at {title}");
            self.backtrace();
            return Err(Error::StackOverflow(title.key().to_string()));
        }

        Ok(Self {
            title,
            arguments,
            parent: Some(self),
            depth: self.depth + 1,
        })
    }

    /// Returns the frame of the page being expanded.
    pub fn page_frame(&self) -> &StackFrame<'a> {
        let mut sp = self;
        while let Some(parent) = sp.parent {
            sp = parent;
        }
        sp
    }

    /// Logs the chain of frames leading to this one.
    pub fn backtrace(&self) {
        let mut sp = Some(self);
        while let Some(frame) = sp {
            log::debug!("  at {}", frame.title);
            sp = frame.parent;
        }
    }
}

/// One argument of a parser function call.
#[derive(Debug)]
pub(crate) enum FnArg<'a> {
    /// An unexpanded part of a Wikitext template expression.
    Part(&'a Part),
    /// An already-expanded value, as given by a script or by the text after
    /// the `:` of a parser function call.
    Text(Cow<'a, str>),
}

/// The arguments of a parser function call.
///
/// Wikitext arguments are expanded lazily, since conditional functions only
/// expand the branch they take.
pub(crate) struct FnArgs<'a> {
    /// The stack frame of the caller.
    pub sp: &'a StackFrame<'a>,
    /// The lowercased name of the called function.
    pub callee: &'a str,
    /// The source text of [`FnArg::Part`] arguments.
    source: &'a str,
    /// The arguments.
    args: Vec<FnArg<'a>>,
}

impl<'a> FnArgs<'a> {
    /// Creates a new argument list.
    pub fn new(sp: &'a StackFrame<'a>, callee: &'a str, source: &'a str, args: Vec<FnArg<'a>>) -> Self {
        Self {
            sp,
            callee,
            source,
            args,
        }
    }

    /// The number of arguments.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Returns true if there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Expands the whole argument at `index`, including any `name=` part.
    pub fn eval(&self, state: &mut State<'_>, index: usize) -> Result<Option<Cow<'a, str>>> {
        Ok(match self.args.get(index) {
            None => None,
            Some(FnArg::Text(text)) => Some(text.clone()),
            Some(FnArg::Part(part)) => Some(Cow::Owned(eval(state, self.sp, self.source, &part.nodes)?)),
        })
    }

    /// Expands the argument at `index` as a `name=value` pair. The name is
    /// `None` if the argument has no top-level `=`.
    pub fn name_value(
        &self,
        state: &mut State<'_>,
        index: usize,
    ) -> Result<Option<(Option<String>, String)>> {
        Ok(match self.args.get(index) {
            None => None,
            Some(FnArg::Text(text)) => Some(match text.split_once('=') {
                Some((name, value)) => (Some(name.to_string()), value.to_string()),
                None => (None, text.to_string()),
            }),
            Some(FnArg::Part(part)) => Some(match part.name() {
                Some(name) => (
                    Some(eval(state, self.sp, self.source, name)?),
                    eval(state, self.sp, self.source, part.value())?,
                ),
                None => (None, eval(state, self.sp, self.source, &part.nodes)?),
            }),
        })
    }

    /// Expands every argument starting at `from` into template arguments.
    /// Named values are trimmed and positional values are not.
    pub fn arguments(&self, state: &mut State<'_>, from: usize) -> Result<Arguments> {
        let mut arguments = Arguments::default();
        for index in from..self.len() {
            match self.name_value(state, index)? {
                Some((Some(name), value)) => arguments.insert_named(&name, &value),
                Some((None, value)) => arguments.push_positional(value),
                None => {}
            }
        }
        Ok(arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Configuration, Namespace};

    #[test]
    fn argument_identity() {
        let mut args = Arguments::default();
        args.insert_named("0", " 0 ");
        args.insert_named("00", " 00 ");
        args.push_positional(" first ".into());
        args.insert_named("2", " second ");
        args.insert_named(" named ", " named ");

        assert_eq!(args.get("0"), Some("0"));
        assert_eq!(args.get("00"), Some("00"));
        assert_eq!(args.get("1"), Some(" first "));
        assert_eq!(args.get("2"), Some("second"));
        assert_eq!(args.get("named"), Some("named"));
        assert_eq!(args.get("01"), None);
        assert_eq!(args.len(), 5);
    }

    #[test]
    fn positional_ordinals_skip_named() {
        let mut args = Arguments::default();
        args.push_positional("a".into());
        args.insert_named("x", "y");
        args.push_positional("b".into());
        args.insert_named("1", "c");
        assert_eq!(
            args.iter().collect::<Vec<_>>(),
            [("1", "c"), ("x", "y"), ("2", "b")]
        );
    }

    #[test]
    fn depth_limit() {
        let config = Configuration::default();
        let title = |name| Title::new(name, Namespace::TEMPLATE, &config);
        let root = StackFrame::root(title("Page"));
        let a = root.chain(title("A"), Arguments::default(), 2).unwrap();
        let b = a.chain(title("B"), Arguments::default(), 2).unwrap();
        assert_eq!(b.depth, 2);
        assert_eq!(b.parent.unwrap().title.key(), "Template:A");
        let err = b.chain(title("C"), Arguments::default(), 2).unwrap_err();
        assert!(matches!(err, Error::StackOverflow(name) if name == "Template:C"));
    }
}
