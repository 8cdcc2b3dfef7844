//! MediaWiki Scribunto Lua support library.

// This code is (very, very loosely) adapted from mediawiki-extensions-Scribunto
// <https://github.com/wikimedia/mediawiki-extensions-Scribunto>.
//
// The upstream copyright is:
//
// SPDX-License-Identifier: GPL-2.0-or-later

use super::{MwInterface, arguments_from_table, get_db, prelude::*, yield_host_call};
use crate::{
    config::Namespace,
    db::{Database, Model},
    lua::{HostCall, LuaFrame, module_title},
    renderer::{
        self, FnArg, FnArgs, StackFrame, State, call_parser_fn, call_template, extension_tag,
        preprocess_for_script,
    },
    title::Title,
};
use arc_cell::OptionalArcCell;
use core::cell::{Cell, RefCell};
use gc_arena::Rootable;
use piccolo::{ExternError, Stack};
use std::{borrow::Cow, collections::HashMap};

/// The number of expensive function calls allowed per page before warnings
/// are logged.
const EXPENSIVE_FUNCTION_LIMIT: u32 = 500;

/// The main Lua support library.
#[derive(gc_arena::Collect, Default)]
#[collect(require_static)]
pub(crate) struct LuaEngine {
    /// The page database.
    db: OptionalArcCell<Database>,
    /// Frames created by `frame:newChild`, by frame ID.
    children: RefCell<HashMap<String, LuaFrame>>,
    /// The number of expensive function calls made on the current page.
    expensive_calls: Cell<u32>,
}

impl MwInterface for LuaEngine {
    const NAME: &'static str = "mw";
    const CODE: &'static [u8] = include_bytes!("./modules/mw.lua");

    fn register(ctx: Context<'_>) -> Table<'_> {
        interface! {
            using Self, ctx;

            loadPackage = load_package,
            moduleKey = module_key,
            pageKey = page_key,
            loadJsonData = load_json_data,
            newChildFrame = new_child_frame,
            log = log,
            addWarning = add_warning,
            isSubsting = is_substing,
            incrementExpensiveFunctionCount = increment_expensive_function_count,
            ~ expandTemplate = expand_template,
            ~ callParserFunction = call_parser_function,
            ~ preprocess = preprocess,
            ~ extensionTag = extension_tag,
        }
    }

    fn setup<'gc>(&self, ctx: Context<'gc>) -> Result<Table<'gc>, RuntimeError> {
        Ok(table! {
            using ctx;

            allowEnvFuncs = false
        })
    }
}

impl LuaEngine {
    /// Emits a warning to be displayed to users.
    fn add_warning<'gc>(
        &self,
        _: Context<'gc>,
        warning: VmString<'_>,
    ) -> Result<(), VmError<'gc>> {
        log::warn!("mw.addWarning: {}", warning.display_lossy());
        Ok(())
    }

    /// A trampoline for the [`HostCall::CallParserFunction`] host call.
    ///
    /// The Lua side flattens the arguments into a list of strings.
    fn call_parser_function<'gc>(
        &self,
        ctx: Context<'gc>,
        mut stack: Stack<'gc, '_>,
    ) -> Result<CallbackReturn<'gc>, VmError<'gc>> {
        let (frame_id, name, args) =
            stack.consume::<(VmString<'_>, VmString<'_>, Table<'_>)>(ctx)?;
        let args = (1..=args.length())
            .map(|index| {
                args.get::<_, VmString<'_>>(ctx, index)
                    .map_err(VmError::from)
                    .and_then(|arg| Ok(arg.to_str()?.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        yield_host_call(
            ctx,
            stack,
            HostCall::CallParserFunction {
                frame_id: frame_id.to_str()?.to_string(),
                name: name.to_str()?.to_string(),
                args,
            },
        )
    }

    /// Forgets all child frames.
    pub(crate) fn clear_children(&self) {
        self.children.borrow_mut().clear();
        self.expensive_calls.set(0);
    }

    /// Returns the database, or an error if it was never attached.
    fn db<'gc>(&self) -> Result<Arc<Database>, VmError<'gc>> {
        get_db(&self.db)
    }

    /// A trampoline for the [`HostCall::ExpandTemplate`] host call.
    fn expand_template<'gc>(
        &self,
        ctx: Context<'gc>,
        mut stack: Stack<'gc, '_>,
    ) -> Result<CallbackReturn<'gc>, VmError<'gc>> {
        let (frame_id, title, args) =
            stack.consume::<(VmString<'_>, VmString<'_>, Table<'_>)>(ctx)?;
        yield_host_call(
            ctx,
            stack,
            HostCall::ExpandTemplate {
                frame_id: frame_id.to_str()?.to_string(),
                title: title.to_str()?.to_string(),
                args: arguments_from_table(ctx, args)?,
            },
        )
    }

    /// A trampoline for the [`HostCall::ExtensionTag`] host call.
    fn extension_tag<'gc>(
        &self,
        ctx: Context<'gc>,
        mut stack: Stack<'gc, '_>,
    ) -> Result<CallbackReturn<'gc>, VmError<'gc>> {
        let (name, content, attrs) =
            stack.consume::<(VmString<'_>, Option<VmString<'_>>, Option<Table<'_>>)>(ctx)?;

        let mut positional = Vec::new();
        let mut named = Vec::new();
        for (key, value) in attrs.into_iter().flatten() {
            let Some(value) = value.into_string(ctx) else {
                continue;
            };
            let value = value.to_str()?.to_string();
            match key {
                Value::Integer(index) => positional.push((index, value)),
                key => {
                    if let Some(key) = key.into_string(ctx) {
                        named.push((Some(key.to_str()?.to_string()), value));
                    }
                }
            }
        }
        positional.sort_unstable_by_key(|(index, _)| *index);
        named.sort_unstable();

        let attrs = positional
            .into_iter()
            .map(|(_, value)| (None, value))
            .chain(named)
            .collect();

        yield_host_call(
            ctx,
            stack,
            HostCall::ExtensionTag {
                name: name.to_str()?.to_string(),
                content: content.map(|c| c.to_str().map(ToString::to_string)).transpose()?,
                attrs,
            },
        )
    }

    /// Counts a call to an expensive function.
    fn increment_expensive_function_count<'gc>(
        &self,
        _: Context<'gc>,
        (): (),
    ) -> Result<(), VmError<'gc>> {
        let count = self.expensive_calls.get() + 1;
        self.expensive_calls.set(count);
        if count == EXPENSIVE_FUNCTION_LIMIT + 1 {
            log::warn!("Too many expensive function calls on this page");
        }
        Ok(())
    }

    /// Returns whether or not the engine is currently in save mode.
    ///
    /// The expander never saves pages.
    fn is_substing<'gc>(&self, _: Context<'gc>, (): ()) -> Result<bool, VmError<'gc>> {
        Ok(false)
    }

    /// Loads a possibly built-in package into the given environment.
    fn load_package<'gc>(
        &self,
        ctx: Context<'gc>,
        (name, env): (VmString<'_>, Table<'gc>),
    ) -> Result<Closure<'gc>, VmError<'gc>> {
        let name = name.to_str()?;
        log::trace!("mw.loadPackage({name})");

        if let Some((name, source)) = BUILT_INS.iter().find(|(k, _)| *k == name) {
            return Closure::load_with_env(ctx, Some(*name), *source, env).map_err(Into::into);
        }

        let db = self.db()?;
        let title = module_title(&db, name);
        match db.get(&title).map(|page| db.resolve_redirects(page)) {
            Some(page) if page.model == Model::Script => {
                Closure::load_with_env(ctx, Some(&page.title), page.body.as_bytes(), env)
                    .map_err(Into::into)
            }
            _ => Err(format!("module '{}' not found", title.key())
                .into_value(ctx)
                .into()),
        }
    }

    /// Loads JSON data from the given page.
    fn load_json_data<'gc>(
        &self,
        ctx: Context<'gc>,
        title: VmString<'gc>,
    ) -> Result<Value<'gc>, VmError<'gc>> {
        let db = self.db()?;
        let title = db.title(Namespace::MAIN, title.to_str()?);
        let Some(page) = db
            .get(&title)
            .map(|page| db.resolve_redirects(page))
            .filter(|page| page.model == Model::Json)
        else {
            return Err(anyhow::anyhow!(
                "bad argument #1 to 'mw.loadJsonData' ('{title}' is not a valid JSON page)"
            ))?;
        };

        let ser = piccolo_util::serde::ser::Serializer::new(ctx, <_>::default());
        let mut deser = serde_json::Deserializer::from_slice(page.body.as_bytes());
        Ok(serde_transcode::transcode(&mut deser, ser)?)
    }

    /// Writes a message from a module to the log.
    fn log<'gc>(&self, _: Context<'gc>, message: VmString<'_>) -> Result<(), VmError<'gc>> {
        log::debug!("mw.log: {}", message.display_lossy());
        Ok(())
    }

    /// Returns the key of the `require` and `mw.loadData` caches for the
    /// module `name`.
    fn module_key<'gc>(
        &self,
        ctx: Context<'gc>,
        name: VmString<'gc>,
    ) -> Result<VmString<'gc>, VmError<'gc>> {
        let text = name.to_str()?;
        if BUILT_INS.iter().any(|(k, _)| *k == text) {
            return Ok(name);
        }
        let db = self.db()?;
        Ok(ctx.intern(module_title(&db, text).key().as_bytes()))
    }

    /// Creates a child frame with the given `title` and `args` whose parent
    /// is `frame_id`, and returns the ID of the new frame.
    fn new_child_frame<'gc>(
        &self,
        ctx: Context<'gc>,
        (frame_id, title, args): (VmString<'gc>, VmString<'gc>, Table<'gc>),
    ) -> Result<VmString<'gc>, VmError<'gc>> {
        let parent = frame_id.to_str()?.to_string();
        if parent != "current" && parent != "parent" && !self.children.borrow().contains_key(&parent)
        {
            return Err(format!("frame '{parent}' does not exist")
                .into_value(ctx)
                .into());
        }

        let db = self.db()?;
        let frame = LuaFrame {
            parent,
            title: db.title(Namespace::MAIN, title.to_str()?),
            arguments: arguments_from_table(ctx, args)?,
        };

        let mut children = self.children.borrow_mut();
        // 'current' and 'parent' count as the first two frames
        let id = format!("frame{}", children.len() + 2);
        let interned = ctx.intern(id.as_bytes());
        children.insert(id, frame);
        Ok(interned)
    }

    /// Returns the normalised key of a page title.
    fn page_key<'gc>(
        &self,
        ctx: Context<'gc>,
        title: VmString<'gc>,
    ) -> Result<VmString<'gc>, VmError<'gc>> {
        let db = self.db()?;
        Ok(ctx.intern(db.title(Namespace::MAIN, title.to_str()?).key().as_bytes()))
    }

    /// A trampoline for the [`HostCall::Preprocess`] host call.
    fn preprocess<'gc>(
        &self,
        ctx: Context<'gc>,
        mut stack: Stack<'gc, '_>,
    ) -> Result<CallbackReturn<'gc>, VmError<'gc>> {
        let (frame_id, text, headings) =
            stack.consume::<(VmString<'_>, VmString<'_>, Option<bool>)>(ctx)?;
        yield_host_call(
            ctx,
            stack,
            HostCall::Preprocess {
                frame_id: frame_id.to_str()?.to_string(),
                text: text.to_str()?.to_string(),
                headings: headings.unwrap_or(true),
            },
        )
    }

    /// Sets the page database.
    pub(crate) fn set_db(&self, db: &Arc<Database>) {
        self.db.set(Some(Arc::clone(db)));
    }
}

/// Calls the function `f` with the stack frame associated with `frame_id`,
/// relative to the frame `sp` of the running module.
fn with_sp(
    state: &mut State<'_>,
    sp: &StackFrame<'_>,
    frame_id: &str,
    f: &mut dyn FnMut(&mut State<'_>, &StackFrame<'_>) -> renderer::Result<String>,
) -> renderer::Result<String> {
    match frame_id {
        "current" => f(state, sp),
        "parent" => f(state, sp.parent.unwrap_or(sp)),
        _ => {
            let child = state.statics.vm.enter(|ctx| {
                ctx.singleton::<Rootable![LuaEngine]>()
                    .children
                    .borrow()
                    .get(frame_id)
                    .cloned()
            });
            let Some(child) = child else {
                return Err(ExternError::from(RuntimeError::new(anyhow::anyhow!(
                    "frame '{frame_id}' does not exist"
                )))
                .into());
            };

            let max_depth = state.statics.db.config().limits.max_depth;
            with_sp(state, sp, &child.parent, &mut |state, parent| {
                let sp = parent.chain(child.title.clone(), child.arguments.clone(), max_depth)?;
                f(state, &sp)
            })
        }
    }
}

/// Runs a VM host call, returning the text to resume the module with.
pub(crate) fn run_host_call(
    state: &mut State<'_>,
    sp: &StackFrame<'_>,
    host_call: &HostCall,
) -> renderer::Result<String> {
    match host_call {
        HostCall::CallParserFunction {
            frame_id,
            name,
            args,
        } => with_sp(state, sp, frame_id, &mut |state, sp| {
            let (callee, first) = name
                .split_once(':')
                .map_or((name.as_str(), None), |(callee, first)| (callee, Some(first)));
            let callee = callee.trim().to_lowercase();

            let mut fn_args = Vec::with_capacity(args.len() + 1);
            if let Some(first) = first {
                fn_args.push(FnArg::Text(Cow::Borrowed(first)));
            }
            fn_args.extend(args.iter().map(|arg| FnArg::Text(Cow::Borrowed(arg.as_str()))));

            let mut out = String::new();
            call_parser_fn(&mut out, state, &FnArgs::new(sp, &callee, "", fn_args))?;
            Ok(out)
        }),
        HostCall::ExpandTemplate {
            frame_id,
            title,
            args,
        } => with_sp(state, sp, frame_id, &mut |state, sp| {
            let callee = Title::new(title, Namespace::TEMPLATE, state.statics.db.config());
            let mut out = String::new();
            call_template(&mut out, state, sp, callee, args.clone())?;
            Ok(out)
        }),
        HostCall::ExtensionTag {
            name,
            content,
            attrs,
        } => Ok(extension_tag(state, name, attrs, content.as_deref())),
        HostCall::Preprocess {
            frame_id,
            text,
            headings,
        } => with_sp(state, sp, frame_id, &mut |state, sp| {
            preprocess_for_script(state, sp, text, *headings)
        }),
        HostCall::Unstrip { text, mode } => Ok(super::mw_text::unstrip(state, text, *mode)),
    }
}

/// The list of built-in Lua libraries.
const BUILT_INS: &[(&str, &[u8])] = &[
    ("libraryUtil", include_bytes!("./modules/libraryUtil.lua")),
    ("strict", include_bytes!("./modules/strict.lua")),
];
