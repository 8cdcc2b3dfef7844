//! Lua interpreter support.
//!
//! Every `{{#invoke:}}` runs in a fresh sandbox environment created by
//! `mw.makeEnv`. Modules loaded with `require` share the environment of the
//! invocation that loaded them, so their globals are visible to each other
//! but never to another invocation.
//!
//! Scripts call back into the expander (to expand templates, call parser
//! functions, mint strip markers, and so on) by yielding a [`HostCall`] from
//! the executor. [`run_vm`] performs the call against the renderer state and
//! resumes the executor with a success flag and either the result or an error
//! message.

use crate::{
    config::Namespace,
    db::{Database, Page},
    renderer::{Arguments, Error, StackFrame, State},
    title::Title,
};
use core::ops::ControlFlow;
use gc_arena::Rootable;
use lualib::{LuaEngine, TitleLibrary};
use piccolo::{
    Executor, ExecutorMode, ExternError, Fuel, Function, Lua, RuntimeError, TypeError,
    thread::BadExecutorMode,
};
use prelude::*;
use std::{sync::Arc, time::Instant};

pub(crate) use lualib::fetch_language_name;

mod lualib;
mod prelude;
mod stdlib;
#[cfg(test)]
mod tests;

/// A child frame created by a Lua script with `frame:newChild`.
#[derive(Clone, Debug)]
pub(crate) struct LuaFrame {
    /// The ID of the frame which created this frame.
    parent: String,
    /// The title for the frame.
    title: Title,
    /// The arguments for the frame.
    arguments: Arguments,
}

/// A call from a Lua module back into the renderer.
// Clippy: The fields are self-documenting.
#[allow(clippy::missing_docs_in_private_items)]
#[derive(Clone, Debug)]
pub(crate) enum HostCall {
    /// A call to a [parser function](crate::renderer::call_parser_fn).
    CallParserFunction {
        frame_id: String,
        name: String,
        args: Vec<String>,
    },
    /// A call to [`call_template`](crate::renderer::call_template).
    ExpandTemplate {
        frame_id: String,
        title: String,
        args: Arguments,
    },
    /// A call to [`extension_tag`](crate::renderer::extension_tag).
    ExtensionTag {
        name: String,
        content: Option<String>,
        attrs: Vec<(Option<String>, String)>,
    },
    /// A call to
    /// [`preprocess_for_script`](crate::renderer::preprocess_for_script).
    Preprocess {
        frame_id: String,
        text: String,
        headings: bool,
    },
    /// A call to `mw.text.unstrip` or `mw.text.unstripNoWiki`.
    Unstrip { text: String, mode: UnstripMode },
}

/// The mode to use when restoring strip markers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum UnstripMode {
    /// Restore the escaped text of `<nowiki>` markers and retain other strip
    /// markers.
    UnstripNoWiki,
    /// Restore the escaped text of `<nowiki>` markers and remove all other
    /// strip markers.
    Unstrip,
}

/// Creates a new Lua VM for the given database.
pub(crate) fn new_vm(db: &Arc<Database>) -> Result<Lua, ExternError> {
    let mut vm = Lua::core();

    vm.try_enter(|ctx| {
        stdlib::load_compat(ctx)?;
        stdlib::load_os(ctx);
        Ok(())
    })?;

    // Libraries read the site configuration during their setup, so the
    // database has to be attached first
    vm.enter(|ctx| lualib::set_db(ctx, db));

    lualib::init(&mut vm)?;

    Ok(vm)
}

/// Resets the Lua VM for a new page with the given `title`.
pub(crate) fn reset_vm(vm: &mut Lua, title: &Title) -> Result<(), ExternError> {
    vm.try_enter(|ctx| {
        ctx.singleton::<Rootable![TitleLibrary]>().set_title(title);
        ctx.singleton::<Rootable![LuaEngine]>().clear_children();
        Ok(())
    })
}

/// Loads a Scribunto module into a new environment and calls its function
/// `fn_name` with a frame for `sp`, returning the concatenated result.
#[allow(clippy::too_many_lines)]
pub(crate) fn run_vm(
    state: &mut State<'_>,
    sp: &StackFrame<'_>,
    code: &Page,
    fn_name: &str,
) -> Result<String, Error> {
    let limits = state.statics.db.config().limits.clone();

    let make_env = state.statics.vm.try_enter(|ctx| {
        let mw = ctx.get_global::<Table<'_>>("mw")?;
        let make_env = mw.get::<_, Function<'_>>(ctx, "makeEnv")?;
        Ok(ctx.stash(Executor::start(ctx, make_env, ())))
    })?;

    state
        .statics
        .vm
        .finish(&make_env)
        .map_err(|err| ExternError::from(RuntimeError::from(err)))?;

    let ex = state.statics.vm.try_enter(|ctx| {
        let env = ctx.fetch(&make_env).take_result::<Table<'_>>(ctx)??;
        let module = Closure::load_with_env(ctx, Some(&code.title), code.body.as_bytes(), env)?;

        let parent = sp.parent.unwrap_or(sp);
        let info = Table::new(&ctx);
        info.set_field(ctx, "title", ctx.intern(sp.title.key().as_bytes()));
        info.set_field(ctx, "args", arguments_table(ctx, &sp.arguments)?);
        info.set_field(ctx, "parentTitle", ctx.intern(parent.title.key().as_bytes()));
        info.set_field(ctx, "parentArgs", arguments_table(ctx, &parent.arguments)?);
        info.set_field(ctx, "moduleKey", ctx.intern(code.title.as_bytes()));

        let mw = ctx.get_global::<Table<'_>>("mw")?;
        let mw_exec = mw.get::<_, Function<'_>>(ctx, "executeFunction")?;
        Ok(ctx.stash(Executor::start(
            ctx,
            mw_exec,
            (module, ctx.intern(fn_name.as_bytes()), env, info),
        )))
    })?;

    // TODO: Time spent in host calls counts against the script budget of
    // every invocation on the stack, which is unfair to outer invocations.
    let start = Instant::now();
    loop {
        loop {
            let mut fuel = Fuel::with(limits.fuel_per_step);
            match state
                .statics
                .vm
                .enter(|ctx| ctx.fetch(&ex).step(ctx, &mut fuel))
            {
                Ok(true) => break,
                Ok(false) => {
                    if state.statics.vm.total_memory() > limits.script_memory {
                        return Err(Error::ScriptBudget("memory limit exceeded"));
                    }

                    if start.elapsed() > limits.script_time {
                        return Err(Error::ScriptBudget("time limit exceeded"));
                    }
                }
                Err(err) => return Err(ExternError::from(RuntimeError::new(err)).into()),
            }
        }

        let result = state.statics.vm.try_enter(|ctx| {
            let ex = ctx.fetch(&ex);
            if ex.mode() == ExecutorMode::Result {
                let result = ex.take_result::<Value<'_>>(ctx)??;
                if let Value::String(result) = result {
                    Ok(ControlFlow::Break(result.to_str()?.to_string()))
                } else if let Value::UserData(host_call) = result
                    && let Ok(host_call) = host_call.downcast_static::<HostCall>()
                {
                    Ok(ControlFlow::Continue(host_call.clone()))
                } else {
                    Err(TypeError {
                        expected: "string or host call",
                        found: result.type_name(),
                    }
                    .into())
                }
            } else {
                Err(BadExecutorMode {
                    found: ex.mode(),
                    expected: ExecutorMode::Result,
                }
                .into())
            }
        })?;

        match result {
            ControlFlow::Continue(host_call) => {
                log::trace!("Host call {host_call:?}");
                // Failures other than budget overruns are raised as Lua errors
                let (ok, reply) = match lualib::run_host_call(state, sp, &host_call) {
                    Ok(result) => (true, result),
                    Err(err) if err.is_timeout() => return Err(err),
                    Err(err) => {
                        log::debug!("Host call failed: {err}");
                        (false, err.to_string())
                    }
                };
                state.statics.vm.try_enter(|ctx| {
                    ctx.fetch(&ex).resume(ctx, (ok, ctx.intern(reply.as_bytes())))?;
                    Ok(())
                })?;
            }
            ControlFlow::Break(result) => return Ok(result),
        }
    }
}

/// Converts frame arguments into a Lua table. Keys which are canonical
/// positive integers become integer keys and all other keys stay strings.
fn arguments_table<'gc>(
    ctx: Context<'gc>,
    arguments: &Arguments,
) -> Result<Table<'gc>, VmError<'gc>> {
    let table = Table::new(&ctx);
    for (key, value) in arguments.iter() {
        let value = ctx.intern(value.as_bytes());
        if let Some(index) = canonical_index(key) {
            table.set(ctx, index, value)?;
        } else {
            table.set(ctx, ctx.intern(key.as_bytes()), value)?;
        }
    }
    Ok(table)
}

/// Returns the integer value of `key` if it is written exactly as Lua would
/// write a positive integer.
fn canonical_index(key: &str) -> Option<i64> {
    key.parse::<i64>()
        .ok()
        .filter(|index| *index > 0 && index.to_string() == key)
}

/// Creates a title in the module namespace.
fn module_title(db: &Database, name: &str) -> Title {
    Title::new(name, Namespace::MODULE, db.config())
}
