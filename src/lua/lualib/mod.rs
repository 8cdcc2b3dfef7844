//! MediaWiki Lua support libraries.

// Clippy: Methods are implementing an interface which is invisible to clippy.
#![allow(clippy::unnecessary_wraps, clippy::unused_self)]

use crate::{db::Database, lua::HostCall, renderer::Arguments};
use arc_cell::OptionalArcCell;
use gc_arena::{Collect, Rootable};
pub(super) use mw::{LuaEngine, run_host_call};
pub(crate) use mw_language::fetch_language_name;
pub(super) use mw_title::TitleLibrary;
use piccolo::{Executor, Function, Lua, Stack, UserData};
use prelude::*;

mod ext_mw_data;
mod macros;
mod mw;
mod mw_html;
mod mw_language;
mod mw_site;
mod mw_text;
mod mw_title;
mod mw_uri;
mod mw_ustring;
mod mw_wikibase;
mod prelude;

/// The host interface for MediaWiki Scribunto Lua extensions.
trait MwInterface: Collect + Default + Sized + 'static {
    /// The name of the module. This will be the name seen in Lua tracebacks.
    const NAME: &str;
    /// The Lua code for the module.
    const CODE: &[u8];

    /// Returns the function table for the Lua side of the interface.
    ///
    /// The return value is a Lua table where each key is the name of the
    /// function on the Lua side and the value is a [`piccolo::Function`]. This
    /// value is assigned to the `mw_interface` global to be consumed later when
    /// `setup` is called.
    fn register(ctx: Context<'_>) -> Table<'_>;

    /// Returns the options for the corresponding Lua `setupInterface` function.
    fn setup<'gc>(&self, ctx: Context<'gc>) -> Result<Table<'gc>, RuntimeError>;
}

/// Initialises a single interface.
fn init_interface<T: MwInterface>(vm: &mut Lua) -> Result<(), RuntimeError> {
    log::debug!("Initialising lua module {}", T::NAME);

    let executor = vm.try_enter(|ctx| {
        let module = Closure::load(ctx, Some(T::NAME), T::CODE)?;
        Ok(ctx.stash(Executor::start(ctx, module.into(), ())))
    })?;

    vm.finish(&executor)?;

    let executor = vm.try_enter(|ctx| {
        let library = ctx.fetch(&executor).take_result::<Table<'_>>(ctx)??;
        let setup = library.get::<_, Function<'_>>(ctx, "setupInterface")?;

        let instance = ctx.singleton::<Rootable![T]>();

        let interface = T::register(ctx);
        ctx.set_global("mw_interface", interface);

        let options = instance.setup(ctx)?;
        Ok(ctx.stash(Executor::start(ctx, setup, (options,))))
    })?;

    vm.execute::<()>(&executor)?;

    Ok(())
}

/// Shorthand for running [`init_interface`] on a list of modules.
macro_rules! init_libraries {
    (using $vm:ident; $($ty:ty),* $(,)?) => {
        $(init_interface::<$ty>($vm)?;)*
    }
}

/// Initialises all the interfaces required for Scribunto modules to work.
///
/// The database must already be attached with [`set_db`].
pub(super) fn init(vm: &mut Lua) -> Result<(), RuntimeError> {
    const MW_INIT: &[u8] = include_bytes!("./modules/mwInit.lua");

    log::debug!("Loading mwInit");

    let executor = vm.try_enter(|ctx| {
        let module = Closure::load(ctx, Some("mwInit"), MW_INIT)?;
        Ok(ctx.stash(Executor::start(ctx, module.into(), ())))
    })?;

    vm.finish(&executor)?;

    init_libraries!(
        using vm;

        LuaEngine,
        mw_site::SiteLibrary,
        mw_uri::UriLibrary,
        mw_ustring::UstringLibrary,
        mw_language::LanguageLibrary,
        mw_title::TitleLibrary,
        mw_text::TextLibrary,
        mw_html::HtmlLibrary,
        mw_wikibase::WikibaseLibrary,
        ext_mw_data::TabularDataLibrary,
    );

    Ok(())
}

/// Attaches the page database to every library which reads from it.
pub(super) fn set_db(ctx: Context<'_>, db: &Arc<Database>) {
    ctx.singleton::<Rootable![LuaEngine]>().set_db(db);
    ctx.singleton::<Rootable![mw_site::SiteLibrary]>().set_db(db);
    ctx.singleton::<Rootable![mw_language::LanguageLibrary]>()
        .set_db(db);
    ctx.singleton::<Rootable![TitleLibrary]>().set_db(db);
    ctx.singleton::<Rootable![mw_wikibase::WikibaseLibrary]>()
        .set_db(db);
    ctx.singleton::<Rootable![ext_mw_data::TabularDataLibrary]>()
        .set_db(db);
}

/// Returns the database held by a library, or an error if it was never
/// attached.
fn get_db<'gc>(db: &OptionalArcCell<Database>) -> Result<Arc<Database>, VmError<'gc>> {
    db.get()
        .ok_or_else(|| RuntimeError::new(anyhow::anyhow!("no database attached to the VM")).into())
}

/// Replaces the stack contents with the given host call and yields it to the
/// driver loop.
fn yield_host_call<'gc>(
    ctx: Context<'gc>,
    mut stack: Stack<'gc, '_>,
    host_call: HostCall,
) -> Result<CallbackReturn<'gc>, VmError<'gc>> {
    stack.replace(ctx, UserData::new_static(&ctx, host_call));
    Ok(CallbackReturn::Yield {
        to_thread: None,
        then: None,
    })
}

/// Converts a Lua value to the text of a frame argument.
fn argument_text<'gc>(ctx: Context<'gc>, value: Value<'gc>) -> Result<Option<String>, VmError<'gc>> {
    Ok(match value {
        Value::String(s) => Some(s.to_str()?.to_string()),
        Value::Integer(n) => Some(n.to_string()),
        #[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
        Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some((n as i64).to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Nil => None,
        value => {
            return Err(format!("invalid argument value of type {}", value.type_name())
                .into_value(ctx)
                .into());
        }
    })
}

/// Converts a Lua table into frame arguments for template calls and child
/// frames.
fn arguments_from_table<'gc>(
    ctx: Context<'gc>,
    args: Table<'gc>,
) -> Result<Arguments, VmError<'gc>> {
    let mut positional = Vec::new();
    let mut named = Vec::new();
    for (key, value) in args {
        let Some(value) = argument_text(ctx, value)? else {
            continue;
        };
        match key {
            Value::Integer(index) => positional.push((index, value)),
            key => {
                if let Some(key) = argument_text(ctx, key)? {
                    named.push((key, value));
                }
            }
        }
    }
    positional.sort_unstable_by_key(|(index, _)| *index);

    Ok(positional
        .into_iter()
        .map(|(index, value)| (index.to_string(), value))
        .chain(named)
        .collect())
}

/// Adds a callback to the given interface table that uses typed parameters and
/// return values.
fn make_interface_fn<'gc, F, A, R, T>(
    table: Table<'gc>,
    name: &'static str,
    ctx: Context<'gc>,
    method: F,
) where
    F: Fn(&T, Context<'gc>, A) -> Result<R, VmError<'gc>> + 'static,
    A: piccolo::FromMultiValue<'gc>,
    R: piccolo::IntoMultiValue<'gc>,
    T: MwInterface,
{
    make_raw_interface_fn(table, name, ctx, move |this, ctx, mut stack| {
        let args = stack.consume::<A>(ctx)?;
        let ret = method(this, ctx, args)?;
        stack.replace(ctx, ret);
        Ok(CallbackReturn::Return)
    });
}

/// Adds a callback to the given interface table that operates directly on the
/// stack.
fn make_raw_interface_fn<'gc, F, T>(
    table: Table<'gc>,
    name: &'static str,
    ctx: Context<'gc>,
    method: F,
) where
    F: Fn(&T, Context<'gc>, Stack<'gc, '_>) -> Result<CallbackReturn<'gc>, VmError<'gc>> + 'static,
    T: MwInterface,
{
    let callback = Callback::from_fn(&ctx, move |ctx, _, stack| {
        let this = ctx.singleton::<Rootable![T]>();
        method(this, ctx, stack)
    });

    // Raw identifiers keep their prefix through `stringify!`
    table.set_field(ctx, name.trim_start_matches("r#"), callback);
}
