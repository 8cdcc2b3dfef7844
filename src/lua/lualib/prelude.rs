//! The Scribunto Lua library prelude.

pub(super) use super::{
    MwInterface,
    macros::{interface, table},
};
pub(super) use piccolo::{
    Callback, CallbackReturn, Closure, Context, Error as VmError, IntoValue, RuntimeError,
    String as VmString, Table, Value,
};
pub(super) use std::sync::Arc;
