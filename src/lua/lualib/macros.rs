//! Helper macros for Scribunto library implementations.

/// Creates an `mw_interface` interface object.
///
/// ```ignore
/// interface! {
///   using Self, ctx;
///
///   luaFnName = rust_fn_name,
///   // ...
/// }
/// ```
macro_rules! interface {
    (@rule $Self:ty, $ctx:ident, $table:ident; $(,)?) => {};

    (@rule $Self:ty, $ctx:ident, $table:ident; ~ $lua_name:ident = $rust_name:ident , $($rest:tt)*) => {
        $crate::lua::lualib::make_raw_interface_fn($table, stringify!($lua_name), $ctx, <$Self>::$rust_name);
        interface!(@rule $Self, $ctx, $table; $($rest)*);
    };

    (@rule $Self:ty, $ctx:ident, $table:ident; $lua_name:ident = $rust_name:ident , $($rest:tt)*) => {
        $crate::lua::lualib::make_interface_fn($table, stringify!($lua_name), $ctx, <$Self>::$rust_name);
        interface!(@rule $Self, $ctx, $table; $($rest)*);
    };

    (using $Self:ty, $ctx:ident; $($rest:tt)*) => {{
        let table = Table::new(&$ctx);
        interface!(@rule $Self, $ctx, table; $($rest)*);
        table
    }}
}
pub(super) use interface;

/// Shorthand for creating a Lua table with multiple fields.
///
/// ```ignore
/// table! {
///     using ctx;
///
///     key = value,
///     // ...
/// }
/// ```
macro_rules! table {
    (using $ctx:ident; $($key:ident = $value:expr),* $(,)?) => {{
        let table = piccolo::Table::new(&$ctx);
        $(table.set_field($ctx, stringify!($key), $value);)*
        table
    }}
}
pub(super) use table;
