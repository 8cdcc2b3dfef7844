//! A MediaWiki template and Scribunto module expander.
//!
//! Pages are loaded into a shared [`Database`](db::Database), then each worker
//! thread creates its own [`Renderer`] to expand pages against it:
//!
//! ```ignore
//! let db = Arc::new(Database::new(Configuration::default()));
//! db.add_page("Template:hello", Namespace::TEMPLATE, Some("Hello, {{{1}}}!"), None, None);
//!
//! let mut renderer = Renderer::new(Arc::clone(&db))?;
//! renderer.start_page("Example")?;
//! assert_eq!(renderer.expand("{{hello|world}}")?, "Hello, world!");
//! ```

pub mod config;
pub mod db;
pub mod renderer;
pub mod title;

mod common;
mod date;
mod lua;

pub use renderer::{Error, Renderer};
