use rayon::prelude::*;
use std::{fs::File, io::BufReader, sync::Arc, time::Instant};
use wikiexpand::{
    Renderer,
    config::{Configuration, Namespace},
    db::Database,
};

fn usage<T>(err: &'static str) -> anyhow::Result<T> {
    let exe = std::env::args().next().unwrap_or_default();
    println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    println!("Usage: {exe} [options] <pages.jsonl>\n");
    println!("or, use environment variables:");
    println!("    WIKIEXPAND_PAGES\n");
    println!("Options:");
    println!("    --config <file>: Site configuration JSON (default: English Wiktionary)");
    println!("    --title <title>: Expand the page with this title");
    println!("    --text <text>:   Expand this Wikitext (on the page given by --title)");
    println!("    --all:           Expand every page in the main namespace\n");
    Err(anyhow::Error::msg(err))
}

fn free_arg(
    args: &mut pico_args::Arguments,
    key: &str,
    err: &'static str,
) -> anyhow::Result<String> {
    if let Some(arg) = args.opt_free_from_str::<String>()? {
        Ok(arg)
    } else if let Ok(arg) = std::env::var(key) {
        Ok(arg)
    } else {
        usage(err)
    }
}

/// Converts a renderer error into a plain message.
fn render_error(err: wikiexpand::Error) -> anyhow::Error {
    anyhow::Error::msg(format!("{err:#}"))
}

/// Expands every page in the main namespace, one renderer per worker thread.
fn expand_all(db: &Arc<Database>) {
    let titles = db.titles(Namespace::MAIN);
    let time = Instant::now();
    let results = titles
        .par_iter()
        .map_init(
            || Renderer::new(Arc::clone(db)),
            |renderer, title| {
                let result = match renderer {
                    Ok(renderer) => renderer
                        .expand_page(title)
                        .map(Option::unwrap_or_default)
                        .map_err(|err| err.to_string()),
                    Err(err) => Err(err.to_string()),
                };
                (title, result)
            },
        )
        .collect::<Vec<_>>();

    let mut failed = 0;
    for (title, result) in results {
        match result {
            Ok(text) => println!("== {title} ==\n{text}\n"),
            Err(err) => {
                failed += 1;
                log::error!("{title}: {err}");
            }
        }
    }
    log::info!(
        "Expanded {} pages ({failed} failed) in {:.2?}",
        titles.len(),
        time.elapsed()
    );
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let mut args = pico_args::Arguments::from_env();
    let config = args.opt_value_from_str::<_, String>("--config")?;
    let title = args.opt_value_from_str::<_, String>("--title")?;
    let text = args.opt_value_from_str::<_, String>("--text")?;
    let all = args.contains("--all");
    let _ = args.contains("--");
    let pages_path = free_arg(&mut args, "WIKIEXPAND_PAGES", "Missing pages file argument")?;

    if !args.finish().is_empty() {
        return usage("Unknown extra arguments passed");
    }

    let config = match config {
        Some(path) => Configuration::from_file(path)?,
        None => Configuration::default(),
    };

    let time = Instant::now();
    let db = Arc::new(Database::new(config));
    let count = db.load_json_lines(BufReader::new(File::open(&pages_path)?))?;
    log::info!("Loaded {count} pages in {:.2?}", time.elapsed());

    if all {
        expand_all(&db);
        db.close();
        return Ok(());
    }

    let mut renderer = Renderer::new(Arc::clone(&db)).map_err(render_error)?;
    match (title, text) {
        (title, Some(text)) => {
            renderer
                .start_page(title.as_deref().unwrap_or_default())
                .map_err(render_error)?;
            println!("{}", renderer.expand(&text).map_err(render_error)?);
        }
        (Some(title), None) => match renderer.expand_page(&title).map_err(render_error)? {
            Some(text) => println!("{text}"),
            None => anyhow::bail!("page '{title}' does not exist"),
        },
        (None, None) => return usage("One of --title, --text, or --all is required"),
    }
    renderer.close();
    db.close();

    Ok(())
}
