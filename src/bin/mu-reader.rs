use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use serde_json::{json, Value};

use mu_reader::locations::{build_index, DEFAULT_CHARS_PER_LOCATION};
use mu_reader::position::{self, locate};
use mu_reader::search::{scan, NeverCancel, ScanOutcome, SearchOptions, SearchSource};
use mu_reader::{
    Book, NavPoint, PageGeometry, Position, ReaderError, ReaderSettings, SectionLoader, Viewport,
};

fn main() -> ExitCode {
    match run(env::args().collect()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("error: {}", msg);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Vec<String>) -> Result<(), String> {
    let mut rest = args.into_iter().skip(1).collect::<Vec<_>>();
    let pretty = pop_flag(&mut rest, "--pretty");

    if rest.is_empty() || rest[0] == "--help" || rest[0] == "-h" {
        print_help();
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| err.to_string())?;

    let cmd = rest.remove(0);
    let output = match cmd.as_str() {
        "info" => {
            let path = first_arg(&rest, "info requires <epub_path>")?;
            let book = open(&path)?;
            json!({
                "epub": path,
                "metadata": book.metadata(),
                "sections": book.sections().len(),
                "toc_entries": book.navigation().toc_count(),
            })
        }
        "toc" => {
            let flat = pop_flag(&mut rest, "--flat");
            let path = first_arg(&rest, "toc requires <epub_path>")?;
            let book = open(&path)?;
            let toc = if flat {
                Value::Array(
                    book.navigation()
                        .toc_flat()
                        .into_iter()
                        .map(|(depth, point)| {
                            json!({ "depth": depth, "label": point.label, "href": point.href })
                        })
                        .collect(),
                )
            } else {
                json!(book.navigation().toc)
            };
            json!({ "epub": path, "toc": toc, "chapters": toc_sections(&book, &book.navigation().toc) })
        }
        "search" => {
            let max = pop_value(&mut rest, "--max")?
                .map(|raw| raw.parse::<usize>().map_err(|_| format!("invalid --max '{}'", raw)))
                .transpose()?;
            let path = first_arg(&rest, "search requires <epub_path> <query>")?;
            let query = rest.get(1).cloned().ok_or("search requires <query>")?;
            let book = Arc::new(open(&path)?);
            let mut options = SearchOptions::default();
            if let Some(max) = max {
                options.max_results = max;
            }
            let source = SearchSource {
                loader: Arc::clone(&book) as Arc<dyn SectionLoader>,
                resident: vec![None; book.sections().len()],
                labels: book
                    .sections()
                    .iter()
                    .map(|section| book.navigation().chapter_label(&section.href))
                    .collect(),
            };
            match runtime.block_on(scan(&source, query.trim(), &options, &NeverCancel)) {
                ScanOutcome::Completed(results) => json!({
                    "epub": path,
                    "query": query,
                    "results": results.iter().map(|r| json!({
                        "position": r.position.to_string(),
                        "chapter": r.chapter_label,
                        "excerpt": r.excerpt,
                    })).collect::<Vec<_>>(),
                }),
                ScanOutcome::Cancelled => return Err("search cancelled".to_string()),
                ScanOutcome::Unreadable(msg) => return Err(msg),
            }
        }
        "locate" => {
            let path = first_arg(&rest, "locate requires <epub_path> <position>")?;
            let locator = rest.get(1).cloned().ok_or("locate requires <position>")?;
            let target: Position = locator.parse().map_err(|err| format!("{}", err))?;
            let book = Arc::new(open(&path)?);
            let section = book.read_section(target.spine).map_err(display_err)?;
            let geometry = PageGeometry::compute(Viewport::default(), &ReaderSettings::default());
            let index = runtime.block_on(build_index(
                Arc::clone(&book) as Arc<dyn SectionLoader>,
                DEFAULT_CHARS_PER_LOCATION,
            ));
            let within = target.char_offset(&section);
            let location = locate(&target, &section, &geometry);
            json!({
                "epub": path,
                "position": target.to_string(),
                "resolves": within.is_some(),
                "section": target.spine,
                "chapter": book.navigation().chapter_label(&section.href),
                "page": location.page,
                "pages": geometry.page_count(section.char_len),
                "location": index.location_of(target.spine, within.unwrap_or(0)),
                "locations": index.location_count(),
                "percentage": position::percentage(&target, Some(&index), Some(&section), 0.0),
            })
        }
        "section-text" => {
            let path = first_arg(&rest, "section-text requires <epub_path> <index>")?;
            let raw = rest.get(1).cloned().ok_or("section-text requires <index>")?;
            let index = raw
                .parse::<usize>()
                .map_err(|_| format!("invalid section index '{}'", raw))?;
            let book = open(&path)?;
            let section = book.read_section(index).map_err(display_err)?;
            json!({
                "epub": path,
                "index": index,
                "href": section.href,
                "chars": section.char_len,
                "text": section.text,
            })
        }
        other => return Err(format!("unknown command '{}'; try --help", other)),
    };

    let rendered = if pretty {
        serde_json::to_string_pretty(&output)
    } else {
        serde_json::to_string(&output)
    };
    println!("{}", rendered.map_err(|err| err.to_string())?);
    Ok(())
}

fn open(path: &str) -> Result<Book, String> {
    let bytes = std::fs::read(path).map_err(|err| format!("{}: {}", path, err))?;
    Book::from_bytes(bytes).map_err(display_err)
}

/// Spine index targeted by each top-level entry
fn toc_sections(book: &Book, toc: &[NavPoint]) -> Value {
    Value::Array(
        toc.iter()
            .map(|point| json!({ "label": point.label, "section": book.section_index(&point.href) }))
            .collect(),
    )
}

fn display_err(err: ReaderError) -> String {
    err.to_string()
}

fn first_arg(args: &[String], msg: &str) -> Result<String, String> {
    args.first().cloned().ok_or_else(|| msg.to_string())
}

fn pop_flag(args: &mut Vec<String>, flag: &str) -> bool {
    if let Some(pos) = args.iter().position(|a| a == flag) {
        args.remove(pos);
        true
    } else {
        false
    }
}

fn pop_value(args: &mut Vec<String>, flag: &str) -> Result<Option<String>, String> {
    let Some(pos) = args.iter().position(|a| a == flag) else {
        return Ok(None);
    };
    if pos + 1 >= args.len() {
        return Err(format!("{} requires a value", flag));
    }
    let value = args.remove(pos + 1);
    args.remove(pos);
    Ok(Some(value))
}

fn print_help() {
    let help = r#"mu-reader - inspect EPUB files the way the reader sees them

USAGE:
  mu-reader [--pretty] <command> [args...]

COMMANDS:
  info <epub_path>
  toc <epub_path> [--flat]
  search <epub_path> <query> [--max <n>]
  locate <epub_path> <position>
  section-text <epub_path> <index>

NOTES:
  - Output is JSON.
  - Positions use the epubcfi(...) form, e.g. epubcfi(/6/4!/4/2/1:12).
  - `locate` paginates with the default viewport and settings.
"#;
    println!("{}", help);
}
