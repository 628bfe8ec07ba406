//! Command-line interface for bookscout.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::book::{book_info, content, toc};
use crate::error::Result;
use crate::http::{HttpTransport, Transport};
use crate::search::search;
use crate::source::{find_source, load_sources};
use bookscout_engine::{extract_string, extract_string_list, Context, Node};

/// Bookscout - search and read books through community book sources.
#[derive(Debug, Parser)]
#[command(name = "bookscout")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Search every enabled source for a keyword.
    Search {
        /// Book-source JSON file (one source or an array)
        sources: PathBuf,

        /// Title or author to look for
        keyword: String,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the details of a book.
    Info {
        /// Book-source JSON file
        sources: PathBuf,

        /// Book page URL
        book_url: String,

        /// Source name or URL (default: the source serving the URL's host)
        #[arg(short, long)]
        source: Option<String>,

        /// Print the details as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the chapters of a book.
    Toc {
        /// Book-source JSON file
        sources: PathBuf,

        /// Book page URL
        book_url: String,

        /// Source name or URL (default: the source serving the URL's host)
        #[arg(short, long)]
        source: Option<String>,

        /// Print chapters as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the text of a chapter.
    Content {
        /// Book-source JSON file
        sources: PathBuf,

        /// Chapter page URL
        chapter_url: String,

        /// Source name or URL (default: the source serving the URL's host)
        #[arg(short, long)]
        source: Option<String>,
    },

    /// Evaluate a rule against a local document.
    Eval {
        /// Rule string
        rule: String,

        /// HTML or JSON document (default: stdin)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// URL the document was fetched from, for resolving links
        #[arg(short, long)]
        base_url: Option<String>,

        /// Print every value, one per line
        #[arg(short, long)]
        list: bool,
    },
}

/// Run the CLI.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new()?);
    let mut stdout = std::io::stdout().lock();
    execute(cli, transport, &mut stdout).await
}

/// Execute a parsed command, writing its output to `out`.
pub async fn execute(cli: Cli, transport: Arc<dyn Transport>, out: &mut impl Write) -> Result<()> {
    match cli.command {
        Commands::Search {
            sources,
            keyword,
            json,
        } => {
            let sources = load_sources(&sources)?;
            let books = search(transport, &sources, &keyword).await;
            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&books)?)?;
            } else {
                for book in &books {
                    writeln!(
                        out,
                        "{}\t{}\t{}\t[{}]",
                        book.name, book.author, book.book_url, book.origin_name
                    )?;
                }
            }
        }
        Commands::Info {
            sources,
            book_url,
            source,
            json,
        } => {
            let sources = load_sources(&sources)?;
            let source = find_source(&sources, source.as_deref(), &book_url)?;
            let detail = book_info(transport.as_ref(), source, &book_url).await?;
            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&detail)?)?;
            } else {
                writeln!(out, "Name:    {}", detail.name)?;
                writeln!(out, "Author:  {}", detail.author)?;
                writeln!(out, "Kind:    {}", detail.kind)?;
                writeln!(out, "Latest:  {}", detail.last_chapter)?;
                writeln!(out, "Chapters: {}", detail.toc_url)?;
                if !detail.intro.is_empty() {
                    writeln!(out, "\n{}", detail.intro)?;
                }
            }
        }
        Commands::Toc {
            sources,
            book_url,
            source,
            json,
        } => {
            let sources = load_sources(&sources)?;
            let source = find_source(&sources, source.as_deref(), &book_url)?;
            let detail = book_info(transport.as_ref(), source, &book_url).await?;
            let chapters = toc(transport.as_ref(), source, &detail.toc_url).await?;
            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&chapters)?)?;
            } else {
                for chapter in &chapters {
                    writeln!(out, "{}\t{}\t{}", chapter.index, chapter.title, chapter.url)?;
                }
            }
        }
        Commands::Content {
            sources,
            chapter_url,
            source,
        } => {
            let sources = load_sources(&sources)?;
            let source = find_source(&sources, source.as_deref(), &chapter_url)?;
            let text = content(transport.as_ref(), source, &chapter_url, None).await?;
            writeln!(out, "{text}")?;
        }
        Commands::Eval {
            rule,
            file,
            base_url,
            list,
        } => eval_command(&rule, file.as_deref(), base_url.as_deref(), list, out)?,
    }
    Ok(())
}

/// Execute the eval command.
fn eval_command(
    rule: &str,
    file: Option<&Path>,
    base_url: Option<&str>,
    list: bool,
    out: &mut impl Write,
) -> Result<()> {
    let document = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            text
        }
    };

    let mut context = Context::new().with_base_url(base_url.unwrap_or_default());
    let content = Node::parse(&document);
    if list {
        for value in extract_string_list(rule, &mut context, content).unwrap_or_default() {
            writeln!(out, "{value}")?;
        }
    } else if let Some(value) = extract_string(rule, &mut context, content) {
        writeln!(out, "{value}")?;
    } else {
        tracing::info!(rule, "Rule extracted nothing");
    }
    Ok(())
}
