//! Benchmarks for rule parsing and extraction.
//!
//! Run with: cargo bench --bench rule_pipeline

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};

use bookscout_engine::rule::{parse_pipeline, ContentKind};
use bookscout_engine::{Context, Node, RuleDispatcher};

const SEARCH_HTML: &str = include_str!("../tests/fixtures/search.html");
const TOC_HTML: &str = include_str!("../tests/fixtures/toc.html");
const SEARCH_JSON: &str = include_str!("../tests/fixtures/search.json");

const RULES: &[&str] = &[
    "class.book-item",
    "class.name@text",
    r"class.author@text##^Author:\s*",
    "@css:.book-item@title&&.cover@href##^https?://[^/]+",
    r#"@put:{"bid":"class.cover@href##\\D"}class.name@text<js>result.trim()</js>"#,
    "/book/{{@get:{bid}}}/index_{{ page + 1 }}.html",
];

// ============================================================================
// Parsing
// ============================================================================

fn bench_parse_pipeline(c: &mut Criterion) {
    c.bench_function("parse_pipeline", |b| {
        b.iter(|| {
            for rule in RULES {
                black_box(parse_pipeline(black_box(rule), ContentKind::Markup));
            }
        });
    });
}

fn bench_parse_document(c: &mut Criterion) {
    c.bench_function("parse_html_document", |b| {
        b.iter(|| black_box(Node::parse(black_box(SEARCH_HTML))));
    });
}

// ============================================================================
// Extraction
// ============================================================================

fn bench_search_rows(c: &mut Criterion) {
    c.bench_function("search_rows_html", |b| {
        b.iter(|| {
            let mut ctx = Context::new().with_base_url("https://www.example.com/search");
            let mut dispatcher = RuleDispatcher::new(&mut ctx, Node::parse(SEARCH_HTML));
            for row in dispatcher.get_elements("class.book-item") {
                dispatcher.set_content(row);
                black_box(dispatcher.get_string("class.name@text"));
                black_box(dispatcher.get_string(r"class.author@text##^Author:\s*"));
                black_box(dispatcher.get_url("class.name@tag.a@href"));
            }
        });
    });
}

fn bench_chapter_list(c: &mut Criterion) {
    c.bench_function("chapter_list_html", |b| {
        b.iter(|| {
            let mut ctx = Context::new().with_base_url("https://www.example.com/book/202/");
            let mut dispatcher = RuleDispatcher::new(&mut ctx, Node::parse(TOC_HTML));
            black_box(dispatcher.get_string_list("tag.dd[2:]@tag.a@text"));
            black_box(dispatcher.get_url_list("tag.dd[2:]@tag.a@href"));
        });
    });
}

fn bench_json_rows(c: &mut Criterion) {
    c.bench_function("search_rows_json", |b| {
        b.iter(|| {
            let mut ctx = Context::new().with_base_url("https://api.example.com/search");
            let mut dispatcher = RuleDispatcher::new(&mut ctx, Node::parse(SEARCH_JSON));
            for row in dispatcher.get_elements("$.data.books[*]") {
                dispatcher.set_content(row);
                black_box(dispatcher.get_string("$.title"));
                black_box(dispatcher.get_string_list("$.tags"));
                black_box(dispatcher.get_url("/book/{$.id}/"));
            }
        });
    });
}

fn bench_script_stage(c: &mut Criterion) {
    let mut ctx = Context::new();
    let mut dispatcher = RuleDispatcher::new(&mut ctx, Node::parse(SEARCH_HTML));
    c.bench_function("script_stage", |b| {
        b.iter(|| black_box(dispatcher.get_string("class.name.0@text<js>result.to_upper()</js>")));
    });
}

criterion_group!(parsing, bench_parse_pipeline, bench_parse_document);
criterion_group!(
    extraction,
    bench_search_rows,
    bench_chapter_list,
    bench_json_rows,
    bench_script_stage
);
criterion_main!(parsing, extraction);
