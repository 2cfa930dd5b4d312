// ABOUTME: HTML <-> Markdown body conversion
// ABOUTME: Thin wrappers so adapters never depend on a converter crate directly

use pulldown_cmark::{html, Options, Parser};

pub fn html_to_markdown(html: &str) -> String {
    html2md::parse_html(html).trim().to_string()
}

pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}
