//! Markdown → PDF.
//!
//! Rendering happens in three passes:
//!
//! 1. [`parse_blocks`] walks the `pulldown-cmark` event stream and flattens it
//!    into a list of [`Block`]s (headings, paragraphs, list items, code…).
//!    Inline emphasis is dropped; only the text survives.
//! 2. [`layout`] word-wraps each block against the page width and paginates
//!    onto A4, collecting an outline entry for every heading at or above the
//!    configured TOC depth.
//! 3. [`PdfRenderer`] turns the laid-out pages into `printpdf` operations
//!    using the built-in Helvetica/Courier faces and attaches the outline as
//!    PDF bookmarks.
//!
//! The built-in PDF fonts only cover the WinAnsi character set. Text is
//! passed through [`to_winansi`] first: typographic punctuation is mapped to
//! ASCII and anything outside Latin-1 becomes `?`.

use crate::config::PipelineConfig;
use crate::error::{PolywordError, Result};
use printpdf::{
    BuiltinFont, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, Point, Pt, TextItem,
};
use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use std::path::Path;
use tracing::{debug, warn};

const PT_PER_MM: f32 = 2.834_646;

/// Render markdown into a PDF file on local disk.
#[cfg_attr(any(test, feature = "test-export-mocks"), mockall::automock)]
pub trait MarkdownRenderer: Send + Sync {
    fn render_to_file(&self, markdown: &str, path: &Path) -> Result<()>;
}

// ── Pass 1: blocks ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    Heading(u8),
    Paragraph,
    /// `marker` is empty for continuation paragraphs inside an item.
    ListItem { depth: usize, marker: String },
    Code,
    Quote,
    Rule,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub text: String,
}

#[derive(Default)]
struct BlockCollector {
    blocks: Vec<Block>,
    buffer: String,
    heading: Option<u8>,
    in_code: bool,
    quote_depth: usize,
    /// Next ordinal per open list; `None` for bullet lists.
    lists: Vec<Option<u64>>,
    pending_marker: Option<String>,
}

impl BlockCollector {
    fn flush(&mut self) {
        let text = std::mem::take(&mut self.buffer);
        let text = if self.in_code {
            text.trim_end_matches('\n').to_string()
        } else {
            text.split_whitespace().collect::<Vec<_>>().join(" ")
        };
        if text.is_empty() && self.pending_marker.is_none() {
            return;
        }

        let kind = if let Some(level) = self.heading {
            BlockKind::Heading(level)
        } else if self.in_code {
            BlockKind::Code
        } else if !self.lists.is_empty() {
            BlockKind::ListItem {
                depth: self.lists.len(),
                marker: self.pending_marker.take().unwrap_or_default(),
            }
        } else if self.quote_depth > 0 {
            BlockKind::Quote
        } else {
            BlockKind::Paragraph
        };
        self.blocks.push(Block { kind, text });
    }

    fn start_item(&mut self) {
        self.flush();
        let marker = match self.lists.last_mut() {
            Some(Some(n)) => {
                let m = format!("{n}.");
                *n += 1;
                m
            }
            _ => "-".to_string(),
        };
        self.pending_marker = Some(marker);
    }
}

/// Flatten markdown into renderable blocks.
pub fn parse_blocks(markdown: &str) -> Vec<Block> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut c = BlockCollector::default();
    for event in Parser::new_ext(markdown, options) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                c.flush();
                c.heading = Some(level as u8);
            }
            Event::End(TagEnd::Heading(_)) => {
                c.flush();
                c.heading = None;
            }
            Event::Start(Tag::Paragraph) => {
                // A paragraph opening inside an item belongs to it.
                if c.pending_marker.is_none() {
                    c.flush();
                }
            }
            Event::End(TagEnd::Paragraph) => c.flush(),
            Event::Start(Tag::List(start)) => {
                c.flush();
                c.lists.push(start);
            }
            Event::End(TagEnd::List(_)) => {
                c.flush();
                c.lists.pop();
            }
            Event::Start(Tag::Item) => c.start_item(),
            Event::End(TagEnd::Item) => c.flush(),
            Event::Start(Tag::CodeBlock(_)) => {
                c.flush();
                c.in_code = true;
            }
            Event::End(TagEnd::CodeBlock) => {
                c.flush();
                c.in_code = false;
            }
            Event::Start(Tag::BlockQuote { .. }) => {
                c.flush();
                c.quote_depth += 1;
            }
            Event::End(TagEnd::BlockQuote { .. }) => {
                c.flush();
                c.quote_depth = c.quote_depth.saturating_sub(1);
            }
            Event::End(TagEnd::TableCell) => c.buffer.push_str(" | "),
            Event::End(TagEnd::TableHead | TagEnd::TableRow) => {
                let row = c.buffer.trim_end().trim_end_matches('|').to_string();
                c.buffer = row;
                c.flush();
            }
            Event::Rule => {
                c.flush();
                c.blocks.push(Block {
                    kind: BlockKind::Rule,
                    text: String::new(),
                });
            }
            Event::Text(t) | Event::Code(t) | Event::Html(t) | Event::InlineHtml(t) => {
                c.buffer.push_str(&t)
            }
            Event::TaskListMarker(done) => c.buffer.push_str(if done { "[x] " } else { "[ ] " }),
            Event::SoftBreak => c.buffer.push(' '),
            Event::HardBreak => c.buffer.push('\n'),
            _ => {}
        }
    }
    c.flush();
    c.blocks
}

// ── Pass 2: layout ───────────────────────────────────────────────────────────

/// Page geometry in millimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLayout {
    pub width_mm: f32,
    pub height_mm: f32,
    pub margin_mm: f32,
}

impl Default for PageLayout {
    /// A4 portrait, 20 mm margins.
    fn default() -> Self {
        Self {
            width_mm: 210.0,
            height_mm: 297.0,
            margin_mm: 20.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    Regular,
    Bold,
    Italic,
    Mono,
}

impl Face {
    fn builtin(self) -> BuiltinFont {
        match self {
            Face::Regular => BuiltinFont::Helvetica,
            Face::Bold => BuiltinFont::HelveticaBold,
            Face::Italic => BuiltinFont::HelveticaOblique,
            Face::Mono => BuiltinFont::Courier,
        }
    }

    /// Rough average glyph advance as a fraction of the font size.
    fn advance(self) -> f32 {
        match self {
            Face::Mono => 0.6,
            Face::Bold => 0.56,
            _ => 0.5,
        }
    }
}

struct Style {
    face: Face,
    size_pt: f32,
    space_before_mm: f32,
    indent_mm: f32,
}

fn style_for(kind: &BlockKind) -> Style {
    match kind {
        BlockKind::Heading(level) => Style {
            face: Face::Bold,
            size_pt: match level {
                1 => 20.0,
                2 => 16.0,
                3 => 13.0,
                _ => 11.5,
            },
            space_before_mm: 6.0,
            indent_mm: 0.0,
        },
        BlockKind::ListItem { depth, .. } => Style {
            face: Face::Regular,
            size_pt: 11.0,
            space_before_mm: 1.0,
            indent_mm: 6.0 * *depth as f32,
        },
        BlockKind::Code => Style {
            face: Face::Mono,
            size_pt: 9.5,
            space_before_mm: 3.0,
            indent_mm: 4.0,
        },
        BlockKind::Quote => Style {
            face: Face::Italic,
            size_pt: 11.0,
            space_before_mm: 3.0,
            indent_mm: 8.0,
        },
        BlockKind::Paragraph | BlockKind::Rule => Style {
            face: Face::Regular,
            size_pt: 11.0,
            space_before_mm: 3.0,
            indent_mm: 0.0,
        },
    }
}

/// One line of text at an absolute position (origin bottom-left).
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub text: String,
    pub face: Face,
    pub size_pt: f32,
    pub x_mm: f32,
    pub y_mm: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaidOutPage {
    pub lines: Vec<PlacedLine>,
}

/// A heading that gets a PDF bookmark. `page` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineEntry {
    pub title: String,
    pub level: u8,
    pub page: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaidOutDocument {
    pub pages: Vec<LaidOutPage>,
    pub outline: Vec<OutlineEntry>,
}

/// Greedy word wrap to at most `max_chars` per line. Words longer than a
/// line are split.
pub fn wrap_words(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        let needed = if current_len == 0 { word.len() } else { current_len + 1 + word.len() };
        if needed > max_chars && current_len > 0 {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.extend(word.iter());
        current_len += word.len();
    }
    if current_len > 0 {
        lines.push(current);
    }
    lines
}

/// Hard-wrap preformatted text, keeping its line structure.
fn wrap_preformatted(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    text.lines()
        .flat_map(|line| {
            let chars: Vec<char> = line.chars().collect();
            if chars.is_empty() {
                vec![String::new()]
            } else {
                chars.chunks(max_chars).map(|c| c.iter().collect()).collect()
            }
        })
        .collect()
}

struct Cursor<'a> {
    geometry: &'a PageLayout,
    doc: LaidOutDocument,
    y_mm: f32,
}

impl<'a> Cursor<'a> {
    fn new(geometry: &'a PageLayout) -> Self {
        Self {
            geometry,
            doc: LaidOutDocument {
                pages: vec![LaidOutPage::default()],
                outline: Vec::new(),
            },
            y_mm: geometry.height_mm - geometry.margin_mm,
        }
    }

    fn top(&self) -> f32 {
        self.geometry.height_mm - self.geometry.margin_mm
    }

    fn new_page(&mut self) {
        self.doc.pages.push(LaidOutPage::default());
        self.y_mm = self.top();
    }

    fn page_number(&self) -> usize {
        self.doc.pages.len()
    }

    fn space(&mut self, mm: f32) {
        // Vertical space is swallowed at the top of a page.
        if self.y_mm < self.top() {
            self.y_mm -= mm;
        }
    }

    fn place(&mut self, text: String, face: Face, size_pt: f32, x_mm: f32) {
        let leading_mm = size_pt * 1.35 / PT_PER_MM;
        if self.y_mm - leading_mm < self.geometry.margin_mm {
            self.new_page();
        }
        self.y_mm -= leading_mm;
        let line = PlacedLine {
            text,
            face,
            size_pt,
            x_mm,
            y_mm: self.y_mm,
        };
        if let Some(page) = self.doc.pages.last_mut() {
            page.lines.push(line);
        }
    }

    /// Put `text` on the same baseline as the last placed line.
    fn annotate(&mut self, text: &str, face: Face, size_pt: f32, x_mm: f32) {
        let y_mm = self.y_mm;
        if let Some(page) = self.doc.pages.last_mut() {
            page.lines.push(PlacedLine {
                text: text.to_string(),
                face,
                size_pt,
                x_mm,
                y_mm,
            });
        }
    }
}

/// Wrap and paginate `blocks`. Headings with `level <= toc_depth` are
/// recorded in the outline.
pub fn layout(blocks: &[Block], geometry: &PageLayout, toc_depth: u8) -> LaidOutDocument {
    let mut cursor = Cursor::new(geometry);
    let usable_mm = geometry.width_mm - 2.0 * geometry.margin_mm;

    for block in blocks {
        let style = style_for(&block.kind);
        cursor.space(style.space_before_mm);

        if block.kind == BlockKind::Rule {
            continue;
        }

        let (marker, text_indent_mm) = match &block.kind {
            BlockKind::ListItem { marker, .. } => (marker.as_str(), 5.0),
            _ => ("", 0.0),
        };
        let x_mm = geometry.margin_mm + style.indent_mm;
        let width_pt = (usable_mm - style.indent_mm - text_indent_mm).max(10.0) * PT_PER_MM;
        let max_chars = (width_pt / (style.size_pt * style.face.advance())) as usize;

        let text = to_winansi(&block.text);
        let lines = if block.kind == BlockKind::Code {
            wrap_preformatted(&text, max_chars)
        } else {
            wrap_words(&text, max_chars)
        };

        if let BlockKind::Heading(level) = block.kind {
            // Keep the bookmark on the page the heading actually lands on.
            let leading_mm = style.size_pt * 1.35 / PT_PER_MM;
            if cursor.y_mm - leading_mm < geometry.margin_mm {
                cursor.new_page();
            }
            if level <= toc_depth {
                cursor.doc.outline.push(OutlineEntry {
                    title: text.clone(),
                    level,
                    page: cursor.page_number(),
                });
            }
        }

        if lines.is_empty() && !marker.is_empty() {
            // Empty list item: the marker alone.
            cursor.place(marker.to_string(), style.face, style.size_pt, x_mm);
            continue;
        }

        for (i, line) in lines.into_iter().enumerate() {
            cursor.place(line, style.face, style.size_pt, x_mm + text_indent_mm);
            if i == 0 && !marker.is_empty() {
                cursor.annotate(marker, style.face, style.size_pt, x_mm);
            }
        }
    }

    cursor.doc
}

/// Replace characters the built-in PDF fonts cannot show.
pub fn to_winansi(text: &str) -> String {
    text.chars()
        .map(|ch| match ch {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => "'".to_string(),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => "\"".to_string(),
            '\u{2013}' | '\u{2014}' | '\u{2212}' => "-".to_string(),
            '\u{2026}' => "...".to_string(),
            '\u{2022}' | '\u{25CF}' => "*".to_string(),
            '\u{00A0}' | '\u{2009}' | '\u{202F}' => " ".to_string(),
            '\t' => "    ".to_string(),
            c if (c as u32) < 0x20 => String::new(),
            c if (c as u32) <= 0xFF => c.to_string(),
            _ => "?".to_string(),
        })
        .collect()
}

// ── Pass 3: PDF ──────────────────────────────────────────────────────────────

/// [`MarkdownRenderer`] producing an A4 PDF with bookmarks and metadata.
#[derive(Debug, Clone)]
pub struct PdfRenderer {
    title: String,
    author: String,
    toc_depth: u8,
    geometry: PageLayout,
}

impl PdfRenderer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            title: config.pdf_title.clone(),
            author: config.pdf_author.clone(),
            toc_depth: config.toc_depth,
            geometry: PageLayout::default(),
        }
    }

    pub fn with_layout(mut self, geometry: PageLayout) -> Self {
        self.geometry = geometry;
        self
    }

    /// Render `markdown` to PDF bytes.
    pub fn render_bytes(&self, markdown: &str) -> Vec<u8> {
        let blocks = parse_blocks(markdown);
        let laid_out = layout(&blocks, &self.geometry, self.toc_depth);
        debug!(
            "Laid out {} blocks on {} pages ({} bookmarks)",
            blocks.len(),
            laid_out.pages.len(),
            laid_out.outline.len()
        );

        let mut doc = PdfDocument::new(&self.title);
        doc.metadata.info.document_title = self.title.clone();
        doc.metadata.info.author = self.author.clone();

        let pages: Vec<PdfPage> = laid_out
            .pages
            .iter()
            .map(|page| {
                let mut ops = Vec::with_capacity(page.lines.len() * 5);
                for line in &page.lines {
                    let font = line.face.builtin();
                    ops.push(Op::StartTextSection);
                    ops.push(Op::SetTextCursor {
                        pos: Point::new(Mm(line.x_mm), Mm(line.y_mm)),
                    });
                    ops.push(Op::SetFontSizeBuiltinFont {
                        size: Pt(line.size_pt),
                        font,
                    });
                    ops.push(Op::WriteTextBuiltinFont {
                        items: vec![TextItem::Text(line.text.clone())],
                        font,
                    });
                    ops.push(Op::EndTextSection);
                }
                PdfPage::new(Mm(self.geometry.width_mm), Mm(self.geometry.height_mm), ops)
            })
            .collect();

        doc.with_pages(pages);
        for entry in &laid_out.outline {
            doc.add_bookmark(&entry.title, entry.page);
        }

        let mut warnings = Vec::new();
        let bytes = doc.save(&PdfSaveOptions::default(), &mut warnings);
        if !warnings.is_empty() {
            warn!("PDF writer reported {} warnings", warnings.len());
        }
        bytes
    }
}

impl MarkdownRenderer for PdfRenderer {
    fn render_to_file(&self, markdown: &str, path: &Path) -> Result<()> {
        let bytes = self.render_bytes(markdown);
        if bytes.is_empty() {
            return Err(PolywordError::Render("PDF writer produced no output".into()));
        }
        std::fs::write(path, &bytes).map_err(|e| PolywordError::io(path, e))?;
        debug!("Wrote {} byte PDF to {}", bytes.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# Report\n\nIntro paragraph with *emphasis*.\n\n## Findings\n\n- first\n- second\n\n1. one\n2. two\n\n### Detail\n\n```\nlet x = 1;\n```\n\n> quoted\n\n---\n";

    #[test]
    fn parses_block_structure() {
        let blocks = parse_blocks(SAMPLE);
        let kinds: Vec<&BlockKind> = blocks.iter().map(|b| &b.kind).collect();
        assert_eq!(
            kinds,
            vec![
                &BlockKind::Heading(1),
                &BlockKind::Paragraph,
                &BlockKind::Heading(2),
                &BlockKind::ListItem { depth: 1, marker: "-".into() },
                &BlockKind::ListItem { depth: 1, marker: "-".into() },
                &BlockKind::ListItem { depth: 1, marker: "1.".into() },
                &BlockKind::ListItem { depth: 1, marker: "2.".into() },
                &BlockKind::Heading(3),
                &BlockKind::Code,
                &BlockKind::Quote,
                &BlockKind::Rule,
            ]
        );
        assert_eq!(blocks[1].text, "Intro paragraph with emphasis.");
        assert_eq!(blocks[8].text, "let x = 1;");
    }

    #[test]
    fn ordered_lists_respect_start_number() {
        let blocks = parse_blocks("3. c\n4. d\n");
        assert_eq!(blocks[0].kind, BlockKind::ListItem { depth: 1, marker: "3.".into() });
        assert_eq!(blocks[1].kind, BlockKind::ListItem { depth: 1, marker: "4.".into() });
    }

    #[test]
    fn outline_stops_at_toc_depth() {
        let doc = layout(&parse_blocks(SAMPLE), &PageLayout::default(), 2);
        let titles: Vec<(&str, u8)> = doc
            .outline
            .iter()
            .map(|e| (e.title.as_str(), e.level))
            .collect();
        assert_eq!(titles, vec![("Report", 1), ("Findings", 2)]);
        assert!(doc.outline.iter().all(|e| e.page == 1));
    }

    #[test]
    fn long_documents_paginate() {
        let paragraph = "lorem ipsum dolor sit amet ".repeat(40);
        let markdown: String = (0..40)
            .map(|i| format!("## Section {i}\n\n{paragraph}\n\n"))
            .collect();
        let geometry = PageLayout::default();
        let doc = layout(&parse_blocks(&markdown), &geometry, 2);

        assert!(doc.pages.len() > 3, "only {} pages", doc.pages.len());
        for page in &doc.pages {
            for line in &page.lines {
                assert!(line.y_mm >= geometry.margin_mm - 0.01, "line below margin: {line:?}");
            }
        }
        let last = doc.outline.last().unwrap();
        assert_eq!(last.title, "Section 39");
        assert!(last.page > 1);
        // Bookmarks never point backwards.
        assert!(doc.outline.windows(2).all(|w| w[0].page <= w[1].page));
    }

    #[test]
    fn wrap_respects_width_and_splits_long_words() {
        let lines = wrap_words("aaa bbb ccc dddddddddd", 7);
        assert_eq!(lines, vec!["aaa bbb", "ccc", "ddddddd", "ddd"]);
        assert!(wrap_words("   ", 10).is_empty());
    }

    #[test]
    fn winansi_mapping() {
        assert_eq!(to_winansi("“Héllo” – it’s…"), "\"Héllo\" - it's...");
        assert_eq!(to_winansi("日本"), "??");
    }

    #[test]
    fn renders_a_pdf_file() {
        let renderer = PdfRenderer::new(&PipelineConfig::default());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pdf");
        renderer.render_to_file(SAMPLE, &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"%PDF"), "not a PDF header");
    }

    #[test]
    fn empty_list_item_keeps_its_marker() {
        let blocks = parse_blocks("- \n- second\n");
        assert_eq!(blocks.len(), 2, "blocks: {blocks:?}");

        let doc = layout(&blocks, &PageLayout::default(), 2);
        let lines = &doc.pages[0].lines;
        let markers: Vec<&PlacedLine> = lines.iter().filter(|l| l.text == "-").collect();
        assert_eq!(markers.len(), 2);
        assert!(markers[0].y_mm > markers[1].y_mm);
        assert!(lines.iter().any(|l| l.text == "second"));
    }

    #[test]
    fn empty_markdown_still_renders_one_page() {
        let doc = layout(&parse_blocks(""), &PageLayout::default(), 2);
        assert_eq!(doc.pages.len(), 1);
        let bytes = PdfRenderer::new(&PipelineConfig::default()).render_bytes("");
        assert!(bytes.starts_with(b"%PDF"));
    }
}
