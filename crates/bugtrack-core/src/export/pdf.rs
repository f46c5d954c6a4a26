//! PDF report export
//!
//! Layout and encoding are split: `layout` places every piece of text in page
//! coordinates, `render` writes those pages out with `pdf-writer`.
//!
//! Rows that would cross the bottom margin continue on a new page, which
//! repeats the header row but not the title.

use crate::Bug;
use crate::config::ExportConfig;
use pdf_writer::{Content, Finish, Name, Pdf, Rect, Ref, Str};
use std::fmt::Write as _;

pub const CONTENT_TYPE: &str = "application/pdf";
pub const FILENAME: &str = "bugs.pdf";

/// US Letter, in points
pub const PAGE_WIDTH: f32 = 612.0;
pub const PAGE_HEIGHT: f32 = 792.0;
pub const MARGIN: f32 = 50.0;
pub const TITLE: &str = "Bug Report";
pub const TITLE_SIZE: f32 = 18.0;
pub const FONT_SIZE: f32 = 10.0;
/// Distance from the title baseline to the header row
pub const HEADER_GAP: f32 = 40.0;
pub const ROW_HEIGHT: f32 = 20.0;
pub const COLUMN_WIDTHS: [f32; 6] = [40.0, 150.0, 80.0, 80.0, 100.0, 100.0];
pub const HEADERS: [&str; 6] = ["ID", "Title", "Status", "Priority", "Assigned To", "Created At"];

const HEADING_GRAY: f32 = 0.0;
const ROW_GRAY: f32 = 0.1;
const FONT_NAME: Name<'static> = Name(b"F1");

/// Rendering options
#[derive(Debug, Clone)]
pub struct PdfOptions {
    /// strftime format for the Created At column
    pub date_format: String,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self::from(&ExportConfig::default())
    }
}

impl From<&ExportConfig> for PdfOptions {
    fn from(config: &ExportConfig) -> Self {
        Self {
            date_format: config.date_format.clone(),
        }
    }
}

/// One piece of text at a fixed position
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub gray: f32,
    pub text: String,
}

/// Everything drawn on one page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    pub runs: Vec<TextRun>,
}

/// Baseline of the header row on the first page
pub fn first_header_y() -> f32 {
    PAGE_HEIGHT - MARGIN - HEADER_GAP
}

/// Baseline of the header row on continuation pages
pub fn continued_header_y() -> f32 {
    PAGE_HEIGHT - MARGIN
}

/// How many rows fit below a header at `header_y`
pub fn rows_below(header_y: f32) -> usize {
    ((header_y - MARGIN) / ROW_HEIGHT).floor() as usize
}

/// Left edge of column `index`
pub fn column_x(index: usize) -> f32 {
    MARGIN + COLUMN_WIDTHS[..index].iter().sum::<f32>()
}

/// Place the title, header rows and one row per bug onto pages
pub fn layout(bugs: &[Bug], options: &PdfOptions) -> Vec<PageLayout> {
    let mut first = PageLayout::default();
    first.runs.push(TextRun {
        x: MARGIN,
        y: PAGE_HEIGHT - MARGIN,
        size: TITLE_SIZE,
        gray: HEADING_GRAY,
        text: TITLE.to_string(),
    });

    let mut pages = vec![];
    let mut page = first;
    let mut header_y = first_header_y();
    push_row(&mut page, header_y, HEADERS.map(String::from), HEADING_GRAY);

    let mut slot = 0;
    for bug in bugs {
        if slot == rows_below(header_y) {
            pages.push(std::mem::take(&mut page));
            header_y = continued_header_y();
            push_row(&mut page, header_y, HEADERS.map(String::from), HEADING_GRAY);
            slot = 0;
        }
        slot += 1;
        let y = header_y - slot as f32 * ROW_HEIGHT;
        push_row(&mut page, y, row_cells(bug, options), ROW_GRAY);
    }

    pages.push(page);
    pages
}

fn row_cells(bug: &Bug, options: &PdfOptions) -> [String; 6] {
    [
        bug.id.to_string(),
        bug.title.clone(),
        bug.status.to_string(),
        bug.priority.to_string(),
        bug.assignee_name().to_string(),
        short_date(bug, options),
    ]
}

/// Created-at date in the configured format, ISO if that format is invalid
fn short_date(bug: &Bug, options: &PdfOptions) -> String {
    let mut out = String::new();
    if write!(out, "{}", bug.created_at.format(&options.date_format)).is_err() {
        out = bug.created_at.format("%Y-%m-%d").to_string();
    }
    out
}

fn push_row(page: &mut PageLayout, y: f32, cells: [String; 6], gray: f32) {
    for (index, text) in cells.into_iter().enumerate() {
        page.runs.push(TextRun {
            x: column_x(index),
            y,
            size: FONT_SIZE,
            gray,
            text,
        });
    }
}

/// Render bugs as a PDF document
pub fn render(bugs: &[Bug], options: &PdfOptions) -> Vec<u8> {
    let pages = layout(bugs, options);

    let catalog_id = Ref::new(1);
    let tree_id = Ref::new(2);
    let font_id = Ref::new(3);
    let page_ids: Vec<(Ref, Ref)> = (0..pages.len() as i32)
        .map(|i| (Ref::new(4 + 2 * i), Ref::new(5 + 2 * i)))
        .collect();

    let mut pdf = Pdf::new();
    pdf.catalog(catalog_id).pages(tree_id);
    pdf.pages(tree_id)
        .kids(page_ids.iter().map(|(page_id, _)| *page_id))
        .count(pages.len() as i32);

    for (layout, (page_id, content_id)) in pages.iter().zip(&page_ids) {
        let mut page = pdf.page(*page_id);
        page.media_box(Rect::new(0.0, 0.0, PAGE_WIDTH, PAGE_HEIGHT));
        page.parent(tree_id);
        page.contents(*content_id);
        page.resources().fonts().pair(FONT_NAME, font_id);
        page.finish();

        let mut content = Content::new();
        for run in &layout.runs {
            let text = encode_win_ansi(&run.text);
            content.begin_text();
            content.set_font(FONT_NAME, run.size);
            content.set_fill_gray(run.gray);
            content.next_line(run.x, run.y);
            content.show(Str(&text));
            content.end_text();
        }
        pdf.stream(*content_id, &content.finish());
    }

    pdf.type1_font(font_id)
        .base_font(Name(b"Helvetica"))
        .encoding_predefined(Name(b"WinAnsiEncoding"));

    pdf.finish()
}

/// Encode text for a standard Type 1 font. Line breaks become spaces and
/// anything outside Latin-1 becomes `?`.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\r' | '\n' | '\t' => b' ',
            ' '..='~' => c as u8,
            '\u{a0}'..='\u{ff}' => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Developer, Priority, Status};
    use chrono::{TimeZone, Utc};

    fn bugs(count: i64) -> Vec<Bug> {
        (1..=count)
            .map(|id| Bug {
                id,
                title: format!("Bug {id}"),
                description: String::new(),
                status: Status::Open,
                priority: Priority::Low,
                developer_id: (id == 1).then_some(1),
                due_date: None,
                created_at: Utc.with_ymd_and_hms(2026, 3, 7, 12, 0, 0).unwrap(),
                developer: (id == 1).then(|| Developer {
                    id: 1,
                    name: "Ada".into(),
                    email: "ada@x.com".into(),
                }),
            })
            .collect()
    }

    fn texts_at(page: &PageLayout, y: f32) -> Vec<&str> {
        page.runs
            .iter()
            .filter(|r| r.y == y)
            .map(|r| r.text.as_str())
            .collect()
    }

    #[test]
    fn test_empty_list_is_title_and_header() {
        let pages = layout(&[], &PdfOptions::default());
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].runs.len(), 1 + HEADERS.len());
        assert_eq!(pages[0].runs[0].text, TITLE);
        assert_eq!(pages[0].runs[0].size, TITLE_SIZE);
        assert_eq!(texts_at(&pages[0], first_header_y()), HEADERS);
    }

    #[test]
    fn test_rows_follow_header_at_fixed_height() {
        let pages = layout(&bugs(3), &PdfOptions::default());
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].runs.len(), 1 + 6 * 4);

        let first_row = texts_at(&pages[0], first_header_y() - ROW_HEIGHT);
        assert_eq!(first_row, ["1", "Bug 1", "OPEN", "LOW", "Ada", "3/7/2026"]);
        let third_row = texts_at(&pages[0], first_header_y() - 3.0 * ROW_HEIGHT);
        assert_eq!(third_row[4], "Unassigned");
    }

    #[test]
    fn test_columns_use_fixed_widths() {
        let xs: Vec<f32> = (0..6).map(column_x).collect();
        assert_eq!(xs, [50.0, 90.0, 240.0, 320.0, 400.0, 500.0]);
    }

    #[test]
    fn test_overflow_continues_on_new_page() {
        let per_first = rows_below(first_header_y());
        let total = per_first as i64 + 5;
        let pages = layout(&bugs(total), &PdfOptions::default());

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].runs.len(), 1 + 6 + 6 * per_first);
        assert_eq!(pages[1].runs.len(), 6 + 6 * 5);
        assert_eq!(texts_at(&pages[1], continued_header_y()), HEADERS);
        let last_y = first_header_y() - per_first as f32 * ROW_HEIGHT;
        assert!(last_y >= MARGIN);
        assert!(pages[1].runs.iter().all(|r| r.text != TITLE));
    }

    #[test]
    fn test_date_format_is_configurable() {
        let options = PdfOptions {
            date_format: "%Y-%m-%d".into(),
        };
        let pages = layout(&bugs(1), &options);
        assert!(pages[0].runs.iter().any(|r| r.text == "2026-03-07"));

        let broken = PdfOptions {
            date_format: "%Q".into(),
        };
        let pages = layout(&bugs(1), &broken);
        assert!(pages[0].runs.iter().any(|r| r.text == "2026-03-07"));
    }

    #[test]
    fn test_render_produces_pdf_bytes() {
        let bytes = render(&bugs(2), &PdfOptions::default());
        assert!(bytes.starts_with(b"%PDF-"));
        let contains = |needle: &[u8]| bytes.windows(needle.len()).any(|w| w == needle);
        assert!(contains(b"Bug Report"));
        assert!(contains(b"Helvetica"));
        assert!(contains(b"%%EOF"));
    }

    #[test]
    fn test_render_empty_list_is_one_page_with_headers() {
        let bytes = render(&[], &PdfOptions::default());
        let contains = |needle: &[u8]| bytes.windows(needle.len()).any(|w| w == needle);
        assert!(bytes.starts_with(b"%PDF-"));
        assert!(contains(b"/Count 1"));
        assert!(contains(b"(Bug Report)"));
        for header in HEADERS {
            assert!(contains(format!("({header})").as_bytes()), "missing {header}");
        }
        assert!(!contains(b"(Unassigned)"));
    }

    #[test]
    fn test_win_ansi_encoding() {
        assert_eq!(encode_win_ansi("Café\nok"), b"Caf\xe9 ok".to_vec());
        assert_eq!(encode_win_ansi("日本"), b"??".to_vec());
    }
}
