//! Single-page PDF rendering of a feed item (title plus bullet summary).
//!
//! Output is plain PDF 1.4 with the built-in Helvetica font in
//! WinAnsiEncoding, so every character written must be Latin-1.

use crate::types::{FeedItem, PipelineError, Result};
use std::path::Path;

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;
const FONT_SIZE: f32 = 12.0;
const LEADING: f32 = 16.0;
/// Average Helvetica advance as a fraction of the font size.
const AVG_CHAR_WIDTH: f32 = 0.5;

/// Replace typographic punctuation with ASCII and anything the font
/// cannot encode with `?`.
pub fn clean_text(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{2014}' | '\u{2013}' => '-',
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            '\n' | '\t' => c,
            c if (c as u32) < 0x20 => ' ',
            c if (0x80..0xA0).contains(&(c as u32)) || (c as u32) > 0xFF => '?',
            c => c,
        })
        .collect()
}

fn max_chars_per_line() -> usize {
    ((PAGE_WIDTH - 2.0 * MARGIN) / (FONT_SIZE * AVG_CHAR_WIDTH)) as usize
}

fn max_lines() -> usize {
    ((PAGE_HEIGHT - 2.0 * MARGIN) / LEADING) as usize
}

/// Greedy word wrap. Words longer than a line are split.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > width {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let rest = word.split_off(width);
                lines.push(word.into_iter().collect());
                word = rest;
            }

            let needed = if current.is_empty() { word.len() } else { current.chars().count() + 1 + word.len() };
            if needed > width && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.extend(word);
        }
        lines.push(current);
    }

    lines
}

fn escape_pdf_string(line: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(line.len());
    for c in line.chars() {
        match c {
            '\\' | '(' | ')' => {
                out.push(b'\\');
                out.push(c as u8);
            }
            // clean_text guarantees Latin-1, which WinAnsi shares above 0xA0.
            c if (c as u32) <= 0xFF => out.push(c as u32 as u8),
            _ => out.push(b'?'),
        }
    }
    out
}

fn content_stream(title: &str, body: &str) -> Vec<u8> {
    let mut stream = Vec::new();
    let mut y = PAGE_HEIGHT - MARGIN - FONT_SIZE;

    let title_width = title.chars().count() as f32 * FONT_SIZE * AVG_CHAR_WIDTH;
    let title_x = ((PAGE_WIDTH - title_width) / 2.0).max(MARGIN);
    let title_line = wrap_text(title, max_chars_per_line()).into_iter().next().unwrap_or_default();

    let mut line_at = |x: f32, y: f32, text: &str| {
        stream.extend_from_slice(format!("BT /F1 {} Tf {:.2} {:.2} Td (", FONT_SIZE, x, y).as_bytes());
        stream.extend_from_slice(&escape_pdf_string(text));
        stream.extend_from_slice(b") Tj ET\n");
    };

    line_at(title_x, y, &title_line);
    // One blank line between title and summary.
    y -= 2.0 * LEADING;

    for line in wrap_text(body, max_chars_per_line()).into_iter().take(max_lines().saturating_sub(2)) {
        if !line.is_empty() {
            line_at(MARGIN, y, &line);
        }
        y -= LEADING;
    }

    stream
}

/// Build the PDF bytes for one item. Text beyond the first page is dropped.
pub fn build_item_pdf(item: &FeedItem) -> Vec<u8> {
    let content = content_stream(&clean_text(&item.title), &clean_text(&item.bullet_summary_preload));

    let objects: Vec<Vec<u8>> = vec![
        b"<< /Type /Catalog /Pages 2 0 R >>".to_vec(),
        b"<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_vec(),
        format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] /Resources << /Font << /F1 4 0 R >> >> /Contents 5 0 R >>",
            PAGE_WIDTH, PAGE_HEIGHT
        )
        .into_bytes(),
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>".to_vec(),
        [
            format!("<< /Length {} >>\nstream\n", content.len()).into_bytes(),
            content,
            b"\nendstream".to_vec(),
        ]
        .concat(),
    ];

    let mut pdf = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (index, object) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n", index + 1).as_bytes());
        pdf.extend_from_slice(object);
        pdf.extend_from_slice(b"\nendobj\n");
    }

    let xref_at = pdf.len();
    pdf.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for offset in offsets {
        pdf.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    pdf.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_at
        )
        .as_bytes(),
    );

    pdf
}

/// Render `item` to `path`, creating parent directories.
pub async fn render_item_pdf(item: &FeedItem, path: &Path) -> Result<()> {
    let bytes = build_item_pdf(item);

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PipelineError::Generation(format!("cannot create {}: {}", parent.display(), e)))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| PipelineError::Generation(format!("cannot write document {}: {}", path.display(), e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn clean_text_maps_typographic_punctuation() {
        assert_eq!(clean_text("a\u{2014}b\u{2013}c"), "a-b-c");
        assert_eq!(clean_text("\u{2018}hi\u{2019} \u{201C}there\u{201D}"), "'hi' \"there\"");
        assert_eq!(clean_text("caf\u{e9} \u{1F600}"), "caf\u{e9} ?");
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn wrap_respects_width_and_paragraphs() {
        let lines = wrap_text("one two three four\nfive", 9);
        assert_eq!(lines, vec!["one two", "three", "four", "five"]);

        let long = wrap_text("abcdefghij", 4);
        assert_eq!(long, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn pdf_has_header_xref_and_escaped_text() {
        let item = FeedItem {
            uuid: "1".to_string(),
            title: "Budget (draft) \u{2014} v2".to_string(),
            bullet_summary_preload: "- first point\n- second point".to_string(),
            ..Default::default()
        };
        let pdf = build_item_pdf(&item);

        assert!(pdf.starts_with(b"%PDF-1.4"));
        assert!(pdf.ends_with(b"%%EOF\n"));
        assert!(contains(&pdf, b"Budget \\(draft\\) - v2"));
        assert!(contains(&pdf, b"- second point"));
        assert!(contains(&pdf, b"/Count 1"));
    }

    #[test]
    fn xref_offsets_point_at_objects() {
        let pdf = build_item_pdf(&FeedItem::default());
        let xref = pdf.windows(5).position(|w| w == b"xref\n").unwrap();
        let table = String::from_utf8(pdf[xref..].to_vec()).unwrap();
        let first_entry = table.lines().nth(3).unwrap();
        let offset: usize = first_entry[..10].parse().unwrap();

        assert!(pdf[offset..].starts_with(b"1 0 obj"));
    }

    #[test]
    fn overflowing_summary_stays_on_one_page() {
        let item = FeedItem {
            title: "Long".to_string(),
            bullet_summary_preload: "line\n".repeat(500),
            ..Default::default()
        };
        let pdf = build_item_pdf(&item);
        let text = String::from_utf8_lossy(&pdf);

        assert!(text.matches("Tj").count() <= max_lines());
    }
}
