//! External decoding step for PDF and OOXML (docx, xlsx, pptx) documents.
//!
//! PDF text comes from `pdf-extract`. OOXML files are ZIP archives of XML
//! parts; the text runs are pulled out of the relevant parts with
//! `quick-xml`. Every decompressed entry is read through a size bound.

use anyhow::{anyhow, bail, Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read};

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

/// Largest decompressed XML part we are willing to read (zip-bomb guard).
const MAX_PART_BYTES: u64 = 50 * 1024 * 1024;
const MAX_SHEETS: usize = 100;
const SHARED_STRINGS: &str = "xl/sharedStrings.xml";
const MAX_CELLS_PER_SHEET: usize = 100_000;

pub fn extract_pdf(bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| anyhow!("{}", e))
}

/// Paragraph text of `word/document.xml`, one paragraph per line.
pub fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = open(bytes)?;
    let xml = read_part(&mut archive, "word/document.xml")?;
    collect_runs(&xml, b"t", b"p")
}

/// Slide text in slide order, slides separated by a blank line.
pub fn extract_pptx(bytes: &[u8]) -> Result<String> {
    let mut archive = open(bytes)?;
    let slides = numbered_parts(&archive, "ppt/slides/slide");
    if slides.is_empty() {
        bail!("no slides found");
    }

    let mut texts = Vec::new();
    for name in slides {
        let xml = read_part(&mut archive, &name)?;
        let text = collect_runs(&xml, b"t", b"p")?;
        if !text.trim().is_empty() {
            texts.push(text);
        }
    }
    Ok(texts.join("\n\n"))
}

/// Cell values row by row: cells separated by tabs, rows by newlines,
/// sheets by a blank line.
pub fn extract_xlsx(bytes: &[u8]) -> Result<String> {
    let mut archive = open(bytes)?;
    let shared = if archive.index_for_name(SHARED_STRINGS).is_some() {
        shared_strings(&read_part(&mut archive, SHARED_STRINGS)?)?
    } else {
        Vec::new()
    };

    let sheets = numbered_parts(&archive, "xl/worksheets/sheet");
    if sheets.is_empty() {
        bail!("no worksheets found");
    }

    let mut texts = Vec::new();
    for name in sheets.into_iter().take(MAX_SHEETS) {
        let xml = read_part(&mut archive, &name)?;
        let text = sheet_text(&xml, &shared)?;
        if !text.trim().is_empty() {
            texts.push(text);
        }
    }
    Ok(texts.join("\n\n"))
}

fn open(bytes: &[u8]) -> Result<Archive<'_>> {
    zip::ZipArchive::new(Cursor::new(bytes)).context("not a valid OOXML (zip) container")
}

fn read_part(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>> {
    let entry = archive
        .by_name(name)
        .with_context(|| format!("missing part {}", name))?;
    let mut out = Vec::new();
    entry
        .take(MAX_PART_BYTES)
        .read_to_end(&mut out)
        .with_context(|| format!("failed to read part {}", name))?;
    if out.len() as u64 >= MAX_PART_BYTES {
        bail!("part {} exceeds {} bytes", name, MAX_PART_BYTES);
    }
    Ok(out)
}

/// Entries named `<prefix><n>.xml`, sorted by `n`.
fn numbered_parts(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let n = name.strip_prefix(prefix)?.strip_suffix(".xml")?.parse().ok()?;
            Some((n, name.to_string()))
        })
        .collect();
    names.sort();
    names.into_iter().map(|(_, name)| name).collect()
}

/// Concatenate the text of every `text_tag` element, emitting a newline at
/// the end of every `block_tag` element.
fn collect_runs(xml: &[u8], text_tag: &[u8], block_tag: &[u8]) -> Result<String> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == text_tag => in_text = true,
            Event::Text(t) if in_text => out.push_str(&t.unescape()?),
            Event::End(e) => {
                let name = e.local_name();
                if name.as_ref() == text_tag {
                    in_text = false;
                } else if name.as_ref() == block_tag && !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(out.trim_end().to_string())
}

fn shared_strings(xml: &[u8]) -> Result<Vec<String>> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_text = true,
                _ => {}
            },
            Event::Text(t) if in_text => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&t.unescape()?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => strings.extend(current.take()),
                b"t" => in_text = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(strings)
}

#[derive(Clone, Copy, PartialEq)]
enum CellKind {
    Shared,
    Inline,
    Value,
}

fn sheet_text(xml: &[u8], shared: &[String]) -> Result<String> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut rows: Vec<String> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut kind = CellKind::Value;
    let mut capture = false;
    let mut cells = 0usize;

    loop {
        if cells >= MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"c" => {
                    kind = CellKind::Value;
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"t" {
                            kind = match attr.value.as_ref() {
                                b"s" => CellKind::Shared,
                                b"inlineStr" => CellKind::Inline,
                                _ => CellKind::Value,
                            };
                        }
                    }
                }
                b"v" => capture = kind != CellKind::Inline,
                b"t" => capture = kind == CellKind::Inline,
                _ => {}
            },
            Event::Text(t) if capture => {
                let raw = t.unescape()?;
                let value = raw.trim();
                let cell = match kind {
                    CellKind::Shared => value
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| shared.get(i).cloned()),
                    _ => Some(value.to_string()),
                };
                if let Some(cell) = cell.filter(|c| !c.is_empty()) {
                    row.push(cell);
                    cells += 1;
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => capture = false,
                b"row" => {
                    if !row.is_empty() {
                        rows.push(row.join("\t"));
                        row.clear();
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    if !row.is_empty() {
        rows.push(row.join("\t"));
    }

    Ok(rows.join("\n"))
}
