//! Format-aware text extraction.
//!
//! Dispatches on the file extension: the plain-text family is read directly
//! (lossy UTF-8), PDFs go through `pdf-extract`, and OOXML containers
//! (docx/pptx/xlsx) are unzipped and their text nodes walked with
//! `quick-xml`. Legacy binary formats (`.doc`, `.ppt`, `.xls`) are fed to
//! the matching OOXML reader and degrade to empty text when that fails.
//!
//! [`extract_text`] never raises past this boundary: any unsupported or
//! corrupt input yields an empty string, which the pipeline records as a
//! soft per-file error.

use std::io::Read;
use std::path::Path;

use anyhow::{anyhow, bail, Result};
use tracing::debug;

/// Extension allow-list for indexable files.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    ".txt", ".md", ".pdf", ".doc", ".docx", ".ppt", ".pptx", ".xls", ".xlsx", ".csv", ".json",
    ".xml", ".html", ".htm",
];

/// Decompressed bytes read from a single ZIP entry are capped here.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Membership test against the fixed extension allow-list.
pub fn is_supported(path: &Path) -> bool {
    SUPPORTED_EXTENSIONS.contains(&extension_of(path).as_str())
}

/// Lowercase extension including the leading dot; empty when absent.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

/// Extract the full text of a document, returning an empty string on any
/// failure.
pub fn extract_text(path: &Path) -> String {
    match try_extract(path) {
        Ok(text) => text,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "text extraction failed");
            String::new()
        }
    }
}

fn try_extract(path: &Path) -> Result<String> {
    match extension_of(path).as_str() {
        ".pdf" => {
            let bytes = std::fs::read(path)?;
            pdf_extract::extract_text_from_mem(&bytes).map_err(|e| anyhow!("pdf: {}", e))
        }
        ".doc" | ".docx" => {
            let bytes = std::fs::read(path)?;
            extract_docx(&bytes)
        }
        ".ppt" | ".pptx" => {
            let bytes = std::fs::read(path)?;
            extract_pptx(&bytes)
        }
        ".xls" | ".xlsx" => {
            let bytes = std::fs::read(path)?;
            extract_xlsx(&bytes)
        }
        // Plain-text family and anything else: read as text.
        _ => {
            let bytes = std::fs::read(path)?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
    }
}

fn open_archive(bytes: &[u8]) -> Result<zip::ZipArchive<std::io::Cursor<&[u8]>>> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| anyhow!("zip: {}", e))
}

fn read_entry(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>> {
    let entry = archive.by_name(name).map_err(|e| anyhow!("zip: {}", e))?;
    let mut out = Vec::new();
    entry.take(MAX_XML_ENTRY_BYTES).read_to_end(&mut out)?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        bail!("ZIP entry {} exceeds size limit", name);
    }
    Ok(out)
}

/// Numerically ordered container entries matching `prefix…suffix`
/// (e.g. `ppt/slides/slide7.xml`).
fn numbered_entries(
    archive: &zip::ZipArchive<std::io::Cursor<&[u8]>>,
    prefix: &str,
    suffix: &str,
) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(suffix))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(suffix)
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

/// Word: collect every `w:t` run from `word/document.xml`, one line per
/// paragraph.
fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = open_archive(bytes)?;
    let xml = read_entry(&mut archive, "word/document.xml")?;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) if e.local_name().as_ref() == b"t" => {
                if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf) {
                    out.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(quick_xml::events::Event::End(e)) if e.local_name().as_ref() == b"p" => {
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => bail!("ooxml: {}", e),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

/// PowerPoint: walk each slide in order and collect its `a:t` text runs.
fn extract_pptx(bytes: &[u8]) -> Result<String> {
    let mut archive = open_archive(bytes)?;
    let slides = numbered_entries(&archive, "ppt/slides/slide", ".xml");

    let mut lines = Vec::new();
    for name in slides {
        let xml = read_entry(&mut archive, &name)?;
        let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(quick_xml::events::Event::Start(e)) if e.local_name().as_ref() == b"t" => {
                    if let Ok(quick_xml::events::Event::Text(te)) =
                        reader.read_event_into(&mut buf)
                    {
                        let text = te.unescape().unwrap_or_default().into_owned();
                        if !text.is_empty() {
                            lines.push(text);
                        }
                    }
                }
                Ok(quick_xml::events::Event::Eof) => break,
                Err(e) => bail!("ooxml: {}", e),
                _ => {}
            }
            buf.clear();
        }
    }
    Ok(lines.join("\n"))
}

/// Excel: resolve shared strings, then collect string cells sheet by sheet.
fn extract_xlsx(bytes: &[u8]) -> Result<String> {
    let mut archive = open_archive(bytes)?;
    let shared = read_shared_strings(&mut archive)?;
    let sheets = numbered_entries(&archive, "xl/worksheets/sheet", ".xml");

    let mut cells: Vec<String> = Vec::new();
    for name in sheets {
        let xml = read_entry(&mut archive, &name)?;
        collect_shared_string_cells(&xml, &shared, &mut cells)?;
    }
    Ok(cells.join(" "))
}

fn read_shared_strings(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> Result<Vec<String>> {
    let xml = read_entry(archive, "xl/sharedStrings.xml")?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_si = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = true;
                } else if in_si && e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) =
                        reader.read_event_into(&mut buf)
                    {
                        strings.push(te.unescape().unwrap_or_default().into_owned());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) if e.local_name().as_ref() == b"si" => {
                in_si = false;
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => bail!("ooxml: {}", e),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn collect_shared_string_cells(
    xml: &[u8],
    shared: &[String],
    out: &mut Vec<String>,
) -> Result<()> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_value = false;
    let mut shared_cell = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"c" {
                    shared_cell = e.attributes().any(|a| {
                        a.as_ref()
                            .map(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s")
                            .unwrap_or(false)
                    });
                } else if e.local_name().as_ref() == b"v" {
                    in_value = true;
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_value => {
                if shared_cell {
                    if let Ok(i) = te.unescape().unwrap_or_default().trim().parse::<usize>() {
                        if let Some(s) = shared.get(i) {
                            out.push(s.clone());
                        }
                    }
                }
                in_value = false;
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"v" {
                    in_value = false;
                } else if e.local_name().as_ref() == b"c" {
                    shared_cell = false;
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => bail!("ooxml: {}", e),
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn allow_list_membership() {
        assert!(is_supported(Path::new("/docs/notes.MD")));
        assert!(is_supported(Path::new("report.pdf")));
        assert!(!is_supported(Path::new("binary.exe")));
        assert!(!is_supported(Path::new("no_extension")));
    }

    #[test]
    fn plain_text_is_read_verbatim() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("note.txt");
        std::fs::write(&path, "hello archivist").unwrap();
        assert_eq!(extract_text(&path), "hello archivist");
    }

    #[test]
    fn missing_file_yields_empty_string() {
        assert_eq!(extract_text(Path::new("/nonexistent/x.txt")), "");
    }

    #[test]
    fn corrupt_pdf_yields_empty_string() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("bad.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();
        assert_eq!(extract_text(&path), "");
    }

    #[test]
    fn docx_text_runs_are_extracted() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("memo.docx");

        let mut buf = Vec::new();
        {
            let mut archive = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            archive
                .start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            archive
                .write_all(
                    br#"<?xml version="1.0"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>quarterly memo</w:t></w:r></w:p></w:body></w:document>"#,
                )
                .unwrap();
            archive.finish().unwrap();
        }
        std::fs::write(&path, &buf).unwrap();

        assert_eq!(extract_text(&path), "quarterly memo");
    }

    #[test]
    fn legacy_doc_degrades_to_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("old.doc");
        std::fs::write(&path, b"\xd0\xcf\x11\xe0 legacy").unwrap();
        assert_eq!(extract_text(&path), "");
    }
}
