//! Multi-format text extraction for uploaded documents.
//!
//! The ingestion pipeline supplies raw bytes plus a file type; this
//! module returns either prose (fed to the sentence-boundary chunker) or
//! a table of rows (fed to the tabular chunker):
//!
//! | Type | Result | Method |
//! |------|--------|--------|
//! | `pdf` | prose | `pdf-extract` |
//! | `txt` | prose | UTF-8 (lossy) |
//! | `csv` | table | `csv` reader, first record as header |
//! | `xlsx` / `xls` | table | ZIP + `sharedStrings.xml` + first worksheet |
//!
//! XLSX parsing walks the first worksheet only and aligns sparse cells to
//! their column via the cell reference (`B2` → column 1). ZIP entries are
//! read through a size cap as zip-bomb protection.

use std::io::Read;

use anyhow::{Context, Result};

use doc_chat_core::error::ChatError;

/// Maximum decompressed bytes read from a single ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// File types the ingestion pipeline accepts.
pub const SUPPORTED_FILE_TYPES: &[&str] = &["pdf", "txt", "csv", "xlsx", "xls"];

pub fn is_supported_file_type(file_type: &str) -> bool {
    SUPPORTED_FILE_TYPES.contains(&file_type)
}

/// Extraction result: free-running text, or rows for tabular sources.
#[derive(Debug, Clone)]
pub enum ExtractedContent {
    Prose(String),
    Table {
        headers: Vec<String>,
        rows: Vec<Vec<Option<String>>>,
    },
}

/// Extract content from raw document bytes.
///
/// Unsupported types fail with a validation error; parse failures carry
/// the file type in their context.
pub fn extract(bytes: &[u8], file_type: &str) -> Result<ExtractedContent> {
    match file_type {
        "pdf" => extract_pdf(bytes),
        "txt" => Ok(ExtractedContent::Prose(
            String::from_utf8_lossy(bytes).trim().to_string(),
        )),
        "csv" => extract_csv(bytes),
        "xlsx" | "xls" => extract_xlsx(bytes),
        other => Err(ChatError::validation(format!(
            "Unsupported file type: {}. Supported types: {}",
            other,
            SUPPORTED_FILE_TYPES.join(", ")
        ))
        .into()),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<ExtractedContent> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| anyhow::anyhow!("PDF extraction failed: {}", e))?;
    Ok(ExtractedContent::Prose(text.trim().to_string()))
}

fn extract_csv(bytes: &[u8]) -> Result<ExtractedContent> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .context("CSV extraction failed: unreadable header row")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.context("CSV extraction failed: malformed record")?;
        let row: Vec<Option<String>> = record
            .iter()
            .map(|cell| {
                let cell = cell.trim();
                if cell.is_empty() {
                    None
                } else {
                    Some(cell.to_string())
                }
            })
            .collect();
        rows.push(row);
    }

    Ok(ExtractedContent::Table { headers, rows })
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>> {
    let entry = archive
        .by_name(name)
        .with_context(|| format!("XLSX extraction failed: missing entry {}", name))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .context("XLSX extraction failed: unreadable entry")?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        anyhow::bail!(
            "XLSX extraction failed: entry {} exceeds size limit ({} bytes)",
            name,
            MAX_XML_ENTRY_BYTES
        );
    }
    Ok(out)
}

fn extract_xlsx(bytes: &[u8]) -> Result<ExtractedContent> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .context("XLSX extraction failed: not a valid archive")?;

    // sharedStrings.xml is optional for numeric-only workbooks.
    let shared_strings = if archive.by_name("xl/sharedStrings.xml").is_ok() {
        read_shared_strings(&mut archive)?
    } else {
        Vec::new()
    };

    let sheet_name = first_worksheet_name(&archive)
        .context("XLSX extraction failed: workbook has no worksheets")?;
    let sheet_xml = read_zip_entry_bounded(&mut archive, &sheet_name)?;
    let mut all_rows = parse_sheet_rows(&sheet_xml, &shared_strings)?;

    if all_rows.is_empty() {
        return Ok(ExtractedContent::Table {
            headers: Vec::new(),
            rows: Vec::new(),
        });
    }

    let headers: Vec<String> = all_rows
        .remove(0)
        .into_iter()
        .map(|cell| cell.unwrap_or_default())
        .collect();

    Ok(ExtractedContent::Table {
        headers,
        rows: all_rows,
    })
}

fn read_shared_strings(archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>) -> Result<Vec<String>> {
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml")?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_si = false;
    let mut current = String::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"si" {
                    in_si = true;
                    current.clear();
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_si => {
                current.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"si" {
                    strings.push(current.clone());
                    in_si = false;
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => anyhow::bail!("XLSX extraction failed: {}", e),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Lowest-numbered worksheet entry (`xl/worksheets/sheet1.xml` typically).
/// Only the first sheet is ingested.
fn first_worksheet_name(archive: &zip::ZipArchive<std::io::Cursor<&[u8]>>) -> Option<String> {
    archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .min_by_key(|name| {
            name.trim_start_matches("xl/worksheets/sheet")
                .trim_end_matches(".xml")
                .parse::<u32>()
                .unwrap_or(u32::MAX)
        })
        .map(|s| s.to_string())
}

/// Column index from a cell reference: `A1` → 0, `B2` → 1, `AA3` → 26.
fn column_from_cell_ref(cell_ref: &str) -> usize {
    let mut col = 0usize;
    for c in cell_ref.chars().take_while(|c| c.is_ascii_alphabetic()) {
        col = col * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1);
    }
    col.saturating_sub(1)
}

fn parse_sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<Vec<Vec<Option<String>>>> {
    let mut rows: Vec<Vec<Option<String>>> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut current_row: Vec<Option<String>> = Vec::new();
    let mut in_row = false;
    let mut in_v = false;
    let mut cell_column = 0usize;
    let mut cell_is_shared = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => {
                    in_row = true;
                    current_row.clear();
                }
                b"c" if in_row => {
                    cell_is_shared = false;
                    cell_column = current_row.len();
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"t" => cell_is_shared = attr.value.as_ref() == b"s",
                            b"r" => {
                                cell_column = column_from_cell_ref(
                                    &String::from_utf8_lossy(attr.value.as_ref()),
                                )
                            }
                            _ => {}
                        }
                    }
                }
                b"v" if in_row => in_v = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(te)) if in_v => {
                let raw = te.unescape().unwrap_or_default();
                let raw = raw.trim();
                let value = if cell_is_shared {
                    raw.parse::<usize>()
                        .ok()
                        .and_then(|i| shared_strings.get(i).cloned())
                } else if raw.is_empty() {
                    None
                } else {
                    Some(raw.to_string())
                };
                if current_row.len() <= cell_column {
                    current_row.resize(cell_column + 1, None);
                }
                current_row[cell_column] = value;
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"row" => {
                    rows.push(current_row.clone());
                    in_row = false;
                }
                b"v" => in_v = false,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => anyhow::bail!("XLSX extraction failed: {}", e),
            _ => {}
        }
        buf.clear();
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_type_is_a_validation_error() {
        let err = extract(b"data", "docx").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChatError>(),
            Some(ChatError::Validation(_))
        ));
    }

    #[test]
    fn invalid_pdf_is_an_error() {
        assert!(extract(b"not a pdf", "pdf").is_err());
    }

    #[test]
    fn invalid_zip_is_an_error_for_xlsx() {
        assert!(extract(b"not a zip", "xlsx").is_err());
    }

    #[test]
    fn txt_passes_through_trimmed() {
        let content = extract(b"  plain text body  \n", "txt").unwrap();
        match content {
            ExtractedContent::Prose(text) => assert_eq!(text, "plain text body"),
            _ => panic!("txt must extract as prose"),
        }
    }

    #[test]
    fn csv_yields_headers_and_rows() {
        let content = extract(b"name,amount\nAcme,120\nGlobex,\n", "csv").unwrap();
        match content {
            ExtractedContent::Table { headers, rows } => {
                assert_eq!(headers, vec!["name", "amount"]);
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[0], vec![Some("Acme".to_string()), Some("120".to_string())]);
                assert_eq!(rows[1], vec![Some("Globex".to_string()), None]);
            }
            _ => panic!("csv must extract as table"),
        }
    }

    #[test]
    fn csv_quoted_fields_are_parsed() {
        let content = extract(b"name,notes\nAcme,\"hello, world\"\n", "csv").unwrap();
        match content {
            ExtractedContent::Table { rows, .. } => {
                assert_eq!(rows[0][1], Some("hello, world".to_string()));
            }
            _ => panic!("csv must extract as table"),
        }
    }

    #[test]
    fn cell_references_map_to_columns() {
        assert_eq!(column_from_cell_ref("A1"), 0);
        assert_eq!(column_from_cell_ref("B2"), 1);
        assert_eq!(column_from_cell_ref("Z9"), 25);
        assert_eq!(column_from_cell_ref("AA3"), 26);
    }
}
