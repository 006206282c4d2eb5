//! Turning uploaded documents into topic text.

use std::io::{Cursor, Read};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::debug;

use crate::VerifactError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Text,
    Pdf,
    Docx,
}

impl DocumentFormat {
    pub fn from_file_name(file_name: &str) -> Result<Self, VerifactError> {
        let suffix = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match suffix.as_str() {
            "txt" => Ok(DocumentFormat::Text),
            "pdf" => Ok(DocumentFormat::Pdf),
            "docx" => Ok(DocumentFormat::Docx),
            _ => Err(VerifactError::Document(format!(
                "unsupported file format `{file_name}`; expected .pdf, .docx or .txt"
            ))),
        }
    }
}

/// Extract plain text from an uploaded document.
pub fn extract_text(file_name: &str, bytes: &[u8]) -> Result<String, VerifactError> {
    match DocumentFormat::from_file_name(file_name)? {
        DocumentFormat::Text => decode_text(bytes),
        DocumentFormat::Pdf => extract_pdf(file_name, bytes),
        DocumentFormat::Docx => extract_docx(file_name, bytes),
    }
}

fn extract_pdf(file_name: &str, bytes: &[u8]) -> Result<String, VerifactError> {
    // pdf-extract panics on some malformed inputs instead of returning an error.
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem(bytes)
    }));

    match outcome {
        Ok(Ok(text)) => {
            debug!(file_name, chars = text.len(), "extracted pdf text");
            Ok(text)
        }
        Ok(Err(err)) => Err(VerifactError::Document(format!(
            "could not read PDF `{file_name}`: {err}"
        ))),
        Err(_) => Err(VerifactError::Document(format!(
            "could not read PDF `{file_name}`: malformed document"
        ))),
    }
}

fn extract_docx(file_name: &str, bytes: &[u8]) -> Result<String, VerifactError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|err| unreadable_docx(file_name, err))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|err| unreadable_docx(file_name, err))?
        .read_to_string(&mut xml)
        .map_err(|err| unreadable_docx(file_name, err))?;

    let text = docx_body_text(&xml).map_err(|err| unreadable_docx(file_name, err))?;
    debug!(file_name, chars = text.len(), "extracted docx text");
    Ok(text)
}

fn unreadable_docx(file_name: &str, err: impl std::fmt::Display) -> VerifactError {
    VerifactError::Document(format!("could not read DOCX `{file_name}`: {err}"))
}

/// Collect the `w:t` runs of a WordprocessingML body, one line per paragraph.
fn docx_body_text(xml: &str) -> Result<String, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut text = String::new();
    let mut in_run_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(tag) if tag.local_name().as_ref() == b"t" => in_run_text = true,
            Event::End(tag) => match tag.local_name().as_ref() {
                b"t" => in_run_text = false,
                b"p" => text.push('\n'),
                _ => {}
            },
            Event::Empty(tag) => match tag.local_name().as_ref() {
                b"tab" => text.push('\t'),
                b"br" | b"cr" | b"p" => text.push('\n'),
                _ => {}
            },
            Event::Text(run) if in_run_text => text.push_str(&run.unescape()?),
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(text.trim_end().to_string())
}

/// Decode text trying UTF-8, then UTF-16, then Latin-1.
pub fn decode_text(bytes: &[u8]) -> Result<String, VerifactError> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok(text.trim_start_matches('\u{feff}').to_string());
    }

    if let Some(text) = decode_utf16(bytes) {
        return Ok(text);
    }

    Ok(bytes.iter().map(|&byte| byte as char).collect())
}

fn decode_utf16(bytes: &[u8]) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }

    let (body, big_endian) = match bytes {
        [0xFE, 0xFF, rest @ ..] => (rest, true),
        [0xFF, 0xFE, rest @ ..] => (rest, false),
        _ => (bytes, false),
    };

    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| {
            if big_endian {
                u16::from_be_bytes([pair[0], pair[1]])
            } else {
                u16::from_le_bytes([pair[0], pair[1]])
            }
        })
        .collect();

    String::from_utf16(&units).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_utf8_and_strips_bom() {
        let bytes = "\u{feff}Vaccines are safe".as_bytes();
        assert_eq!(decode_text(bytes).unwrap(), "Vaccines are safe");
    }

    #[test]
    fn decodes_utf16_with_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "Été".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode_text(&bytes).unwrap(), "Été");
    }

    #[test]
    fn falls_back_to_latin1() {
        let bytes = [0x63, 0x61, 0x66, 0xE9, 0x21];
        assert_eq!(decode_text(&bytes).unwrap(), "café!");
    }

    #[test]
    fn rejects_unknown_suffix() {
        let err = extract_text("notes.rtf", b"text").unwrap_err();
        assert!(matches!(err, VerifactError::Document(_)));
        assert_eq!(extract_text("notes.TXT", b"hello").unwrap(), "hello");
    }

    fn docx_with_body(body: &str) -> Vec<u8> {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
        );
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("word/document.xml", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn extracts_docx_paragraphs() {
        let bytes = docx_with_body(
            "<w:p><w:r><w:t>Coffee &amp; tea</w:t></w:r><w:r><w:t xml:space=\"preserve\"> both contain caffeine.</w:t></w:r></w:p>\
             <w:p><w:r><w:t>Bats are</w:t><w:tab/><w:t>blind.</w:t></w:r></w:p>",
        );
        let text = extract_text("claims.docx", &bytes).unwrap();
        assert_eq!(text, "Coffee & tea both contain caffeine.\nBats are\tblind.");
    }

    #[test]
    fn docx_without_body_part_is_a_document_error() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("docProps/core.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let err = extract_text("empty.docx", &bytes).unwrap_err();
        assert!(matches!(err, VerifactError::Document(_)));
        let err = extract_text("notes.docx", b"plain text, not a zip").unwrap_err();
        assert!(matches!(err, VerifactError::Document(_)));
    }

    fn single_page_pdf(line: &str) -> Vec<u8> {
        use lopdf::content::{Content, Operation};
        use lopdf::{Document, Object, Stream, dictionary};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(line)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn extracts_pdf_text() {
        let bytes = single_page_pdf("Sharks are mammals");
        let text = extract_text("report.PDF", &bytes).unwrap();
        assert!(text.contains("Sharks are mammals"), "{text:?}");
    }

    #[test]
    fn truncated_pdf_is_a_document_error() {
        let err = extract_text("scan.pdf", b"%PDF-1.7").unwrap_err();
        assert!(matches!(err, VerifactError::Document(_)));
    }
}
