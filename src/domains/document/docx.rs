//! Reads and writes the canonical document as a .docx container.
//!
//! Only the parts substitution cares about are modeled: body paragraphs and
//! tables, plus header/footer paragraphs. Run and paragraph properties are
//! carried as raw XML so styling round-trips without being interpreted.

use std::io::{Cursor, Read, Write};

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::errors::{DomainError, DomainResult};

use super::types::{Block, Document, Fragment, Paragraph, Table, TableCell, TableRow};

/// Extension of the canonical container format.
pub const CANONICAL_EXTENSION: &str = "docx";

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

fn codec_err(context: &str, err: impl std::fmt::Display) -> DomainError {
    DomainError::DocumentCodec(format!("{}: {}", context, err))
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Parse docx bytes into the canonical document model.
pub fn read_docx(bytes: &[u8]) -> DomainResult<Document> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| codec_err("not a docx container", e))?;

    let document_xml = read_part(&mut archive, "word/document.xml")?
        .ok_or_else(|| DomainError::DocumentCodec("missing word/document.xml".to_string()))?;

    let mut header_parts: Vec<String> = Vec::new();
    let mut footer_parts: Vec<String> = Vec::new();
    for name in archive.file_names() {
        if name.starts_with("word/header") && name.ends_with(".xml") {
            header_parts.push(name.to_string());
        } else if name.starts_with("word/footer") && name.ends_with(".xml") {
            footer_parts.push(name.to_string());
        }
    }
    header_parts.sort();
    footer_parts.sort();

    let mut doc = Document {
        body: parse_body(&document_xml)?,
        headers: Vec::new(),
        footers: Vec::new(),
    };

    for part in header_parts {
        if let Some(xml) = read_part(&mut archive, &part)? {
            doc.headers.push(parse_part_paragraphs(&xml)?);
        }
    }
    for part in footer_parts {
        if let Some(xml) = read_part(&mut archive, &part)? {
            doc.footers.push(parse_part_paragraphs(&xml)?);
        }
    }

    Ok(doc)
}

fn read_part(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> DomainResult<Option<String>> {
    match archive.by_name(name) {
        Ok(mut file) => {
            let mut xml = String::new();
            file.read_to_string(&mut xml)
                .map_err(|e| codec_err(name, e))?;
            Ok(Some(xml))
        }
        Err(zip::result::ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(codec_err(name, e)),
    }
}

fn parse_body(xml: &str) -> DomainResult<Vec<Block>> {
    let mut reader = Reader::from_str(xml);
    let mut blocks = Vec::new();

    loop {
        match reader.read_event().map_err(|e| codec_err("document.xml", e))? {
            Event::Start(e) if e.local_name().as_ref() == b"p" => {
                blocks.push(Block::Paragraph(parse_paragraph(&mut reader)?));
            }
            Event::Empty(e) if e.local_name().as_ref() == b"p" => {
                blocks.push(Block::Paragraph(Paragraph::default()));
            }
            Event::Start(e) if e.local_name().as_ref() == b"tbl" => {
                blocks.push(Block::Table(parse_table(&mut reader)?));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(blocks)
}

/// Header/footer parts: collect all paragraphs, flattening any tables.
fn parse_part_paragraphs(xml: &str) -> DomainResult<Vec<Paragraph>> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs = Vec::new();

    loop {
        match reader.read_event().map_err(|e| codec_err("header/footer", e))? {
            Event::Start(e) if e.local_name().as_ref() == b"p" => {
                paragraphs.push(parse_paragraph(&mut reader)?);
            }
            Event::Empty(e) if e.local_name().as_ref() == b"p" => {
                paragraphs.push(Paragraph::default());
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(paragraphs)
}

/// Consumes events after a `<w:p>` start tag up to its matching end.
fn parse_paragraph(reader: &mut Reader<&[u8]>) -> DomainResult<Paragraph> {
    let mut paragraph = Paragraph::default();

    loop {
        match reader.read_event().map_err(|e| codec_err("paragraph", e))? {
            Event::Start(e) if e.local_name().as_ref() == b"pPr" => {
                let raw = reader
                    .read_text(e.name())
                    .map_err(|err| codec_err("pPr", err))?;
                paragraph.props_xml = Some(raw.into_owned());
            }
            Event::Start(e) if e.local_name().as_ref() == b"r" => {
                paragraph.fragments.push(parse_run(reader)?);
            }
            Event::End(e) if e.local_name().as_ref() == b"p" => break,
            Event::Eof => {
                return Err(DomainError::DocumentCodec(
                    "unterminated paragraph".to_string(),
                ))
            }
            _ => {}
        }
    }

    Ok(paragraph)
}

/// Consumes events after a `<w:r>` start tag up to its matching end.
fn parse_run(reader: &mut Reader<&[u8]>) -> DomainResult<Fragment> {
    let mut fragment = Fragment::default();
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(|e| codec_err("run", e))? {
            Event::Start(e) if e.local_name().as_ref() == b"rPr" => {
                let raw = reader
                    .read_text(e.name())
                    .map_err(|err| codec_err("rPr", err))?;
                fragment.props_xml = Some(raw.into_owned());
            }
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_text = true,
            Event::End(e) if e.local_name().as_ref() == b"t" => in_text = false,
            Event::Text(t) if in_text => {
                let text = t.unescape().map_err(|e| codec_err("w:t", e))?;
                fragment.text.push_str(&text);
            }
            Event::Empty(e) if e.local_name().as_ref() == b"tab" => fragment.text.push('\t'),
            Event::Empty(e) if e.local_name().as_ref() == b"br" => fragment.text.push('\n'),
            Event::End(e) if e.local_name().as_ref() == b"r" => break,
            Event::Eof => return Err(DomainError::DocumentCodec("unterminated run".to_string())),
            _ => {}
        }
    }

    Ok(fragment)
}

/// Consumes events after a `<w:tbl>` start tag up to its matching end.
/// Nested tables are flattened into the enclosing cell's paragraph list.
fn parse_table(reader: &mut Reader<&[u8]>) -> DomainResult<Table> {
    let mut table = Table::default();
    let mut row: Option<TableRow> = None;
    let mut cell: Option<TableCell> = None;

    loop {
        match reader.read_event().map_err(|e| codec_err("table", e))? {
            Event::Start(e) if e.local_name().as_ref() == b"tr" => {
                row = Some(TableRow::default());
            }
            Event::End(e) if e.local_name().as_ref() == b"tr" => {
                if let Some(r) = row.take() {
                    table.rows.push(r);
                }
            }
            Event::Start(e) if e.local_name().as_ref() == b"tc" => {
                cell = Some(TableCell::default());
            }
            Event::End(e) if e.local_name().as_ref() == b"tc" => {
                if let (Some(c), Some(r)) = (cell.take(), row.as_mut()) {
                    r.cells.push(c);
                }
            }
            Event::Start(e) if e.local_name().as_ref() == b"p" => {
                let paragraph = parse_paragraph(reader)?;
                if let Some(c) = cell.as_mut() {
                    c.paragraphs.push(paragraph);
                }
            }
            Event::Empty(e) if e.local_name().as_ref() == b"p" => {
                if let Some(c) = cell.as_mut() {
                    c.paragraphs.push(Paragraph::default());
                }
            }
            Event::Start(e) if e.local_name().as_ref() == b"tbl" => {
                let nested = parse_table(reader)?;
                if let Some(c) = cell.as_mut() {
                    for nested_row in nested.rows {
                        for nested_cell in nested_row.cells {
                            c.paragraphs.extend(nested_cell.paragraphs);
                        }
                    }
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"tbl" => break,
            Event::Eof => {
                return Err(DomainError::DocumentCodec("unterminated table".to_string()))
            }
            _ => {}
        }
    }

    Ok(table)
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Serialize the canonical document as docx bytes.
pub fn write_docx(doc: &Document) -> DomainResult<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options: FileOptions = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    write_zip_part(&mut zip, "[Content_Types].xml", &content_types_xml(doc), options)?;
    write_zip_part(&mut zip, "_rels/.rels", ROOT_RELS, options)?;
    write_zip_part(
        &mut zip,
        "word/_rels/document.xml.rels",
        &document_rels_xml(doc),
        options,
    )?;
    write_zip_part(&mut zip, "word/document.xml", &document_xml(doc), options)?;

    for (i, section) in doc.headers.iter().enumerate() {
        let xml = part_xml("w:hdr", section);
        write_zip_part(&mut zip, &format!("word/header{}.xml", i + 1), &xml, options)?;
    }
    for (i, section) in doc.footers.iter().enumerate() {
        let xml = part_xml("w:ftr", section);
        write_zip_part(&mut zip, &format!("word/footer{}.xml", i + 1), &xml, options)?;
    }

    let cursor = zip
        .finish()
        .map_err(|e| codec_err("finalizing docx", e))?;
    Ok(cursor.into_inner())
}

fn write_zip_part(
    zip: &mut ZipWriter<Cursor<Vec<u8>>>,
    name: &str,
    content: &str,
    options: FileOptions,
) -> DomainResult<()> {
    zip.start_file(name, options)
        .map_err(|e| codec_err(name, e))?;
    zip.write_all(content.as_bytes())
        .map_err(|e| codec_err(name, e))?;
    Ok(())
}

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

fn content_types_xml(doc: &Document) -> String {
    let mut overrides = String::from(
        r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
    );
    for i in 0..doc.headers.len() {
        overrides.push_str(&format!(
            r#"<Override PartName="/word/header{}.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.header+xml"/>"#,
            i + 1
        ));
    }
    for i in 0..doc.footers.len() {
        overrides.push_str(&format!(
            r#"<Override PartName="/word/footer{}.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.footer+xml"/>"#,
            i + 1
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/>{}</Types>"#,
        overrides
    )
}

fn document_rels_xml(doc: &Document) -> String {
    let mut rels = String::new();
    let mut rid = 1usize;
    for i in 0..doc.headers.len() {
        rels.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/header" Target="header{}.xml"/>"#,
            rid,
            i + 1
        ));
        rid += 1;
    }
    for i in 0..doc.footers.len() {
        rels.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/footer" Target="footer{}.xml"/>"#,
            rid,
            i + 1
        ));
        rid += 1;
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{}</Relationships>"#,
        rels
    )
}

fn document_xml(doc: &Document) -> String {
    let mut body = String::new();
    for block in &doc.body {
        match block {
            Block::Paragraph(p) => push_paragraph_xml(&mut body, p),
            Block::Table(t) => push_table_xml(&mut body, t),
        }
    }

    // Section properties reference the header/footer parts written alongside.
    let mut sect = String::new();
    if !doc.headers.is_empty() || !doc.footers.is_empty() {
        sect.push_str("<w:sectPr>");
        let mut rid = 1usize;
        for _ in 0..doc.headers.len() {
            sect.push_str(&format!(
                r#"<w:headerReference w:type="default" r:id="rId{}"/>"#,
                rid
            ));
            rid += 1;
        }
        for _ in 0..doc.footers.len() {
            sect.push_str(&format!(
                r#"<w:footerReference w:type="default" r:id="rId{}"/>"#,
                rid
            ));
            rid += 1;
        }
        sect.push_str("</w:sectPr>");
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="{}" xmlns:r="{}"><w:body>{}{}</w:body></w:document>"#,
        W_NS, R_NS, body, sect
    )
}

fn part_xml(root: &str, paragraphs: &[Paragraph]) -> String {
    let mut content = String::new();
    for p in paragraphs {
        push_paragraph_xml(&mut content, p);
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<{root} xmlns:w="{ns}">{content}</{root}>"#,
        root = root,
        ns = W_NS,
        content = content
    )
}

fn push_paragraph_xml(out: &mut String, paragraph: &Paragraph) {
    out.push_str("<w:p>");
    if let Some(props) = &paragraph.props_xml {
        out.push_str("<w:pPr>");
        out.push_str(props);
        out.push_str("</w:pPr>");
    }
    for fragment in &paragraph.fragments {
        out.push_str("<w:r>");
        if let Some(props) = &fragment.props_xml {
            out.push_str("<w:rPr>");
            out.push_str(props);
            out.push_str("</w:rPr>");
        }
        out.push_str(r#"<w:t xml:space="preserve">"#);
        out.push_str(&escape(fragment.text.as_str()));
        out.push_str("</w:t></w:r>");
    }
    out.push_str("</w:p>");
}

fn push_table_xml(out: &mut String, table: &Table) {
    out.push_str("<w:tbl>");
    for row in &table.rows {
        out.push_str("<w:tr>");
        for cell in &row.cells {
            out.push_str("<w:tc>");
            if cell.paragraphs.is_empty() {
                // A table cell must contain at least one paragraph.
                out.push_str("<w:p/>");
            }
            for p in &cell.paragraphs {
                push_paragraph_xml(out, p);
            }
            out.push_str("</w:tc>");
        }
        out.push_str("</w:tr>");
    }
    out.push_str("</w:tbl>");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> Document {
        Document {
            body: vec![
                Block::Paragraph(Paragraph {
                    fragments: vec![
                        Fragment {
                            text: "Hello {{".to_string(),
                            props_xml: Some("<w:b/>".to_string()),
                        },
                        Fragment::new("NAME"),
                        Fragment::new("}} & welcome"),
                    ],
                    props_xml: Some(r#"<w:jc w:val="center"/>"#.to_string()),
                }),
                Block::Table(Table {
                    rows: vec![TableRow {
                        cells: vec![
                            TableCell {
                                paragraphs: vec![Paragraph::from_text("balance")],
                            },
                            TableCell {
                                paragraphs: vec![Paragraph::from_text(":")],
                            },
                        ],
                    }],
                }),
            ],
            headers: vec![vec![Paragraph::from_text("Contract {{NO}}")]],
            footers: vec![vec![Paragraph::from_text("page footer")]],
        }
    }

    #[test]
    fn docx_round_trip_preserves_structure_and_props() {
        let doc = sample_document();
        let bytes = write_docx(&doc).unwrap();
        let parsed = read_docx(&bytes).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn text_is_escaped_and_unescaped() {
        let doc = Document {
            body: vec![Block::Paragraph(Paragraph::from_text("a < b & c > d"))],
            headers: vec![],
            footers: vec![],
        };
        let bytes = write_docx(&doc).unwrap();
        let parsed = read_docx(&bytes).unwrap();
        assert_eq!(parsed.plain_text(), "a < b & c > d\n");
    }

    #[test]
    fn run_split_across_fragments_survives() {
        let doc = sample_document();
        let bytes = write_docx(&doc).unwrap();
        let parsed = read_docx(&bytes).unwrap();
        if let Block::Paragraph(p) = &parsed.body[0] {
            assert_eq!(p.fragments.len(), 3);
            assert_eq!(p.text(), "Hello {{NAME}} & welcome");
        } else {
            panic!("expected paragraph");
        }
    }

    #[test]
    fn rejects_non_docx_bytes() {
        let err = read_docx(b"plainly not a zip").unwrap_err();
        assert!(matches!(err, DomainError::DocumentCodec(_)));
    }

    #[test]
    fn empty_cell_gets_placeholder_paragraph() {
        let doc = Document {
            body: vec![Block::Table(Table {
                rows: vec![TableRow {
                    cells: vec![TableCell { paragraphs: vec![] }],
                }],
            })],
            headers: vec![],
            footers: vec![],
        };
        let bytes = write_docx(&doc).unwrap();
        let parsed = read_docx(&bytes).unwrap();
        if let Block::Table(t) = &parsed.body[0] {
            assert_eq!(t.rows[0].cells[0].paragraphs.len(), 1);
        } else {
            panic!("expected table");
        }
    }
}
