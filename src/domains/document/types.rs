use serde::{Deserialize, Serialize};

/// A minimal styled span of text within a paragraph.
///
/// Word processors split paragraph text into runs whenever formatting changes,
/// so a single placeholder token may straddle several fragments. `props_xml`
/// carries the run's formatting properties as an opaque blob so a codec can
/// round-trip styling it does not interpret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub text: String,
    pub props_xml: Option<String>,
}

impl Fragment {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            props_xml: None,
        }
    }
}

/// An ordered list of fragments plus opaque paragraph-level properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    pub fragments: Vec<Fragment>,
    pub props_xml: Option<String>,
}

impl Paragraph {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            fragments: vec![Fragment::new(text)],
            props_xml: None,
        }
    }

    /// Concatenated text of all fragments.
    pub fn text(&self) -> String {
        self.fragments.iter().map(|f| f.text.as_str()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCell {
    pub paragraphs: Vec<Paragraph>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    pub cells: Vec<TableCell>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub rows: Vec<TableRow>,
}

/// A body-level block: flowing paragraph or table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Block {
    Paragraph(Paragraph),
    Table(Table),
}

/// The canonical rich-text document all converters normalize to and from.
///
/// Substitution operates on this model only; per-format adapters are
/// responsible for getting bytes in and out of it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub body: Vec<Block>,
    /// Header sections, each an ordered list of paragraphs.
    pub headers: Vec<Vec<Paragraph>>,
    /// Footer sections, each an ordered list of paragraphs.
    pub footers: Vec<Vec<Paragraph>>,
}

impl Document {
    /// Visit every paragraph of the document mutably: body paragraphs, table
    /// cells, headers and footers. This is the traversal the instantiation
    /// engine substitutes over.
    pub fn for_each_paragraph_mut<F: FnMut(&mut Paragraph)>(&mut self, mut f: F) {
        for block in &mut self.body {
            match block {
                Block::Paragraph(p) => f(p),
                Block::Table(table) => {
                    for row in &mut table.rows {
                        for cell in &mut row.cells {
                            for p in &mut cell.paragraphs {
                                f(p);
                            }
                        }
                    }
                }
            }
        }
        for section in self.headers.iter_mut().chain(self.footers.iter_mut()) {
            for p in section {
                f(p);
            }
        }
    }

    /// Flatten the document into raw text for field discovery: body paragraphs
    /// first, then table cells, then headers and footers. Blank lines are
    /// dropped.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        let mut push = |text: String| {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                out.push_str(trimmed);
                out.push('\n');
            }
        };

        for block in &self.body {
            if let Block::Paragraph(p) = block {
                push(p.text());
            }
        }
        for block in &self.body {
            if let Block::Table(table) = block {
                for row in &table.rows {
                    for cell in &row.cells {
                        let cell_text = cell
                            .paragraphs
                            .iter()
                            .map(|p| p.text())
                            .collect::<Vec<_>>()
                            .join(" ");
                        push(cell_text);
                    }
                }
            }
        }
        for section in self.headers.iter().chain(self.footers.iter()) {
            for p in section {
                push(p.text());
            }
        }
        out
    }
}
