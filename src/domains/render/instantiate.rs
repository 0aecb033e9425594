//! Template Instantiation Engine.
//!
//! Takes a canonical document plus a replacement map and produces the filled
//! document. Placeholders may straddle fragment boundaries, so each paragraph
//! is substituted over the concatenation of its fragment texts; the result is
//! written into the first fragment and the rest are cleared, which means only
//! the first fragment's styling survives substitution.

use crate::domains::document::types::{Document, Paragraph};
use crate::domains::template::discovery::substitute_replace_tokens;
use crate::domains::template::types::{ReplacementMap, SubstitutionStyle};

/// Produce a filled copy of `document`. Missing bindings never fail here:
/// unmatched tokens stay in the output text verbatim, and required-field
/// enforcement happens at document-instance validation, before export.
pub fn instantiate(document: &Document, replacements: &ReplacementMap) -> Document {
    let mut filled = document.clone();
    filled.for_each_paragraph_mut(|paragraph| substitute_paragraph(paragraph, replacements));
    filled
}

fn substitute_paragraph(paragraph: &mut Paragraph, replacements: &ReplacementMap) {
    // Right fields need fragment boundaries, so they are resolved before the
    // paragraph collapses: a fragment that is exactly a known label, followed
    // by a fragment holding just a colon, becomes "label: value". Without the
    // trailing colon fragment the label is left alone rather than guessing
    // where the value belongs.
    for i in 0..paragraph.fragments.len() {
        let name = paragraph.fragments[i].text.clone();
        let Some((SubstitutionStyle::Right, value)) = replacements.get(&name) else {
            continue;
        };
        let followed_by_colon = paragraph
            .fragments
            .get(i + 1)
            .map(|next| next.text.trim() == ":")
            .unwrap_or(false);
        if followed_by_colon {
            paragraph.fragments[i].text =
                format!("{}: {}", name, value.clone().unwrap_or_default());
            paragraph.fragments[i + 1].text.clear();
        }
    }

    let joined = paragraph.text();
    let substituted = substitute_replace_tokens(&joined, replacements);

    for fragment in paragraph.fragments.iter_mut() {
        fragment.text.clear();
    }
    if let Some(first) = paragraph.fragments.first_mut() {
        first.text = substituted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::document::types::{Block, Fragment, Table, TableCell, TableRow};

    fn replacements(entries: &[(&str, SubstitutionStyle, Option<&str>)]) -> ReplacementMap {
        entries
            .iter()
            .map(|(name, style, value)| {
                (
                    name.to_string(),
                    (*style, value.map(|v| v.to_string())),
                )
            })
            .collect()
    }

    fn paragraph_of(fragments: &[&str]) -> Paragraph {
        Paragraph {
            fragments: fragments.iter().map(|t| Fragment::new(*t)).collect(),
            props_xml: None,
        }
    }

    #[test]
    fn token_straddling_fragments_is_substituted() {
        let doc = Document {
            body: vec![Block::Paragraph(paragraph_of(&[
                "Hello {{", "NA", "ME}}", "!",
            ]))],
            headers: vec![],
            footers: vec![],
        };
        let map = replacements(&[("NAME", SubstitutionStyle::Replace, Some("Ann"))]);

        let filled = instantiate(&doc, &map);
        if let Block::Paragraph(p) = &filled.body[0] {
            assert_eq!(p.fragments[0].text, "Hello Ann!");
            assert!(p.fragments[1..].iter().all(|f| f.text.is_empty()));
        } else {
            panic!("expected paragraph");
        }
    }

    #[test]
    fn right_field_renders_after_a_trailing_colon_fragment() {
        let doc = Document {
            body: vec![Block::Paragraph(paragraph_of(&["balance", " : ", "end"]))],
            headers: vec![],
            footers: vec![],
        };
        let map = replacements(&[("balance", SubstitutionStyle::Right, Some("100"))]);

        let filled = instantiate(&doc, &map);
        if let Block::Paragraph(p) = &filled.body[0] {
            assert_eq!(p.text(), "balance: 100end");
        } else {
            panic!("expected paragraph");
        }
    }

    #[test]
    fn right_field_without_colon_fragment_is_untouched() {
        let doc = Document {
            body: vec![Block::Paragraph(paragraph_of(&["balance", " due"]))],
            headers: vec![],
            footers: vec![],
        };
        let map = replacements(&[("balance", SubstitutionStyle::Right, Some("100"))]);

        let filled = instantiate(&doc, &map);
        if let Block::Paragraph(p) = &filled.body[0] {
            assert_eq!(p.text(), "balance due");
        } else {
            panic!("expected paragraph");
        }
    }

    // A label inside a single fragment is not a Right match; only the Replace
    // token substitutes in place.
    #[test]
    fn inline_label_text_is_not_a_right_match() {
        let doc = Document {
            body: vec![Block::Paragraph(paragraph_of(&["Hello {{NAME}}, balance: "]))],
            headers: vec![],
            footers: vec![],
        };
        let map = replacements(&[
            ("NAME", SubstitutionStyle::Replace, Some("Ann")),
            ("balance", SubstitutionStyle::Right, Some("100")),
        ]);

        let filled = instantiate(&doc, &map);
        if let Block::Paragraph(p) = &filled.body[0] {
            assert_eq!(p.text(), "Hello Ann, balance: ");
            assert!(!p.text().contains("NAME: Ann"));
        } else {
            panic!("expected paragraph");
        }
    }

    #[test]
    fn null_value_substitutes_to_empty_and_unknown_tokens_survive() {
        let doc = Document {
            body: vec![Block::Paragraph(paragraph_of(&["{{GONE}} {{UNBOUND}}"]))],
            headers: vec![],
            footers: vec![],
        };
        let map = replacements(&[("GONE", SubstitutionStyle::Replace, None)]);

        let filled = instantiate(&doc, &map);
        if let Block::Paragraph(p) = &filled.body[0] {
            assert_eq!(p.text(), " {{UNBOUND}}");
        } else {
            panic!("expected paragraph");
        }
    }

    #[test]
    fn substitution_reaches_tables_headers_and_footers() {
        let doc = Document {
            body: vec![Block::Table(Table {
                rows: vec![TableRow {
                    cells: vec![TableCell {
                        paragraphs: vec![paragraph_of(&["{{CELL}}"])],
                    }],
                }],
            })],
            headers: vec![vec![paragraph_of(&["{{HEAD}}"])]],
            footers: vec![vec![paragraph_of(&["{{FOOT}}"])]],
        };
        let map = replacements(&[
            ("CELL", SubstitutionStyle::Replace, Some("c")),
            ("HEAD", SubstitutionStyle::Replace, Some("h")),
            ("FOOT", SubstitutionStyle::Replace, Some("f")),
        ]);

        let filled = instantiate(&doc, &map);
        assert_eq!(filled.plain_text(), "c\nh\nf\n");
    }

    #[test]
    fn first_fragment_style_survives_collapse() {
        let doc = Document {
            body: vec![Block::Paragraph(Paragraph {
                fragments: vec![
                    Fragment {
                        text: "{{A}}".to_string(),
                        props_xml: Some("<w:b/>".to_string()),
                    },
                    Fragment {
                        text: " tail".to_string(),
                        props_xml: Some("<w:i/>".to_string()),
                    },
                ],
                props_xml: None,
            })],
            headers: vec![],
            footers: vec![],
        };
        let map = replacements(&[("A", SubstitutionStyle::Replace, Some("x"))]);

        let filled = instantiate(&doc, &map);
        if let Block::Paragraph(p) = &filled.body[0] {
            assert_eq!(p.fragments[0].text, "x tail");
            assert_eq!(p.fragments[0].props_xml.as_deref(), Some("<w:b/>"));
            assert_eq!(p.fragments[1].text, "");
        } else {
            panic!("expected paragraph");
        }
    }
}
