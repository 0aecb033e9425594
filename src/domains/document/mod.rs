pub mod docx;
pub mod types;

pub use docx::{read_docx, write_docx, CANONICAL_EXTENSION};
pub use types::{Block, Document, Fragment, Paragraph, Table, TableCell, TableRow};
