//! services/api/src/adapters/pdf_local.rs
//!
//! Local PDF text extraction, used by the budget processing routes that skip
//! the hosted parsing service. Extraction is CPU-bound and runs on the
//! blocking pool.

use async_trait::async_trait;
use studius_core::{
    domain::{ParseMode, ParsedDocument},
    ports::{DocumentParsingService, PortError, PortResult},
};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `DocumentParsingService` with in-process
/// extraction of the PDF text layer. Scanned documents come back empty; OCR
/// requires the hosted service.
#[derive(Clone)]
pub struct LocalPdfExtractor;

impl LocalPdfExtractor {
    /// Creates a new `LocalPdfExtractor`.
    pub fn new() -> Self {
        Self
    }
}

impl Default for LocalPdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Joins per-page text, dropping pages with no text layer.
fn join_pages(pages: &[String]) -> String {
    pages
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

//=========================================================================================
// `DocumentParsingService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentParsingService for LocalPdfExtractor {
    async fn parse_pdf(
        &self,
        data: &[u8],
        _filename: &str,
        _mode: ParseMode,
    ) -> PortResult<ParsedDocument> {
        let data = data.to_vec();
        let pages = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem_by_pages(&data)
        })
        .await
        .map_err(|e| PortError::Unexpected(format!("Extraction task failed: {}", e)))?
        .map_err(|e| PortError::Unexpected(format!("Could not extract PDF text: {}", e)))?;

        let page_count = pages.len().max(1) as i32;
        Ok(ParsedDocument {
            text: join_pages(&pages),
            page_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    /// Builds a minimal PDF with one page of Helvetica text per entry.
    fn make_test_pdf(pages_text: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages_text {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![100.into(), 600.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[tokio::test]
    async fn extracts_text_and_counts_pages() {
        let pdf = make_test_pdf(&["Photosynthesis converts light into glucose."]);
        let parsed = LocalPdfExtractor::new()
            .parse_pdf(&pdf, "notes.pdf", ParseMode::Fast)
            .await
            .unwrap();
        assert!(parsed.text.contains("Photosynthesis"));
        assert_eq!(parsed.page_count, 1);
    }

    #[tokio::test]
    async fn counts_multiple_pages() {
        let pdf = make_test_pdf(&["First page of notes.", "Second page of notes."]);
        let parsed = LocalPdfExtractor::new()
            .parse_pdf(&pdf, "notes.pdf", ParseMode::Fast)
            .await
            .unwrap();
        assert_eq!(parsed.page_count, 2);
        assert!(parsed.text.contains("First page"));
        assert!(parsed.text.contains("Second page"));
    }

    #[tokio::test]
    async fn rejects_bytes_that_are_not_a_pdf() {
        let result = LocalPdfExtractor::new()
            .parse_pdf(b"plain text, not a pdf", "notes.txt", ParseMode::Fast)
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn join_pages_drops_blank_pages() {
        let pages = vec![
            "  Prima pagina  ".to_string(),
            "   ".to_string(),
            "Seconda".to_string(),
        ];
        assert_eq!(join_pages(&pages), "Prima pagina\n\nSeconda");
    }
}
