use formscrub::{PdfDocument, SanitizationEngine, ZoneMap};
use lopdf::Object;

use crate::fixtures::{contains_text, form_pdf, page_operations, page_text, FILLED_PAGE};

fn redact(zone_file: &str) -> (PdfDocument, Vec<u8>, formscrub::SanitizeReport) {
    let zones = ZoneMap::parse(zone_file).unwrap();
    let engine = SanitizationEngine::default();
    let (output, report) = engine.sanitize_bytes(&form_pdf(FILLED_PAGE), Some(&zones)).unwrap();
    let doc = PdfDocument::from_bytes(&output).unwrap();
    (doc, output, report)
}

fn draws_image(doc: &PdfDocument) -> bool {
    page_operations(doc, 0).iter().any(|op| op.operator == "Do")
}

fn image_objects(doc: &PdfDocument) -> usize {
    doc.inner()
        .objects
        .values()
        .filter_map(|obj| obj.as_stream().ok())
        .filter(|stream| matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(name)) if name == b"Image"))
        .count()
}

#[test]
fn test_zone_removes_typed_text_only() {
    let (doc, output, report) = redact(r#"{"0": [{"x1": 72, "y1": 120, "x2": 540, "y2": 170}]}"#);
    assert_eq!(report.zones_applied, 1);
    assert_eq!(report.zones_skipped, 0);
    assert_eq!(report.glyphs_removed, 10);
    assert_eq!(report.images_removed, 0);

    assert_eq!(page_text(&doc, 0), "Template footer");
    assert!(draws_image(&doc));
    assert!(!contains_text(&output, "John Smith"));
}

#[test]
fn test_full_page_zone_removes_all_text_and_images() {
    let (doc, _, report) = redact(r#"{"0": [{"x1": 0, "y1": 0, "x2": 612, "y2": 792}]}"#);
    assert_eq!(report.zones_applied, 1);
    assert_eq!(report.images_removed, 1);

    assert_eq!(page_text(&doc, 0), "");
    assert!(!draws_image(&doc));
    assert_eq!(image_objects(&doc), 0);
}

#[test]
fn test_zone_outside_page_is_skipped() {
    let (doc, _, report) = redact(
        r#"{"0": [{"x1": 700, "y1": 800, "x2": 900, "y2": 1000}], "3": [{"x1": 0, "y1": 0, "x2": 10, "y2": 10}]}"#,
    );
    assert_eq!(report.zones_applied, 0);
    assert_eq!(report.zones_skipped, 2);
    assert_eq!(page_text(&doc, 0), "John SmithTemplate footer");
}

#[test]
fn test_malformed_entries_do_not_stop_the_rest() {
    let (doc, _, report) = redact(
        r#"{"0": [{"x1": 72, "y1": 120}, {"x1": 72, "y1": 120, "x2": 540, "y2": 170}], "first": []}"#,
    );
    assert_eq!(report.zones_applied, 1);
    assert_eq!(page_text(&doc, 0), "Template footer");
}
