use formscrub::config::{AnnotationScope, Method, Mode, SanitizeConfig};
use formscrub::types::{AnnotationKind, FieldKind, FieldValue};
use formscrub::{PdfDocument, SanitizationEngine, StrategyKind};
use lopdf::{dictionary, Object};
use tempfile::TempDir;

use crate::fixtures::{
    contains_text, form_document, form_pdf, page_operations, page_text, shared_field_pdf, TEMPLATE_PAGE,
};

fn sanitize(config: SanitizeConfig, input: &[u8]) -> (PdfDocument, Vec<u8>, formscrub::SanitizeReport) {
    let engine = SanitizationEngine::new(config);
    let (output, report) = engine.sanitize_bytes(input, None).unwrap();
    let doc = PdfDocument::from_bytes(&output).unwrap();
    (doc, output, report)
}

fn value_of(doc: &PdfDocument, name: &str) -> FieldValue {
    let widgets = doc.all_widgets().unwrap();
    let widget = widgets.iter().find(|w| w.name == name).unwrap();
    doc.field_value(widget)
}

fn annotation_count(doc: &PdfDocument, kind: AnnotationKind) -> usize {
    doc.annotations(0)
        .unwrap()
        .into_iter()
        .filter(|annotation| annotation.kind == kind)
        .count()
}

#[test]
fn test_text_field_is_emptied() {
    let input = form_pdf(TEMPLATE_PAGE);
    let before = PdfDocument::from_bytes(&input).unwrap();
    assert_eq!(value_of(&before, "name"), FieldValue::Text("John Smith".into()));

    let (doc, output, report) = sanitize(SanitizeConfig::default(), &input);
    assert_eq!(report.strategy, StrategyKind::Primary);
    assert_eq!(value_of(&doc, "name"), FieldValue::Text(String::new()));
    assert!(!contains_text(&output, "John Smith"));
}

#[test]
fn test_checkbox_is_unchecked() {
    let input = form_pdf(TEMPLATE_PAGE);
    let before = PdfDocument::from_bytes(&input).unwrap();
    assert_eq!(value_of(&before, "agree"), FieldValue::Bool(true));

    let (doc, _, _) = sanitize(SanitizeConfig::default(), &input);
    assert_eq!(value_of(&doc, "agree"), FieldValue::Bool(false));

    // The on/off glyphs of the template survive
    let widgets = doc.all_widgets().unwrap();
    let agree = widgets.iter().find(|w| w.name == "agree").unwrap();
    let annot = doc.dict(agree.annot_id).unwrap();
    assert!(annot.has(b"AP"));
    assert_eq!(annot.get(b"AS").unwrap().as_name().unwrap(), b"Off");
}

#[test]
fn test_every_field_kind_ends_empty() {
    let (doc, output, report) = sanitize(SanitizeConfig::default(), &form_pdf(TEMPLATE_PAGE));
    assert_eq!(report.fields_seen, 7);
    assert_eq!(report.fields_cleared, 7);
    assert_eq!(report.fields_failed, 0);

    let widgets = doc.all_widgets().unwrap();
    assert_eq!(widgets.len(), 7);
    for widget in &widgets {
        assert!(
            doc.field_value(widget).is_empty(),
            "{} still holds {:?}",
            widget.name,
            doc.field_value(widget)
        );
    }
    let kinds: Vec<FieldKind> = widgets.iter().map(|w| w.kind).collect();
    for kind in [
        FieldKind::Text,
        FieldKind::Checkbox,
        FieldKind::Radio,
        FieldKind::Combobox,
        FieldKind::Listbox,
        FieldKind::Signature,
    ] {
        assert!(kinds.contains(&kind), "fixture lacks a {:?} field", kind);
    }

    assert!(!contains_text(&output, "Jane Signer"));
}

#[test]
fn test_form_asks_viewers_to_redraw_and_loses_xfa() {
    let (doc, output, _) = sanitize(SanitizeConfig::default(), &form_pdf(TEMPLATE_PAGE));
    let form = doc.catalog().unwrap().get(b"AcroForm").unwrap();
    let form = doc.resolve(form).unwrap().as_dict().unwrap();
    assert_eq!(form.get(b"NeedAppearances").unwrap(), &Object::Boolean(true));
    assert!(!form.has(b"XFA"));
    assert!(!contains_text(&output, "xfa:datasets"));
}

#[test]
fn test_keep_xfa_leaves_datasets() {
    let config = SanitizeConfig {
        strip_xfa: false,
        ..SanitizeConfig::default()
    };
    let (doc, _, _) = sanitize(config, &form_pdf(TEMPLATE_PAGE));
    let form = doc.catalog().unwrap().get(b"AcroForm").unwrap();
    assert!(doc.resolve(form).unwrap().as_dict().unwrap().has(b"XFA"));
}

#[test]
fn test_free_text_removed_link_kept() {
    let input = form_pdf(TEMPLATE_PAGE);
    let before = PdfDocument::from_bytes(&input).unwrap();
    assert_eq!(annotation_count(&before, AnnotationKind::FreeText), 1);

    let (doc, output, report) = sanitize(SanitizeConfig::default(), &input);
    assert_eq!(report.annotations_removed, 1);
    assert_eq!(annotation_count(&doc, AnnotationKind::FreeText), 0);
    assert_eq!(annotation_count(&doc, AnnotationKind::Link), 1);
    assert!(!contains_text(&output, "private note"));
}

#[test]
fn test_all_annotation_scope_keeps_only_widgets() {
    let config = SanitizeConfig {
        annotation_scope: AnnotationScope::All,
        ..SanitizeConfig::default()
    };
    let (doc, _, report) = sanitize(config, &form_pdf(TEMPLATE_PAGE));
    assert_eq!(report.annotations_removed, 2);
    let annotations = doc.annotations(0).unwrap();
    assert_eq!(annotations.len(), 7);
    assert!(annotations.iter().all(|a| a.kind == AnnotationKind::Widget));
}

#[test]
fn test_embedded_files_are_removed() {
    let input = form_pdf(TEMPLATE_PAGE);
    assert_eq!(PdfDocument::from_bytes(&input).unwrap().embedded_file_count().unwrap(), 1);

    let (doc, output, report) = sanitize(SanitizeConfig::default(), &input);
    assert_eq!(report.embedded_files_removed, 1);
    assert_eq!(report.embedded_files_failed, 0);
    assert_eq!(doc.embedded_file_count().unwrap_or(0), 0);
    assert!(!contains_text(&output, "secret attachment"));
}

#[test]
fn test_second_run_changes_nothing() {
    let (first_doc, first, _) = sanitize(SanitizeConfig::default(), &form_pdf(TEMPLATE_PAGE));
    let (second_doc, _, report) = sanitize(SanitizeConfig::default(), &first);

    assert_eq!(report.strategy, StrategyKind::Primary);
    assert_eq!(report.fields_cleared, 0);
    assert_eq!(report.fields_forced, 0);
    assert_eq!(report.annotations_removed, 0);
    assert_eq!(report.embedded_files_removed, 0);

    let values = |doc: &PdfDocument| -> Vec<(String, FieldValue)> {
        doc.all_widgets()
            .unwrap()
            .iter()
            .map(|w| (w.name.clone(), doc.field_value(w)))
            .collect()
    };
    assert_eq!(values(&first_doc), values(&second_doc));
}

#[test]
fn test_purge_mode_removes_the_form() {
    let config = SanitizeConfig {
        mode: Mode::Purge,
        ..SanitizeConfig::default()
    };
    let (doc, output, report) = sanitize(config, &form_pdf(TEMPLATE_PAGE));
    assert_eq!(report.widgets_removed, 7);
    assert!(doc.all_widgets().unwrap().is_empty());
    assert_eq!(annotation_count(&doc, AnnotationKind::Link), 1);

    let form = doc.catalog().unwrap().get(b"AcroForm").unwrap();
    let form = doc.resolve(form).unwrap().as_dict().unwrap();
    assert!(form.get(b"Fields").unwrap().as_array().unwrap().is_empty());

    for secret in ["John Smith", "Jane Signer", "private note", "secret attachment"] {
        assert!(!contains_text(&output, secret), "{} survived purging", secret);
    }
}

#[test]
fn test_flatten_mode_draws_the_empty_form() {
    let config = SanitizeConfig {
        mode: Mode::Flatten,
        ..SanitizeConfig::default()
    };
    let (doc, output, report) = sanitize(config, &form_pdf(TEMPLATE_PAGE));
    assert_eq!(report.strategy, StrategyKind::Primary);
    assert_eq!(report.fields_cleared, 7);
    // The checkbox and both radio buttons still have an off appearance
    assert_eq!(report.widgets_flattened, 3);
    assert_eq!(report.widgets_removed, 7);

    assert!(doc.all_widgets().unwrap().is_empty());
    assert_eq!(annotation_count(&doc, AnnotationKind::Link), 1);
    let form = doc.catalog().unwrap().get(b"AcroForm").unwrap();
    let form = doc.resolve(form).unwrap().as_dict().unwrap();
    assert!(form.get(b"Fields").unwrap().as_array().unwrap().is_empty());

    let ops = page_operations(&doc, 0);
    assert_eq!(ops.iter().filter(|op| op.operator == "Do").count(), 3);
    assert_eq!(page_text(&doc, 0), "Template footer");
    for secret in ["John Smith", "Jane Signer", "private note"] {
        assert!(!contains_text(&output, secret), "{} survived flattening", secret);
    }
}

#[test]
fn test_fallback_strategy_clears_structurally() {
    let config = SanitizeConfig {
        method: Method::Fallback,
        ..SanitizeConfig::default()
    };
    let (doc, output, report) = sanitize(config, &form_pdf(TEMPLATE_PAGE));
    assert_eq!(report.strategy, StrategyKind::Fallback);
    assert!(report.fields_cleared > 0);
    assert_eq!(report.annotations_removed, 1);

    for secret in ["John Smith", "Jane Signer", "private note"] {
        assert!(!contains_text(&output, secret), "{} survived the fallback", secret);
    }
    for widget in doc.all_widgets().unwrap() {
        assert!(doc.field_value(&widget).is_empty(), "{} still holds a value", widget.name);
    }
}

#[test]
fn test_widget_written_into_annots_is_cleared() {
    let (mut doc, ids) = form_document(TEMPLATE_PAGE);
    let page = doc.get_object_mut(ids.page).unwrap().as_dict_mut().unwrap();
    page.get_mut(b"Annots").unwrap().as_array_mut().unwrap().push(Object::Dictionary(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Widget",
        "FT" => "Tx",
        "T" => Object::string_literal("inline"),
        "V" => Object::string_literal("Inline Secret"),
        "Rect" => vec![72.into(), 300.into(), 200.into(), 320.into()],
    }));
    let mut input = Vec::new();
    doc.save_to(&mut input).unwrap();

    let (doc, output, report) = sanitize(SanitizeConfig::default(), &input);
    assert_eq!(report.fields_seen, 8);
    assert_eq!(report.fields_cleared, 8);
    assert_eq!(value_of(&doc, "inline"), FieldValue::Text(String::new()));
    assert!(!contains_text(&output, "Inline Secret"));
}

#[test]
fn test_sibling_widgets_lose_their_appearances() {
    let input = shared_field_pdf();
    let before = PdfDocument::from_bytes(&input).unwrap();
    assert_eq!(before.all_widgets().unwrap().len(), 2);

    let config = SanitizeConfig {
        compress: false,
        ..SanitizeConfig::default()
    };
    let (doc, output, report) = sanitize(config, &input);
    assert_eq!(report.fields_seen, 2);
    assert!(!contains_text(&output, "John Smith"));
    for widget in doc.all_widgets().unwrap() {
        assert!(doc.field_value(&widget).is_empty());
        assert!(!doc.dict(widget.annot_id).unwrap().has(b"AP"));
    }
}

#[test]
fn test_unreadable_input_is_an_error() {
    let engine = SanitizationEngine::default();
    assert!(engine.sanitize_bytes(b"%PDF-1.7 garbage", None).is_err());
}

#[tokio::test]
async fn test_sanitize_file_writes_output_and_report() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("form_CA.pdf");
    tokio::fs::write(&input, form_pdf(TEMPLATE_PAGE)).await.unwrap();
    let output = formscrub::default_output_path(&input, Mode::Clear);

    let engine = SanitizationEngine::default();
    let report = engine.sanitize_file(&input, &output, None).await.unwrap();
    assert_eq!(output.file_name().unwrap(), "form_CA_cleared.pdf");
    assert_eq!(report.input.as_deref(), Some(input.as_path()));
    assert!(report.finished_at.is_some());
    assert!(report.objects_pruned > 0);

    let written = tokio::fs::read(&output).await.unwrap();
    assert!(!contains_text(&written, "John Smith"));

    let report_path = dir.path().join("report.json");
    report.write_json(&report_path).await.unwrap();
    let json: serde_json::Value =
        serde_json::from_str(&tokio::fs::read_to_string(&report_path).await.unwrap()).unwrap();
    assert_eq!(json["strategy"], "primary");
    assert_eq!(json["fields_cleared"], 7);
}

#[tokio::test]
async fn test_missing_input_leaves_no_output() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("absent.pdf");
    let output = dir.path().join("absent_cleared.pdf");
    let engine = SanitizationEngine::default();
    assert!(engine.sanitize_file(&input, &output, None).await.is_err());
    assert!(!output.exists());
}
