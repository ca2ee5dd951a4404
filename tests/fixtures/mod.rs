//! In-memory PDF forms for the integration tests

#![allow(dead_code)]

use formscrub::PdfDocument;
use lopdf::content::Content;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

/// Page content of a filled form: typed-in text near the top, template text
/// near the bottom, and a 100x100 image at (300, 300).
pub const FILLED_PAGE: &[u8] = b"BT /F1 12 Tf 72 640 Td (John Smith) Tj ET \
BT /F1 12 Tf 72 100 Td (Template footer) Tj ET \
q 100 0 0 100 300 300 cm /Im1 Do Q";

/// Page content with template text only
pub const TEMPLATE_PAGE: &[u8] = b"BT /F1 12 Tf 72 100 Td (Template footer) Tj ET";

/// Object ids of the interesting parts of [`form_document`]
#[derive(Debug, Clone, Copy)]
pub struct FormIds {
    pub page: ObjectId,
    pub name: ObjectId,
    pub agree: ObjectId,
    pub choice: ObjectId,
    pub state: ObjectId,
    pub colors: ObjectId,
    pub signature: ObjectId,
    pub free_text: ObjectId,
    pub link: ObjectId,
}

fn appearance(doc: &mut Document, content: &[u8]) -> ObjectId {
    doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![0.into(), 0.into(), 200.into(), 20.into()],
        },
        content.to_vec(),
    ))
}

fn widget(page_id: ObjectId, rect: [i64; 4], mut entries: Dictionary) -> Dictionary {
    entries.set("Type", "Annot");
    entries.set("Subtype", "Widget");
    entries.set("P", page_id);
    entries.set("Rect", rect.iter().map(|v| Object::Integer(*v)).collect::<Vec<_>>());
    entries
}

/// One-page form holding a value in every kind of field, a FreeText note,
/// a link, an embedded file and XFA data. `page_content` becomes the page's
/// content stream.
pub fn form_document(page_content: &[u8]) -> (Document, FormIds) {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let page_id = doc.new_object_id();

    let name_ap = appearance(&mut doc, b"/Tx BMC BT /Helv 10 Tf 2 5 Td (John Smith) Tj ET EMC");
    let name = doc.add_object(widget(
        page_id,
        [72, 700, 300, 720],
        dictionary! {
            "FT" => "Tx",
            "T" => Object::string_literal("name"),
            "V" => Object::string_literal("John Smith"),
            "AP" => dictionary! { "N" => name_ap },
        },
    ));

    let yes_ap = appearance(&mut doc, b"q 0 0 1 rg 2 2 10 10 re f Q");
    let off_ap = appearance(&mut doc, b"q Q");
    let agree = doc.add_object(widget(
        page_id,
        [72, 660, 86, 674],
        dictionary! {
            "FT" => "Btn",
            "T" => Object::string_literal("agree"),
            "V" => "Yes",
            "AS" => "Yes",
            "AP" => dictionary! { "N" => dictionary! { "Yes" => yes_ap, "Off" => off_ap } },
        },
    ));

    // Radio group: the value sits on the parent, the kids only carry /AS.
    let choice = doc.new_object_id();
    let option_a = doc.add_object(widget(
        page_id,
        [72, 620, 86, 634],
        dictionary! {
            "Parent" => choice,
            "AS" => "Off",
            "AP" => dictionary! { "N" => dictionary! { "A" => yes_ap, "Off" => off_ap } },
        },
    ));
    let option_b = doc.add_object(widget(
        page_id,
        [100, 620, 114, 634],
        dictionary! {
            "Parent" => choice,
            "AS" => "B",
            "AP" => dictionary! { "N" => dictionary! { "B" => yes_ap, "Off" => off_ap } },
        },
    ));
    doc.objects.insert(
        choice,
        Object::Dictionary(dictionary! {
            "FT" => "Btn",
            "Ff" => 1 << 15,
            "T" => Object::string_literal("choice"),
            "V" => "B",
            "Kids" => vec![Object::Reference(option_a), Object::Reference(option_b)],
        }),
    );

    let state = doc.add_object(widget(
        page_id,
        [72, 580, 200, 600],
        dictionary! {
            "FT" => "Ch",
            "Ff" => 1 << 17,
            "T" => Object::string_literal("state"),
            "Opt" => vec![Object::string_literal("CA"), Object::string_literal("NY")],
            "V" => Object::string_literal("CA"),
        },
    ));

    let colors = doc.add_object(widget(
        page_id,
        [72, 500, 200, 560],
        dictionary! {
            "FT" => "Ch",
            "Ff" => 1 << 21,
            "T" => Object::string_literal("colors"),
            "Opt" => vec![
                Object::string_literal("Red"),
                Object::string_literal("Green"),
                Object::string_literal("Blue"),
            ],
            "V" => vec![Object::string_literal("Red"), Object::string_literal("Blue")],
            "I" => vec![0.into(), 2.into()],
        },
    ));

    let signature_value = doc.add_object(dictionary! {
        "Type" => "Sig",
        "Filter" => "Adobe.PPKLite",
        "Name" => Object::string_literal("Jane Signer"),
        "Contents" => Object::String(vec![0xAB; 16], lopdf::StringFormat::Hexadecimal),
    });
    let signature = doc.add_object(widget(
        page_id,
        [300, 100, 500, 140],
        dictionary! {
            "FT" => "Sig",
            "T" => Object::string_literal("signature"),
            "V" => signature_value,
        },
    ));

    let free_text = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "FreeText",
        "Rect" => vec![300.into(), 700.into(), 500.into(), 740.into()],
        "Contents" => Object::string_literal("private note"),
        "DA" => Object::string_literal("/Helv 10 Tf 0 g"),
    });
    let link = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Link",
        "Rect" => vec![72.into(), 40.into(), 200.into(), 60.into()],
        "A" => dictionary! { "S" => "URI", "URI" => Object::string_literal("https://example.org") },
    });

    let image = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 1,
            "Height" => 1,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
        },
        vec![0x42],
    ));
    let font = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let content = doc.add_object(Stream::new(dictionary! {}, page_content.to_vec()));

    doc.objects.insert(
        page_id,
        Object::Dictionary(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font },
                "XObject" => dictionary! { "Im1" => image },
            },
            "Annots" => vec![
                Object::Reference(name),
                Object::Reference(agree),
                Object::Reference(option_a),
                Object::Reference(option_b),
                Object::Reference(state),
                Object::Reference(colors),
                Object::Reference(signature),
                Object::Reference(free_text),
                Object::Reference(link),
            ],
        }),
    );
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );

    let attachment = doc.add_object(Stream::new(
        dictionary! { "Type" => "EmbeddedFile" },
        b"secret attachment".to_vec(),
    ));
    let filespec = doc.add_object(dictionary! {
        "Type" => "Filespec",
        "F" => Object::string_literal("notes.txt"),
        "EF" => dictionary! { "F" => attachment },
    });
    let xfa = doc.add_object(Stream::new(
        dictionary! {},
        b"<xfa:datasets><name>John Smith</name></xfa:datasets>".to_vec(),
    ));

    let catalog = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
        "AcroForm" => dictionary! {
            "Fields" => vec![
                Object::Reference(name),
                Object::Reference(agree),
                Object::Reference(choice),
                Object::Reference(state),
                Object::Reference(colors),
                Object::Reference(signature),
            ],
            "XFA" => xfa,
        },
        "Names" => dictionary! {
            "EmbeddedFiles" => dictionary! {
                "Names" => vec![Object::string_literal("notes.txt"), Object::Reference(filespec)],
            },
        },
    });
    doc.trailer.set("Root", catalog);

    let ids = FormIds {
        page: page_id,
        name,
        agree,
        choice,
        state,
        colors,
        signature,
        free_text,
        link,
    };
    (doc, ids)
}

/// A saved copy of [`form_document`].
pub fn form_pdf(page_content: &[u8]) -> Vec<u8> {
    let (mut doc, _) = form_document(page_content);
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// One text field shown twice: a parent holding the value and two kid
/// widgets, each with an appearance drawing that value.
pub fn shared_field_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let page_id = doc.new_object_id();
    let parent_id = doc.new_object_id();

    let mut kids = Vec::new();
    for y in [700, 100] {
        let ap = appearance(&mut doc, b"/Tx BMC BT /Helv 10 Tf 2 5 Td (John Smith) Tj ET EMC");
        kids.push(Object::Reference(doc.add_object(widget(
            page_id,
            [72, y, 300, y + 20],
            dictionary! {
                "Parent" => parent_id,
                "AP" => dictionary! { "N" => ap },
            },
        ))));
    }
    doc.objects.insert(
        parent_id,
        Object::Dictionary(dictionary! {
            "FT" => "Tx",
            "T" => Object::string_literal("name"),
            "V" => Object::string_literal("John Smith"),
            "Kids" => kids.clone(),
        }),
    );

    let content = doc.add_object(Stream::new(dictionary! {}, TEMPLATE_PAGE.to_vec()));
    doc.objects.insert(
        page_id,
        Object::Dictionary(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content,
            "Annots" => kids,
        }),
    );
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
        "AcroForm" => dictionary! { "Fields" => vec![Object::Reference(parent_id)] },
    });
    doc.trailer.set("Root", catalog);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// Whether `needle` survives anywhere in the file: in a string object or in
/// the decoded data of any stream.
pub fn contains_text(bytes: &[u8], needle: &str) -> bool {
    let needle = needle.as_bytes();
    let found = |haystack: &[u8]| haystack.windows(needle.len()).any(|w| w == needle);
    let doc = Document::load_mem(bytes).unwrap();
    doc.objects.values().any(|obj| object_contains(obj, &found))
}

fn object_contains(obj: &Object, found: &dyn Fn(&[u8]) -> bool) -> bool {
    match obj {
        Object::String(bytes, _) => found(bytes),
        Object::Array(items) => items.iter().any(|item| object_contains(item, found)),
        Object::Dictionary(dict) => dict_contains(dict, found),
        Object::Stream(stream) => {
            let data = stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone());
            found(&data) || dict_contains(&stream.dict, found)
        }
        _ => false,
    }
}

fn dict_contains(dict: &Dictionary, found: &dyn Fn(&[u8]) -> bool) -> bool {
    dict.iter().any(|(_, value)| object_contains(value, found))
}

/// Text shown by the page's content stream, strings concatenated.
pub fn page_text(doc: &PdfDocument, index: usize) -> String {
    let mut text = String::new();
    for op in page_operations(doc, index) {
        let items = match op.operator.as_str() {
            "TJ" => op.operands[0].as_array().cloned().unwrap_or_default(),
            "Tj" | "'" | "\"" => op.operands.clone(),
            _ => continue,
        };
        for item in items {
            if let Object::String(bytes, _) = item {
                text.push_str(&String::from_utf8_lossy(&bytes));
            }
        }
    }
    text
}

pub fn page_operations(doc: &PdfDocument, index: usize) -> Vec<lopdf::content::Operation> {
    let page_id = doc.page_id(index).unwrap();
    let raw = doc.inner().get_page_content(page_id).unwrap();
    Content::decode(&raw).unwrap().operations
}
