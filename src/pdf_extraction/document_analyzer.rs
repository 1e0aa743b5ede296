use anyhow::Result;
use lopdf::{Dictionary, Document, Object, ObjectId};

/// What a page exposes through its resource dictionary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageFingerprint {
    pub page: usize,
    pub font_count: usize,   // entries under /Font, own or inherited
    pub image_count: usize,  // image XObjects
    pub content_bytes: usize,
}

impl PageFingerprint {
    /// No embedded fonts means the page can only be read visually.
    pub fn is_scanned(&self) -> bool {
        self.font_count == 0
    }
}

/// Inspects page resources for routing decisions
pub struct DocumentAnalyzer;

impl DocumentAnalyzer {
    /// Fingerprint a single page
    pub fn analyze_page(document: &Document, page: usize, page_id: ObjectId) -> Result<PageFingerprint> {
        let page_dict = document.get_object(page_id)?.as_dict()?;

        let mut fingerprint = PageFingerprint {
            page,
            ..PageFingerprint::default()
        };

        if let Some(resources) = inherited_resources(document, page_dict) {
            fingerprint.font_count = count_fonts(document, resources);
            fingerprint.image_count = count_images(document, resources);
        }

        if let Ok(contents) = page_dict.get(b"Contents") {
            fingerprint.content_bytes = get_content_data(document, contents)
                .map(|d| d.len())
                .unwrap_or(0);
        }

        tracing::debug!(
            page,
            fonts = fingerprint.font_count,
            images = fingerprint.image_count,
            "page fingerprint"
        );
        Ok(fingerprint)
    }
}

// Resolve a reference to a dictionary, or pass an inline one through
fn resolve_dict<'a>(document: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match obj {
        Object::Reference(id) => match document.get_object(*id) {
            Ok(Object::Dictionary(dict)) => Some(dict),
            _ => None,
        },
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

// Resources may live on the page or on any ancestor in the page tree
fn inherited_resources<'a>(document: &'a Document, page: &'a Dictionary) -> Option<&'a Dictionary> {
    let mut node = page;
    // Guard against malformed cyclic /Parent chains
    for _ in 0..32 {
        if let Some(resources) = node.get(b"Resources").ok().and_then(|r| resolve_dict(document, r)) {
            return Some(resources);
        }
        node = node.get(b"Parent").ok().and_then(|p| resolve_dict(document, p))?;
    }
    None
}

fn count_fonts(document: &Document, resources: &Dictionary) -> usize {
    resources
        .get(b"Font")
        .ok()
        .and_then(|f| resolve_dict(document, f))
        .map(|fonts| fonts.len())
        .unwrap_or(0)
}

fn count_images(document: &Document, resources: &Dictionary) -> usize {
    let xobjects = match resources.get(b"XObject").ok().and_then(|x| resolve_dict(document, x)) {
        Some(dict) => dict,
        None => return 0,
    };

    xobjects
        .iter()
        .filter(|(_, obj)| {
            let stream = match obj {
                Object::Reference(id) => match document.get_object(*id) {
                    Ok(Object::Stream(s)) => s,
                    _ => return false,
                },
                Object::Stream(s) => s,
                _ => return false,
            };
            matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(name)) if name == b"Image")
        })
        .count()
}

/// Concatenated, decompressed content of a /Contents entry
pub fn get_content_data(document: &Document, contents: &Object) -> Result<Vec<u8>> {
    match contents {
        Object::Reference(r) => {
            let obj = document.get_object(*r)?;
            get_content_data(document, obj)
        }
        Object::Stream(stream) => {
            // Uncompressed streams report an error from decompressed_content
            Ok(stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone()))
        }
        Object::Array(arr) => {
            let mut data = Vec::new();
            for item in arr {
                let item_data = get_content_data(document, item)?;
                data.extend_from_slice(&item_data);
                data.push(b'\n');
            }
            Ok(data)
        }
        _ => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Stream};

    fn build_page(with_font: bool, inherited: bool) -> (Document, ObjectId) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources = if with_font {
            dictionary! { "Font" => dictionary! { "F1" => font_id } }
        } else {
            dictionary! {}
        };
        let resources_id = doc.add_object(resources);

        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            b"BT /F1 10 Tf 1 0 0 1 50 700 Tm (Unit 101) Tj ET".to_vec(),
        ));

        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        };
        let mut pages = dictionary! {
            "Type" => "Pages",
            "Count" => Object::Integer(1),
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ],
        };
        if inherited {
            pages.set("Resources", resources_id);
        } else {
            page.set("Resources", resources_id);
        }
        let page_id = doc.add_object(page);
        pages.set("Kids", vec![Object::Reference(page_id)]);
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        (doc, page_id)
    }

    #[test]
    fn test_page_with_font_is_not_scanned() {
        let (doc, page_id) = build_page(true, false);
        let fp = DocumentAnalyzer::analyze_page(&doc, 1, page_id).unwrap();
        assert_eq!(fp.font_count, 1);
        assert!(!fp.is_scanned());
        assert!(fp.content_bytes > 0);
    }

    #[test]
    fn test_inherited_font_resources() {
        let (doc, page_id) = build_page(true, true);
        let fp = DocumentAnalyzer::analyze_page(&doc, 1, page_id).unwrap();
        assert!(!fp.is_scanned());
    }

    #[test]
    fn test_page_without_fonts_is_scanned() {
        let (doc, page_id) = build_page(false, false);
        let fp = DocumentAnalyzer::analyze_page(&doc, 1, page_id).unwrap();
        assert!(fp.is_scanned());
    }
}
