use crate::error::CertError;
use crate::types::{PageGeometry, Size};
use lopdf::{
    Dictionary, Document as LoDocument, Object as LoObject, ObjectId as LoObjectId,
    Stream as LoStream, dictionary,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One blank page per supported geometry, loaded from the template directory when present
/// and synthesized otherwise. Built once per engine and kept as serialized bytes.
#[derive(Debug, Clone)]
pub struct BlankPages {
    pages: BTreeMap<PageGeometry, Vec<u8>>,
}

impl BlankPages {
    pub fn load(template_dir: &Path) -> Result<Self, CertError> {
        let mut pages = BTreeMap::new();
        for geometry in PageGeometry::ALL {
            let path = template_dir.join(geometry.blank_file_name());
            let bytes = if path.is_file() {
                let bytes = std::fs::read(&path)?;
                match LoDocument::load_mem(&bytes) {
                    Ok(doc) if doc.get_pages().len() == 1 => {
                        log::debug!("loaded blank page {}", path.display());
                        bytes
                    }
                    Ok(_) => {
                        log::warn!(
                            "blank page {} must have exactly one page; synthesizing",
                            path.display()
                        );
                        blank_bytes(geometry.size())?
                    }
                    Err(err) => {
                        log::warn!("cannot parse blank page {}: {err}", path.display());
                        blank_bytes(geometry.size())?
                    }
                }
            } else {
                blank_bytes(geometry.size())?
            };
            pages.insert(geometry, bytes);
        }
        Ok(Self { pages })
    }

    pub fn synthesized() -> Result<Self, CertError> {
        let mut pages = BTreeMap::new();
        for geometry in PageGeometry::ALL {
            pages.insert(geometry, blank_bytes(geometry.size())?);
        }
        Ok(Self { pages })
    }

    fn get(&self, geometry: PageGeometry) -> Result<LoDocument, CertError> {
        match self.pages.get(&geometry) {
            Some(bytes) => Ok(LoDocument::load_mem(bytes)?),
            None => Ok(synthesize_blank(geometry.size())),
        }
    }
}

fn blank_bytes(size: Size) -> Result<Vec<u8>, CertError> {
    let mut doc = synthesize_blank(size);
    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    Ok(out)
}

fn synthesize_blank(size: Size) -> LoDocument {
    let mut doc = LoDocument::with_version("1.7");
    let pages_id = doc.new_object_id();
    let content_id = doc.add_object(LoStream::new(dictionary! {}, Vec::new()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! {},
        "MediaBox" => media_box(size),
    });
    doc.objects.insert(
        pages_id,
        LoObject::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![LoObject::Reference(page_id)],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc
}

fn media_box(size: Size) -> Vec<LoObject> {
    vec![
        0.into(),
        0.into(),
        LoObject::Real(size.width.to_f32()),
        LoObject::Real(size.height.to_f32()),
    ]
}

/// A page dictionary entry, following `Parent` links for inheritable keys.
fn inherited(doc: &LoDocument, page: &Dictionary, key: &[u8]) -> Option<LoObject> {
    let mut current = page.clone();
    for _ in 0..32 {
        if let Ok(value) = current.get(key) {
            return Some(match value {
                LoObject::Reference(id) => doc.get_object(*id).ok()?.clone(),
                other => other.clone(),
            });
        }
        let parent = current.get(b"Parent").and_then(LoObject::as_reference).ok()?;
        current = doc.get_dictionary(parent).ok()?.clone();
    }
    None
}

fn page_box(doc: &LoDocument, page: &Dictionary, fallback: Size) -> Vec<LoObject> {
    for key in [b"CropBox".as_slice(), b"MediaBox".as_slice()] {
        if let Some(LoObject::Array(arr)) = inherited(doc, page, key) {
            return arr;
        }
    }
    media_box(fallback)
}

/// Moves every object of `src` into `dst` and returns the id of its first page.
fn first_page_only(dst: &mut LoDocument, mut src: LoDocument) -> Option<LoObjectId> {
    let start_id = dst.max_id + 1;
    src.renumber_objects_with(start_id);
    let first = src.get_pages().values().next().copied();
    if src.max_id > dst.max_id {
        dst.max_id = src.max_id;
    }
    dst.objects.extend(src.objects);
    first
}

/// Imports the first page of `src` as a Form XObject; returns the form and page ids.
fn import_as_form(
    composed: &mut LoDocument,
    src: LoDocument,
    fallback: Size,
) -> Result<Option<(LoObjectId, LoObjectId)>, CertError> {
    let Some(page_id) = first_page_only(composed, src) else {
        return Ok(None);
    };
    let page = composed.get_dictionary(page_id)?.clone();
    let content = composed.get_page_content(page_id)?;
    let bbox = page_box(composed, &page, fallback);
    let resources = inherited(composed, &page, b"Resources")
        .unwrap_or_else(|| LoObject::Dictionary(Dictionary::new()));
    let form_id = composed.add_object(LoStream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "FormType" => 1,
            "BBox" => LoObject::Array(bbox),
            "Resources" => resources,
        },
        content,
    ));
    Ok(Some((form_id, page_id)))
}

fn template_unreadable(path: &Path, message: impl Into<String>) -> CertError {
    let err = CertError::TemplateUnreadable {
        path: path.to_path_buf(),
        message: message.into(),
    };
    log::error!("{err}");
    err
}

/// Stacks the blank page, the optional institution template and the overlay into one page.
#[derive(Debug, Clone)]
pub struct Compositor {
    blanks: std::sync::Arc<BlankPages>,
}

impl Compositor {
    pub fn new(blanks: std::sync::Arc<BlankPages>) -> Self {
        Self { blanks }
    }

    pub fn compose(
        &self,
        overlay: &[u8],
        template: Option<&Path>,
        geometry: PageGeometry,
        out_path: &Path,
    ) -> Result<PathBuf, CertError> {
        let size = geometry.size();
        let template_doc = match template {
            Some(path) => {
                let doc = LoDocument::load(path)
                    .map_err(|err| template_unreadable(path, err.to_string()))?;
                if doc.is_encrypted() {
                    return Err(template_unreadable(path, "document is encrypted"));
                }
                if doc.get_pages().is_empty() {
                    return Err(template_unreadable(path, "document has no pages"));
                }
                Some(doc)
            }
            None => None,
        };
        let overlay_doc = LoDocument::load_mem(overlay)?;

        let mut composed = LoDocument::with_version("1.7");
        let mut layers: Vec<LoObjectId> = Vec::new();
        let blank = self.blanks.get(geometry)?;
        if let Some((form_id, _)) = import_as_form(&mut composed, blank, size)? {
            layers.push(form_id);
        }
        if let Some(doc) = template_doc {
            if let Some((form_id, _)) = import_as_form(&mut composed, doc, size)? {
                layers.push(form_id);
            }
        }
        let Some((overlay_form, overlay_page)) = import_as_form(&mut composed, overlay_doc, size)?
        else {
            return Err(CertError::Pdf("overlay has no pages".to_string()));
        };
        layers.push(overlay_form);

        let annots = composed
            .get_dictionary(overlay_page)?
            .get(b"Annots")
            .ok()
            .cloned();

        let mut xobjects = Dictionary::new();
        let mut content = String::new();
        for (index, form_id) in layers.iter().enumerate() {
            let name = format!("CS_L{}", index + 1);
            content.push_str(&format!("q 1 0 0 1 0 0 cm /{} Do Q\n", name));
            xobjects.set(name.into_bytes(), LoObject::Reference(*form_id));
        }

        let pages_id = composed.new_object_id();
        let content_id = composed.add_object(LoStream::new(dictionary! {}, content.into_bytes()));
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => xobjects,
            },
            "MediaBox" => media_box(size),
        };
        if let Some(annots) = annots {
            page.set("Annots", annots);
        }
        let page_id = composed.add_object(page);
        composed.objects.insert(
            pages_id,
            LoObject::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![LoObject::Reference(page_id)],
                "Count" => 1,
            }),
        );
        let catalog_id = composed.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        composed.trailer.set("Root", catalog_id);
        composed.prune_objects();
        composed.renumber_objects();
        composed.compress();

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        composed.save(out_path)?;
        log::info!("wrote {} ({} layers)", out_path.display(), layers.len());
        Ok(out_path.to_path_buf())
    }
}
