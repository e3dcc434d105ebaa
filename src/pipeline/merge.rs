//! PDF merge: concatenate per-page PDFs into the output document.
//!
//! The algorithm:
//! 1. Start from an empty destination with one reserved `Pages` node.
//! 2. For each source, in the order given:
//!    a. copy inherited page attributes (`MediaBox`, `CropBox`, `Resources`,
//!       `Rotate`) down onto every page, so pages stay correct once cut
//!       loose from their old page tree;
//!    b. shift every object ID past the destination's highest ID;
//!    c. import the shifted objects, minus the source's own catalog and
//!       page-tree nodes;
//!    d. append the source pages, in their internal order, to the new tree.
//! 3. Add a catalog and serialize once.
//!
//! Nothing touches the output path until the whole document is assembled,
//! so a missing or corrupt input never leaves a partial file behind.

use crate::error::Indd2PdfError;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Page attributes a page may inherit from its ancestors.
const INHERITABLE_KEYS: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Guard against malformed `Parent` cycles.
const MAX_TREE_DEPTH: usize = 64;

/// Merge `pdf_paths` in order into `output_path`, overwriting it.
///
/// Returns the number of pages written.
pub async fn merge(pdf_paths: &[PathBuf], output_path: &Path) -> Result<usize, Indd2PdfError> {
    let paths = pdf_paths.to_vec();
    let (bytes, page_count) = tokio::task::spawn_blocking(move || merge_files(&paths))
        .await
        .map_err(|e| Indd2PdfError::Internal(format!("Merge task panicked: {}", e)))??;

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Indd2PdfError::OutputWriteFailed {
                path: output_path.to_path_buf(),
                source: e,
            })?;
    }

    tokio::fs::write(output_path, &bytes)
        .await
        .map_err(|e| Indd2PdfError::OutputWriteFailed {
            path: output_path.to_path_buf(),
            source: e,
        })?;

    info!(
        "Merged {} pages from {} files into {} ({} bytes)",
        page_count,
        pdf_paths.len(),
        output_path.display(),
        bytes.len()
    );
    Ok(page_count)
}

/// Load every file and merge them in memory. Blocking.
pub fn merge_files(pdf_paths: &[PathBuf]) -> Result<(Vec<u8>, usize), Indd2PdfError> {
    if pdf_paths.is_empty() {
        return Err(Indd2PdfError::NoPagesToMerge);
    }

    let mut sources = Vec::with_capacity(pdf_paths.len());
    for path in pdf_paths {
        sources.push((path.as_path(), load_pdf(path)?));
    }
    merge_documents(sources)
}

fn load_pdf(path: &Path) -> Result<Document, Indd2PdfError> {
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Indd2PdfError::IntermediatePdfMissing {
            path: path.to_path_buf(),
        },
        _ => Indd2PdfError::CorruptPdf {
            path: path.to_path_buf(),
            detail: e.to_string(),
        },
    })?;

    Document::load_mem(&bytes).map_err(|e| Indd2PdfError::CorruptPdf {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

/// Merge already-loaded documents in order. `path` only labels errors.
pub fn merge_documents(sources: Vec<(&Path, Document)>) -> Result<(Vec<u8>, usize), Indd2PdfError> {
    if sources.is_empty() {
        return Err(Indd2PdfError::NoPagesToMerge);
    }

    let mut dest = Document::with_version("1.7");
    let pages_id = dest.new_object_id();
    let mut kids: Vec<ObjectId> = Vec::new();

    for (path, source) in sources {
        let before = kids.len();
        append_document(&mut dest, source, pages_id, &mut kids).map_err(|detail| {
            Indd2PdfError::CorruptPdf {
                path: path.to_path_buf(),
                detail,
            }
        })?;
        debug!("Appended {} pages from {}", kids.len() - before, path.display());
    }

    if kids.is_empty() {
        return Err(Indd2PdfError::NoPagesToMerge);
    }

    let mut pages = Dictionary::new();
    pages.set("Type", Object::Name(b"Pages".to_vec()));
    pages.set("Count", Object::Integer(kids.len() as i64));
    pages.set(
        "Kids",
        Object::Array(kids.iter().map(|&id| Object::Reference(id)).collect()),
    );
    dest.objects.insert(pages_id, Object::Dictionary(pages));

    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));
    let catalog_id = dest.add_object(Object::Dictionary(catalog));
    dest.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    dest.save_to(&mut buffer)
        .map_err(|e| Indd2PdfError::Internal(format!("Failed to serialize merged PDF: {}", e)))?;

    Ok((buffer, kids.len()))
}

/// Move every page of `source` under `pages_id` in `dest`.
fn append_document(
    dest: &mut Document,
    mut source: Document,
    pages_id: ObjectId,
    kids: &mut Vec<ObjectId>,
) -> Result<(), String> {
    // `get_pages` is keyed by page number, so this is the document's own order.
    let page_ids: Vec<ObjectId> = source.get_pages().into_values().collect();
    if page_ids.is_empty() {
        return Err("document has no pages".to_string());
    }

    let offset = dest.max_id;

    for &page_id in &page_ids {
        let mut page = source
            .get_object(page_id)
            .and_then(Object::as_dict)
            .map_err(|e| format!("page object {:?}: {}", page_id, e))?
            .clone();

        for key in INHERITABLE_KEYS {
            if !page.has(key) {
                if let Some(value) = inherited_attribute(&source, &page, key) {
                    page.set(key, value);
                }
            }
        }
        source.objects.insert(page_id, Object::Dictionary(page));
    }

    for (id, object) in source.objects {
        if is_tree_node(&object) {
            continue;
        }
        dest.objects
            .insert((id.0 + offset, id.1), shift_refs(object, offset));
    }

    for &(num, generation) in &page_ids {
        let id = (num + offset, generation);
        if let Some(Object::Dictionary(page)) = dest.objects.get_mut(&id) {
            page.set("Parent", Object::Reference(pages_id));
        }
        kids.push(id);
    }
    dest.max_id = dest.max_id.max(source.max_id + offset);
    Ok(())
}

/// Walk up the `Parent` chain looking for `key`.
fn inherited_attribute(doc: &Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;

    while let Some(id) = parent {
        if depth >= MAX_TREE_DEPTH {
            return None;
        }
        let node = doc.get_object(id).and_then(Object::as_dict).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
    }
    None
}

/// Catalog and intermediate page-tree nodes are rebuilt, not copied.
fn is_tree_node(object: &Object) -> bool {
    let Ok(dict) = object.as_dict() else {
        return false;
    };
    matches!(
        dict.get(b"Type").and_then(Object::as_name),
        Ok(name) if name == b"Catalog" || name == b"Pages"
    )
}

/// Add `offset` to every indirect reference inside `object`.
fn shift_refs(object: Object, offset: u32) -> Object {
    match object {
        Object::Reference((num, generation)) => {
            Object::Reference((num + offset, generation))
        }
        Object::Array(items) => {
            Object::Array(items.into_iter().map(|o| shift_refs(o, offset)).collect())
        }
        Object::Dictionary(mut dict) => {
            for (_, value) in dict.iter_mut() {
                *value = shift_refs(std::mem::replace(value, Object::Null), offset);
            }
            Object::Dictionary(dict)
        }
        Object::Stream(mut stream) => {
            for (_, value) in stream.dict.iter_mut() {
                *value = shift_refs(std::mem::replace(value, Object::Null), offset);
            }
            Object::Stream(stream)
        }
        other => other,
    }
}
