//! Field projection for in-memory documents.

use bson::{Bson, Document};

use basedao_core::{
    error::{DaoError, DaoResult},
    query::Projection,
};

/// Applies `projection` to `document`.
///
/// Listing any field other than `_id` for inclusion switches to inclusion mode, where only
/// the listed fields survive; otherwise listed fields are removed. `_id` is kept unless it
/// is explicitly excluded. Mixing inclusions and exclusions of other fields is rejected.
pub(crate) fn project(document: Document, projection: &Projection) -> DaoResult<Document> {
    if projection.is_empty() {
        return Ok(document);
    }

    let (included, excluded): (Vec<_>, Vec<_>) = projection
        .iter()
        .filter(|(field, _)| *field != "_id")
        .partition(|(_, include)| *include);
    let keep_id = projection
        .iter()
        .find(|(field, _)| *field == "_id")
        .is_none_or(|(_, include)| include);

    if !included.is_empty() && !excluded.is_empty() {
        return Err(DaoError::Validation(
            "projection cannot mix inclusion and exclusion".into(),
        ));
    }

    if included.is_empty() {
        let mut document = document;
        for (field, _) in excluded {
            remove_path(&mut document, field);
        }
        if !keep_id {
            document.remove("_id");
        }

        return Ok(document);
    }

    let mut projected = Document::new();
    if keep_id {
        if let Some(id) = document.get("_id") {
            projected.insert("_id", id.clone());
        }
    }
    for (field, _) in included {
        if let Some(value) = get_path(&document, field) {
            set_path(&mut projected, field, value.clone());
        }
    }

    Ok(projected)
}

fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    match path.split_once('.') {
        Some((head, tail)) => match document.get(head)? {
            Bson::Document(inner) => get_path(inner, tail),
            _ => None,
        },
        None => document.get(path),
    }
}

/// Writes `value` at a dotted `path`, creating intermediate documents. A non-document
/// value in the way is replaced.
pub(crate) fn set_path(document: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        Some((head, tail)) => {
            if !matches!(document.get(head), Some(Bson::Document(_))) {
                document.insert(head, Document::new());
            }
            if let Some(Bson::Document(inner)) = document.get_mut(head) {
                set_path(inner, tail, value);
            }
        }
        None => {
            document.insert(path, value);
        }
    }
}

fn remove_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        Some((head, tail)) => {
            if let Some(Bson::Document(inner)) = document.get_mut(head) {
                remove_path(inner, tail);
            }
        }
        None => {
            document.remove(path);
        }
    }
}
