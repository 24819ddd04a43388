//! Metadata catalog
//!
//! Field descriptors name real columns by `(app, model, field)`; concepts
//! group descriptors for presentation; categories group concepts.

mod catalog;
mod concept;
mod descriptor;
mod error;

pub use catalog::Catalog;
pub use concept::{Category, Concept, ConceptField};
pub use descriptor::FieldDescriptor;
pub use error::{CatalogError, CatalogResult};

/// Upper-case the first letter of every run of letters, lower-case the rest
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_word = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}
