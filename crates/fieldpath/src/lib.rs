mod error;
pub use error::*;
mod element;
pub use element::Element;
mod ext;
mod merge;
mod path;
pub use ext::FieldpathExt;
pub use merge::{merge, MERGE_KEY};
pub use path::{Path, PathBuf};

/// Construct &Path of static fields without allocating
#[macro_export]
macro_rules! path {
    ($(.$text:literal)+) => {
        &[$($crate::Element::StaticField($text)),+][..] as &$crate::Path
    };
}
