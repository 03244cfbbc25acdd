use thiserror::Error;

use crate::PathBuf;

#[derive(Error, Debug)]
pub enum Error {
    #[error("missing field")]
    FieldNotFound,
    #[error("cannot descend into a non-object value")]
    NotAnObject,
    #[error("expected an array to select from")]
    SelectTargetIsNotArray,
    #[error("selector matched more than one item")]
    SelectMatchedMultipleItems,
    #[error("selector matched nothing")]
    SelectMatchedNoItems,
    #[error("path is empty")]
    EmptyPath,
    #[error("{1} at {0}")]
    AtPath(PathBuf, Box<Error>),
}
pub type Result<T> = std::result::Result<T, Error>;
