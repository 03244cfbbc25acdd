use crate::Element;
use std::{
    fmt::{self, Display},
    ops::Deref,
};

#[derive(Debug, PartialEq, Clone, Default)]
pub struct PathBuf(pub Vec<Element>);
pub type Path = [Element];

impl From<&Path> for PathBuf {
    fn from(p: &Path) -> Self {
        PathBuf(p.into())
    }
}

impl PathBuf {
    /// Returns a new path with `element` appended
    pub fn join(&self, element: Element) -> Self {
        let mut out = self.clone();
        out.0.push(element);
        out
    }
}

impl Display for PathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in self.0.iter() {
            write!(f, "{}", part)?;
        }
        Ok(())
    }
}
impl Deref for PathBuf {
    type Target = [Element];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
