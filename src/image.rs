use std::fmt::{self, Display};

/// Image coordinate split on the first `:`
///
/// Registry `host:port` prefixes are not recognized: `registry:5000/app:v1` has
/// repository `registry` and tag `5000/app:v1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageRef<'a> {
    pub repository: &'a str,
    pub tag: Option<&'a str>,
}

impl<'a> ImageRef<'a> {
    pub fn parse(image: &'a str) -> Self {
        match image.split_once(':') {
            Some((repository, tag)) => Self {
                repository,
                tag: Some(tag),
            },
            None => Self {
                repository: image,
                tag: None,
            },
        }
    }

    /// Same repository, new tag
    pub fn with_tag(&self, tag: &str) -> String {
        format!("{}:{}", self.repository, tag)
    }
}

impl Display for ImageRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repository)?;
        if let Some(tag) = self.tag {
            write!(f, ":{}", tag)?;
        }
        Ok(())
    }
}
