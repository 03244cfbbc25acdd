use crate::{
    error::{Error, Result},
    github::SourceControl,
    image::ImageRef,
};

/// What the caller asked to ship; exactly one per invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selector {
    /// Branch, tag or commit resolved through source control
    Ref(String),
    /// Full image coordinate, used verbatim
    Image(String),
    /// New tag on the current image repository
    Tag(String),
}

impl Selector {
    /// Validates caller input before any collaborator is contacted. Empty
    /// values count as not given.
    pub fn from_inputs(
        reference: Option<String>,
        image: Option<String>,
        tag: Option<String>,
    ) -> Result<Self> {
        let present = |value: Option<String>| value.filter(|value| !value.is_empty());
        let given = [
            ("ref", present(reference).map(Selector::Ref)),
            ("--image", present(image).map(Selector::Image)),
            ("--tag", present(tag).map(Selector::Tag)),
        ];
        let names: Vec<&'static str> = given
            .iter()
            .filter(|(_, selector)| selector.is_some())
            .map(|(name, _)| *name)
            .collect();
        if names.len() > 1 {
            return Err(Error::ConflictingSelectors(names));
        }
        given
            .into_iter()
            .find_map(|(_, selector)| selector)
            .ok_or(Error::MissingSelector)
    }

    /// Subcommand-style name of the selector
    pub fn verb(&self) -> &'static str {
        match self {
            Selector::Ref(_) => "ref",
            Selector::Image(_) => "image",
            Selector::Tag(_) => "tag",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Selector::Ref(value) | Selector::Image(value) | Selector::Tag(value) => value,
        }
    }

    /// New image for selectors that need no source control lookup
    pub fn direct_image(&self, image_repository: &str) -> Option<String> {
        match self {
            Selector::Ref(_) => None,
            Selector::Image(image) => Some(image.clone()),
            Selector::Tag(tag) => Some(ImageRef::parse(image_repository).with_tag(tag)),
        }
    }
}

pub async fn resolve_image_for_ref(
    scm: &dyn SourceControl,
    repository: &str,
    image_repository: &str,
    reference: &str,
) -> Result<String> {
    let commit = scm.commit_for_ref(repository, reference).await?;
    log::debug!("ref {} in {} resolved to {}", reference, repository, commit);
    Ok(ImageRef::parse(image_repository).with_tag(&commit))
}

pub async fn resolve_new_image(
    scm: &dyn SourceControl,
    selector: &Selector,
    image_repository: &str,
    repository: &str,
) -> Result<String> {
    match selector.direct_image(image_repository) {
        Some(image) => Ok(image),
        None => resolve_image_for_ref(scm, repository, image_repository, selector.value()).await,
    }
}
