use std::collections::BTreeMap;

/// Standard annotation holding the command that produced the current revision
pub const CHANGE_CAUSE_ANNOTATION: &str = "kubernetes.io/change-cause";
/// Set by the Deployment controller on every ReplicaSet it owns
pub const REVISION_ANNOTATION: &str = "deployment.kubernetes.io/revision";

/// Metadata fields kubeship reads or writes, independent of the configured prefix
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    DeployTarget,
    DeployTargetContainer,
    DeployUser,
    ReloadedAt,
    Repository,
}

impl Field {
    pub fn suffix(self) -> &'static str {
        match self {
            Field::DeployTarget => "deploy-target",
            Field::DeployTargetContainer => "deploy-target-container",
            Field::DeployUser => "deploy-user",
            Field::ReloadedAt => "reloaded-at",
            Field::Repository => "github",
        }
    }
}

/// Concrete metadata keys, resolved once from the annotation prefix
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotationKeys {
    deploy_target: String,
    deploy_target_container: String,
    deploy_user: String,
    reloaded_at: String,
    repository: String,
}

impl AnnotationKeys {
    pub fn new(prefix: &str) -> Self {
        let key = |field: Field| format!("{}{}", prefix, field.suffix());
        Self {
            deploy_target: key(Field::DeployTarget),
            deploy_target_container: key(Field::DeployTargetContainer),
            deploy_user: key(Field::DeployUser),
            reloaded_at: key(Field::ReloadedAt),
            repository: key(Field::Repository),
        }
    }

    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::DeployTarget => &self.deploy_target,
            Field::DeployTargetContainer => &self.deploy_target_container,
            Field::DeployUser => &self.deploy_user,
            Field::ReloadedAt => &self.reloaded_at,
            Field::Repository => &self.repository,
        }
    }
}

impl Default for AnnotationKeys {
    fn default() -> Self {
        Self::new("")
    }
}

/// Only the exact literals `"1"` and `"true"` are truthy
pub fn is_truthy(value: Option<&str>) -> bool {
    matches!(value, Some("1") | Some("true"))
}

pub fn lookup<'a>(map: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    map.get(key).map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_literals() {
        assert!(is_truthy(Some("1")));
        assert!(is_truthy(Some("true")));
        for value in ["0", "false", "TRUE", "True", "yes", " 1", ""] {
            assert!(!is_truthy(Some(value)), "{:?} should not be truthy", value);
        }
        assert!(!is_truthy(None));
    }

    #[test]
    fn keys_use_prefix() {
        let keys = AnnotationKeys::new("example.com/");
        assert_eq!(keys.get(Field::DeployTarget), "example.com/deploy-target");
        assert_eq!(
            keys.get(Field::DeployTargetContainer),
            "example.com/deploy-target-container"
        );
        assert_eq!(keys.get(Field::Repository), "example.com/github");
        assert_eq!(AnnotationKeys::default().get(Field::DeployUser), "deploy-user");
    }

    #[test]
    fn every_field_has_its_own_key() {
        let keys = AnnotationKeys::new("example.com/");
        let fields = [
            Field::DeployTarget,
            Field::DeployTargetContainer,
            Field::DeployUser,
            Field::ReloadedAt,
            Field::Repository,
        ];
        for field in fields {
            assert_eq!(keys.get(field), format!("example.com/{}", field.suffix()));
        }
        assert_eq!(keys.get(Field::ReloadedAt), "example.com/reloaded-at");
    }
}
