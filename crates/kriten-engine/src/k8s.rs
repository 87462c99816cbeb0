//! Shared helpers for the Kubernetes-backed stores.

use crate::error::Error;

/// Label holding the username that launched a workload.
pub const OWNER_LABEL: &str = "owner";
/// Label holding the task a workload runs.
pub const TASK_LABEL: &str = "task-name";
/// Label the job controller stamps on every pod it creates.
pub const JOB_NAME_LABEL: &str = "job-name";
/// Label selecting the pods of one deployment. Stable for the deployment's lifetime.
pub const DEPLOYMENT_NAME_LABEL: &str = "deployment-name";

/// Maps a client error to the engine taxonomy.
///
/// HTTP 404 becomes not-found, 409 becomes conflict, anything else is an
/// infrastructure failure with the client error attached.
pub(crate) fn map_kube_error(err: ::kube::Error, resource_type: &'static str, name: &str) -> Error {
    match &err {
        ::kube::Error::Api(response) if response.code == 404 => Error::not_found(resource_type, name),
        ::kube::Error::Api(response) if response.code == 409 => Error::conflict(resource_type, name),
        _ => Error::infrastructure_with_source(format!("{resource_type} {name}"), err),
    }
}

/// Returns true if the client error is an HTTP 404.
pub(crate) fn is_kube_not_found(err: &::kube::Error) -> bool {
    matches!(err, ::kube::Error::Api(response) if response.code == 404)
}

/// Builds the `task-name` selectors for a set of authorized task names.
///
/// `All` selects every engine-managed object by label presence.
pub(crate) fn task_selectors(ids: &kriten_core::AuthorizedIds) -> Vec<String> {
    match ids {
        kriten_core::AuthorizedIds::All => vec![TASK_LABEL.to_string()],
        kriten_core::AuthorizedIds::Only(names) => names
            .iter()
            .map(|name| format!("{TASK_LABEL}={name}"))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kriten_core::AuthorizedIds;

    #[test]
    fn wildcard_selects_by_label_presence() {
        assert_eq!(task_selectors(&AuthorizedIds::All), vec!["task-name"]);
    }

    #[test]
    fn explicit_ids_select_by_value() {
        let ids = AuthorizedIds::Only(vec!["a".into(), "b".into()]);
        assert_eq!(task_selectors(&ids), vec!["task-name=a", "task-name=b"]);
    }
}
