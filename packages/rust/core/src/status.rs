//! Status badges derived from a configuration's linked repositories and pull
//! requests.

use serde::Serialize;

use drivedb_shared::{ConfigStatus, PullRequest, PullRequestState, RepositoryLink, VehicleConfig};

/// Everything needed to draw a status badge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusPresentation {
    pub icon: &'static str,
    pub color: &'static str,
    pub url: Option<String>,
    pub tooltip: String,
    pub label: Option<String>,
}

impl StatusPresentation {
    fn researching() -> Self {
        Self {
            icon: "fa fa-globe",
            color: "default",
            url: Some("#".into()),
            tooltip: "Researching".into(),
            label: Some("Researching".into()),
        }
    }
}

/// Repository link with the highest join-record id that points at a repository.
pub fn latest_repository(config: &VehicleConfig) -> Option<&RepositoryLink> {
    config
        .repositories
        .iter()
        .filter(|link| link.repository.is_some())
        .max_by_key(|link| link.id)
}

/// Open pull request with the highest number.
pub fn latest_open_pull_request(config: &VehicleConfig) -> Option<&PullRequest> {
    config
        .pull_requests
        .iter()
        .filter_map(|link| link.pull_request.as_ref())
        .filter(|pr| pr.state == PullRequestState::Open)
        .max_by_key(|pr| pr.number)
}

/// Badge for `config`'s status. `upstream` names the repository that
/// "Upstreamed" refers to. Unset status is presented as researching.
pub fn status_presentation(config: &VehicleConfig, upstream: &str) -> StatusPresentation {
    let repo = latest_repository(config);
    let repo_url = repo.and_then(|l| l.repository.as_ref()).map(|r| r.url.clone());
    let repo_label = repo.and_then(RepositoryLink::label);

    let Some(status) = config.status else {
        return StatusPresentation::researching();
    };

    match status {
        ConfigStatus::Community => StatusPresentation {
            icon: "fa fa-users",
            color: "danger",
            tooltip: match repo.and_then(|l| l.repository.as_ref()) {
                Some(r) => format!("Community Supported in {}", r.full_name),
                None => "Community Supported".into(),
            },
            url: repo_url,
            label: repo_label,
        },
        ConfigStatus::InDevelopment => StatusPresentation {
            icon: "fa fa-code",
            color: "warning",
            tooltip: status.name().into(),
            url: repo_url,
            label: repo_label,
        },
        ConfigStatus::PullRequest => {
            let pr = latest_open_pull_request(config);
            StatusPresentation {
                icon: "fa fa-hourglass",
                color: "info",
                tooltip: match pr {
                    Some(pr) => format!("{} #{}", status.name(), pr.number),
                    None => status.name().into(),
                },
                url: pr.map(|pr| pr.html_url.clone()),
                label: repo_label,
            }
        }
        ConfigStatus::Upstreamed => StatusPresentation {
            icon: "fa fa-check",
            color: "success",
            tooltip: format!("Upstreamed to {upstream}"),
            url: repo_url,
            label: repo_label,
        },
        ConfigStatus::Researching => StatusPresentation {
            tooltip: status.name().to_lowercase(),
            ..StatusPresentation::researching()
        },
        ConfigStatus::Archived => StatusPresentation {
            icon: "fa fa-archive",
            color: "default",
            url: Some("#".into()),
            tooltip: status.name().to_lowercase(),
            label: Some(status.name().into()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::tests::{civic, honda};
    use crate::tree::{ConfigTree, NewConfig};
    use drivedb_shared::{ConfigId, Repository};

    fn config_with_status(status: Option<ConfigStatus>) -> (ConfigTree, ConfigId) {
        let mut tree = ConfigTree::new();
        let id = tree
            .create_root(NewConfig {
                status,
                ..NewConfig::new(honda(), civic(), 2017)
            })
            .unwrap();
        (tree, id)
    }

    fn pr(id: i64, number: u32, state: PullRequestState) -> PullRequest {
        PullRequest {
            id,
            number,
            state,
            html_url: format!("https://github.com/commaai/openpilot/pull/{number}"),
        }
    }

    fn repo(id: i64, full_name: &str) -> Repository {
        Repository {
            id,
            full_name: full_name.into(),
            url: format!("https://github.com/{full_name}"),
        }
    }

    #[test]
    fn unset_status_is_researching() {
        let (tree, id) = config_with_status(None);
        let badge = status_presentation(tree.get(id).unwrap(), "commaai/openpilot");
        assert_eq!(badge, StatusPresentation::researching());
    }

    #[test]
    fn pull_request_tooltip_uses_latest_open() {
        let (mut tree, id) = config_with_status(Some(ConfigStatus::PullRequest));
        tree.link_pull_request(id, pr(1, 40, PullRequestState::Open)).unwrap();
        tree.link_pull_request(id, pr(2, 42, PullRequestState::Open)).unwrap();
        tree.link_pull_request(id, pr(3, 50, PullRequestState::Merged)).unwrap();

        let config = tree.get(id).unwrap();
        assert_eq!(latest_open_pull_request(config).map(|p| p.number), Some(42));
        let badge = status_presentation(config, "commaai/openpilot");
        assert_eq!(badge.tooltip, "Pull Request #42");
        assert_eq!(badge.url.as_deref(), Some("https://github.com/commaai/openpilot/pull/42"));
    }

    #[test]
    fn pull_request_without_open_pr_falls_back() {
        let (mut tree, id) = config_with_status(Some(ConfigStatus::PullRequest));
        tree.link_pull_request(id, pr(1, 40, PullRequestState::Closed)).unwrap();
        let badge = status_presentation(tree.get(id).unwrap(), "commaai/openpilot");
        assert_eq!(badge.tooltip, "Pull Request");
        assert!(badge.url.is_none());
    }

    #[test]
    fn community_surfaces_latest_repository() {
        let (mut tree, id) = config_with_status(Some(ConfigStatus::Community));
        tree.link_repository(id, repo(7, "old/openpilot"), None).unwrap();
        tree.link_repository(id, repo(3, "new/openpilot"), Some("civic".into())).unwrap();

        let config = tree.get(id).unwrap();
        let badge = status_presentation(config, "commaai/openpilot");
        assert_eq!(badge.tooltip, "Community Supported in new/openpilot");
        assert_eq!(badge.label.as_deref(), Some("new/openpilot#civic"));
        assert_eq!(badge.url.as_deref(), Some("https://github.com/new/openpilot"));
        assert_eq!(badge.color, "danger");
    }

    #[test]
    fn links_are_optional() {
        let (tree, id) = config_with_status(Some(ConfigStatus::Community));
        let config = tree.get(id).unwrap();
        assert!(latest_repository(config).is_none());
        assert!(latest_open_pull_request(config).is_none());
        let badge = status_presentation(config, "commaai/openpilot");
        assert_eq!(badge.tooltip, "Community Supported");
        assert!(badge.url.is_none() && badge.label.is_none());
    }

    #[test]
    fn upstreamed_names_upstream() {
        let (tree, id) = config_with_status(Some(ConfigStatus::Upstreamed));
        let badge = status_presentation(tree.get(id).unwrap(), "example/fork");
        assert_eq!(badge.tooltip, "Upstreamed to example/fork");
        assert_eq!(badge.icon, "fa fa-check");
    }

    #[test]
    fn archived_and_researching_lowercase_tooltips() {
        let (tree, id) = config_with_status(Some(ConfigStatus::Archived));
        let badge = status_presentation(tree.get(id).unwrap(), "commaai/openpilot");
        assert_eq!(badge.tooltip, "archived");
        assert_eq!(badge.label.as_deref(), Some("Archived"));

        let (tree, id) = config_with_status(Some(ConfigStatus::Researching));
        let badge = status_presentation(tree.get(id).unwrap(), "commaai/openpilot");
        assert_eq!(badge.tooltip, "researching");
        assert_eq!(badge.url.as_deref(), Some("#"));
    }
}
