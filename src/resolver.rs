use crate::safety::resolve;
use crate::store::{ProjectEntry, Store};
use std::path::Path;

/// URL of the `origin` remote for the repository containing `dir`, if any.
///
/// Read in-process from the repository config, so there is no subprocess
/// to time out. Any git failure means "no remote".
pub fn origin_url(dir: &Path) -> Option<String> {
    let repo = match git2::Repository::discover(dir) {
        Ok(repo) => repo,
        Err(e) => {
            tracing::debug!(dir = %dir.display(), error = %e, "no git repository");
            return None;
        }
    };
    let remote = match repo.find_remote("origin") {
        Ok(remote) => remote,
        Err(e) => {
            tracing::debug!(dir = %dir.display(), error = %e, "no origin remote");
            return None;
        }
    };
    remote
        .url()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(String::from)
}

/// First project with a `repos` entry contained in `remote_url`.
pub fn match_remote<'a>(projects: &'a [ProjectEntry], remote_url: &str) -> Option<&'a ProjectEntry> {
    projects.iter().find(|entry| {
        entry
            .project
            .repos
            .iter()
            .any(|repo| !repo.is_empty() && remote_url.contains(repo.as_str()))
    })
}

/// Final `/`-separated segment of a repo fragment, ignoring trailing slashes.
fn repo_name(repo: &str) -> &str {
    repo.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}

/// First project whose repo name appears anywhere in `path`.
pub fn match_path<'a>(projects: &'a [ProjectEntry], path: &str) -> Option<&'a ProjectEntry> {
    projects.iter().find(|entry| {
        entry.project.repos.iter().any(|repo| {
            let name = repo_name(repo);
            !name.is_empty() && path.contains(name)
        })
    })
}

/// Map a working directory to a known project.
///
/// The git remote is the reliable signal and is tried first; the path
/// substring heuristic covers directories that aren't git repositories yet.
/// Projects are scanned in slug order, so ties go to the first slug.
pub fn detect_project(store: &Store, working_dir: &str) -> Option<ProjectEntry> {
    if working_dir.is_empty() {
        return None;
    }
    let resolved = resolve(Path::new(working_dir));
    let projects = store.projects();
    if projects.is_empty() {
        return None;
    }

    if let Some(url) = origin_url(&resolved) {
        if let Some(found) = match_remote(&projects, &url) {
            tracing::debug!(project = %found.slug, dir = %found.dir.display(), "matched by remote");
            return Some(found.clone());
        }
    }

    match_path(&projects, &resolved.to_string_lossy()).cloned()
}
