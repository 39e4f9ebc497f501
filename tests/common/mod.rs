//! Shared test helpers for integration tests

use trellis::config::BuildConfig;
use trellis::graph::{HotFlags, ResourceCategory, ResourceId};
use trellis::version::Version;
use trellis::{CookedResource, Project};

/// A script module with generated content
pub fn script(id: &str, deps: &[&str]) -> CookedResource {
    CookedResource::new(id, ResourceCategory::ScriptModule)
        .with_content(format!("export default {:?};", id))
        .with_content_type("text/javascript")
        .with_dependencies(deps.iter().copied())
}

/// A script that accepts hot updates from the listed dependencies
#[allow(dead_code)]
pub fn accepting(id: &str, deps: &[&str], accepted: &[&str]) -> CookedResource {
    script(id, deps).with_hot(HotFlags::new().with_accepted(accepted.iter().copied()))
}

/// A project with the default config holding `resources`
pub fn project_with(resources: Vec<CookedResource>) -> Project {
    let project = Project::new(BuildConfig::default()).expect("default config is valid");
    for resource in resources {
        project.ingest(resource).expect("ingest");
    }
    project
}

/// Version every resource and return the version of `id`
#[allow(dead_code)]
pub async fn version_of(project: &Project, id: &str) -> Version {
    project.version_all().await.expect("version_all");
    project
        .get_version(id)
        .and_then(|state| state.version().copied())
        .expect("versioned")
}

#[allow(dead_code)]
pub fn rid(id: &str) -> ResourceId {
    ResourceId::from(id)
}
