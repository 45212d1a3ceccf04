mod audit;
mod build;
mod compose;
mod doctor;
mod eject;
mod init;
mod render;
mod verify;

use galley_build::dockerfile::DockerfileGenerator;
use galley_build::eject as eject_mod;
use galley_core::{GalleyConfig, ImagePlan};
use std::path::Path;

pub use audit::audit;
pub use build::build;
pub use compose::{compose, down, test, up};
pub use doctor::doctor;
pub use eject::eject;
pub use init::init_project;
pub use render::render;
pub use verify::verify;

/// Load galley.toml and turn it into a validated plan.
pub(crate) fn load_plan(project_dir: &Path) -> anyhow::Result<(GalleyConfig, ImagePlan)> {
    let config = GalleyConfig::load(project_dir)?;
    let plan = ImagePlan::from_config(&config)?;
    Ok((config, plan))
}

/// The Dockerfile a build would use: the ejected one if present.
pub(crate) fn current_dockerfile(project_dir: &Path, plan: &ImagePlan) -> anyhow::Result<String> {
    if eject_mod::is_ejected(project_dir) {
        Ok(eject_mod::load_ejected_dockerfile(project_dir)?)
    } else {
        Ok(DockerfileGenerator::new(plan).render())
    }
}
