use galley_build::dockerfile::DockerfileGenerator;
use std::path::PathBuf;

use super::load_plan;

pub async fn render() -> anyhow::Result<()> {
    let project_dir = PathBuf::from(".");
    let (_, plan) = load_plan(&project_dir)?;

    print!("{}", DockerfileGenerator::new(&plan).render());
    Ok(())
}
