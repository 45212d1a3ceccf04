use galley_build::dockerfile::DockerfileGenerator;
use std::path::PathBuf;

use super::load_plan;

pub async fn eject() -> anyhow::Result<()> {
    let project_dir = PathBuf::from(".");
    let (_, plan) = load_plan(&project_dir)?;

    let dockerfile = DockerfileGenerator::new(&plan).render();
    galley_build::eject::eject(&project_dir, &dockerfile)?;

    println!("Ejected build config to .galley/Dockerfile");
    println!("You can now edit it directly. galley build will use this file");
    println!("and audit it before every build.");
    Ok(())
}
