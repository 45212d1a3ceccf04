use galley_build::ComposeGenerator;
use galley_docker::DockerClient;
use std::path::{Path, PathBuf};

use super::load_plan;

/// Print the generated compose file.
pub async fn compose() -> anyhow::Result<()> {
    let project_dir = PathBuf::from(".");
    let (config, plan) = load_plan(&project_dir)?;

    print!("{}", ComposeGenerator::new(&config, &plan).render());
    Ok(())
}

pub async fn up() -> anyhow::Result<()> {
    let project_dir = PathBuf::from(".");
    let (config, _) = load_plan(&project_dir)?;
    let file = compose_file(&project_dir, &config.compose.file)?;

    DockerClient::new().compose_up(&file).await?;
    Ok(())
}

/// Run the configured test command in a one-off app container.
pub async fn test() -> anyhow::Result<()> {
    let project_dir = PathBuf::from(".");
    let (config, _) = load_plan(&project_dir)?;
    let file = compose_file(&project_dir, &config.compose.file)?;

    println!("Running: {}", config.compose.test_command);
    DockerClient::new()
        .compose_run(&file, &config.compose.service, &config.compose.test_command)
        .await?;
    Ok(())
}

pub async fn down() -> anyhow::Result<()> {
    let project_dir = PathBuf::from(".");
    let (config, _) = load_plan(&project_dir)?;
    let file = compose_file(&project_dir, &config.compose.file)?;

    DockerClient::new().compose_down(&file).await?;
    Ok(())
}

fn compose_file(project_dir: &Path, name: &str) -> anyhow::Result<PathBuf> {
    let path = project_dir.join(name);
    if !path.is_file() {
        anyhow::bail!(
            "{name} not found. Run `galley init`, or `galley compose > {name}`."
        );
    }
    Ok(path)
}
