use galley_docker::DockerClient;
use std::path::PathBuf;

use super::load_plan;

pub async fn verify(image: Option<&str>) -> anyhow::Result<()> {
    let project_dir = PathBuf::from(".");
    let (config, plan) = load_plan(&project_dir)?;
    let reference = image.map_or_else(|| config.image_name(), str::to_owned);

    let client = DockerClient::new();
    if !client.image_exists(&reference).await {
        anyhow::bail!("image {reference} not found. Run `galley build` first.");
    }

    println!("Verifying {reference}...");
    let report = client.verify_image(&reference, &plan).await?;
    println!();
    print!("{report}");

    if !report.all_passed() {
        anyhow::bail!("verification failed: {}", report.failures().join(", "));
    }
    Ok(())
}
