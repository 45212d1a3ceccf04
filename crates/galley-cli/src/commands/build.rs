use galley_build::context;
use galley_build::eject::is_ejected;
use galley_docker::DockerClient;
use std::path::PathBuf;

use super::{current_dockerfile, load_plan};

/// File `docker build` writes the image id to, inside the context directory.
const IIDFILE: &str = "image.iid";

/// Execute the full build pipeline.
///
/// The image is only tagged once every earlier step has succeeded, so a
/// failure at any point leaves the previous `name:tag` untouched.
pub async fn build(allow_dirty: bool, no_verify: bool) -> anyhow::Result<()> {
    let project_dir = PathBuf::from(".");
    let client = DockerClient::new();

    // Dirty check: refuse to build uncommitted changes unless --allow-dirty
    if !allow_dirty && context::is_dirty(&project_dir)? {
        anyhow::bail!(
            "uncommitted changes detected.\n\
             Commit your changes, or use `galley build --allow-dirty` to build anyway."
        );
    }

    // Load configuration
    let (config, plan) = load_plan(&project_dir)?;
    let image_name = config.image_name();

    // Determine Dockerfile content
    if is_ejected(&project_dir) {
        println!("Using ejected Dockerfile from .galley/Dockerfile");
    }
    let dockerfile = current_dockerfile(&project_dir, &plan)?;

    println!("Auditing Dockerfile...");
    let report = galley_build::audit::audit(&dockerfile, &plan);
    if !report.is_clean() {
        print!("{report}");
    }
    if report.has_errors() {
        anyhow::bail!("audit failed; the image was not built");
    }

    println!("Assembling build context...");
    let context_dir = context::create_context(&project_dir, &plan, &dockerfile)?;

    println!("Building image...");
    let image_id = client
        .build_image(&context_dir, &context_dir.join(IIDFILE))
        .await?;

    if no_verify {
        println!("Skipping verification (--no-verify)");
    } else {
        println!("Verifying image {image_id}...");
        let verification = client.verify_image(&image_id.0, &plan).await?;
        print!("{verification}");
        if !verification.all_passed() {
            anyhow::bail!(
                "verification failed: {}; {image_name} was not updated",
                verification.failures().join(", ")
            );
        }
    }

    if client.image_exists(&image_name).await {
        match client.cache_report(&image_name, &image_id.0, &plan).await {
            Ok(cache) => {
                tracing::info!(%cache, "layer cache");
                println!("Layer cache: {cache}");
            }
            Err(e) => tracing::warn!(error = %e, "could not compare layers with {image_name}"),
        }
    }

    client.tag_image(&image_id, &image_name).await?;

    println!();
    println!("Built: {image_name} ({image_id})");
    Ok(())
}
