use galley_build::eject::is_ejected;
use std::path::PathBuf;

use super::{current_dockerfile, load_plan};

pub async fn audit() -> anyhow::Result<()> {
    let project_dir = PathBuf::from(".");
    let (_, plan) = load_plan(&project_dir)?;
    let dockerfile = current_dockerfile(&project_dir, &plan)?;

    let source = if is_ejected(&project_dir) {
        ".galley/Dockerfile"
    } else {
        "generated Dockerfile"
    };
    println!("Auditing {source}...");

    let report = galley_build::audit::audit(&dockerfile, &plan);
    print!("{report}");

    if report.has_errors() {
        anyhow::bail!("audit failed");
    }
    Ok(())
}
