use galley_core::{CONFIG_FILE, GalleyConfig};
use galley_docker::{CheckResult, DockerClient};
use std::path::Path;

pub async fn doctor() -> anyhow::Result<()> {
    let project_dir = Path::new(".");
    let client = DockerClient::new();
    let mut report = client.doctor().await;

    // Project checks run against defaults when galley.toml is unusable.
    let config = match GalleyConfig::load(project_dir) {
        Ok(config) => {
            report.config_file = if project_dir.join(CONFIG_FILE).exists() {
                CheckResult::ok("Found")
            } else {
                CheckResult::ok("Not found, using defaults")
            };
            config
        }
        Err(e) => {
            report.config_file = CheckResult::fail(&e.to_string());
            GalleyConfig::default()
        }
    };

    let manifest = &config.dependencies.manifest;
    report.manifest = if project_dir.join(manifest).is_file() {
        CheckResult::ok(manifest)
    } else {
        CheckResult::fail(&format!("{manifest} not found"))
    };

    let source = &config.app.source;
    report.source = if project_dir.join(source).is_dir() {
        CheckResult::ok(source)
    } else {
        CheckResult::fail(&format!("{source}/ not found"))
    };

    println!();
    println!("{report}");

    if !report.all_passed() {
        anyhow::bail!("some checks failed, see above for details");
    }

    Ok(())
}
