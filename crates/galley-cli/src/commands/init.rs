use galley_build::ComposeGenerator;
use galley_build::context::CONTEXT_DIR;
use galley_core::CONFIG_FILE;
use std::path::Path;

use super::load_plan;

const GALLEY_TOML: &str = r#"[project]
name = "recipe-app"
# tag = "latest"

[image]
base_image = "python:3.7-alpine"
# maintainer = "Your Name"

[dependencies]
manifest = "requirements.txt"
# package_manager = "apk"
# runtime_packages = ["postgresql-client", "jpeg-dev"]
# build_packages = ["gcc", "libc-dev", "linux-headers", "postgresql-dev", "musl-dev", "zlib", "zlib-dev"]

[app]
source = "app"
# workdir = "/app"

[volumes]
# root = "/vol/web"
# dirs = ["media", "static"]
# mode = "755"

[user]
# name = "user"

[compose]
# port = 8000
# test_command = "python manage.py test && flake8"
"#;

/// Initialize galley in an existing Python project.
pub async fn init_project() -> anyhow::Result<()> {
    let project_dir = Path::new(".");
    let mut created = Vec::new();

    // galley.toml
    let config_path = project_dir.join(CONFIG_FILE);
    if config_path.exists() {
        eprintln!("{CONFIG_FILE} already exists, skipping");
    } else {
        std::fs::write(&config_path, GALLEY_TOML)?;
        created.push(CONFIG_FILE.to_owned());
    }

    // Compose file, rendered from whatever galley.toml now says
    let (config, plan) = load_plan(project_dir)?;
    let compose_path = project_dir.join(&config.compose.file);
    if compose_path.exists() {
        eprintln!("{} already exists, skipping", config.compose.file);
    } else {
        std::fs::write(&compose_path, ComposeGenerator::new(&config, &plan).render())?;
        created.push(config.compose.file.clone());
    }

    // Keep the build context out of git so it never marks the tree dirty
    let gitignore_path = project_dir.join(".gitignore");
    let entry = format!("{CONTEXT_DIR}/");
    let gitignore = if gitignore_path.exists() {
        std::fs::read_to_string(&gitignore_path)?
    } else {
        String::new()
    };
    if !gitignore.lines().any(|l| l.trim() == entry || l.trim() == CONTEXT_DIR) {
        let mut updated = gitignore;
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(&entry);
        updated.push('\n');
        std::fs::write(&gitignore_path, updated)?;
        created.push(".gitignore entry".to_owned());
    }

    if created.is_empty() {
        println!("Nothing to create, already initialized.");
    } else {
        for f in &created {
            println!("Created {f}");
        }
    }

    println!();
    println!("Next steps:");
    println!();
    println!("  1. Check the Dockerfile galley will build:");
    println!("     galley render");
    println!();
    println!("  2. Build, verify, and tag the image:");
    println!("     galley build");
    println!();
    println!("  3. Run the tests inside the image, then start the app:");
    println!("     galley test");
    println!("     galley up");

    Ok(())
}
