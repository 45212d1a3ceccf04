mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "galley",
    about = "Build least-privilege container images for Python web apps"
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write galley.toml and the compose file into the current project
    Init,
    /// Print the generated Dockerfile
    Render,
    /// Eject the Dockerfile for manual customization
    Eject,
    /// Check the Dockerfile against the image plan
    Audit,
    /// Print the generated compose file
    Compose,
    /// Build, verify, and tag the image
    Build {
        /// Allow building with uncommitted changes
        #[arg(long)]
        allow_dirty: bool,
        /// Tag the image without running the in-image checks
        #[arg(long)]
        no_verify: bool,
    },
    /// Rebuild the image (same as build)
    Rebuild {
        /// Allow building with uncommitted changes
        #[arg(long)]
        allow_dirty: bool,
        /// Tag the image without running the in-image checks
        #[arg(long)]
        no_verify: bool,
    },
    /// Run the in-image checks against an existing image
    Verify {
        /// Image reference (default: name:tag from galley.toml)
        image: Option<String>,
    },
    /// Bring the composed system up
    Up,
    /// Run the test command inside the built image
    Test,
    /// Stop and remove the composed system
    Down,
    /// Check Docker setup and project readiness
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => commands::init_project().await?,
        Commands::Render => commands::render().await?,
        Commands::Eject => commands::eject().await?,
        Commands::Audit => commands::audit().await?,
        Commands::Compose => commands::compose().await?,
        Commands::Build {
            allow_dirty,
            no_verify,
        }
        | Commands::Rebuild {
            allow_dirty,
            no_verify,
        } => commands::build(allow_dirty, no_verify).await?,
        Commands::Verify { image } => commands::verify(image.as_deref()).await?,
        Commands::Up => commands::up().await?,
        Commands::Test => commands::test().await?,
        Commands::Down => commands::down().await?,
        Commands::Doctor => commands::doctor().await?,
    }

    Ok(())
}
