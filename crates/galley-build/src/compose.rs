use std::collections::BTreeMap;

use galley_core::{GalleyConfig, ImagePlan};

use crate::quote::{compose_string, json_string};

/// Named volume mounted at the shared-volume root, so sibling services
/// (a static file server, for instance) see the same media and static files.
pub const SHARED_VOLUME: &str = "web-data";

const DATABASE_SERVICE: &str = "db";

/// Renders the docker-compose file that runs the built image for local
/// development and tests.
pub struct ComposeGenerator<'a> {
    config: &'a GalleyConfig,
    plan: &'a ImagePlan,
}

impl<'a> ComposeGenerator<'a> {
    pub fn new(config: &'a GalleyConfig, plan: &'a ImagePlan) -> Self {
        Self { config, plan }
    }

    pub fn render(&self) -> String {
        let compose = &self.config.compose;
        let has_database = !compose.database_image.trim().is_empty();
        let port = compose.port;

        let mut out = String::from("# Generated by galley from galley.toml\n");
        out.push_str("services:\n");
        out.push_str(&format!("  {}:\n", compose.service));
        out.push_str(&format!(
            "    image: {}\n",
            json_string(&self.config.image_name())
        ));
        out.push_str(&format!("    ports:\n      - \"{port}:{port}\"\n"));
        out.push_str(&format!(
            "    volumes:\n      - ./{src}:{workdir}\n      - {SHARED_VOLUME}:{root}\n",
            src = self.plan.source_src(),
            workdir = self.plan.workdir(),
            root = self.plan.volume_root(),
        ));
        out.push_str(&format!(
            "    command: [\"sh\", \"-c\", {}]\n",
            compose_string(&compose.command)
        ));
        out.push_str(&environment(&compose.app_env, "    "));
        if has_database {
            out.push_str(&format!("    depends_on:\n      - {DATABASE_SERVICE}\n"));

            out.push('\n');
            out.push_str(&format!("  {DATABASE_SERVICE}:\n"));
            out.push_str(&format!(
                "    image: {}\n",
                json_string(&compose.database_image)
            ));
            out.push_str(&environment(&compose.database_env, "    "));
        }

        out.push('\n');
        out.push_str(&format!("volumes:\n  {SHARED_VOLUME}:\n"));
        out
    }
}

fn environment(env: &BTreeMap<String, String>, indent: &str) -> String {
    if env.is_empty() {
        return String::new();
    }
    let mut out = format!("{indent}environment:\n");
    for (key, value) in env {
        out.push_str(&format!(
            "{indent}  - {}\n",
            compose_string(&format!("{key}={value}"))
        ));
    }
    out
}
