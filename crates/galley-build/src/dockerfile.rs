use galley_core::{BuildStep, ImagePlan, PackageManager};

use crate::quote::{dockerfile_quoted, dockerfile_value, json_array};

/// Renders an [`ImagePlan`] as a single-stage Dockerfile.
///
/// Rendering is a pure function of the plan: the same plan always produces
/// byte-identical output.
pub struct DockerfileGenerator<'a> {
    plan: &'a ImagePlan,
}

impl<'a> DockerfileGenerator<'a> {
    pub fn new(plan: &'a ImagePlan) -> Self {
        Self { plan }
    }

    pub fn render(&self) -> String {
        let mut out = String::from(
            "# Generated by galley from galley.toml. Run `galley eject` to customize.\n",
        );

        let mut section = None;
        for step in self.plan.steps() {
            let heading = section_for(step);
            if section != Some(heading) {
                out.push('\n');
                out.push_str(&format!("# === {heading} ===\n"));
                section = Some(heading);
            }
            out.push_str(&render_step(step));
        }

        out
    }
}

fn section_for(step: &BuildStep) -> &'static str {
    use galley_core::StepKind::*;
    match step.kind() {
        Base | Environment => "Base",
        CopyManifest | RuntimePackages | BuildPackages | InstallManifest
        | RemoveBuildPackages => "Dependencies",
        CopySource => "Application",
        VolumeDirs | CreateUser | ChownVolumes | ChmodVolumes | SwitchUser => {
            "Shared volumes and execution account"
        }
        Command => "Runtime",
    }
}

fn render_step(step: &BuildStep) -> String {
    match step {
        BuildStep::From { image } => format!("FROM {image}\n"),
        BuildStep::Label { key, value } => format!("LABEL {key}={}\n", dockerfile_quoted(value)),
        BuildStep::Env { key, value } => format!("ENV {key}={}\n", dockerfile_value(value)),
        BuildStep::CopyManifest { src, dest } => format!("COPY ./{src} {dest}\n"),
        BuildStep::InstallRuntimePackages { manager, packages } => {
            format!("RUN {}\n", install_command(*manager, None, packages))
        }
        BuildStep::InstallBuildPackages {
            manager,
            group,
            packages,
        } => format!("RUN {}\n", install_command(*manager, Some(group), packages)),
        BuildStep::InstallManifest { command, manifest } => {
            format!("RUN {command} {manifest}\n")
        }
        BuildStep::RemoveBuildPackages {
            manager,
            group,
            packages,
        } => match manager {
            PackageManager::Apk => format!("RUN apk del {group}\n"),
            PackageManager::Apt => format!("RUN apt-get purge -y {}\n", packages.join(" ")),
        },
        BuildStep::CopySource { src, workdir } => {
            format!("WORKDIR {workdir}\nCOPY ./{src} {workdir}\n")
        }
        BuildStep::CreateVolumeDirs { paths } => format!("RUN mkdir -p {}\n", paths.join(" ")),
        BuildStep::CreateUser { manager, name } => match manager {
            PackageManager::Apk => format!("RUN adduser -D -H -s /sbin/nologin {name}\n"),
            PackageManager::Apt => format!(
                "RUN useradd --system --no-create-home --shell /usr/sbin/nologin {name}\n"
            ),
        },
        BuildStep::ChownVolumes { root, user } => format!("RUN chown -R {user}:{user} {root}\n"),
        BuildStep::ChmodVolumes { root, mode } => format!("RUN chmod -R {mode} {root}\n"),
        BuildStep::SwitchUser { name } => format!("USER {name}\n"),
        BuildStep::Cmd { args } => format!("CMD {}\n", json_array(args)),
    }
}

fn install_command(manager: PackageManager, group: Option<&String>, packages: &[String]) -> String {
    let list = if packages.len() > 3 {
        format!("\\\n      {}", packages.join(" "))
    } else {
        packages.join(" ")
    };
    match (manager, group) {
        (PackageManager::Apk, Some(group)) => {
            format!("apk add --update --no-cache --virtual {group} {list}")
        }
        (PackageManager::Apk, None) => format!("apk add --update --no-cache {list}"),
        (PackageManager::Apt, _) => format!(
            "apt-get update && apt-get install -y --no-install-recommends {list} && rm -rf /var/lib/apt/lists/*"
        ),
    }
}
