use galley_build::audit::{self, Rule, Severity};
use galley_build::dockerfile::DockerfileGenerator;
use galley_core::{GalleyConfig, ImagePlan};

fn plan() -> ImagePlan {
    ImagePlan::from_config(&GalleyConfig::default()).unwrap()
}

fn generated() -> String {
    DockerfileGenerator::new(&plan()).render()
}

/// The generated Dockerfile with `from` replaced by `to`.
fn edited(from: &str, to: &str) -> String {
    let original = generated();
    assert!(original.contains(from), "fixture does not contain {from:?}");
    original.replace(from, to)
}

// ── Parser ──

#[test]
fn parse_joins_continuations_and_skips_comments() {
    let dockerfile = "\
# comment
FROM python:3.7-alpine

run apk add --no-cache \\
    # inline comment
    gcc \\
    musl-dev
USER user
";
    let instructions = audit::parse(dockerfile);

    assert_eq!(instructions.len(), 3);
    assert_eq!(instructions[0].keyword, "FROM");
    assert_eq!(instructions[0].line, 2);
    assert_eq!(instructions[1].keyword, "RUN");
    assert_eq!(instructions[1].line, 4);
    assert_eq!(instructions[1].args, "apk add --no-cache gcc musl-dev");
    assert_eq!(instructions[2].line, 8);
}

// ── Clean input ──

#[test]
fn generated_dockerfile_is_clean() {
    let report = audit::audit(&generated(), &plan());

    assert!(report.is_clean(), "{report}");
    assert!(!report.has_errors());
    assert_eq!(report.to_string(), "No findings.\n");
}

#[test]
fn combined_run_steps_are_understood() {
    let dockerfile = "\
FROM python:3.7-alpine
ENV PYTHONUNBUFFERED 1
COPY requirements.txt /requirements.txt
RUN apk add --update --no-cache postgresql-client jpeg-dev && \\
    apk add --update --no-cache --virtual=.tmp-build-deps gcc libc-dev linux-headers postgresql-dev musl-dev zlib zlib-dev && \\
    pip install -r /requirements.txt && \\
    apk del .tmp-build-deps
WORKDIR /app
COPY ./app/ /app
RUN mkdir -p /vol/web/media /vol/web/static && \\
    adduser -D user && \\
    chown -R user:user /vol/ && \\
    chmod -R 755 /vol/web
USER user
";
    let report = audit::audit(dockerfile, &plan());

    assert!(report.is_clean(), "{report}");
}

// ── Base image ──

#[test]
fn flags_unpinned_base() {
    let report = audit::audit(
        &edited("FROM python:3.7-alpine", "FROM python:latest"),
        &plan(),
    );

    assert!(report.has_rule(Rule::UnpinnedBase));
    assert!(report.has_errors());
}

#[test]
fn stage_alias_is_not_an_image() {
    let dockerfile = generated().replace(
        "FROM python:3.7-alpine",
        "FROM python:3.7-alpine AS base\nFROM base",
    );

    let report = audit::audit(&dockerfile, &plan());

    assert!(!report.has_rule(Rule::UnpinnedBase), "{report}");
}

// ── Layer cache ordering ──

#[test]
fn flags_source_copied_before_manifest() {
    let dockerfile = generated()
        .replace("COPY ./requirements.txt /requirements.txt\n", "")
        .replace(
            "COPY ./app /app\n",
            "COPY ./app /app\nCOPY ./requirements.txt /requirements.txt\n",
        );

    let report = audit::audit(&dockerfile, &plan());

    assert!(report.has_rule(Rule::ManifestNotFirst));
}

#[test]
fn flags_copy_everything() {
    let dockerfile = edited("COPY ./requirements.txt /requirements.txt", "COPY . /");

    let report = audit::audit(&dockerfile, &plan());

    assert!(report.has_rule(Rule::ManifestNotFirst));
}

#[test]
fn flags_install_before_manifest() {
    let dockerfile = edited(
        "COPY ./requirements.txt /requirements.txt",
        "RUN pip install -r /requirements.txt\nCOPY ./requirements.txt /requirements.txt",
    );

    let report = audit::audit(&dockerfile, &plan());

    assert!(report.has_rule(Rule::InstallBeforeManifest));
}

// ── Build dependencies ──

#[test]
fn flags_build_group_left_installed() {
    let report = audit::audit(&edited("RUN apk del .tmp-build-deps\n", ""), &plan());

    assert!(report.has_rule(Rule::BuildDepsNotRemoved));
    let count = report
        .findings
        .iter()
        .filter(|f| f.rule == Rule::BuildDepsNotRemoved)
        .count();
    assert_eq!(count, 7);
}

#[test]
fn flags_build_packages_installed_without_group() {
    let dockerfile = edited(
        "--virtual .tmp-build-deps ",
        "",
    )
    .replace("RUN apk del .tmp-build-deps\n", "RUN apk del gcc libc-dev\n");

    let report = audit::audit(&dockerfile, &plan());

    let flagged: Vec<_> = report
        .findings
        .iter()
        .filter(|f| f.rule == Rule::BuildDepsNotRemoved)
        .collect();
    assert_eq!(flagged.len(), 5);
    assert!(!flagged.iter().any(|f| f.message.contains("'gcc'")));
}

#[test]
fn flags_removal_before_install() {
    let dockerfile = edited("RUN apk del .tmp-build-deps\n", "").replace(
        "RUN apk add --update --no-cache --virtual .tmp-build-deps",
        "RUN apk del .tmp-build-deps\nRUN apk add --update --no-cache --virtual .tmp-build-deps",
    );

    let report = audit::audit(&dockerfile, &plan());

    let count = report
        .findings
        .iter()
        .filter(|f| f.rule == Rule::BuildDepsNotRemoved)
        .count();
    assert_eq!(count, 7, "{report}");
}

#[test]
fn removal_in_same_run_after_install_is_accepted() {
    let dockerfile = edited("RUN apk del .tmp-build-deps\n", "").replace(
        "RUN pip install -r /requirements.txt",
        "RUN pip install -r /requirements.txt && apk del .tmp-build-deps",
    );

    let report = audit::audit(&dockerfile, &plan());

    assert!(!report.has_rule(Rule::BuildDepsNotRemoved), "{report}");
}

#[test]
fn flags_runtime_package_removal() {
    let report = audit::audit(
        &edited("RUN apk del .tmp-build-deps", "RUN apk del .tmp-build-deps jpeg-dev"),
        &plan(),
    );

    assert!(report.has_rule(Rule::RuntimeDepRemoved));
}

// ── Volumes ──

#[test]
fn flags_missing_volume_dir() {
    let report = audit::audit(
        &edited(
            "RUN mkdir -p /vol/web/media /vol/web/static",
            "RUN mkdir -p /vol/web/media",
        ),
        &plan(),
    );

    let finding = report
        .findings
        .iter()
        .find(|f| f.rule == Rule::MissingVolumeDir)
        .unwrap();
    assert!(finding.message.contains("/vol/web/static"));
}

#[test]
fn flags_mkdir_without_parents() {
    let report = audit::audit(
        &edited(
            "RUN mkdir -p /vol/web/media /vol/web/static",
            "RUN mkdir /vol/web/media /vol/web/static",
        ),
        &plan(),
    );

    assert!(report.has_rule(Rule::MissingVolumeDir));
}

#[test]
fn flags_volume_owned_by_other_account() {
    let report = audit::audit(
        &edited("RUN chown -R user:user /vol/web", "RUN chown -R nobody /vol/web"),
        &plan(),
    );

    assert!(report.has_rule(Rule::VolumeNotOwned));
}

#[test]
fn flags_non_recursive_chown() {
    let report = audit::audit(
        &edited("RUN chown -R user:user /vol/web", "RUN chown user:user /vol/web"),
        &plan(),
    );

    assert!(report.has_rule(Rule::VolumeNotOwned));
}

#[test]
fn flags_world_writable_volume() {
    for mode in ["777", "775", "g+w", "a+rwx", "o=rwx"] {
        let report = audit::audit(
            &edited("RUN chmod -R 755 /vol/web", &format!("RUN chmod -R {mode} /vol/web")),
            &plan(),
        );

        assert!(report.has_rule(Rule::VolumeWritable), "{mode} not flagged");
    }
}

#[test]
fn flags_writable_volume_subdirectory() {
    for line in ["RUN chmod -R 777 /vol/web/media", "RUN chmod 777 /vol/web/static"] {
        let dockerfile = edited("USER user\n", &format!("{line}\nUSER user\n"));
        let report = audit::audit(&dockerfile, &plan());

        let finding = report
            .findings
            .iter()
            .find(|f| f.rule == Rule::VolumeWritable)
            .unwrap_or_else(|| panic!("{line} not flagged"));
        assert!(finding.line.is_some());
    }
}

#[test]
fn flags_volume_subdirectory_handed_to_root() {
    let report = audit::audit(
        &edited("USER user\n", "RUN chown -R root:root /vol/web/media\nUSER user\n"),
        &plan(),
    );

    let finding = report
        .findings
        .iter()
        .find(|f| f.rule == Rule::VolumeNotOwned)
        .unwrap();
    assert!(finding.message.contains("/vol/web/media"));
}

#[test]
fn flags_recursive_chown_of_volume_parent() {
    let report = audit::audit(
        &edited("USER user\n", "RUN chown -R root /vol\nUSER user\n"),
        &plan(),
    );

    assert!(report.has_rule(Rule::VolumeNotOwned));
}

#[test]
fn unrelated_chmod_is_ignored() {
    let report = audit::audit(
        &edited("USER user\n", "RUN chmod 777 /tmp/cache\nUSER user\n"),
        &plan(),
    );

    assert!(!report.has_rule(Rule::VolumeWritable), "{report}");
}

#[test]
fn owner_only_symbolic_mode_is_accepted() {
    let report = audit::audit(
        &edited("RUN chmod -R 755 /vol/web", "RUN chmod -R u+w /vol/web"),
        &plan(),
    );

    assert!(!report.has_rule(Rule::VolumeWritable), "{report}");
}

#[test]
fn flags_missing_chmod() {
    let report = audit::audit(&edited("RUN chmod -R 755 /vol/web\n", ""), &plan());

    assert!(report.has_rule(Rule::VolumeWritable));
}

// ── User ──

#[test]
fn flags_missing_user() {
    let report = audit::audit(&edited("USER user\n", ""), &plan());

    assert!(report.has_rule(Rule::RootUser));
}

#[test]
fn flags_switch_back_to_root() {
    for user in ["root", "0", "root:root"] {
        let dockerfile = format!("{}USER {user}\n", generated());

        let report = audit::audit(&dockerfile, &plan());

        assert!(report.has_rule(Rule::RootUser), "USER {user} not flagged");
    }
}

#[test]
fn different_user_is_a_warning() {
    let dockerfile = format!("{}USER nobody\n", generated());

    let report = audit::audit(&dockerfile, &plan());

    let finding = report
        .findings
        .iter()
        .find(|f| f.rule == Rule::UserMismatch)
        .unwrap();
    assert_eq!(finding.severity, Severity::Warning);
    assert!(!report.has_errors());
}

// ── Output buffering ──

#[test]
fn missing_unbuffered_env_is_a_warning() {
    let report = audit::audit(&edited("ENV PYTHONUNBUFFERED=1\n", ""), &plan());

    assert!(report.has_rule(Rule::BufferedOutput));
    assert!(!report.has_errors());
    assert!(report.to_string().contains("warning[buffered-output]"));
}

#[test]
fn report_lists_line_numbers() {
    let report = audit::audit(
        &edited("FROM python:3.7-alpine", "FROM python"),
        &plan(),
    );

    assert!(report.to_string().contains("line 4: error[unpinned-base]"));
}
