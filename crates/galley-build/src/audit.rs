//! Static checks of a Dockerfile against the image plan.
//!
//! Generated Dockerfiles pass by construction. The audit exists for ejected
//! Dockerfiles, which users edit by hand: it catches edits that break the
//! layer-cache ordering or the least-privilege layout before anything is
//! built.

use std::collections::BTreeSet;
use std::fmt;

use galley_core::{FileMode, ImagePlan, ImageRef};

/// One logical Dockerfile instruction, continuation lines joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// 1-based line the instruction starts on
    pub line: usize,
    /// Upper-cased keyword (`RUN`, `COPY`, ...)
    pub keyword: String,
    pub args: String,
}

impl Instruction {
    fn tokens(&self) -> Vec<&str> {
        self.args.split_whitespace().collect()
    }
}

/// Split a Dockerfile into instructions.
///
/// Handles `\` line continuations and skips comment lines, including
/// comments inside a continued instruction.
pub fn parse(dockerfile: &str) -> Vec<Instruction> {
    let mut instructions = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (index, raw) in dockerfile.lines().enumerate() {
        let line = raw.trim();
        if line.starts_with('#') || (line.is_empty() && pending.is_none()) {
            continue;
        }

        let (body, continues) = match line.strip_suffix('\\') {
            Some(body) => (body.trim_end(), true),
            None => (line, false),
        };

        let (start, mut text) = pending.take().unwrap_or((index + 1, String::new()));
        if !text.is_empty() && !body.is_empty() {
            text.push(' ');
        }
        text.push_str(body);

        if continues {
            pending = Some((start, text));
        } else if !text.is_empty() {
            instructions.push(split_instruction(start, &text));
        }
    }

    if let Some((start, text)) = pending {
        if !text.is_empty() {
            instructions.push(split_instruction(start, &text));
        }
    }

    instructions
}

fn split_instruction(line: usize, text: &str) -> Instruction {
    let (keyword, args) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
    Instruction {
        line,
        keyword: keyword.to_ascii_uppercase(),
        args: args.trim().to_owned(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    UnpinnedBase,
    ManifestNotFirst,
    InstallBeforeManifest,
    BuildDepsNotRemoved,
    RuntimeDepRemoved,
    MissingVolumeDir,
    VolumeNotOwned,
    VolumeWritable,
    RootUser,
    UserMismatch,
    BufferedOutput,
}

impl Rule {
    pub fn id(self) -> &'static str {
        match self {
            Self::UnpinnedBase => "unpinned-base",
            Self::ManifestNotFirst => "manifest-not-first",
            Self::InstallBeforeManifest => "install-before-manifest",
            Self::BuildDepsNotRemoved => "build-deps-not-removed",
            Self::RuntimeDepRemoved => "runtime-dep-removed",
            Self::MissingVolumeDir => "missing-volume-dir",
            Self::VolumeNotOwned => "volume-not-owned",
            Self::VolumeWritable => "volume-writable",
            Self::RootUser => "root-user",
            Self::UserMismatch => "user-mismatch",
            Self::BufferedOutput => "buffered-output",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            Self::UserMismatch | Self::BufferedOutput => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub rule: Rule,
    pub severity: Severity,
    pub line: Option<usize>,
    pub message: String,
}

#[derive(Debug, Default, Clone)]
pub struct AuditReport {
    pub findings: Vec<Finding>,
}

impl AuditReport {
    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Error)
    }

    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn has_rule(&self, rule: Rule) -> bool {
        self.findings.iter().any(|f| f.rule == rule)
    }

    fn push(&mut self, rule: Rule, line: Option<usize>, message: String) {
        self.findings.push(Finding {
            rule,
            severity: rule.severity(),
            line,
            message,
        });
    }
}

impl fmt::Display for AuditReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.findings.is_empty() {
            return writeln!(f, "No findings.");
        }
        for finding in &self.findings {
            let level = match finding.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
            };
            match finding.line {
                Some(line) => writeln!(
                    f,
                    "line {line}: {level}[{}]: {}",
                    finding.rule.id(),
                    finding.message
                )?,
                None => writeln!(f, "{level}[{}]: {}", finding.rule.id(), finding.message)?,
            }
        }
        Ok(())
    }
}

/// Audit `dockerfile` against the expectations of `plan`.
pub fn audit(dockerfile: &str, plan: &ImagePlan) -> AuditReport {
    let instructions = parse(dockerfile);
    let mut report = AuditReport::default();

    check_base_images(&instructions, &mut report);
    let manifest_at = check_copy_order(&instructions, plan, &mut report);
    check_install_order(&instructions, plan, manifest_at, &mut report);
    check_build_dependencies(&instructions, plan, &mut report);
    check_volumes(&instructions, plan, &mut report);
    check_user(&instructions, plan, &mut report);
    check_unbuffered(&instructions, plan, &mut report);

    tracing::debug!(findings = report.findings.len(), "dockerfile audited");
    report
}

fn check_base_images(instructions: &[Instruction], report: &mut AuditReport) {
    let mut stages = BTreeSet::new();
    for inst in instructions.iter().filter(|i| i.keyword == "FROM") {
        let tokens = inst.tokens();
        let mut rest = tokens.iter().skip_while(|t| t.starts_with("--"));
        let Some(image) = rest.next() else {
            report.push(Rule::UnpinnedBase, Some(inst.line), "FROM without an image".to_owned());
            continue;
        };

        if !stages.contains(&image.to_ascii_lowercase()) {
            match ImageRef::parse(image) {
                Ok(parsed) if parsed.is_pinned() => {}
                Ok(_) => report.push(
                    Rule::UnpinnedBase,
                    Some(inst.line),
                    format!("base image '{image}' is not pinned to an exact version"),
                ),
                Err(e) => report.push(Rule::UnpinnedBase, Some(inst.line), e.to_string()),
            }
        }

        if let (Some(kw), Some(alias)) = (rest.next(), rest.next()) {
            if kw.eq_ignore_ascii_case("as") {
                stages.insert(alias.to_ascii_lowercase());
            }
        }
    }
}

fn same_path(a: &str, b: &str) -> bool {
    let norm = |p: &str| {
        let p = p.strip_prefix("./").unwrap_or(p);
        let p = p.trim_end_matches('/');
        if p.is_empty() { ".".to_owned() } else { p.to_owned() }
    };
    norm(a) == norm(b)
}

/// `path` is `ancestor` or lies beneath it.
fn is_within(path: &str, ancestor: &str) -> bool {
    let ancestor = ancestor.trim_end_matches('/');
    let path = path.trim_end_matches('/');
    path == ancestor || path.starts_with(&format!("{ancestor}/")) || ancestor.is_empty()
}

/// Returns the index of the manifest copy, if any.
fn check_copy_order(
    instructions: &[Instruction],
    plan: &ImagePlan,
    report: &mut AuditReport,
) -> Option<usize> {
    let mut manifest_at = None;
    let mut source_at = None;

    for (index, inst) in instructions.iter().enumerate() {
        if inst.keyword != "COPY" && inst.keyword != "ADD" {
            continue;
        }
        let tokens: Vec<&str> = inst
            .tokens()
            .into_iter()
            .filter(|t| !t.starts_with("--"))
            .collect();
        let Some((_, sources)) = tokens.split_last() else {
            continue;
        };

        if manifest_at.is_none() && sources.iter().any(|s| same_path(s, plan.manifest_src())) {
            manifest_at = Some(index);
        }
        let copies_source = sources
            .iter()
            .any(|s| same_path(s, plan.source_src()) || same_path(s, "."));
        if source_at.is_none() && copies_source {
            source_at = Some(index);
        }
    }

    match (manifest_at, source_at) {
        (None, _) => report.push(
            Rule::ManifestNotFirst,
            None,
            format!(
                "'{}' is never copied on its own; dependency layers cannot be cached",
                plan.manifest_src()
            ),
        ),
        (Some(m), Some(s)) if s <= m => report.push(
            Rule::ManifestNotFirst,
            Some(instructions[s].line),
            format!(
                "source is copied before '{}'; every source edit reinstalls dependencies",
                plan.manifest_src()
            ),
        ),
        _ => {}
    }

    manifest_at
}

fn check_install_order(
    instructions: &[Instruction],
    plan: &ImagePlan,
    manifest_at: Option<usize>,
    report: &mut AuditReport,
) {
    let Some(manifest_at) = manifest_at else {
        return;
    };
    let install = plan.install_command();
    let early = instructions
        .iter()
        .take(manifest_at)
        .find(|i| i.keyword == "RUN" && i.args.contains(install));
    if let Some(inst) = early {
        report.push(
            Rule::InstallBeforeManifest,
            Some(inst.line),
            format!("'{install}' runs before the manifest is copied"),
        );
    }
}

/// Non-flag arguments following `command` (e.g. `["apk", "del"]`) up to the
/// next shell separator, for every occurrence in `tokens`.
fn command_args<'a>(tokens: &[&'a str], command: &[&str]) -> Vec<&'a str> {
    command_args_at(tokens, command)
        .into_iter()
        .map(|(_, word)| word)
        .collect()
}

/// [`command_args`] with the token index of each argument.
fn command_args_at<'a>(tokens: &[&'a str], command: &[&str]) -> Vec<(usize, &'a str)> {
    let mut args = Vec::new();
    let mut i = 0;
    while i + command.len() <= tokens.len() {
        if tokens[i..i + command.len()] == *command {
            i += command.len();
            while i < tokens.len() {
                let token = tokens[i];
                if matches!(token, "&&" | "||" | ";" | "|") {
                    break;
                }
                let (word, ends) = match token.strip_suffix(';') {
                    Some(word) => (word, true),
                    None => (token, false),
                };
                if !word.starts_with('-') && !word.is_empty() {
                    args.push((i, word));
                }
                i += 1;
                if ends {
                    break;
                }
            }
        } else {
            i += 1;
        }
    }
    args
}

/// Name given to `--virtual`/`-t` in an `apk add`.
fn virtual_group<'a>(tokens: &[&'a str]) -> Option<&'a str> {
    let mut iter = tokens.iter().copied();
    while let Some(token) = iter.next() {
        if let Some(name) = token.strip_prefix("--virtual=") {
            return Some(name);
        }
        if token == "--virtual" || token == "-t" {
            return iter.next();
        }
    }
    None
}

fn check_build_dependencies(
    instructions: &[Instruction],
    plan: &ImagePlan,
    report: &mut AuditReport,
) {
    let build: BTreeSet<&str> = plan.build_packages().iter().map(String::as_str).collect();
    let runtime: BTreeSet<&str> = plan.runtime_packages().iter().map(String::as_str).collect();

    // Positions are (instruction index, token index) so a removal only
    // counts when it runs after the install.
    let mut installed: Vec<(&str, (usize, usize), usize, Option<&str>)> = Vec::new();
    let mut removed: Vec<(&str, (usize, usize))> = Vec::new();

    for (index, inst) in instructions.iter().enumerate() {
        if inst.keyword != "RUN" {
            continue;
        }
        let tokens = inst.tokens();

        let group = virtual_group(&tokens);
        let added = command_args_at(&tokens, &["apk", "add"])
            .into_iter()
            .chain(command_args_at(&tokens, &["apt-get", "install"]));
        for (at, pkg) in added {
            if build.contains(pkg) {
                installed.push((pkg, (index, at), inst.line, group));
            }
        }

        let removals = command_args_at(&tokens, &["apk", "del"])
            .into_iter()
            .chain(command_args_at(&tokens, &["apt-get", "purge"]))
            .chain(command_args_at(&tokens, &["apt-get", "remove"]));
        for (at, name) in removals {
            if runtime.contains(name) {
                report.push(
                    Rule::RuntimeDepRemoved,
                    Some(inst.line),
                    format!("runtime package '{name}' is removed"),
                );
            }
            removed.push((name, (index, at)));
        }
    }

    for (pkg, installed_at, line, group) in installed {
        let gone = removed.iter().any(|(name, removed_at)| {
            *removed_at > installed_at && (*name == pkg || group == Some(*name))
        });
        if !gone {
            report.push(
                Rule::BuildDepsNotRemoved,
                Some(line),
                format!("build package '{pkg}' is installed but never removed afterwards"),
            );
        }
    }
}

fn check_volumes(instructions: &[Instruction], plan: &ImagePlan, report: &mut AuditReport) {
    let root = plan.volume_root();
    let runs: Vec<(&Instruction, Vec<&str>)> = instructions
        .iter()
        .filter(|i| i.keyword == "RUN")
        .map(|i| (i, i.tokens()))
        .collect();

    let mut last_mkdir = 0;
    for path in plan.volume_paths() {
        let created = runs.iter().find(|(_, tokens)| {
            tokens.iter().any(|t| *t == "-p" || *t == "--parents")
                && command_args(tokens, &["mkdir"])
                    .iter()
                    .any(|a| same_path(a, &path))
        });
        match created {
            Some((inst, _)) => last_mkdir = last_mkdir.max(inst.line),
            None => report.push(
                Rule::MissingVolumeDir,
                None,
                format!("'{path}' is not created with mkdir -p"),
            ),
        }
    }

    let owned = runs.iter().any(|(inst, tokens)| {
        let args = command_args(tokens, &["chown"]);
        inst.line >= last_mkdir
            && is_recursive(tokens)
            && args.split_first().is_some_and(|(owner, targets)| {
                owner_name(owner) == plan.user() && targets.iter().any(|t| is_within(root, t))
            })
    });
    if !owned {
        report.push(
            Rule::VolumeNotOwned,
            None,
            format!(
                "'{root}' is not recursively owned by '{}' after its directories are created",
                plan.user()
            ),
        );
    }

    for (inst, tokens) in &runs {
        let args = command_args(tokens, &["chown"]);
        let Some((owner, targets)) = args.split_first() else {
            continue;
        };
        if owner_name(owner) == plan.user() {
            continue;
        }
        if let Some(target) = touches_volume(tokens, targets, root) {
            report.push(
                Rule::VolumeNotOwned,
                Some(inst.line),
                format!("'{target}' is handed to '{owner}' instead of '{}'", plan.user()),
            );
        }
    }

    let mut chmod_seen = false;
    for (inst, tokens) in &runs {
        let args = command_args(tokens, &["chmod"]);
        let Some((mode, targets)) = args.split_first() else {
            continue;
        };
        if is_recursive(tokens) && targets.iter().any(|t| is_within(root, t)) {
            chmod_seen = true;
        }
        let Some(target) = touches_volume(tokens, targets, root) else {
            continue;
        };

        let writable = FileMode::parse(mode).is_ok_and(FileMode::others_can_write)
            || symbolic_grants_write(mode);
        if writable {
            report.push(
                Rule::VolumeWritable,
                Some(inst.line),
                format!("mode {mode} lets group or others write to '{target}'"),
            );
        }
    }
    if !chmod_seen {
        report.push(
            Rule::VolumeWritable,
            None,
            format!("'{root}' has no recursive chmod; permissions depend on the base image"),
        );
    }
}

/// User part of a `user:group` or `user.group` owner argument.
fn owner_name(owner: &str) -> &str {
    owner.split([':', '.']).next().unwrap_or(owner)
}

/// First target that lies inside `root`, or that contains it when the
/// command recurses.
fn touches_volume<'a>(tokens: &[&str], targets: &[&'a str], root: &str) -> Option<&'a str> {
    let recursive = is_recursive(tokens);
    targets
        .iter()
        .copied()
        .find(|t| is_within(t, root) || (recursive && is_within(root, t)))
}

fn is_recursive(tokens: &[&str]) -> bool {
    tokens.iter().any(|t| *t == "-R" || *t == "--recursive")
}

/// `g+w`, `o=rwx`, `a+w`, `+w` and friends.
fn symbolic_grants_write(mode: &str) -> bool {
    mode.split(',').any(|clause| {
        let Some(op) = clause.find(['+', '=']) else {
            return false;
        };
        let (who, perms) = clause.split_at(op);
        let others = who.is_empty() || who.contains(['g', 'o', 'a']);
        others && perms.contains('w')
    })
}

fn check_user(instructions: &[Instruction], plan: &ImagePlan, report: &mut AuditReport) {
    let last_user = instructions.iter().rev().find(|i| i.keyword == "USER");
    let Some(inst) = last_user else {
        report.push(
            Rule::RootUser,
            None,
            "no USER instruction; containers run as root".to_owned(),
        );
        return;
    };

    let name = inst.args.split(':').next().unwrap_or("").trim();
    if name.is_empty() || name == "root" || name.chars().all(|c| c == '0') {
        report.push(
            Rule::RootUser,
            Some(inst.line),
            format!("final USER '{}' is privileged", inst.args),
        );
    } else if name != plan.user() {
        report.push(
            Rule::UserMismatch,
            Some(inst.line),
            format!("final USER '{name}' is not the configured account '{}'", plan.user()),
        );
    }
}

fn check_unbuffered(instructions: &[Instruction], plan: &ImagePlan, report: &mut AuditReport) {
    let key = plan.unbuffered_env();
    let set = instructions.iter().filter(|i| i.keyword == "ENV").any(|i| {
        i.args
            .split_whitespace()
            .next()
            .is_some_and(|first| first == key)
            || i.args
                .split_whitespace()
                .any(|pair| pair.split_once('=').is_some_and(|(k, _)| k == key))
    });
    if !set {
        report.push(
            Rule::BufferedOutput,
            None,
            format!("{key} is not set; log lines may be held in the output buffer"),
        );
    }
}
