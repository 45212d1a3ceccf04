use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// galley.toml configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GalleyConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub dependencies: DependencyConfig,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub volumes: VolumeConfig,
    #[serde(default)]
    pub user: UserConfig,
    #[serde(default)]
    pub compose: ComposeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Image repository name
    #[serde(default = "default_project_name")]
    pub name: String,
    /// Tag applied to the image once it has been built and verified
    #[serde(default = "default_tag")]
    pub tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Runtime base image, pinned to an exact version
    #[serde(default = "default_base_image")]
    pub base_image: String,
    /// Optional `LABEL maintainer=...`
    #[serde(default)]
    pub maintainer: Option<String>,
    /// Environment variable that disables output buffering of the runtime
    #[serde(default = "default_unbuffered_env")]
    pub unbuffered_env: String,
    /// Static environment variables baked into the image.
    /// Rendered sorted by key so the Dockerfile is reproducible.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Optional default command (exec form)
    #[serde(default)]
    pub command: Option<Vec<String>>,
}

/// Native package manager of the base image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    #[default]
    Apk,
    Apt,
}

impl std::fmt::Display for PackageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Apk => f.write_str("apk"),
            Self::Apt => f.write_str("apt"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyConfig {
    /// Dependency manifest, relative to the project root
    #[serde(default = "default_manifest")]
    pub manifest: String,
    /// Command that installs the manifest; the manifest path is appended
    #[serde(default = "default_install_command")]
    pub install_command: String,
    #[serde(default)]
    pub package_manager: PackageManager,
    /// Native libraries the application links against at run time
    #[serde(default = "default_runtime_packages")]
    pub runtime_packages: Vec<String>,
    /// Compilers, headers and dev libraries removed after the install
    #[serde(default = "default_build_packages")]
    pub build_packages: Vec<String>,
    /// Label of the removable build dependency group
    #[serde(default = "default_build_group")]
    pub build_group: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application source tree, relative to the project root
    #[serde(default = "default_source")]
    pub source: String,
    /// Directory inside the image the source is copied to
    #[serde(default = "default_workdir")]
    pub workdir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeConfig {
    /// Root of the shared volume directories
    #[serde(default = "default_volume_root")]
    pub root: String,
    /// Subdirectories of `root` created at build time
    #[serde(default = "default_volume_dirs")]
    pub dirs: Vec<String>,
    /// Octal permissions applied recursively to `root`
    #[serde(default = "default_volume_mode")]
    pub mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    /// Non-privileged execution account
    #[serde(default = "default_user")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeConfig {
    #[serde(default = "default_compose_file")]
    pub file: String,
    #[serde(default = "default_compose_service")]
    pub service: String,
    #[serde(default = "default_compose_port")]
    pub port: u16,
    #[serde(default = "default_compose_command")]
    pub command: String,
    #[serde(default = "default_test_command")]
    pub test_command: String,
    #[serde(default = "default_database_image")]
    pub database_image: String,
    #[serde(default = "default_database_env")]
    pub database_env: BTreeMap<String, String>,
    #[serde(default = "default_app_env")]
    pub app_env: BTreeMap<String, String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: default_project_name(),
            tag: default_tag(),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            base_image: default_base_image(),
            maintainer: None,
            unbuffered_env: default_unbuffered_env(),
            env: BTreeMap::new(),
            command: None,
        }
    }
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            manifest: default_manifest(),
            install_command: default_install_command(),
            package_manager: PackageManager::default(),
            runtime_packages: default_runtime_packages(),
            build_packages: default_build_packages(),
            build_group: default_build_group(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            workdir: default_workdir(),
        }
    }
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            root: default_volume_root(),
            dirs: default_volume_dirs(),
            mode: default_volume_mode(),
        }
    }
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            name: default_user(),
        }
    }
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            file: default_compose_file(),
            service: default_compose_service(),
            port: default_compose_port(),
            command: default_compose_command(),
            test_command: default_test_command(),
            database_image: default_database_image(),
            database_env: default_database_env(),
            app_env: default_app_env(),
        }
    }
}

impl GalleyConfig {
    /// Load from galley.toml at the given path, or return defaults if not found.
    pub fn load(project_dir: &std::path::Path) -> crate::Result<Self> {
        let config_path = project_dir.join(CONFIG_FILE);
        if config_path.exists() {
            let content =
                std::fs::read_to_string(&config_path).map_err(|e| crate::Error::ConfigLoad {
                    path: config_path.clone(),
                    source: e,
                })?;
            let config = toml::from_str(&content).map_err(|e| crate::Error::ConfigParse {
                path: config_path.clone(),
                source: e,
            })?;
            tracing::debug!(path = %config_path.display(), "loaded config");
            Ok(config)
        } else {
            tracing::debug!("no {CONFIG_FILE}, using defaults");
            Ok(Self::default())
        }
    }

    /// `name:tag` of the image produced by a successful build.
    pub fn image_name(&self) -> String {
        format!("{}:{}", self.project.name, self.project.tag)
    }
}

/// File name of the project configuration.
pub const CONFIG_FILE: &str = "galley.toml";

fn default_project_name() -> String {
    "recipe-app".to_owned()
}

fn default_tag() -> String {
    "latest".to_owned()
}

fn default_base_image() -> String {
    "python:3.7-alpine".to_owned()
}

fn default_unbuffered_env() -> String {
    "PYTHONUNBUFFERED".to_owned()
}

fn default_manifest() -> String {
    "requirements.txt".to_owned()
}

fn default_install_command() -> String {
    "pip install -r".to_owned()
}

fn default_runtime_packages() -> Vec<String> {
    ["postgresql-client", "jpeg-dev"]
        .iter()
        .map(|s| (*s).to_owned())
        .collect()
}

fn default_build_packages() -> Vec<String> {
    [
        "gcc",
        "libc-dev",
        "linux-headers",
        "postgresql-dev",
        "musl-dev",
        "zlib",
        "zlib-dev",
    ]
    .iter()
    .map(|s| (*s).to_owned())
    .collect()
}

fn default_build_group() -> String {
    ".tmp-build-deps".to_owned()
}

fn default_source() -> String {
    "app".to_owned()
}

fn default_workdir() -> String {
    "/app".to_owned()
}

fn default_volume_root() -> String {
    "/vol/web".to_owned()
}

fn default_volume_dirs() -> Vec<String> {
    vec!["media".to_owned(), "static".to_owned()]
}

fn default_volume_mode() -> String {
    "755".to_owned()
}

fn default_user() -> String {
    "user".to_owned()
}

fn default_compose_file() -> String {
    "docker-compose.yml".to_owned()
}

fn default_compose_service() -> String {
    "app".to_owned()
}

fn default_compose_port() -> u16 {
    8000
}

fn default_compose_command() -> String {
    "python manage.py wait_for_db && python manage.py migrate && python manage.py runserver 0.0.0.0:8000"
        .to_owned()
}

fn default_test_command() -> String {
    "python manage.py test && flake8".to_owned()
}

fn default_database_image() -> String {
    "postgres:10-alpine".to_owned()
}

fn default_database_env() -> BTreeMap<String, String> {
    [
        ("POSTGRES_DB", "app"),
        ("POSTGRES_USER", "postgres"),
        ("POSTGRES_PASSWORD", "supersecretpassword"),
    ]
    .iter()
    .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
    .collect()
}

fn default_app_env() -> BTreeMap<String, String> {
    [
        ("DB_HOST", "db"),
        ("DB_NAME", "app"),
        ("DB_USER", "postgres"),
        ("DB_PASS", "supersecretpassword"),
    ]
    .iter()
    .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
    .collect()
}
