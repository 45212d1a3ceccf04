//! Core types and configuration for galley.
//!
//! This crate defines the `galley.toml` schema ([`GalleyConfig`]), image
//! references ([`ImageRef`]), the validated build plan ([`ImagePlan`]) and
//! shared error types.

pub mod config;
pub mod error;
pub mod image;
pub mod mode;
pub mod plan;

pub use config::{
    AppConfig, CONFIG_FILE, ComposeConfig, DependencyConfig, GalleyConfig, ImageConfig,
    PackageManager, ProjectConfig, UserConfig, VolumeConfig,
};
pub use error::{Error, Result};
pub use image::ImageRef;
pub use mode::FileMode;
pub use plan::{BuildStep, ImagePlan, StepKind};
