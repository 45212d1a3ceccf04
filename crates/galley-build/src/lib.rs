//! Dockerfile generation, auditing, build context assembly, and eject for
//! galley.
//!
//! # Build pipeline
//!
//! ```text
//! galley build
//!   1. Dirty check  ── git status --porcelain (skip with --allow-dirty)
//!   2. Plan         ── ImagePlan::from_config() validates galley.toml
//!   3. Dockerfile   ── ejected .galley/Dockerfile or DockerfileGenerator::render()
//!   4. Audit        ── audit::audit() rejects cache- or privilege-breaking edits
//!   5. Context      ── manifest + git ls-files <source> → .galley-context/
//!   6. docker build ── untagged, image id via --iidfile
//!   7. Verify       ── run checks inside the image
//!   8. Tag          ── only a verified image gets name:tag
//! ```
//!
//! # Context strategy
//!
//! The context holds only what the Dockerfile copies. Source files come from
//! `git ls-files`, so `.gitignore`d paths never reach the daemon.

pub mod audit;
pub mod compose;
pub mod context;
pub mod dockerfile;
pub mod eject;
mod quote;

pub use audit::{AuditReport, Finding, Rule, Severity};
pub use compose::ComposeGenerator;
pub use dockerfile::DockerfileGenerator;
