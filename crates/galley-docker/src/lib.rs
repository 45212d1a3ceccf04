pub mod cache;
pub mod client;
pub mod docker;
pub mod executor;

pub use cache::CacheReport;
pub use client::{
    BuildError, CheckResult, ComposeError, DockerClient, DoctorReport, ImageId,
    VerificationReport, VerifyError,
};
pub use docker::{DockerError, StderrTail};
pub use executor::{DockerExecutor, RealExecutor};
