use arch_lint::rules::{NoErrorSwallowing, NoSilentResultDrop};
use arch_lint::{Analyzer, Severity};

/// Docker, git and filesystem failures must surface in galley's build and
/// verify reports. Every `galley-*` crate is checked for swallowed errors
/// (AL003) and dropped `Result`s (AL013); test code is exempt.
#[test]
fn galley_crates_surface_every_error() {
    let crates = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .expect("crates directory");

    let analyzer = Analyzer::builder()
        .root(crates)
        .exclude("**/target/**")
        .exclude("**/tests/**")
        .rule(NoErrorSwallowing::new())
        .rule(NoSilentResultDrop::new())
        .build()
        .expect("build analyzer");

    let result = analyzer.analyze().expect("analyze galley crates");

    if result.has_violations_at(Severity::Warning) {
        panic!("{}", result.format_test_report(Severity::Warning));
    }
}
