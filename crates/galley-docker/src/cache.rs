use std::fmt;

/// Layer reuse between the previously tagged image and a fresh build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheReport {
    /// Leading layers both images share
    pub shared_layers: usize,
    /// Layers that belong to the base image
    pub base_layers: usize,
    /// Layers produced by the dependency steps
    pub dependency_layers: usize,
    pub previous_layers: usize,
    pub current_layers: usize,
}

impl CacheReport {
    pub fn compare(
        previous: &[String],
        current: &[String],
        base_layers: usize,
        dependency_layers: usize,
    ) -> Self {
        let shared_layers = previous
            .iter()
            .zip(current)
            .take_while(|(a, b)| a == b)
            .count();
        Self {
            shared_layers,
            base_layers,
            dependency_layers,
            previous_layers: previous.len(),
            current_layers: current.len(),
        }
    }

    /// Every dependency layer of the new image came from the previous one.
    pub fn dependencies_reused(&self) -> bool {
        self.shared_layers >= self.base_layers + self.dependency_layers
    }

    /// Both images are layer-for-layer identical.
    pub fn identical(&self) -> bool {
        self.previous_layers == self.current_layers && self.shared_layers == self.current_layers
    }
}

impl fmt::Display for CacheReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.identical() {
            "unchanged"
        } else if self.dependencies_reused() {
            "dependency layers reused"
        } else {
            "dependency layers rebuilt"
        };
        write!(
            f,
            "{state} ({shared}/{current} layers shared, {deps} dependency layers above {base} base layers)",
            shared = self.shared_layers,
            current = self.current_layers,
            deps = self.dependency_layers,
            base = self.base_layers,
        )
    }
}
