/// Settings for a [`ScopedAllocator`](crate::ScopedAllocator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// Size of the backing region in bytes.
    pub region_size: usize,
    /// Number of frame records reserved up front.
    pub initial_frame_capacity: usize,
    /// Record the pushing call site of every frame and warn on mismatched pops.
    pub debug: bool,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        AllocatorConfig { region_size: 64 * 1024, initial_frame_capacity: 8, debug: cfg!(debug_assertions) }
    }
}

impl AllocatorConfig {
    pub fn with_region_size(mut self, region_size: usize) -> Self {
        self.region_size = region_size;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}
