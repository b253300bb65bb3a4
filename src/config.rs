/// Injector-wide settings, shared with child injectors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// How many optional lookups without a binding are remembered per injector
    pub absent_cache_capacity: usize,
    /// Whether unbound injectable types are constructed on request.
    /// When disabled, requesting an unbound type is a configuration error.
    pub implicit_construction: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            absent_cache_capacity: 256,
            implicit_construction: true,
        }
    }
}

impl Config {
    /// Config where every requested type has to be bound
    #[inline]
    #[must_use]
    pub fn strict() -> Self {
        Self {
            implicit_construction: false,
            ..Self::default()
        }
    }
}
