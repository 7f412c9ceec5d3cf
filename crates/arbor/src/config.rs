//! Root configuration.

/// Options for a [`Root`](crate::Root).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootConfig {
    /// Upper bound on render passes a single [`Root::flush`](crate::Root::flush)
    /// may run before giving up with [`RenderError::FlushLimit`](crate::RenderError::FlushLimit).
    pub max_flush_passes: usize,
    /// Remove whatever the container holds before the first mount.
    pub clear_container_on_mount: bool,
    /// Match fully keyed sibling lists by key. When off, every child list
    /// is diffed by position.
    pub keyed_diffing: bool,
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            max_flush_passes: 100,
            clear_container_on_mount: true,
            keyed_diffing: true,
        }
    }
}
