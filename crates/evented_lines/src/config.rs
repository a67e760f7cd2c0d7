/// What the numbering stage does when its upstream fails.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum UpstreamErrorPolicy {
    /// Report the failure to the diagnostics sink and end the sequence as if
    /// it were exhausted. Kept as the default for compatibility with existing
    /// callers that expect truncated output instead of an error; downstream
    /// cannot tell a failed source from a short one.
    #[default]
    SuppressAndLog,
    /// Yield the failure once, then end.
    Propagate,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PipelineConfig {
    /// Bytes requested from a file-backed source per read.
    pub chunk_size: usize,
    pub on_upstream_error: UpstreamErrorPolicy,
}

impl PipelineConfig {
    pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
            on_upstream_error: UpstreamErrorPolicy::SuppressAndLog,
        }
    }
}
