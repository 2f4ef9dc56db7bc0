//! Configuration options for collection conversion

/// Input size tier of the hosting environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionTier {
    /// Browser or other interactive host with tight memory
    Interactive,
    /// Command-line or batch host
    Batch,
}

impl ExecutionTier {
    /// Maximum accepted input size in bytes
    pub fn input_limit(&self) -> u64 {
        match self {
            ExecutionTier::Interactive => 100 * 1024 * 1024, // 100MB
            ExecutionTier::Batch => 1024 * 1024 * 1024,      // 1GB
        }
    }
}

impl std::str::FromStr for ExecutionTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "interactive" | "browser" => Ok(ExecutionTier::Interactive),
            "batch" | "cli" => Ok(ExecutionTier::Batch),
            other => Err(format!(
                "Invalid tier '{}'. Use 'interactive' or 'batch'",
                other
            )),
        }
    }
}

/// Which answer wins when a cloze index appears with different answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClozePrecedence {
    #[default]
    FirstSeen,
    LastSeen,
}

/// Conversion configuration options
#[derive(Debug, Clone)]
pub struct ConversionConfig {
    /// Attach scheduling statistics to each card
    pub include_stats: bool,
    /// Keep suspended cards (flagged with `suspended: true`)
    pub include_suspended: bool,
    /// Maximum accepted input or decompressed size in bytes
    pub max_input_size: u64,
    /// Maximum uncompressed/compressed ratio of any archive entry
    pub max_compression_ratio: u64,
    /// Records processed between cancellation checks
    pub cancel_check_interval: usize,
    /// Resolution of conflicting cloze answers
    pub cloze_precedence: ClozePrecedence,
    /// Pretty-print JSON output (vs compact)
    pub pretty: bool,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            include_stats: false,
            include_suspended: false,
            max_input_size: ExecutionTier::Interactive.input_limit(),
            max_compression_ratio: 10,
            cancel_check_interval: 256,
            cloze_precedence: ClozePrecedence::FirstSeen,
            pretty: true,
        }
    }
}

impl ConversionConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for browser-hosted execution
    pub fn interactive() -> Self {
        Self::default().with_tier(ExecutionTier::Interactive)
    }

    /// Configuration for command-line or batch execution
    pub fn batch() -> Self {
        Self::default().with_tier(ExecutionTier::Batch)
    }

    pub fn with_tier(mut self, tier: ExecutionTier) -> Self {
        self.max_input_size = tier.input_limit();
        self
    }

    pub fn with_stats(mut self, enabled: bool) -> Self {
        self.include_stats = enabled;
        self
    }

    pub fn with_suspended(mut self, enabled: bool) -> Self {
        self.include_suspended = enabled;
        self
    }

    pub fn with_max_input_size(mut self, limit_bytes: u64) -> Self {
        self.max_input_size = limit_bytes;
        self
    }

    pub fn with_max_compression_ratio(mut self, ratio: u64) -> Self {
        self.max_compression_ratio = ratio;
        self
    }

    pub fn with_cancel_check_interval(mut self, interval: usize) -> Self {
        self.cancel_check_interval = interval;
        self
    }

    pub fn with_cloze_precedence(mut self, precedence: ClozePrecedence) -> Self {
        self.cloze_precedence = precedence;
        self
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Validate configuration consistency
    pub fn validate(&self) -> Result<(), String> {
        if self.max_input_size < 1024 {
            return Err("Input size limit must be at least 1KB".to_string());
        }

        if self.max_compression_ratio == 0 {
            return Err("Compression ratio limit must be at least 1".to_string());
        }

        if self.cancel_check_interval == 0 {
            return Err("Cancellation check interval must be at least 1".to_string());
        }

        Ok(())
    }
}
