//! Queue capacity configuration.

use serde::Deserialize;

/// Queue capacity configuration.
///
/// Every connection owns a bounded outbound queue; a receiver that falls
/// this far behind is treated as dead and evicted on the next broadcast.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Outbound queue capacity per connection (default: 64).
    #[serde(default = "default_send_queue")]
    pub send_queue: usize,
    /// Pending broadcast dispatches before the ingress reports overload (default: 1024).
    #[serde(default = "default_dispatch_queue")]
    pub dispatch_queue: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            send_queue: default_send_queue(),
            dispatch_queue: default_dispatch_queue(),
        }
    }
}

fn default_send_queue() -> usize {
    64
}

fn default_dispatch_queue() -> usize {
    1024
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_are_correct() {
        let config = LimitsConfig::default();
        assert_eq!(config.send_queue, 64);
        assert_eq!(config.dispatch_queue, 1024);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: LimitsConfig = toml::from_str("send_queue = 8").unwrap();
        assert_eq!(config.send_queue, 8);
        assert_eq!(config.dispatch_queue, 1024);
    }
}
