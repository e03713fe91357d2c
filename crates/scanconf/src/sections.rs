//! Configuration sections.

use serde::{Deserialize, Serialize};

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level or full `EnvFilter` directive (trace, debug, info, warn, error).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

/// Values used when a scan request leaves a field unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Label for the cancel button.
    /// Default: "Cancel"
    #[serde(default = "DefaultsConfig::default_cancel_label")]
    pub cancel_label: String,

    /// Highlight color for detection overlays, `#RRGGBB` or `#AARRGGBB`.
    /// Default: "#DC143C"
    #[serde(default = "DefaultsConfig::default_highlight_color")]
    pub highlight_color: String,

    /// Whether the flash toggle is shown.
    /// Default: false
    #[serde(default)]
    pub show_flash_icon: bool,

    /// Format filter: "qr", "linear" or "all".
    /// Default: "qr"
    #[serde(default = "DefaultsConfig::default_format")]
    pub format: String,

    /// Initial sensor facing: "back" or "front".
    /// Default: "back"
    #[serde(default = "DefaultsConfig::default_facing")]
    pub facing: String,

    /// Continuous auto-focus on session build.
    /// Default: true
    #[serde(default = "DefaultsConfig::default_auto_focus")]
    pub auto_focus: bool,
}

impl DefaultsConfig {
    fn default_cancel_label() -> String {
        "Cancel".to_string()
    }

    fn default_highlight_color() -> String {
        "#DC143C".to_string()
    }

    fn default_format() -> String {
        "qr".to_string()
    }

    fn default_facing() -> String {
        "back".to_string()
    }

    fn default_auto_focus() -> bool {
        true
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            cancel_label: Self::default_cancel_label(),
            highlight_color: Self::default_highlight_color(),
            show_flash_icon: false,
            format: Self::default_format(),
            facing: Self::default_facing(),
            auto_focus: Self::default_auto_focus(),
        }
    }
}

/// Channel sizing for values handed to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Capacity of a stream subscription. Values arriving while it is full are dropped.
    /// Default: 64
    #[serde(default = "DeliveryConfig::default_stream_buffer")]
    pub stream_buffer: usize,

    /// Capacity of the observability broadcast channel.
    /// Default: 256
    #[serde(default = "DeliveryConfig::default_event_buffer")]
    pub event_buffer: usize,
}

impl DeliveryConfig {
    fn default_stream_buffer() -> usize {
        64
    }

    fn default_event_buffer() -> usize {
        256
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            stream_buffer: Self::default_stream_buffer(),
            event_buffer: Self::default_event_buffer(),
        }
    }
}
