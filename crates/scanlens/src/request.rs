//! Scan request construction and host argument parsing.
//!
//! A [`ScanRequest`] is immutable once built. Validation happens here, before
//! the coordinator sees the request, so a rejected request never causes a
//! state transition.

use scanconf::DefaultsConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ScanError;
use crate::types::{FormatFilter, ScanMode};

pub const DEFAULT_CANCEL_LABEL: &str = "Cancel";
pub const DEFAULT_HIGHLIGHT_COLOR: &str = "#DC143C";

/// Configuration for one scan session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    mode: ScanMode,
    format_filter: FormatFilter,
    cancel_label: String,
    highlight_color: String,
    show_flash_icon: bool,
}

impl ScanRequest {
    pub fn builder(mode: ScanMode) -> ScanRequestBuilder {
        ScanRequestBuilder::new(mode)
    }

    pub fn single_shot() -> Self {
        Self::with_builtin_defaults(ScanMode::SingleShot)
    }

    pub fn continuous() -> Self {
        Self::with_builtin_defaults(ScanMode::Continuous)
    }

    fn with_builtin_defaults(mode: ScanMode) -> Self {
        Self {
            mode,
            format_filter: FormatFilter::default(),
            cancel_label: DEFAULT_CANCEL_LABEL.to_string(),
            highlight_color: DEFAULT_HIGHLIGHT_COLOR.to_string(),
            show_flash_icon: false,
        }
    }

    /// Parse the host's argument map.
    ///
    /// Recognised keys: `isContinuousScan` (required bool), `scanMode`
    /// (integer code or name), `lineColor`, `cancelButtonText`,
    /// `isShowFlashIcon`. Unset display hints fall back to `defaults`.
    pub fn from_host_args(args: &Value, defaults: &DefaultsConfig) -> Result<Self, ScanError> {
        let map = args.as_object().ok_or_else(|| {
            ScanError::InvalidRequestArgument(format!("arguments must be a map, got {}", args))
        })?;

        let continuous = map
            .get("isContinuousScan")
            .and_then(Value::as_bool)
            .ok_or_else(|| {
                ScanError::InvalidRequestArgument(
                    "isContinuousScan is required and must be a boolean".to_string(),
                )
            })?;
        let mode = if continuous {
            ScanMode::Continuous
        } else {
            ScanMode::SingleShot
        };

        let mut builder = ScanRequestBuilder::from_defaults(mode, defaults)?;

        match map.get("scanMode") {
            None | Some(Value::Null) => {}
            Some(Value::Number(n)) => {
                let filter = n
                    .as_i64()
                    .and_then(FormatFilter::from_host_code)
                    .ok_or_else(|| {
                        ScanError::InvalidRequestArgument(format!("unknown scanMode: {}", n))
                    })?;
                builder = builder.format_filter(filter);
            }
            Some(Value::String(s)) => {
                builder = builder.format_filter(s.parse()?);
            }
            Some(other) => {
                return Err(ScanError::InvalidRequestArgument(format!(
                    "scanMode must be an integer or a name, got {}",
                    other
                )));
            }
        }

        match map.get("lineColor") {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) if s.is_empty() => {}
            Some(Value::String(s)) => builder = builder.highlight_color(s.clone()),
            Some(other) => {
                return Err(ScanError::InvalidRequestArgument(format!(
                    "lineColor must be a string, got {}",
                    other
                )));
            }
        }

        match map.get("cancelButtonText") {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) => builder = builder.cancel_label(s.clone()),
            Some(other) => {
                return Err(ScanError::InvalidRequestArgument(format!(
                    "cancelButtonText must be a string, got {}",
                    other
                )));
            }
        }

        match map.get("isShowFlashIcon") {
            None | Some(Value::Null) => {}
            Some(Value::Bool(b)) => builder = builder.show_flash_icon(*b),
            Some(other) => {
                return Err(ScanError::InvalidRequestArgument(format!(
                    "isShowFlashIcon must be a boolean, got {}",
                    other
                )));
            }
        }

        builder.build()
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    pub fn format_filter(&self) -> FormatFilter {
        self.format_filter
    }

    pub fn cancel_label(&self) -> &str {
        &self.cancel_label
    }

    pub fn highlight_color(&self) -> &str {
        &self.highlight_color
    }

    pub fn show_flash_icon(&self) -> bool {
        self.show_flash_icon
    }
}

/// Builder for [`ScanRequest`]; `build()` validates
#[derive(Debug, Clone)]
pub struct ScanRequestBuilder {
    request: ScanRequest,
}

impl ScanRequestBuilder {
    pub fn new(mode: ScanMode) -> Self {
        Self {
            request: ScanRequest::with_builtin_defaults(mode),
        }
    }

    /// Start from configured defaults
    pub fn from_defaults(mode: ScanMode, defaults: &DefaultsConfig) -> Result<Self, ScanError> {
        let mut request = ScanRequest::with_builtin_defaults(mode);
        request.format_filter = defaults.format.parse()?;
        if !defaults.cancel_label.is_empty() {
            request.cancel_label = defaults.cancel_label.clone();
        }
        if !defaults.highlight_color.is_empty() {
            request.highlight_color = defaults.highlight_color.clone();
        }
        request.show_flash_icon = defaults.show_flash_icon;
        Ok(Self { request })
    }

    pub fn format_filter(mut self, filter: FormatFilter) -> Self {
        self.request.format_filter = filter;
        self
    }

    pub fn cancel_label(mut self, label: impl Into<String>) -> Self {
        self.request.cancel_label = label.into();
        self
    }

    pub fn highlight_color(mut self, color: impl Into<String>) -> Self {
        self.request.highlight_color = color.into();
        self
    }

    pub fn show_flash_icon(mut self, show: bool) -> Self {
        self.request.show_flash_icon = show;
        self
    }

    pub fn build(self) -> Result<ScanRequest, ScanError> {
        if !is_hex_color(&self.request.highlight_color) {
            return Err(ScanError::InvalidRequestArgument(format!(
                "highlight color must be #RRGGBB or #AARRGGBB, got {:?}",
                self.request.highlight_color
            )));
        }
        Ok(self.request)
    }
}

fn is_hex_color(s: &str) -> bool {
    match s.strip_prefix('#') {
        Some(hex) => (hex.len() == 6 || hex.len() == 8) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}
