//! Domain types shared by the coordinator, the capture layer and the bridge.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Reserved wire value meaning "no successful decode".
pub const SENTINEL: &str = "-1";

/// Unique identifier for one live scan request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanId(pub String);

impl ScanId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Generate a new unique scan ID
    pub fn generate() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let random = uuid::Uuid::new_v4();
        Self(format!("scan-{}-{}", timestamp, random.as_simple()))
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a session ends on its first result or streams indefinitely
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    SingleShot,
    Continuous,
}

impl ScanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::SingleShot => "single_shot",
            ScanMode::Continuous => "continuous",
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Symbology reported by the detection pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Symbology {
    QrCode,
    Aztec,
    Code128,
    Code39,
    Code93,
    Codabar,
    Ean13,
    Ean8,
    Itf,
    UpcA,
    UpcE,
    DataMatrix,
    Pdf417,
    Unknown,
}

const QR_SYMBOLOGIES: &[Symbology] = &[Symbology::QrCode];

const LINEAR_SYMBOLOGIES: &[Symbology] = &[
    Symbology::Code128,
    Symbology::Code39,
    Symbology::Code93,
    Symbology::Codabar,
    Symbology::Ean13,
    Symbology::Ean8,
    Symbology::Itf,
    Symbology::UpcA,
    Symbology::UpcE,
    // 2D stacked/matrix codes commonly printed next to linear ones
    Symbology::DataMatrix,
    Symbology::Pdf417,
];

const ALL_SYMBOLOGIES: &[Symbology] = &[
    Symbology::QrCode,
    Symbology::Aztec,
    Symbology::Code128,
    Symbology::Code39,
    Symbology::Code93,
    Symbology::Codabar,
    Symbology::Ean13,
    Symbology::Ean8,
    Symbology::Itf,
    Symbology::UpcA,
    Symbology::UpcE,
    Symbology::DataMatrix,
    Symbology::Pdf417,
    Symbology::Unknown,
];

/// Which symbologies a session asks the pipeline for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatFilter {
    #[default]
    Qr,
    Linear,
    All,
}

impl FormatFilter {
    /// Map the host's integer scan mode. The host's "default" (2) means QR.
    pub fn from_host_code(code: i64) -> Option<Self> {
        match code {
            0 | 2 => Some(FormatFilter::Qr),
            1 => Some(FormatFilter::Linear),
            _ => None,
        }
    }

    pub fn symbologies(&self) -> &'static [Symbology] {
        match self {
            FormatFilter::Qr => QR_SYMBOLOGIES,
            FormatFilter::Linear => LINEAR_SYMBOLOGIES,
            FormatFilter::All => ALL_SYMBOLOGIES,
        }
    }

    pub fn accepts(&self, symbology: Symbology) -> bool {
        self.symbologies().contains(&symbology)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FormatFilter::Qr => "qr",
            FormatFilter::Linear => "linear",
            FormatFilter::All => "all",
        }
    }
}

impl FromStr for FormatFilter {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "qr" => Ok(FormatFilter::Qr),
            "linear" | "barcode" => Ok(FormatFilter::Linear),
            "all" => Ok(FormatFilter::All),
            other => Err(ScanError::InvalidRequestArgument(format!(
                "unknown format filter: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for FormatFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic classification of a decoded value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    #[default]
    Text,
    Url,
    Wifi,
    ContactInfo,
    Email,
    Phone,
    Sms,
    Geo,
    CalendarEvent,
    DriverLicense,
    Isbn,
    Product,
    Unknown,
}

/// A point in frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in frame coordinates.
///
/// Containment is half-open: the left and top edges are inside, the right
/// and bottom edges are not.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }

    pub fn contains(&self, p: Point) -> bool {
        !self.is_empty()
            && p.x >= self.left
            && p.x < self.right
            && p.y >= self.top
            && p.y < self.bottom
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }

    /// Squared Euclidean distance from `p` to the center
    pub fn center_distance_sq(&self, p: Point) -> f32 {
        let c = self.center();
        let dx = p.x - c.x;
        let dy = p.y - c.y;
        dx * dx + dy * dy
    }
}

/// One decoded observation from the detection pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub raw_value: Option<String>,
    pub format: Symbology,
    pub bounds: Rect,
    pub value_type: ValueType,
}

impl Detection {
    pub fn new(raw_value: impl Into<String>, format: Symbology, bounds: Rect) -> Self {
        Self {
            raw_value: Some(raw_value.into()),
            format,
            bounds,
            value_type: ValueType::default(),
        }
    }

    /// A detection the pipeline located but could not decode
    pub fn undecoded(format: Symbology, bounds: Rect) -> Self {
        Self {
            raw_value: None,
            format,
            bounds,
            value_type: ValueType::Unknown,
        }
    }

    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    pub fn raw_value(&self) -> Option<&str> {
        self.raw_value.as_deref()
    }
}

/// Sensor facing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    #[default]
    Back,
    Front,
}

impl Facing {
    pub fn inverse(&self) -> Self {
        match self {
            Facing::Back => Facing::Front,
            Facing::Front => Facing::Back,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Facing::Back => "back",
            Facing::Front => "front",
        }
    }
}

impl FromStr for Facing {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "back" | "rear" => Ok(Facing::Back),
            "front" => Ok(Facing::Front),
            other => Err(ScanError::InvalidRequestArgument(format!(
                "unknown facing: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusMode {
    #[default]
    ContinuousAuto,
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashMode {
    #[default]
    Off,
    Torch,
}

impl FlashMode {
    pub fn is_on(&self) -> bool {
        matches!(self, FlashMode::Torch)
    }
}

/// Why a request ended without a decoded value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoResultReason {
    Cancelled,
    PermissionDenied,
    AcquisitionFailed,
    Destroyed,
    /// The selected detection carried no raw value
    MissingValue,
}

/// Terminal payload of a scan request, delivered exactly once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultEnvelope {
    Decoded { value: String },
    NoResult { reason: NoResultReason },
}

impl ResultEnvelope {
    pub fn decoded(value: impl Into<String>) -> Self {
        ResultEnvelope::Decoded {
            value: value.into(),
        }
    }

    pub fn no_result(reason: NoResultReason) -> Self {
        ResultEnvelope::NoResult { reason }
    }

    /// Envelope for a selected detection: its raw value, or the sentinel when absent
    pub fn from_detection(detection: &Detection) -> Self {
        match detection.raw_value() {
            Some(value) => ResultEnvelope::decoded(value),
            None => ResultEnvelope::no_result(NoResultReason::MissingValue),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, ResultEnvelope::NoResult { .. })
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            ResultEnvelope::Decoded { value } => Some(value),
            ResultEnvelope::NoResult { .. } => None,
        }
    }

    /// The string handed to the host: the raw value or [`SENTINEL`]
    pub fn into_wire(self) -> String {
        match self {
            ResultEnvelope::Decoded { value } => value,
            ResultEnvelope::NoResult { .. } => SENTINEL.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_id_generate() {
        let a = ScanId::generate();
        let b = ScanId::generate();
        assert!(a.as_str().starts_with("scan-"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_host_codes() {
        assert_eq!(FormatFilter::from_host_code(0), Some(FormatFilter::Qr));
        assert_eq!(FormatFilter::from_host_code(1), Some(FormatFilter::Linear));
        assert_eq!(FormatFilter::from_host_code(2), Some(FormatFilter::Qr));
        assert_eq!(FormatFilter::from_host_code(7), None);
    }

    #[test]
    fn test_format_filter_accepts() {
        assert!(FormatFilter::Qr.accepts(Symbology::QrCode));
        assert!(!FormatFilter::Qr.accepts(Symbology::Ean13));
        assert!(FormatFilter::Linear.accepts(Symbology::Ean13));
        assert!(FormatFilter::Linear.accepts(Symbology::Pdf417));
        assert!(!FormatFilter::Linear.accepts(Symbology::QrCode));
        assert!(FormatFilter::All.accepts(Symbology::Aztec));
    }

    #[test]
    fn test_format_filter_parse() {
        assert_eq!("QR".parse::<FormatFilter>().unwrap(), FormatFilter::Qr);
        assert_eq!("all".parse::<FormatFilter>().unwrap(), FormatFilter::All);
        assert!(matches!(
            "hologram".parse::<FormatFilter>(),
            Err(ScanError::InvalidRequestArgument(_))
        ));
    }

    #[test]
    fn test_rect_contains_is_half_open() {
        let r = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(r.contains(Point::new(0.0, 0.0)));
        assert!(r.contains(Point::new(5.0, 5.0)));
        assert!(!r.contains(Point::new(10.0, 5.0)));
        assert!(!r.contains(Point::new(5.0, 10.0)));
        assert!(!Rect::new(5.0, 5.0, 5.0, 9.0).contains(Point::new(5.0, 6.0)));
    }

    #[test]
    fn test_rect_center_distance() {
        let r = Rect::new(50.0, 50.0, 60.0, 60.0);
        assert_eq!(r.center(), Point::new(55.0, 55.0));
        assert_eq!(r.center_distance_sq(Point::new(48.0, 48.0)), 98.0);
    }

    #[test]
    fn test_facing_inverse() {
        assert_eq!(Facing::Back.inverse(), Facing::Front);
        assert_eq!(Facing::Front.inverse(), Facing::Back);
        assert_eq!("rear".parse::<Facing>().unwrap(), Facing::Back);
    }

    #[test]
    fn test_envelope_wire() {
        assert_eq!(ResultEnvelope::decoded("abc").into_wire(), "abc");
        assert_eq!(
            ResultEnvelope::no_result(NoResultReason::Cancelled).into_wire(),
            SENTINEL
        );
    }

    #[test]
    fn test_envelope_from_undecoded_detection_is_sentinel() {
        let d = Detection::undecoded(Symbology::QrCode, Rect::new(0.0, 0.0, 1.0, 1.0));
        let envelope = ResultEnvelope::from_detection(&d);
        assert!(envelope.is_sentinel());
        assert_eq!(envelope.into_wire(), "-1");
    }
}
