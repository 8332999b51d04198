//! Camera stream identity and source descriptions.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;

/// Stable key for one camera feed within a review session.
///
/// Camera position codes such as `NCBSC_front` or `TCBSC_back`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for StreamId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for StreamId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Where a camera is mounted on the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraMount {
    Front,
    Back,
    Side,
}

impl CameraMount {
    /// Classify a camera from its position code.
    ///
    /// `front` wins over `back` when both appear, everything else is a side camera.
    pub fn from_position_code(code: &str) -> Self {
        let code = code.to_lowercase();
        if code.contains("front") {
            Self::Front
        } else if code.contains("back") {
            Self::Back
        } else {
            Self::Side
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Front => "front",
            Self::Back => "back",
            Self::Side => "side",
        }
    }
}

/// One camera feed of a review session.
///
/// Immutable once the session starts; a source override produces a new
/// descriptor for the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub id: StreamId,
    pub title: String,
    /// Local path, progressive media URL or adaptive-streaming manifest URL.
    /// Empty when no source is known for this camera yet.
    pub src: String,
    pub mount: CameraMount,
}

impl StreamDescriptor {
    pub fn new(id: impl Into<StreamId>, title: impl Into<String>, src: impl Into<String>) -> Self {
        let id = id.into();
        let mount = CameraMount::from_position_code(id.as_str());
        Self {
            id,
            title: title.into(),
            src: src.into(),
            mount,
        }
    }

    /// Whether this stream has anything to load
    pub fn has_source(&self) -> bool {
        !self.src.trim().is_empty()
    }

    pub fn source_kind(&self) -> SourceKind {
        SourceKind::classify(&self.src)
    }

    /// Copy of this descriptor pointing at a different source
    pub fn with_source(&self, src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            ..self.clone()
        }
    }
}

/// Apply a caller-supplied `id -> source` mapping to a descriptor list.
///
/// Ids that are not part of the list are ignored; ordering is preserved so
/// the master stream stays first.
pub fn apply_overrides(
    descriptors: &[StreamDescriptor],
    overrides: &HashMap<String, String>,
) -> Vec<StreamDescriptor> {
    descriptors
        .iter()
        .map(|d| match overrides.get(d.id.as_str()) {
            Some(src) if !src.trim().is_empty() => d.with_source(src.clone()),
            _ => d.clone(),
        })
        .collect()
}

/// How a source string has to be played back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    /// File on the local machine (plain path or `file://` URI)
    Local,
    /// Progressive download (MP4 and friends) over the network
    Progressive,
    /// Segmented adaptive-streaming playlist (HLS `.m3u8`)
    AdaptiveManifest,
}

impl SourceKind {
    pub fn classify(src: &str) -> Self {
        let src = src.trim();
        match url::Url::parse(src) {
            Ok(parsed) if parsed.scheme() == "file" => {
                if parsed.path().to_lowercase().ends_with(".m3u8") {
                    Self::AdaptiveManifest
                } else {
                    Self::Local
                }
            }
            // Single letter schemes are Windows drive letters, not URLs
            Ok(parsed) if parsed.scheme().len() > 1 => {
                if parsed.path().to_lowercase().ends_with(".m3u8") {
                    Self::AdaptiveManifest
                } else {
                    Self::Progressive
                }
            }
            _ => {
                let path = src.split(['?', '#']).next().unwrap_or(src);
                if path.to_lowercase().ends_with(".m3u8") {
                    Self::AdaptiveManifest
                } else {
                    Self::Local
                }
            }
        }
    }

    pub fn is_adaptive(&self) -> bool {
        matches!(self, Self::AdaptiveManifest)
    }
}

/// Per-vehicle recording session as delivered by the stream catalogue API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionManifest {
    pub cohort_id: String,
    pub vehicle_id: String,
    #[serde(default)]
    pub original_session_id: String,
    pub streams: Vec<SessionStream>,
    #[serde(default)]
    pub total_streams: usize,
    #[serde(default)]
    pub processing_status: String,
    #[serde(default)]
    pub signed_cookies: HashMap<String, String>,
    #[serde(default)]
    pub expires_at: u64,
}

/// One camera entry of a [`SessionManifest`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStream {
    pub camera_position: String,
    #[serde(default)]
    pub unique_session_id: String,
    #[serde(default)]
    pub hls_manifest_url: String,
    #[serde(default)]
    pub mp4_url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub resolution: String,
}

impl SessionManifest {
    /// Build the stream descriptors of this session, in catalogue order.
    pub fn descriptors(&self) -> Vec<StreamDescriptor> {
        self.streams
            .iter()
            .map(|s| {
                let src = if s.hls_manifest_url.trim().is_empty() {
                    s.mp4_url.clone().unwrap_or_default()
                } else {
                    s.hls_manifest_url.clone()
                };
                StreamDescriptor::new(
                    s.camera_position.as_str(),
                    s.camera_position.replace('_', " "),
                    src,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_from_position_code() {
        assert_eq!(CameraMount::from_position_code("NCBSC_front"), CameraMount::Front);
        assert_eq!(CameraMount::from_position_code("TCBSC_back"), CameraMount::Back);
        assert_eq!(CameraMount::from_position_code("NLBSC_left"), CameraMount::Side);
        assert_eq!(
            CameraMount::from_position_code("FLMVC_back_left"),
            CameraMount::Back
        );
    }

    #[test]
    fn test_source_kind_classify() {
        assert_eq!(
            SourceKind::classify("https://cdn.example.com/hls/NCBSC_front/index.m3u8"),
            SourceKind::AdaptiveManifest
        );
        assert_eq!(
            SourceKind::classify("https://cdn.example.com/a/master.m3u8?sig=abc"),
            SourceKind::AdaptiveManifest
        );
        assert_eq!(
            SourceKind::classify("https://cdn.example.com/front.mp4"),
            SourceKind::Progressive
        );
        assert_eq!(SourceKind::classify("/home/me/front.mp4"), SourceKind::Local);
        assert_eq!(SourceKind::classify("file:///tmp/front.mp4"), SourceKind::Local);
        assert_eq!(
            SourceKind::classify("videos/TCBSC_back.m3u8"),
            SourceKind::AdaptiveManifest
        );
        assert_eq!(SourceKind::classify("C:\\clips\\a.mp4"), SourceKind::Local);
    }

    #[test]
    fn test_apply_overrides_keeps_order() {
        let base = vec![
            StreamDescriptor::new("A_front", "A", "a.m3u8"),
            StreamDescriptor::new("B_back", "B", "b.m3u8"),
        ];
        let mut overrides = HashMap::new();
        overrides.insert("B_back".to_string(), "/tmp/b.mp4".to_string());
        overrides.insert("Z_unknown".to_string(), "/tmp/z.mp4".to_string());
        overrides.insert("A_front".to_string(), "   ".to_string());

        let out = apply_overrides(&base, &overrides);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].src, "a.m3u8");
        assert_eq!(out[1].id.as_str(), "B_back");
        assert_eq!(out[1].src, "/tmp/b.mp4");
    }

    #[test]
    fn test_session_manifest_descriptors() {
        let json = r#"{
            "cohort_id": "INC#ZRH_LCR_10024#1752756048000000000",
            "vehicle_id": "ZRH_LCR_10024",
            "original_session_id": "",
            "streams": [
                {
                    "camera_position": "FLMVC_back_left",
                    "unique_session_id": "1752756048000000000_camera",
                    "hls_manifest_url": "https://cdn.example.com/FLMVC_back_left_master.m3u8",
                    "mp4_url": null,
                    "thumbnail_url": null,
                    "duration": null,
                    "resolution": "Auto"
                },
                {
                    "camera_position": "NCMVC_front",
                    "hls_manifest_url": "",
                    "mp4_url": "https://cdn.example.com/NCMVC_front.mp4",
                    "resolution": "Auto"
                }
            ],
            "total_streams": 2,
            "processing_status": "completed",
            "signed_cookies": {},
            "expires_at": 1756973730
        }"#;

        let manifest: SessionManifest = serde_json::from_str(json).unwrap();
        let descriptors = manifest.descriptors();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].id.as_str(), "FLMVC_back_left");
        assert_eq!(descriptors[0].title, "FLMVC back left");
        assert_eq!(descriptors[0].mount, CameraMount::Back);
        assert!(descriptors[0].source_kind().is_adaptive());
        assert_eq!(descriptors[1].src, "https://cdn.example.com/NCMVC_front.mp4");
        assert_eq!(descriptors[1].mount, CameraMount::Front);
    }
}
