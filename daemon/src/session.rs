//! Stream descriptor sources: built-in layout, config file, session manifests

use anyhow::{Context, Result};
use common::{CameraMount, SessionManifest, StreamDescriptor, apply_overrides};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::Config;

/// Built-in eleven-camera layout, master first
const DEFAULT_LAYOUT: &[(&str, &str, CameraMount)] = &[
    ("NCBSC_front", "Front Camera", CameraMount::Front),
    ("TCBSC_back", "Back Camera", CameraMount::Back),
    ("TCMVC_back", "Back Center", CameraMount::Back),
    ("NLBSC_left", "Left Side", CameraMount::Side),
    ("NLMVC_back_left", "Back Left", CameraMount::Side),
    ("NLMVC_front_left", "Front Left", CameraMount::Side),
    ("NRBSC_right", "Right Side", CameraMount::Side),
    ("NRMVC_back_right", "Back Right", CameraMount::Side),
    ("NRMVC_front_right", "Front Right", CameraMount::Side),
    ("WCNVC_front", "Wide Front", CameraMount::Front),
    ("WCWVC_front", "Wide Center", CameraMount::Front),
];

pub fn default_layout() -> Vec<StreamDescriptor> {
    DEFAULT_LAYOUT
        .iter()
        .map(|(id, title, mount)| StreamDescriptor {
            mount: *mount,
            ..StreamDescriptor::new(*id, *title, format!("videos/{}.m3u8", id))
        })
        .collect()
}

/// Turns descriptor lists into attachable sources: overrides, `~` and `media_root`
#[derive(Debug, Clone, Default)]
pub struct SourceResolver {
    media_root: Option<PathBuf>,
    overrides: HashMap<String, String>,
}

impl SourceResolver {
    /// Config `[sources]` first, `--source` flags win on conflict
    pub fn new(config: &Config, cli_overrides: &[(String, String)]) -> Self {
        let media_root = config
            .general
            .media_root
            .as_deref()
            .map(|root| PathBuf::from(shellexpand::tilde(root).into_owned()));

        let mut overrides = config.sources.clone();
        overrides.extend(cli_overrides.iter().cloned());

        Self {
            media_root,
            overrides,
        }
    }

    pub fn build(&self, base: &[StreamDescriptor]) -> Vec<StreamDescriptor> {
        apply_overrides(base, &self.overrides)
            .into_iter()
            .map(|d| {
                let src = self.resolve(&d.src);
                d.with_source(src)
            })
            .collect()
    }

    /// Expand `~` and anchor relative paths at `media_root`. URLs pass through.
    pub fn resolve(&self, src: &str) -> String {
        let src = src.trim();
        if src.is_empty() || src.contains("://") {
            return src.to_string();
        }

        let expanded = shellexpand::tilde(src).into_owned();
        match &self.media_root {
            Some(root) if Path::new(&expanded).is_relative() => {
                root.join(&expanded).to_string_lossy().into_owned()
            }
            _ => expanded,
        }
    }
}

/// Descriptors for daemon startup.
///
/// A session manifest with streams wins, then a configured `[[stream]]`
/// layout, then the built-in layout.
pub fn initial_descriptors(
    config: &Config,
    manifest: Option<&SessionManifest>,
    resolver: &SourceResolver,
) -> Vec<StreamDescriptor> {
    let base = match manifest {
        Some(manifest) if !manifest.streams.is_empty() => {
            log::info!(
                "Using session {} of vehicle {} ({} streams)",
                manifest.cohort_id,
                manifest.vehicle_id,
                manifest.streams.len()
            );
            manifest.descriptors()
        }
        _ if !config.stream.is_empty() => config
            .stream
            .iter()
            .map(|s| {
                let title = s.title.clone().unwrap_or_else(|| s.id.replace('_', " "));
                StreamDescriptor::new(s.id.as_str(), title, s.src.clone())
            })
            .collect(),
        _ => default_layout(),
    };

    resolver.build(&base)
}

pub fn parse_manifest(json: &str) -> Result<SessionManifest> {
    serde_json::from_str(json).context("Invalid session manifest")
}

pub async fn load_manifest(path: &Path) -> Result<SessionManifest> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read session manifest: {}", path.display()))?;
    let manifest = parse_manifest(&contents)?;
    log::info!("Loaded session manifest from {}", path.display());
    Ok(manifest)
}

/// Parse a `--source ID=URL` flag
pub fn parse_source_override(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((id, src)) if !id.trim().is_empty() && !src.trim().is_empty() => {
            Ok((id.trim().to_string(), src.trim().to_string()))
        }
        _ => Err(format!("expected ID=SOURCE, got '{}'", arg)),
    }
}
