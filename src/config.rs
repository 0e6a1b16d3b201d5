use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cache::JsonFileStore;
use crate::graph::{LinkStat, NodeKind, NodeSizing};
use crate::layout::LayoutOptions;
use crate::sankey::{Align, Margins, SankeyOptions};
use crate::{CLUSTER_PADDING, FRAME_MS, VIEW_DURATION_MS};

/// Engine settings. Every field has a default, so a config file only needs
/// the values it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub width: f32,
    pub height: f32,
    pub duration_ms: u64,
    pub frame_ms: u64,
    pub site: NodeSizing,
    pub deployment: NodeSizing,
    pub service: NodeSizing,
    pub node_padding: f32,
    pub min_node_height: f32,
    pub cluster_padding: f32,
    pub margins: Margins,
    pub align: Align,
    pub sort: bool,
    /// Statistic shown as the link label.
    pub stat: LinkStat,
    /// Colour links by their target node rather than a neutral grey.
    pub color_links: bool,
    pub background: String,
    pub cache_file: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            width: 960.0,
            height: 640.0,
            duration_ms: VIEW_DURATION_MS,
            frame_ms: FRAME_MS,
            site: NodeSizing {
                width: 220.0,
                height: 60.0,
            },
            deployment: NodeSizing {
                width: 160.0,
                height: 36.0,
            },
            service: NodeSizing {
                width: 180.0,
                height: 40.0,
            },
            node_padding: 20.0,
            min_node_height: 36.0,
            cluster_padding: CLUSTER_PADDING,
            margins: Margins::default(),
            align: Align::Right,
            sort: false,
            stat: LinkStat::BytesOut,
            color_links: true,
            background: "white".to_string(),
            cache_file: None,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config '{}'", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse config '{}'", path.display()))
    }

    pub fn sizing(&self, kind: NodeKind) -> NodeSizing {
        match kind {
            NodeKind::Site => self.site,
            NodeKind::Deployment => self.deployment,
            NodeKind::Service => self.service,
        }
    }

    pub fn layout_options(&self, position_prefix: &str) -> LayoutOptions {
        LayoutOptions {
            flow: SankeyOptions {
                width: self.width,
                height: self.height,
                node_padding: self.node_padding,
                min_node_height: self.min_node_height,
                margins: self.margins,
                align: self.align,
                sort: self.sort,
                group_padding: self.cluster_padding,
            },
            position_prefix: position_prefix.to_string(),
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_ms.max(1))
    }

    /// The configured cache file, or the platform default location.
    pub fn cache_store(&self) -> Option<JsonFileStore> {
        self.cache_file
            .clone()
            .or_else(JsonFileStore::default_path)
            .map(JsonFileStore::new)
    }
}
