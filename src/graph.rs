use serde::{Deserialize, Serialize};

use crate::color::{self, Rgb};
use crate::path::PathDescriptor;
use crate::{MIN_LINK_WIDTH, SHORT_NAME_MAX};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Site,
    Deployment,
    Service,
}

/// Collapsed footprint of a node kind. The expanded height comes from the
/// node's flow (`sankey_height`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeSizing {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub short_name: String,
    /// Site id of the containing site, if any.
    pub cluster: Option<String>,
    pub color: Rgb,
    pub light_color: Rgb,
    pub targets: Vec<String>,
    pub extra: bool,
    /// Index of the node this one duplicates, set when `extra` is true.
    pub original: Option<usize>,
    pub expanded: bool,
    pub selected: bool,
    pub x: f32,
    pub y: f32,
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
    pub sankey_height: Option<f32>,
    /// Total flow over incident links, filled in by the flow layout.
    pub value: f32,
    sizing: NodeSizing,
}

impl Node {
    pub fn new(name: impl Into<String>, kind: NodeKind, sizing: NodeSizing) -> Self {
        let name = name.into();
        Self {
            short_name: short_name(&name),
            color: color::name_color(&name),
            light_color: color::light_color(&name),
            name,
            kind,
            cluster: None,
            targets: Vec::new(),
            extra: false,
            original: None,
            expanded: false,
            selected: false,
            x: 0.0,
            y: 0.0,
            x0: 0.0,
            y0: 0.0,
            x1: 0.0,
            y1: 0.0,
            sankey_height: None,
            value: 0.0,
            sizing,
        }
    }

    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    /// Identity used for diffing drawn elements. Extra nodes are drawn a
    /// second time, so they are told apart by their cluster.
    pub fn key(&self) -> String {
        match (&self.cluster, self.extra) {
            (Some(cluster), true) => format!("{}@{}", self.name, cluster),
            _ => self.name.clone(),
        }
    }

    pub fn sizing(&self) -> NodeSizing {
        self.sizing
    }

    /// Width is the same whether collapsed or expanded.
    pub fn width(&self, _expanded: Option<bool>) -> f32 {
        self.sizing.width
    }

    /// `None` means "use the node's current `expanded` flag".
    pub fn height(&self, expanded: Option<bool>) -> f32 {
        let expanded = expanded.unwrap_or(self.expanded);
        match self.sankey_height {
            Some(height) if expanded => height.max(self.sizing.height),
            _ => self.sizing.height,
        }
    }
}

/// Truncates long names to `first...last4`, keeping the leading host label
/// of dotted addresses.
pub fn short_name(name: &str) -> String {
    let head = name.split('.').next().unwrap_or(name);
    let chars: Vec<char> = head.chars().collect();
    if chars.len() <= SHORT_NAME_MAX {
        return head.to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    let lead: String = chars[..SHORT_NAME_MAX - 7].iter().collect();
    format!("{lead}...{tail}")
}

#[derive(Debug, Clone, Default)]
pub struct Nodes {
    pub nodes: Vec<Node>,
}

impl Nodes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Node> {
        self.nodes.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Node> {
        self.nodes.get_mut(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// The non-extra node with this name.
    pub fn node_for(&self, name: &str) -> Option<usize> {
        self.nodes
            .iter()
            .position(|node| !node.extra && node.name == name)
    }

    /// The drawn instance of `name` inside `cluster`, extra or not.
    pub fn find_in(&self, name: &str, cluster: &str) -> Option<usize> {
        self.nodes
            .iter()
            .position(|node| node.name == name && node.cluster.as_deref() == Some(cluster))
    }

    pub fn index_of_key(&self, key: &str) -> Option<usize> {
        self.nodes.iter().position(|node| node.key() == key)
    }

    /// Adds a candidate node. If a node with the same name is already
    /// present the candidate is skipped, or, with `include_extra`, added as
    /// an `extra` duplicate pointing at the original.
    pub fn insert(&mut self, mut candidate: Node, include_extra: bool) -> Option<usize> {
        if let Some(original) = self.node_for(&candidate.name) {
            if !include_extra {
                return None;
            }
            candidate.extra = true;
            candidate.original = Some(original);
        }
        self.nodes.push(candidate);
        Some(self.nodes.len() - 1)
    }

    pub fn set_expanded(&mut self, expanded: bool) {
        for node in &mut self.nodes {
            node.expanded = expanded;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    /// Declared site-to-site connection.
    Connection,
    /// Aggregated traffic between two sites.
    Traffic,
    /// Requests between services or deployments.
    Service,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::Connection => "connection",
            LinkKind::Traffic => "traffic",
            LinkKind::Service => "service",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
}

/// Result of a link lookup: where the shared link lives, and whether it
/// runs opposite to the requested orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSlot {
    pub index: usize,
    pub reversed: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub bytes_out: u64,
    pub bytes_in: u64,
    pub requests: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStat {
    #[default]
    BytesOut,
    BytesIn,
    Requests,
}

/// Vertical extent of a link's ribbon at its source and target.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SankeyBand {
    pub sy0: f32,
    pub sy1: f32,
    pub ty0: f32,
    pub ty1: f32,
}

#[derive(Debug, Clone, Default)]
pub struct LinkPaths {
    pub normal: Option<PathDescriptor>,
    pub sankey: Option<PathDescriptor>,
}

#[derive(Debug, Clone)]
pub struct Link {
    pub uid: String,
    pub kind: LinkKind,
    pub source: usize,
    pub target: usize,
    pub value: f32,
    /// Flow-proportional ribbon thickness from the last flow layout.
    pub thickness: f32,
    pub band: SankeyBand,
    /// Stats in the link's own orientation, and in the opposite one.
    pub forward: LinkStats,
    pub reverse: LinkStats,
    /// Vertical control-point lift used to pull overlapping paths apart.
    pub bend: f32,
    pub selected: bool,
    pub highlighted: bool,
    pub paths: LinkPaths,
}

impl Link {
    fn new(uid: String, kind: LinkKind, source: usize, target: usize) -> Self {
        Self {
            uid,
            kind,
            source,
            target,
            value: 0.0,
            thickness: 0.0,
            band: SankeyBand::default(),
            forward: LinkStats::default(),
            reverse: LinkStats::default(),
            bend: 0.0,
            selected: false,
            highlighted: false,
            paths: LinkPaths::default(),
        }
    }

    /// Drawn width: never thinner than `MIN_LINK_WIDTH` so it stays hittable.
    pub fn width(&self) -> f32 {
        self.thickness.max(MIN_LINK_WIDTH)
    }

    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }

    /// Sets the counters for one direction, oriented by the slot the caller
    /// got back from [`Links::get_link`]. Recording the same direction again
    /// replaces the earlier totals.
    pub fn record(&mut self, slot: LinkSlot, stats: LinkStats) {
        if slot.reversed {
            self.reverse = stats;
        } else {
            self.forward = stats;
        }
        self.value = (self.forward.bytes_out + self.reverse.bytes_out) as f32;
    }

    pub fn stat(&self, stat: LinkStat) -> u64 {
        let pick = |s: &LinkStats| match stat {
            LinkStat::BytesOut => s.bytes_out,
            LinkStat::BytesIn => s.bytes_in,
            LinkStat::Requests => s.requests,
        };
        pick(&self.forward) + pick(&self.reverse)
    }

    pub fn stat_label(&self, stat: LinkStat) -> Option<String> {
        let value = self.stat(stat);
        if value == 0 {
            return None;
        }
        Some(match stat {
            LinkStat::Requests => format!("{value} req"),
            LinkStat::BytesOut | LinkStat::BytesIn => format_bytes(value),
        })
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[derive(Debug, Clone, Default)]
pub struct Links {
    pub links: Vec<Link>,
}

impl Links {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.links.clear();
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Link> {
        self.links.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Link> {
        self.links.get_mut(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Link> {
        self.links.iter()
    }

    pub fn by_uid(&self, uid: &str) -> Option<usize> {
        self.links.iter().position(|link| link.uid == uid)
    }

    /// Finds or creates the single link of `kind` between two nodes.
    ///
    /// `Direction::In` flips the requested orientation. When a link for the
    /// unordered pair already exists it is reused and `reversed` reports
    /// whether it runs the other way.
    pub fn get_link(
        &mut self,
        source: usize,
        target: usize,
        dir: Direction,
        kind: LinkKind,
        uid: impl Into<String>,
    ) -> LinkSlot {
        let (from, to) = match dir {
            Direction::Out => (source, target),
            Direction::In => (target, source),
        };

        for (index, link) in self.links.iter().enumerate() {
            if link.kind != kind {
                continue;
            }
            if link.source == from && link.target == to {
                return LinkSlot {
                    index,
                    reversed: false,
                };
            }
            if link.source == to && link.target == from {
                return LinkSlot {
                    index,
                    reversed: true,
                };
            }
        }

        self.links.push(Link::new(uid.into(), kind, from, to));
        LinkSlot {
            index: self.links.len() - 1,
            reversed: false,
        }
    }

    /// Target colour, rotated once per earlier link of the same class that
    /// already ends at the same node.
    pub fn color_of(&self, idx: usize, nodes: &Nodes) -> Rgb {
        let Some(link) = self.links.get(idx) else {
            return Rgb::BLACK;
        };
        let base = nodes
            .get(link.target)
            .map(|node| node.color)
            .unwrap_or(Rgb::BLACK);
        let siblings = self.links[..idx]
            .iter()
            .filter(|other| other.kind == link.kind && other.target == link.target)
            .count();
        (0..siblings).fold(base, |color, _| color.rotate())
    }

    /// Indices of links touching `node`.
    pub fn incident(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.links
            .iter()
            .enumerate()
            .filter(move |(_, link)| link.source == node || link.target == node)
            .map(|(idx, _)| idx)
    }
}

pub fn link_uid(kind: LinkKind, source_key: &str, target_key: &str) -> String {
    format!("{}:{}->{}", kind.as_str(), source_key, target_key)
}
