use std::collections::{BTreeMap, BTreeSet};

use crate::color::Rgb;
use crate::graph::{LinkKind, LinkStat, NodeKind};
use crate::path::PathDescriptor;
use crate::views::ViewGraph;
use crate::{BLUR_OPACITY, CLUSTER_LABEL_HEIGHT, CLUSTER_PADDING, FLOW_OPACITY};

const NEUTRAL_LINK: Rgb = Rgb::new(0x99, 0x99, 0x99);
const CLUSTER_FILL: Rgb = Rgb::new(0xf4, 0xf6, 0xf8);
const CLUSTER_STROKE: Rgb = Rgb::new(0xa0, 0xae, 0xc0);
const LINE_WIDTH: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Site,
    Deployment,
    Service,
    Cluster,
}

impl From<NodeKind> for NodeRole {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Site => NodeRole::Site,
            NodeKind::Deployment => NodeRole::Deployment,
            NodeKind::Service => NodeRole::Service,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeAttrs {
    pub key: String,
    pub label: String,
    pub role: NodeRole,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub fill: Rgb,
    pub stroke: Rgb,
    pub stroke_width: f32,
    pub opacity: f32,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkAttrs {
    pub uid: String,
    pub path: PathDescriptor,
    pub stroke: Rgb,
    /// Set for ribbons, which are filled rather than stroked.
    pub fill: Option<Rgb>,
    pub fill_opacity: f32,
    pub stroke_width: f32,
    pub opacity: f32,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub nodes: BTreeMap<String, NodeAttrs>,
    pub links: BTreeMap<String, LinkAttrs>,
    pub width: f32,
    pub height: f32,
}

impl Frame {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty()
    }

    pub fn element_count(&self) -> usize {
        self.nodes.len() + self.links.len()
    }

    /// Dims every element not named in the two sets.
    pub fn blur_except(&mut self, nodes: &BTreeSet<String>, links: &BTreeSet<String>) {
        for (key, attrs) in &mut self.nodes {
            if attrs.role != NodeRole::Cluster && !nodes.contains(key) {
                attrs.opacity = BLUR_OPACITY;
            }
        }
        for (uid, attrs) in &mut self.links {
            if !links.contains(uid) {
                attrs.opacity = BLUR_OPACITY;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FrameOptions {
    pub color_links: bool,
    pub stat: LinkStat,
}

pub fn to_site(graph: &ViewGraph, options: &FrameOptions) -> Frame {
    build_frame(graph, options, false, LinkKind::Connection)
}

pub fn to_site_sankey(graph: &ViewGraph, options: &FrameOptions) -> Frame {
    build_frame(graph, options, true, LinkKind::Traffic)
}

pub fn to_deployment(graph: &ViewGraph, options: &FrameOptions) -> Frame {
    build_frame(graph, options, false, LinkKind::Service)
}

pub fn to_deployment_sankey(graph: &ViewGraph, options: &FrameOptions) -> Frame {
    build_frame(graph, options, true, LinkKind::Service)
}

pub fn to_service(graph: &ViewGraph, options: &FrameOptions) -> Frame {
    build_frame(graph, options, false, LinkKind::Service)
}

pub fn to_service_sankey(graph: &ViewGraph, options: &FrameOptions) -> Frame {
    build_frame(graph, options, true, LinkKind::Service)
}

fn build_frame(graph: &ViewGraph, options: &FrameOptions, expanded: bool, shown: LinkKind) -> Frame {
    let mut frame = Frame {
        width: graph.size.width,
        height: graph.size.height,
        ..Frame::default()
    };

    for cluster in &graph.clusters {
        let members = cluster.members.iter().filter_map(|&idx| graph.nodes.get(idx));
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (f32::MAX, f32::MAX, f32::MIN, f32::MIN);
        for node in members {
            min_x = min_x.min(node.x);
            min_y = min_y.min(node.y);
            max_x = max_x.max(node.x + node.width(Some(expanded)));
            max_y = max_y.max(node.y + node.height(Some(expanded)));
        }
        if min_x > max_x {
            continue;
        }
        let key = format!("cluster:{}", cluster.site_id);
        let attrs = NodeAttrs {
            key: key.clone(),
            label: cluster.label.clone(),
            role: NodeRole::Cluster,
            x: min_x - CLUSTER_PADDING / 2.0,
            y: min_y - CLUSTER_PADDING / 2.0 - CLUSTER_LABEL_HEIGHT,
            width: max_x - min_x + CLUSTER_PADDING,
            height: max_y - min_y + CLUSTER_PADDING + CLUSTER_LABEL_HEIGHT,
            fill: CLUSTER_FILL,
            stroke: CLUSTER_STROKE,
            stroke_width: 1.0,
            opacity: 1.0,
            selected: false,
        };
        frame.width = frame.width.max(attrs.x + attrs.width);
        frame.height = frame.height.max(attrs.y + attrs.height);
        frame.nodes.insert(key, attrs);
    }

    for node in graph.nodes.iter() {
        let key = node.key();
        frame.nodes.insert(
            key.clone(),
            NodeAttrs {
                key,
                label: node.short_name.clone(),
                role: node.kind.into(),
                x: node.x,
                y: node.y,
                width: node.width(Some(expanded)),
                height: node.height(Some(expanded)),
                fill: if expanded { node.color } else { node.light_color },
                stroke: node.color,
                stroke_width: if node.selected { 3.0 } else { 1.0 },
                opacity: 1.0,
                selected: node.selected,
            },
        );
    }

    for (idx, link) in graph.links.iter().enumerate() {
        if link.kind != shown {
            continue;
        }
        let path = if expanded {
            link.paths.sankey.clone()
        } else {
            link.paths.normal.clone()
        };
        let Some(path) = path.filter(|p| !p.is_empty()) else {
            continue;
        };
        let color = if options.color_links {
            graph.links.color_of(idx, &graph.nodes)
        } else {
            NEUTRAL_LINK
        };
        let selected_boost = if link.selected { 2.0 } else { 0.0 };
        frame.links.insert(
            link.uid.clone(),
            LinkAttrs {
                uid: link.uid.clone(),
                path,
                stroke: color,
                fill: expanded.then_some(color),
                fill_opacity: if expanded { FLOW_OPACITY } else { 0.0 },
                stroke_width: if expanded { selected_boost } else { LINE_WIDTH + selected_boost },
                opacity: 1.0,
                label: link.stat_label(options.stat),
            },
        );
    }

    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PositionCache;
    use crate::config::EngineConfig;
    use crate::topology::TopologyData;
    use crate::views::{View, build_view};

    const SAMPLE: &str = r#"{
        "sites": [
            {"site_id": "east", "connected": ["west"], "services": ["a", "b"]},
            {"site_id": "west", "services": ["b"]}
        ],
        "services": [
            {"address": "a", "targets": ["b"]},
            {"address": "b"}
        ],
        "traffic": [
            {"source": "a", "target": "b", "bytes_out": 2048, "requests": 4}
        ]
    }"#;

    fn graph(view: View) -> ViewGraph {
        let data = TopologyData::parse(SAMPLE).unwrap();
        build_view(view, &data, &EngineConfig::default(), &PositionCache::in_memory())
    }

    fn options() -> FrameOptions {
        FrameOptions {
            color_links: true,
            stat: LinkStat::BytesOut,
        }
    }

    #[test]
    fn service_frames_switch_shape() {
        let graph = graph(View::Service);
        let normal = to_service(&graph, &options());
        let flow = to_service_sankey(&graph, &options());

        let line = &normal.links["service:a->b"];
        assert!(line.fill.is_none());
        assert_eq!(line.label.as_deref(), Some("2.0 KB"));
        let ribbon = &flow.links["service:a->b"];
        assert!(ribbon.fill.is_some());
        assert!(ribbon.path.to_string().ends_with('Z'));

        assert!(flow.nodes["a"].height >= normal.nodes["a"].height);
    }

    #[test]
    fn site_frames_pick_link_class() {
        let graph = graph(View::Site);
        let normal = to_site(&graph, &options());
        let flow = to_site_sankey(&graph, &options());
        assert!(normal.links.keys().all(|uid| uid.starts_with("connection:")));
        assert!(flow.links.keys().all(|uid| uid.starts_with("traffic:")));
        assert_eq!(normal.links.len(), 1);
        assert_eq!(normal.element_count(), normal.nodes.len() + 1);
    }

    #[test]
    fn deployment_frame_has_cluster_boxes() {
        let graph = graph(View::Deployment);
        let frame = to_deployment(&graph, &options());
        let east = &frame.nodes["cluster:east"];
        let a = &frame.nodes["a"];
        assert_eq!(east.role, NodeRole::Cluster);
        assert!(east.x < a.x && east.y < a.y);
        assert!(east.x + east.width > a.x + a.width);
        assert!(frame.nodes.contains_key("b@west"));
    }

    #[test]
    fn blur_keeps_named_elements() {
        let graph = graph(View::Service);
        let mut frame = to_service(&graph, &options());
        let keep: BTreeSet<String> = ["a".to_string()].into();
        frame.blur_except(&keep, &BTreeSet::new());
        assert_eq!(frame.nodes["a"].opacity, 1.0);
        assert_eq!(frame.nodes["b"].opacity, BLUR_OPACITY);
        assert_eq!(frame.links["service:a->b"].opacity, BLUR_OPACITY);
    }
}
