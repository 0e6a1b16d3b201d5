use log::debug;
use serde::{Deserialize, Serialize};

use crate::cache::{PositionCache, SavedPosition, position_key};
use crate::graph::{Links, Node, Nodes};
use crate::sankey::{self, SankeyOptions};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone)]
pub struct LayoutOptions {
    pub flow: SankeyOptions,
    /// Prefix of this view's position cache keys.
    pub position_prefix: String,
}

/// Lays out `nodes`, lets saved positions override the computed ones and
/// returns the canvas needed to show everything.
///
/// Afterwards every node has its displayed `(x, y)`, an expanded box
/// `(x0, y0, x1, y1)` anchored at the same corner, and a `sankey_height`;
/// link bands follow the displayed boxes. Nodes are left collapsed.
pub fn compute_layout(
    nodes: &mut Nodes,
    links: &mut Links,
    options: &LayoutOptions,
    groups: Option<&[Vec<usize>]>,
    cache: &PositionCache,
) -> CanvasSize {
    nodes.set_expanded(true);
    let intrinsic = sankey::flow_layout(nodes, links, &options.flow, groups);

    for node in &mut nodes.nodes {
        node.sankey_height = Some((node.y1 - node.y0).max(node.sizing().height));
    }

    adjust_positions(nodes);

    let mut restored = 0;
    for node in &mut nodes.nodes {
        let key = position_key(&options.position_prefix, &node.key());
        match cache.get_saved(&key) {
            Some(saved) => {
                apply_saved(node, saved);
                restored += 1;
            }
            None => {
                node.x0 = node.x;
                node.y0 = node.y;
            }
        }
        node.x1 = node.x0 + node.width(Some(true));
        node.y1 = node.y0 + node.height(Some(true));
    }

    sankey::assign_bands(nodes, links);
    nodes.set_expanded(false);

    debug!(
        "layout '{}': {} nodes, {} links, {} restored from cache",
        options.position_prefix,
        nodes.len(),
        links.len(),
        restored
    );

    let max_x = nodes.iter().map(|n| n.x1).fold(0.0_f32, f32::max);
    let max_y = nodes.iter().map(|n| n.y1).fold(0.0_f32, f32::max);
    CanvasSize {
        width: intrinsic.width.max(max_x + options.flow.margins.right),
        height: intrinsic.height.max(max_y + options.flow.margins.bottom),
    }
}

/// Takes the intrinsic box corner as the displayed position.
pub fn adjust_positions(nodes: &mut Nodes) {
    for node in &mut nodes.nodes {
        node.x = node.x0;
        node.y = node.y0;
    }
}

pub fn apply_saved(node: &mut Node, saved: SavedPosition) {
    node.x = saved.x;
    node.y = saved.y;
    node.x0 = saved.x0;
    node.y0 = saved.y0;
}

pub fn saved_position(node: &Node) -> SavedPosition {
    SavedPosition {
        x: node.x,
        y: node.y,
        x0: node.x0,
        y0: node.y0,
    }
}
