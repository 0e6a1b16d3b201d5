use std::collections::{BTreeMap, VecDeque};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::graph::{Links, Nodes};
use crate::layout::CanvasSize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    /// Every node sits at its depth.
    Left,
    /// Terminal nodes (incoming links, no outgoing) go to the last band.
    #[default]
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            left: 50.0,
            top: 20.0,
            right: 50.0,
            bottom: 10.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SankeyOptions {
    pub width: f32,
    pub height: f32,
    pub node_padding: f32,
    pub min_node_height: f32,
    pub margins: Margins,
    pub align: Align,
    pub sort: bool,
    /// Vertical gap between independently stacked groups.
    pub group_padding: f32,
}

/// Runs the flow layout and writes each node's intrinsic box into
/// `x0..y1`, each link's `thickness` and `band`.
///
/// With `groups`, every group is stacked on its own and placed below the
/// previous one, so groups never overlap. Nodes missing from every group
/// are stacked as one trailing group.
pub fn flow_layout(
    nodes: &mut Nodes,
    links: &mut Links,
    options: &SankeyOptions,
    groups: Option<&[Vec<usize>]>,
) -> CanvasSize {
    let count = nodes.len();
    if count == 0 {
        return CanvasSize {
            width: options.width,
            height: options.height,
        };
    }

    for node in &mut nodes.nodes {
        node.value = 0.0;
    }
    for link in links.links.iter() {
        if let Some(source) = nodes.nodes.get_mut(link.source) {
            source.value += link.value;
        }
        if let Some(target) = nodes.nodes.get_mut(link.target) {
            target.value += link.value;
        }
    }

    let depths = assign_depths(count, links);
    let columns = align_columns(&depths, links, options.align);
    let column_count = columns.iter().copied().max().unwrap_or(0) + 1;

    let inner_width = (options.width - options.margins.left - options.margins.right).max(0.0);
    let inner_height = (options.height - options.margins.top - options.margins.bottom).max(0.0);

    let ky = flow_scale(nodes, &columns, inner_height, options.node_padding);
    debug!("flow layout: {count} nodes, {column_count} bands, ky={ky:.4}");

    for link in &mut links.links {
        link.thickness = link.value * ky;
    }

    let node_width = nodes.nodes[0].width(Some(true));
    let step = if column_count > 1 {
        (inner_width - node_width).max(0.0) / (column_count - 1) as f32
    } else {
        0.0
    };
    for (idx, node) in nodes.nodes.iter_mut().enumerate() {
        let height = (node.value * ky).max(options.min_node_height);
        node.x0 = options.margins.left + columns[idx] as f32 * step;
        node.x1 = node.x0 + node.width(Some(true));
        node.y0 = 0.0;
        node.y1 = height;
    }

    let stacks: Vec<Vec<usize>> = match groups {
        Some(groups) => {
            let mut stacks: Vec<Vec<usize>> = groups
                .iter()
                .map(|group| group.iter().copied().filter(|&idx| idx < count).collect())
                .collect();
            let grouped: Vec<bool> = (0..count)
                .map(|idx| stacks.iter().any(|group| group.contains(&idx)))
                .collect();
            let rest: Vec<usize> = (0..count).filter(|&idx| !grouped[idx]).collect();
            if !rest.is_empty() {
                stacks.push(rest);
            }
            stacks
        }
        None => vec![(0..count).collect()],
    };

    let single = stacks.len() == 1;
    let mut cursor = options.margins.top;
    for group in &stacks {
        let extent = stack_group(nodes, group, &columns, options, cursor, single.then_some(inner_height));
        cursor += extent + options.group_padding;
    }

    assign_bands(nodes, links);

    let max_x = nodes.iter().map(|n| n.x1).fold(0.0_f32, f32::max);
    let max_y = nodes.iter().map(|n| n.y1).fold(0.0_f32, f32::max);
    CanvasSize {
        width: options.width.max(max_x + options.margins.right),
        height: options.height.max(max_y + options.margins.bottom),
    }
}

/// Longest-path depth from the sources. Nodes left unresolved by a cycle
/// fall back to declaration order: one past their deepest parent so far.
pub fn assign_depths(count: usize, links: &Links) -> Vec<usize> {
    let edges: Vec<(usize, usize)> = links
        .iter()
        .filter(|link| !link.is_self_loop() && link.source < count && link.target < count)
        .map(|link| (link.source, link.target))
        .collect();

    let mut levels = vec![0_usize; count];
    let mut indegree = vec![0_usize; count];
    for &(_, target) in &edges {
        indegree[target] += 1;
    }

    let mut queue: VecDeque<usize> = (0..count).filter(|&idx| indegree[idx] == 0).collect();
    let mut visited = vec![false; count];

    while let Some(node) = queue.pop_front() {
        visited[node] = true;
        for &(_, target) in edges.iter().filter(|(source, _)| *source == node) {
            levels[target] = levels[target].max(levels[node] + 1);
            if indegree[target] > 0 {
                indegree[target] -= 1;
                if indegree[target] == 0 {
                    queue.push_back(target);
                }
            }
        }
    }

    if visited.iter().any(|seen| !seen) {
        warn!("cycle in target relationships; falling back to declaration order");
        for idx in 0..count {
            if visited[idx] {
                continue;
            }
            let parent_level = edges
                .iter()
                .filter(|(_, target)| *target == idx)
                .map(|(source, _)| levels[*source] + 1)
                .max();
            levels[idx] = parent_level.unwrap_or(0);
            visited[idx] = true;
        }
    }

    levels
}

fn align_columns(depths: &[usize], links: &Links, align: Align) -> Vec<usize> {
    let max_depth = depths.iter().copied().max().unwrap_or(0);
    depths
        .iter()
        .enumerate()
        .map(|(idx, &depth)| match align {
            Align::Left => depth,
            Align::Right => {
                let has_in = links
                    .iter()
                    .any(|l| l.target == idx && !l.is_self_loop());
                let has_out = links
                    .iter()
                    .any(|l| l.source == idx && !l.is_self_loop());
                if has_in && !has_out { max_depth } else { depth }
            }
        })
        .collect()
}

/// Largest pixels-per-unit-of-flow that still fits the fullest band.
fn flow_scale(nodes: &Nodes, columns: &[usize], inner_height: f32, padding: f32) -> f32 {
    let mut per_column: BTreeMap<usize, (f32, usize)> = BTreeMap::new();
    for (idx, node) in nodes.iter().enumerate() {
        let entry = per_column.entry(columns[idx]).or_insert((0.0, 0));
        entry.0 += node.value;
        entry.1 += 1;
    }

    per_column
        .values()
        .filter(|(total, _)| *total > 0.0)
        .map(|(total, n)| {
            let available = (inner_height - padding * (*n as f32 - 1.0)).max(0.0);
            available / total
        })
        .fold(None, |best: Option<f32>, ky| Some(best.map_or(ky, |b| b.min(ky))))
        .unwrap_or(0.0)
}

/// Stacks a group's nodes band by band from `top`, centring shorter bands
/// on the tallest one (or on `fill`, when given). Returns the group extent.
fn stack_group(
    nodes: &mut Nodes,
    group: &[usize],
    columns: &[usize],
    options: &SankeyOptions,
    top: f32,
    fill: Option<f32>,
) -> f32 {
    let mut bands: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for &idx in group {
        bands.entry(columns[idx]).or_default().push(idx);
    }

    if options.sort {
        for members in bands.values_mut() {
            members.sort_by(|a, b| nodes.nodes[*b].value.total_cmp(&nodes.nodes[*a].value));
        }
    }

    let band_extent = |members: &[usize]| -> f32 {
        let heights: f32 = members
            .iter()
            .map(|&idx| nodes.nodes[idx].y1 - nodes.nodes[idx].y0)
            .sum();
        heights + options.node_padding * (members.len().saturating_sub(1)) as f32
    };

    let extents: Vec<f32> = bands.values().map(|members| band_extent(members)).collect();
    let tallest = extents.iter().copied().fold(0.0_f32, f32::max);
    let extent = fill.map_or(tallest, |fill| fill.max(tallest));

    for (members, band) in bands.values().zip(extents) {
        let mut y = top + (extent - band) / 2.0;
        for &idx in members {
            let node = &mut nodes.nodes[idx];
            let height = node.y1 - node.y0;
            node.y0 = y;
            node.y1 = y + height;
            y = node.y1 + options.node_padding;
        }
    }

    extent
}

/// Stacks each node's outgoing ribbons down its right edge and incoming
/// ribbons down its left edge, ordered by the far endpoint's position.
pub fn assign_bands(nodes: &Nodes, links: &mut Links) {
    let far_top = |idx: usize| nodes.get(idx).map(|node| node.y0).unwrap_or(0.0);

    for (node_idx, node) in nodes.iter().enumerate() {
        let mut outgoing: Vec<usize> = links
            .iter()
            .enumerate()
            .filter(|(_, link)| link.source == node_idx)
            .map(|(idx, _)| idx)
            .collect();
        outgoing.sort_by(|a, b| {
            far_top(links.links[*a].target)
                .total_cmp(&far_top(links.links[*b].target))
                .then(a.cmp(b))
        });
        let mut cursor = node.y0;
        for idx in outgoing {
            let link = &mut links.links[idx];
            link.band.sy0 = cursor;
            link.band.sy1 = cursor + link.thickness;
            cursor = link.band.sy1;
        }

        let mut incoming: Vec<usize> = links
            .iter()
            .enumerate()
            .filter(|(_, link)| link.target == node_idx)
            .map(|(idx, _)| idx)
            .collect();
        incoming.sort_by(|a, b| {
            far_top(links.links[*a].source)
                .total_cmp(&far_top(links.links[*b].source))
                .then(a.cmp(b))
        });
        let mut cursor = node.y0;
        for idx in incoming {
            let link = &mut links.links[idx];
            link.band.ty0 = cursor;
            link.band.ty1 = cursor + link.thickness;
            cursor = link.band.ty1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Direction, LinkKind, LinkStats, Node, NodeKind, NodeSizing};

    fn options() -> SankeyOptions {
        SankeyOptions {
            width: 800.0,
            height: 600.0,
            node_padding: 20.0,
            min_node_height: 40.0,
            margins: Margins::default(),
            align: Align::Right,
            sort: false,
            group_padding: 30.0,
        }
    }

    fn graph(names: &[&str], edges: &[(usize, usize, u64)]) -> (Nodes, Links) {
        let sizing = NodeSizing {
            width: 100.0,
            height: 40.0,
        };
        let mut nodes = Nodes::new();
        for name in names {
            nodes.insert(Node::new(*name, NodeKind::Service, sizing), false);
        }
        let mut links = Links::new();
        for &(s, t, bytes) in edges {
            let slot = links.get_link(s, t, Direction::Out, LinkKind::Service, format!("{s}-{t}"));
            links.links[slot.index].record(
                slot,
                LinkStats {
                    bytes_out: bytes,
                    ..Default::default()
                },
            );
        }
        (nodes, links)
    }

    #[test]
    fn depths_follow_links() {
        let (_, links) = graph(&["a", "b", "c", "d"], &[(0, 1, 1), (1, 2, 1), (0, 2, 1)]);
        assert_eq!(assign_depths(4, &links), vec![0, 1, 2, 0]);
    }

    #[test]
    fn cycle_terminates_deterministically() {
        let (_, links) = graph(&["a", "b", "c"], &[(0, 1, 1), (1, 2, 1), (2, 1, 1)]);
        let first = assign_depths(3, &links);
        let second = assign_depths(3, &links);
        assert_eq!(first, second);
        assert_eq!(first[0], 0);
        assert!(first[1] >= 1);
    }

    #[test]
    fn flow_drives_heights_and_thickness() {
        let (mut nodes, mut links) = graph(&["svc1", "svc2", "svc3"], &[(0, 1, 100), (1, 2, 50)]);
        flow_layout(&mut nodes, &mut links, &options(), None);

        let h1 = nodes.nodes[0].y1 - nodes.nodes[0].y0;
        let h2 = nodes.nodes[1].y1 - nodes.nodes[1].y0;
        assert!(h2 > h1);
        assert!((h2 / h1 - 1.5).abs() < 1e-3);
        assert!(links.links[0].thickness > links.links[1].thickness);
        assert!((links.links[0].thickness / links.links[1].thickness - 2.0).abs() < 1e-3);

        assert!(nodes.nodes[0].x0 < nodes.nodes[1].x0);
        assert!(nodes.nodes[1].x0 < nodes.nodes[2].x0);
    }

    #[test]
    fn zero_flow_gets_min_height() {
        let (mut nodes, mut links) = graph(&["a", "b"], &[]);
        flow_layout(&mut nodes, &mut links, &options(), None);
        for node in nodes.iter() {
            assert_eq!(node.y1 - node.y0, 40.0);
        }
    }

    #[test]
    fn right_align_pushes_terminals() {
        let (mut nodes, mut links) = graph(&["a", "b", "c", "d"], &[(0, 1, 1), (1, 2, 1), (0, 3, 1)]);
        flow_layout(&mut nodes, &mut links, &options(), None);
        assert_eq!(nodes.nodes[3].x0, nodes.nodes[2].x0);

        let mut left = options();
        left.align = Align::Left;
        flow_layout(&mut nodes, &mut links, &left, None);
        assert_eq!(nodes.nodes[3].x0, nodes.nodes[1].x0);
    }

    #[test]
    fn bands_stack_within_node() {
        let (mut nodes, mut links) = graph(&["a", "b", "c"], &[(0, 1, 30), (0, 2, 10)]);
        flow_layout(&mut nodes, &mut links, &options(), None);
        let first = links.links[0].band;
        let second = links.links[1].band;
        assert_eq!(first.sy0, nodes.nodes[0].y0);
        assert!((second.sy0 - first.sy1).abs() < 1e-3 || (first.sy0 - second.sy1).abs() < 1e-3);
        assert_eq!(first.ty0, nodes.nodes[1].y0);
    }

    #[test]
    fn groups_do_not_overlap() {
        let (mut nodes, mut links) = graph(&["a", "b", "c", "d"], &[(0, 1, 10), (2, 3, 10)]);
        let groups = vec![vec![0, 1], vec![2, 3]];
        flow_layout(&mut nodes, &mut links, &options(), Some(&groups));
        let first_bottom = nodes.nodes[0].y1.max(nodes.nodes[1].y1);
        let second_top = nodes.nodes[2].y0.min(nodes.nodes[3].y0);
        assert!(second_top >= first_bottom + 30.0 - 1e-3);
    }

    #[test]
    fn layout_is_idempotent() {
        let (mut nodes, mut links) = graph(&["a", "b", "c"], &[(0, 1, 5), (1, 2, 7)]);
        flow_layout(&mut nodes, &mut links, &options(), None);
        let before: Vec<_> = nodes.iter().map(|n| (n.x0, n.y0, n.x1, n.y1)).collect();
        flow_layout(&mut nodes, &mut links, &options(), None);
        let after: Vec<_> = nodes.iter().map(|n| (n.x0, n.y0, n.x1, n.y1)).collect();
        assert_eq!(before, after);
    }
}
