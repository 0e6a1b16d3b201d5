use clap::ValueEnum;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::cache::PositionCache;
use crate::config::EngineConfig;
use crate::graph::{
    self, Direction, LinkKind, LinkStats, Links, Node, NodeKind, Nodes, link_uid,
};
use crate::layout::{self, CanvasSize};
use crate::path::{self, PathRequest};
use crate::topology::{RequestTotals, TopologyData};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum View {
    Site,
    Deployment,
    #[default]
    Service,
}

impl View {
    pub const ALL: [View; 3] = [View::Site, View::Deployment, View::Service];

    pub fn as_str(&self) -> &'static str {
        match self {
            View::Site => "site",
            View::Deployment => "deployment",
            View::Service => "service",
        }
    }

    pub fn position_prefix(&self) -> &'static str {
        match self {
            View::Site => "site",
            View::Deployment => "dep",
            View::Service => "svc",
        }
    }
}

/// A site container drawn around its deployments.
#[derive(Debug, Clone)]
pub struct ClusterBox {
    pub site_id: String,
    pub label: String,
    pub members: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct ViewGraph {
    pub view: View,
    pub nodes: Nodes,
    pub links: Links,
    pub size: CanvasSize,
    pub clusters: Vec<ClusterBox>,
}

impl ViewGraph {
    /// Recomputes both cached path shapes of every link from the current
    /// node geometry.
    pub fn update_paths(&mut self) {
        for idx in 0..self.links.len() {
            let link = &self.links.links[idx];
            let normal = path::gen_path(&PathRequest {
                link,
                nodes: &self.nodes,
                use_sankey_y: false,
                sankey: false,
                width: None,
            });
            let sankey = path::gen_path(&PathRequest {
                link,
                nodes: &self.nodes,
                use_sankey_y: true,
                sankey: true,
                width: None,
            });
            let paths = &mut self.links.links[idx].paths;
            paths.normal = Some(normal);
            paths.sankey = Some(sankey);
        }
    }
}

pub trait TopologyView {
    fn view(&self) -> View;

    fn build_nodes(&self, data: &TopologyData, config: &EngineConfig) -> Nodes;

    fn build_links(&self, data: &TopologyData, nodes: &Nodes) -> Links;

    /// Node groups laid out independently of each other.
    fn groups(&self, _nodes: &Nodes) -> Option<Vec<Vec<usize>>> {
        None
    }

    fn clusters(&self, _data: &TopologyData, _nodes: &Nodes) -> Vec<ClusterBox> {
        Vec::new()
    }
}

pub struct SiteView;
pub struct DeploymentView;
pub struct ServiceView;

fn totals_to_stats(totals: RequestTotals) -> LinkStats {
    LinkStats {
        bytes_out: totals.bytes_out,
        bytes_in: totals.bytes_in,
        requests: totals.requests,
    }
}

impl TopologyView for SiteView {
    fn view(&self) -> View {
        View::Site
    }

    fn build_nodes(&self, data: &TopologyData, config: &EngineConfig) -> Nodes {
        let mut nodes = Nodes::new();
        for site in &data.sites {
            let mut node = Node::new(&site.site_id, NodeKind::Site, config.sizing(NodeKind::Site));
            node.short_name = graph::short_name(site.display_name());
            node.targets = site.connected.clone();
            nodes.insert(node, false);
        }
        nodes
    }

    fn build_links(&self, data: &TopologyData, nodes: &Nodes) -> Links {
        let mut links = Links::new();
        for (source, node) in nodes.iter().enumerate() {
            for target_id in &node.targets {
                let Some(target) = nodes.node_for(target_id) else {
                    warn!("site '{}' links to unknown site '{target_id}'; skipping", node.name);
                    continue;
                };
                let uid = link_uid(LinkKind::Connection, &node.key(), target_id);
                links.get_link(source, target, Direction::Out, LinkKind::Connection, uid);
            }
        }

        for (source, from) in nodes.iter().enumerate() {
            for (target, to) in nodes.iter().enumerate() {
                let totals = data.site_request(&from.name, &to.name);
                if totals.is_empty() {
                    continue;
                }
                let uid = link_uid(LinkKind::Traffic, &from.key(), &to.key());
                let slot = links.get_link(source, target, Direction::Out, LinkKind::Traffic, uid);
                links.links[slot.index].record(slot, totals_to_stats(totals));
            }
        }
        links
    }
}

impl TopologyView for DeploymentView {
    fn view(&self) -> View {
        View::Deployment
    }

    fn build_nodes(&self, data: &TopologyData, config: &EngineConfig) -> Nodes {
        let mut nodes = Nodes::new();
        for site in &data.sites {
            for address in &site.services {
                let Some(service) = data.service(address) else {
                    warn!("site '{}' deploys unknown service '{address}'; skipping", site.site_id);
                    continue;
                };
                let mut node = Node::new(
                    address,
                    NodeKind::Deployment,
                    config.sizing(NodeKind::Deployment),
                )
                .with_cluster(&site.site_id);
                node.targets = service.targets.clone();
                nodes.insert(node, true);
            }
        }
        nodes
    }

    fn build_links(&self, data: &TopologyData, nodes: &Nodes) -> Links {
        let mut links = Links::new();
        for (source, node) in nodes.iter().enumerate() {
            let cluster = node.cluster.as_deref().unwrap_or_default();
            for target_name in &node.targets {
                // prefer the instance deployed on the same site
                let Some(target) = nodes
                    .find_in(target_name, cluster)
                    .or_else(|| nodes.node_for(target_name))
                else {
                    warn!("deployment '{}' targets unknown service '{target_name}'; skipping", node.key());
                    continue;
                };
                let target_node = &nodes.nodes[target];
                let target_cluster = target_node.cluster.as_deref().unwrap_or_default();
                let uid = link_uid(LinkKind::Service, &node.key(), &target_node.key());
                let slot = links.get_link(source, target, Direction::Out, LinkKind::Service, uid);
                let totals = data.link_request(&node.name, target_name, Some((cluster, target_cluster)));
                links.links[slot.index].record(slot, totals_to_stats(totals));
            }
        }
        links
    }

    fn groups(&self, nodes: &Nodes) -> Option<Vec<Vec<usize>>> {
        let mut order: Vec<&str> = Vec::new();
        for node in nodes.iter() {
            if let Some(cluster) = node.cluster.as_deref() {
                if !order.contains(&cluster) {
                    order.push(cluster);
                }
            }
        }
        let groups = order
            .iter()
            .map(|cluster| {
                nodes
                    .iter()
                    .enumerate()
                    .filter(|(_, node)| node.cluster.as_deref() == Some(*cluster))
                    .map(|(idx, _)| idx)
                    .collect()
            })
            .collect();
        Some(groups)
    }

    fn clusters(&self, data: &TopologyData, nodes: &Nodes) -> Vec<ClusterBox> {
        let groups = self.groups(nodes).unwrap_or_default();
        groups
            .into_iter()
            .filter_map(|members| {
                let site_id = members
                    .first()
                    .and_then(|&idx| nodes.nodes[idx].cluster.as_deref())?;
                let site = data.site(site_id)?;
                Some(ClusterBox {
                    site_id: site.site_id.clone(),
                    label: site.display_name().to_string(),
                    members,
                })
            })
            .collect()
    }
}

impl TopologyView for ServiceView {
    fn view(&self) -> View {
        View::Service
    }

    fn build_nodes(&self, data: &TopologyData, config: &EngineConfig) -> Nodes {
        let mut nodes = Nodes::new();
        for service in &data.services {
            let mut node = Node::new(
                &service.address,
                NodeKind::Service,
                config.sizing(NodeKind::Service),
            );
            node.targets = service.targets.clone();
            nodes.insert(node, false);
        }
        nodes
    }

    fn build_links(&self, data: &TopologyData, nodes: &Nodes) -> Links {
        let mut links = Links::new();
        for (source, node) in nodes.iter().enumerate() {
            for target_name in &node.targets {
                let Some(target) = nodes.node_for(target_name) else {
                    warn!("service '{}' targets unknown service '{target_name}'; skipping", node.name);
                    continue;
                };
                let uid = link_uid(LinkKind::Service, &node.key(), target_name);
                let slot = links.get_link(source, target, Direction::Out, LinkKind::Service, uid);
                let totals = data.link_request(&node.name, target_name, None);
                links.links[slot.index].record(slot, totals_to_stats(totals));
            }
        }
        links
    }
}

pub fn builder_for(view: View) -> Box<dyn TopologyView + Send + Sync> {
    match view {
        View::Site => Box::new(SiteView),
        View::Deployment => Box::new(DeploymentView),
        View::Service => Box::new(ServiceView),
    }
}

/// Builds, lays out and paths one view of the topology.
pub fn build_view(
    view: View,
    data: &TopologyData,
    config: &EngineConfig,
    cache: &PositionCache,
) -> ViewGraph {
    let builder = builder_for(view);
    let mut nodes = builder.build_nodes(data, config);
    let mut links = builder.build_links(data, &nodes);
    path::circularize(&mut links);

    let groups = builder.groups(&nodes);
    let options = config.layout_options(view.position_prefix());
    let size = layout::compute_layout(&mut nodes, &mut links, &options, groups.as_deref(), cache);
    let clusters = builder.clusters(data, &nodes);

    debug!(
        "built {} view: {} nodes, {} links, {} clusters",
        view.as_str(),
        nodes.len(),
        links.len(),
        clusters.len()
    );

    let mut graph = ViewGraph {
        view,
        nodes,
        links,
        size,
        clusters,
    };
    graph.update_paths();
    graph
}
