use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};

use crate::cache::{PositionCache, position_key};
use crate::config::EngineConfig;
use crate::graph::Node;
use crate::layout;
use crate::policy::{self, ViewState};
use crate::render::Renderer;
use crate::sankey;
use crate::scene::{Frame, FrameOptions};
use crate::topology::TopologyData;
use crate::transition::{ElementRef, TransitionHandle, TransitionOrchestrator};
use crate::views::{self, View, ViewGraph};

pub struct TopologyEngine {
    data: TopologyData,
    config: EngineConfig,
    cache: PositionCache,
    graphs: BTreeMap<View, ViewGraph>,
    state: ViewState,
    orchestrator: TransitionOrchestrator,
    highlighted: Option<ElementRef>,
    dragging: Option<String>,
}

impl TopologyEngine {
    pub fn new(
        data: TopologyData,
        config: EngineConfig,
        cache: PositionCache,
        renderer: Box<dyn Renderer>,
    ) -> Self {
        let orchestrator =
            TransitionOrchestrator::new(renderer, config.duration(), config.frame_interval());
        let mut engine = Self {
            data,
            config,
            cache,
            graphs: BTreeMap::new(),
            state: ViewState::default(),
            orchestrator,
            highlighted: None,
            dragging: None,
        };
        engine.rebuild();
        engine
    }

    fn rebuild(&mut self) {
        let previous = std::mem::take(&mut self.graphs);
        for view in View::ALL {
            let mut graph = views::build_view(view, &self.data, &self.config, &self.cache);
            if let Some(old) = previous.get(&view) {
                carry_selection(old, &mut graph);
            }
            self.graphs.insert(view, graph);
        }
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn data(&self) -> &TopologyData {
        &self.data
    }

    pub fn graph(&self, view: View) -> Option<&ViewGraph> {
        self.graphs.get(&view)
    }

    /// What is currently displayed, including any in-flight tween values.
    pub fn scene(&self) -> Frame {
        self.orchestrator.scene()
    }

    pub fn generation(&self) -> u64 {
        self.orchestrator.generation()
    }

    fn frame_options(&self) -> FrameOptions {
        FrameOptions {
            color_links: self.config.color_links,
            stat: self.config.stat,
        }
    }

    /// The frame a state resolves to right now, highlight included.
    pub fn frame_for(&self, state: ViewState) -> Frame {
        let Some(graph) = self.graphs.get(&state.view) else {
            return Frame::default();
        };
        let plan = policy::select(state);
        debug!("{state}: {} ({:?} layout)", plan.name, plan.layout);
        let mut frame = (plan.build_frame)(graph, &self.frame_options());
        if let Some(element) = &self.highlighted {
            let (nodes, links) = neighbourhood(graph, element);
            frame.blur_except(&nodes, &links);
        }
        frame
    }

    /// Switches to `state` without animation.
    pub fn show(&mut self, state: ViewState) {
        self.state = state;
        let frame = self.frame_for(state);
        self.orchestrator.commit(&frame);
    }

    /// Animates from whatever is displayed to `to`. Any running transition
    /// is superseded. Must be called from inside a tokio runtime.
    pub fn transition(&mut self, to: ViewState) -> TransitionHandle {
        debug!("transition {} -> {}", self.state, to);
        if self.state.view != to.view {
            self.highlighted = None;
        }
        self.state = to;
        let frame = self.frame_for(to);
        self.orchestrator.transition(frame)
    }

    /// Replaces the topology, rebuilds every view and animates the current
    /// view to the new data.
    pub fn refresh(&mut self, data: TopologyData) -> TransitionHandle {
        self.data = data;
        self.rebuild();
        if self
            .highlighted
            .as_ref()
            .is_some_and(|element| !self.has_element(element))
        {
            self.highlighted = None;
        }
        self.transition(self.state)
    }

    fn has_element(&self, element: &ElementRef) -> bool {
        self.graphs
            .get(&self.state.view)
            .is_some_and(|graph| match element {
                ElementRef::Node(key) => graph.nodes.index_of_key(key).is_some(),
                ElementRef::Link(uid) => graph.links.by_uid(uid).is_some(),
            })
    }

    pub fn drag_start(&mut self, key: &str) -> bool {
        let known = self
            .graphs
            .get(&self.state.view)
            .is_some_and(|graph| graph.nodes.index_of_key(key).is_some());
        if known {
            self.dragging = Some(key.to_string());
        } else {
            warn!("drag started on unknown node '{key}'");
        }
        known
    }

    /// Moves a node of the current view to `(x, y)`, saves the position
    /// and shows the result immediately.
    pub fn drag(&mut self, key: &str, x: f32, y: f32) -> bool {
        let view = self.state.view;
        let Some(graph) = self.graphs.get_mut(&view) else {
            return false;
        };
        let Some(idx) = graph.nodes.index_of_key(key) else {
            warn!("drag on unknown node '{key}'");
            return false;
        };

        let saved = {
            let node = &mut graph.nodes.nodes[idx];
            move_node(node, x, y);
            layout::saved_position(node)
        };
        sankey::assign_bands(&graph.nodes, &mut graph.links);
        graph.update_paths();
        self.cache
            .set_saved(&position_key(view.position_prefix(), key), saved);

        if self.dragging.as_deref() == Some(key) {
            self.dragging = None;
        }
        let frame = self.frame_for(self.state);
        self.orchestrator.commit(&frame);
        true
    }

    /// Dims everything outside the element's neighbourhood, or clears the
    /// highlight when `on` is false. Unknown elements are ignored.
    pub fn highlight(&mut self, element: ElementRef, on: bool) {
        if on {
            if !self.has_element(&element) {
                warn!("highlight on unknown element {element:?}");
                return;
            }
            self.highlighted = Some(element);
        } else if self.highlighted.as_ref() == Some(&element) {
            self.highlighted = None;
        } else {
            return;
        }
        let frame = self.frame_for(self.state);
        self.orchestrator.commit(&frame);
    }

    /// Toggles the selection flag. Returns the new flag, or `None` for an
    /// unknown element.
    pub fn select(&mut self, element: &ElementRef) -> Option<bool> {
        let graph = self.graphs.get_mut(&self.state.view)?;
        let selected = match element {
            ElementRef::Node(key) => {
                let idx = graph.nodes.index_of_key(key)?;
                let node = &mut graph.nodes.nodes[idx];
                node.selected = !node.selected;
                node.selected
            }
            ElementRef::Link(uid) => {
                let idx = graph.links.by_uid(uid)?;
                let link = &mut graph.links.links[idx];
                link.selected = !link.selected;
                link.selected
            }
        };
        let frame = self.frame_for(self.state);
        self.orchestrator.commit(&frame);
        Some(selected)
    }
}

fn move_node(node: &mut Node, x: f32, y: f32) {
    node.x = x;
    node.y = y;
    node.x0 = x;
    node.y0 = y;
    node.x1 = x + node.width(Some(true));
    node.y1 = y + node.height(Some(true));
}

fn carry_selection(old: &ViewGraph, graph: &mut ViewGraph) {
    for node in &mut graph.nodes.nodes {
        let key = node.key();
        node.selected = old
            .nodes
            .index_of_key(&key)
            .is_some_and(|idx| old.nodes.nodes[idx].selected);
    }
    for link in &mut graph.links.links {
        link.selected = old
            .links
            .by_uid(&link.uid)
            .is_some_and(|idx| old.links.links[idx].selected);
    }
}

/// Node keys and link uids adjacent to `element`.
fn neighbourhood(graph: &ViewGraph, element: &ElementRef) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut nodes = BTreeSet::new();
    let mut links = BTreeSet::new();
    let mut add_link = |idx: usize, nodes: &mut BTreeSet<String>| {
        let link = &graph.links.links[idx];
        links.insert(link.uid.clone());
        for end in [link.source, link.target] {
            if let Some(node) = graph.nodes.get(end) {
                nodes.insert(node.key());
            }
        }
    };
    match element {
        ElementRef::Node(key) => {
            if let Some(idx) = graph.nodes.index_of_key(key) {
                nodes.insert(key.clone());
                for link in graph.links.incident(idx) {
                    add_link(link, &mut nodes);
                }
            }
        }
        ElementRef::Link(uid) => {
            if let Some(idx) = graph.links.by_uid(uid) {
                add_link(idx, &mut nodes);
            }
        }
    }
    (nodes, links)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BLUR_OPACITY;
    use crate::render::NullRenderer;

    const SAMPLE: &str = r#"{
        "sites": [{"site_id": "east", "services": ["a", "b", "c"]}],
        "services": [
            {"address": "a", "targets": ["b"]},
            {"address": "b", "targets": ["c"]},
            {"address": "c"}
        ],
        "traffic": [
            {"source": "a", "target": "b", "bytes_out": 100},
            {"source": "b", "target": "c", "bytes_out": 50}
        ]
    }"#;

    fn engine() -> TopologyEngine {
        TopologyEngine::new(
            TopologyData::parse(SAMPLE).unwrap(),
            EngineConfig::default(),
            PositionCache::in_memory(),
            Box::new(NullRenderer),
        )
    }

    #[test]
    fn show_commits_frame() {
        let mut engine = engine();
        let state = ViewState::new(View::Service, true);
        engine.show(state);
        assert_eq!(engine.state(), state);
        assert_eq!(engine.scene(), engine.frame_for(state));
    }

    #[test]
    fn drag_moves_and_persists() {
        let mut engine = engine();
        engine.show(ViewState::new(View::Service, false));
        assert!(engine.drag_start("a"));
        assert!(engine.drag("a", 15.0, 25.0));
        assert_eq!(engine.scene().nodes["a"].x, 15.0);
        assert_eq!(engine.scene().nodes["a"].y, 25.0);
        assert!(!engine.drag("nope", 1.0, 1.0));

        // the saved position survives a rebuild
        let data = engine.data().clone();
        let mut engine = TopologyEngine::new(
            data,
            EngineConfig::default(),
            std::mem::take(&mut engine.cache),
            Box::new(NullRenderer),
        );
        engine.show(ViewState::new(View::Service, false));
        assert_eq!(engine.scene().nodes["a"].x, 15.0);
    }

    #[test]
    fn highlight_blurs_the_rest() {
        let mut engine = engine();
        engine.show(ViewState::new(View::Service, false));
        engine.highlight(ElementRef::Node("a".into()), true);
        let scene = engine.scene();
        assert_eq!(scene.nodes["a"].opacity, 1.0);
        assert_eq!(scene.nodes["b"].opacity, 1.0);
        assert_eq!(scene.nodes["c"].opacity, BLUR_OPACITY);
        assert_eq!(scene.links["service:b->c"].opacity, BLUR_OPACITY);

        engine.highlight(ElementRef::Node("a".into()), false);
        assert_eq!(engine.scene().nodes["c"].opacity, 1.0);
    }

    #[test]
    fn highlight_ignores_unknown_elements() {
        let mut engine = engine();
        engine.show(ViewState::new(View::Service, false));
        engine.highlight(ElementRef::Node("nope".into()), true);
        engine.highlight(ElementRef::Link("service:c->a".into()), true);
        let scene = engine.scene();
        assert!(scene.nodes.values().all(|node| node.opacity == 1.0));
        assert!(scene.links.values().all(|link| link.opacity == 1.0));

        // an existing highlight survives a bad request
        engine.highlight(ElementRef::Node("a".into()), true);
        engine.highlight(ElementRef::Node("nope".into()), true);
        assert_eq!(engine.scene().nodes["c"].opacity, BLUR_OPACITY);
    }

    #[test]
    fn select_toggles() {
        let mut engine = engine();
        engine.show(ViewState::new(View::Service, false));
        let a = ElementRef::Node("a".into());
        assert_eq!(engine.select(&a), Some(true));
        assert!(engine.scene().nodes["a"].selected);
        assert_eq!(engine.select(&a), Some(false));
        assert_eq!(engine.select(&ElementRef::Link("nope".into())), None);
    }
}
