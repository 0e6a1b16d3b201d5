use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use topoview::scene::{LinkAttrs, NodeAttrs};
use topoview::{
    ElementRef, EngineConfig, NullRenderer, PositionCache, Renderer, SvgRenderer, TopologyData,
    TopologyEngine, TransitionOutcome, View, ViewState,
};

fn fixture() -> Result<TopologyData> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/input/topology.json");
    Ok(TopologyData::load(&path)?)
}

fn engine_with(data: TopologyData, renderer: Box<dyn Renderer>) -> TopologyEngine {
    TopologyEngine::new(data, EngineConfig::default(), PositionCache::in_memory(), renderer)
}

#[derive(Clone, Default)]
struct CountingRenderer {
    updates: Arc<AtomicUsize>,
    removals: Arc<AtomicUsize>,
}

impl Renderer for CountingRenderer {
    fn update_node(&mut self, _attrs: &NodeAttrs) {
        self.updates.fetch_add(1, Ordering::SeqCst);
    }

    fn update_link(&mut self, _attrs: &LinkAttrs) {
        self.updates.fetch_add(1, Ordering::SeqCst);
    }

    fn remove_node(&mut self, _key: &str) {
        self.removals.fetch_add(1, Ordering::SeqCst);
    }

    fn remove_link(&mut self, _uid: &str) {
        self.removals.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test(start_paused = true)]
async fn empty_topology_resolves_immediately() {
    let mut engine = engine_with(TopologyData::default(), Box::new(NullRenderer));
    let handle = engine.transition(ViewState::new(View::Site, true));
    assert_eq!(handle.animations(), 0);

    let outcome = tokio::time::timeout(Duration::from_millis(1), handle.wait())
        .await
        .expect("an empty transition must not wait for anything");
    assert!(matches!(
        outcome,
        TransitionOutcome::Completed { animations: 0, .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn resolves_only_after_every_tween() -> Result<()> {
    let mut engine = engine_with(fixture()?, Box::new(NullRenderer));
    engine.show(ViewState::new(View::Service, false));

    let handle = engine.transition(ViewState::new(View::Service, true));
    assert!(handle.animations() > 0);
    let waiter = tokio::spawn(handle.wait());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!waiter.is_finished(), "tweens are still running half way through");

    let outcome = waiter.await?;
    assert!(matches!(outcome, TransitionOutcome::Completed { .. }));
    assert_eq!(
        engine.scene(),
        engine.frame_for(ViewState::new(View::Service, true))
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn superseded_transition_leaves_latest_geometry() -> Result<()> {
    let mut engine = engine_with(fixture()?, Box::new(NullRenderer));
    engine.show(ViewState::new(View::Site, false));

    let first = engine.transition(ViewState::new(View::Deployment, false));
    let second = engine.transition(ViewState::new(View::Service, true));

    let first = first.wait().await;
    assert_eq!(
        first,
        TransitionOutcome::Superseded {
            generation: second.generation() - 1
        }
    );
    let second = second.wait().await;
    assert!(matches!(second, TransitionOutcome::Completed { .. }));

    let target = engine.frame_for(ViewState::new(View::Service, true));
    assert_eq!(engine.scene(), target);
    // nothing from the abandoned deployment view survives
    assert!(!engine.scene().nodes.contains_key("cluster:east"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn mid_flight_switch_converges() -> Result<()> {
    let mut engine = engine_with(fixture()?, Box::new(NullRenderer));
    engine.show(ViewState::new(View::Service, false));

    let first = engine.transition(ViewState::new(View::Deployment, true));
    tokio::time::sleep(Duration::from_millis(300)).await;
    let second = engine.transition(ViewState::new(View::Site, false));

    assert!(matches!(first.wait().await, TransitionOutcome::Superseded { .. }));
    assert!(matches!(second.wait().await, TransitionOutcome::Completed { .. }));
    assert_eq!(
        engine.scene(),
        engine.frame_for(ViewState::new(View::Site, false))
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn renderer_mirrors_the_scene() -> Result<()> {
    let renderer = SvgRenderer::new();
    let mut engine = engine_with(fixture()?, Box::new(renderer.clone()));
    engine.show(ViewState::new(View::Deployment, false));
    assert_eq!(renderer.frame(), engine.scene());

    let handle = engine.transition(ViewState::new(View::Site, true));
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(renderer.frame(), engine.scene());

    handle.wait().await;
    assert_eq!(renderer.frame(), engine.scene());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn refresh_fades_elements_in_and_out() -> Result<()> {
    let renderer = CountingRenderer::default();
    let removals = renderer.removals.clone();
    let updates = renderer.updates.clone();

    let mut engine = engine_with(fixture()?, Box::new(renderer));
    engine.show(ViewState::new(View::Service, false));
    assert!(updates.load(Ordering::SeqCst) > 0);

    let mut data = fixture()?;
    data.services.retain(|svc| svc.address != "ledger");
    for svc in &mut data.services {
        svc.targets.retain(|t| t != "ledger");
    }
    data.services.push(topoview::topology::ServiceRecord {
        address: "search".into(),
        targets: vec![],
    });

    let handle = engine.refresh(data);
    tokio::time::sleep(Duration::from_millis(100)).await;
    let mid = engine.scene();
    assert!(mid.nodes.contains_key("ledger"), "leaving nodes fade out first");
    assert!(mid.nodes["search"].opacity < 1.0, "new nodes fade in");

    assert!(matches!(handle.wait().await, TransitionOutcome::Completed { .. }));
    let scene = engine.scene();
    assert!(!scene.nodes.contains_key("ledger"));
    assert_eq!(scene.nodes["search"].opacity, 1.0);
    // ledger and its incoming link were dropped
    assert_eq!(removals.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn refresh_drops_highlight_on_a_vanished_link() -> Result<()> {
    let mut engine = engine_with(fixture()?, Box::new(NullRenderer));
    let state = ViewState::new(View::Service, false);
    engine.show(state);
    engine.highlight(ElementRef::Link("service:payments->ledger".into()), true);
    assert!(engine.scene().nodes["frontend"].opacity < 1.0);

    let mut data = fixture()?;
    for svc in &mut data.services {
        if svc.address == "payments" {
            svc.targets.clear();
        }
    }
    engine.refresh(data).wait().await;

    let scene = engine.scene();
    assert!(!scene.links.contains_key("service:payments->ledger"));
    assert!(scene.nodes.values().all(|node| node.opacity == 1.0));
    assert!(scene.links.values().all(|link| link.opacity == 1.0));
    assert_eq!(scene, engine.frame_for(state));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn rapid_switching_converges_to_last_request() -> Result<()> {
    let mut engine = engine_with(fixture()?, Box::new(NullRenderer));
    let mut handles = Vec::new();
    for state in ViewState::all() {
        handles.push(engine.transition(state));
    }
    let last = ViewState::all().last().expect("six states");

    let mut completed = 0;
    for handle in handles {
        if matches!(handle.wait().await, TransitionOutcome::Completed { .. }) {
            completed += 1;
        }
    }
    assert_eq!(completed, 1);
    assert_eq!(engine.state(), last);
    assert_eq!(engine.scene(), engine.frame_for(last));
    Ok(())
}
