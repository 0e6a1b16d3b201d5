use std::path::PathBuf;

use anyhow::Result;
use topoview::graph::Direction;
use topoview::views::build_view;
use topoview::{
    EngineConfig, LinkKind, Links, MemoryStore, NullRenderer, PositionCache, PositionStore,
    SavedPosition, TopologyData, TopologyEngine, View, ViewState,
};

fn fixture() -> Result<TopologyData> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/input/topology.json");
    Ok(TopologyData::load(&path)?)
}

fn chain() -> Result<TopologyData> {
    Ok(TopologyData::parse(
        r#"{
            "services": [
                {"address": "svc1", "targets": ["svc2"]},
                {"address": "svc2", "targets": ["svc3"]},
                {"address": "svc3"}
            ],
            "traffic": [
                {"source": "svc1", "target": "svc2", "bytes_out": 100},
                {"source": "svc2", "target": "svc3", "bytes_out": 50}
            ]
        }"#,
    )?)
}

#[test]
fn flow_layout_reflects_traffic() -> Result<()> {
    let graph = build_view(
        View::Service,
        &chain()?,
        &EngineConfig::default(),
        &PositionCache::in_memory(),
    );
    let height = |name: &str| {
        let idx = graph.nodes.node_for(name).expect("node exists");
        graph.nodes.nodes[idx].height(Some(true))
    };

    let (h1, h2) = (height("svc1"), height("svc2"));
    assert!(h2 > h1, "svc2 carries 150 units, svc1 only 100");
    assert!((h2 / h1 - 1.5).abs() < 1e-3, "heights should scale with flow");

    let thickness = |uid: &str| {
        let idx = graph.links.by_uid(uid).expect("link exists");
        graph.links.links[idx].thickness
    };
    assert!(thickness("service:svc1->svc2") > thickness("service:svc2->svc3"));

    Ok(())
}

#[test]
fn saved_position_overrides_layout() -> Result<()> {
    let data = TopologyData::parse(
        r#"{"services": [{"address": "A", "targets": ["B"]}, {"address": "B"}],
            "traffic": [{"source": "A", "target": "B", "bytes_out": 10}]}"#,
    )?;
    let mut store = MemoryStore::new();
    store.save("svc-A", r#"{"x":10,"y":20,"x0":10,"y0":20}"#.to_string())?;
    let cache = PositionCache::new(store);

    let graph = build_view(View::Service, &data, &EngineConfig::default(), &cache);
    let a = &graph.nodes.nodes[graph.nodes.node_for("A").expect("A exists")];
    assert_eq!((a.x, a.y), (10.0, 20.0));

    let plain = build_view(
        View::Service,
        &data,
        &EngineConfig::default(),
        &PositionCache::in_memory(),
    );
    let computed = &plain.nodes.nodes[0];
    assert_ne!((computed.x, computed.y), (10.0, 20.0));

    Ok(())
}

#[test]
fn layout_is_idempotent_without_cache() -> Result<()> {
    let data = fixture()?;
    for view in View::ALL {
        let first = build_view(view, &data, &EngineConfig::default(), &PositionCache::in_memory());
        let second = build_view(view, &data, &EngineConfig::default(), &PositionCache::in_memory());
        let boxes = |graph: &topoview::ViewGraph| {
            graph
                .nodes
                .iter()
                .map(|n| (n.key(), n.x, n.y, n.x1, n.y1))
                .collect::<Vec<_>>()
        };
        assert_eq!(boxes(&first), boxes(&second), "{} view differs", view.as_str());
        assert_eq!(first.size, second.size);
    }
    Ok(())
}

#[test]
fn link_requests_are_deduplicated() {
    let mut links = Links::new();
    for (a, b) in [(0, 1), (1, 0), (0, 1), (2, 3), (3, 2)] {
        links.get_link(a, b, Direction::Out, LinkKind::Service, format!("{a}-{b}"));
    }
    assert_eq!(links.len(), 2);

    let again = links.get_link(1, 0, Direction::Out, LinkKind::Service, "ignored");
    assert_eq!(again.index, 0);
    assert!(again.reversed);
}

#[test]
fn deployment_view_duplicates_shared_services() -> Result<()> {
    let graph = build_view(
        View::Deployment,
        &fixture()?,
        &EngineConfig::default(),
        &PositionCache::in_memory(),
    );
    let keys: Vec<String> = graph.nodes.iter().map(|n| n.key()).collect();
    assert!(keys.contains(&"cart".to_string()));
    assert!(keys.contains(&"cart@west".to_string()));

    let east_cart = graph
        .links
        .by_uid("service:cart->payments")
        .expect("east cart calls payments in the west");
    assert_eq!(graph.links.links[east_cart].forward.bytes_out, 30000);
    let west_cart = graph
        .links
        .by_uid("service:cart@west->payments")
        .expect("west cart calls its local payments");
    assert_eq!(graph.links.links[west_cart].forward.bytes_out, 10000);
    Ok(())
}

#[test]
fn engine_frames_render_to_svg() -> Result<()> {
    let mut engine = TopologyEngine::new(
        fixture()?,
        EngineConfig::default(),
        PositionCache::in_memory(),
        Box::new(NullRenderer),
    );
    engine.show(ViewState::new(View::Deployment, true));

    let svg = topoview::render::frame_to_svg(&engine.scene(), "white")?;
    assert!(svg.contains("<svg"), "rendered svg should contain root element");
    assert!(svg.contains("East Region"), "cluster labels should appear");
    assert!(svg.contains("payments"), "node labels should appear");
    Ok(())
}

#[cfg(feature = "raster")]
#[test]
fn engine_frames_render_to_png() -> Result<()> {
    let mut engine = TopologyEngine::new(
        fixture()?,
        EngineConfig::default(),
        PositionCache::in_memory(),
        Box::new(NullRenderer),
    );
    engine.show(ViewState::new(View::Site, false));

    let png = topoview::render::frame_to_png(&engine.scene(), "white", 1.0)?;
    const PNG_MAGIC: &[u8; 8] = b"\x89PNG\r\n\x1a\n";
    assert!(
        png.starts_with(PNG_MAGIC),
        "rendered png should start with PNG header"
    );
    Ok(())
}

#[test]
fn position_file_round_trip() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("positions.json");
    let saved = SavedPosition {
        x: 5.0,
        y: 6.0,
        x0: 5.0,
        y0: 6.0,
    };
    PositionCache::new(topoview::JsonFileStore::new(&path)).set_saved("dep-cart@west", saved);
    let reopened = PositionCache::new(topoview::JsonFileStore::new(&path));
    assert_eq!(reopened.get_saved("dep-cart@west"), Some(saved));
    Ok(())
}
