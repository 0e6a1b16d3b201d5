pub mod barrier;
pub mod cache;
pub mod color;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod interpolate;
pub mod layout;
pub mod path;
pub mod policy;
pub mod render;
pub mod sankey;
pub mod scene;
pub mod topology;
pub mod transition;
pub mod views;

pub use cache::{JsonFileStore, MemoryStore, PositionCache, PositionStore, SavedPosition};
pub use config::EngineConfig;
pub use engine::TopologyEngine;
pub use error::{PathError, StoreError, TopologyError};
pub use graph::{Link, LinkKind, LinkSlot, LinkStat, Links, Node, NodeKind, Nodes};
pub use layout::CanvasSize;
pub use path::{PathDescriptor, Point};
pub use policy::ViewState;
pub use render::{LogRenderer, NullRenderer, Renderer, SvgRenderer};
pub use scene::Frame;
pub use topology::TopologyData;
pub use transition::{ElementRef, TransitionHandle, TransitionOrchestrator, TransitionOutcome};
pub use views::{View, ViewGraph};

/// Thinnest a link is ever drawn.
pub const MIN_LINK_WIDTH: f32 = 6.0;
/// Labels longer than this are shortened.
pub const SHORT_NAME_MAX: usize = 20;
pub const CLUSTER_PADDING: f32 = 20.0;
pub const CLUSTER_LABEL_HEIGHT: f32 = 20.0;
pub const VIEW_DURATION_MS: u64 = 1000;
pub const FRAME_MS: u64 = 16;
pub const BLUR_OPACITY: f32 = 0.25;
pub const FLOW_OPACITY: f32 = 0.5;
pub const EDGE_BIDIRECTIONAL_OFFSET: f32 = 24.0;
pub const SELF_LOOP_LIFT: f32 = 60.0;
