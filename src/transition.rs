use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::debug;
use tokio::sync::oneshot;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::barrier::Barrier;
use crate::color::Rgb;
use crate::interpolate::PathInterpolator;
use crate::path::Point;
use crate::render::Renderer;
use crate::scene::{Frame, LinkAttrs, NodeAttrs};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ElementRef {
    Node(String),
    Link(String),
}

#[derive(Debug, Clone)]
enum Channel {
    Position { from: Point, to: Point },
    Size { from: Point, to: Point },
    Fill { from: Rgb, to: Rgb },
    Stroke { from: Rgb, to: Rgb },
    StrokeWidth { from: f32, to: f32 },
    FillOpacity { from: f32, to: f32 },
    Opacity { from: f32, to: f32 },
    Path(PathInterpolator),
}

#[derive(Debug, Clone)]
struct Tween {
    element: ElementRef,
    channel: Channel,
}

fn lerp(from: f32, to: f32, t: f32) -> f32 {
    from + (to - from) * t
}

/// Cubic ease-in-out.
pub fn ease(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

impl Tween {
    fn apply(&self, stage: &mut Stage, t: f32) {
        match &self.element {
            ElementRef::Node(key) => {
                let Some(node) = stage.scene.nodes.get_mut(key) else {
                    return;
                };
                match &self.channel {
                    Channel::Position { from, to } => {
                        let p = from.lerp(*to, t);
                        node.x = p.x;
                        node.y = p.y;
                    }
                    Channel::Size { from, to } => {
                        let s = from.lerp(*to, t);
                        node.width = s.x;
                        node.height = s.y;
                    }
                    Channel::Fill { from, to } => node.fill = from.mix(*to, t),
                    Channel::Stroke { from, to } => node.stroke = from.mix(*to, t),
                    Channel::StrokeWidth { from, to } => node.stroke_width = lerp(*from, *to, t),
                    Channel::Opacity { from, to } => node.opacity = lerp(*from, *to, t),
                    Channel::FillOpacity { .. } | Channel::Path(_) => {}
                }
                stage.renderer.update_node(node);
            }
            ElementRef::Link(uid) => {
                let Some(link) = stage.scene.links.get_mut(uid) else {
                    return;
                };
                match &self.channel {
                    Channel::Path(interp) => link.path = interp.at(t),
                    Channel::Fill { from, to } => link.fill = Some(from.mix(*to, t)),
                    Channel::Stroke { from, to } => link.stroke = from.mix(*to, t),
                    Channel::StrokeWidth { from, to } => link.stroke_width = lerp(*from, *to, t),
                    Channel::FillOpacity { from, to } => link.fill_opacity = lerp(*from, *to, t),
                    Channel::Opacity { from, to } => link.opacity = lerp(*from, *to, t),
                    Channel::Position { .. } | Channel::Size { .. } => {}
                }
                stage.renderer.update_link(link);
            }
        }
    }
}

fn plan_node(key: &str, from: &NodeAttrs, to: &NodeAttrs, tweens: &mut Vec<Tween>) {
    let mut push = |channel| {
        tweens.push(Tween {
            element: ElementRef::Node(key.to_string()),
            channel,
        })
    };
    if (from.x, from.y) != (to.x, to.y) {
        push(Channel::Position {
            from: Point::new(from.x, from.y),
            to: Point::new(to.x, to.y),
        });
    }
    if (from.width, from.height) != (to.width, to.height) {
        push(Channel::Size {
            from: Point::new(from.width, from.height),
            to: Point::new(to.width, to.height),
        });
    }
    if from.fill != to.fill {
        push(Channel::Fill {
            from: from.fill,
            to: to.fill,
        });
    }
    if from.stroke != to.stroke {
        push(Channel::Stroke {
            from: from.stroke,
            to: to.stroke,
        });
    }
    if from.stroke_width != to.stroke_width {
        push(Channel::StrokeWidth {
            from: from.stroke_width,
            to: to.stroke_width,
        });
    }
    if from.opacity != to.opacity {
        push(Channel::Opacity {
            from: from.opacity,
            to: to.opacity,
        });
    }
}

fn plan_link(uid: &str, from: &LinkAttrs, to: &LinkAttrs, tweens: &mut Vec<Tween>) {
    let mut push = |channel| {
        tweens.push(Tween {
            element: ElementRef::Link(uid.to_string()),
            channel,
        })
    };
    if from.path != to.path {
        push(Channel::Path(PathInterpolator::new(&from.path, &to.path)));
    }
    // a missing fill blends from or into the other side's colour
    let from_fill = from.fill.or(to.fill);
    let to_fill = to.fill.or(from.fill);
    if let (Some(a), Some(b)) = (from_fill, to_fill) {
        if a != b {
            push(Channel::Fill { from: a, to: b });
        }
    }
    if from.stroke != to.stroke {
        push(Channel::Stroke {
            from: from.stroke,
            to: to.stroke,
        });
    }
    if from.stroke_width != to.stroke_width {
        push(Channel::StrokeWidth {
            from: from.stroke_width,
            to: to.stroke_width,
        });
    }
    if from.fill_opacity != to.fill_opacity {
        push(Channel::FillOpacity {
            from: from.fill_opacity,
            to: to.fill_opacity,
        });
    }
    if from.opacity != to.opacity {
        push(Channel::Opacity {
            from: from.opacity,
            to: to.opacity,
        });
    }
}

struct Stage {
    scene: Frame,
    renderer: Box<dyn Renderer>,
}

impl Stage {
    /// Replaces the scene outright, telling the renderer what changed.
    fn commit(&mut self, target: &Frame) {
        let gone_nodes: Vec<String> = self
            .scene
            .nodes
            .keys()
            .filter(|key| !target.nodes.contains_key(*key))
            .cloned()
            .collect();
        for key in gone_nodes {
            self.renderer.remove_node(&key);
        }
        let gone_links: Vec<String> = self
            .scene
            .links
            .keys()
            .filter(|uid| !target.links.contains_key(*uid))
            .cloned()
            .collect();
        for uid in gone_links {
            self.renderer.remove_link(&uid);
        }

        self.renderer.resize(target.width, target.height);
        for attrs in target.nodes.values() {
            if self.scene.nodes.get(&attrs.key) != Some(attrs) {
                self.renderer.update_node(attrs);
            }
        }
        for attrs in target.links.values() {
            if self.scene.links.get(&attrs.uid) != Some(attrs) {
                self.renderer.update_link(attrs);
            }
        }
        self.scene = target.clone();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Every tween ran and the target frame was committed.
    Completed { generation: u64, animations: usize },
    /// A newer transition or commit took over; this one changed nothing
    /// after that point.
    Superseded { generation: u64 },
}

pub struct TransitionHandle {
    generation: u64,
    animations: usize,
    done: oneshot::Receiver<TransitionOutcome>,
}

impl TransitionHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of tweens started by the transition.
    pub fn animations(&self) -> usize {
        self.animations
    }

    pub async fn wait(self) -> TransitionOutcome {
        let generation = self.generation;
        self.done
            .await
            .unwrap_or(TransitionOutcome::Superseded { generation })
    }
}

#[derive(Clone)]
pub struct TransitionOrchestrator {
    stage: Arc<Mutex<Stage>>,
    generation: Arc<AtomicU64>,
    duration: Duration,
    frame: Duration,
}

impl TransitionOrchestrator {
    pub fn new(renderer: Box<dyn Renderer>, duration: Duration, frame: Duration) -> Self {
        Self {
            stage: Arc::new(Mutex::new(Stage {
                scene: Frame::default(),
                renderer,
            })),
            generation: Arc::new(AtomicU64::new(0)),
            duration,
            frame: frame.max(Duration::from_millis(1)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Stage> {
        self.stage.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Snapshot of what is currently displayed.
    pub fn scene(&self) -> Frame {
        self.lock().scene.clone()
    }

    /// Shows `target` immediately and cancels any running transition.
    pub fn commit(&self, target: &Frame) {
        let mut stage = self.lock();
        self.generation.fetch_add(1, Ordering::AcqRel);
        stage.commit(target);
    }

    /// Animates from the displayed scene to `target`. Must be called from
    /// inside a tokio runtime.
    ///
    /// Elements only in `target` fade in, elements only in the scene fade
    /// out and are removed once the transition completes. The returned
    /// handle resolves exactly once, after every tween has finished.
    pub fn transition(&self, target: Frame) -> TransitionHandle {
        let mut stage = self.lock();
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

        let mut tweens = Vec::new();
        let mut working = stage.scene.clone();
        working.width = working.width.max(target.width);
        working.height = working.height.max(target.height);

        let node_keys: BTreeSet<String> = working
            .nodes
            .keys()
            .chain(target.nodes.keys())
            .cloned()
            .collect();
        for key in &node_keys {
            match (working.nodes.get(key).cloned(), target.nodes.get(key)) {
                (Some(from), Some(to)) => {
                    plan_node(key, &from, to, &mut tweens);
                    if let Some(node) = working.nodes.get_mut(key) {
                        node.label = to.label.clone();
                        node.selected = to.selected;
                        node.role = to.role;
                    }
                }
                (None, Some(to)) => {
                    let entering = NodeAttrs {
                        opacity: 0.0,
                        ..to.clone()
                    };
                    plan_node(key, &entering, to, &mut tweens);
                    working.nodes.insert(key.clone(), entering);
                }
                (Some(from), None) => {
                    let leaving = NodeAttrs {
                        opacity: 0.0,
                        ..from.clone()
                    };
                    plan_node(key, &from, &leaving, &mut tweens);
                }
                (None, None) => {}
            }
        }

        let link_uids: BTreeSet<String> = working
            .links
            .keys()
            .chain(target.links.keys())
            .cloned()
            .collect();
        for uid in &link_uids {
            match (working.links.get(uid).cloned(), target.links.get(uid)) {
                (Some(from), Some(to)) => {
                    plan_link(uid, &from, to, &mut tweens);
                    if let Some(link) = working.links.get_mut(uid) {
                        link.label = to.label.clone();
                    }
                }
                (None, Some(to)) => {
                    let entering = LinkAttrs {
                        opacity: 0.0,
                        ..to.clone()
                    };
                    plan_link(uid, &entering, to, &mut tweens);
                    working.links.insert(uid.clone(), entering);
                }
                (Some(from), None) => {
                    let leaving = LinkAttrs {
                        opacity: 0.0,
                        ..from.clone()
                    };
                    plan_link(uid, &from, &leaving, &mut tweens);
                }
                (None, None) => {}
            }
        }

        stage.commit(&working);
        drop(stage);

        let animations = tweens.len();
        debug!(
            "transition #{generation}: {animations} tweens over {} elements in {:?}",
            target.element_count(),
            self.duration
        );

        let (barrier, all_done) = Barrier::new(animations);
        for tween in tweens {
            tokio::spawn(run_tween(
                self.clone(),
                generation,
                tween,
                barrier.clone(),
            ));
        }

        let (done_tx, done_rx) = oneshot::channel();
        let orchestrator = self.clone();
        tokio::spawn(async move {
            all_done.await;
            let outcome = {
                let mut stage = orchestrator.lock();
                if orchestrator.generation.load(Ordering::Acquire) == generation {
                    stage.commit(&target);
                    TransitionOutcome::Completed {
                        generation,
                        animations,
                    }
                } else {
                    TransitionOutcome::Superseded { generation }
                }
            };
            debug!("transition #{generation} finished: {outcome:?}");
            let _ = done_tx.send(outcome);
        });

        TransitionHandle {
            generation,
            animations,
            done: done_rx,
        }
    }
}

async fn run_tween(orchestrator: TransitionOrchestrator, generation: u64, tween: Tween, barrier: Barrier) {
    let start = Instant::now();
    let mut ticker = time::interval(orchestrator.frame);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let progress = if orchestrator.duration.is_zero() {
            1.0
        } else {
            (start.elapsed().as_secs_f32() / orchestrator.duration.as_secs_f32()).min(1.0)
        };
        {
            let mut stage = orchestrator.lock();
            if orchestrator.generation.load(Ordering::Acquire) != generation {
                break;
            }
            tween.apply(&mut stage, ease(progress));
        }
        if progress >= 1.0 {
            break;
        }
    }
    barrier.arrive();
}
