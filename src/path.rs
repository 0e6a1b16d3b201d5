use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::{Link, Links, Nodes};
use crate::{EDGE_BIDIRECTIONAL_OFFSET, SELF_LOOP_LIFT};

const MIN_CONTROL_OFFSET: f32 = 40.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn lerp(self, other: Point, t: f32) -> Point {
        Point {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    pub fn distance(self, other: Point) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Segment {
    Move(Point),
    Line(Point),
    Cubic(Point, Point, Point),
    Close,
}

/// An SVG-style path. `Display` renders the `d` attribute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathDescriptor {
    pub segments: Vec<Segment>,
}

impl PathDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn move_to(mut self, p: Point) -> Self {
        self.segments.push(Segment::Move(p));
        self
    }

    pub fn line_to(mut self, p: Point) -> Self {
        self.segments.push(Segment::Line(p));
        self
    }

    pub fn cubic_to(mut self, c1: Point, c2: Point, p: Point) -> Self {
        self.segments.push(Segment::Cubic(c1, c2, p));
        self
    }

    pub fn close(mut self) -> Self {
        self.segments.push(Segment::Close);
        self
    }

    pub fn subpath_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|segment| matches!(segment, Segment::Move(_)))
            .count()
    }
}

impl fmt::Display for PathDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            match segment {
                Segment::Move(p) => write!(f, "M{:.2},{:.2}", p.x, p.y)?,
                Segment::Line(p) => write!(f, "L{:.2},{:.2}", p.x, p.y)?,
                Segment::Cubic(c1, c2, p) => write!(
                    f,
                    "C{:.2},{:.2} {:.2},{:.2} {:.2},{:.2}",
                    c1.x, c1.y, c2.x, c2.y, p.x, p.y
                )?,
                Segment::Close => f.write_str("Z")?,
            }
        }
        Ok(())
    }
}

pub struct PathRequest<'a> {
    pub link: &'a Link,
    pub nodes: &'a Nodes,
    /// Anchor at the link's flow band instead of the node's vertical centre.
    pub use_sankey_y: bool,
    /// Draw a closed ribbon instead of a stroked line.
    pub sankey: bool,
    /// Ribbon thickness; defaults to the link's drawn width.
    pub width: Option<f32>,
}

/// Builds the path for one link between its resolved endpoint offsets:
/// leaving the source's right edge and entering the target's left edge.
/// Returns an empty descriptor when an endpoint no longer exists.
pub fn gen_path(request: &PathRequest<'_>) -> PathDescriptor {
    let link = request.link;
    let (Some(source), Some(target)) = (request.nodes.get(link.source), request.nodes.get(link.target))
    else {
        return PathDescriptor::new();
    };

    let expanded = Some(request.use_sankey_y);
    let sx = source.x0 + source.width(expanded);
    let tx = target.x0;
    let (sy, ty) = if request.use_sankey_y {
        (
            (link.band.sy0 + link.band.sy1) / 2.0,
            (link.band.ty0 + link.band.ty1) / 2.0,
        )
    } else {
        (
            source.y0 + source.height(expanded) / 2.0,
            target.y0 + target.height(expanded) / 2.0,
        )
    };

    let k = ((tx - sx).abs() / 2.0).max(MIN_CONTROL_OFFSET);
    let bend = link.bend;

    if !request.sankey {
        return PathDescriptor::new()
            .move_to(Point::new(sx, sy))
            .cubic_to(
                Point::new(sx + k, sy + bend),
                Point::new(tx - k, ty + bend),
                Point::new(tx, ty),
            );
    }

    let half = request.width.unwrap_or_else(|| link.width()) / 2.0;
    PathDescriptor::new()
        .move_to(Point::new(sx, sy - half))
        .cubic_to(
            Point::new(sx + k, sy - half + bend),
            Point::new(tx - k, ty - half + bend),
            Point::new(tx, ty - half),
        )
        .line_to(Point::new(tx, ty + half))
        .cubic_to(
            Point::new(tx - k, ty + half + bend),
            Point::new(sx + k, sy + half + bend),
            Point::new(sx, sy + half),
        )
        .close()
}

/// Assigns control-point lifts so self loops arc over their node and links
/// sharing an endpoint pair curve to opposite sides.
pub fn circularize(links: &mut Links) {
    for link in &mut links.links {
        link.bend = 0.0;
    }

    let count = links.len();
    for idx in 0..count {
        if links.links[idx].is_self_loop() {
            links.links[idx].bend = -SELF_LOOP_LIFT;
            continue;
        }
        let (source, target) = (links.links[idx].source, links.links[idx].target);
        let partner = (idx + 1..count).find(|&other| {
            let other = &links.links[other];
            !other.is_self_loop()
                && ((other.source == target && other.target == source)
                    || (other.source == source && other.target == target))
        });
        if let Some(partner) = partner {
            if links.links[idx].bend == 0.0 && links.links[partner].bend == 0.0 {
                links.links[idx].bend = -EDGE_BIDIRECTIONAL_OFFSET;
                links.links[partner].bend = EDGE_BIDIRECTIONAL_OFFSET;
            }
        }
    }
}
