use log::debug;

use crate::error::PathError;
use crate::path::{PathDescriptor, Point, Segment};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Cubic {
    c1: Point,
    c2: Point,
    end: Point,
}

#[derive(Debug, Clone, PartialEq)]
struct Subpath {
    start: Point,
    curves: Vec<Cubic>,
    closed: bool,
}

impl Subpath {
    fn point_before(&self, idx: usize) -> Point {
        if idx == 0 {
            self.start
        } else {
            self.curves[idx - 1].end
        }
    }

    /// Control-polygon length, an upper bound on the arc length.
    fn curve_length(&self, idx: usize) -> f32 {
        let start = self.point_before(idx);
        let curve = self.curves[idx];
        start.distance(curve.c1) + curve.c1.distance(curve.c2) + curve.c2.distance(curve.end)
    }

    fn split_longest(&mut self) {
        let longest = (0..self.curves.len())
            .max_by(|a, b| self.curve_length(*a).total_cmp(&self.curve_length(*b)))
            .unwrap_or(0);
        let start = self.point_before(longest);
        let (left, right) = split_half(start, self.curves[longest]);
        self.curves[longest] = left;
        self.curves.insert(longest + 1, right);
    }
}

/// De Casteljau at t = 0.5.
fn split_half(p0: Point, curve: Cubic) -> (Cubic, Cubic) {
    let p01 = p0.lerp(curve.c1, 0.5);
    let p12 = curve.c1.lerp(curve.c2, 0.5);
    let p23 = curve.c2.lerp(curve.end, 0.5);
    let p012 = p01.lerp(p12, 0.5);
    let p123 = p12.lerp(p23, 0.5);
    let mid = p012.lerp(p123, 0.5);
    (
        Cubic {
            c1: p01,
            c2: p012,
            end: mid,
        },
        Cubic {
            c1: p123,
            c2: p23,
            end: curve.end,
        },
    )
}

fn straight(from: Point, to: Point) -> Cubic {
    Cubic {
        c1: from.lerp(to, 1.0 / 3.0),
        c2: from.lerp(to, 2.0 / 3.0),
        end: to,
    }
}

fn normalize(path: &PathDescriptor) -> Result<Vec<Subpath>, PathError> {
    if path.is_empty() {
        return Err(PathError::Empty);
    }

    let mut subpaths: Vec<Subpath> = Vec::new();
    for segment in &path.segments {
        if let Segment::Move(p) = segment {
            subpaths.push(Subpath {
                start: *p,
                curves: Vec::new(),
                closed: false,
            });
            continue;
        }
        let current = subpaths.last_mut().ok_or(PathError::MissingMove)?;
        let cursor = current.point_before(current.curves.len());
        match *segment {
            Segment::Line(p) => current.curves.push(straight(cursor, p)),
            Segment::Cubic(c1, c2, end) => current.curves.push(Cubic { c1, c2, end }),
            Segment::Close => {
                if cursor != current.start {
                    current.curves.push(straight(cursor, current.start));
                }
                current.closed = true;
            }
            Segment::Move(_) => {}
        }
    }

    for subpath in &mut subpaths {
        if subpath.curves.is_empty() {
            subpath.curves.push(straight(subpath.start, subpath.start));
        }
    }
    Ok(subpaths)
}

#[derive(Debug, Clone)]
enum Mode {
    Morph {
        from: Vec<Subpath>,
        to: Vec<Subpath>,
    },
    Cut,
}

#[derive(Debug, Clone)]
pub struct PathInterpolator {
    from: PathDescriptor,
    to: PathDescriptor,
    mode: Mode,
}

impl PathInterpolator {
    /// Pairs up the two shapes, or reports why they cannot be blended.
    pub fn try_new(from: &PathDescriptor, to: &PathDescriptor) -> Result<Self, PathError> {
        let mut start = normalize(from)?;
        let mut end = normalize(to)?;
        if start.len() != end.len() {
            return Err(PathError::SubpathMismatch {
                from: start.len(),
                to: end.len(),
            });
        }

        for (a, b) in start.iter_mut().zip(end.iter_mut()) {
            while a.curves.len() < b.curves.len() {
                a.split_longest();
            }
            while b.curves.len() < a.curves.len() {
                b.split_longest();
            }
        }

        Ok(Self {
            from: from.clone(),
            to: to.clone(),
            mode: Mode::Morph {
                from: start,
                to: end,
            },
        })
    }

    /// Like [`try_new`](Self::try_new), but irreconcilable shapes jump
    /// straight to the end shape.
    pub fn new(from: &PathDescriptor, to: &PathDescriptor) -> Self {
        Self::try_new(from, to).unwrap_or_else(|err| {
            debug!("path interpolation falls back to a cut: {err}");
            Self {
                from: from.clone(),
                to: to.clone(),
                mode: Mode::Cut,
            }
        })
    }

    pub fn is_cut(&self) -> bool {
        matches!(self.mode, Mode::Cut)
    }

    /// The shape at `t`. `at(0)` is exactly the start shape and `at(1)`
    /// exactly the end shape.
    pub fn at(&self, t: f32) -> PathDescriptor {
        if t <= 0.0 {
            return self.from.clone();
        }
        if t >= 1.0 {
            return self.to.clone();
        }
        let Mode::Morph { from, to } = &self.mode else {
            return self.to.clone();
        };

        let mut path = PathDescriptor::new();
        for (a, b) in from.iter().zip(to) {
            path = path.move_to(a.start.lerp(b.start, t));
            for (ca, cb) in a.curves.iter().zip(&b.curves) {
                path = path.cubic_to(ca.c1.lerp(cb.c1, t), ca.c2.lerp(cb.c2, t), ca.end.lerp(cb.end, t));
            }
            let closed = if t < 0.5 { a.closed } else { b.closed };
            if closed {
                path = path.close();
            }
        }
        path
    }
}
