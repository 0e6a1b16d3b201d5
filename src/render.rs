use std::fmt::Write as FmtWrite;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use log::trace;

use crate::path::{Point, Segment};
use crate::scene::{Frame, LinkAttrs, NodeAttrs, NodeRole};

/// Receives final attribute values as the engine commits them. Elements
/// are created on first update and dropped on removal.
pub trait Renderer: Send {
    fn update_node(&mut self, attrs: &NodeAttrs);
    fn update_link(&mut self, attrs: &LinkAttrs);
    fn remove_node(&mut self, key: &str);
    fn remove_link(&mut self, uid: &str);

    fn resize(&mut self, _width: f32, _height: f32) {}
}

#[derive(Debug, Default)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn update_node(&mut self, _attrs: &NodeAttrs) {}
    fn update_link(&mut self, _attrs: &LinkAttrs) {}
    fn remove_node(&mut self, _key: &str) {}
    fn remove_link(&mut self, _uid: &str) {}
}

/// Traces every update; handy with `RUST_LOG=topoview=trace`.
#[derive(Debug, Default)]
pub struct LogRenderer;

impl Renderer for LogRenderer {
    fn update_node(&mut self, attrs: &NodeAttrs) {
        trace!(
            "node {} at ({:.1}, {:.1}) {:.1}x{:.1} opacity {:.2}",
            attrs.key, attrs.x, attrs.y, attrs.width, attrs.height, attrs.opacity
        );
    }

    fn update_link(&mut self, attrs: &LinkAttrs) {
        trace!("link {} opacity {:.2} d={}", attrs.uid, attrs.opacity, attrs.path);
    }

    fn remove_node(&mut self, key: &str) {
        trace!("node {key} removed");
    }

    fn remove_link(&mut self, uid: &str) {
        trace!("link {uid} removed");
    }
}

/// Keeps the latest attributes of every element and draws them on demand.
/// Clones share the same element set, so one clone can be handed to the
/// engine while another reads the result back.
#[derive(Debug, Default, Clone)]
pub struct SvgRenderer {
    frame: Arc<Mutex<Frame>>,
}

impl SvgRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn frame_mut(&self) -> MutexGuard<'_, Frame> {
        self.frame.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn frame(&self) -> Frame {
        self.frame_mut().clone()
    }

    pub fn to_svg(&self, background: &str) -> Result<String> {
        frame_to_svg(&self.frame_mut(), background)
    }
}

impl Renderer for SvgRenderer {
    fn update_node(&mut self, attrs: &NodeAttrs) {
        self.frame_mut().nodes.insert(attrs.key.clone(), attrs.clone());
    }

    fn update_link(&mut self, attrs: &LinkAttrs) {
        self.frame_mut().links.insert(attrs.uid.clone(), attrs.clone());
    }

    fn remove_node(&mut self, key: &str) {
        self.frame_mut().nodes.remove(key);
    }

    fn remove_link(&mut self, uid: &str) {
        self.frame_mut().links.remove(uid);
    }

    fn resize(&mut self, width: f32, height: f32) {
        let mut frame = self.frame_mut();
        frame.width = width;
        frame.height = height;
    }
}

pub fn escape_xml(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn label_anchor(attrs: &LinkAttrs) -> Option<Point> {
    let mut start = None;
    for segment in &attrs.path.segments {
        match segment {
            Segment::Move(p) => start = Some(*p),
            Segment::Line(end) | Segment::Cubic(_, _, end) => {
                return start.map(|s| s.lerp(*end, 0.5));
            }
            Segment::Close => {}
        }
    }
    None
}

pub fn frame_to_svg(frame: &Frame, background: &str) -> Result<String> {
    let width = frame.width.max(1.0);
    let height = frame.height.max(1.0);

    let mut svg = String::new();
    write!(
        svg,
        r##"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{:.0}" height="{:.0}" viewBox="0 0 {:.0} {:.0}" font-family="Inter, system-ui, sans-serif">
  <rect width="100%" height="100%" fill="{}" />
"##,
        width,
        height,
        width,
        height,
        escape_xml(background)
    )?;

    for cluster in frame.nodes.values().filter(|n| n.role == NodeRole::Cluster) {
        write!(
            svg,
            "  <g class=\"cluster\" id=\"{}\" opacity=\"{:.2}\">\n    <rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" rx=\"8\" ry=\"8\" fill=\"{}\" stroke=\"{}\" stroke-width=\"{:.1}\" />\n    <text x=\"{:.1}\" y=\"{:.1}\" fill=\"#4a5568\" font-size=\"13\">{}</text>\n  </g>\n",
            escape_xml(&cluster.key),
            cluster.opacity,
            cluster.x,
            cluster.y,
            cluster.width,
            cluster.height,
            cluster.fill,
            cluster.stroke,
            cluster.stroke_width,
            cluster.x + 8.0,
            cluster.y + 16.0,
            escape_xml(&cluster.label)
        )?;
    }

    for link in frame.links.values() {
        let fill = link
            .fill
            .map(|c| c.to_string())
            .unwrap_or_else(|| "none".to_string());
        write!(
            svg,
            "  <path class=\"link\" id=\"{}\" d=\"{}\" fill=\"{}\" fill-opacity=\"{:.2}\" stroke=\"{}\" stroke-width=\"{:.1}\" opacity=\"{:.2}\" />\n",
            escape_xml(&link.uid),
            link.path,
            fill,
            link.fill_opacity,
            link.stroke,
            link.stroke_width,
            link.opacity
        )?;
        if let (Some(label), Some(anchor)) = (&link.label, label_anchor(link)) {
            write!(
                svg,
                "  <text x=\"{:.1}\" y=\"{:.1}\" fill=\"#2d3748\" font-size=\"11\" text-anchor=\"middle\" opacity=\"{:.2}\">{}</text>\n",
                anchor.x,
                anchor.y - 4.0,
                link.opacity,
                escape_xml(label)
            )?;
        }
    }

    for node in frame.nodes.values().filter(|n| n.role != NodeRole::Cluster) {
        write!(
            svg,
            "  <g class=\"node\" id=\"{}\" opacity=\"{:.2}\">\n    <rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" rx=\"6\" ry=\"6\" fill=\"{}\" stroke=\"{}\" stroke-width=\"{:.1}\" />\n    <text x=\"{:.1}\" y=\"{:.1}\" fill=\"#1a202c\" font-size=\"14\" text-anchor=\"middle\" dominant-baseline=\"middle\">{}</text>\n  </g>\n",
            escape_xml(&node.key),
            node.opacity,
            node.x,
            node.y,
            node.width,
            node.height,
            node.fill,
            node.stroke,
            node.stroke_width,
            node.x + node.width / 2.0,
            node.y + node.height / 2.0,
            escape_xml(&node.label)
        )?;
    }

    svg.push_str("</svg>\n");
    Ok(svg)
}

#[cfg(feature = "raster")]
pub fn frame_to_png(frame: &Frame, background: &str, scale: f32) -> Result<Vec<u8>> {
    use anyhow::{anyhow, bail};
    use tiny_skia::{Pixmap, Transform};

    if scale <= 0.0 {
        bail!("scale must be greater than zero when rendering PNG output");
    }

    let svg = frame_to_svg(frame, background)?;

    let mut options = resvg::usvg::Options::default();
    options.font_family = "Inter".to_string();
    options.fontdb_mut().load_system_fonts();

    let tree = resvg::usvg::Tree::from_str(&svg, &options)
        .map_err(|err| anyhow!("failed to parse generated SVG for PNG export: {err}"))?;

    let size = tree.size().to_int_size();
    let scaled_width = (size.width() as f32 * scale).ceil();
    let scaled_height = (size.height() as f32 * scale).ceil();

    if !scaled_width.is_finite() || !scaled_height.is_finite() {
        bail!("scaled dimensions are not finite; try a smaller scale factor");
    }
    if scaled_width < 1.0 || scaled_height < 1.0 {
        bail!("scaled dimensions collapsed below 1px; try a larger scale factor");
    }
    if scaled_width > u32::MAX as f32 || scaled_height > u32::MAX as f32 {
        bail!("scaled dimensions exceed supported limits; try a smaller scale factor");
    }

    let (scaled_width, scaled_height) = (scaled_width as u32, scaled_height as u32);
    let mut pixmap = Pixmap::new(scaled_width, scaled_height).ok_or_else(|| {
        anyhow!("failed to allocate {scaled_width}x{scaled_height} surface for PNG export")
    })?;

    resvg::render(&tree, Transform::from_scale(scale, scale), &mut pixmap.as_mut());

    pixmap
        .encode_png()
        .map_err(|err| anyhow!("failed to encode PNG output: {err}"))
}
