use anyhow::{Context, Result, anyhow, bail};
use clap::{ArgAction, Parser, ValueEnum};
use log::{info, warn};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use topoview::render::SvgRenderer;
use topoview::{
    EngineConfig, LogRenderer, PositionCache, TopologyData, TopologyEngine,
    TransitionOutcome, View, ViewState,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum InputSource {
    Stdin,
    File(PathBuf),
}

#[derive(Debug, Clone)]
enum OutputDestination {
    Stdout,
    File(PathBuf),
}

#[derive(Debug, Parser)]
#[command(
    name = "topoview",
    about = "Lay out a service topology and render one of its views."
)]
pub struct RenderArgs {
    /// Path to the topology JSON file. Use '-' to read from stdin.
    #[arg(short = 'i', long = "input")]
    input: Option<String>,

    /// Path to the output file. Use '-' to write to stdout.
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Output format (defaults to the output file extension or svg).
    #[arg(short = 'e', long = "output-format")]
    output_format: Option<OutputFormat>,

    /// Convenience flag for `--output-format png`.
    #[arg(long = "png", action = ArgAction::SetTrue, conflicts_with = "output_format")]
    png: bool,

    /// Scale factor for PNG output.
    #[arg(long = "scale", default_value_t = 2.0)]
    scale: f32,

    /// View to render.
    #[arg(long = "view", value_enum, default_value_t = View::Service)]
    view: View,

    /// Render the flow-weighted variant of the view.
    #[arg(long = "flow", action = ArgAction::SetTrue)]
    flow: bool,

    /// Start from this view and animate to the requested one.
    #[arg(long = "from", value_enum)]
    from: Option<View>,

    /// Whether the starting view is flow-weighted.
    #[arg(long = "from-flow", action = ArgAction::SetTrue, requires = "from")]
    from_flow: bool,

    /// Transition duration in milliseconds (overrides the config file).
    #[arg(long = "duration")]
    duration: Option<u64>,

    /// Position cache file (defaults to the platform data directory).
    #[arg(long = "cache")]
    cache: Option<PathBuf>,

    /// Engine config file (JSON).
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Background colour for the canvas.
    #[arg(short = 'b', long = "background-color")]
    background_color: Option<String>,

    /// Suppress informational output.
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,
}

#[derive(Debug, Parser)]
#[command(
    name = "topoview move",
    about = "Pin a node of a view to a position, as if dragged there."
)]
pub struct MoveArgs {
    /// Path to the topology JSON file.
    #[arg(short = 'i', long = "input")]
    input: String,

    /// View the node belongs to.
    #[arg(long = "view", value_enum, default_value_t = View::Service)]
    view: View,

    /// Node key (`name`, or `name@site` for a second deployment).
    #[arg(long = "node")]
    node: String,

    #[arg(long = "x", allow_hyphen_values = true)]
    x: f32,

    #[arg(long = "y", allow_hyphen_values = true)]
    y: f32,

    /// Position cache file (defaults to the platform data directory).
    #[arg(long = "cache")]
    cache: Option<PathBuf>,

    /// Engine config file (JSON).
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Suppress informational output.
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Svg,
    Png,
}

impl OutputFormat {
    fn from_path(path: &Path) -> Option<Self> {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
        {
            Some(ext) if ext == "svg" => Some(OutputFormat::Svg),
            Some(ext) if ext == "png" => Some(OutputFormat::Png),
            _ => None,
        }
    }

    fn extension(self) -> &'static str {
        match self {
            OutputFormat::Svg => "svg",
            OutputFormat::Png => "png",
        }
    }
}

pub async fn dispatch() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(|s| s.as_str()) {
        Some("move") => {
            let move_args = MoveArgs::parse_from(
                std::iter::once(args[0].clone()).chain(args.iter().skip(2).cloned()),
            );
            run_move(move_args)
        }
        Some("render") => {
            let render_args = RenderArgs::parse_from(
                std::iter::once(args[0].clone()).chain(args.iter().skip(2).cloned()),
            );
            run_render(render_args).await
        }
        _ => {
            let render_args = RenderArgs::parse_from(args);
            run_render(render_args).await
        }
    }
}

async fn run_render(cli: RenderArgs) -> Result<()> {
    let input_source = parse_input(cli.input.as_deref())?;
    let format_preference = if cli.png {
        Some(OutputFormat::Png)
    } else {
        cli.output_format
    };

    let output_dest = parse_output(cli.output.as_deref(), &input_source, format_preference)?;
    let format = determine_format(format_preference, &output_dest)?;

    if format == OutputFormat::Png && cli.scale <= 0.0 {
        bail!("--scale must be greater than zero for PNG output");
    }

    let mut config = load_config(cli.config.as_deref(), cli.cache)?;
    if let Some(duration) = cli.duration {
        config.duration_ms = duration;
    }
    let background = cli
        .background_color
        .unwrap_or_else(|| config.background.clone());

    let data = load_topology(&input_source)?;
    let cache = open_cache(&config);
    let renderer = SvgRenderer::new();
    let mut engine = TopologyEngine::new(data, config, cache, Box::new(renderer.clone()));

    if let Some(from) = cli.from {
        engine.show(ViewState::new(from, cli.from_flow));
    }
    let target = ViewState::new(cli.view, cli.flow);
    let handle = engine.transition(target);
    match handle.wait().await {
        TransitionOutcome::Completed { animations, .. } => {
            info!("reached {target} after {animations} tweens");
        }
        TransitionOutcome::Superseded { generation } => {
            bail!("transition #{generation} to {target} was interrupted");
        }
    }

    let output_bytes = match format {
        OutputFormat::Svg => renderer.to_svg(&background)?.into_bytes(),
        OutputFormat::Png => render_png(&renderer, &background, cli.scale)?,
    };

    write_output(output_dest, &output_bytes, cli.quiet)?;

    Ok(())
}

#[cfg(feature = "raster")]
fn render_png(renderer: &SvgRenderer, background: &str, scale: f32) -> Result<Vec<u8>> {
    topoview::render::frame_to_png(&renderer.frame(), background, scale)
}

#[cfg(not(feature = "raster"))]
fn render_png(_renderer: &SvgRenderer, _background: &str, _scale: f32) -> Result<Vec<u8>> {
    bail!("PNG output requires the 'raster' feature to be enabled")
}

fn run_move(cli: MoveArgs) -> Result<()> {
    let config = load_config(cli.config.as_deref(), cli.cache)?;
    let store = config
        .cache_store()
        .ok_or_else(|| anyhow!("no position cache location available; pass --cache"))?;
    let cache_path = store.path().to_path_buf();

    let data = load_topology(&InputSource::File(PathBuf::from(&cli.input)))?;
    let mut engine = TopologyEngine::new(
        data,
        config,
        PositionCache::new(store),
        Box::new(LogRenderer),
    );
    engine.show(ViewState::new(cli.view, false));

    if !engine.drag_start(&cli.node) {
        bail!(
            "node '{}' is not part of the {} view",
            cli.node,
            cli.view.as_str()
        );
    }
    engine.drag(&cli.node, cli.x, cli.y);

    if !cli.quiet {
        println!(
            "Pinned {} '{}' at ({}, {}) -> {}",
            cli.view.as_str(),
            cli.node,
            cli.x,
            cli.y,
            cache_path.display()
        );
    }
    Ok(())
}

fn load_config(path: Option<&Path>, cache: Option<PathBuf>) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if cache.is_some() {
        config.cache_file = cache;
    }
    Ok(config)
}

fn open_cache(config: &EngineConfig) -> PositionCache {
    match config.cache_store() {
        Some(store) => PositionCache::new(store),
        None => {
            warn!("no data directory available; saved positions are disabled");
            PositionCache::in_memory()
        }
    }
}

fn parse_input(input: Option<&str>) -> Result<InputSource> {
    match input {
        Some("-") => Ok(InputSource::Stdin),
        Some(path_str) => {
            let path = PathBuf::from(path_str);
            if !path.exists() {
                return Err(anyhow!("input file '{path_str}' does not exist"));
            }
            Ok(InputSource::File(path))
        }
        None => Ok(InputSource::Stdin),
    }
}

fn parse_output(
    output: Option<&str>,
    input: &InputSource,
    format_hint: Option<OutputFormat>,
) -> Result<OutputDestination> {
    match output {
        Some("-") => Ok(OutputDestination::Stdout),
        Some(path_str) => {
            let path = PathBuf::from(path_str);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(anyhow!(
                        "output directory '{}' does not exist",
                        parent.display()
                    ));
                }
            }
            Ok(OutputDestination::File(path))
        }
        None => {
            let ext = format_hint.unwrap_or(OutputFormat::Svg).extension();
            match input {
                InputSource::File(path) => {
                    let stem = path
                        .file_stem()
                        .and_then(|name| name.to_str())
                        .unwrap_or("topology");
                    Ok(OutputDestination::File(path.with_file_name(format!("{stem}.{ext}"))))
                }
                InputSource::Stdin => Ok(OutputDestination::File(PathBuf::from(format!("out.{ext}")))),
            }
        }
    }
}

fn determine_format(
    preference: Option<OutputFormat>,
    output: &OutputDestination,
) -> Result<OutputFormat> {
    if let Some(fmt) = preference {
        return Ok(fmt);
    }

    match output {
        OutputDestination::Stdout => Ok(OutputFormat::Svg),
        OutputDestination::File(path) => OutputFormat::from_path(path).ok_or_else(|| {
            anyhow!(
                "unable to determine output format from '{}'; please specify --output-format",
                path.display()
            )
        }),
    }
}

fn load_topology(source: &InputSource) -> Result<TopologyData> {
    match source {
        InputSource::Stdin => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            if buffer.trim().is_empty() {
                bail!("no topology supplied on stdin");
            }
            TopologyData::parse(&buffer).context("failed to parse topology from stdin")
        }
        InputSource::File(path) => {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("failed to read '{}'", path.display()))?;
            if contents.trim().is_empty() {
                bail!("input file '{}' was empty", path.display());
            }
            TopologyData::parse(&contents)
                .with_context(|| format!("failed to parse topology '{}'", path.display()))
        }
    }
}

fn write_output(dest: OutputDestination, bytes: &[u8], quiet: bool) -> Result<()> {
    match dest {
        OutputDestination::Stdout => {
            let mut stdout = io::stdout();
            stdout.write_all(bytes)?;
            stdout.flush()?;
        }
        OutputDestination::File(path) => {
            fs::write(&path, bytes)
                .with_context(|| format!("failed to write '{}'", path.display()))?;
            if !quiet {
                println!("Rendered topology -> {}", path.display());
            }
        }
    }
    Ok(())
}
