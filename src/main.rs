use anyhow::{bail, Context};
use clap::Parser;
use rfcapture::{BackgroundOption, CaptureConfig, Capturer, Document, Window};
use std::path::PathBuf;

/// Capture an element of an HTML file into a PNG
#[derive(Parser, Debug)]
#[command(name = "rfcapture", version, about)]
struct Args {
    /// HTML file to load
    input: PathBuf,

    /// Element to capture (defaults to the document element)
    #[arg(short, long)]
    selector: Option<String>,

    /// Output PNG path
    #[arg(short, long, default_value = "capture.png")]
    out: PathBuf,

    #[arg(long, default_value_t = 1280)]
    width: u32,

    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Device scale factor
    #[arg(long)]
    scale: Option<f32>,

    /// Background color, e.g. "#ffffff" or "rgb(0, 0, 0)"
    #[arg(long, conflicts_with = "transparent")]
    background: Option<String>,

    /// Leave the background transparent
    #[arg(long)]
    transparent: bool,

    /// Use the SVG foreignObject backend
    #[arg(long)]
    foreign_object: bool,

    /// JSON capture options, applied before the flags above
    #[arg(long)]
    config: Option<PathBuf>,

    /// Base URL the document was loaded from (resolves relative image sources)
    #[arg(long)]
    url: Option<String>,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let default_level = if args.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let html = std::fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;

    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            CaptureConfig::from_json(&json)?
        }
        None => CaptureConfig::default(),
    };
    if args.scale.is_some() {
        config.scale = args.scale;
    }
    if let Some(bg) = args.background {
        config.background_color = BackgroundOption::Color(bg);
    } else if args.transparent {
        config.background_color = BackgroundOption::Transparent;
    }
    config.foreign_object_rendering |= args.foreign_object;
    config.logging &= !args.quiet;

    let mut document = Document::parse_html(&html).with_window(Window {
        width: args.width,
        height: args.height,
        ..Default::default()
    });
    if let Some(url) = args.url {
        document = document.with_url(url);
    }

    let target = match &args.selector {
        Some(selector) => match document.try_query_selector(selector)? {
            Some(id) => id,
            None => bail!("no element matches \"{}\"", selector),
        },
        None => document.document_element().context("document has no root element")?,
    };
    let element = document.element(target).context("selected node is not an element")?;

    let surface = Capturer::new().render(element, config).await?;
    std::fs::write(&args.out, surface.to_png()?).with_context(|| format!("writing {}", args.out.display()))?;
    log::info!("wrote {}x{} capture to {}", surface.width, surface.height, args.out.display());
    Ok(())
}
