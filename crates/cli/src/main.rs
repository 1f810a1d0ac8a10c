mod echo;

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use clap::Parser;
use clipmark_core::{
    BrowserHandle, ClipOptions, ClipPipeline, ClipResult, ExtractConfig, FetchConfig, ImageStore, PipelineConfig,
    RenderConfig, RenderPreference, StrategyConfig,
};
use owo_colors::OwoColorize;
use url::Url;

use crate::echo::{format_size, print_banner, print_clip_details, print_step, print_success, print_warning};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Output format for clipped content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Structured,
    Html,
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "structured" | "markdown" | "md" => Ok(Self::Structured),
            "html" => Ok(Self::Html),
            "text" | "txt" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!(
                "Invalid format: {}. Valid options: structured, html, text, json",
                s
            )),
        }
    }
}

/// Clip web articles into clean, readable content
#[derive(Parser, Debug)]
#[command(name = "clipmark")]
#[command(author = "Clipmark Contributors")]
#[command(version = VERSION)]
#[command(about = "Clip web articles into clean, readable content", long_about = None)]
struct Args {
    /// URL to clip, local HTML file, or "-" for stdin
    #[arg(value_name = "INPUT")]
    input: String,

    /// Output file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Output format (structured, html, text, json)
    #[arg(short, long, default_value = "structured", value_name = "FORMAT")]
    format: OutputFormat,

    /// Render mode for URL inputs (auto, force, disable)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    render: RenderPreference,

    /// Download images into this directory and rewrite references
    #[arg(long, value_name = "DIR")]
    images_dir: Option<PathBuf>,

    /// Base URL for resolving relative links in file/stdin input
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// HTTP timeout in seconds
    #[arg(long, default_value = "10", value_name = "SECS")]
    timeout: u64,

    /// Custom User-Agent for HTTP requests
    #[arg(long, value_name = "UA")]
    user_agent: Option<String>,

    /// Minimum extracted text length before escalating to a rendered fetch
    #[arg(long, default_value = "300", value_name = "NUM")]
    min_content: usize,

    /// Minimum text length for a content-region candidate
    #[arg(long, default_value = "100", value_name = "NUM")]
    region_threshold: usize,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.verbose {
        print_banner();
    }

    let fetch = FetchConfig {
        text_timeout: args.timeout,
        user_agent: args
            .user_agent
            .clone()
            .unwrap_or_else(|| clipmark_core::fetch::DEFAULT_USER_AGENT.to_string()),
        ..Default::default()
    };
    let config = PipelineConfig::builder()
        .fetch(fetch)
        .extract(ExtractConfig { min_region_len: args.region_threshold })
        .strategy(StrategyConfig { min_content_len: args.min_content, ..Default::default() })
        .build();

    let mut pipeline = ClipPipeline::new(config);

    if let Some(dir) = &args.images_dir {
        let store = ImageStore::new(dir).with_context(|| format!("Failed to open image store: {}", dir.display()))?;
        pipeline = pipeline.with_image_store(store);
    }

    let render_config = RenderConfig::default();
    if BrowserHandle::available(&render_config) {
        pipeline = pipeline.with_browser(BrowserHandle::new(render_config));
    } else if args.render == RenderPreference::Force {
        anyhow::bail!("--render force requested but no Chromium executable was found");
    } else if args.verbose {
        print_warning("No Chromium executable found; rendered fetches are disabled");
    }

    let options = ClipOptions { render: args.render, download_images: args.images_dir.is_some() };

    let result = clip_input(&pipeline, &args, &options).await?;
    pipeline.shutdown().await;

    if args.verbose {
        print_clip_details(&result);
    }

    let output = match args.format {
        OutputFormat::Structured => {
            let mut text = format!("# {}\n\n", result.extracted.title);
            text.push_str(&result.extracted.structured_text);
            text
        }
        OutputFormat::Html => result.extracted.content.clone(),
        OutputFormat::Text => result.extracted.plain_text.clone(),
        OutputFormat::Json => serde_json::to_string_pretty(&result).context("Failed to serialize result")?,
    };

    match args.output {
        Some(path) => {
            fs::write(&path, output).with_context(|| format!("Failed to write to file: {}", path.display()))?;
            print_success(&format!("Output written to {}", path.display().bright_white()));
        }
        None => {
            println!("{}", output);
        }
    }

    Ok(())
}

async fn clip_input(pipeline: &ClipPipeline, args: &Args, options: &ClipOptions) -> anyhow::Result<ClipResult> {
    let base_url = args
        .base_url
        .as_deref()
        .map(Url::parse)
        .transpose()
        .context("Invalid --base-url")?;

    if args.input == "-" {
        if args.verbose {
            print_step(1, 2, "Reading from stdin");
        }
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        if args.verbose {
            eprintln!("  {} {}", "Size:".dimmed(), format_size(buffer.len()).bright_white());
            print_step(2, 2, "Extracting content");
        }
        return pipeline
            .clip_html(&buffer, base_url.as_ref(), options)
            .await
            .context("Failed to extract content");
    }

    if args.input.starts_with("http://") || args.input.starts_with("https://") {
        if args.verbose {
            print_step(
                1,
                2,
                &format!("Clipping {}", args.input.bright_white().underline()),
            );
        }
        let result = pipeline
            .clip(&args.input, options)
            .await
            .context("Failed to clip URL")?;
        if args.verbose {
            print_step(2, 2, "Extraction finished");
        }
        return Ok(result);
    }

    if args.verbose {
        print_step(1, 2, &format!("Reading from file {}", args.input.bright_white()));
    }
    let html = fs::read_to_string(&args.input).with_context(|| format!("Failed to read file: {}", args.input))?;
    if args.verbose {
        eprintln!("  {} {}", "Size:".dimmed(), format_size(html.len()).bright_white());
        print_step(2, 2, "Extracting content");
    }
    pipeline
        .clip_html(&html, base_url.as_ref(), options)
        .await
        .context("Failed to extract content")
}
