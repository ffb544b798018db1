use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Read;
use tracing::{debug, info};

use treewright::rst::SerializedNode;
use treewright::{configure, html, mount, shallow, Configuration, DebugOptions, ReferenceAdapter, RenderOptions, Wrapper};

#[derive(Parser)]
#[command(name = "treewright")]
#[command(about = "Render HTML fixtures as component trees and query them with selectors")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    Mount,
    Shallow,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the render tree as indented pseudo-markup
    Debug {
        /// HTML file path, or '-' for stdin
        input: String,

        /// Leave props out of the dump
        #[arg(long)]
        ignore_props: bool,

        /// Print object and list props in full
        #[arg(short, long)]
        verbose: bool,

        /// Render mode
        #[arg(short, long, value_enum, default_value_t = Mode::Mount)]
        mode: Mode,
    },

    /// Print the nodes matching a selector
    Find {
        /// HTML file path, or '-' for stdin
        input: String,

        /// Selector, e.g. `ul > li.item[data-id=2]`
        selector: String,

        /// Output format: text or json
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Print the rendered text, optionally of each selector match
    Text {
        /// HTML file path, or '-' for stdin
        input: String,

        selector: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    configure(Configuration::with_adapter(ReferenceAdapter::new()))?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Debug {
            input,
            ignore_props,
            verbose,
            mode,
        } => {
            info!(input = %input, ?mode, "debug command");
            let wrapper = load(&input, mode)?;
            println!("{}", wrapper.debug_with(&DebugOptions { ignore_props, verbose }));
            Ok(())
        }
        Commands::Find {
            input,
            selector,
            format,
        } => {
            info!(input = %input, selector = %selector, "find command");
            let wrapper = load(&input, Mode::Mount)?;
            let found = wrapper
                .find(selector.as_str())
                .with_context(|| format!("evaluating selector {selector:?}"))?;
            debug!(matched = found.len(), "selector evaluated");
            print_output(&found, format)
        }
        Commands::Text { input, selector } => {
            let wrapper = load(&input, Mode::Mount)?;
            match selector {
                Some(selector) => {
                    let found = wrapper
                        .find(selector.as_str())
                        .with_context(|| format!("evaluating selector {selector:?}"))?;
                    for text in found.map(|w, _| w.text()) {
                        println!("{}", text?);
                    }
                }
                None => println!("{}", wrapper.text()?),
            }
            Ok(())
        }
    }
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(input).with_context(|| format!("reading {input}"))
    }
}

fn load(input: &str, mode: Mode) -> Result<Wrapper> {
    let source = read_input(input)?;
    let element = html::parse(&source);
    let wrapper = match mode {
        Mode::Mount => mount(&element, RenderOptions::new()),
        Mode::Shallow => shallow(&element, RenderOptions::new()),
    }
    .with_context(|| format!("rendering {input}"))?;
    debug!(roots = wrapper.len(), "fixture rendered");
    Ok(wrapper)
}

fn print_output(found: &Wrapper, format: Format) -> Result<()> {
    let output = match format {
        Format::Json => {
            let nodes: Vec<SerializedNode> = found
                .get_nodes()
                .iter()
                .map(|n| SerializedNode::from_node(n))
                .collect();
            serde_json::to_string_pretty(&nodes)?
        }
        Format::Text => found.debug(),
    };
    println!("{output}");
    Ok(())
}
