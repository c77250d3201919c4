use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use colored::*;
use log::debug;

use codeatlas::{
    cli,
    diagram::{Direction, LayoutOptions, RenderFormat, Splines},
    llm::ChatMessage,
    logging, AtlasConfig, CodeAtlas, RepoRef,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file; defaults to the user config directory
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory for saved diagrams and audio
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// More output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate an architecture diagram
    Analyze {
        /// GitHub URL, ZIP archive or directory
        repo: String,
        #[command(flatten)]
        model: ModelArgs,
        /// Also render the diagram to this file (format from the extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        layout: LayoutArgs,
    },
    /// Write a prose summary of the architecture
    Summarize {
        /// GitHub URL, ZIP archive or directory
        repo: String,
        #[command(flatten)]
        model: ModelArgs,
        /// Read the summary aloud with this ElevenLabs voice; the configured voice when empty
        #[arg(long, num_args = 0..=1, default_missing_value = "")]
        speak: Option<String>,
    },
    /// Ask questions about the code; interactive when no question is given
    Chat {
        /// GitHub URL, ZIP archive or directory
        repo: String,
        /// A single question to answer
        #[arg(long)]
        question: Option<String>,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// List saved diagrams
    History {
        /// Maximum number of entries
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        /// Print the DOT source of one saved diagram
        #[arg(long)]
        show: Option<String>,
    },
    /// Validate a DOT file and render it with Graphviz
    Render {
        /// DOT file, or a saved diagram id
        input: String,
        /// Output file; the format follows its extension
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        layout: LayoutArgs,
    },
    /// Describe a diagram aloud with ElevenLabs
    Narrate {
        /// DOT file, or a saved diagram id
        input: String,
        /// ElevenLabs voice id
        #[arg(long)]
        voice: Option<String>,
        /// API key for the narration model's provider
        #[arg(long)]
        api_key: Option<String>,
    },
}

#[derive(Args, Clone, Default)]
struct ModelArgs {
    /// Model display name or id
    #[arg(short, long)]
    model: Option<String>,
    /// API key for the model's provider
    #[arg(long)]
    api_key: Option<String>,
}

#[derive(Args, Clone, Default)]
struct LayoutArgs {
    /// Rank direction: TB, LR, BT or RL
    #[arg(long)]
    direction: Option<Direction>,
    /// Edge routing: polyline, ortho, spline, line or curved
    #[arg(long)]
    splines: Option<Splines>,
}

impl LayoutArgs {
    fn apply(&self, base: &LayoutOptions) -> Option<LayoutOptions> {
        if self.direction.is_none() && self.splines.is_none() {
            return None;
        }
        let mut layout = base.clone();
        if let Some(direction) = self.direction {
            layout.direction = direction;
        }
        if let Some(splines) = self.splines {
            layout.splines = splines;
        }
        Some(layout)
    }
}

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    if let Err(e) = logging::init(logging::level_for(args.verbose, args.quiet)) {
        eprintln!("{}", e);
    }

    if let Err(e) = run(args).await {
        cli::print_error(&format!("{:#}", e));
        process::exit(1);
    }
}

fn load_config(args: &Cli) -> anyhow::Result<AtlasConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let mut config = AtlasConfig::from_file(path)?;
            config.apply_env();
            config
        }
        None => AtlasConfig::load()?,
    };
    if let Some(dir) = &args.data_dir {
        config.paths.data_dir = dir.clone();
    }
    Ok(config)
}

async fn run(args: Cli) -> anyhow::Result<()> {
    let config = load_config(&args)?;
    debug!("Data directory: {}", config.paths.data_dir.display());
    let atlas = CodeAtlas::new(config)?;

    match args.command {
        Command::Analyze { repo, model, output, layout } => {
            atlas.config().validate().await?;
            let atlas = atlas.scoped(model.api_key.as_deref(), model.model.as_deref())?;
            let repo = RepoRef::parse(&repo)?;
            let pb = cli::spinner(format!("Analyzing {}", repo));
            let result = atlas.analyze(&repo).await;
            pb.finish_and_clear();
            let report = result?;
            cli::print_analysis(&report);

            if let Some(output) = output {
                let format = format_for(&output)?;
                let image = atlas
                    .render(&report.diagram.raw_text, format, layout.apply(&atlas.config().render.layout))
                    .await?;
                write_output(&output, &image).await?;
            }
        }
        Command::Summarize { repo, model, speak } => {
            atlas.config().validate().await?;
            let atlas = atlas.scoped(model.api_key.as_deref(), model.model.as_deref())?;
            let repo = RepoRef::parse(&repo)?;
            let pb = cli::spinner(format!("Summarizing {}", repo));
            let result = atlas.summarize(&repo).await;
            pb.finish_and_clear();
            let report = result?;
            cli::print_summary(&report);
            if let Some(voice) = speak {
                let pb = cli::spinner("Reading summary aloud");
                let result = atlas.speak(&report.summary, Some(voice.as_str())).await;
                pb.finish_and_clear();
                cli::print_info(&format!("Audio saved to {}", result?.audio_path.display()));
            }
        }
        Command::Chat { repo, question, model } => {
            let atlas = atlas.scoped(model.api_key.as_deref(), model.model.as_deref())?;
            let repo = RepoRef::parse(&repo)?;
            let pb = cli::spinner(format!("Reading {}", repo));
            let prepared = atlas.prepare_context(&repo).await;
            pb.finish_and_clear();
            let prepared = prepared?;
            if let Some(warning) = prepared.warning_text() {
                cli::print_warning(&warning);
            }

            match question {
                Some(question) => {
                    let answer = atlas.chat_with_context(&prepared.context.text, &question, &[]).await?;
                    println!("{}", answer);
                }
                None => chat_loop(&atlas, &prepared.context.text).await?,
            }
        }
        Command::History { limit, show } => match show {
            Some(id) => println!("{}", atlas.history().load(&id).await?),
            None => cli::print_history(&atlas.list_recent(limit).await?),
        },
        Command::Render { input, output, layout } => {
            let dot = read_diagram(&atlas, &input).await?;
            let format = format_for(&output)?;
            let image = atlas
                .render(&dot, format, layout.apply(&atlas.config().render.layout))
                .await?;
            write_output(&output, &image).await?;
        }
        Command::Narrate { input, voice, api_key } => {
            let atlas = atlas.scoped(api_key.as_deref(), None)?;
            let dot = read_diagram(&atlas, &input).await?;
            let pb = cli::spinner("Narrating diagram");
            let result = atlas.narrate(&dot, voice.as_deref()).await;
            pb.finish_and_clear();
            let narration = result?;
            println!("{}", narration.script);
            cli::print_info(&format!("Audio saved to {}", narration.audio_path.display()));
        }
    }
    Ok(())
}

async fn chat_loop(atlas: &CodeAtlas, context: &str) -> anyhow::Result<()> {
    println!("{}", "Ask about the code (empty line or 'q' to quit)".bright_cyan());
    let mut history: Vec<ChatMessage> = Vec::new();
    let stdin = io::stdin();
    loop {
        print!("{} ", ">".bright_green());
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() || matches!(question, "q" | "quit" | "exit") {
            break;
        }

        let pb = cli::spinner("Thinking");
        let result = atlas.chat_with_context(context, question, &history).await;
        pb.finish_and_clear();
        match result {
            Ok(answer) => {
                println!("\n{}\n", answer);
                history.push(ChatMessage::user(question));
                history.push(ChatMessage::assistant(answer));
            }
            Err(e) => cli::print_error(&e.to_string()),
        }
    }
    Ok(())
}

async fn read_diagram(atlas: &CodeAtlas, input: &str) -> anyhow::Result<String> {
    let path = Path::new(input);
    if path.is_file() {
        return tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()));
    }
    Ok(atlas.history().load(input).await?)
}

fn format_for(output: &Path) -> anyhow::Result<RenderFormat> {
    let extension = output
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "svg".to_string());
    Ok(extension.parse()?)
}

async fn write_output(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    cli::print_info(&format!("Diagram written to {}", path.display()));
    Ok(())
}
