use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use promptkit::config::Config;
use promptkit::datasource::SourceLoader;
use promptkit::external::{ImgBbClient, OpenAiClient};
use promptkit::haiku::HaikuGenerator;
use promptkit::image::{AspectRatio, BatchRequest, ImagePipeline, ImageSize};
use promptkit::logging;
use promptkit::output::write_output;
use promptkit::processor::{MapReduceSummarizer, PipelineError};

#[derive(Parser, Debug)]
#[command(author, version, about = "Small command-line tools around hosted LLM APIs", long_about = None)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Summarize documents or answer a question about them
    Summarize(SummarizeArgs),
    /// Generate three haiku variations about a topic
    Haiku(HaikuArgs),
    /// Describe an image, then generate a new one from the description
    Reimagine(ReimagineArgs),
    /// Generate images from a prompt and upload them to ImgBB
    Imagine(ImagineArgs),
}

#[derive(Args, Debug)]
struct SummarizeArgs {
    /// Data sources (URL, pdf, docx, csv, or text file path)
    sources: Vec<String>,

    /// The query. If not given, the content is summarized
    #[arg(short, long)]
    query: Option<String>,

    /// File to save the answer to (.txt, .pdf, .docx or .csv)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct HaikuArgs {
    /// Topic of the haiku; asked for interactively when omitted
    topic: Option<String>,
}

#[derive(Args, Debug)]
struct ReimagineArgs {
    /// Path to the input image
    image: PathBuf,

    /// Size of the generated image
    #[arg(long, value_enum, default_value_t = ImageSize::Square)]
    size: ImageSize,

    /// File name for the generated image
    #[arg(long, default_value = "generated_image.png")]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct ImagineArgs {
    /// Main text prompt for the image
    #[arg(long)]
    prompt: String,

    /// What to avoid in the image
    #[arg(long)]
    negative_prompt: Option<String>,

    /// Aspect ratio of the image
    #[arg(long, value_enum, default_value_t = AspectRatio::Square)]
    aspect_ratio: AspectRatio,

    /// Number of images to generate (1-10)
    #[arg(short, long, default_value_t = 1)]
    n: u32,

    /// Directory the generated images are saved to
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
}

async fn summarize(config: &Config, args: SummarizeArgs) -> Result<ExitCode> {
    let loader = SourceLoader::new(
        reqwest::Client::new(),
        Duration::from_secs(config.processing.fetch_timeout_secs),
    );
    let summarizer = MapReduceSummarizer::new(
        Arc::new(OpenAiClient::from_llm_config(&config.llm)),
        loader,
        config.llm.summary_model.clone(),
        config.processing.max_source_chars,
    );

    let report = match summarizer.run(&args.sources, args.query.as_deref()).await {
        Ok(report) => report,
        Err(PipelineError::NoUsableInput) => {
            tracing::error!("No usable summaries produced. Exiting.");
            return Ok(ExitCode::FAILURE);
        }
    };

    println!("\n--- Final Result ---");
    println!("{}", report.answer.text());
    println!("--------------------");

    if let Some(path) = args.output {
        match write_output(report.answer.text(), &path) {
            Ok(_) => println!("\nOutput saved to: {}", path.display()),
            Err(e) => tracing::error!(path = %path.display(), error = %e, "Error saving output"),
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn read_topic() -> Result<String> {
    print!("Enter a topic for your haiku: ");
    io::stdout().flush()?;
    let mut buffer = String::new();
    io::stdin().read_line(&mut buffer)?;
    Ok(buffer)
}

async fn haiku(config: &Config, args: HaikuArgs) -> Result<ExitCode> {
    let topic = match args.topic {
        Some(topic) => topic,
        None => read_topic()?,
    };
    let topic = topic.trim();
    if topic.is_empty() {
        println!("Topic cannot be empty. Exiting.");
        return Ok(ExitCode::SUCCESS);
    }

    let generator = HaikuGenerator::new(
        Arc::new(OpenAiClient::from_llm_config(&config.llm)),
        config.llm.haiku_model.clone(),
    );

    for variation in generator.variations(topic).await {
        if let Ok(text) = &variation.outcome {
            println!(
                "\nHaiku {} (T={}, P={}):",
                variation.index, variation.preset.temperature, variation.preset.top_p
            );
            println!("{}", text);
            println!("{}", "-".repeat(50));
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn image_pipeline(config: &Config) -> ImagePipeline {
    let client = Arc::new(OpenAiClient::from_image_config(
        &config.images,
        Duration::from_secs(config.llm.timeout_secs),
    ));
    ImagePipeline::new(
        client.clone(),
        client,
        config.images.vision_model.clone(),
        config.images.image_model.clone(),
    )
}

async fn reimagine(config: &Config, args: ReimagineArgs) -> Result<ExitCode> {
    let result = image_pipeline(config)
        .reimagine(&args.image, args.size, &args.output)
        .await?;

    println!("\nImage Description: {}", result.description);
    println!("\nNew image saved as: {}", result.output.display());
    Ok(ExitCode::SUCCESS)
}

async fn imagine(config: &Config, args: ImagineArgs) -> Result<ExitCode> {
    let host = ImgBbClient::from_config(&config.images)?;
    let request = BatchRequest {
        prompt: args.prompt,
        negative_prompt: args.negative_prompt,
        aspect_ratio: args.aspect_ratio,
        count: args.n,
    };

    let result = image_pipeline(config)
        .imagine(&host, &request, &args.out_dir)
        .await?;

    println!("\nHosted URLs (ImgBB):");
    for url in &result.hosted_urls {
        println!("{}", url);
    }
    println!("\nSaved Local Files:");
    for file in &result.local_files {
        println!("{}", file.display());
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;
    logging::init(cli.verbose, &config.processing.log_level);

    match cli.command {
        Command::Summarize(args) => summarize(&config, args).await,
        Command::Haiku(args) => haiku(&config, args).await,
        Command::Reimagine(args) => reimagine(&config, args).await,
        Command::Imagine(args) => imagine(&config, args).await,
    }
}
