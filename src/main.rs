use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "chart-translator",
    version,
    about = "Translate chart images and their annotation records"
)]
struct Cli {
    /// Directory of source images named <index>.<ext>
    #[arg(long = "source-dir")]
    source_dir: Option<String>,

    /// Directory receiving the redrawn images
    #[arg(long = "target-dir")]
    target_dir: Option<String>,

    /// JSON array of annotation records, one per image
    #[arg(long = "annotations")]
    annotations: Option<String>,

    /// Output annotation file
    #[arg(long = "output")]
    output: Option<String>,

    /// Font file used to draw translated text
    #[arg(long = "font")]
    font: Option<String>,

    /// Source language (default: en)
    #[arg(short = 'L', long = "source-lang")]
    source_lang: Option<String>,

    /// Target language (default: ko)
    #[arg(short = 'l', long = "lang")]
    lang: Option<String>,

    /// Provider or provider:model (google, openai:MODEL_ID, gemini:..., claude:...)
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// API key (overrides environment variables)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Write ",\n" after every record, including the last
    #[arg(long = "trailing-comma")]
    trailing_comma: bool,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    chart_translator::logging::init(cli.verbose)?;

    let report = chart_translator::run(chart_translator::Config {
        source_dir: cli.source_dir,
        target_dir: cli.target_dir,
        source_annotations: cli.annotations,
        target_annotations: cli.output,
        font: cli.font,
        source_lang: cli.source_lang,
        lang: cli.lang,
        model: cli.model,
        key: cli.key,
        settings_path: cli.read_settings,
        trailing_comma: cli.trailing_comma,
    })
    .await?;

    println!("{}", chart_translator::format_report(&report));
    Ok(())
}
