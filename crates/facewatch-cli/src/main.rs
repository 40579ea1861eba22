use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facewatch_core::annotate;
use facewatch_core::classifier::{IdentityClassifier, OnnxModel};
use facewatch_core::detector::{CascadeDetector, DetectorParams};
use facewatch_core::encode;
use facewatch_core::labels::LabelSet;
use facewatch_core::pipeline::{OneShotPipeline, Recognizer};
use facewatch_core::types::HistoryEntry;
use facewatch_hw::Camera;
use std::path::{Path, PathBuf};

const DEFAULT_DAEMON_URL: &str = "http://127.0.0.1:5000";

#[derive(Parser)]
#[command(name = "facewatch", about = "facewatch face recognition CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect and identify faces in an image file (no daemon needed)
    Analyze {
        /// Image to analyze (png, jpg)
        image: PathBuf,
        /// Directory holding the cascade, the ONNX model and labels.toml
        #[arg(long, env = "FACEWATCH_MODEL_DIR", default_value = "./models")]
        model_dir: PathBuf,
        /// Write the annotated image here as JPEG
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List V4L2 capture devices
    Devices,
    /// Show the daemon's recent recognitions
    History {
        #[arg(long, default_value = DEFAULT_DAEMON_URL)]
        url: String,
    },
    /// Show daemon status
    Status {
        #[arg(long, default_value = DEFAULT_DAEMON_URL)]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            image,
            model_dir,
            output,
        } => analyze(&image, &model_dir, output.as_deref())?,
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for dev in devices {
                println!("{}  {} (driver: {}, bus: {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
        Commands::History { url } => {
            let entries: Vec<HistoryEntry> = reqwest::get(format!("{url}/history"))
                .await
                .with_context(|| format!("cannot reach facewatchd at {url}"))?
                .error_for_status()?
                .json()
                .await?;
            if entries.is_empty() {
                println!("No recognitions yet");
            }
            for entry in entries {
                println!("{}  {:<20} {:.2}%", entry.timestamp, entry.identity, entry.confidence);
            }
        }
        Commands::Status { url } => {
            let status: serde_json::Value = reqwest::get(format!("{url}/status"))
                .await
                .with_context(|| format!("cannot reach facewatchd at {url}"))?
                .error_for_status()?
                .json()
                .await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}

fn analyze(image: &Path, model_dir: &Path, output: Option<&Path>) -> Result<()> {
    let path_in = |file: &str| model_dir.join(file).to_string_lossy().into_owned();

    let detector = CascadeDetector::load(
        &path_in("haarcascade_frontalface_default.xml"),
        DetectorParams::default(),
    )?;
    let labels = LabelSet::load(&path_in("labels.toml"))?;
    let model = OnnxModel::load(&path_in("model_faces.onnx"), 2)?;
    let classifier = IdentityClassifier::new(Box::new(model), labels)?;
    let pipeline = OneShotPipeline::new(Recognizer::new(Box::new(detector), classifier).into_shared());

    tracing::debug!(image = %image.display(), "analyzing");
    let bytes = std::fs::read(image).with_context(|| format!("cannot read {}", image.display()))?;
    let frame = encode::decode_image(&bytes)?;
    let analysis = pipeline.analyze(&frame);

    if analysis.predictions.is_empty() {
        println!("No faces detected");
    }
    for prediction in &analysis.predictions {
        println!("{}", annotate::label(prediction));
    }

    if let Some(out) = output {
        let jpeg = encode::encode_jpeg(&analysis.annotated, 90)?;
        std::fs::write(out, jpeg).with_context(|| format!("cannot write {}", out.display()))?;
        println!("Annotated image written to {}", out.display());
    }
    Ok(())
}
