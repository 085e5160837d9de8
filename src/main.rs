use std::path::PathBuf;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use clap::{Args, Parser, Subcommand};
use palmreveal::app::OverlayApp;
use palmreveal::intake::{
    pair_id_from_url, CameraSource, HandLandmarker, JsonLinesLandmarker, ProcessLandmarker,
    StillCamera,
};
use palmreveal::{AppError, CoordinatorBuilder, ImagePairStore, NewImage, Settings};
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(author, version, about = "Reveal an image inside the palm of a tracked hand")]
struct Cli {
    /// Configuration file (defaults to ./palmreveal.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Shrink, re-encode and store a background/overlay image pair, then print its id.
    Import {
        /// Background image.
        image1: PathBuf,
        /// Overlay image revealed inside the palm.
        image2: PathBuf,
        #[arg(long)]
        description: Option<String>,
    },
    /// List stored pairs, newest first.
    List,
    /// Print the metadata of one pair.
    Show { id: String },
    /// Delete one pair.
    Delete { id: String },
    /// Delete every pair.
    Clear,
    /// Open the overlay window for a page URL (`...?id=<pair id>`) or a bare id.
    Run(SessionArgs),
    /// Composite the first frame headlessly and write it as PNG.
    Render {
        #[command(flatten)]
        session: SessionArgs,
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Debug, Args)]
struct SessionArgs {
    /// Page URL carrying the `id` query parameter, or the pair id itself.
    location: String,
    /// Still image standing in for the camera feed.
    #[arg(long)]
    camera: PathBuf,
    /// Recorded landmark detections, one JSON object per line.
    #[arg(long, conflicts_with = "detector")]
    landmarks: Option<PathBuf>,
    /// Helper command running the landmark model.
    #[arg(long)]
    detector: Option<String>,
}

fn init_logging(settings: &Settings) {
    tracing_subscriber::fmt()
        .with_max_level(settings.log_level())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    init_logging(&settings);

    let result = run(cli.command, settings).await;
    if let Err(e) = &result {
        error!("{}", e.status_message());
    }
    result
}

async fn run(command: Command, settings: Settings) -> Result<(), AppError> {
    let store = Arc::new(ImagePairStore::new(settings.storage.path.clone()));

    match command {
        Command::Import {
            image1,
            image2,
            description,
        } => {
            let image1 = NewImage::from_path(&image1)
                .await?
                .normalize(&settings.import)
                .await?;
            let image2 = NewImage::from_path(&image2)
                .await?
                .normalize(&settings.import)
                .await?;
            let id = store.put(image1, image2, description).await?;
            println!("{id}");
        }
        Command::List => {
            for pair in store.list().await? {
                println!(
                    "{}\t{}\t{} + {}\t{}",
                    pair.id,
                    format_timestamp(pair.timestamp),
                    pair.image1_name,
                    pair.image2_name,
                    pair.description
                );
            }
        }
        Command::Show { id } => {
            let pair = store.get(&id).await?;
            println!("id:          {}", pair.id);
            println!("created:     {}", format_timestamp(pair.timestamp));
            println!("description: {}", pair.description);
            println!("background:  {} ({} bytes)", pair.image1_name, pair.image1.len());
            println!("overlay:     {} ({} bytes)", pair.image2_name, pair.image2.len());
        }
        Command::Delete { id } => {
            store.delete(&id).await?;
            info!("Deleted {}", id);
        }
        Command::Clear => store.clear().await?,
        Command::Run(args) => {
            let builder = session_builder(&settings, store, &args).await?;
            OverlayApp::start_gui(&settings, builder)?;
        }
        Command::Render { session, out } => {
            let builder = session_builder(&settings, store, &session).await?;
            let frame = builder.render_once().await?;
            frame
                .save(&out)
                .map_err(|e| AppError::Display(format!("cannot write {}: {}", out.display(), e)))?;
            info!("Wrote {}", out.display());
        }
    }

    Ok(())
}

async fn session_builder(
    settings: &Settings,
    store: Arc<ImagePairStore>,
    args: &SessionArgs,
) -> Result<CoordinatorBuilder, AppError> {
    let pair_id = pair_id_from_url(&args.location)?;
    let camera: Box<dyn CameraSource> = Box::new(StillCamera::from_path(&args.camera).await?);

    let landmarker: Box<dyn HandLandmarker> = match (&args.landmarks, &args.detector) {
        (Some(path), _) => Box::new(
            JsonLinesLandmarker::open(path)
                .await?
                .with_settings(&settings.detection),
        ),
        (None, Some(command)) => {
            Box::new(ProcessLandmarker::spawn(command, &settings.detection).await?)
        }
        (None, None) => match &settings.detection.command {
            Some(command) => Box::new(ProcessLandmarker::spawn(command, &settings.detection).await?),
            None => {
                return Err(AppError::Detection(
                    "no landmark source: pass --landmarks or --detector".to_string(),
                ))
            }
        },
    };

    Ok(CoordinatorBuilder::new(settings.clone())
        .store(store)
        .pair_id(pair_id)
        .camera(camera)
        .landmarker(landmarker))
}

fn format_timestamp(millis: i64) -> String {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|time| time.to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}
