use facegate::{
    camera::Camera,
    cli::{is_quit_key, poll_key, AsciiRenderer, RawTerminal, TerminalCaptureControl, TerminalDisplay},
    common::{Config, DataLayout},
    core::{
        build_embedder, import_folder, rebuild_gallery, CaptureMode, CascadeDetector, EnrollmentWorkflow,
        FacePipeline, IdentityForm, Matcher, RecognitionLoop,
    },
    diagnostics,
    storage::EnrollmentStore,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "facegate")]
#[command(about = "Camera face recognition access control")]
struct Cli {
    /// Enable development mode (verbose logging)
    #[arg(long, global = true)]
    dev: bool,

    /// Configuration file (defaults to configs/facegate.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run live recognition
    Run,
    /// Register a new user
    Enroll {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        login: String,
        #[arg(short, long)]
        password: String,
        /// Use an existing photo instead of the camera
        #[arg(short, long)]
        image: Option<PathBuf>,
        /// Wait for the save key instead of taking the first face
        #[arg(short, long)]
        manual: bool,
    },
    /// Import embeddings from a folder of <person>/<image> files
    Import {
        #[arg(short, long)]
        dir: PathBuf,
    },
    /// Recompute the gallery from the stored user face images
    RebuildGallery,
    /// List registered users
    ListUsers,
    /// Check models, camera and stored data
    Diagnose,
    /// List available cameras
    DetectCamera,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.dev);

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let layout = DataLayout::new(&config.storage.data_dir);

    match cli.command {
        Commands::Run => run_recognition(&config, &layout)?,
        Commands::Enroll { name, login, password, image, manual } => {
            let form = IdentityForm::new(name, login, password);
            enroll(&config, &layout, &form, image, manual || config.enrollment.manual_capture)?;
        }
        Commands::Import { dir } => {
            let mut pipeline = build_pipeline(&config)?;
            let mut store = EnrollmentStore::load(&layout, pipeline.backend())?;
            let count = import_folder(&mut store, &mut pipeline, &dir)?;
            println!("Imported {} embeddings; gallery now holds {}", count, store.gallery().len());
        }
        Commands::RebuildGallery => {
            let mut pipeline = build_pipeline(&config)?;
            let mut store = EnrollmentStore::load(&layout, pipeline.backend())?;
            let count = rebuild_gallery(&mut store, &mut pipeline, &layout)?;
            println!("Gallery rebuilt: {} of {} users embedded", count, store.users().len());
        }
        Commands::ListUsers => {
            let store = EnrollmentStore::load(&layout, config.recognizer.backend)?;
            if store.users().is_empty() {
                println!("No users registered");
            }
            for user in store.users() {
                println!("{:<24} {:<16} {}", user.display_name, user.login, user.face_image_path);
            }
        }
        Commands::Diagnose => {
            let mut camera = Camera::new(&config.camera);
            let report = diagnostics::diagnose(&config, &mut camera);
            println!("{}", report);
            if report.has_failures() {
                println!("Run this again after fixing the items marked ❌");
            }
        }
        Commands::DetectCamera => {
            println!("🔍 Detecting available cameras...\n");

            let cameras = Camera::list_all_cameras()?;
            if cameras.is_empty() {
                println!("❌ No cameras found!");
                println!("\nEnsure you have permission to access /dev/video*");
                return Ok(());
            }

            for camera in &cameras {
                let capture = if camera.can_capture { "capture" } else { "no capture" };
                println!("📷 /dev/video{}: {} ({})", camera.index, camera.name, capture);
                if !camera.formats.is_empty() {
                    println!("   formats: {}", camera.formats.join(", "));
                }
            }

            println!("\nSet [camera] device_index in the configuration to pick one;");
            println!("device_index = 999 uses the first capture device.");
        }
    }

    Ok(())
}

fn build_pipeline(config: &Config) -> Result<FacePipeline> {
    let detector = CascadeDetector::new(&config.detector)?;
    let embedder = build_embedder(&config.recognizer, &config.performance)?;
    Ok(FacePipeline::new(
        Box::new(detector),
        embedder,
        Matcher::new(config.matcher.distance_threshold),
    ))
}

fn renderer(config: &Config) -> AsciiRenderer {
    AsciiRenderer::new(config.preview.ascii_width, config.preview.ascii_height)
}

fn run_recognition(config: &Config, layout: &DataLayout) -> Result<()> {
    let mut pipeline = build_pipeline(config)?;
    let mut store = EnrollmentStore::load(layout, pipeline.backend())?;

    if store.gallery().is_empty() && !store.users().is_empty() && config.recognition.rebuild_gallery_on_start {
        tracing::info!("Gallery is empty; rebuilding it from stored face images");
        rebuild_gallery(&mut store, &mut pipeline, layout)?;
    }

    let mut recognition = RecognitionLoop::new(
        Box::new(Camera::new(&config.camera)),
        pipeline,
        store.gallery().clone(),
        Box::new(TerminalDisplay::new(renderer(config))),
    );

    let interval = Duration::from_millis(config.recognition.tick_interval_ms);
    {
        let _terminal = RawTerminal::enter()?;
        recognition.run(interval, || matches!(poll_key(), Ok(Some(key)) if is_quit_key(key)))?;
    }

    println!("Stopped after {} frames", recognition.frames_processed());
    Ok(())
}

fn enroll(config: &Config, layout: &DataLayout, form: &IdentityForm, image: Option<PathBuf>, manual: bool) -> Result<()> {
    let mut pipeline = build_pipeline(config)?;
    let mut store = EnrollmentStore::load(layout, pipeline.backend())?;
    let mut workflow = EnrollmentWorkflow::new(&mut store, &mut pipeline, layout, config.enrollment.crop_margin);

    let outcome = match image {
        Some(path) => workflow.enroll_from_image(form, &path)?,
        None => {
            let form = workflow.check(form)?;
            let mode = if manual { CaptureMode::Manual } else { CaptureMode::Auto };
            let mut camera = Camera::new(&config.camera);
            let mut control = TerminalCaptureControl::new(renderer(config), manual);
            let timeout = Duration::from_secs(config.enrollment.capture_timeout_secs);

            let face = {
                let _terminal = RawTerminal::enter()?;
                workflow.capture_face(&mut camera, mode, &mut control, timeout)
            }?;
            workflow.enroll(&form, &face)?
        }
    };

    println!("✅ Registered {} ({})", outcome.record.display_name, outcome.record.login);
    println!("   Face image: {}", outcome.record.face_image_path);
    if !outcome.embedding_stored {
        println!("⚠️  No embedding stored; run `facegate rebuild-gallery` once the models are in place");
    }
    Ok(())
}

fn setup_logging(dev_mode: bool) {
    if dev_mode {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }
}
