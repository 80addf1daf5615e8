use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facelock_core::types::Frame;
use facelock_core::{
    EnrollmentConfig, EnrollmentSession, FaceEncoder, MatchingEngine, SampleOutcome,
    DEFAULT_THRESHOLD,
};
use facelock_store::TemplateStore;

#[derive(Parser)]
#[command(name = "facelock", about = "Facelock biometric template management CLI")]
struct Cli {
    /// Path to the SQLite template database.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a face template from sample images
    Enroll {
        /// Identity to enroll the template under
        #[arg(short, long)]
        identity: String,
        /// Label for this template (e.g., "normal", "glasses")
        #[arg(short, long, default_value = "default")]
        label: String,
        /// Number of accepted samples required
        #[arg(long, default_value_t = 5)]
        samples: usize,
        /// Sample images, offered in order
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Verify a probe image against enrolled templates
    Verify {
        /// Accept threshold on the fused distance
        #[arg(short, long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f64,
        /// Probe image
        image: PathBuf,
    },
    /// List enrolled templates
    List,
    /// Remove an enrolled template
    Remove {
        /// Template ID to remove
        id: String,
    },
    /// Show store status and recent authentication events
    Status,
    /// Locate a face in an image and report the region
    Inspect {
        /// Image to analyze
        image: PathBuf,
    },
}

fn default_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("FACELOCK_DB_PATH") {
        return PathBuf::from(path);
    }
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facelock")
        .join("facelock.db")
}

fn load_frame(path: &Path) -> Result<Frame> {
    let img = image::open(path).with_context(|| format!("opening {}", path.display()))?;
    let gray = img.to_luma8();
    let (w, h) = gray.dimensions();
    Frame::new(gray.into_raw(), w, h).with_context(|| format!("reading {}", path.display()))
}

fn open_store(db: Option<PathBuf>) -> Result<TemplateStore> {
    let path = db.unwrap_or_else(default_db_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    TemplateStore::open(&path).with_context(|| format!("opening store at {}", path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Enroll { identity, label, samples, images } => {
            let store = open_store(cli.db)?;
            let mut session = EnrollmentSession::new(EnrollmentConfig {
                samples_required: samples,
                ..EnrollmentConfig::default()
            });

            for path in &images {
                let frame = load_frame(path)?;
                match session.offer_frame(&frame)? {
                    SampleOutcome::Accepted { collected, required } => {
                        println!("{}: accepted ({collected}/{required})", path.display());
                    }
                    SampleOutcome::Rejected(reason) => {
                        println!("{}: rejected - {reason}", path.display());
                    }
                    SampleOutcome::Complete(encoding) => {
                        println!("{}: accepted ({samples}/{samples})", path.display());
                        let template = store.save_template(&identity, &label, &encoding)?;
                        store.record_auth(&identity, "face", "enrolled", &label)?;
                        println!("Enrolled {identity} as template {}", template.id);
                        return Ok(());
                    }
                }
            }

            bail!(
                "enrollment incomplete: {}/{} samples accepted from {} images",
                session.collected(),
                session.required(),
                images.len()
            );
        }
        Commands::Verify { threshold, image } => {
            let store = open_store(cli.db)?;
            let templates = store.load_all_templates()?;
            if templates.is_empty() {
                bail!("no enrolled templates");
            }

            let frame = load_frame(&image)?;
            let probe = FaceEncoder::default()
                .encode(&frame)
                .context("encoding probe image")?;

            let outcome = MatchingEngine::new().authenticate(&probe, &templates, threshold)?;
            store.record_auth(
                outcome.identity.as_deref().unwrap_or("unknown"),
                "face",
                if outcome.accepted { "accept" } else { "reject" },
                &format!("distance {:.4}", outcome.distance),
            )?;

            if let Some(identity) = &outcome.identity {
                println!(
                    "MATCH {identity} (distance {:.4}, confidence {:.2})",
                    outcome.distance, outcome.confidence
                );
            } else {
                println!(
                    "NO MATCH (best distance {:.4}, threshold {:.2})",
                    outcome.distance, threshold
                );
                std::process::exit(1);
            }
        }
        Commands::List => {
            let store = open_store(cli.db)?;
            let templates = store.list()?;
            if templates.is_empty() {
                println!("No templates enrolled");
            }
            for t in templates {
                println!("{}  {}  {}  {}", t.id, t.identity, t.label, t.created_at);
            }
        }
        Commands::Remove { id } => {
            let store = open_store(cli.db)?;
            if store.remove(&id)? {
                println!("Removed template {id}");
            } else {
                bail!("no template with id {id}");
            }
        }
        Commands::Status => {
            let store = open_store(cli.db)?;
            let templates = store.list()?;
            println!("Templates: {}", templates.len());
            let events = store.recent_auth_events(10)?;
            if !events.is_empty() {
                println!("Recent events:");
                for e in events {
                    println!("  {}  {}  {}  {}  {}", e.at, e.identity, e.method, e.outcome, e.detail);
                }
            }
        }
        Commands::Inspect { image } => {
            let frame = load_frame(&image)?;
            match FaceEncoder::default().locate(&frame) {
                Ok(region) => {
                    println!("{}", serde_json::to_string_pretty(&region)?);
                }
                Err(err) => {
                    println!("No face: {err}");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
