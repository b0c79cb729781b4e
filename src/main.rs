use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use lingua_live::audio::{CapturePipeline, PLAYBACK_SAMPLE_RATE, PlaybackScheduler, PlaybackUnit};
use lingua_live::{Config, Scenario, Session, Speaker};

/// lingua - practice conversations with a realtime AI tutor
#[derive(Parser)]
#[command(name = "lingua", version, about)]
struct Cli {
    /// Scenario id to start immediately (skips the picker)
    #[arg(short, long, env = "LINGUA_SCENARIO")]
    scenario: Option<String>,

    /// Path to the config file (defaults to the platform config dir)
    #[arg(long, env = "LINGUA_CONFIG")]
    config: Option<PathBuf>,

    /// Start with the microphone muted
    #[arg(long)]
    muted: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List the available scenarios
    ListScenarios,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,lingua_live=info",
        1 => "info,lingua_live=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::ListScenarios => {
                list_scenarios(&config);
                Ok(())
            }
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
        };
    }

    config.require_api_key()?;

    let scenario = match &cli.scenario {
        Some(id) => config
            .scenario(id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown scenario: {id} (try list-scenarios)"))?,
        None => pick_scenario(&config)?,
    };

    println!("── {} ({})", scenario.title, scenario.difficulty);
    println!("{}\n", scenario.description);

    let mut session = Session::new(config);
    if let Err(e) = session.start(&scenario).await {
        eprintln!("Connection failed. Check your microphone permissions and API key, then try again.");
        return Err(e.into());
    }
    if cli.muted {
        session.set_muted(true);
    }

    println!("Connected. Speak whenever you like; press Ctrl-C to hang up.\n");

    // Ctrl-C is the hang-up button
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(()).await;
        }
    });

    // The transcript panel: poll the append-only feed and print new items
    let feed = session.transcript_feed();
    let printer = tokio::spawn(async move {
        let mut seen = 0;
        let mut ticker = tokio::time::interval(Duration::from_millis(500));
        loop {
            ticker.tick().await;
            let items = feed.snapshot();
            for item in &items[seen..] {
                let who = match item.speaker {
                    Speaker::User => "you",
                    Speaker::Model => "tutor",
                };
                println!("[{}] {who}: {}", item.timestamp.format("%H:%M:%S"), item.text);
            }
            seen = items.len();
        }
    });

    let outcome = session.run_until(&mut shutdown_rx).await;
    printer.abort();

    let items = session.transcript_feed().len();
    println!("\nSession ended ({items} transcript items).");

    outcome?;
    Ok(())
}

fn list_scenarios(config: &Config) {
    for scenario in &config.scenarios {
        println!(
            "{:<20} {:<12} {}",
            scenario.id, scenario.difficulty, scenario.description
        );
    }
}

fn pick_scenario(config: &Config) -> anyhow::Result<Scenario> {
    let labels: Vec<String> = config
        .scenarios
        .iter()
        .map(|s| format!("{} ({}) - {}", s.title, s.difficulty, s.description))
        .collect();

    let choice = dialoguer::Select::new()
        .with_prompt("Choose a scenario")
        .items(&labels)
        .default(0)
        .interact()?;

    Ok(config.scenarios[choice].clone())
}

/// Meter the microphone for a few seconds
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    let mut capture = CapturePipeline::new()?;
    let mut frames = capture.start()?;
    let levels = capture.level_feed();

    println!("Capturing for {duration}s; speak into the microphone...");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(duration);
    loop {
        tokio::select! {
            () = tokio::time::sleep_until(deadline) => break,
            Some(frame) = frames.recv() => {
                let level = levels.snapshot();
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let bar = "#".repeat((level.rms * 200.0).min(50.0) as usize);
                println!("{:>6} samples  rms {:.3}  |{bar}", frame.samples.len(), level.rms);
            }
        }
    }

    capture.stop();
    println!("Done.");
    Ok(())
}

/// Play a short tone through the scheduler
#[allow(clippy::future_not_send, clippy::cast_precision_loss)]
async fn test_speaker() -> anyhow::Result<()> {
    let mut playback = PlaybackScheduler::new()?;
    playback.start()?;

    println!("Playing test tones...");

    // Two back-to-back tones exercise gapless scheduling
    for freq in [440.0f32, 660.0] {
        let samples: Vec<f32> = (0..PLAYBACK_SAMPLE_RATE / 2)
            .map(|i| {
                let t = i as f32 / PLAYBACK_SAMPLE_RATE as f32;
                (2.0 * std::f32::consts::PI * freq * t).sin() * 0.3
            })
            .collect();
        let duration = Duration::from_secs_f64(samples.len() as f64 / f64::from(PLAYBACK_SAMPLE_RATE));
        playback.enqueue(PlaybackUnit {
            samples,
            sample_rate: PLAYBACK_SAMPLE_RATE,
            duration,
        });
    }

    tokio::time::sleep(Duration::from_millis(1200)).await;
    playback.stop();
    println!("Done.");
    Ok(())
}
