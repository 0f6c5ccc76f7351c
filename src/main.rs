#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, Once};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use rayon::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use joint_dependency::inference::changepoint::BayesianOnlineDetector;
use joint_dependency::learner::snapshot::IterationRow;
use joint_dependency::learner::{ActiveLearner, ChangepointProfile, RunOutcome};
use joint_dependency::planning::objective::ObjectiveKind;
use joint_dependency::planning::sampling::SamplingStrategy;
use joint_dependency::simulation::params::DEFAULT_DEMO_JOINTS;
use joint_dependency::simulation::spec_file::LockboxSpec;
use joint_dependency::simulation::{Lockbox, Mechanism, SimulatedExecutor};
use joint_dependency::ui::{draw_dashboard, DashboardState, ProgressEvent};
use joint_dependency::{LearnerConfig, LearnerError};

/// Learn which joints of a lockbox gate which others.
#[derive(Parser, Debug)]
#[command(name = "joint_dependency")]
#[command(version, about, long_about = None)]
struct Args {
    /// TOML file with learner settings; flags below override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// random, entropy, cross_entropy or heuristic_proximity
    #[arg(short, long)]
    objective: Option<String>,

    /// single_joint_move (large), boundary (small) or random_configuration
    #[arg(long, aliases = ["joint_state", "joint-state"])]
    sampler: Option<String>,

    /// Iterations per run
    #[arg(short, long)]
    queries: Option<usize>,

    /// Candidate actions per iteration
    #[arg(short, long)]
    samples: Option<usize>,

    /// Independent runs
    #[arg(short, long)]
    runs: Option<usize>,

    /// Worker threads for concurrent runs
    #[arg(short, long)]
    threads: Option<usize>,

    /// Estimate same-segment probabilities from a calibration sweep
    #[arg(short = 'c', long)]
    changepoints: bool,

    /// Use 3D joint coordinates for the distance prior
    #[arg(long)]
    use_3d_positions: bool,

    #[arg(long)]
    seed: Option<u64>,

    /// Directory receiving snapshots and the log file
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// TOML lockbox description; a demo chain is used otherwise
    #[arg(long, value_name = "FILE")]
    lockbox_file: Option<PathBuf>,

    /// Joints of the demo chain
    #[arg(long, default_value_t = DEFAULT_DEMO_JOINTS)]
    joints: usize,

    /// Drive a physical lockbox
    #[arg(long)]
    use_robot: bool,

    /// Plain log output instead of the dashboard
    #[arg(long)]
    no_tui: bool,

    /// Only sweep every joint and write `cp_profile_<date>.json`
    #[arg(long)]
    save_changepoint_profile: bool,
}

static INIT: Once = Once::new();

/// Initialise logging from `JOINT_DEPENDENCY_LOG`, defaulting to
/// `joint_dependency=info`. With a log file, output goes there instead of
/// stderr so it does not tear the dashboard.
fn init_tracing(log_file: Option<File>) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("JOINT_DEPENDENCY_LOG")
            .unwrap_or_else(|_| EnvFilter::new("joint_dependency=info"));
        let registry = tracing_subscriber::registry().with(filter);
        match log_file {
            Some(file) => registry
                .with(
                    fmt::layer()
                        .with_ansi(false)
                        .with_thread_ids(true)
                        .with_writer(Mutex::new(file)),
                )
                .init(),
            None => registry
                .with(fmt::layer().with_target(true).with_thread_ids(true))
                .init(),
        }
    });
}

fn load_config(args: &Args) -> Result<LearnerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str(&source).with_context(|| format!("parsing {}", path.display()))?
        }
        None => LearnerConfig::default(),
    };
    if let Some(objective) = &args.objective {
        config.objective = objective.parse::<ObjectiveKind>()?;
    }
    if let Some(sampler) = &args.sampler {
        config.sampler = sampler.parse::<SamplingStrategy>()?;
    }
    if let Some(queries) = args.queries {
        config.queries = queries;
    }
    if let Some(samples) = args.samples {
        config.samples = samples;
    }
    if let Some(runs) = args.runs {
        config.runs = runs;
    }
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir.clone_from(dir);
    }
    config.use_changepoints |= args.changepoints;
    config.use_3d_positions |= args.use_3d_positions;
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    // Every run derives its seed from one base.
    config.seed = Some(config.seed.unwrap_or_else(rand::random));
    config.validate()?;
    Ok(config)
}

fn load_lockbox(args: &Args, config: &LearnerConfig) -> Result<Lockbox> {
    if args.use_robot {
        return Err(LearnerError::InvalidConfig {
            reason: "no robot adapter is linked into this build; drop --use-robot".to_owned(),
        }
        .into());
    }
    match &args.lockbox_file {
        Some(path) => {
            let spec = LockboxSpec::load(path)?;
            if config.use_3d_positions && !spec.has_coordinates() {
                warn!(
                    path = %path.display(),
                    "not every joint has coordinates, distances fall back to joint order"
                );
            }
            Ok(Lockbox::from_spec(&spec)?)
        }
        None if args.joints == 0 => bail!("the demo lockbox needs at least one joint"),
        None => Ok(Lockbox::demo(args.joints)),
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn run_one(
    config: &LearnerConfig,
    lockbox: &Lockbox,
    detector: &BayesianOnlineDetector,
    run: usize,
    tx: &Sender<ProgressEvent>,
) -> Result<RunOutcome, LearnerError> {
    let _ = tx.send(ProgressEvent::Started { run });
    let report = |row: &IterationRow| {
        let _ = tx.send(ProgressEvent::Iteration {
            run,
            iteration: row.iteration,
            mean_entropy: mean(&row.entropies),
            mean_kl: mean(&row.kl_divergences),
        });
    };
    let result = (|| -> Result<RunOutcome, LearnerError> {
        let mut learner = ActiveLearner::new(
            config.clone(),
            SimulatedExecutor::new(lockbox.clone()),
            Box::new(config.sampler),
        )?
        .with_run_label(run)
        .with_detector(detector)
        .with_progress(report);
        let outcome = learner.run()?;
        info!(run, path = %learner.snapshot_path().display(), "snapshot written");
        Ok(outcome)
    })();

    let _ = tx.send(match &result {
        Ok(outcome) => ProgressEvent::Finished {
            run,
            status: outcome.status,
            iterations: outcome.iterations,
        },
        Err(e) => ProgressEvent::Failed {
            run,
            message: e.to_string(),
        },
    });
    result
}

/// Dispatches every run on a dedicated pool and returns the failures.
fn run_all(
    config: &LearnerConfig,
    lockbox: &Lockbox,
    tx: &Sender<ProgressEvent>,
) -> Result<Vec<(usize, LearnerError)>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads)
        .build()
        .context("building the run pool")?;
    let detector = BayesianOnlineDetector::default();

    let failures = pool.install(|| {
        (0..config.runs)
            .into_par_iter()
            .map_with(tx.clone(), |tx, run| {
                run_one(config, lockbox, &detector, run, tx)
                    .err()
                    .map(|e| (run, e))
            })
            .flatten()
            .collect()
    });
    Ok(failures)
}

/// Draws progress until the worker finishes or `q` is pressed. Returns
/// whether every run had finished when the dashboard closed.
fn run_dashboard(
    rx: &Receiver<ProgressEvent>,
    mut state: DashboardState,
    worker: &thread::JoinHandle<Result<Vec<(usize, LearnerError)>>>,
) -> io::Result<bool> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let tick_rate = Duration::from_millis(100);

    let result = (|| -> io::Result<bool> {
        loop {
            while let Ok(event) = rx.try_recv() {
                state.apply(event);
            }
            terminal.draw(|f| draw_dashboard(f, &state))?;

            if worker.is_finished() {
                while let Ok(event) = rx.try_recv() {
                    state.apply(event);
                }
                terminal.draw(|f| draw_dashboard(f, &state))?;
                return Ok(state.is_complete());
            }
            if event::poll(tick_rate)? {
                if let Event::Key(key) = event::read()? {
                    if key.code == KeyCode::Char('q') {
                        return Ok(state.is_complete());
                    }
                }
            }
        }
    })();

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    result
}

fn open_log_file(dir: &Path) -> Result<File> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join("joint_dependency.log");
    File::create(&path).with_context(|| format!("creating {}", path.display()))
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    let tui = !args.no_tui;
    init_tracing(if tui {
        Some(open_log_file(&config.output_dir)?)
    } else {
        None
    });
    let lockbox = load_lockbox(&args, &config)?;

    if args.save_changepoint_profile {
        let mut executor = SimulatedExecutor::new(lockbox);
        let profile =
            ChangepointProfile::record(&mut executor, &BayesianOnlineDetector::default())?;
        let path = profile.save(&config.output_dir)?;
        println!("{}", path.display());
        return Ok(());
    }

    info!(
        objective = %config.objective,
        sampler = %config.sampler,
        runs = config.runs,
        joints = lockbox.joints().len(),
        seed = ?config.seed,
        "starting"
    );

    let (tx, rx) = mpsc::channel();
    let failures = if tui {
        let state = DashboardState::new(
            format!("{} / {}", config.objective, config.sampler),
            config.runs,
            config.queries,
        );
        let worker = {
            let config = config.clone();
            thread::spawn(move || run_all(&config, &lockbox, &tx))
        };
        let complete = run_dashboard(&rx, state, &worker).context("drawing the dashboard")?;
        if !complete {
            info!("dashboard closed, waiting for remaining runs to finish");
            eprintln!("waiting for remaining runs to finish (snapshots keep being written)");
        }
        worker
            .join()
            .map_err(|_| anyhow::anyhow!("run worker panicked"))??
    } else {
        drop(rx);
        run_all(&config, &lockbox, &tx)?
    };

    for (run, e) in &failures {
        error!(run, error = %e, "run failed");
        eprintln!("run {run} failed: {e}");
    }
    if let Some((_, first)) = failures.into_iter().next() {
        return Err(first).context("at least one run failed");
    }
    Ok(())
}
