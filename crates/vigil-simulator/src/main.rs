//! Desktop simulator for the vigil anomaly detector.
//!
//! Generates synthetic readings for one sensor on one device, classifies them
//! through `vigil-core` and renders the results on a subscriber thread.
//! Timestamps come from a simulated clock, so a full calibration day passes
//! in a few seconds.
//!
//! ```text
//! RUST_LOG=info vigil-simulator --sensor humidity --rate 1440 --count 3000
//! vigil-simulator --store journal --journal humidity.journal
//! vigil-simulator --profiles profiles.toml   # hot-reloaded while running
//! ```

mod generator;
mod profiles;
mod renderer;

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::{Parser, ValueEnum};
use log::{debug, error, info};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::NormalError;
use thiserror_no_std::Error;

use vigil_core::{
    AnomalyProfile, BoundsPolicy, ChannelSink, Classification, ConfigError, DetectError,
    Detector, DetectorConfig, EntityKey, InputError, JournalStore, Phase, ProfileSet,
    ProfileStore, ResidentWindow, ResultChannel, Sample, SensorProfile, SharedProfiles,
    StoreError, Timestamp, WindowStore, ZeroMeanPolicy,
};

use crate::generator::Generator;
use crate::profiles::ProfileWatcher;
use crate::renderer::Renderer;

/// Results of the running detector, consumed by the renderer thread
static RESULTS: ResultChannel = ResultChannel::new();

#[derive(Error, Debug)]
pub enum SimError {
    #[error("i/o error: {0}")]
    Io(std::io::Error),
    #[error("malformed profile file: {0}")]
    Toml(toml::de::Error),
    #[error("{0}")]
    Config(ConfigError),
    #[error("{0}")]
    Input(InputError),
    #[error("{0}")]
    Store(StoreError),
    #[error("no sensor model for `{0}`")]
    UnknownSensor(String),
    #[error("result channel: {0}")]
    Channel(String),
    #[error("invalid sensor model: {0}")]
    Model(NormalError),
}

impl From<std::io::Error> for SimError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<toml::de::Error> for SimError {
    fn from(err: toml::de::Error) -> Self {
        Self::Toml(err)
    }
}

impl From<ConfigError> for SimError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<InputError> for SimError {
    fn from(err: InputError) -> Self {
        Self::Input(err)
    }
}

impl From<StoreError> for SimError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<NormalError> for SimError {
    fn from(err: NormalError) -> Self {
        Self::Model(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PolicyArg {
    Linear,
    RelativeExponential,
}

impl From<PolicyArg> for BoundsPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Linear => BoundsPolicy::Linear,
            PolicyArg::RelativeExponential => BoundsPolicy::RelativeExponential,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreArg {
    /// Ring buffers in memory
    Resident,
    /// Append-only record journal
    Journal,
}

#[derive(Parser, Debug)]
#[command(name = "vigil-simulator")]
#[command(
    about = "Feed synthetic sensor telemetry through the vigil anomaly detector",
    long_about = None
)]
#[command(version)]
struct Args {
    /// Sensor profile to simulate
    #[arg(short, long, default_value = "temp")]
    sensor: String,

    /// Unit label, defaults to the sensor model's unit
    #[arg(short, long)]
    unit: Option<String>,

    /// Device identifier stamped on every reading
    #[arg(short, long, env = "VIGIL_DEVICE", default_value = "sim-device")]
    device: String,

    /// Expected samples per day
    #[arg(short, long, default_value_t = 1440)]
    rate: u32,

    /// Window span in seconds
    #[arg(long, default_value_t = 86_400)]
    window_span: u32,

    /// Manual lower limit (requires --upper)
    #[arg(long, requires = "upper", allow_hyphen_values = true)]
    lower: Option<f64>,

    /// Manual upper limit (requires --lower)
    #[arg(long, requires = "lower", allow_hyphen_values = true)]
    upper: Option<f64>,

    /// Bounds policy for auto mode
    #[arg(long, value_enum, default_value = "linear")]
    policy: PolicyArg,

    /// Use linear bounds when the relative-exponential policy meets a zero mean
    #[arg(long)]
    zero_mean_fallback: bool,

    /// Window store realization
    #[arg(long, value_enum, default_value = "resident")]
    store: StoreArg,

    /// Journal file to replay at start and append to (journal store only)
    #[arg(long, env = "VIGIL_JOURNAL")]
    journal: Option<PathBuf>,

    /// TOML profile file, polled for changes; overrides --rate, --window-span and limits
    #[arg(short, long, env = "VIGIL_PROFILES")]
    profiles: Option<PathBuf>,

    /// Share of calibrated readings drawn from the anomaly range
    #[arg(long, default_value_t = 0.05)]
    anomaly_ratio: f64,

    /// Wall-clock pause between samples in milliseconds
    #[arg(long, default_value_t = 2)]
    interval_ms: u64,

    /// Number of samples to generate, 0 runs until interrupted
    #[arg(short, long, default_value_t = 3000)]
    count: u64,

    /// Random seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
}

/// The window realization chosen on the command line.
enum Backend {
    Resident(ResidentWindow),
    Journal(JournalStore),
}

impl WindowStore for Backend {
    fn window(
        &self,
        key: &EntityKey,
        floor: Timestamp,
        current: Timestamp,
    ) -> Result<Vec<f64>, StoreError> {
        match self {
            Self::Resident(store) => store.window(key, floor, current),
            Self::Journal(store) => store.window(key, floor, current),
        }
    }

    fn record(
        &mut self,
        sample: &Sample,
        classification: Classification,
        capacity: usize,
    ) -> Result<(), StoreError> {
        match self {
            Self::Resident(store) => store.record(sample, classification, capacity),
            Self::Journal(store) => store.record(sample, classification, capacity),
        }
    }

    fn clear(&mut self, key: &EntityKey) -> Result<(), StoreError> {
        match self {
            Self::Resident(store) => store.clear(key),
            Self::Journal(store) => store.clear(key),
        }
    }
}

/// Journal persisted to a file; new journal bytes are appended after every
/// sample.
struct JournalFile {
    file: File,
}

impl JournalFile {
    fn open(path: &Path) -> Result<(JournalStore, Self), SimError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let mut store = JournalStore::from_bytes(&bytes)?;
        // Already on disk
        store.drain_bytes();
        info!(
            "Replayed {} records ({} bytes) from {}",
            store.len(),
            bytes.len(),
            path.display()
        );

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok((store, Self { file }))
    }

    /// Append the journal's pending bytes and release them from memory.
    fn sync(&mut self, store: &mut JournalStore) -> Result<(), SimError> {
        let fresh = store.drain_bytes();
        if !fresh.is_empty() {
            self.file.write_all(&fresh)?;
        }
        Ok(())
    }
}

/// Profiles built from the command line when no profile file is given
fn cli_profiles(args: &Args) -> Result<ProfileSet, SimError> {
    let sensor = SensorProfile::new(&args.sensor)?;
    let profile = match (args.lower, args.upper) {
        (Some(lower), Some(upper)) => AnomalyProfile::manual(args.window_span, lower, upper),
        _ => AnomalyProfile::auto(args.window_span),
    };

    Ok(ProfileSet::builtin(args.rate).with_sensor(sensor, profile))
}

fn now_ms() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as Timestamp
}

fn run(args: &Args) -> Result<(), SimError> {
    let model = generator::model(&args.sensor)
        .ok_or_else(|| SimError::UnknownSensor(args.sensor.clone()))?;
    let key = EntityKey::new(&args.device, &args.sensor)?;

    let initial = match &args.profiles {
        Some(path) => profiles::load(path)?,
        None => cli_profiles(args)?,
    };
    let shared = SharedProfiles::new(initial)?;
    let mut watcher = args.profiles.clone().map(ProfileWatcher::new);

    let (backend, mut journal_file) = match (args.store, &args.journal) {
        (StoreArg::Resident, _) => (Backend::Resident(ResidentWindow::new()), None),
        (StoreArg::Journal, None) => (Backend::Journal(JournalStore::new()), None),
        (StoreArg::Journal, Some(path)) => {
            let (store, file) = JournalFile::open(path)?;
            (Backend::Journal(store), Some(file))
        }
    };

    // Continue after a replayed journal so old records stay in the past
    let mut start = now_ms();
    if let Backend::Journal(store) = &backend {
        if let Some(latest) = store.latest(&key) {
            start = start.max(latest + 1);
        }
    }

    let rate = shared.frequency_profile(&key.sensor)?.samples_per_day;
    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut generator =
        Generator::new(model, &args.device, rng, start, rate, args.anomaly_ratio)?;
    if let Some(unit) = &args.unit {
        generator = generator.with_unit(unit);
    }

    let renderer = Renderer::spawn(&RESULTS);
    let publisher = RESULTS
        .publisher()
        .map_err(|e| SimError::Channel(format!("{:?}", e)))?;
    let config = DetectorConfig {
        policy: args.policy.into(),
        zero_mean: if args.zero_mean_fallback {
            ZeroMeanPolicy::FallBackToLinear
        } else {
            ZeroMeanPolicy::Reject
        },
    };
    let mut detector =
        Detector::new(backend, &shared, ChannelSink::new(publisher)).with_config(config);

    info!(
        "Simulating {} at {}/day, one sample every {} simulated ms ({} bounds)",
        key,
        rate,
        generator.period_ms(),
        config.policy.label()
    );

    let interval = Duration::from_millis(args.interval_ms);
    let mut injected = 0u64;
    let mut missed = 0u64;
    let mut rejected = 0u64;
    let mut generated = 0u64;

    while args.count == 0 || generated < args.count {
        if let Some(watcher) = watcher.as_mut() {
            watcher.poll(&shared);
        }

        let calibrated = matches!(detector.phase(&key, generator.clock()), Ok(Phase::Ready));
        let reading = generator.next_reading(calibrated);
        let sample = Sample::try_from(reading.reading)?;

        match detector.classify(&sample) {
            Ok(result) => {
                if reading.injected {
                    injected += 1;
                    if !result.is_anomalous() {
                        missed += 1;
                        debug!(
                            "Injected {:.3} passed as {:?}",
                            result.value, result.classification
                        );
                    }
                }
            }
            Err(DetectError::StoreUnavailable(e)) => return Err(e.into()),
            // Logged by the detector; the run goes on
            Err(_) => rejected += 1,
        }

        if let (Some(file), Backend::Journal(store)) =
            (journal_file.as_mut(), detector.store_mut())
        {
            file.sync(store)?;
        }

        generated += 1;
        if !interval.is_zero() {
            thread::sleep(interval);
        }
    }

    let summary = renderer.finish();
    info!(
        "Generated {} samples: {} injected anomalies, {} not flagged, {} rejected",
        generated, injected, missed, rejected
    );
    info!(
        "Detector verdicts: {} anomalous, {} normal, {} calibrating",
        summary.anomalous, summary.normal, summary.calibrating
    );

    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    info!("Starting vigil simulator");

    if let Err(e) = run(&args) {
        error!("{}", e);
        std::process::exit(1);
    }

    info!("Simulator exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["vigil-simulator"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_cli_defaults() {
        let args = args(&[]);
        assert_eq!(args.sensor, "temp");
        assert_eq!(args.rate, 1440);
        assert_eq!(args.policy, PolicyArg::Linear);
        assert_eq!(args.store, StoreArg::Resident);
    }

    #[test]
    fn test_manual_limits_from_cli() {
        let args = args(&["--sensor", "humidity", "--lower", "30", "--upper", "60"]);
        let profiles = cli_profiles(&args).unwrap();
        let sensor = SensorProfile::new("humidity").unwrap();

        assert_eq!(
            profiles.anomaly_profile(&sensor).unwrap().manual_limits(),
            Some((30.0, 60.0))
        );
    }

    #[test]
    fn test_inverted_cli_limits_rejected() {
        let args = args(&["--lower", "60", "--upper", "30"]);
        let profiles = cli_profiles(&args).unwrap();
        assert!(matches!(
            SharedProfiles::new(profiles),
            Err(ConfigError::InvertedLimits { .. })
        ));
    }

    #[test]
    fn test_journal_file_round_trip() {
        let path = std::env::temp_dir().join(format!("vigil-journal-{}.bin", std::process::id()));
        let _ = fs::remove_file(&path);
        let key = EntityKey::new("sim-1", "temp").unwrap();

        {
            let (mut store, mut file) = JournalFile::open(&path).unwrap();
            for ts in 0..3 {
                let sample = Sample::new(
                    key.clone(),
                    ts,
                    30.0,
                    vigil_core::Unit::new("°C").unwrap(),
                )
                .unwrap();
                store
                    .record(&sample, Classification::Calibrating, 60)
                    .unwrap();
                file.sync(&mut store).unwrap();
                assert!(store.as_bytes().is_empty());
            }
        }

        let (replayed, _) = JournalFile::open(&path).unwrap();
        assert_eq!(replayed.len(), 3);
        assert_eq!(replayed.latest(&key), Some(2));

        fs::remove_file(&path).unwrap();
    }
}
