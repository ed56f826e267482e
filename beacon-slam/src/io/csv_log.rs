//! CSV measurement logs and estimate output.
//!
//! A log directory holds up to three input files:
//!
//! | File        | Columns                         |
//! |-------------|---------------------------------|
//! | `motion.csv`| `t,x,y,z`                       |
//! | `range.csv` | `t,beacon,range[,std_range]`    |
//! | `rssi.csv`  | `t,beacon,rssi`                 |
//!
//! and the replay writes `tag.csv` (`t,x,y,z,theta`) and `beacon.csv`
//! (`beacon,t,x,y,z`) next to them.

use std::fs::File;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, Writer};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::types::{BeaconEstimate, TagEstimate};
use crate::error::{LocalizeError, Result};

/// Odometry file name.
pub const MOTION_FILE: &str = "motion.csv";
/// Range file name.
pub const RANGE_FILE: &str = "range.csv";
/// RSSI file name.
pub const RSSI_FILE: &str = "rssi.csv";
/// Tag estimate output file name.
pub const TAG_FILE: &str = "tag.csv";
/// Beacon estimate output file name.
pub const BEACON_FILE: &str = "beacon.csv";

/// One row of `motion.csv`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionRecord {
    pub t: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// One row of `range.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeRecord {
    pub t: f64,
    pub beacon: String,
    pub range: f64,
    /// Missing or empty means the replay default.
    #[serde(default)]
    pub std_range: Option<f64>,
}

/// One row of `rssi.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RssiRecord {
    pub t: f64,
    pub beacon: String,
    pub rssi: i32,
}

/// One row of `tag.csv`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TagRecord {
    pub t: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub theta: f64,
}

impl From<&TagEstimate> for TagRecord {
    fn from(est: &TagEstimate) -> Self {
        Self {
            t: est.t,
            x: est.x,
            y: est.y,
            z: est.z,
            theta: est.theta,
        }
    }
}

/// One row of `beacon.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconRecord {
    pub beacon: String,
    pub t: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl BeaconRecord {
    pub fn new(beacon: impl Into<String>, est: &BeaconEstimate) -> Self {
        Self {
            beacon: beacon.into(),
            t: est.t,
            x: est.x,
            y: est.y,
            z: est.z,
        }
    }
}

/// A timestamped input from any of the three streams.
#[derive(Debug, Clone, PartialEq)]
pub enum Measurement {
    Motion(MotionRecord),
    Range(RangeRecord),
    Rssi(RssiRecord),
}

impl Measurement {
    /// Timestamp in seconds.
    pub fn t(&self) -> f64 {
        match self {
            Measurement::Motion(r) => r.t,
            Measurement::Range(r) => r.t,
            Measurement::Rssi(r) => r.t,
        }
    }

    /// Order among simultaneous measurements: radio events first.
    fn rank(&self) -> u8 {
        match self {
            Measurement::Range(_) => 0,
            Measurement::Rssi(_) => 1,
            Measurement::Motion(_) => 2,
        }
    }
}

/// All measurements of a log directory merged into time order.
#[derive(Debug, Clone, Default)]
pub struct MeasurementLog {
    measurements: Vec<Measurement>,
}

impl MeasurementLog {
    /// Merge three streams.
    ///
    /// The sort is stable, so rows with equal timestamps and kind keep
    /// their file order.
    pub fn from_records(
        motion: Vec<MotionRecord>,
        range: Vec<RangeRecord>,
        rssi: Vec<RssiRecord>,
    ) -> Self {
        let mut measurements: Vec<Measurement> = motion
            .into_iter()
            .map(Measurement::Motion)
            .chain(range.into_iter().map(Measurement::Range))
            .chain(rssi.into_iter().map(Measurement::Rssi))
            .collect();
        measurements.sort_by(|a, b| {
            a.t()
                .total_cmp(&b.t())
                .then_with(|| a.rank().cmp(&b.rank()))
        });
        Self { measurements }
    }

    /// Read every input file present in `dir`.
    ///
    /// Missing files count as empty streams; a directory with none of them
    /// is an error.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let motion = read_optional::<MotionRecord>(&dir.join(MOTION_FILE))?;
        let range = read_optional::<RangeRecord>(&dir.join(RANGE_FILE))?;
        let rssi = read_optional::<RssiRecord>(&dir.join(RSSI_FILE))?;

        if motion.is_none() && range.is_none() && rssi.is_none() {
            return Err(LocalizeError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!(
                    "no {}, {} or {} in {}",
                    MOTION_FILE,
                    RANGE_FILE,
                    RSSI_FILE,
                    dir.display()
                ),
            )));
        }

        let log = Self::from_records(
            motion.unwrap_or_default(),
            range.unwrap_or_default(),
            rssi.unwrap_or_default(),
        );
        log::info!(
            "Loaded {} measurements from {}",
            log.len(),
            dir.display()
        );
        Ok(log)
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    /// Measurements in replay order.
    pub fn iter(&self) -> impl Iterator<Item = &Measurement> {
        self.measurements.iter()
    }
}

/// Read all records of a headered CSV file.
pub fn read_records<R: DeserializeOwned>(path: &Path) -> Result<Vec<R>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_path(path)?;
    let mut records = Vec::new();
    for row in reader.deserialize() {
        records.push(row?);
    }
    Ok(records)
}

/// Write records with a header row, replacing the file.
pub fn write_records<R: Serialize>(path: &Path, records: &[R]) -> Result<()> {
    let mut writer = Writer::from_path(path)?;
    for r in records {
        writer.serialize(r)?;
    }
    writer.flush()?;
    Ok(())
}

fn read_optional<R: DeserializeOwned>(path: &Path) -> Result<Option<Vec<R>>> {
    if !path.exists() {
        log::debug!("{} not present, skipping", path.display());
        return Ok(None);
    }
    read_records(path).map(Some)
}

/// Streams tag estimates to `tag.csv` and writes `beacon.csv` at the end.
pub struct EstimateWriter {
    tag: Writer<File>,
    beacon_path: PathBuf,
    rows: usize,
}

impl EstimateWriter {
    /// Create both output files in `dir`.
    pub fn create<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            tag: Writer::from_path(dir.join(TAG_FILE))?,
            beacon_path: dir.join(BEACON_FILE),
            rows: 0,
        })
    }

    /// Append one tag estimate.
    pub fn write_tag(&mut self, estimate: &TagEstimate) -> Result<()> {
        self.tag.serialize(TagRecord::from(estimate))?;
        self.rows += 1;
        Ok(())
    }

    /// Tag rows written so far.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Write the final beacon estimates and flush everything.
    pub fn finish<'a, I>(mut self, beacons: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, BeaconEstimate)>,
    {
        self.tag.flush()?;
        let records: Vec<BeaconRecord> = beacons
            .into_iter()
            .map(|(name, est)| BeaconRecord::new(name, &est))
            .collect();
        write_records(&self.beacon_path, &records)
    }
}

impl std::fmt::Debug for EstimateWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EstimateWriter")
            .field("beacon_path", &self.beacon_path)
            .field("rows", &self.rows)
            .finish()
    }
}
