//! Result persistence: `results.json`, per-device step logs, CSV export

use std::path::{Path, PathBuf};

use action_flow::{CaptureHook, FlowError, ResultSink, StepDefinition, StepResult, TestResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use device_adapter::DeviceId;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

/// Where run artifacts land under `artifacts_root`.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    root: PathBuf,
    per_device: bool,
}

impl ArtifactLayout {
    /// `per_device` gives each device its own directory, for parallel runs.
    pub fn new(root: impl Into<PathBuf>, per_device: bool) -> Self {
        Self {
            root: root.into(),
            per_device,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn results_file(&self) -> PathBuf {
        self.root.join("results").join("results.json")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn device_dir(&self, device_id: &DeviceId) -> PathBuf {
        if self.per_device {
            self.root.join("devices").join(device_dir_name(device_id))
        } else {
            self.root.join("steps")
        }
    }
}

/// `192.168.1.5:5555` -> `192.168.1.5_5555`, `emulator-5554` -> `emulator_5554`
pub fn device_dir_name(device_id: &DeviceId) -> String {
    device_id.0.replace([':', '-'], "_")
}

/// Appends every finished test to the JSON array in `results.json`.
pub struct JsonResultsSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonResultsSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, result: &TestResult) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = read_results(&self.path).await.unwrap_or_else(|err| {
            warn!(path = %self.path.display(), "starting a fresh results file: {err:#}");
            Vec::new()
        });
        records.push(serde_json::to_value(result)?);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let body = serde_json::to_vec_pretty(&records)?;
        fs::write(&self.path, body)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}

#[async_trait]
impl ResultSink for JsonResultsSink {
    async fn record_step(&self, _test_id: &str, _device_id: &DeviceId, _step: &StepResult) {}

    async fn record_test(&self, result: &TestResult) {
        if let Err(err) = self.append(result).await {
            warn!(test_id = %result.test_id, "failed to persist test result: {err:#}");
        }
    }
}

async fn read_results(path: &Path) -> Result<Vec<serde_json::Value>> {
    match fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .with_context(|| format!("{} is not a JSON array", path.display())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(err).with_context(|| format!("Failed to read {}", path.display())),
    }
}

/// Reads a results file written by [`JsonResultsSink`].
pub async fn load_results(path: &Path) -> Result<Vec<TestResult>> {
    let bytes = fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("Failed to parse {}", path.display()))
}

#[derive(Serialize)]
struct StepLogLine<'a> {
    step_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    result: &'a StepResult,
}

/// Writes one JSON line per executed step into the device's artifact
/// directory, plus a `<step_id>_fail.json` dump for each failure.
pub struct StepLogHook {
    layout: ArtifactLayout,
    write_lock: Mutex<()>,
}

impl StepLogHook {
    pub fn new(layout: ArtifactLayout) -> Self {
        Self {
            layout,
            write_lock: Mutex::new(()),
        }
    }

    async fn append_line(&self, device_id: &DeviceId, line: &StepLogLine<'_>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let dir = self.layout.device_dir(device_id);
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let mut payload = serde_json::to_vec(line)?;
        payload.push(b'\n');
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("steps.jsonl"))
            .await?;
        file.write_all(&payload).await?;

        if line.error.is_some() {
            let dump = dir.join(format!("{}_fail.json", line.step_id));
            fs::write(&dump, serde_json::to_vec_pretty(line)?).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl CaptureHook for StepLogHook {
    async fn on_step_complete(&self, device_id: &DeviceId, step: &StepDefinition, result: &StepResult) {
        let line = StepLogLine {
            step_id: &step.step_id,
            error: None,
            result,
        };
        if let Err(err) = self.append_line(device_id, &line).await {
            warn!(device = %device_id, step_id = %step.step_id, "failed to write step log: {err:#}");
        }
    }

    async fn on_step_failure(
        &self,
        device_id: &DeviceId,
        step: &StepDefinition,
        result: &StepResult,
        error: &FlowError,
    ) {
        let line = StepLogLine {
            step_id: &step.step_id,
            error: Some(error.to_string()),
            result,
        };
        if let Err(err) = self.append_line(device_id, &line).await {
            warn!(device = %device_id, step_id = %step.step_id, "failed to write failure dump: {err:#}");
        }
    }
}

const CSV_HEADER: [&str; 13] = [
    "run_id",
    "test_id",
    "device_id",
    "backend",
    "test_status",
    "step_id",
    "step_type",
    "step_status",
    "attempts",
    "duration_ms",
    "healed_by",
    "error_kind",
    "error",
];

/// One row per step. Returns the number of rows written.
pub fn export_csv(results: &[TestResult], output: &Path) -> Result<usize> {
    let mut wtr = csv::Writer::from_path(output).context("Failed to create CSV writer")?;
    wtr.write_record(CSV_HEADER)
        .context("Failed to write CSV header")?;

    let mut rows = 0;
    for test in results {
        for step in test.steps() {
            let healed_by = step
                .healing
                .iter()
                .map(|h| h.strategy_used.as_str())
                .collect::<Vec<_>>()
                .join(";");
            let attempts = step.attempts.to_string();
            let duration_ms = step.duration_ms.to_string();
            wtr.write_record([
                test.run_id.as_str(),
                test.test_id.as_str(),
                test.device_id.as_str(),
                test.backend.as_str(),
                test.status.as_str(),
                step.step_id.as_str(),
                step.step_type.as_str(),
                step.status.as_str(),
                attempts.as_str(),
                duration_ms.as_str(),
                healed_by.as_str(),
                step.error_kind.as_deref().unwrap_or(""),
                step.error.as_deref().unwrap_or(""),
            ])
            .context("Failed to write CSV record")?;
            rows += 1;
        }
    }

    wtr.flush().context("Failed to flush CSV writer")?;
    Ok(rows)
}
