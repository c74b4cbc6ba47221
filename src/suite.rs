//! Suite loading
//!
//! A suite directory holds:
//! - `test_cases/<TEST_ID>.yaml`: metadata plus the ordered `test_steps`
//! - `steps/<file>.yaml`: shared step definitions keyed by `step_id`
//! - `locators/*locators.yaml`: locator files, merged into one catalog
//!
//! A test step may carry its own `action`/`parameters`, which take
//! precedence over the shared definition.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use action_flow::{StepConfigs, StepDefinition, StepKind, TestCase};
use action_locator::LocatorCatalog;
use anyhow::{anyhow, bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

pub const TEST_CASES_DIR: &str = "test_cases";
pub const STEPS_DIR: &str = "steps";
pub const LOCATORS_DIR: &str = "locators";
const DEFAULT_STEP_FILE: &str = "base_steps.yaml";

static TEST_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid regex"));

#[derive(Debug, Deserialize)]
struct RawTestCase {
    #[serde(default)]
    test_id: Option<String>,
    #[serde(default)]
    test_metadata: RawMetadata,
    #[serde(default = "default_step_file")]
    step_file: String,
    #[serde(default)]
    test_steps: Vec<RawStepRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMetadata {
    name: String,
    description: String,
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawStepRef {
    step_id: String,
    #[serde(default)]
    configs: StepConfigs,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    parameters: Option<Value>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawStep {
    action: String,
    #[serde(default)]
    parameters: Value,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
}

type StepFile = BTreeMap<String, RawStep>;

fn default_step_file() -> String {
    DEFAULT_STEP_FILE.to_string()
}

/// A loaded, validated suite.
#[derive(Debug)]
pub struct Suite {
    pub root: PathBuf,
    pub catalog: Arc<LocatorCatalog>,
    pub tests: Vec<Arc<TestCase>>,
}

/// Reads suite files, caching step files shared between tests.
pub struct SuiteLoader {
    root: PathBuf,
    step_files: HashMap<String, StepFile>,
}

impl SuiteLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            step_files: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Test ids ordered by the first number in the id, then by name.
    pub fn test_ids(&self) -> Result<Vec<String>> {
        let dir = self.root.join(TEST_CASES_DIR);
        let entries = fs::read_dir(&dir)
            .with_context(|| format!("Failed to read test case directory {}", dir.display()))?;

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if is_yaml(&path) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort_by_key(|id| (test_number(id), id.clone()));
        Ok(ids)
    }

    /// Every `*locators.yaml` / `*locators.yml` file, merged. A key defined
    /// in two files is an error.
    pub fn load_locators(&self) -> Result<LocatorCatalog> {
        let dir = self.root.join(LOCATORS_DIR);
        let mut files: Vec<PathBuf> = fs::read_dir(&dir)
            .with_context(|| format!("Failed to read locator directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.ends_with("locators.yaml") || n.ends_with("locators.yml"))
            })
            .collect();
        files.sort();

        let mut catalog = LocatorCatalog::new();
        for path in files {
            let file = LocatorCatalog::from_path(&path)
                .with_context(|| format!("Invalid locator file {}", path.display()))?;
            if let Some(clash) = file.iter().find(|spec| catalog.contains(&spec.key)) {
                bail!(
                    "Duplicate locator key '{}' found in {}",
                    clash.key,
                    path.display()
                );
            }
            debug!(path = %path.display(), locators = file.len(), "Loaded locator file");
            catalog.extend(file);
        }
        Ok(catalog)
    }

    pub fn load_test(&mut self, test_id: &str) -> Result<TestCase> {
        let path = self.root.join(TEST_CASES_DIR).join(format!("{test_id}.yaml"));
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read test case {}", path.display()))?;
        let parsed: RawTestCase = serde_yaml::from_str(&raw)
            .with_context(|| format!("Failed to parse test case {}", path.display()))?;

        let step_file = self.step_file(&parsed.step_file)?.clone();
        let mut steps = Vec::with_capacity(parsed.test_steps.len());
        for step_ref in parsed.test_steps {
            steps.push(build_step(step_ref, &step_file).with_context(|| {
                format!("Invalid step in test case {}", path.display())
            })?);
        }

        let mut test = TestCase::new(parsed.test_id.unwrap_or_else(|| test_id.to_string()), steps);
        test.name = parsed.test_metadata.name;
        test.description = parsed.test_metadata.description;
        test.tags = parsed.test_metadata.tags;
        Ok(test)
    }

    /// Loads the selected tests (all when `selection` is empty) and
    /// validates each against the merged locator catalog.
    pub fn load_suite(&mut self, selection: &[String]) -> Result<Suite> {
        let catalog = self.load_locators()?;
        let ids = if selection.is_empty() {
            self.test_ids()?
        } else {
            selection.to_vec()
        };

        let mut tests = Vec::with_capacity(ids.len());
        for id in &ids {
            let test = self.load_test(id)?;
            test.validate(&catalog)
                .with_context(|| format!("Test case '{id}' failed validation"))?;
            tests.push(Arc::new(test));
        }

        info!(
            root = %self.root.display(),
            tests = tests.len(),
            locators = catalog.len(),
            "Loaded suite"
        );
        Ok(Suite {
            root: self.root.clone(),
            catalog: Arc::new(catalog),
            tests,
        })
    }

    fn step_file(&mut self, name: &str) -> Result<&StepFile> {
        if !self.step_files.contains_key(name) {
            let path = self.root.join(STEPS_DIR).join(name);
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read step file {}", path.display()))?;
            let parsed: StepFile = serde_yaml::from_str(&raw)
                .with_context(|| format!("Failed to parse step file {}", path.display()))?;
            self.step_files.insert(name.to_string(), parsed);
        }
        self.step_files
            .get(name)
            .ok_or_else(|| anyhow!("step file '{name}' not loaded"))
    }
}

fn build_step(step_ref: RawStepRef, step_file: &StepFile) -> Result<StepDefinition> {
    let shared = step_file.get(&step_ref.step_id);
    let action = match (&step_ref.action, shared) {
        (Some(action), _) => action.clone(),
        (None, Some(shared)) => shared.action.clone(),
        (None, None) => bail!(
            "step '{}' has no inline action and no shared definition",
            step_ref.step_id
        ),
    };
    let parameters = step_ref
        .parameters
        .or_else(|| shared.map(|s| s.parameters.clone()))
        .unwrap_or(Value::Null);

    let kind = StepKind::parse(&step_ref.step_id, &action, &parameters)?;
    let name = step_ref
        .name
        .or_else(|| shared.map(|s| s.name.clone()))
        .unwrap_or_default();
    let description = step_ref
        .description
        .or_else(|| shared.map(|s| s.description.clone()))
        .unwrap_or_default();

    Ok(StepDefinition::new(step_ref.step_id, kind)
        .with_name(name)
        .with_description(description)
        .with_configs(step_ref.configs))
}

fn test_number(id: &str) -> u64 {
    TEST_NUMBER
        .find(id)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(u64::MAX)
}

fn is_yaml(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == "yaml" || e == "yml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_primitives::ActionSpec;
    use tempfile::TempDir;

    fn write(dir: &Path, relative: &str, content: &str) {
        let path = dir.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn suite() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "locators/login_locators.yaml",
            r#"
login_button:
  primary: { type: id, value: "com.app:id/login" }
  fallback_1: { type: text, value: "Log in" }
"#,
        );
        write(
            dir.path(),
            "locators/home_locators.yml",
            r#"
welcome_banner:
  primary: { type: id, value: "com.app:id/welcome" }
"#,
        );
        write(dir.path(), "locators/notes.yaml", "not: [a, locator, file");
        write(
            dir.path(),
            "steps/base_steps.yaml",
            r#"
open_app:
  action: launch_app
  name: Open app
  parameters: { app_package: com.app, force_stop: true }
tap_login:
  action: click
  name: Tap login
  parameters: { locator_key: login_button }
see_welcome:
  action: element_appears
  parameters: { locator_key: welcome_banner }
"#,
        );
        write(
            dir.path(),
            "test_cases/TC010.yaml",
            r#"
test_metadata: { name: Late test }
test_steps:
  - step_id: open_app
"#,
        );
        write(
            dir.path(),
            "test_cases/TC002.yaml",
            r#"
test_metadata:
  name: Login
  description: Logs in and sees the banner
  tags: [smoke]
test_steps:
  - step_id: open_app
  - step_id: tap_login
    configs: { retry_attempts: 2, blocking: false }
  - step_id: see_welcome
    configs: { wait_timeout: 5000 }
  - step_id: go_back
    action: press_back
"#,
        );
        dir
    }

    #[test]
    fn orders_tests_by_number() {
        let dir = suite();
        let loader = SuiteLoader::new(dir.path());
        assert_eq!(loader.test_ids().unwrap(), vec!["TC002", "TC010"]);
    }

    #[test]
    fn merges_locator_files_only() {
        let dir = suite();
        let catalog = SuiteLoader::new(dir.path()).load_locators().unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.contains("login_button"));
        assert!(catalog.contains("welcome_banner"));
    }

    #[test]
    fn duplicate_locator_keys_are_rejected() {
        let dir = suite();
        write(
            dir.path(),
            "locators/other_locators.yaml",
            "login_button:\n  primary: { type: id, value: dup }\n",
        );
        let err = SuiteLoader::new(dir.path()).load_locators().unwrap_err();
        assert!(err.to_string().contains("Duplicate locator key 'login_button'"));
    }

    #[test]
    fn builds_steps_from_shared_and_inline_definitions() {
        let dir = suite();
        let mut loader = SuiteLoader::new(dir.path());
        let test = loader.load_test("TC002").unwrap();

        assert_eq!(test.test_id, "TC002");
        assert_eq!(test.tags, vec!["smoke"]);
        assert_eq!(test.steps.len(), 4);
        assert_eq!(test.steps[0].name, "Open app");
        assert_eq!(test.steps[1].configs.retry_attempts, Some(2));
        assert_eq!(test.steps[1].configs.blocking, Some(false));
        assert_eq!(test.steps[1].locator_key(), Some("login_button"));
        assert_eq!(test.steps[2].kind.name(), "element_appears");
        assert!(matches!(
            &test.steps[3].kind,
            StepKind::Action(ActionSpec::PressBack)
        ));
    }

    #[test]
    fn load_suite_validates_locator_references() {
        let dir = suite();
        write(
            dir.path(),
            "test_cases/TC003.yaml",
            r#"
test_steps:
  - step_id: tap_missing
    action: click
    parameters: { locator_key: nowhere }
"#,
        );
        let mut loader = SuiteLoader::new(dir.path());
        let err = loader.load_suite(&[]).unwrap_err();
        assert!(format!("{err:#}").contains("unknown locator 'nowhere'"));

        let suite = loader.load_suite(&["TC002".to_string()]).unwrap();
        assert_eq!(suite.tests.len(), 1);
        assert_eq!(suite.catalog.len(), 2);
    }

    #[test]
    fn unknown_shared_step_is_an_error() {
        let dir = suite();
        write(
            dir.path(),
            "test_cases/TC004.yaml",
            "test_steps:\n  - step_id: does_not_exist\n",
        );
        let err = SuiteLoader::new(dir.path()).load_test("TC004").unwrap_err();
        assert!(format!("{err:#}").contains("no inline action"));
    }
}
