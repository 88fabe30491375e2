//! Toolchain detection.
//!
//! Inspects a working directory for manifest files in a fixed priority order
//! and maps the winning package manager onto its install/build/lint/test/audit
//! commands. Deterministic and offline: the only file content read is Node's
//! `scripts` table, to decide which of build/lint/test exist.

use std::collections::BTreeSet;
use std::path::Path;

use bounty_vet_domain::{ProjectDetection, ProjectType, StageName};
use tracing::warn;

use crate::error::DetectError;

/// Package managers and build tools the detector can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Bun,
    Pnpm,
    Yarn,
    Npm,
    Cargo,
    Go,
    Poetry,
    Uv,
    Pip,
    Maven,
    Gradle,
    Bundler,
}

impl PackageManager {
    pub fn name(&self) -> &'static str {
        match self {
            PackageManager::Bun => "bun",
            PackageManager::Pnpm => "pnpm",
            PackageManager::Yarn => "yarn",
            PackageManager::Npm => "npm",
            PackageManager::Cargo => "cargo",
            PackageManager::Go => "go",
            PackageManager::Poetry => "poetry",
            PackageManager::Uv => "uv",
            PackageManager::Pip => "pip",
            PackageManager::Maven => "maven",
            PackageManager::Gradle => "gradle",
            PackageManager::Bundler => "bundler",
        }
    }

    pub fn project_type(&self) -> ProjectType {
        match self {
            PackageManager::Bun | PackageManager::Pnpm | PackageManager::Yarn | PackageManager::Npm => {
                ProjectType::Node
            }
            PackageManager::Cargo => ProjectType::Rust,
            PackageManager::Go => ProjectType::Go,
            PackageManager::Poetry | PackageManager::Uv | PackageManager::Pip => ProjectType::Python,
            PackageManager::Maven | PackageManager::Gradle => ProjectType::Java,
            PackageManager::Bundler => ProjectType::Ruby,
        }
    }
}

/// Concrete commands for one package manager.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Toolchain {
    pub install: Option<String>,
    pub build: Option<String>,
    pub lint: Option<String>,
    pub test: Option<String>,
    pub audit: Option<String>,
}

/// Facts about the directory that refine the command table.
#[derive(Debug, Clone, Default)]
struct Facts {
    manifest: &'static str,
    /// Declared `package.json` scripts.
    scripts: BTreeSet<String>,
    has_package_lock: bool,
    has_gradle_wrapper: bool,
}

fn cmd(s: &str) -> Option<String> {
    Some(s.to_string())
}

/// The type → command mapping table.
fn toolchain(pm: PackageManager, facts: &Facts) -> Toolchain {
    let script = |name: &str, line: String| facts.scripts.contains(name).then_some(line);

    match pm {
        PackageManager::Bun => Toolchain {
            install: cmd("bun install"),
            build: script("build", "bun run build".into()),
            lint: script("lint", "bun run lint".into()),
            test: script("test", "bun run test".into()),
            audit: cmd("bun audit --json"),
        },
        PackageManager::Pnpm => Toolchain {
            install: cmd("pnpm install --frozen-lockfile"),
            build: script("build", "pnpm run build".into()),
            lint: script("lint", "pnpm run lint".into()),
            test: script("test", "pnpm test".into()),
            audit: cmd("pnpm audit --json"),
        },
        PackageManager::Yarn => Toolchain {
            install: cmd("yarn install --frozen-lockfile"),
            build: script("build", "yarn build".into()),
            lint: script("lint", "yarn lint".into()),
            test: script("test", "yarn test".into()),
            audit: cmd("yarn audit --json"),
        },
        PackageManager::Npm => Toolchain {
            install: if facts.has_package_lock {
                cmd("npm ci")
            } else {
                cmd("npm install")
            },
            build: script("build", "npm run build".into()),
            lint: script("lint", "npm run lint".into()),
            test: script("test", "npm test".into()),
            audit: cmd("npm audit --json"),
        },
        PackageManager::Cargo => Toolchain {
            install: cmd("cargo fetch"),
            build: cmd("cargo build --all-targets"),
            lint: cmd("cargo clippy --all-targets"),
            test: cmd("cargo test"),
            audit: cmd("cargo audit"),
        },
        PackageManager::Go => Toolchain {
            install: cmd("go mod download"),
            build: cmd("go build ./..."),
            lint: cmd("go vet ./..."),
            test: cmd("go test ./..."),
            audit: cmd("govulncheck ./..."),
        },
        PackageManager::Poetry => Toolchain {
            install: cmd("poetry install"),
            build: None,
            lint: cmd("poetry run ruff check ."),
            test: cmd("poetry run pytest"),
            audit: cmd("pip-audit"),
        },
        PackageManager::Uv => Toolchain {
            install: cmd("uv sync"),
            build: None,
            lint: cmd("uv run ruff check ."),
            test: cmd("uv run pytest"),
            audit: cmd("pip-audit"),
        },
        PackageManager::Pip if facts.manifest == "requirements.txt" => Toolchain {
            install: cmd("pip install -r requirements.txt"),
            build: None,
            lint: cmd("ruff check ."),
            test: cmd("pytest"),
            audit: cmd("pip-audit -r requirements.txt"),
        },
        PackageManager::Pip => Toolchain {
            install: cmd("pip install -e ."),
            build: None,
            lint: cmd("ruff check ."),
            test: cmd("pytest"),
            audit: cmd("pip-audit"),
        },
        PackageManager::Maven => Toolchain {
            install: cmd("mvn -B -q dependency:resolve"),
            build: cmd("mvn -B -q compile"),
            lint: None,
            test: cmd("mvn -B test"),
            audit: None,
        },
        PackageManager::Gradle => {
            let gradle = if facts.has_gradle_wrapper {
                "./gradlew"
            } else {
                "gradle"
            };
            Toolchain {
                install: Some(format!("{gradle} dependencies")),
                build: Some(format!("{gradle} build -x test")),
                lint: None,
                test: Some(format!("{gradle} test")),
                audit: None,
            }
        }
        PackageManager::Bundler => Toolchain {
            install: cmd("bundle install"),
            build: None,
            lint: cmd("bundle exec rubocop"),
            test: cmd("bundle exec rake test"),
            audit: cmd("bundle audit check --update"),
        },
    }
}

/// Infer the project toolchain of `dir`.
///
/// An unrecognised directory is not an error: it yields `unknown` with no
/// commands, which makes every optional stage skip.
pub fn detect_project(dir: &Path) -> Result<ProjectDetection, DetectError> {
    if !dir.is_dir() {
        return Err(DetectError::MissingDir(dir.to_path_buf()));
    }

    let has = |name: &str| dir.join(name).is_file();
    let mut facts = Facts::default();

    let pm = if has("package.json") {
        facts.manifest = "package.json";
        facts.scripts = read_node_scripts(dir)?;
        facts.has_package_lock = has("package-lock.json");
        if has("bun.lockb") || has("bun.lock") {
            PackageManager::Bun
        } else if has("pnpm-lock.yaml") {
            PackageManager::Pnpm
        } else if has("yarn.lock") {
            PackageManager::Yarn
        } else {
            PackageManager::Npm
        }
    } else if has("Cargo.toml") {
        facts.manifest = "Cargo.toml";
        PackageManager::Cargo
    } else if has("go.mod") {
        facts.manifest = "go.mod";
        PackageManager::Go
    } else if has("pyproject.toml") {
        facts.manifest = "pyproject.toml";
        if has("poetry.lock") {
            PackageManager::Poetry
        } else if has("uv.lock") {
            PackageManager::Uv
        } else {
            PackageManager::Pip
        }
    } else if has("requirements.txt") {
        facts.manifest = "requirements.txt";
        PackageManager::Pip
    } else if has("pom.xml") {
        facts.manifest = "pom.xml";
        PackageManager::Maven
    } else if has("build.gradle") || has("build.gradle.kts") {
        facts.manifest = if has("build.gradle") {
            "build.gradle"
        } else {
            "build.gradle.kts"
        };
        facts.has_gradle_wrapper = has("gradlew");
        PackageManager::Gradle
    } else if has("Gemfile") {
        facts.manifest = "Gemfile";
        PackageManager::Bundler
    } else {
        return Ok(ProjectDetection::unknown());
    };

    let tools = toolchain(pm, &facts);
    Ok(ProjectDetection {
        project_type: pm.project_type(),
        package_manager: Some(pm.name().to_string()),
        manifest: Some(facts.manifest.to_string()),
        install_command: tools.install,
        build_command: tools.build,
        lint_command: tools.lint,
        test_command: tools.test,
        audit_command: tools.audit,
    })
}

fn read_node_scripts(dir: &Path) -> Result<BTreeSet<String>, DetectError> {
    let path = dir.join("package.json");
    let raw = std::fs::read_to_string(&path).map_err(|source| DetectError::Read {
        path: path.clone(),
        source,
    })?;

    let parsed: serde_json::Value = match serde_json::from_str(&raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "package.json is not valid JSON; assuming no scripts");
            return Ok(BTreeSet::new());
        }
    };

    Ok(parsed
        .get("scripts")
        .and_then(|s| s.as_object())
        .map(|scripts| scripts.keys().cloned().collect())
        .unwrap_or_default())
}

/// Stages a run attempts by default for this detection.
///
/// Clone and detect always run; install/build/lint/test only when their
/// command was detected; security and bundle are always attempted.
pub fn default_stages(detection: &ProjectDetection) -> Vec<StageName> {
    StageName::ALL
        .into_iter()
        .filter(|stage| !stage.is_command_stage() || detection.command_for(*stage).is_some())
        .collect()
}
