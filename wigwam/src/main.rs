//! # wigwam
//!
//! Build, distribute and clean up layered ISCE3 container images.
//!
//! ## Usage
//!
//! ```bash
//! wigwam setup all                         # init .. dev environment images
//! wigwam build-all --build-type Release    # clone, configure, compile, install
//! wigwam distrib                           # runtime image + installed tree
//! wigwam remove 'build-*'                  # delete managed images by pattern
//! wigwam data fetch --test insar:insar_UAVSAR
//! ```

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wigwam::cancellation::CancellationToken;
use wigwam::config::WigwamConfig;
use wigwam::core::RemovalPattern;
use wigwam::data::{
    fetch_all, plan_fetch, DataCatalog, DataQuery, InputDir, InputLocator, RoverCache, TestCatalog, TestId,
};
use wigwam::engine::{BuildExecutor, DockerEngine};
use wigwam::errors::WigwamError;
use wigwam::lifecycle::RemovalEngine;
use wigwam::pipeline::{
    Distributable, FullCompile, MacroCommand, PipelineComposer, PipelineSpec, RepoSource, RunController,
    SetupAll, SingleStage,
};
use wigwam::stages::{StageConfig, StageRegistry, BUILD_TYPES};

#[derive(Parser)]
#[command(name = "wigwam", version, about = "Layered container image pipelines for ISCE3")]
struct Cli {
    /// JSON configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the base environment images.
    Setup {
        #[command(subcommand)]
        command: SetupCommands,
    },
    /// Clone a GitHub repository onto a base image.
    #[command(name = "clone")]
    CloneRepo {
        #[command(flatten)]
        stage: StageArgs,
        /// Repository in USER/REPO form.
        #[arg(long)]
        repo: Option<String>,
        /// Branch to check out.
        #[arg(long)]
        branch: Option<String>,
    },
    /// Copy a local directory or file onto a base image.
    Insert {
        #[command(flatten)]
        stage: StageArgs,
        /// Path to copy.
        #[arg(long)]
        path: String,
    },
    /// Run CMake configure.
    Config {
        #[command(flatten)]
        stage: StageArgs,
        /// CMake build type.
        #[arg(long, value_parser = BUILD_TYPES)]
        build_type: String,
        /// Configure without CUDA.
        #[arg(long)]
        no_cuda: bool,
    },
    /// Compile a configured tree.
    Compile {
        #[command(flatten)]
        stage: StageArgs,
    },
    /// Install a compiled tree.
    Install {
        #[command(flatten)]
        stage: StageArgs,
    },
    /// Acquire, configure, compile and install in one pipeline.
    #[command(alias = "full-compile")]
    BuildAll(BuildAllArgs),
    /// Build the unprefixed distributable image.
    #[command(alias = "distributable")]
    Distrib {
        /// Tag of the produced image.
        #[arg(long)]
        tag: Option<String>,
        /// Runtime image to build on.
        #[arg(long)]
        base: Option<String>,
        /// Installed image to copy from.
        #[arg(long)]
        source_tag: Option<String>,
    },
    /// Delete managed images matching any pattern.
    Remove {
        /// Tag patterns; '*' and '?' are wildcards.
        #[arg(required = true)]
        patterns: Vec<String>,
        /// Override engine refusals.
        #[arg(long)]
        force: bool,
        /// Match whole references instead of prefixed labels.
        #[arg(long)]
        ignore_prefix: bool,
    },
    /// List managed images.
    List {
        /// Optional tag patterns.
        patterns: Vec<String>,
    },
    /// Search, fetch and locate test data.
    Data {
        #[command(subcommand)]
        command: DataCommands,
    },
}

#[derive(Subcommand)]
enum SetupCommands {
    /// Build init through the dev environment.
    All(SetupAllArgs),
    /// Build the init image.
    Init {
        #[command(flatten)]
        stage: OptionalBaseArgs,
    },
    /// Add the CUDA runtime.
    CudaRuntime {
        #[command(flatten)]
        stage: StageArgs,
        /// CUDA MAJOR.MINOR version.
        #[arg(long)]
        cuda_version: Option<String>,
        /// CUDA package repository.
        #[arg(long)]
        cuda_repo: Option<String>,
        /// CUDA architecture.
        #[arg(long)]
        arch: Option<String>,
    },
    /// Add the runtime conda environment.
    CondaRuntime {
        #[command(flatten)]
        stage: StageArgs,
        /// Environment spec file.
        #[arg(long)]
        env_file: Option<String>,
    },
    /// Add the CUDA dev tools.
    CudaDev {
        #[command(flatten)]
        stage: StageArgs,
        /// CUDA MAJOR.MINOR version.
        #[arg(long)]
        cuda_version: Option<String>,
    },
    /// Add the dev conda environment.
    CondaDev {
        #[command(flatten)]
        stage: StageArgs,
        /// Environment spec file.
        #[arg(long)]
        env_file: Option<String>,
    },
}

#[derive(Args)]
struct StageArgs {
    /// Image to build on.
    #[arg(long)]
    base: String,
    /// Label of the produced image.
    #[arg(long)]
    tag: Option<String>,
    /// Bypass the layer cache.
    #[arg(long)]
    no_cache: bool,
}

#[derive(Args)]
struct OptionalBaseArgs {
    /// Image to build on; the configured base image when absent.
    #[arg(long)]
    base: Option<String>,
    /// Label of the produced image.
    #[arg(long)]
    tag: Option<String>,
    /// Bypass the layer cache.
    #[arg(long)]
    no_cache: bool,
}

#[derive(Args)]
struct SetupAllArgs {
    /// Label shared by every produced image.
    #[arg(long)]
    tag: Option<String>,
    /// OS image to build on.
    #[arg(long)]
    base: Option<String>,
    /// CUDA MAJOR.MINOR version.
    #[arg(long)]
    cuda_version: Option<String>,
    /// CUDA package repository.
    #[arg(long)]
    cuda_repo: Option<String>,
    /// Runtime environment spec file.
    #[arg(long)]
    runtime_env_file: Option<String>,
    /// Dev environment spec file.
    #[arg(long)]
    dev_env_file: Option<String>,
    /// Bypass the layer cache.
    #[arg(long)]
    no_cache: bool,
}

#[derive(Args)]
struct BuildAllArgs {
    /// Label shared by every produced image.
    #[arg(long)]
    tag: Option<String>,
    /// Image to build on.
    #[arg(long)]
    base: Option<String>,
    /// Copy this local path instead of cloning.
    #[arg(long, conflicts_with_all = ["repo", "branch"])]
    copy_path: Option<String>,
    /// Repository in USER/REPO form.
    #[arg(long)]
    repo: Option<String>,
    /// Branch to check out.
    #[arg(long)]
    branch: Option<String>,
    /// CMake build type.
    #[arg(long, value_parser = BUILD_TYPES)]
    build_type: String,
    /// Configure without CUDA.
    #[arg(long)]
    no_cuda: bool,
    /// Bypass the layer cache.
    #[arg(long)]
    no_cache: bool,
}

#[derive(Subcommand)]
enum DataCommands {
    /// Print matching data records as JSON.
    Search {
        #[command(flatten)]
        query: QueryArgs,
        /// Only print these fields.
        #[arg(long, num_args = 1..)]
        fields: Vec<String>,
    },
    /// Print the names of matching data records.
    Names {
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Download matching records and test inputs into the cache.
    Fetch {
        #[command(flatten)]
        query: QueryArgs,
        /// Tests whose inputs to fetch, as WORKFLOW:TEST.
        #[arg(long = "test")]
        tests: Vec<String>,
        /// Re-download files already in the cache.
        #[arg(long)]
        no_cache: bool,
        /// Cache directory to download into.
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
    /// Print where each input of a test is found.
    Inputs {
        /// The test, as WORKFLOW:TEST.
        #[arg(long)]
        test: String,
        /// Explicit input location, as PATH or LABEL:PATH.
        #[arg(long = "input-dir")]
        input_dirs: Vec<String>,
        /// Cache directories, searched in order.
        #[arg(long = "cache-dir")]
        cache_dirs: Vec<PathBuf>,
    },
}

#[derive(Args)]
struct QueryArgs {
    /// Record name glob; repeatable.
    #[arg(long = "name")]
    names: Vec<String>,
    /// Comma-separated tags a record must all carry; repeat to accept
    /// several groups.
    #[arg(long)]
    tags: Vec<String>,
    /// Match every record.
    #[arg(long)]
    all: bool,
}

impl From<QueryArgs> for DataQuery {
    fn from(args: QueryArgs) -> Self {
        Self {
            names: args.names,
            tag_groups: args
                .tags
                .iter()
                .map(|group| {
                    group
                        .split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(String::from)
                        .collect()
                })
                .collect(),
            all: args.all,
        }
    }
}

/// Everything the commands share.
struct App {
    config: WigwamConfig,
    composer: PipelineComposer,
    engine: Arc<DockerEngine>,
}

impl App {
    fn new(config: WigwamConfig) -> Result<Self> {
        let prefix = config.tag_prefix()?;
        let registry = Arc::new(StageRegistry::with_defaults(&config.stage_defaults()));
        let composer = PipelineComposer::new(registry, prefix)
            .with_setup_label(&config.setup_label)
            .with_build_label(&config.build_label)
            .with_distrib_label(&config.distrib_label);
        let engine = Arc::new(DockerEngine::new(&config.docker, &config.dockerfile_dir));
        Ok(Self {
            config,
            composer,
            engine,
        })
    }

    fn single(kind: &str, stage: StageArgs, config: StageConfig) -> SingleStage {
        let request = SingleStage::new(kind)
            .with_base(stage.base)
            .with_config(config)
            .with_no_cache(stage.no_cache);
        match stage.tag {
            Some(tag) => request.with_label(tag),
            None => request,
        }
    }

    async fn run(&self, command: Commands) -> Result<bool> {
        let spec = match command {
            Commands::Setup { command } => self.setup(command)?,
            Commands::CloneRepo { stage, repo, branch } => self.composer.single(&Self::single(
                "clone",
                stage,
                StageConfig::new().with_opt("repo", repo).with_opt("branch", branch),
            ))?,
            Commands::Insert { stage, path } => self
                .composer
                .single(&Self::single("insert", stage, StageConfig::new().with("path", path)))?,
            Commands::Config {
                stage,
                build_type,
                no_cuda,
            } => self.composer.single(&Self::single(
                "configure",
                stage,
                StageConfig::new()
                    .with("build_type", build_type)
                    .with_flag("no_cuda", no_cuda),
            ))?,
            Commands::Compile { stage } => self
                .composer
                .single(&Self::single("compile", stage, StageConfig::new()))?,
            Commands::Install { stage } => self
                .composer
                .single(&Self::single("install", stage, StageConfig::new()))?,
            Commands::BuildAll(args) => self.build_all(args)?,
            Commands::Distrib { tag, base, source_tag } => {
                self.composer.compose(&MacroCommand::Distributable(Distributable {
                    tag,
                    base,
                    source: source_tag,
                }))?
            }
            Commands::Remove {
                patterns,
                force,
                ignore_prefix,
            } => return self.remove(patterns, force, ignore_prefix).await,
            Commands::List { patterns } => return self.list(patterns).await,
            Commands::Data { command } => return self.data(command).await,
        };
        self.execute(&spec).await
    }

    fn setup(&self, command: SetupCommands) -> Result<PipelineSpec> {
        let spec = match command {
            SetupCommands::All(args) => self.composer.compose(&MacroCommand::SetupAll(SetupAll {
                label: args.tag.unwrap_or_else(|| self.config.setup_label.clone()),
                base_image: Some(args.base.unwrap_or_else(|| self.config.base_image.clone())),
                cuda_version: args.cuda_version,
                cuda_repo: args.cuda_repo,
                runtime_env_file: args
                    .runtime_env_file
                    .unwrap_or_else(|| self.config.runtime_env_file.clone()),
                dev_env_file: args.dev_env_file.unwrap_or_else(|| self.config.dev_env_file.clone()),
                no_cache: args.no_cache,
            }))?,
            SetupCommands::Init { stage } => {
                let stage = StageArgs {
                    base: stage.base.unwrap_or_else(|| self.config.base_image.clone()),
                    tag: stage.tag,
                    no_cache: stage.no_cache,
                };
                self.composer.single(&Self::single("init", stage, StageConfig::new()))?
            }
            SetupCommands::CudaRuntime {
                stage,
                cuda_version,
                cuda_repo,
                arch,
            } => self.composer.single(&Self::single(
                "runtime-cuda",
                stage,
                StageConfig::new()
                    .with_opt("cuda_version", cuda_version)
                    .with_opt("cuda_repo", cuda_repo)
                    .with_opt("arch", arch),
            ))?,
            SetupCommands::CondaRuntime { stage, env_file } => self.composer.single(&Self::single(
                "runtime-env",
                stage,
                StageConfig::new().with(
                    "env_file",
                    env_file.unwrap_or_else(|| self.config.runtime_env_file.clone()),
                ),
            ))?,
            SetupCommands::CudaDev { stage, cuda_version } => self.composer.single(&Self::single(
                "dev-cuda",
                stage,
                StageConfig::new().with_opt("cuda_version", cuda_version),
            ))?,
            SetupCommands::CondaDev { stage, env_file } => self.composer.single(&Self::single(
                "dev-env",
                stage,
                StageConfig::new().with("env_file", env_file.unwrap_or_else(|| self.config.dev_env_file.clone())),
            ))?,
        };
        Ok(spec)
    }

    fn build_all(&self, args: BuildAllArgs) -> Result<PipelineSpec> {
        let source = match args.copy_path {
            Some(path) => RepoSource::Insert { path },
            None => RepoSource::Clone {
                repo: args.repo,
                branch: args.branch,
            },
        };
        let request = FullCompile {
            label: args.tag.unwrap_or_else(|| self.config.build_label.clone()),
            base: args.base,
            source,
            build_type: Some(args.build_type),
            no_cuda: args.no_cuda,
            no_cache: args.no_cache,
        };
        Ok(self.composer.compose(&MacroCommand::FullCompile(request))?)
    }

    async fn execute(&self, spec: &PipelineSpec) -> Result<bool> {
        let token = Arc::new(CancellationToken::new());
        let interrupt = {
            let token = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    token.cancel("interrupted by Ctrl-C");
                }
            })
        };

        let controller = RunController::new(BuildExecutor::new(self.engine.clone()));
        let report = controller.run(spec, &token).await;
        interrupt.abort();

        for tag in report.built_tags() {
            println!("built {tag}");
        }
        if let Some(failure) = report.failure() {
            eprintln!("error: {failure}");
        }
        info!(run_id = %report.run_id, state = %report.state, duration_ms = report.duration_ms, "Run finished");
        Ok(report.is_success())
    }

    async fn remove(&self, patterns: Vec<String>, force: bool, ignore_prefix: bool) -> Result<bool> {
        let patterns: Vec<RemovalPattern> = patterns
            .into_iter()
            .map(|p| RemovalPattern::new(p).with_ignore_prefix(ignore_prefix))
            .collect();
        let report = RemovalEngine::new(self.engine.clone(), self.composer.prefix().clone())
            .remove(&patterns, force)
            .await?;

        for artifact in &report.removed {
            println!("removed {artifact}");
        }
        for pattern in &report.unmatched_patterns {
            println!("no images match {pattern}");
        }
        for failure in &report.failures {
            eprintln!("error: {failure}");
        }
        Ok(report.is_success())
    }

    async fn list(&self, patterns: Vec<String>) -> Result<bool> {
        let patterns: Vec<RemovalPattern> = patterns.into_iter().map(RemovalPattern::new).collect();
        let artifacts = RemovalEngine::new(self.engine.clone(), self.composer.prefix().clone())
            .list_managed(&patterns)
            .await?;
        for artifact in artifacts {
            println!("{artifact}");
        }
        Ok(true)
    }

    async fn data(&self, command: DataCommands) -> Result<bool> {
        match command {
            DataCommands::Search { query, fields } => {
                let catalog = DataCatalog::load(&self.config.data_file)?;
                let records = catalog.search_fields(&query.into(), &fields)?;
                println!("{}", serde_json::to_string_pretty(&records)?);
            }
            DataCommands::Names { query } => {
                let catalog = DataCatalog::load(&self.config.data_file)?;
                for name in catalog.names(&query.into())? {
                    println!("{name}");
                }
            }
            DataCommands::Fetch {
                query,
                tests,
                no_cache,
                cache_dir,
            } => {
                let catalog = DataCatalog::load(&self.config.data_file)?;
                let query: DataQuery = query.into();
                let ids = tests
                    .iter()
                    .map(|t| t.parse::<TestId>())
                    .collect::<Result<Vec<_>, _>>()?;
                let test_catalog = if ids.is_empty() {
                    TestCatalog::default()
                } else {
                    TestCatalog::load(&self.config.test_file)?
                };
                let selected = ids
                    .iter()
                    .map(|id| test_catalog.get(id))
                    .collect::<Result<Vec<_>, _>>()?;

                let target = cache_dir.unwrap_or_else(|| self.config.cache_dir.clone());
                std::fs::create_dir_all(&target)
                    .with_context(|| format!("creating cache directory {}", target.display()))?;
                let requests = plan_fetch(&catalog, &query, &selected, &target, no_cache)?;
                if requests.is_empty() {
                    bail!("nothing to fetch: give --name, --tags, --all or --test");
                }

                let cache = RoverCache::new(&self.config.docker, &self.config.rover_image);
                let report = fetch_all(&cache, &requests).await;
                for name in &report.fetched {
                    println!("fetched {name}");
                }
                for failure in &report.failures {
                    eprintln!("error: {failure}");
                }
                return Ok(report.is_success());
            }
            DataCommands::Inputs {
                test,
                input_dirs,
                cache_dirs,
            } => {
                let id: TestId = test.parse()?;
                let catalog = TestCatalog::load(&self.config.test_file)?;
                let dirs = input_dirs
                    .iter()
                    .map(|d| d.parse::<InputDir>())
                    .collect::<Result<Vec<_>, _>>()?;
                let located = InputLocator::new(cache_dirs)
                    .with_default_cache(&self.config.cache_dir)
                    .locate(catalog.get(&id)?, &dirs)?;
                println!("{}", serde_json::to_string_pretty(&located)?);
            }
        }
        Ok(true)
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "wigwam=debug" } else { "wigwam=info" };
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());
    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let config = WigwamConfig::load(cli.config.as_deref()).context("loading configuration")?;
    App::new(config)?.run(cli.command).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            if let Some(hint) = err
                .downcast_ref::<WigwamError>()
                .and_then(WigwamError::error_info)
                .and_then(|info| info.fix_hint)
            {
                eprintln!("hint: {hint}");
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macro_command_aliases() {
        let cli = Cli::try_parse_from(["wigwam", "full-compile", "--build-type", "Release"]).unwrap();
        assert!(matches!(cli.command, Commands::BuildAll(ref args) if args.build_type == "Release"));

        let cli = Cli::try_parse_from(["wigwam", "distributable", "--tag", "isce3"]).unwrap();
        assert!(matches!(cli.command, Commands::Distrib { tag: Some(ref tag), .. } if tag == "isce3"));

        assert!(Cli::try_parse_from(["wigwam", "build-all", "--build-type", "Debug"]).is_ok());
        assert!(Cli::try_parse_from(["wigwam", "distrib"]).is_ok());
    }
}
