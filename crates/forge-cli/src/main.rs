//! `forge` command-line front end

use anyhow::{bail, Context};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use forge_artifact::ModuleFormat;
use forge_compiler::CompilePool;
use forge_core::logging::{init_tracing, LogFormat};
use forge_core::{BuildPipeline, ForgeConfig, JobRequest, JobStatus, SharedDeclaration};
use forge_loader::{ComponentLoader, HttpFetcher, LoadState, LoaderSettings, RefreshToken};
use forge_registry::SharedRegistry;
use forge_repair::{repair, RepairOptions};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

fn parse_shared(s: &str) -> Result<SharedDeclaration, String> {
    let (name, version) = s
        .rsplit_once('@')
        .filter(|(name, version)| !name.is_empty() && !version.is_empty())
        .ok_or_else(|| format!("expected <name>@<version>, got '{s}'"))?;
    Ok(SharedDeclaration {
        name: name.to_string(),
        version: version.to_string(),
        markers: Vec::new(),
    })
}

fn config_arg() -> Arg {
    Arg::new("config")
        .long("config")
        .short('c')
        .value_parser(value_parser!(PathBuf))
        .help("Path to forge.toml")
}

fn shared_arg() -> Arg {
    Arg::new("shared")
        .long("shared")
        .action(ArgAction::Append)
        .value_parser(parse_shared)
        .help("Shared module as <name>@<version> (repeatable)")
}

fn format_arg() -> Arg {
    Arg::new("format")
        .long("format")
        .value_parser(|s: &str| s.parse::<ModuleFormat>())
        .help("Output format: module or global-slot")
}

fn cli() -> Command {
    Command::new("forge")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Repair, build, serve and load generated UI components")
        .subcommand_required(true)
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .default_value("pretty")
                .value_parser(|s: &str| s.parse::<LogFormat>())
                .help("Log output: pretty or json"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Debug logging unless RUST_LOG is set"),
        )
        .subcommand(
            Command::new("repair")
                .about("Validate and repair a component source")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("TSX source file"),
                )
                .arg(
                    Arg::new("export")
                        .long("export")
                        .default_value("default")
                        .help("Export expected to hold the component"),
                )
                .arg(
                    Arg::new("slot")
                        .long("slot")
                        .help("Repair for legacy global-slot loading under this key"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the outcome as JSON"),
                ),
        )
        .subcommand(
            Command::new("build")
                .about("Run one source through the build pipeline")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("TSX source file"),
                )
                .arg(config_arg())
                .arg(shared_arg())
                .arg(format_arg())
                .arg(
                    Arg::new("export")
                        .long("export")
                        .default_value("default")
                        .help("Export expected to hold the component"),
                )
                .arg(
                    Arg::new("project")
                        .long("project")
                        .default_value("local")
                        .help("Project the job belongs to"),
                )
                .arg(
                    Arg::new("store")
                        .long("store")
                        .value_parser(value_parser!(PathBuf))
                        .help("Filesystem store root (in-memory otherwise)"),
                )
                .arg(
                    Arg::new("public-url")
                        .long("public-url")
                        .help("Base URL artifacts are served under"),
                ),
        )
        .subcommand(
            Command::new("serve")
                .about("Serve stored artifacts over HTTP")
                .arg(config_arg())
                .arg(shared_arg())
                .arg(
                    Arg::new("bind")
                        .long("bind")
                        .value_parser(value_parser!(SocketAddr))
                        .help("Listen address"),
                )
                .arg(
                    Arg::new("build")
                        .long("build")
                        .action(ArgAction::Append)
                        .value_parser(value_parser!(PathBuf))
                        .help("Build this source before serving (repeatable)"),
                ),
        )
        .subcommand(
            Command::new("load")
                .about("Load a compiled component the way a host would")
                .arg(Arg::new("url").required(true).help("Artifact URL"))
                .arg(config_arg())
                .arg(shared_arg())
                .arg(
                    Arg::new("token")
                        .long("token")
                        .default_value("0")
                        .help("Refresh token appended as ?v="),
                )
                .arg(
                    Arg::new("slot")
                        .long("slot")
                        .help("Slot a legacy module must register under"),
                ),
        )
}

fn load_config(args: &ArgMatches) -> anyhow::Result<ForgeConfig> {
    let mut config = match args.get_one::<PathBuf>("config") {
        Some(path) => ForgeConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            let mut config = ForgeConfig::new();
            config.apply_env()?;
            config
        }
    };
    if let Some(shared) = args.get_many::<SharedDeclaration>("shared") {
        config.shared.extend(shared.cloned());
    }
    Ok(config)
}

fn registry_for(config: &ForgeConfig) -> Arc<SharedRegistry> {
    let registry = Arc::new(SharedRegistry::new());
    config.register_shared(&registry);
    registry
}

fn read_source(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn run_repair(args: &ArgMatches) -> anyhow::Result<ExitCode> {
    let source = read_source(args.get_one::<PathBuf>("file").context("file is required")?)?;
    let export = args
        .get_one::<String>("export")
        .map_or("default", String::as_str);
    let options = match args.get_one::<String>("slot") {
        Some(slot) => RepairOptions::global_slot(export, slot.as_str()),
        None => RepairOptions::module(export),
    };

    let outcome = repair(&source, &options);
    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        for fix in &outcome.applied_fixes {
            eprintln!("fixed: {fix}");
        }
        for warning in &outcome.warnings {
            eprintln!("warning: {warning}");
        }
        if let Some(error) = &outcome.parse_error {
            eprintln!("error: {error}");
        }
        print!("{}", outcome.repaired_text);
    }
    Ok(if outcome.still_invalid {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn run_build(args: &ArgMatches) -> anyhow::Result<ExitCode> {
    let source = read_source(args.get_one::<PathBuf>("file").context("file is required")?)?;
    let mut config = load_config(args)?;
    if let Some(root) = args.get_one::<PathBuf>("store") {
        config = config.with_store_root(root);
    }
    if let Some(url) = args.get_one::<String>("public-url") {
        config = config.with_public_url(url);
    }
    let format = args
        .get_one::<ModuleFormat>("format")
        .copied()
        .unwrap_or(config.compile.format);

    let pipeline = BuildPipeline::from_config(&config, registry_for(&config))?;
    let mut request = JobRequest::new(
        args.get_one::<String>("project").map_or("local", String::as_str),
        source,
    )
    .with_format(format);
    if let Some(export) = args.get_one::<String>("export") {
        request = request.with_export_name(export);
    }

    let view = pipeline.submit_and_run(request).await?;
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(if view.status == JobStatus::Ready {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn run_serve(args: &ArgMatches) -> anyhow::Result<ExitCode> {
    let mut config = load_config(args)?;
    if let Some(bind) = args.get_one::<SocketAddr>("bind") {
        config = config.with_bind(*bind);
    }
    let store = config.open_store()?;

    if let Some(files) = args.get_many::<PathBuf>("build") {
        let pool = CompilePool::new(config.worker_count())?;
        let pipeline = BuildPipeline::new(Arc::clone(&store), pool, registry_for(&config))
            .with_jsx_runtime(config.compile.jsx_runtime.clone());
        for path in files {
            let request = JobRequest::new("serve", read_source(path)?).with_format(config.compile.format);
            let view = pipeline.submit_and_run(request).await?;
            match (&view.artifact_url, &view.error_text) {
                (Some(url), _) => println!("{} -> {url}", path.display()),
                (None, error) => eprintln!(
                    "{}: {}",
                    path.display(),
                    error.as_deref().unwrap_or("build failed")
                ),
            }
        }
    }

    let (addr, server) = forge_artifact::http::spawn_server(
        store,
        config.server.bind,
        &config.server.allowed_origins,
        async {
            let _ = tokio::signal::ctrl_c().await;
        },
    )?;
    println!("serving artifacts on http://{addr}/artifacts/");
    server.await.context("artifact server task failed")?;
    Ok(ExitCode::SUCCESS)
}

async fn run_load(args: &ArgMatches) -> anyhow::Result<ExitCode> {
    let config = load_config(args)?;
    let url = args.get_one::<String>("url").context("url is required")?;
    let token = args
        .get_one::<String>("token")
        .map_or_else(RefreshToken::default, |t| RefreshToken::from(t.as_str()));

    let mut settings = LoaderSettings::default().with_retry(config.loader.retry);
    if let Some(slot) = args.get_one::<String>("slot") {
        settings = settings.with_legacy_slot(slot.as_str());
    }
    let fetcher = HttpFetcher::with_timeout(Duration::from_millis(config.loader.timeout_ms));
    let loader = ComponentLoader::with_settings(Arc::new(fetcher), registry_for(&config), settings);

    loader.set_source(Some(url), token);
    let view = loader.settled().await;

    for attempt in &view.attempts {
        eprintln!(
            "attempt {}: {:?}{}",
            attempt.attempt_number,
            attempt.outcome,
            attempt
                .error_text
                .as_deref()
                .map(|e| format!(" ({e})"))
                .unwrap_or_default()
        );
    }
    match (view.state, view.component) {
        (LoadState::Loaded, Some(component)) => {
            println!("loaded {}", component.url);
            println!("  hash:   {}", component.content_hash);
            println!("  format: {}", component.format);
            println!("  export: {}", component.export_name);
            println!("  bytes:  {}", component.byte_size());
            let shared: Vec<&str> = component.shared.keys().map(String::as_str).collect();
            println!("  shared: {}", shared.join(", "));
            Ok(ExitCode::SUCCESS)
        }
        (state, _) => {
            eprintln!(
                "{state:?}: {}",
                view.error.as_deref().unwrap_or("no component")
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let matches = cli().get_matches();

    let format = matches
        .get_one::<LogFormat>("log-format")
        .copied()
        .unwrap_or_default();
    let level = if matches.get_flag("verbose") {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(format, level);

    match matches.subcommand() {
        Some(("repair", args)) => run_repair(args),
        Some(("build", args)) => run_build(args).await,
        Some(("serve", args)) => run_serve(args).await,
        Some(("load", args)) => run_load(args).await,
        Some((other, _)) => bail!("unknown command '{other}'"),
        None => bail!("no command given"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn shared_specs_parse() {
        let decl = parse_shared("@remotion/player@4.0.0").unwrap();
        assert_eq!(decl.name, "@remotion/player");
        assert_eq!(decl.version, "4.0.0");
        assert!(parse_shared("react").is_err());
        assert!(parse_shared("react@").is_err());
    }

    #[test]
    fn build_arguments_parse() {
        let matches = cli()
            .try_get_matches_from([
                "forge", "build", "clip.tsx", "--format", "global-slot", "--shared", "react@18.3.1",
                "--shared", "remotion@4.0.0",
            ])
            .unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "build");
        assert_eq!(
            args.get_one::<ModuleFormat>("format"),
            Some(&ModuleFormat::GlobalSlot)
        );
        assert_eq!(args.get_many::<SharedDeclaration>("shared").unwrap().count(), 2);
    }
}
