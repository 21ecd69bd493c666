use anyhow::{Context, Result};
use clap::Parser;
use syscost::{
    cli::Cli,
    config::ProfilerConfig,
    loader::DylibLoader,
    orchestrator::Orchestrator,
    registry::Registry,
    report, spawn,
};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Load the configuration file (if any) and apply CLI overrides
fn load_config(args: &Cli) -> Result<ProfilerConfig> {
    let mut config = match &args.config {
        Some(path) => ProfilerConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ProfilerConfig::default(),
    };
    args.apply_to(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn main() -> Result<()> {
    let args = Cli::parse();

    // Spawn-mode interpreter: nothing else may touch stdout
    if let Some(script) = &args.invoke {
        let code = spawn::interpret(script, &DylibLoader, &mut std::io::stdout().lock());
        std::process::exit(code);
    }

    init_tracing(args.debug);

    let config = load_config(&args)?;
    let registry = Registry::discover(&config.benchmarks_root)
        .context("Failed to discover workloads")?
        .with_inputs(config.inputs.clone());

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    if args.list {
        report::write_listing(&mut out, registry.units())?;
        return Ok(());
    }

    let mut orchestrator = Orchestrator::new(&config, &registry, &DylibLoader);
    orchestrator.run(&config.workload, args.format, &mut out)?;

    Ok(())
}
