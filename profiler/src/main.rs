use anyhow::Context;
use clap::Parser;

use profiler::cli::Cli;
use profiler::orchestrator::RunOptions;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env = env_logger::Env::default().default_filter_or(cli.log_level.as_deref().unwrap_or("info"));
    env_logger::init_from_env(env);

    let opts = RunOptions {
        program: cli.program.clone(),
        args: cli.args.clone(),
        config_path: cli.config.clone(),
        pie_override: cli.pie,
        wrapper_target: cli.wrapper_target.clone(),
        idle_baseline: cli.idle_baseline,
        idle_seconds: cli.idle_seconds,
        allow_concurrency_override: cli.allow_concurrency,
    };

    if cli.dry_run {
        let plan = profiler::orchestrator::dry_run(&opts).context("resolving trap plan")?;
        println!("resolved {} trap pair(s):", plan.len());
        for entry in &plan {
            println!(
                "  {} : start @ +{:#x} ({}) -> end @ +{:#x} ({})",
                entry.label, entry.start_offset, entry.start_context, entry.end_offset, entry.end_context
            );
        }
        return Ok(());
    }

    let document = profiler::orchestrator::run(&opts).context("running energy profile")?;

    let file = std::fs::File::create(&cli.output).with_context(|| format!("creating output file {}", cli.output.display()))?;
    serde_json::to_writer_pretty(file, &document).context("writing output document")?;
    log::info!("wrote profile to {}", cli.output.display());

    Ok(())
}
