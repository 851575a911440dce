//! Command-line surface, the way `cli_poll_rapl/src/cli.rs` defines one
//! for `rapl_probes`: thin enough that the hard work stays in the library
//! modules, existing only so the orchestrator is runnable end to end.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(author, version, about = "Traces a target binary and samples CPU/GPU energy across configured regions")]
pub struct Cli {
    /// Path to the target executable to trace.
    pub program: String,

    /// Arguments passed through to the target executable.
    pub args: Vec<String>,

    /// Region-selection configuration file (.toml or .json).
    #[arg(short, long)]
    pub config: PathBuf,

    /// Where to write the resulting JSON document.
    #[arg(short, long, default_value = "energy-profile.json")]
    pub output: PathBuf,

    /// Treats the binary as position-independent; auto-detected from the
    /// ELF header when not given.
    #[arg(long)]
    pub pie: Option<bool>,

    /// Path of the real executable, when `program` is a wrapper or
    /// launcher script that execs into it.
    #[arg(long)]
    pub wrapper_target: Option<PathBuf>,

    /// Gathers an idle CPU/GPU baseline before attaching the tracee.
    #[arg(long)]
    pub idle_baseline: bool,

    /// Seconds to sample the idle baseline for.
    #[arg(long, default_value_t = 5)]
    pub idle_seconds: u64,

    /// Resolves and prints the trap plan without attaching or running
    /// anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Overrides every section's `allow_concurrency` flag.
    #[arg(long)]
    pub allow_concurrency: Option<bool>,

    /// Overrides the default log level (same grammar as `RUST_LOG`).
    #[arg(long)]
    pub log_level: Option<String>,
}
