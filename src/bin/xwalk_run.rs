use std::path::{Path, PathBuf};

use anyhow::Context;
use xwalk_rs::{config::ConfigOverrides, CommandMatcher, Linkage, LinkageConfig, Priors};

fn parse_arg(flag: &str) -> Option<String> {
    let mut args = std::env::args();
    while let Some(arg) = args.next() {
        if arg == flag {
            return args.next();
        }
    }
    None
}

fn parse_arg_all(flag: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut args = std::env::args();
    while let Some(arg) = args.next() {
        if arg == flag {
            if let Some(value) = args.next() {
                values.push(value);
            }
        }
    }
    values
}

fn parse_switch(flag: &str) -> bool {
    std::env::args().any(|arg| arg == flag)
}

fn parse_priors() -> anyhow::Result<Option<Priors>> {
    let a = parse_arg("--prior-a")
        .map(|v| v.parse::<f64>())
        .transpose()
        .context("--prior-a expects a number")?;
    let b = parse_arg("--prior-b")
        .map(|v| v.parse::<f64>())
        .transpose()
        .context("--prior-b expects a number")?;
    match (a, b) {
        (None, None) => Ok(None),
        (Some(a), Some(b)) => Ok(Some(Priors { a, b })),
        _ => anyhow::bail!("--prior-a and --prior-b must be passed together"),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config_path = parse_arg("--config");
    let matcher_program = parse_arg("--matcher")
        .context("usage: xwalk_run --matcher <command> [--config <file>] [--output <path>]")?;
    let output = parse_arg("--output").unwrap_or_else(|| "crosswalk.csv".to_string());

    let overrides = ConfigOverrides {
        iterations: parse_arg("--iterations")
            .map(|v| v.parse())
            .transpose()
            .context("--iterations expects an integer")?,
        include_singletons: parse_switch("--include-singletons").then_some(true),
        scratch_root: parse_arg("--scratch-root").map(PathBuf::from),
        priors: parse_priors()?,
    };
    let config = LinkageConfig::load(config_path.as_deref(), overrides)?;

    let matcher = CommandMatcher::new(matcher_program).args(parse_arg_all("--matcher-arg"));
    let keep_scratch = parse_switch("--keep-scratch");

    let mut linkage = Linkage::new(config)?;
    match linkage.run(&matcher) {
        Ok(summary) => {
            linkage.write_crosswalk(Path::new(&output))?;
            println!("crosswalk written to {}", output);
            println!("  records harmonized: {}", summary.record_count);
            println!("  per-file counts:    {:?}", summary.file_counts);
            println!("  entities observed:  {}", summary.cluster_count);
            println!("  linked clusters:    {}", summary.linked_cluster_count);
            println!("  crosswalk rows:     {}", summary.crosswalk_rows);
            if summary.duplicate_anomalies > 0 {
                println!(
                    "  duplicate anomalies: {} (see log for details)",
                    summary.duplicate_anomalies
                );
            }
            if keep_scratch {
                if let Some(scratch) = linkage.scratch_path() {
                    println!("  scratch retained:   {}", scratch.display());
                }
            } else {
                linkage.cleanup_scratch()?;
            }
            Ok(())
        }
        Err(err) => {
            eprintln!("{}", linkage.failure_report(&err));
            Err(err.into())
        }
    }
}
