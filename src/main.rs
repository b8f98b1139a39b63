/*!
 * Engine Broker - Host Entry Point
 *
 * Usage:
 *   broker run <file> [timeout_ms]
 *   broker batch <file>...
 *
 * Configuration comes from BROKER_CONFIG (a JSON file) when set, otherwise
 * from BROKER_* environment variables. SIGINT and SIGTERM handlers are
 * installed once at startup; on either signal every tracked worker is
 * terminated before the host exits.
 */

use anyhow::{bail, Context};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use engine_broker::process::{BatchItem, HostTermination, TerminationSource};
use engine_broker::{
    init_tracing, BatchExecutor, BatchOutcome, BrokerConfig, EngineAllocators, GroupSignaler,
    ProcessRegistry, ScriptExecutor,
};

enum Invocation {
    Run { file: PathBuf, timeout: Option<Duration> },
    Batch { files: Vec<PathBuf> },
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Invocation> {
    match args.next().as_deref() {
        Some("run") => {
            let file = args.next().context("missing script file")?;
            let timeout = args
                .next()
                .map(|ms| ms.parse::<u64>().map(Duration::from_millis))
                .transpose()
                .context("timeout must be whole milliseconds")?;
            Ok(Invocation::Run {
                file: PathBuf::from(file),
                timeout,
            })
        }
        Some("batch") => {
            let files: Vec<PathBuf> = args.map(PathBuf::from).collect();
            if files.is_empty() {
                bail!("batch needs at least one script file");
            }
            Ok(Invocation::Batch { files })
        }
        _ => bail!("usage: broker run <file> [timeout_ms] | broker batch <file>..."),
    }
}

fn load_config() -> anyhow::Result<BrokerConfig> {
    let config = match std::env::var("BROKER_CONFIG") {
        Ok(path) => BrokerConfig::from_json_file(&path)?,
        Err(_) => BrokerConfig::from_env()?,
    };
    Ok(config)
}

async fn dispatch(executor: ScriptExecutor, invocation: Invocation) -> anyhow::Result<bool> {
    match invocation {
        Invocation::Run { file, timeout } => {
            let source = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            match executor.execute(&source, timeout).await {
                Ok(output) => {
                    print!("{}", output);
                    Ok(true)
                }
                Err(e) => {
                    error!(error = %e, kind = e.kind(), "Script failed");
                    eprintln!("{:?}", miette::Report::new(e));
                    Ok(false)
                }
            }
        }
        Invocation::Batch { files } => {
            let mut items = Vec::with_capacity(files.len());
            for file in files {
                let source = tokio::fs::read_to_string(&file)
                    .await
                    .with_context(|| format!("reading {}", file.display()))?;
                items.push(BatchItem::new(file.display().to_string(), source));
            }

            let results = BatchExecutor::new(executor).run(items).await?;
            let mut all_ok = true;
            for result in results {
                match result.outcome {
                    BatchOutcome::Succeeded { artifact, .. } => {
                        println!("ok    {} ({} bytes)", result.name, artifact.len());
                    }
                    BatchOutcome::Failed { error } => {
                        all_ok = false;
                        println!("fail  {}: {}", result.name, error);
                    }
                }
            }
            Ok(all_ok)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let invocation = parse_args(std::env::args().skip(1))?;
    let config = load_config()?;

    info!(
        interpreter = %config.interpreter,
        scratch_dir = %config.scratch_dir.display(),
        "Engine broker starting"
    );

    let allocators = EngineAllocators::new();
    for stats in allocators.stats() {
        info!(kind = stats.kind.as_str(), capacity = stats.capacity, "Allocator ready");
    }

    let termination = Arc::new(HostTermination::install().context("installing signal handlers")?);
    let shutdown = termination.listen().context("subscribing to termination signals")?;

    let registry = ProcessRegistry::with_grace(Arc::new(GroupSignaler::new()), config.kill_grace);
    let executor = ScriptExecutor::new(config, registry.clone(), termination);

    // Kept alive across the shutdown branch so workers stay tracked until killed
    let work = dispatch(executor, invocation);
    tokio::pin!(work);

    let (succeeded, report) = tokio::select! {
        result = &mut work => (result?, registry.kill_all().await),
        signal = shutdown => {
            warn!(%signal, "Shutdown requested");
            (false, registry.kill_all().await)
        }
    };

    if report.total() > 0 {
        info!(exited = report.exited, abandoned = report.abandoned, "Workers terminated at shutdown");
    }

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn test_parse_run() {
        match parse_args(args(&["run", "a.scd", "500"])).unwrap() {
            Invocation::Run { file, timeout } => {
                assert_eq!(file, PathBuf::from("a.scd"));
                assert_eq!(timeout, Some(Duration::from_millis(500)));
            }
            Invocation::Batch { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_args(args(&[])).is_err());
        assert!(parse_args(args(&["run"])).is_err());
        assert!(parse_args(args(&["run", "a.scd", "soon"])).is_err());
        assert!(parse_args(args(&["batch"])).is_err());
    }
}
