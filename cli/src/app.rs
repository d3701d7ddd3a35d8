use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tajaa_core::config::AppConfig;
use tajaa_core::decoder::Findings;
use tajaa_core::error::CliError;
use tajaa_core::runner::{ExecutionResult, EXIT_NOT_LAUNCHED};
use tajaa_core::supervisor::{Task, TaskStatus};
use tajaa_core::TaskCallback;
use tajaa_plugins::factory;

use crate::commands::cli::{BatchArgs, ChainArgs, ParallelArgs, RunArgs};

/// Exit code when the command never started.
pub const EXIT_LAUNCH_FAILED: i32 = 20;
/// Exit code after a timeout, same as coreutils `timeout`.
pub const EXIT_TIMED_OUT: i32 = 124;
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Serialize)]
struct RunReport<'a> {
    result: &'a ExecutionResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    findings: Option<&'a Findings>,
}

pub async fn run_cmd(args: RunArgs, cfg: &AppConfig) -> Result<i32, CliError> {
    let runner = factory::build_runner(cfg);
    let stream = !args.output.quiet && !args.output.json;
    if let Some(obs) = factory::build_console_observer(!stream, false) {
        runner.add_observer(obs);
    }

    let timeout = match args.timeout {
        Some(secs) => Some(
            Duration::try_from_secs_f64(secs)
                .map_err(|e| CliError::Command(format!("invalid --timeout {secs}: {e}")))?,
        ),
        None => cfg.runner.default_timeout(),
    };

    let result = runner.run(&args.command, stream, timeout).await;
    let findings = args
        .tool
        .as_deref()
        .map(|tool| factory::build_decoders().decode(tool, &result.output));

    if args.output.json {
        let report = RunReport {
            result: &result,
            findings: findings.as_ref(),
        };
        print_json(&report)?;
    } else {
        if !stream && !result.output.is_empty() {
            println!("{}", result.output);
        }
        if !result.errors.is_empty() {
            eprintln!("{}", result.errors);
        }
        if let Some(f) = findings.as_ref() {
            for (key, items) in f.iter() {
                println!("{key}: {}", items.len());
            }
        }
        eprintln!("{}", summary_line(&result));
    }

    Ok(exit_code_for_result(&result))
}

pub async fn chain_cmd(args: ChainArgs, cfg: &AppConfig) -> Result<i32, CliError> {
    let runner = factory::build_runner(cfg);
    let echo = !args.output.quiet && !args.output.json;
    if let Some(obs) = factory::build_console_observer(!echo, false) {
        runner.add_observer(obs);
    }

    let results = runner.run_chain(&args.commands, !args.keep_going).await;
    report_batch(&results, args.output.json)?;

    let all_ran = results.len() == args.commands.len();
    Ok(if all_ran && results.iter().all(|r| r.success) {
        0
    } else {
        1
    })
}

pub async fn parallel_cmd(args: ParallelArgs, cfg: &AppConfig) -> Result<i32, CliError> {
    let runner = factory::build_runner(cfg);
    let max = args.max.unwrap_or(cfg.parallel.max_concurrent);

    let results = runner.run_parallel(&args.commands, max).await;
    report_batch(&results, args.json)?;

    Ok(if results.iter().all(|r| r.success) { 0 } else { 1 })
}

pub async fn batch_cmd(args: BatchArgs, cfg: &AppConfig) -> Result<i32, CliError> {
    let mut cfg = cfg.clone();
    if let Some(max) = args.max {
        cfg.supervisor.max_concurrent = max;
    }
    let supervisor = factory::build_supervisor(&cfg)?;
    let echo = !args.output.quiet && !args.output.json;
    if let Some(obs) = factory::build_console_observer(!echo, true) {
        supervisor.add_observer(obs);
    }

    let announce: Option<Arc<dyn TaskCallback>> = (!args.output.json).then(|| {
        let cb: Arc<dyn TaskCallback> = Arc::new(|task: &Task| {
            eprintln!("[{}] {} {}", task.id, task.name, task.status);
        });
        cb
    });

    let ids: Vec<_> = args
        .commands
        .iter()
        .map(|c| supervisor.submit(c.name.clone(), c.command.clone(), announce.clone()))
        .collect();
    tracing::info!(tasks = ids.len(), max = cfg.supervisor.max_concurrent, "batch submitted");

    let wait_all = futures::future::join_all(ids.iter().map(|id| supervisor.wait(*id, None)));
    tokio::pin!(wait_all);

    let interrupted = tokio::select! {
        _ = &mut wait_all => false,
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                tracing::warn!(error = %e, "ctrl-c handler failed");
            }
            let n = supervisor.cancel_all().await;
            eprintln!("interrupted, cancelled {n} task(s)");
            wait_all.await;
            true
        }
    };

    let tasks: Vec<Task> = ids.iter().filter_map(|id| supervisor.get(*id)).collect();
    if args.output.json {
        print_json(&tasks)?;
    } else {
        for task in &tasks {
            println!("{}", task_line(task));
        }
    }

    if interrupted {
        return Ok(EXIT_INTERRUPTED);
    }
    Ok(
        if tasks.iter().all(|t| t.status == TaskStatus::Completed) {
            0
        } else {
            1
        },
    )
}

fn report_batch(results: &[ExecutionResult], json: bool) -> Result<(), CliError> {
    if json {
        return print_json(&results);
    }
    for r in results {
        println!("{}", summary_line(r));
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let s = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::Command(format!("serialize output: {e}")))?;
    println!("{s}");
    Ok(())
}

/// Map a foreground result to the process exit code.
pub fn exit_code_for_result(result: &ExecutionResult) -> i32 {
    if result.timed_out {
        return EXIT_TIMED_OUT;
    }
    match result.exit_code {
        EXIT_NOT_LAUNCHED if !result.launched() => EXIT_LAUNCH_FAILED,
        code if code < 0 => 128 - code,
        code => code,
    }
}

pub fn summary_line(r: &ExecutionResult) -> String {
    let mark = if r.success { "✓" } else { "✗" };
    let name = r.name.as_deref().unwrap_or("command");
    let detail = if r.timed_out {
        "timed out".to_string()
    } else if !r.launched() {
        "not launched".to_string()
    } else {
        format!("exit {}", r.exit_code)
    };
    format!("{mark} {name}: {detail} ({}ms)", r.duration_ms)
}

pub fn task_line(t: &Task) -> String {
    let code = t
        .exit_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "-".to_string());
    let mut line = format!(
        "{:<10} {:<12} {:<10} exit={code}",
        t.id.to_string(),
        t.name,
        t.status.as_str()
    );
    if t.truncated() {
        line.push_str(&format!(
            " (dropped {} stdout / {} stderr lines)",
            t.stdout_dropped, t.stderr_dropped
        ));
    }
    line
}
