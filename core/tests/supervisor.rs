#![cfg(unix)]

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use tajaa_core::config::SupervisorConfig;
use tajaa_core::error::SupervisorError;
use tajaa_core::runner::EXIT_NOT_LAUNCHED;
use tajaa_core::supervisor::{Task, TaskCallback, TaskId, TaskStatus, TaskSupervisor};

use common::{
    eventually, first_line_pid, process_alive, process_exists, Breakage, BrokenLauncher, SpyLauncher,
};

const SETTLE: Duration = Duration::from_secs(5);

fn cfg(max: usize) -> SupervisorConfig {
    SupervisorConfig {
        cancel_grace_ms: 500,
        ..SupervisorConfig::default().with_max_concurrent(max)
    }
}

fn status(sup: &TaskSupervisor, id: TaskId) -> TaskStatus {
    sup.get(id).expect("known task").status
}

#[tokio::test]
async fn burst_never_exceeds_the_ceiling() {
    let sup = TaskSupervisor::new(cfg(2)).unwrap();
    let ids: Vec<_> = (0..5)
        .map(|i| sup.submit(format!("sleeper{i}"), "sleep 30", None))
        .collect();

    assert_eq!(sup.list_running().len(), 2);
    assert_eq!(sup.running_count(), 2);
    assert_eq!(sup.pending_count(), 3);
    assert_eq!(status(&sup, ids[0]), TaskStatus::Running);
    assert_eq!(status(&sup, ids[1]), TaskStatus::Running);
    assert_eq!(status(&sup, ids[2]), TaskStatus::Pending);

    for _ in 0..10 {
        assert!(sup.list_running().len() <= 2);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(sup.cancel_all().await, 5);
    assert!(sup.list().iter().all(|t| t.status == TaskStatus::Cancelled));
    assert_eq!(sup.running_count(), 0);
    assert_eq!(sup.pending_count(), 0);
}

#[tokio::test]
async fn fewer_tasks_than_slots_all_start() {
    let sup = TaskSupervisor::new(cfg(5)).unwrap();
    for i in 0..3 {
        sup.submit(format!("t{i}"), "sleep 30", None);
    }
    assert_eq!(sup.list_running().len(), 3);
    assert_eq!(sup.pending_count(), 0);
    sup.cancel_all().await;
}

#[tokio::test]
async fn admission_is_fifo() {
    let sup = TaskSupervisor::new(cfg(1)).unwrap();
    let a = sup.submit("a", "sleep 0.2", None);
    let b = sup.submit("b", "sleep 30", None);
    let c = sup.submit("c", "sleep 30", None);

    assert_eq!(status(&sup, a), TaskStatus::Running);
    assert_eq!(status(&sup, b), TaskStatus::Pending);
    assert_eq!(status(&sup, c), TaskStatus::Pending);

    let done = sup.wait(a, Some(SETTLE)).await.unwrap();
    assert_eq!(done.status, TaskStatus::Completed);

    assert!(eventually(SETTLE, || status(&sup, b) == TaskStatus::Running).await);
    assert_eq!(status(&sup, c), TaskStatus::Pending);

    sup.cancel_all().await;
}

#[tokio::test]
async fn cancelling_pending_never_spawns() {
    let spy = SpyLauncher::new();
    let sup = TaskSupervisor::with_launcher(cfg(1), spy.clone()).unwrap();

    let running = sup.submit("running", "sleep 30", None);
    let queued = sup.submit("queued", "echo never", None);
    assert!(eventually(SETTLE, || spy.launches() == 1).await);

    assert!(sup.cancel(queued).await);
    assert_eq!(status(&sup, queued), TaskStatus::Cancelled);
    assert!(sup.get(queued).unwrap().started_at.is_none());

    assert!(sup.cancel(running).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(spy.launches(), 1);
    assert_eq!(spy.commands(), vec!["sleep 30".to_string()]);
}

#[tokio::test]
async fn cancel_running_terminates_the_process() {
    let sup = TaskSupervisor::new(cfg(2)).unwrap();
    let id = sup.submit("long", "sleep 30", None);

    assert!(eventually(SETTLE, || sup.get(id).and_then(|t| t.pid).is_some()).await);
    let pid = sup.get(id).unwrap().pid.unwrap();

    let started = Instant::now();
    assert!(sup.cancel(id).await);
    assert!(started.elapsed() < Duration::from_secs(3));

    let task = sup.get(id).unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert!(task.completed_at.is_some());
    assert_eq!(sup.running_count(), 0);
    assert!(!process_exists(pid));

    // Already terminal.
    assert!(!sup.cancel(id).await);
}

#[tokio::test]
async fn cancelled_task_stays_running_until_its_process_is_reaped() {
    let sup = TaskSupervisor::new(SupervisorConfig {
        cancel_grace_ms: 1500,
        ..SupervisorConfig::default().with_max_concurrent(1)
    })
    .unwrap();
    let seen = Arc::new(Mutex::new(Vec::<Task>::new()));
    let sink = Arc::clone(&seen);
    let id = sup.submit(
        "stubborn",
        "trap '' TERM; sleep 30 & echo $!; wait",
        Some(Arc::new(move |task: &Task| sink.lock().unwrap().push(task.clone()))),
    );
    let queued = sup.submit("queued", "true", None);

    assert!(eventually(SETTLE, || !sup.output(id).is_empty()).await);
    let leader = sup.get(id).unwrap().pid.expect("shell was launched");
    let background = first_line_pid(&sup.output(id));

    let started = Instant::now();
    let cancelling = tokio::spawn({
        let sup = sup.clone();
        async move { sup.cancel(id).await }
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    let task = sup.get(id).unwrap();
    assert_eq!(task.status, TaskStatus::Running);
    assert!(task.completed_at.is_none());
    assert_eq!(sup.list_running().len(), 1);
    assert_eq!(sup.running_count(), 1);
    assert_eq!(status(&sup, queued), TaskStatus::Pending);
    assert!(seen.lock().unwrap().is_empty());
    // Cancel already in flight.
    assert!(!sup.cancel(id).await);

    assert!(cancelling.await.unwrap());
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(1500), "took {elapsed:?}");
    assert!(elapsed < Duration::from_secs(4), "took {elapsed:?}");

    let task = sup.get(id).unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert_eq!(task.exit_code, Some(-libc::SIGKILL));
    assert!(!process_exists(leader));
    assert!(eventually(Duration::from_secs(2), || !process_alive(background)).await);

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].status, TaskStatus::Cancelled);
    assert_eq!(seen[0].exit_code, Some(-libc::SIGKILL));

    sup.wait(queued, Some(SETTLE)).await;
    assert_eq!(status(&sup, queued), TaskStatus::Completed);
}

#[tokio::test]
async fn cancel_takes_down_the_whole_pipeline() {
    let sup = TaskSupervisor::new(cfg(1)).unwrap();
    let id = sup.submit("pipeline", "sleep 30 & echo $!; sleep 30 | cat", None);

    assert!(eventually(SETTLE, || !sup.output(id).is_empty()).await);
    let background = first_line_pid(&sup.output(id));

    let started = Instant::now();
    assert!(sup.cancel(id).await);
    assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
    assert_eq!(status(&sup, id), TaskStatus::Cancelled);
    assert!(eventually(Duration::from_secs(2), || !process_alive(background)).await);
}

#[tokio::test]
async fn cancel_unknown_or_finished_is_a_noop() {
    let sup = TaskSupervisor::new(cfg(2)).unwrap();
    assert!(!sup.cancel(TaskId(999)).await);

    let id = sup.submit("quick", "true", None);
    sup.wait(id, Some(SETTLE)).await;
    assert!(!sup.cancel(id).await);
    assert_eq!(status(&sup, id), TaskStatus::Completed);
}

#[tokio::test]
async fn cancel_all_is_idempotent() {
    let sup = TaskSupervisor::new(cfg(1)).unwrap();
    sup.submit("a", "sleep 30", None);
    sup.submit("b", "sleep 30", None);

    assert_eq!(sup.cancel_all().await, 2);
    assert_eq!(sup.cancel_all().await, 0);
    assert!(sup.list().iter().all(|t| t.status == TaskStatus::Cancelled));
}

#[tokio::test]
async fn ring_buffer_keeps_the_newest_lines() {
    let sup = TaskSupervisor::new(cfg(1)).unwrap();
    let id = sup.submit("chatty", "seq 1 1500", None);
    let task = sup.wait(id, Some(SETTLE)).await.unwrap();

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.stdout.len(), 1000);
    let expected: Vec<String> = (501..=1500).map(|n| n.to_string()).collect();
    assert_eq!(task.stdout, expected);
    assert_eq!(task.stdout_dropped, 500);
    assert!(task.truncated());
    assert_eq!(sup.output(id), expected.join("\n"));
}

#[tokio::test]
async fn stderr_buffer_is_smaller() {
    let sup = TaskSupervisor::new(cfg(1)).unwrap();
    let id = sup.submit("noisy", "sh -c 'seq 1 600 1>&2'", None);
    let task = sup.wait(id, Some(SETTLE)).await.unwrap();

    assert_eq!(task.stderr.len(), 500);
    assert_eq!(task.stderr.first().map(String::as_str), Some("101"));
    assert_eq!(task.stderr_dropped, 100);
    assert_eq!(task.stdout_dropped, 0);
}

#[tokio::test]
async fn observer_stream_matches_task_buffer() {
    let sup = TaskSupervisor::new(cfg(2)).unwrap();
    let seen = Arc::new(Mutex::new(Vec::<(TaskId, String)>::new()));
    let sink = Arc::clone(&seen);
    let obs = sup.add_observer(Arc::new(move |task: Option<TaskId>, line: &str| {
        if let Some(id) = task {
            sink.lock().unwrap().push((id, line.to_string()));
        }
    }));

    let id = sup.submit("count", "seq 1 300", None);
    sup.wait(id, Some(SETTLE)).await;

    let streamed: Vec<String> = seen
        .lock()
        .unwrap()
        .iter()
        .filter(|(t, _)| *t == id)
        .map(|(_, l)| l.clone())
        .collect();
    assert_eq!(streamed.join("\n"), sup.output(id));
    assert!(sup.remove_observer(obs));
}

#[tokio::test]
async fn callback_fires_once_per_terminal_transition() {
    let sup = TaskSupervisor::new(cfg(1)).unwrap();
    let calls = Arc::new(Mutex::new(Vec::<(String, TaskStatus)>::new()));
    let sink = Arc::clone(&calls);
    let cb: Arc<dyn TaskCallback> = Arc::new(move |task: &Task| {
        sink.lock().unwrap().push((task.name.clone(), task.status));
    });

    let ok = sup.submit("ok", "true", Some(cb.clone()));
    let bad = sup.submit("bad", "sh -c 'exit 4'", Some(cb.clone()));
    let queued = sup.submit("queued", "sleep 30", Some(cb.clone()));
    let never = sup.submit("never", "sleep 30", Some(cb));

    sup.wait(ok, Some(SETTLE)).await;
    sup.wait(bad, Some(SETTLE)).await;
    assert!(eventually(SETTLE, || status(&sup, queued) == TaskStatus::Running).await);
    assert!(eventually(SETTLE, || calls.lock().unwrap().len() == 2).await);
    sup.cancel(never).await;
    sup.cancel(queued).await;
    sup.cancel(queued).await;

    let calls = calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![
            ("ok".to_string(), TaskStatus::Completed),
            ("bad".to_string(), TaskStatus::Failed),
            ("never".to_string(), TaskStatus::Cancelled),
            ("queued".to_string(), TaskStatus::Cancelled),
        ]
    );
    assert_eq!(sup.get(bad).unwrap().exit_code, Some(4));
}

#[tokio::test]
async fn launch_failure_marks_task_failed() {
    let sup = TaskSupervisor::new(cfg(1)).unwrap();
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    let id = sup.submit(
        "empty",
        "   ",
        Some(Arc::new(move |_: &Task| {
            counter.fetch_add(1, Ordering::SeqCst);
        })),
    );

    let task = sup.wait(id, Some(SETTLE)).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.exit_code, None);
    assert!(task.stderr.iter().any(|l| l.contains("empty command")));
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    let result = sup.result(id).unwrap();
    assert_eq!(result.exit_code, EXIT_NOT_LAUNCHED);
    assert!(!result.success);

    // The slot was released and the next task is admitted.
    let next = sup.submit("next", "true", None);
    let next = sup.wait(next, Some(SETTLE)).await.unwrap();
    assert_eq!(next.status, TaskStatus::Completed);
}

#[tokio::test]
async fn stdout_read_error_marks_task_failed() {
    let sup = TaskSupervisor::with_launcher(
        cfg(1),
        BrokenLauncher::new(Breakage::StdoutRead("pipe torn")),
    )
    .unwrap();
    let id = sup.submit("torn", "anything", None);

    let task = sup.wait(id, Some(SETTLE)).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(
        task.stderr.iter().any(|l| l.contains("stream io error: stdout pipe torn")),
        "{:?}",
        task.stderr
    );
    assert_eq!(sup.running_count(), 0);
}

#[tokio::test]
async fn wait_error_marks_task_failed() {
    let sup = TaskSupervisor::with_launcher(
        cfg(1),
        BrokenLauncher::new(Breakage::Wait("child vanished")),
    )
    .unwrap();
    let id = sup.submit("vanished", "anything", None);

    let task = sup.wait(id, Some(SETTLE)).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.exit_code, None);
    assert!(task.stderr.iter().any(|l| l.contains("wait failed: child vanished")));
}

#[tokio::test]
async fn result_and_forget() {
    let sup = TaskSupervisor::new(cfg(1)).unwrap();
    let id = sup.submit("hello", "echo hello", None);
    let blocker = sup.submit("blocker", "sleep 30", None);

    assert!(sup.result(blocker).is_none());
    assert!(!sup.forget(blocker));

    sup.wait(id, Some(SETTLE)).await;
    let result = sup.result(id).unwrap();
    assert_eq!(result.output, "hello");
    assert_eq!(result.name.as_deref(), Some("hello"));
    assert!(result.success);

    assert!(sup.forget(id));
    assert!(sup.get(id).is_none());
    assert_eq!(sup.output(id), "");
    assert!(!sup.forget(id));
    assert_eq!(sup.list().len(), 1);

    sup.cancel_all().await;
}

#[tokio::test]
async fn wait_times_out_on_a_live_task() {
    let sup = TaskSupervisor::new(cfg(1)).unwrap();
    let id = sup.submit("long", "sleep 30", None);

    let snap = sup.wait(id, Some(Duration::from_millis(100))).await.unwrap();
    assert_eq!(snap.status, TaskStatus::Running);
    assert!(sup.wait(TaskId(4242), None).await.is_none());

    sup.cancel_all().await;
}

#[tokio::test]
async fn ids_are_unique_and_increasing() {
    let sup = TaskSupervisor::new(cfg(3)).unwrap();
    let ids: Vec<_> = (0..4).map(|i| sup.submit(format!("t{i}"), "true", None)).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted, ids);

    let listed: Vec<_> = sup.list().iter().map(|t| t.id).collect();
    assert_eq!(listed, ids);
    for id in ids {
        sup.wait(id, Some(SETTLE)).await;
    }
}

#[tokio::test]
async fn construction_rejects_bad_limits() {
    assert_eq!(
        TaskSupervisor::new(cfg(0)).err(),
        Some(SupervisorError::InvalidCeiling(0))
    );

    let no_stdout = SupervisorConfig {
        stdout_capacity: 0,
        ..SupervisorConfig::default()
    };
    assert_eq!(
        TaskSupervisor::new(no_stdout).err(),
        Some(SupervisorError::InvalidCapacity { stream: "stdout" })
    );
}

#[test]
fn construction_outside_a_runtime_is_rejected() {
    assert_eq!(
        TaskSupervisor::new(SupervisorConfig::default()).err(),
        Some(SupervisorError::NoRuntime)
    );
}
