use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bounded_executor::{Executor, TaskError, TaskStatus};
use parking_lot::Mutex;
use rand::Rng;

/// Records start/finish events and the number of producers running at once.
#[derive(Clone, Default)]
struct Trace {
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    log: Arc<Mutex<Vec<(usize, &'static str)>>>,
}

impl Trace {
    fn enter(&self, index: usize) {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.log.lock().push((index, "start"));
    }

    fn exit(&self, index: usize) {
        self.log.lock().push((index, "end"));
        self.running.fetch_sub(1, Ordering::SeqCst);
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn log(&self) -> Vec<(usize, &'static str)> {
        self.log.lock().clone()
    }
}

fn submit_sleeper(
    executor: &mut Executor<usize, String>,
    trace: &Trace,
    index: usize,
    delay: Duration,
    fail: bool,
) {
    let trace = trace.clone();
    executor
        .submit(move || async move {
            trace.enter(index);
            tokio::time::sleep(delay).await;
            trace.exit(index);
            if fail {
                Err(format!("task {index} failed"))
            } else {
                Ok(index)
            }
        })
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn scenario_a_random_delays_limit_three() {
    let trace = Trace::default();
    let mut executor = Executor::<usize, String>::new(3).unwrap();
    let mut rng = rand::thread_rng();
    let mut failing = Vec::new();
    for index in 0..10 {
        let fail = rng.gen_bool(0.2);
        if fail {
            failing.push(index);
        }
        let delay = Duration::from_millis(rng.gen_range(0..4_000));
        submit_sleeper(&mut executor, &trace, index, delay, fail);
    }

    let stats = executor.run().await.unwrap();

    let expected: Vec<usize> = (0..10).filter(|i| !failing.contains(i)).collect();
    assert_eq!(executor.collect_results(), expected);
    assert!(trace.peak() <= 3);
    assert!(stats.peak_concurrent_tasks <= 3);
    assert_eq!(stats.failed_tasks, failing.len());
    assert!(executor.statuses().iter().all(TaskStatus::is_terminal));
}

#[tokio::test(start_paused = true)]
async fn scenario_b_limit_one_runs_strictly_in_order() {
    let trace = Trace::default();
    let mut executor = Executor::<usize, String>::new(1).unwrap();
    let delays = [50, 10, 40, 5, 20];
    for (index, delay) in delays.into_iter().enumerate() {
        submit_sleeper(&mut executor, &trace, index, Duration::from_millis(delay), false);
    }

    executor.run().await.unwrap();

    let expected: Vec<(usize, &str)> = (0..5).flat_map(|i| [(i, "start"), (i, "end")]).collect();
    assert_eq!(trace.log(), expected);
    assert_eq!(trace.peak(), 1);
    assert_eq!(executor.collect_results(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn scenario_c_limit_above_task_count_starts_everything() {
    let trace = Trace::default();
    let mut executor = Executor::<usize, String>::new(5).unwrap();
    for index in 0..3 {
        submit_sleeper(&mut executor, &trace, index, Duration::from_millis(100), false);
    }

    let stats = executor.run().await.unwrap();

    let log = trace.log();
    assert!(log[..3].iter().all(|(_, event)| *event == "start"));
    assert_eq!(trace.peak(), 3);
    assert_eq!(stats.peak_concurrent_tasks, 3);
    assert_eq!(executor.collect_results(), vec![0, 1, 2]);
}

#[tokio::test]
async fn scenario_d_empty_batch_resolves() {
    let mut executor = Executor::<usize, String>::new(4).unwrap();

    let stats = tokio::time::timeout(Duration::from_secs(1), executor.run())
        .await
        .expect("an empty batch should resolve immediately")
        .unwrap();

    assert_eq!(stats.total_tasks, 0);
    assert!(executor.collect_results().is_empty());
}

#[tokio::test(start_paused = true)]
async fn scenario_e_failure_is_isolated() {
    let trace = Trace::default();
    let mut executor = Executor::<usize, String>::new(2).unwrap();
    submit_sleeper(&mut executor, &trace, 1, Duration::ZERO, true);
    submit_sleeper(&mut executor, &trace, 2, Duration::from_millis(30), false);
    submit_sleeper(&mut executor, &trace, 3, Duration::from_millis(10), false);

    let stats = executor.run().await.unwrap();

    assert_eq!(executor.collect_results(), vec![2, 3]);
    assert_eq!(stats.successful_tasks, 2);
    assert_eq!(stats.failed_tasks, 1);

    let outcomes = executor.outcomes();
    assert_eq!(
        outcomes[0],
        Some(Err(TaskError::Failed("task 1 failed".to_string())))
    );
    assert_eq!(outcomes[1], Some(Ok(2)));
    assert_eq!(outcomes[2], Some(Ok(3)));
}

#[tokio::test(start_paused = true)]
async fn refill_takes_first_pending_task() {
    let trace = Trace::default();
    let mut executor = Executor::<usize, String>::new(2).unwrap();
    // Task 1 finishes first, so task 2 must take its slot before task 3.
    submit_sleeper(&mut executor, &trace, 0, Duration::from_millis(100), false);
    submit_sleeper(&mut executor, &trace, 1, Duration::from_millis(10), false);
    submit_sleeper(&mut executor, &trace, 2, Duration::from_millis(100), false);
    submit_sleeper(&mut executor, &trace, 3, Duration::from_millis(10), false);

    executor.run().await.unwrap();

    let starts: Vec<usize> = trace
        .log()
        .into_iter()
        .filter(|(_, event)| *event == "start")
        .map(|(index, _)| index)
        .collect();
    assert_eq!(starts, vec![0, 1, 2, 3]);
    assert_eq!(
        trace.log()[..4],
        [(0, "start"), (1, "start"), (1, "end"), (2, "start")]
    );
}
