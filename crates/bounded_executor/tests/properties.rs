use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bounded_executor::{Executor, TaskStatus};
use proptest::prelude::*;

struct Batch {
    results: Vec<u64>,
    statuses: Vec<TaskStatus>,
    peak: usize,
    reported_peak: usize,
}

fn run_batch(limit: usize, jobs: &[(u64, bool)]) -> Batch {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .expect("failed to build runtime");

    runtime.block_on(async {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut executor = Executor::<u64, String>::new(limit).unwrap();
        for &(delay, fail) in jobs {
            let running = running.clone();
            let peak = peak.clone();
            executor
                .submit(move || async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    if fail {
                        Err(format!("job with delay {delay} failed"))
                    } else {
                        Ok(delay)
                    }
                })
                .unwrap();
        }

        let stats = executor.run().await.unwrap();
        Batch {
            results: executor.collect_results(),
            statuses: executor.statuses(),
            peak: peak.load(Ordering::SeqCst),
            reported_peak: stats.peak_concurrent_tasks,
        }
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn in_flight_never_exceeds_limit(
        limit in 1usize..6,
        jobs in prop::collection::vec((0u64..200, prop::bool::weighted(0.25)), 0..25),
    ) {
        let batch = run_batch(limit, &jobs);

        let bound = limit.min(jobs.len());
        prop_assert!(batch.peak <= bound);
        prop_assert!(batch.reported_peak <= bound);
        if !jobs.is_empty() {
            prop_assert_eq!(batch.reported_peak, bound);
        }

        prop_assert!(batch.statuses.iter().all(TaskStatus::is_terminal));

        let expected: Vec<u64> = jobs
            .iter()
            .filter(|(_, fail)| !fail)
            .map(|(delay, _)| *delay)
            .collect();
        prop_assert_eq!(batch.results, expected);
    }
}
