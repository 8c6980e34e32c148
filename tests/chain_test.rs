//! Integration tests for chained groups: fan-out feeding fan-in, multi-stage
//! pipelines, and how failures travel (or don't) between stages.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use workgroup::{Error, Generator, IterSource, Options, Parallelism, Sink, Source, WorkGroup};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Job {
    id: u64,
    label: String,
}

fn jobs(count: u64) -> impl Source<Job> {
    Generator::new(move |sink: Sink<Job>| async move {
        for id in 0..count {
            let job = Job {
                id,
                label: format!("job-{id}"),
            };
            sink.send(job).await;
        }
    })
}

fn collector<W: Clone + Send + 'static>(group: &WorkGroup<W>) -> Arc<Mutex<Vec<W>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    group
        .with(move |_, item: W| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(item);
            }
        })
        .unwrap();
    seen
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn fan_out_into_fan_in_delivers_everything_once() {
    for workers in [2, 8] {
        let fan_out = WorkGroup::<Job>::fan_out(workers);
        fan_out
            .drain(jobs(100))
            .unwrap()
            .with(|_, job: Job| async move {
                tokio::time::sleep(Duration::from_millis(job.id % 5)).await;
            })
            .unwrap();

        let fan_in = WorkGroup::<Job>::fan_in();
        fan_in.drain(fan_out).unwrap();
        let seen = collector(&fan_in);

        let summary = fan_in.start().await.unwrap();
        assert_eq!(summary.received, 100);

        let seen = seen.lock().unwrap();
        let mut counts: HashMap<u64, usize> = HashMap::new();
        for job in seen.iter() {
            assert_eq!(job.label, format!("job-{}", job.id));
            *counts.entry(job.id).or_default() += 1;
        }
        assert_eq!(counts.len(), 100, "workers = {workers}");
        assert!(counts.values().all(|n| *n == 1));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn three_stage_pipeline_passes_items_through() {
    let parse = WorkGroup::<u64>::with_parallelism(
        Options::workers(4).name("parse"),
        Parallelism::new(4),
    );
    parse
        .drain(IterSource::new(0..60u64))
        .unwrap()
        .with(|_, _: u64| async {})
        .unwrap();

    let enrich = WorkGroup::<u64>::with_parallelism(
        Options::workers(3).name("enrich"),
        Parallelism::new(4),
    );
    enrich.drain(parse).unwrap();
    let enriched = collector(&enrich);

    let store = WorkGroup::<u64>::fan_in_with(Options::default().name("store"));
    store.drain(enrich).unwrap();
    let stored = collector(&store);

    store.start().await.unwrap();

    let mut enriched = enriched.lock().unwrap().clone();
    let mut stored = stored.lock().unwrap().clone();
    enriched.sort_unstable();
    stored.sort_unstable();
    assert_eq!(enriched, (0..60).collect::<Vec<_>>());
    assert_eq!(stored, enriched);
}

#[tokio::test]
async fn upstream_panics_do_not_stop_items_downstream() {
    let fan_out = WorkGroup::<u64>::fan_out(2);
    fan_out
        .drain(IterSource::new(0..10u64))
        .unwrap()
        .with(|_, item: u64| async move {
            if item % 3 == 0 {
                panic!("upstream rejects {item}");
            }
        })
        .unwrap();

    let fan_in = WorkGroup::<u64>::fan_in();
    fan_in.drain(fan_out).unwrap();
    let seen = collector(&fan_in);

    fan_in.start().await.unwrap();

    let mut seen = seen.lock().unwrap().clone();
    seen.sort_unstable();
    assert_eq!(seen, (0..10).collect::<Vec<_>>());
}

#[tokio::test]
async fn misconfigured_upstream_surfaces_downstream() {
    let upstream = WorkGroup::<u64>::fan_out(2);
    upstream.drain(IterSource::new(0..10u64)).unwrap();

    let downstream = WorkGroup::<u64>::fan_in();
    downstream.drain(upstream).unwrap();
    let seen = collector(&downstream);

    let err = downstream.start().await.unwrap_err();
    match err {
        Error::Upstream { source, .. } => {
            assert!(matches!(*source, Error::MissingWorker { .. }), "{source}");
        }
        other => panic!("expected Upstream, got {other}"),
    }
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn panicking_source_is_reported() {
    let group = WorkGroup::<u64>::fan_out(2);
    group
        .drain(Generator::new(|sink: Sink<u64>| async move {
            if sink.send(1).await {
                panic!("source broke");
            }
        }))
        .unwrap();
    let seen = collector(&group);

    let err = group.start().await.unwrap_err();
    assert!(matches!(err, Error::SourcePanicked { .. }));
    assert_eq!(seen.lock().unwrap().as_slice(), &[1]);
}
