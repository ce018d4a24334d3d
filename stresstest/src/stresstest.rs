use std::io::{self, Read};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{ensure, Context, Result};
use bytesize::ByteSize;
use chunked_blob::{BlobContext, BlobDescriptor, BlobProvider, ChunkStore};
use sketches_ddsketch::DDSketch;
use tokio::sync::Semaphore;

use crate::workload::{Action, Payload, Workload, WriteMode};

const READ_BUFFER: usize = 64 * 1024;

struct WorkloadResult {
    workload: Workload,
    task_durations: DDSketch,
    failures: u64,
}

pub async fn perform_stresstest<S: ChunkStore>(
    provider: BlobProvider<S>,
    workloads: Vec<Workload>,
    duration: Duration,
) -> Result<()> {
    let provider = Arc::new(provider);
    // run the workloads concurrently
    let tasks: Vec<_> = workloads
        .into_iter()
        .map(|workload| {
            let provider = Arc::clone(&provider);
            tokio::spawn(run_workload(provider, workload, duration))
        })
        .collect();

    let finished_tasks = futures::future::join_all(tasks).await;

    for (i, task) in finished_tasks.into_iter().enumerate() {
        let WorkloadResult {
            workload,
            task_durations,
            failures,
        } = task.context("workload task panicked")?;

        let config = &workload.config;
        let ops = task_durations.count();
        let ops_ps = ops as f32 / duration.as_secs_f32();
        println!(
            "# Workload {i} `{}` (concurrency: {})",
            workload.name, config.concurrency
        );
        println!(
            "  blob sizes {}-{}",
            ByteSize::b(config.p50_size),
            ByteSize::b(config.p99_size)
        );
        println!("=> {ops} operations, {ops_ps:.2} ops/s, {failures} failures");

        if ops == 0 {
            continue;
        }
        let quantile = |q| {
            let secs = task_durations.quantile(q).ok().flatten().unwrap_or_default();
            Duration::from_secs_f64(secs)
        };
        let avg = Duration::from_secs_f64(task_durations.sum().unwrap_or_default() / ops as f64);
        let p50 = quantile(0.5);
        let p90 = quantile(0.9);
        let p99 = quantile(0.99);
        println!("  avg: {avg:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}");
    }

    let counters = provider.counters();
    println!(
        "# Chunks: {} loaded, {} stored",
        counters.reads(),
        counters.writes()
    );

    Ok(())
}

async fn run_workload<S: ChunkStore>(
    provider: Arc<BlobProvider<S>>,
    workload: Workload,
    duration: Duration,
) -> WorkloadResult {
    let concurrency = workload.config.concurrency;
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let deadline = tokio::time::Instant::now() + duration;

    let workload = Arc::new(Mutex::new(workload));
    let task_durations = Arc::new(Mutex::new(DDSketch::default()));
    let failures = Arc::new(AtomicU64::new(0));

    // See <https://docs.rs/tokio/latest/tokio/time/struct.Sleep.html#examples>
    let sleep = tokio::time::sleep_until(deadline);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            permit = semaphore.clone().acquire_owned() => {
                let Ok(permit) = permit else {
                    break;
                };
                let workload = Arc::clone(&workload);
                let provider = Arc::clone(&provider);
                let task_durations = Arc::clone(&task_durations);
                let failures = Arc::clone(&failures);

                tokio::task::spawn_blocking(move || {
                    let task_start = Instant::now();
                    let action = workload.lock().unwrap().next_action();
                    if let Err(err) = perform_action(&provider, &workload, action) {
                        tracing::error!("action failed: {err:#}");
                        failures.fetch_add(1, Ordering::Relaxed);
                    }
                    task_durations.lock().unwrap().add(task_start.elapsed().as_secs_f64());

                    // the workload has to be released before the permit
                    drop(workload);
                    drop(permit);
                });
            }
            _ = &mut sleep => {
                break;
            }
        }
    }

    // by acquiring *all* the permits, we wait for all outstanding tasks to finish
    let _permits = semaphore.acquire_many(concurrency as u32).await;

    let task_durations = std::mem::take(&mut *task_durations.lock().unwrap());
    let workload = match Arc::try_unwrap(workload) {
        Ok(workload) => workload.into_inner().unwrap(),
        Err(_) => unreachable!("all tasks finished"),
    };
    WorkloadResult {
        workload,
        task_durations,
        failures: failures.load(Ordering::Relaxed),
    }
}

fn perform_action<S: ChunkStore>(
    provider: &BlobProvider<S>,
    workload: &Mutex<Workload>,
    action: Action,
) -> Result<()> {
    match action {
        Action::Write(internal_id, payload, mode) => {
            let descriptor = write_blob(provider, payload, mode)?;
            workload.lock().unwrap().push_blob(internal_id, descriptor);
        }
        Action::Read(internal_id, descriptor, payload) => {
            verify_blob(provider, &descriptor, payload)?;
            workload.lock().unwrap().push_blob(internal_id, descriptor);
        }
        Action::Delete(descriptor) => {
            let ctx = BlobContext::new(descriptor);
            provider.delete(&ctx)?;
        }
    }
    Ok(())
}

fn write_blob<S: ChunkStore>(
    provider: &BlobProvider<S>,
    mut payload: Payload,
    mode: WriteMode,
) -> Result<BlobDescriptor> {
    let descriptor = provider.allocate(payload.len)?;
    let ctx = BlobContext::new(descriptor).with_tag("stresstest");

    match mode {
        WriteMode::Stream => {
            let mut stream = provider.open_write(&ctx);
            io::copy(&mut payload, &mut stream)?;
            stream.close()?;
        }
        WriteMode::Ranges => {
            let mut bytes = Vec::with_capacity(payload.len as usize);
            payload.read_to_end(&mut bytes)?;

            // two chunks per range, uploaded back to front
            let slice_len = 2 * ctx.descriptor.chunk_size() as usize;
            let slices: Vec<_> = bytes.chunks(slice_len).enumerate().collect();
            for (i, slice) in slices.into_iter().rev() {
                provider.write_range(&ctx, (i * slice_len) as u64, slice)?;
            }
        }
    }
    Ok(ctx.descriptor)
}

fn verify_blob<S: ChunkStore>(
    provider: &BlobProvider<S>,
    descriptor: &BlobDescriptor,
    mut payload: Payload,
) -> Result<()> {
    let ctx = BlobContext::new(descriptor.clone()).with_tag("stresstest");
    let mut stream = provider.open_read(&ctx);

    let mut expected = vec![0; READ_BUFFER];
    let mut loaded = vec![0; READ_BUFFER];
    let mut position = 0;
    loop {
        let n = stream.read(&mut loaded)?;
        payload.read_exact(&mut expected[..n])?;
        ensure!(
            loaded[..n] == expected[..n],
            "{descriptor} differs within {position}..{}",
            position + n
        );
        if n == 0 {
            break;
        }
        position += n;
    }
    ensure!(
        payload.len == 0,
        "{descriptor} ended {} bytes early",
        payload.len
    );
    Ok(())
}
