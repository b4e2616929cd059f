use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use ulid::Ulid;

use hostelres::auth::Claims;
use hostelres::directory::StaticRoomDirectory;
use hostelres::engine::{Engine, EngineError};
use hostelres::model::{NewReservation, ReservationFilter};
use hostelres::notify::NotifyHub;

const HOUR: i64 = 3_600_000; // 1 hour in ms
const T0: i64 = 1_767_225_600_000; // 2026-01-01T00:00:00Z

fn bench_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("hostelres_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).expect("create bench dir");
    dir
}

fn open(dir: &Path, name: &str, rooms: &[Ulid]) -> Arc<Engine> {
    let directory = Arc::new(StaticRoomDirectory::new(rooms.iter().copied()));
    Arc::new(
        Engine::new(dir.join(format!("{name}.wal")), directory, Arc::new(NotifyHub::new()))
            .expect("open engine"),
    )
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

async fn phase1_sequential(dir: &Path) {
    let room = Ulid::new();
    let engine = open(dir, "sequential", &[room]);
    let desk = Claims::staff(Ulid::new());

    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();
    for i in 0..n {
        let s = T0 + (i as i64) * HOUR;
        let t = Instant::now();
        engine
            .create(&desk, NewReservation::new(room, Ulid::new(), s, s + HOUR))
            .await
            .expect("sequential create");
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} reservations in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

async fn phase2_concurrent_rooms(dir: &Path) {
    let n_tasks = 10;
    let n_per_task = 200;
    let rooms: Vec<Ulid> = (0..n_tasks).map(|_| Ulid::new()).collect();
    let engine = open(dir, "concurrent", &rooms);

    let start = Instant::now();
    let mut handles = Vec::new();
    for room in rooms {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let desk = Claims::staff(Ulid::new());
            for j in 0..n_per_task {
                let s = T0 + (j as i64) * HOUR;
                engine
                    .create(&desk, NewReservation::new(room, Ulid::new(), s, s + HOUR))
                    .await
                    .expect("concurrent create");
            }
        }));
    }
    for h in handles {
        h.await.expect("writer task");
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} rooms x {n_per_task} reservations = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

async fn phase3_contention(dir: &Path) {
    let room = Ulid::new();
    let engine = open(dir, "contention", &[room]);
    let n_tasks = 20;
    let slots = 100;

    let won = Arc::new(AtomicUsize::new(0));
    let lost = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..n_tasks {
        let engine = engine.clone();
        let won = won.clone();
        let lost = lost.clone();
        handles.push(tokio::spawn(async move {
            let guest = Ulid::new();
            let claims = Claims::guest(guest);
            for slot in 0..slots {
                let s = T0 + (slot as i64) * HOUR;
                match engine
                    .create(&claims, NewReservation::new(room, guest, s, s + HOUR))
                    .await
                {
                    Ok(_) => won.fetch_add(1, Ordering::Relaxed),
                    Err(EngineError::Conflict { .. }) => lost.fetch_add(1, Ordering::Relaxed),
                    Err(e) => panic!("unexpected error: {e}"),
                };
            }
        }));
    }
    for h in handles {
        h.await.expect("contending task");
    }

    let won = won.load(Ordering::Relaxed);
    println!(
        "  {n_tasks} tasks racing for {slots} slots: {won} won, {} conflicts in {:.2}s",
        lost.load(Ordering::Relaxed),
        start.elapsed().as_secs_f64()
    );
    assert_eq!(won, slots, "every slot must be won exactly once");
}

async fn phase4_read_under_load(dir: &Path) {
    let rooms: Vec<Ulid> = (0..5).map(|_| Ulid::new()).collect();
    let engine = open(dir, "read_load", &rooms);
    let desk = Claims::staff(Ulid::new());
    for room in &rooms {
        for i in 0..200 {
            let s = T0 + i * HOUR;
            engine
                .create(&desk, NewReservation::new(*room, Ulid::new(), s, s + HOUR))
                .await
                .expect("prefill");
        }
    }

    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for (w, room) in rooms.iter().copied().enumerate() {
        let engine = engine.clone();
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let desk = Claims::staff(Ulid::new());
            let mut i = 0i64;
            while !stop.load(Ordering::Relaxed) {
                let s = T0 + (1000 + w as i64 * 10_000 + i) * HOUR;
                let _ = engine
                    .create(&desk, NewReservation::new(room, Ulid::new(), s, s + HOUR))
                    .await;
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();
    for r in 0..n_readers {
        let engine = engine.clone();
        let room = rooms[r % rooms.len()];
        reader_handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for i in 0..reads_per_reader {
                let s = T0 + (i as i64 % 200) * HOUR;
                let t = Instant::now();
                if i % 10 == 0 {
                    engine
                        .list(&ReservationFilter::default().room(room), 1, 50)
                        .await;
                } else {
                    let _ = engine.is_available(room, s, s + 2 * HOUR, None).await;
                }
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.expect("reader task"));
    }
    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("read latency", &mut all_latencies);
}

async fn phase5_replay(dir: &Path) {
    let rooms: Vec<Ulid> = (0..10).map(|_| Ulid::new()).collect();
    {
        let engine = open(dir, "replay", &rooms);
        let desk = Claims::staff(Ulid::new());
        for room in &rooms {
            for i in 0..1000 {
                let s = T0 + i * HOUR;
                engine
                    .create(&desk, NewReservation::new(*room, Ulid::new(), s, s + HOUR))
                    .await
                    .expect("fill");
            }
        }
    }

    let start = Instant::now();
    let engine = open(dir, "replay", &rooms);
    let elapsed = start.elapsed();
    let n = engine.count_reservations(None, None).await.expect("count");
    println!("  replayed {n} reservations in {:.2}ms", elapsed.as_secs_f64() * 1000.0);

    let start = Instant::now();
    engine.compact_wal().await.expect("compact");
    println!("  compacted in {:.2}ms", start.elapsed().as_secs_f64() * 1000.0);
}

#[tokio::main]
async fn main() {
    let dir = bench_dir();

    println!("=== hostelres stress benchmark ===");
    println!("data: {}\n", dir.display());

    println!("[phase 1] sequential write throughput");
    phase1_sequential(&dir).await;

    println!("\n[phase 2] concurrent writes, one room per task");
    phase2_concurrent_rooms(&dir).await;

    println!("\n[phase 3] contended writes on one room");
    phase3_contention(&dir).await;

    println!("\n[phase 4] read latency under write load");
    phase4_read_under_load(&dir).await;

    println!("\n[phase 5] replay and compaction");
    phase5_replay(&dir).await;

    let _ = std::fs::remove_dir_all(&dir);
    println!("\ndone");
}
