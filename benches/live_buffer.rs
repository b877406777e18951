use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use quickdeck_core::acquisition::{parse_frame, LiveBuffer};
use quickdeck_core::hal::{Role, Sample, SeriesId};
use std::sync::Arc;
use std::thread;

const CAPACITIES: &[usize] = &[100, 500, 2000];

fn motion_sample(ts: u64) -> Sample {
    let values = (0..9).map(|i| (ts as f64 * 0.01 + i as f64).sin()).collect();
    Sample::new(Role::Motion, ts, values).unwrap()
}

fn benchmark_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("live_buffer_push");

    for &capacity in CAPACITIES {
        group.throughput(Throughput::Elements(1000));
        group.bench_with_input(BenchmarkId::new("push_sample", capacity), &capacity, |b, &cap| {
            let buffer = LiveBuffer::new(cap, 0.1).unwrap();
            let samples: Vec<_> = (0..1000).map(motion_sample).collect();
            b.iter(|| {
                for sample in &samples {
                    buffer.push_sample(black_box(sample));
                }
            });
        });
    }

    group.finish();
}

fn benchmark_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("live_buffer_snapshot");

    for &capacity in CAPACITIES {
        let buffer = LiveBuffer::new(capacity, 0.1).unwrap();
        for ts in 0..capacity as u64 {
            buffer.push_sample(&motion_sample(ts));
            buffer.push_sample(&Sample::new(Role::Strain, ts, vec![ts as f64; 8]).unwrap());
        }

        group.bench_with_input(BenchmarkId::new("series", capacity), &buffer, |b, buffer| {
            let id = SeriesId::pitch(0).unwrap();
            b.iter(|| black_box(buffer.snapshot(id)));
        });
        group.bench_with_input(BenchmarkId::new("frame", capacity), &buffer, |b, buffer| {
            b.iter(|| black_box(buffer.frame()));
        });
    }

    group.finish();
}

// Frame copies while a motion reader pushes at full speed
fn benchmark_contended_frame(c: &mut Criterion) {
    c.bench_function("frame_under_writer", |b| {
        let buffer = Arc::new(LiveBuffer::new(500, 0.1).unwrap());
        let writer = {
            let buffer = Arc::clone(&buffer);
            let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
            let flag = Arc::clone(&stop);
            let handle = thread::spawn(move || {
                let mut ts = 0;
                while !flag.load(std::sync::atomic::Ordering::Relaxed) {
                    buffer.push_sample(&motion_sample(ts));
                    ts += 1;
                }
            });
            (stop, handle)
        };

        b.iter(|| black_box(buffer.frame()));

        writer.0.store(true, std::sync::atomic::Ordering::Relaxed);
        writer.1.join().unwrap();
    });
}

fn benchmark_parse(c: &mut Criterion) {
    let strain = "STRAIN,123456,0.1,0.2,0.3,0.4,0.5,0.6,0.7,0.8";
    let motion = "MOTION,123456,1.25,-0.5,0.01,2.5,-1.0,0.02,4.0,-2.0,0.03";
    c.bench_function("parse_strain_frame", |b| {
        b.iter(|| parse_frame(Role::Strain, black_box(strain)))
    });
    c.bench_function("parse_motion_frame", |b| {
        b.iter(|| parse_frame(Role::Motion, black_box(motion)))
    });
}

criterion_group!(
    benches,
    benchmark_push,
    benchmark_snapshot,
    benchmark_contended_frame,
    benchmark_parse
);
criterion_main!(benches);
