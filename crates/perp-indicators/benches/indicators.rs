//! Indicator throughput benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use perp_core::traits::{Indicator, MultiOutputIndicator, OhlcvIndicator};
use perp_indicators::{Ema, EmaSpread, Kdj, Macd, Rsi, Sma};

fn synthetic_closes(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 30_000.0 + (i as f64 * 0.13).sin() * 500.0 + i as f64 * 0.2)
        .collect()
}

fn bench_indicators(c: &mut Criterion) {
    let closes = synthetic_closes(10_000);
    let highs: Vec<f64> = closes.iter().map(|v| v + 25.0).collect();
    let lows: Vec<f64> = closes.iter().map(|v| v - 25.0).collect();

    c.bench_function("sma_20_10k", |b| {
        let sma = Sma::new(20);
        b.iter(|| sma.calculate(black_box(&closes)))
    });

    c.bench_function("ema_26_10k", |b| {
        let ema = Ema::new(26);
        b.iter(|| ema.calculate(black_box(&closes)))
    });

    c.bench_function("ema_spread_9_26_10k", |b| {
        let spread = EmaSpread::new(9, 26);
        b.iter(|| spread.calculate(black_box(&closes)))
    });

    c.bench_function("rsi_14_10k", |b| {
        let rsi = Rsi::new(14);
        b.iter(|| rsi.calculate(black_box(&closes)))
    });

    c.bench_function("macd_12_26_9_10k", |b| {
        let macd = Macd::new();
        b.iter(|| macd.calculate(black_box(&closes)))
    });

    c.bench_function("kdj_9_3_10k", |b| {
        let kdj = Kdj::new(9, 3);
        b.iter(|| kdj.calculate(black_box(&highs), black_box(&lows), black_box(&closes), &[]))
    });
}

criterion_group!(benches, bench_indicators);
criterion_main!(benches);
