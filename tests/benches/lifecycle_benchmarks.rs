//! # Hub-Chain Lifecycle Benchmarks
//!
//! | Path | What is measured |
//! |------|------------------|
//! | block | Full block: begin, N sends, end, commit |
//! | check_tx | Mempool admission of one signed send |
//! | query | `custom/acc/account` against the published snapshot |
//! | export | Zero-height export of a running chain |

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use hub_tests::integration::harness::{account, genesis, produce, send, start, Signer};
use node_runtime::genesis::dev_address;
use std::time::Duration;

fn bench_block_with_sends(c: &mut Criterion) {
    let mut group = c.benchmark_group("block");
    group.measurement_time(Duration::from_secs(10));

    for txs in [1u64, 10, 50] {
        group.throughput(Throughput::Elements(txs));
        group.bench_with_input(BenchmarkId::new("sends", txs), &txs, |b, &txs| {
            b.iter_batched(
                || {
                    let mut chain = start(&genesis(2));
                    let mut alice = Signer::validator(0);
                    for i in 0..txs {
                        let msg = send(&alice, dev_address(1), u128::from(i) + 1);
                        chain.submit(alice.sign(vec![msg])).unwrap();
                    }
                    chain
                },
                |mut chain| black_box(produce(&mut chain, 1)),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_check_tx(c: &mut Criterion) {
    c.bench_function("check_tx/send", |b| {
        b.iter_batched(
            || {
                let chain = start(&genesis(1));
                let mut alice = Signer::validator(0);
                let msg = send(&alice, dev_address(0), 1);
                (chain, alice.sign(vec![msg]))
            },
            |(mut chain, tx)| black_box(chain.submit(tx).unwrap()),
            BatchSize::SmallInput,
        )
    });
}

fn bench_account_query(c: &mut Criterion) {
    let mut chain = start(&genesis(4));
    produce(&mut chain, 1);
    c.bench_function("query/account", |b| {
        b.iter(|| black_box(account(&chain, dev_address(3))))
    });
}

fn bench_zero_height_export(c: &mut Criterion) {
    let mut chain = start(&genesis(4));
    produce(&mut chain, 5);
    c.bench_function("export/zero_height", |b| b.iter(|| black_box(chain.export(true).unwrap())));
}

criterion_group!(
    benches,
    bench_block_with_sends,
    bench_check_tx,
    bench_account_query,
    bench_zero_height_export
);
criterion_main!(benches);
