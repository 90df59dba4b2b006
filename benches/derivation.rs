use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fairround::attestation::{authorize_settlement, RoundView};
use fairround::crash;
use fairround::{Address, Fraction, OperatorSigner, Randomness};

fn bench_crash_point(c: &mut Criterion) {
    let win_rate = Fraction::new(95, 100).unwrap();
    let signature = [0x5a_u8; 64];

    c.bench_function("crash_point", |b| {
        b.iter(|| crash::crash_point(black_box(&signature), black_box(win_rate)).unwrap())
    });
}

fn bench_authorize_settlement(c: &mut Criterion) {
    let signer = OperatorSigner::from_secret_bytes(&[1u8; 32]);
    let win_rate = Fraction::new(95, 100).unwrap();
    let randomness = Randomness::new([2u8; 64]);
    let bet = Address::new([3u8; 32]);
    let proof = signer.settlement_proof(&randomness, &bet, win_rate).unwrap();
    let view = RoundView {
        game: Address::new([4u8; 32]),
        round: 0,
        operator: signer.identity(),
        win_rate,
        stored_randomness: Some(&randomness),
    };

    c.bench_function("authorize_settlement", |b| {
        b.iter(|| authorize_settlement(black_box(&view), black_box(&bet), black_box(&proof)).unwrap())
    });
}

criterion_group!(benches, bench_crash_point, bench_authorize_settlement);
criterion_main!(benches);
