use mutandis::program::{CLASS_THRESHOLDS, GRANULARITY_THRESHOLDS, METHOD_THRESHOLDS};
use mutandis::Context;

fn frequencies(ctx: &mut Context, thresholds: &[f64], draws: usize) -> Vec<f64> {
    let mut counts = vec![0usize; thresholds.len()];
    for _ in 0..draws {
        counts[ctx.bucket(thresholds)] += 1;
    }
    counts.into_iter().map(|c| c as f64 / draws as f64).collect()
}

#[test]
fn bucket_frequencies_match_the_thresholds() {
    let mut ctx = Context::new(0x5eed);
    let observed = frequencies(&mut ctx, &GRANULARITY_THRESHOLDS, 200_000);
    let expected = [0.01, 0.04, 0.95];
    for (o, e) in observed.iter().zip(expected) {
        assert!((o - e).abs() < 0.005, "observed {observed:?}, expected {expected:?}");
    }

    let observed = frequencies(&mut ctx, &METHOD_THRESHOLDS, 100_000);
    assert!((observed[0] - 0.1).abs() < 0.01, "{observed:?}");

    let observed = frequencies(&mut ctx, &CLASS_THRESHOLDS, 100_000);
    assert!((observed[0] - 0.5).abs() < 0.01, "{observed:?}");
}

#[test]
fn single_threshold_always_picks_it() {
    let mut ctx = Context::default();
    for _ in 0..100 {
        assert_eq!(ctx.bucket(&[1.0]), 0);
    }
}

#[test]
fn uniform_and_uint_below_stay_in_range() {
    let mut ctx = Context::new(1);
    for n in 1..50 {
        let u = ctx.uniform();
        assert!((0.0..1.0).contains(&u));
        assert!(ctx.uint_below(n) < n);
    }
}

#[test]
fn same_seed_same_draws() {
    let mut a = Context::new(99);
    let mut b = Context::new(99);
    let xs: Vec<usize> = (0..64).map(|_| a.bucket(&GRANULARITY_THRESHOLDS)).collect();
    let ys: Vec<usize> = (0..64).map(|_| b.bucket(&GRANULARITY_THRESHOLDS)).collect();
    assert_eq!(xs, ys);
}

#[test]
fn reserved_names() {
    let mut ctx = Context::new(0);
    for builtin in mutandis::ty::BUILTIN_CLASSES {
        assert!(ctx.is_reserved(builtin));
        assert!(!ctx.reserve_name(*builtin));
    }
    assert!(!ctx.is_reserved("Fresh"));
    assert!(ctx.reserve_name("Fresh"));
    assert!(ctx.is_reserved("Fresh"));
}

#[test]
#[should_panic]
fn uint_below_zero_fails_fast() {
    Context::new(0).uint_below(0);
}
