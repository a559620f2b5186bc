use approx::assert_relative_eq;
use coincpix_algorithms::{
    bin, fwhm_avg, reject_outliers, space_filter, space_mask, time_filter, Orientation,
};
use coincpix_core::{Channel, CoincidenceEvents, CoincidenceRecord, Field, Hit};
use ndarray::Array2;

/// Deterministic xorshift stream for synthetic datasets.
struct Xorshift(u64);

impl Xorshift {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn below(&mut self, n: i64) -> i64 {
        i64::try_from(self.next() % u64::try_from(n).unwrap()).unwrap()
    }
}

/// Correlated pairs along `signal = idler + offset` with uniform background.
fn synthetic(n: usize, seed: u64) -> CoincidenceEvents {
    let mut rng = Xorshift(seed);
    let records: Vec<_> = (0..n)
        .map(|_| {
            let xi = rng.below(40);
            let yi = rng.below(40);
            let (xs, ys) = if rng.below(4) == 0 {
                (100 + rng.below(40), 60 + rng.below(40))
            } else {
                (100 + xi + rng.below(3) - 1, 60 + yi + rng.below(3) - 1)
            };
            let t = 10_000 + rng.below(1000);
            let dt = rng.below(801) - 400;
            CoincidenceRecord::new(Hit::new(xi, yi, t), Hit::new(xs, ys, t + dt))
        })
        .collect();
    CoincidenceEvents::from_records(&records)
}

#[test]
fn test_time_filter_scenario() {
    let dts = [-300, -50, 0, 50, 300];
    let records: Vec<_> = dts
        .iter()
        .zip(1..)
        .map(|(&dt, id)| CoincidenceRecord::new(Hit::new(id, 0, 100), Hit::new(0, 0, 100 + dt)))
        .collect();
    let events = CoincidenceEvents::from_records(&records);

    let kept = time_filter(&events, -100, 100).unwrap();
    assert_eq!(kept.len(), 3);
    assert_eq!(kept.time_differences().to_vec(), vec![-50, 0, 50]);
    assert_eq!(
        kept.field(Channel::Idler, Field::X).to_vec(),
        vec![2, 3, 4],
        "surviving records keep their order"
    );
}

#[test]
fn test_time_filter_idempotent_on_random_data() {
    let events = synthetic(2000, 0x9e37_79b9);
    let once = time_filter(&events, -123, 77).unwrap();
    let twice = time_filter(&once, -123, 77).unwrap();
    assert_eq!(once, twice);
    assert!(once.len() < events.len());
    assert_eq!(once.as_array().shape()[..2], [2, 3]);
}

#[test]
fn test_space_filter_monotonic_in_threshold() {
    let events = synthetic(3000, 42);
    let thresholds = [0.05, 0.1, 0.2, 0.3, 0.5, 0.7, 0.9, 1.0];
    let masks: Vec<Vec<bool>> = thresholds
        .iter()
        .map(|&t| space_mask(&events, t).unwrap())
        .collect();

    for pair in masks.windows(2) {
        let (looser, stricter) = (&pair[0], &pair[1]);
        for (&a, &b) in looser.iter().zip(stricter) {
            assert!(a || !b, "record kept at a higher threshold but not a lower one");
        }
    }
    let counts: Vec<usize> = thresholds
        .iter()
        .map(|&t| space_filter(&events, t).unwrap().len())
        .collect();
    assert!(counts.windows(2).all(|w| w[0] >= w[1]), "{counts:?}");
    assert!(counts[0] > counts[counts.len() - 1]);
}

#[test]
fn test_space_filter_prefers_correlated_pairs() {
    let events = synthetic(4000, 7);
    let kept = space_filter(&events, 0.3).unwrap();
    assert!(!kept.is_empty());
    let on_ridge = kept
        .records()
        .filter(|r| (r.signal.x - r.idler.x - 100).abs() <= 1 && (r.signal.y - r.idler.y - 60).abs() <= 1)
        .count();
    assert!(on_ridge * 10 >= kept.len() * 9, "{on_ridge} of {}", kept.len());
}

#[test]
fn test_rebin_quantization_and_shape() {
    let events = synthetic(500, 99);
    for k in 1..6 {
        let binned = bin(events.clone(), k, k).unwrap();
        assert_eq!(binned.as_array().shape(), events.as_array().shape());
        for channel in Channel::ALL {
            for field in [Field::X, Field::Y] {
                let before = events.field(channel, field);
                let after = binned.field(channel, field);
                for (&b, &a) in before.iter().zip(after.iter()) {
                    assert_eq!(a, (b + k - 1) / k);
                    assert!(a >= 0);
                }
            }
            assert_eq!(events.field(channel, Field::T), binned.field(channel, Field::T));
        }
    }
}

#[test]
fn test_rebin_scenario() {
    let events = CoincidenceEvents::from_records(&[CoincidenceRecord::new(
        Hit::new(5, 7, 0),
        Hit::new(5, 7, 1),
    )]);
    let binned = bin(events, 2, 3).unwrap();
    let rec = binned.record(0).unwrap();
    assert_eq!((rec.idler.x, rec.idler.y), (3, 3));
    assert_eq!((rec.signal.x, rec.signal.y), (3, 3));
    assert_eq!(binned.len(), 1);
}

#[test]
fn test_fwhm_background_column_excluded() {
    // column 0 peaks at exactly 5 counts; column 1 is a real peak of width 2
    let mut view = Array2::<f64>::zeros((6, 2));
    view[[2, 0]] = 5.0;
    view[[3, 0]] = 5.0;
    view[[1, 1]] = 40.0;
    view[[2, 1]] = 30.0;
    view[[3, 1]] = 4.0;
    let summary = fwhm_avg(view.view(), Orientation::X).unwrap();
    assert_eq!((summary.min, summary.max), (2, 2));
    assert_relative_eq!(summary.mean, 2.0);
}

#[test]
fn test_fwhm_outlier_scenario() {
    let kept = reject_outliers(&[10, 10, 10, 10, 100]);
    assert_eq!(kept, vec![10, 10, 10, 10]);

    // Five columns whose widths are 10, 10, 10, 10 and 100.
    let mut view = Array2::<f64>::zeros((120, 5));
    for c in 0..4 {
        for r in 20..30 {
            view[[r, c]] = 50.0;
        }
    }
    for r in 0..100 {
        view[[r, 4]] = 50.0;
    }
    let summary = fwhm_avg(view.view(), Orientation::X).unwrap();
    assert_eq!(summary.max, 10);
    assert_relative_eq!(summary.mean, 10.0);
}
