use super::*;

fn x() -> LabeledMatrix {
    LabeledMatrix::from_rows(
        &["CD8A", "GZMB"],
        &["s1", "s2", "s3", "s4", "s5"],
        &[
            &[1.0, 2.0, 3.0, 4.0, 5.0],
            &[5.0, 3.0, 4.0, 1.0, 2.0],
        ],
    )
    .unwrap()
}

#[test]
fn test_perfect_pearson_correlation() {
    let y = LabeledMatrix::from_rows(
        &["B", "CD8"],
        &["s1", "s2", "s3", "s4", "s5"],
        &[&[2.0, 4.0, 6.0, 8.0, 10.0], &[-1.0, -2.0, -3.0, -4.0, -5.0]],
    )
    .unwrap();
    let res = correlate(&x(), &y, CorrelationMethod::Pearson, Some(2)).unwrap();
    assert_eq!(res.n_samples, 5);
    assert_eq!(res.r.row_ids(), x().row_ids());
    assert_eq!(res.r.col_ids(), y.row_ids());
    assert!((res.r.get(0, 0) - 1.0).abs() < 1e-12);
    assert!((res.r.get(0, 1) + 1.0).abs() < 1e-12);
    assert!(res.p.get(0, 0) < 1e-10);
}

#[test]
fn test_columns_matched_by_id() {
    let y = LabeledMatrix::from_rows(
        &["T"],
        &["s5", "s4", "extra", "s3", "s2", "s1"],
        &[&[5.0, 4.0, 99.0, 3.0, 2.0, 1.0]],
    )
    .unwrap();
    let res = correlate(&x(), &y, CorrelationMethod::Pearson, Some(1)).unwrap();
    assert_eq!(res.n_samples, 5);
    assert!((res.r.get(0, 0) - 1.0).abs() < 1e-12);
}

#[test]
fn test_spearman_uses_ranks() {
    let a = [1.0, 2.0, 3.0, 4.0, 5.0];
    let b = [1.0, 4.0, 9.0, 16.0, 100.0];
    let (r, _) = pair_correlation(&a, &b, CorrelationMethod::Spearman);
    assert!((r - 1.0).abs() < 1e-12);
    let (r, _) = pair_correlation(&a, &b, CorrelationMethod::Pearson);
    assert!(r < 0.99);
}

#[test]
fn test_p_value_matches_t_distribution() {
    let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
    let b = [2.0, 1.0, 4.0, 3.0, 7.0, 5.0, 6.0, 10.0, 8.0, 9.0];
    let (r, p) = pair_correlation(&a, &b, CorrelationMethod::Pearson);
    assert!(r > 0.8 && r < 1.0);
    assert!(p > 0.0 && p < 0.01);

    let alternating = [1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0];
    let (r, p) = pair_correlation(&a, &alternating, CorrelationMethod::Pearson);
    assert!(r.abs() < 0.2);
    assert!(p > 0.5);
}

#[test]
fn test_missing_and_constant_pairs_give_nan() {
    let (r, p) = pair_correlation(
        &[1.0, f64::NAN, 3.0, 4.0],
        &[1.0, 2.0, f64::NAN, 4.0],
        CorrelationMethod::Pearson,
    );
    assert!(r.is_nan() && p.is_nan());
    let (r, _) = pair_correlation(
        &[1.0, 1.0, 1.0, 1.0],
        &[1.0, 2.0, 3.0, 4.0],
        CorrelationMethod::Spearman,
    );
    assert!(r.is_nan());
}

#[test]
fn test_pairwise_complete_observations() {
    let a = [1.0, 2.0, f64::NAN, 4.0, 5.0];
    let b = [2.0, 4.0, 100.0, 8.0, 10.0];
    let (r, _) = pair_correlation(&a, &b, CorrelationMethod::Pearson);
    assert!((r - 1.0).abs() < 1e-12);
}

#[test]
fn test_self_correlation_without_y() {
    let m = x();
    let res = correlate(&m, &m, CorrelationMethod::Spearman, None).unwrap();
    for i in 0..m.n_rows() {
        assert!((res.r.get(i, i) - 1.0).abs() < 1e-12);
    }
    assert_eq!(res.r.get(0, 1), res.r.get(1, 0));
}

#[test]
fn test_thread_count_does_not_change_result() {
    let m = x();
    let one = correlate(&m, &m, CorrelationMethod::Pearson, Some(1)).unwrap();
    let four = correlate(&m, &m, CorrelationMethod::Pearson, Some(4)).unwrap();
    assert_eq!(one.r, four.r);
    assert!(default_threads() >= 1);
}

#[test]
fn test_too_few_shared_samples() {
    let y = LabeledMatrix::from_rows(&["T"], &["s1", "s2", "zz"], &[&[1.0, 2.0, 3.0]]).unwrap();
    assert!(matches!(
        correlate(&x(), &y, CorrelationMethod::Pearson, None).unwrap_err(),
        StatsError::EmptyData(_)
    ));
}
