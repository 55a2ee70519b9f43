use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use super::*;
use crate::deconv::MinMarkers;
use crate::deconv::estimator::{EstimateOptions, EstimatorError, SignatureEstimator};
use crate::input::table::render_table;
use crate::markers::RenormDivisors;
use crate::report::SAMPLE_ID_COLUMN;

struct FixedEstimator {
    id: EstimatorId,
    markers: BTreeSet<String>,
    result: Option<LabeledMatrix>,
}

impl Estimator for FixedEstimator {
    fn id(&self) -> EstimatorId {
        self.id
    }

    fn markers(&self) -> &BTreeSet<String> {
        &self.markers
    }

    fn estimate(
        &self,
        _mixture: &LabeledMatrix,
        _options: &EstimateOptions,
    ) -> Result<LabeledMatrix, EstimatorError> {
        match &self.result {
            Some(r) => Ok(r.clone()),
            None => Err(EstimatorError::ZeroSignal {
                estimator: self.id,
                sample: "S1".to_string(),
            }),
        }
    }
}

fn mixture() -> LabeledMatrix {
    let genes: Vec<String> = (0..10).map(|g| format!("G{g}")).collect();
    let values = (0..20).map(|v| (v % 7) as f64 + 1.0).collect();
    LabeledMatrix::new(genes, vec!["S1".to_string(), "S2".to_string()], values).unwrap()
}

fn markers(n: usize) -> BTreeSet<String> {
    (0..n).map(|g| format!("G{g}")).collect()
}

fn result_for(id: EstimatorId) -> LabeledMatrix {
    match id {
        EstimatorId::Lm22 => LabeledMatrix::from_rows(
            &["S1", "S2"],
            &[
                "B cells naive",
                "T cells CD4 naive",
                "T cells CD8",
                "NK cells resting",
                "Monocytes",
                "Neutrophils",
            ],
            &[&[0.1, 0.2, 0.3, 0.1, 0.2, 0.1], &[0.3, 0.1, 0.1, 0.2, 0.2, 0.1]],
        ),
        EstimatorId::Epic => LabeledMatrix::from_rows(
            &["S1", "S2"],
            &["Bcells", "CD4_Tcells", "CD8_Tcells", "NKcells", "Macrophages", "otherCells"],
            &[&[0.2, 0.2, 0.2, 0.1, 0.2, 0.1], &[0.1, 0.3, 0.2, 0.1, 0.1, 0.2]],
        ),
        EstimatorId::Quantiseq => LabeledMatrix::from_rows(
            &["S1", "S2"],
            &[
                "B.cells",
                "T.cells.CD4",
                "T.cells.CD8",
                "NK.cells",
                "Monocytes",
                "Neutrophils",
                "Other",
            ],
            &[
                &[0.1, 0.2, 0.2, 0.1, 0.1, 0.2, 0.1],
                &[0.2, 0.2, 0.1, 0.1, 0.1, 0.1, 0.2],
            ],
        ),
    }
    .unwrap()
}

fn fixed(id: EstimatorId, n_markers: usize, fails: bool) -> FixedEstimator {
    FixedEstimator {
        id,
        markers: markers(n_markers),
        result: if fails { None } else { Some(result_for(id)) },
    }
}

fn options(protein: bool) -> CombineOptions {
    let mut opts = CombineOptions::with_builtin_tables(true, protein).unwrap();
    opts.min_markers = MinMarkers {
        lm22: 5,
        epic: 5,
        quantiseq: 5,
    };
    opts
}

fn run(
    estimators: &[FixedEstimator],
    protein: bool,
    output: Option<&OutputPaths>,
) -> Result<DeconvBundle, DeconvError> {
    let refs: Vec<&dyn Estimator> = estimators.iter().map(|e| e as &dyn Estimator).collect();
    run_combiner(
        MixtureInput::Single(mixture()),
        &refs,
        &options(protein),
        output,
    )
}

fn assert_rows_sum_to_one(m: &LabeledMatrix) {
    for row in 0..m.n_rows() {
        let sum: f64 = m.row(row).iter().sum();
        assert!((sum - 1.0).abs() < 1e-9, "row {row} sums to {sum}");
    }
}

#[test]
fn test_rows_sum_to_one_for_every_usable_subset() {
    for protein in [false, true] {
        for mask in 1u8..8 {
            let estimators: Vec<FixedEstimator> = EstimatorId::ALL
                .iter()
                .enumerate()
                .map(|(i, &id)| fixed(id, if mask & (1 << i) != 0 { 10 } else { 2 }, false))
                .collect();
            let bundle = run(&estimators, protein, None).unwrap();
            assert_eq!(bundle.prop.n_cols(), 6);
            assert_rows_sum_to_one(&bundle.prop);
            if let Some(cell) = &bundle.cell_prop {
                assert_rows_sum_to_one(cell);
            }
            for (i, id) in EstimatorId::ALL.iter().enumerate() {
                assert_eq!(bundle.used_comb[id], mask & (1 << i) != 0);
            }
        }
    }
}

#[test]
fn test_non_protein_keeps_reserved_category_from_designated_estimator() {
    let estimators = vec![
        fixed(EstimatorId::Lm22, 2, false),
        fixed(EstimatorId::Epic, 2, false),
        fixed(EstimatorId::Quantiseq, 10, false),
    ];
    let bundle = run(&estimators, false, None).unwrap();
    let expected = [1.0, 2.0, 2.0, 1.0, 1.0, 2.0].map(|v| v / 9.0);
    for (col, e) in expected.iter().enumerate() {
        assert!((bundle.prop.get(0, col) - e).abs() < 1e-12, "col {col}");
    }
    assert_eq!(bundle.prop.col_ids()[5], "Neutrophil");

    let cell = bundle.cell_prop.as_ref().unwrap();
    let divisors = RenormDivisors::MRNA_CONTENT;
    let raw: Vec<f64> = expected
        .iter()
        .zip(Category::ALL)
        .map(|(v, c)| v / divisors.get(c))
        .collect();
    let total: f64 = raw.iter().sum();
    for (col, r) in raw.iter().enumerate() {
        assert!((cell.get(0, col) - r / total).abs() < 1e-12);
    }
}

#[test]
fn test_designated_estimator_unusable_zeroes_reserved_category() {
    let estimators = vec![
        fixed(EstimatorId::Lm22, 10, false),
        fixed(EstimatorId::Epic, 10, false),
        fixed(EstimatorId::Quantiseq, 10, true),
    ];
    let bundle = run(&estimators, false, None).unwrap();
    for row in 0..bundle.prop.n_rows() {
        assert_eq!(bundle.prop.get(row, 5), 0.0);
    }
    assert_rows_sum_to_one(&bundle.prop);
    assert!(bundle.raw_res[&EstimatorId::Quantiseq].is_none());
    assert!(!bundle.used_comb[&EstimatorId::Quantiseq]);
}

#[test]
fn test_below_threshold_excluded_despite_result() {
    let with_epic_short = vec![
        fixed(EstimatorId::Lm22, 10, false),
        fixed(EstimatorId::Epic, 4, false),
        fixed(EstimatorId::Quantiseq, 10, false),
    ];
    let without_epic = vec![
        fixed(EstimatorId::Lm22, 10, false),
        fixed(EstimatorId::Quantiseq, 10, false),
    ];
    let a = run(&with_epic_short, true, None).unwrap();
    let b = run(&without_epic, true, None).unwrap();

    assert!(a.raw_res[&EstimatorId::Epic].is_some());
    assert!(a.merged_prop.contains_key(&EstimatorId::Epic));
    assert!(!a.used_comb[&EstimatorId::Epic]);
    assert_eq!(a.prop, b.prop);

    let audit = a
        .marker_audits
        .iter()
        .find(|x| x.estimator == EstimatorId::Epic)
        .unwrap();
    assert_eq!(audit.overlap, 4);
    assert!(!audit.marker_usable);
}

#[test]
fn test_failure_of_one_estimator_is_not_fatal() {
    let estimators = vec![
        fixed(EstimatorId::Lm22, 10, true),
        fixed(EstimatorId::Epic, 10, false),
        fixed(EstimatorId::Quantiseq, 10, false),
    ];
    let bundle = run(&estimators, true, None).unwrap();
    assert!(bundle.raw_res[&EstimatorId::Lm22].is_none());
    assert!(!bundle.merged_prop.contains_key(&EstimatorId::Lm22));
    assert!(bundle.used_comb[&EstimatorId::Epic]);
    assert_rows_sum_to_one(&bundle.prop);
}

#[test]
fn test_no_qualified_combination_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let paths = OutputPaths {
        prop: dir.path().join("prop.tsv"),
        cell_prop: dir.path().join("cellProp.tsv"),
    };
    let estimators = vec![
        fixed(EstimatorId::Lm22, 10, true),
        fixed(EstimatorId::Epic, 3, false),
        fixed(EstimatorId::Quantiseq, 10, true),
    ];
    let err = run(&estimators, false, Some(&paths)).unwrap_err();
    match err {
        DeconvError::NoQualifiedCombination(audits) => {
            assert_eq!(audits.len(), 3);
            let overlaps: Vec<usize> = audits.iter().map(|a| a.overlap).collect();
            assert_eq!(overlaps, vec![10, 3, 10]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!paths.prop.exists());
    assert!(!paths.cell_prop.exists());
}

#[test]
fn test_no_qualified_combination_message_lists_overlaps() {
    let err = run(&[fixed(EstimatorId::Epic, 1, false)], true, None).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("no qualified combination"));
    assert!(msg.contains("epic=1/5"));
    assert!(msg.contains("lm22=0/5"));
}

#[test]
fn test_sample_with_only_unmapped_labels_yields_zero_row() {
    let mut epic = fixed(EstimatorId::Epic, 10, false);
    epic.result = Some(
        LabeledMatrix::from_rows(
            &["S1", "S2"],
            &["Bcells", "CD4_Tcells", "otherCells"],
            &[&[0.5, 0.3, 0.2], &[0.0, 0.0, 1.0]],
        )
        .unwrap(),
    );
    let bundle = run(&[epic], true, None).unwrap();
    assert!(bundle.prop.row(1).iter().all(|&v| v == 0.0));
    assert_eq!(samples_without_mass(&bundle.prop), vec!["S2"]);
    let s1: f64 = bundle.prop.row(0).iter().sum();
    assert!((s1 - 1.0).abs() < 1e-12);
}

#[test]
fn test_estimator_order_does_not_change_result() {
    let orders = [
        [EstimatorId::Lm22, EstimatorId::Epic, EstimatorId::Quantiseq],
        [EstimatorId::Quantiseq, EstimatorId::Lm22, EstimatorId::Epic],
        [EstimatorId::Epic, EstimatorId::Quantiseq, EstimatorId::Lm22],
    ];
    for protein in [false, true] {
        let results: Vec<DeconvBundle> = orders
            .iter()
            .map(|order| {
                let ests: Vec<FixedEstimator> =
                    order.iter().map(|&id| fixed(id, 10, false)).collect();
                run(&ests, protein, None).unwrap()
            })
            .collect();
        for other in &results[1..] {
            assert_eq!(other.prop, results[0].prop);
            assert_eq!(other.cell_prop, results[0].cell_prop);
        }
    }
}

#[test]
fn test_protein_mode_has_no_cell_prop() {
    let estimators: Vec<FixedEstimator> = EstimatorId::ALL
        .iter()
        .map(|&id| fixed(id, 10, false))
        .collect();
    let bundle = run(&estimators, true, None).unwrap();
    assert!(bundle.cell_prop.is_none());
    assert_eq!(
        bundle.prop.col_ids(),
        category_ids(&Category::ALL).as_slice()
    );
    for m in bundle.merged_prop.values() {
        assert_eq!(m.n_cols(), 6);
    }
}

#[test]
fn test_result_rows_are_aligned_to_mixture_samples() {
    let mut reversed = fixed(EstimatorId::Epic, 10, false);
    let order = vec!["S2".to_string(), "S1".to_string()];
    reversed.result = Some(result_for(EstimatorId::Epic).reorder_rows(&order).unwrap());
    let bundle = run(&[reversed], true, None).unwrap();
    assert_eq!(bundle.prop.row_ids(), mixture().col_ids());
    let raw = bundle.raw_res[&EstimatorId::Epic].as_ref().unwrap();
    assert_eq!(raw.row_ids(), mixture().col_ids());
}

#[test]
fn test_result_with_foreign_samples_is_treated_as_failure() {
    let mut foreign = fixed(EstimatorId::Lm22, 10, false);
    foreign.result = Some(LabeledMatrix::from_rows(&["X1", "X2"], &["Monocytes"], &[&[1.0], &[1.0]]).unwrap());
    let estimators = vec![foreign, fixed(EstimatorId::Epic, 10, false)];
    let bundle = run(&estimators, true, None).unwrap();
    assert!(bundle.raw_res[&EstimatorId::Lm22].is_none());
    assert!(!bundle.used_comb[&EstimatorId::Lm22]);
}

#[test]
fn test_invalid_mixture_rejected() {
    let est = fixed(EstimatorId::Epic, 10, false);
    let refs: Vec<&dyn Estimator> = vec![&est];
    let opts = options(true);

    let empty = LabeledMatrix::new(vec![], vec!["S1".to_string()], vec![]).unwrap();
    let err = run_combiner(MixtureInput::Single(empty), &refs, &opts, None).unwrap_err();
    assert!(matches!(err, DeconvError::InvalidInput(_)));

    let mut with_nan = mixture();
    with_nan.set(0, 0, f64::NAN);
    let err = run_combiner(MixtureInput::Single(with_nan), &refs, &opts, None).unwrap_err();
    assert!(matches!(err, DeconvError::InvalidInput(_)));
}

#[test]
fn test_duplicate_estimator_rejected() {
    let a = fixed(EstimatorId::Epic, 10, false);
    let b = fixed(EstimatorId::Epic, 10, false);
    let err = run_combiner(
        MixtureInput::Single(mixture()),
        &[&a, &b],
        &options(true),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, DeconvError::InvalidInput(_)));
}

#[test]
fn test_output_paths_require_exactly_two() {
    let one = vec![PathBuf::from("a.tsv")];
    let three = vec![
        PathBuf::from("a.tsv"),
        PathBuf::from("b.tsv"),
        PathBuf::from("c.tsv"),
    ];
    assert!(matches!(
        OutputPaths::from_paths(&one).unwrap_err(),
        DeconvError::OutputPaths(1)
    ));
    assert!(matches!(
        OutputPaths::from_paths(&three).unwrap_err(),
        DeconvError::OutputPaths(3)
    ));
    let two = OutputPaths::from_paths(&three[..2]).unwrap();
    assert_eq!(two.cell_prop, PathBuf::from("b.tsv"));
}

#[test]
fn test_per_estimator_mixtures() {
    let swapped = mixture().select_cols(&[1, 0]);
    let mut inputs = BTreeMap::new();
    inputs.insert(EstimatorId::Lm22, mixture());
    inputs.insert(EstimatorId::Quantiseq, swapped);

    let ests: Vec<FixedEstimator> = EstimatorId::ALL
        .iter()
        .map(|&id| fixed(id, 10, false))
        .collect();
    let refs: Vec<&dyn Estimator> = ests.iter().map(|e| e as &dyn Estimator).collect();
    let bundle = run_combiner(
        MixtureInput::PerEstimator(inputs),
        &refs,
        &options(false),
        None,
    )
    .unwrap();

    assert!(bundle.used_comb[&EstimatorId::Lm22]);
    assert!(!bundle.used_comb[&EstimatorId::Epic]);
    assert!(bundle.raw_res[&EstimatorId::Epic].is_none());
    assert!(bundle.used_comb[&EstimatorId::Quantiseq]);
    assert_eq!(bundle.prop.row_ids(), mixture().col_ids());
    assert_rows_sum_to_one(&bundle.prop);
}

#[test]
fn test_per_estimator_mixtures_must_share_samples() {
    let other = LabeledMatrix::from_rows(&["G0"], &["S1", "S3"], &[&[1.0, 2.0]]).unwrap();
    let mut inputs = BTreeMap::new();
    inputs.insert(EstimatorId::Lm22, mixture());
    inputs.insert(EstimatorId::Epic, other);
    let est = fixed(EstimatorId::Lm22, 10, false);
    let err = run_combiner(
        MixtureInput::PerEstimator(inputs),
        &[&est],
        &options(true),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, DeconvError::InvalidInput(_)));
}

#[test]
fn test_mixture_file_negatives_are_clamped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mix.tsv");
    let mut text = String::from("gene\tS1\tS2\n");
    for g in 0..10 {
        text.push_str(&format!("G{g}\t{}\t-1\n", g + 1));
    }
    fs::write(&path, text).unwrap();

    let est = fixed(EstimatorId::Epic, 10, false);
    let bundle = run_combiner(MixtureInput::File(path), &[&est], &options(true), None).unwrap();
    assert_eq!(bundle.prop.n_rows(), 2);
}

const LM22_LABELS: &[&str] = &[
    "B cells naive",
    "T cells CD4 memory resting",
    "T cells CD8",
    "NK cells activated",
    "Macrophages M1",
    "Neutrophils",
    "Eosinophils",
];
const EPIC_LABELS: &[&str] = &[
    "Bcells",
    "CD4_Tcells",
    "CD8_Tcells",
    "NKcells",
    "Monocytes",
    "CAFs",
];
const QUANTISEQ_LABELS: &[&str] = &[
    "B.cells",
    "T.cells.CD4",
    "T.cells.CD8",
    "NK.cells",
    "Macrophages.M2",
    "Neutrophils",
];

fn synthetic_signature(id: EstimatorId, labels: &[&str], n_genes: usize) -> SignatureEstimator {
    let genes: Vec<String> = (0..n_genes).map(|g| format!("GENE{g:05}")).collect();
    let k = labels.len();
    let mut values = Vec::with_capacity(n_genes * k);
    for g in 0..n_genes {
        for l in 0..k {
            let v = if g % k == l {
                10.0 + (g % 7) as f64
            } else {
                ((g * 31 + l * 17) % 5) as f64 * 0.1
            };
            values.push(v);
        }
    }
    let sig = LabeledMatrix::new(genes, labels.iter().map(|s| s.to_string()).collect(), values)
        .unwrap();
    SignatureEstimator::new(id, sig).unwrap()
}

#[test]
fn test_end_to_end_non_protein_with_output_files() {
    let n_genes = 2000;
    let genes: Vec<String> = (0..n_genes + 150).map(|g| format!("GENE{g:05}")).collect();
    let samples: Vec<String> = (1..=3).map(|s| format!("TCGA-{s:02}")).collect();
    let mut values = Vec::with_capacity(genes.len() * samples.len());
    for g in 0..genes.len() {
        for s in 0..samples.len() {
            values.push(1.0 + ((g * 13 + s * 7) % 50) as f64);
        }
    }
    let mixture = LabeledMatrix::new(genes, samples.clone(), values).unwrap();

    let lm22 = synthetic_signature(EstimatorId::Lm22, LM22_LABELS, n_genes);
    let epic = synthetic_signature(EstimatorId::Epic, EPIC_LABELS, n_genes);
    let quantiseq = synthetic_signature(EstimatorId::Quantiseq, QUANTISEQ_LABELS, n_genes);
    let refs: Vec<&dyn Estimator> = vec![&lm22, &epic, &quantiseq];

    let dir = tempfile::tempdir().unwrap();
    let paths = OutputPaths::from_paths(&[
        dir.path().join("prop.tsv"),
        dir.path().join("cellProp.tsv"),
    ])
    .unwrap();
    let opts = CombineOptions::with_builtin_tables(false, false).unwrap();

    let bundle =
        run_combiner(MixtureInput::Single(mixture), &refs, &opts, Some(&paths)).unwrap();

    assert_eq!(bundle.prop.row_ids(), samples.as_slice());
    assert_eq!(bundle.prop.n_cols(), 6);
    let cell_prop = bundle.cell_prop.as_ref().unwrap();
    assert_rows_sum_to_one(&bundle.prop);
    assert_rows_sum_to_one(cell_prop);
    assert_eq!(bundle.merged_prop.len(), 3);
    assert_eq!(bundle.raw_res.len(), 3);
    assert!(bundle.raw_res.values().all(|r| r.is_some()));
    assert!(bundle.used_comb.values().all(|&u| u));
    assert!(bundle.marker_audits.iter().all(|a| a.overlap == n_genes));

    let prop_text = fs::read(&paths.prop).unwrap();
    let cell_text = fs::read(&paths.cell_prop).unwrap();
    assert_eq!(prop_text, render_table(&bundle.prop, SAMPLE_ID_COLUMN).unwrap());
    assert_eq!(cell_text, render_table(cell_prop, SAMPLE_ID_COLUMN).unwrap());
    let header = String::from_utf8(prop_text).unwrap();
    assert!(header.starts_with("SampleID\tB\tCD4\tCD8\tNK\tMono/Macro\tNeutrophil\n"));
}
