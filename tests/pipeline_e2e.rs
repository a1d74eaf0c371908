use collation_nmf::{
    ClassificationError, Collation, CollationConfig, CollationError, LawsonHanson,
    MalformedUnitReason, Pipeline, Reading, VariationUnit,
};

const UNITS: usize = 20;
const GROUP_A: [&str; 3] = ["A1", "A2", "A3"];
const GROUP_B: [&str; 4] = ["B1", "B2", "B3", "B4"];

/// Unit `i` splits the tradition into an `a` reading (group A) and a `b`
/// reading (group B). `extra` adds `(witness, reading)` pairs when it returns
/// them for a unit.
fn collation_with<F>(extra: F) -> Collation
where
    F: Fn(usize) -> Vec<(&'static str, &'static str)>,
{
    let units = (0..UNITS)
        .map(|i| {
            let mut a: Vec<String> = GROUP_A.iter().map(|w| w.to_string()).collect();
            let mut b: Vec<String> = GROUP_B.iter().map(|w| w.to_string()).collect();
            let mut c: Vec<String> = Vec::new();
            for (witness, reading) in extra(i) {
                match reading {
                    "a" => a.push(witness.to_string()),
                    "b" => b.push(witness.to_string()),
                    _ => c.push(witness.to_string()),
                }
            }
            let mut readings = vec![
                Reading::new("a", "", a).with_text("kai"),
                Reading::new("b", "", b).with_text("de"),
            ];
            if !c.is_empty() {
                readings.push(Reading::new("c", "", c));
            }
            readings.push(Reading::new("zz", "lac", ["P74"]));
            VariationUnit::new(format!("Acts.1.{i}"), readings)
        })
        .collect();
    Collation::new(units)
}

fn config() -> CollationConfig {
    CollationConfig {
        ignore_types: vec!["lac".to_string()],
        trivial_types: vec!["defective".to_string(), "orthographic".to_string()],
        trivial_suffixes: vec!["*".to_string(), "T".to_string()],
        ambiguous_prefix: "zw-".to_string(),
        ..CollationConfig::default()
    }
}

fn pipeline() -> Pipeline {
    Pipeline::new(config()).unwrap()
}

#[test]
fn completeness_threshold_splits_near_complete_witnesses() {
    let nineteen = collation_with(|i| if i < 19 { vec![("C", "a")] } else { vec![] });
    let prepared = pipeline().prepare(&nineteen).unwrap();
    assert!(prepared.partition.is_complete("C"));
    assert!(prepared.training.witnesses.contains(&"C".to_string()));

    let eighteen = collation_with(|i| if i < 18 { vec![("C", "a")] } else { vec![] });
    let prepared = pipeline().prepare(&eighteen).unwrap();
    assert!(!prepared.partition.is_complete("C"));
    assert!(prepared.training.fragmentary.iter().any(|f| f.witness == "C"));
}

#[test]
fn lacunose_witness_never_enters_the_matrix() {
    let prepared = pipeline().prepare(&collation_with(|_| vec![])).unwrap();
    assert!(prepared.matrix.witness_position("P74").is_none());
    assert_eq!(prepared.partition.complete_count(), 7);
    assert_eq!(prepared.partition.fragmentary_count(), 0);
}

#[test]
fn training_readings_all_have_complete_support() {
    let collation = collation_with(|i| match i {
        0 => vec![("F", "c")],
        1..=5 => vec![("F", "b")],
        _ => vec![],
    });
    let prepared = pipeline().prepare(&collation).unwrap();
    let training = &prepared.training;

    assert!(!training
        .reading_labels()
        .iter()
        .any(|label| label.starts_with("Acts.1.0 c")));
    for row in 0..training.matrix.nrows() {
        assert!(training.matrix.row(row).sum() > 0.0);
    }
    // Present in the full matrix though.
    assert_eq!(prepared.matrix.weight("F", "Acts.1.0", "c"), 1.0);
}

#[test]
fn fragmentary_witness_joins_the_group_it_agrees_with() {
    let collation = collation_with(|i| if i < 6 { vec![("F", "b")] } else { vec![] });
    let output = pipeline().run(&collation, 2).unwrap();
    assert_eq!(output.rank(), 2);

    let a = output.assignment("A1").unwrap().dominant_group().unwrap();
    let b = output.assignment("B1").unwrap().dominant_group().unwrap();
    assert_ne!(a, b);
    for w in GROUP_A {
        assert_eq!(output.assignment(w).unwrap().dominant_group(), Some(a));
    }
    for w in GROUP_B {
        assert_eq!(output.assignment(w).unwrap().dominant_group(), Some(b));
    }

    let f = output.assignment("F").unwrap();
    assert_eq!(f.readings_used, 12);
    assert_eq!(f.dominant_group(), Some(b));
    assert!(f.groups.iter().all(|g| *g >= 0.0));
}

#[test]
fn fragmentary_result_does_not_depend_on_other_fragments() {
    let alone = collation_with(|i| if i < 6 { vec![("F", "b")] } else { vec![] });
    let with_other = collation_with(|i| match i {
        0..=5 => vec![("F", "b")],
        10..=13 => vec![("G", "a")],
        _ => vec![],
    });

    let first = pipeline().run(&alone, 2).unwrap();
    let second = pipeline().run(&with_other, 2).unwrap();
    assert_eq!(first.assignment("F"), second.assignment("F"));
    assert!(second.assignment("G").is_some());
}

#[test]
fn subwitness_sigla_merge_into_one_witness() {
    let collation = collation_with(|i| match i {
        0 => vec![("F*", "a"), ("FT", "b")],
        1 => vec![("F*", "a")],
        _ => vec![],
    });
    let prepared = pipeline().prepare(&collation).unwrap();
    let matrix = &prepared.matrix;
    assert!(matrix.witness_position("F*").is_none());
    assert_eq!(matrix.weight("F", "Acts.1.0", "a"), 1.0);
    assert_eq!(matrix.weight("F", "Acts.1.0", "b"), 1.0);
    assert_eq!(matrix.sigla().aliases_of("F"), vec!["F*", "FT"]);
}

#[test]
fn trivial_and_ambiguous_readings_are_redistributed() {
    let mut collation = collation_with(|_| vec![]);
    collation.units[0]
        .readings
        .insert(1, Reading::new("af1", "defective", ["F"]));
    collation.units[0]
        .readings
        .push(Reading::new("zw-a/b", "", ["G"]));

    let prepared = pipeline().prepare(&collation).unwrap();
    let matrix = &prepared.matrix;
    assert_eq!(matrix.weight("F", "Acts.1.0", "a"), 1.0);
    assert_eq!(matrix.weight("G", "Acts.1.0", "a"), 0.5);
    assert_eq!(matrix.weight("G", "Acts.1.0", "b"), 0.5);
}

#[test]
fn malformed_unit_aborts_preparation() {
    let mut collation = collation_with(|_| vec![]);
    collation.units[3]
        .readings
        .insert(0, Reading::new("af1", "defective", ["F"]));

    let err = pipeline().prepare(&collation).unwrap_err();
    match err {
        CollationError::MalformedUnit { unit_id, reason } => {
            assert_eq!(unit_id, "Acts.1.3");
            assert!(matches!(
                reason,
                MalformedUnitReason::TrivialBeforeSubstantive { .. }
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn tfidf_drops_universal_readings_and_weights_fragments() {
    let mut collation = collation_with(|i| if i < 6 { vec![("F", "b")] } else { vec![] });
    let all: Vec<&str> = GROUP_A.iter().chain(GROUP_B.iter()).copied().collect();
    collation
        .units
        .push(VariationUnit::new("Acts.2.1", vec![Reading::new("a", "", all)]));

    let mut cfg = config();
    cfg.use_tfidf = true;
    cfg.min_extant_proportion = 0.9;
    let pipeline = Pipeline::new(cfg).unwrap();
    let prepared = pipeline.prepare(&collation).unwrap();

    let labels = prepared.training.reading_labels();
    assert!(!labels.iter().any(|l| l.starts_with("Acts.2.1")));
    let f = &prepared.training.fragmentary[0];
    let expected = (7.0_f64 / 4.0).ln();
    assert!(f.values.iter().any(|v| (v - expected).abs() < 1e-12));

    let output = pipeline.factorize(&prepared, 2).unwrap();
    assert!(output.assignment("F").is_some());
}

#[test]
fn fragment_without_surviving_rows_fails_alone() {
    // F is only extant in a unit whose readings all lack complete support.
    let mut collation = collation_with(|_| vec![]);
    collation.units.push(VariationUnit::new(
        "Acts.3.1",
        vec![Reading::new("a", "", ["F"]), Reading::new("b", "", ["G"])],
    ));
    let mut cfg = config();
    cfg.min_extant_proportion = 0.9;
    let output = Pipeline::new(cfg).unwrap().run(&collation, 2).unwrap();

    let failures: Vec<_> = output.failures().collect();
    assert_eq!(failures.len(), 2);
    assert!(failures
        .iter()
        .all(|(_, err)| **err == ClassificationError::NoAttestedReadings));
    assert_eq!(output.witness_groups.len(), 7);
}

#[test]
fn solver_can_be_swapped() {
    let collation = collation_with(|i| if i < 6 { vec![("F", "a")] } else { vec![] });
    let pipeline = pipeline().with_solver(Box::new(LawsonHanson::new().with_max_iter(50)));
    let output = pipeline.run(&collation, 2).unwrap();
    let a = output.assignment("A1").unwrap().dominant_group();
    assert_eq!(output.assignment("F").unwrap().dominant_group(), a);
}

#[test]
fn invalid_configuration_is_rejected_up_front() {
    let mut cfg = config();
    cfg.min_extant_proportion = -0.1;
    assert!(matches!(
        Pipeline::new(cfg),
        Err(CollationError::InvalidConfig(_))
    ));
}

#[test]
fn matrix_assembles_without_any_complete_witness() {
    let collation = Collation::new(vec![
        VariationUnit::new("u0", vec![Reading::new("a", "", ["A"])]),
        VariationUnit::new("u1", vec![Reading::new("a", "", ["B"])]),
    ]);
    let pipeline = pipeline();

    let matrix = pipeline.assemble(&collation).unwrap();
    assert_eq!(matrix.witnesses(), &["A".to_string(), "B".to_string()]);
    assert_eq!(matrix.weight("B", "u1", "a"), 1.0);

    assert!(matches!(
        pipeline.prepare(&collation),
        Err(CollationError::EmptyMatrix { .. })
    ));
}
