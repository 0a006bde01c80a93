mod common;

use es_explorer::analysis::query::query_groups;
use es_explorer::config::AnalysisConfig;
use es_explorer::runner::similarity_engine;
use es_explorer::series::CapacitySeries;
use es_explorer::similarity::{
    DistanceMetric, SimilarityConfig, SimilarityEngine, SimilarityError, distance,
};

fn config(metric: DistanceMetric, k: usize) -> SimilarityConfig {
    SimilarityConfig {
        metric,
        k,
        horizon_days: 180,
        step_days: 30,
        exclude_self: true,
    }
}

#[test]
fn single_point_query_matches_worked_example() {
    let query = CapacitySeries::from_pairs([(common::date(2020, 1, 1), 50.0)]).expect("query");
    let candidate =
        CapacitySeries::from_pairs([(common::date(2020, 1, 1), 100.0)]).expect("candidate");
    let mut engine = SimilarityEngine::new(config(DistanceMetric::Absolute, 3));
    engine.push("A", candidate);

    let neighbors = engine.nearest("Q", &query).expect("one neighbour");
    assert_eq!(neighbors.len(), 1);
    assert_eq!(neighbors[0].key, "A");
    assert_eq!(neighbors[0].distance, 50.0);
    assert_eq!(neighbors[0].weight, 1.0);
}

#[test]
fn distance_is_symmetric_across_fixture_groups() {
    let data = common::sample_dataset();
    let groups = query_groups(&data, &AnalysisConfig::default().group_query());
    for metric in [
        DistanceMetric::Absolute,
        DistanceMetric::Euclidean,
        DistanceMetric::Cosine,
        DistanceMetric::Correlation,
    ] {
        for a in &groups {
            assert_eq!(distance(&a.series, &a.series, metric, 7), Some(0.0));
            for b in &groups {
                assert_eq!(
                    distance(&a.series, &b.series, metric, 7),
                    distance(&b.series, &a.series, metric, 7),
                    "{metric:?} {} / {}",
                    a.key,
                    b.key
                );
            }
        }
    }
}

#[test]
fn query_is_never_its_own_neighbour() {
    let data = common::sample_dataset();
    let config = AnalysisConfig::default();
    let groups = query_groups(&data, &config.group_query());
    let engine = similarity_engine(&groups, &config);
    for group in &groups {
        let result = engine.project_key(&group.key).expect("projection");
        assert!(result.neighbors.iter().all(|n| n.key != group.key));
        let total: f64 = result.neighbors.iter().map(|n| n.weight).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }
}

#[test]
fn single_neighbour_projection_is_reanchored_continuation() {
    let query = common::monthly(6, |i| 10.0 + f64::from(i));
    let neighbour = common::monthly(18, |i| 100.0 + 3.0 * f64::from(i));
    let mut engine = SimilarityEngine::new(config(DistanceMetric::Euclidean, 1));
    engine.push("N", neighbour.clone());

    let result = engine.project("Q", &query).expect("projection");
    assert!(result.is_projected());
    let anchor = query.last().expect("query has points");
    let base = neighbour.value_at(anchor.date).expect("neighbour covers anchor");
    for p in &result.projection {
        let expected =
            anchor.capacity + (neighbour.value_at(p.date).expect("covered") - base);
        assert!((p.capacity - expected).abs() < 1e-9, "{}", p.date);
        assert_eq!(p.lower, p.upper);
        assert_eq!(p.contributors, 1);
    }
}

#[test]
fn insufficient_data_errors_are_named() {
    let mut engine = SimilarityEngine::new(config(DistanceMetric::Euclidean, 2));
    engine.push("late", common::monthly(3, f64::from));

    let empty = engine.project("Q", &CapacitySeries::default());
    assert!(matches!(empty, Err(SimilarityError::EmptyQuery { .. })));

    let early = CapacitySeries::from_pairs([
        (common::date(2015, 1, 1), 1.0),
        (common::date(2015, 6, 1), 2.0),
    ])
    .expect("early series");
    let disjoint = engine.project("Q", &early);
    assert!(matches!(
        disjoint,
        Err(SimilarityError::NoEligibleCandidates { .. })
    ));
}

#[test]
fn backtest_on_fixture_reports_error() {
    let data = common::sample_dataset();
    let mut config = AnalysisConfig::default();
    config.similarity.horizon_days = 730;
    config.similarity.step_days = 30;
    let groups = query_groups(&data, &config.group_query());
    let engine = similarity_engine(&groups, &config);

    // San Francisco spans the whole fixture; its first half is followed by
    // two more years of data in every other zip code
    let backtest = engine.backtest("94110").expect("backtest");
    assert!(backtest.result.is_projected());
    assert!(backtest.mean_abs_error.is_some_and(|e| e.is_finite() && e >= 0.0));
}
