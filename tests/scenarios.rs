//! End-to-end scenarios for the similarity pipeline.

use std::collections::HashSet;
use std::fs;

use serde_json::{json, Value};
use simjoin::io::{MemorySink, MemorySource};
use simjoin::{
    Error, JsonlItemSource, JsonlResultSink, NeighborList, Pipeline, Projections, RawItem, Record,
    RunStatus, SimilarityConfig,
};

fn raw(id: &str, lang: &str, text: &str) -> RawItem {
    RawItem {
        id: Some(id.into()),
        language: Some(lang.into()),
        text: text.into(),
    }
}

fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

fn scenario_config() -> SimilarityConfig {
    SimilarityConfig {
        k: 5,
        min_tokens: 2,
        ..Default::default()
    }
}

/// A single table whose direction is all zeros: every vector lands in bucket 0,
/// so blocking degenerates to exhaustive same-language comparison.
fn exhaustive(config: &SimilarityConfig) -> Pipeline {
    let projections =
        Projections::from_directions(vec![vec![0.0; config.dimension]], 1.0).unwrap();
    Pipeline::with_projections(config.clone(), projections).unwrap()
}

fn corpus() -> Vec<RawItem> {
    let texts = [
        ("en", "rust ownership borrowing lifetimes memory safety"),
        ("en", "rust borrowing lifetimes traits generics"),
        ("en", "python decorators generators iterators"),
        ("en", "python generators iterators async await"),
        ("en", "graph theory shortest paths dijkstra"),
        ("en", "graph algorithms dijkstra bellman ford paths"),
        ("fr", "cuisine recettes pâtes fraîches tomates"),
        ("fr", "recettes pâtes tomates basilic cuisine"),
        ("fr", "histoire révolution française république"),
        ("de", "geschichte deutschland mittelalter burgen"),
    ];
    texts
        .iter()
        .enumerate()
        .map(|(i, (lang, text))| raw(&format!("item{i:02}"), lang, text))
        .collect()
}

#[test]
fn shared_vocabulary_makes_mutual_neighbors() {
    let cfg = scenario_config();
    let report = exhaustive(&cfg).run_items(abc());

    assert_eq!(report.status, RunStatus::Completed);
    let lists = &report.neighbors;
    assert_eq!(lists.len(), 3);

    assert_eq!(lists[0].item_id, "A");
    assert_eq!(lists[0].similar_ids, vec!["B"]);
    assert_eq!(lists[1].item_id, "B");
    assert_eq!(lists[1].similar_ids, vec!["A"]);
    assert!(lists[0].scores[0] > 0.25, "score {}", lists[0].scores[0]);
    assert!(lists[0].scores[0] <= 1.0);
    assert_eq!(lists[0].scores, lists[1].scores);

    assert_eq!(lists[2], NeighborList::empty("C"));
}

fn abc() -> Vec<RawItem> {
    vec![
        raw("A", "en", "intro to graph theory algorithms"),
        raw("B", "en", "graph theory and algorithms basics"),
        raw("C", "fr", "introduction aux algorithmes de graphes"),
    ]
}

#[test]
fn seeded_projections_find_the_same_neighbors() {
    // Wide buckets and many tables: a pair at cosine ~0.34 misses every
    // table with probability below 1e-8.
    let cfg = SimilarityConfig {
        bucket_width: 4.0,
        num_tables: 20,
        ..scenario_config()
    };
    let seeded = Pipeline::new(cfg.clone()).unwrap().run_items(abc());
    let full = exhaustive(&cfg).run_items(abc());

    assert_eq!(seeded.status, RunStatus::Completed);
    assert_eq!(seeded.neighbors, full.neighbors);
    assert_eq!(seeded.neighbors[0].similar_ids, vec!["B"]);
    assert_eq!(seeded.neighbors[1].similar_ids, vec!["A"]);
    assert!(seeded.neighbors[2].is_empty());
}

#[test]
fn default_token_gate_drops_short_descriptions() {
    // A and B keep four content tokens each; only C reaches the default five.
    let report = Pipeline::new(SimilarityConfig::default())
        .unwrap()
        .run_items(abc());
    assert_eq!(report.status, RunStatus::InsufficientData);
    assert_eq!(report.stats.extraction.too_few_tokens, 2);
    assert_eq!(report.neighbors, vec![NeighborList::empty("C")]);
}

#[test]
fn single_usable_item_yields_one_empty_list() {
    let cfg = scenario_config();
    let report = Pipeline::new(cfg).unwrap().run_items(vec![
        raw("only", "en", "graph theory algorithms"),
        RawItem {
            language: None,
            ..raw("nolang", "", "graph theory algorithms")
        },
    ]);
    assert_eq!(report.status, RunStatus::InsufficientData);
    assert_eq!(report.neighbors, vec![NeighborList::empty("only")]);
}

#[test]
fn threshold_above_every_score_reports_no_candidates() {
    let cfg = SimilarityConfig {
        min_cos: 0.99,
        ..scenario_config()
    };
    let report = exhaustive(&cfg).run_items(corpus());
    assert_eq!(report.status, RunStatus::NoCandidates);
    assert_eq!(report.neighbors.len(), 10);
    assert!(report.neighbors.iter().all(NeighborList::is_empty));
    assert!(report.stats.blocking.candidate_pairs > 0);
    assert_eq!(report.stats.scored_pairs, 0);
}

#[test]
fn neighbors_stay_within_language() {
    let cfg = scenario_config();
    let items = corpus();
    let lang_of = |id: &str| {
        items
            .iter()
            .find(|i| i.id.as_deref() == Some(id))
            .and_then(|i| i.language.clone())
    };
    let report = exhaustive(&cfg).run_items(items.clone());
    assert_eq!(report.status, RunStatus::Completed);
    for list in &report.neighbors {
        for n in &list.similar_ids {
            assert_ne!(n, &list.item_id);
            assert_eq!(lang_of(n), lang_of(&list.item_id));
        }
    }
    // The lone German item has nobody to compare with.
    assert!(report.neighbors[9].is_empty());
    // Nearest neighbor of the first rust item is the other rust item.
    assert_eq!(report.neighbors[0].similar_ids[0], "item01");
}

#[test]
fn k_bounds_list_length() {
    let cfg = SimilarityConfig {
        k: 1,
        min_cos: -1.0,
        ..scenario_config()
    };
    let report = exhaustive(&cfg).run_items(corpus());
    for list in &report.neighbors {
        assert!(list.len() <= 1);
        assert_eq!(list.similar_ids.len(), list.scores.len());
    }
}

#[test]
fn reruns_with_same_seed_are_identical() {
    let cfg = SimilarityConfig {
        bucket_width: 4.0,
        num_tables: 8,
        ..scenario_config()
    };
    let first = Pipeline::new(cfg.clone()).unwrap().run_items(corpus());
    let second = Pipeline::new(cfg).unwrap().run_items(corpus());
    assert_eq!(first, second);
}

#[test]
fn input_order_does_not_change_results() {
    let cfg = scenario_config();
    let pipeline = exhaustive(&cfg);
    let forward = pipeline.run_items(corpus());
    let mut reversed = corpus();
    reversed.reverse();
    let backward = pipeline.run_items(reversed);
    assert_eq!(forward.neighbors, backward.neighbors);
}

#[test]
fn missing_id_column_is_fatal_and_writes_nothing() {
    let cfg = SimilarityConfig {
        id_column: "courseId".into(),
        ..scenario_config()
    };
    let pipeline = Pipeline::new(cfg).unwrap();
    let mut source = MemorySource::new(vec![record(json!({
        "_id": "1", "language": "en", "shortDescription": "graph theory"
    }))]);
    let mut sink = MemorySink::default();
    match pipeline.run_job(&mut source, &mut sink) {
        Err(Error::MissingIdColumn { column, available }) => {
            assert_eq!(column, "courseId");
            assert!(available.contains(&"_id".to_string()));
        }
        other => panic!("expected missing id column, got {other:?}"),
    }
    assert_eq!(sink.writes, 0);
}

#[test]
fn zero_survivors_leave_the_sink_untouched() {
    let pipeline = Pipeline::new(scenario_config()).unwrap();
    let mut source = MemorySource::new(vec![
        record(json!({ "_id": "1", "shortDescription": "graph theory" })),
        record(json!({ "_id": null, "language": "en", "shortDescription": "graph theory" })),
    ]);
    let mut sink = MemorySink::default();
    let report = pipeline.run_job(&mut source, &mut sink).unwrap();
    assert_eq!(report.status, RunStatus::InsufficientData);
    assert!(report.neighbors.is_empty());
    assert_eq!(sink.writes, 0);
}

#[test]
fn jsonl_round_trip_through_files() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("courses.jsonl");
    let output = dir.path().join("course_similarity.jsonl");

    let lines = [
        json!({ "_id": { "$oid": "a1" }, "language": "English", "shortDescription": "Intro to graph theory", "keywords": ["algorithms", "graphs"] }),
        json!({ "_id": { "$oid": "a2" }, "language": "english ", "shortDescription": "Graph theory and algorithms", "keywords": "basics graphs" }),
        json!({ "_id": { "$oid": "a2" }, "language": "english", "shortDescription": "duplicate id" }),
        json!({ "_id": 3, "language": "French", "shortDescription": "Introduction aux graphes", "keywords": ["algorithmes"] }),
        json!({ "_id": 4, "shortDescription": "no language at all" }),
    ];
    let body: String = lines.iter().map(|l| format!("{l}\n")).collect();
    fs::write(&input, body).unwrap();

    let cfg = SimilarityConfig {
        min_tokens: 2,
        ..Default::default()
    };
    let pipeline = exhaustive(&cfg);
    let mut source = JsonlItemSource::open(&input).unwrap();
    let mut sink = JsonlResultSink::new(&output);
    let report = pipeline.run_job(&mut source, &mut sink).unwrap();
    assert_eq!(report.stats.cleaning.duplicates, 1);
    assert_eq!(report.stats.cleaning.missing_language, 1);

    let written: Vec<NeighborList> = fs::read_to_string(&output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let ids: HashSet<&str> = written.iter().map(|l| l.item_id.as_str()).collect();
    assert_eq!(ids, HashSet::from(["a1", "a2", "3"]));
    assert_eq!(written, report.neighbors);

    let a1 = written.iter().find(|l| l.item_id == "a1").unwrap();
    assert_eq!(a1.similar_ids, vec!["a2"]);
}
