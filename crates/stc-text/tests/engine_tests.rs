use stc_core::compiler::build_request;
use stc_core::profile::{default_index_configs, BackendProfile, Category, RankingFormula};
use stc_core::query::CollectorOutput;
use stc_core::types::{SearchOptions, SortMode, TimeRange};
use stc_core::{Error, IndexEngine};
use stc_text::{CatalogIndexer, TantivyEngine};
use tempfile::TempDir;

const DOCS: &[&str] = &[
    r#"{"id":"1","title":"Black holes and time warps","abstract":"Gravity bends light","languages":["en"],"type":"book","issued_at":1000,"quantized_page_rank":200}"#,
    r#"{"id":"2","title":"Black hole thermodynamics","abstract":"Entropy of a black hole","languages":["de"],"type":"journal-article","issued_at":2000}"#,
    r#"{"id":"3","title":"Monographs on stellar evolution","languages":["en"],"type":"monograph","issued_at":3000}"#,
    r#"{"id":"4","title":"Cooking with cast iron","languages":["en"],"type":"book","issued_at":4000}"#,
];

fn engine() -> (TempDir, TantivyEngine) {
    let tmp = TempDir::new().unwrap();
    let indexer = CatalogIndexer::create_in_ram();
    assert_eq!(indexer.add_json_documents(DOCS.iter().copied()).unwrap(), 4);
    let engine = TantivyEngine::new(tmp.path().to_path_buf());
    engine.attach("nexus_science", indexer.into_index()).unwrap();
    (tmp, engine)
}

fn split(outputs: &[CollectorOutput]) -> (Vec<String>, bool, u64) {
    let count = outputs[1].count().expect("count collector second");
    match &outputs[0] {
        CollectorOutput::Documents(docs) => {
            let ids = docs
                .scored_documents
                .iter()
                .map(|d| d.document["id"].as_str().unwrap_or_default().to_string())
                .collect();
            (ids, docs.has_next, count)
        }
        other => panic!("expected documents, got {other:?}"),
    }
}

#[tokio::test]
async fn text_match_ranks_and_snippets() -> anyhow::Result<()> {
    let (_tmp, engine) = engine();
    let profile = BackendProfile::nexus_science();
    let outputs = engine.search(&build_request("black hole", &SearchOptions::page(1), &profile)).await?;
    let (ids, has_next, count) = split(&outputs);
    assert_eq!(count, 2);
    assert_eq!(ids, ["2", "1"]);
    assert!(!has_next);

    if let CollectorOutput::Documents(docs) = &outputs[0] {
        let top = &docs.scored_documents[0];
        assert_eq!(top.position, 0);
        assert!(top.snippets.get("title").is_some_and(|s| s.contains("<b>")));
    }
    Ok(())
}

#[tokio::test]
async fn filters_map_to_terms_and_ranges() -> anyhow::Result<()> {
    let (_tmp, engine) = engine();
    let profile = BackendProfile::nexus_science();

    let books = SearchOptions { category: Some(Category::Books), ..SearchOptions::page(1) };
    let (_, _, count) = split(&engine.search(&build_request("", &books, &profile)).await?);
    assert_eq!(count, 3, "book and monograph types");

    let german = SearchOptions { language: Some("de".into()), ..SearchOptions::page(1) };
    let (ids, _, _) = split(&engine.search(&build_request("", &german, &profile)).await?);
    assert_eq!(ids, ["2"]);

    let window = SearchOptions { timerange: Some(TimeRange { from: 1000, to: 3000 }), ..SearchOptions::page(1) };
    let (mut ids, _, _) = split(&engine.search(&build_request("", &window, &profile)).await?);
    ids.sort();
    assert_eq!(ids, ["1", "2"], "lower bound included, upper excluded");
    Ok(())
}

#[tokio::test]
async fn date_sort_paginates() -> anyhow::Result<()> {
    let (_tmp, engine) = engine();
    let profile = BackendProfile::nexus_science();
    let first = SearchOptions { sort: SortMode::Date, page_size: Some(2), ..SearchOptions::page(1) };
    let second = SearchOptions { page: 2, ..first.clone() };

    let (ids, has_next, count) = split(&engine.search(&build_request("", &first, &profile)).await?);
    assert_eq!((ids, has_next, count), (vec!["4".to_string(), "3".to_string()], true, 4));

    let (ids, has_next, _) = split(&engine.search(&build_request("", &second, &profile)).await?);
    assert_eq!(ids, ["2", "1"]);
    assert!(!has_next);
    Ok(())
}

#[tokio::test]
async fn formula_scoring_and_random_sampling() -> anyhow::Result<()> {
    let (_tmp, engine) = engine();
    let profile = BackendProfile::nexus_science().with_ranking_formula(RankingFormula::AuthorityTemporalDecay);
    let (ids, _, count) = split(&engine.search(&build_request("black", &SearchOptions::page(1), &profile)).await?);
    assert_eq!(ids.len() as u64, count);

    let random = SearchOptions { random: true, page_size: Some(2), ..SearchOptions::page(1) };
    let outputs = engine.search(&build_request("", &random, &profile)).await?;
    match &outputs[0] {
        CollectorOutput::ReservoirSampling(sample) => assert_eq!(sample.documents.len(), 2),
        other => panic!("expected sample, got {other:?}"),
    }
    assert_eq!(outputs[1].count(), Some(4));
    Ok(())
}

#[tokio::test]
async fn register_opens_collection_directory() -> anyhow::Result<()> {
    let tmp = TempDir::new()?;
    let indexer = CatalogIndexer::create_in_dir(tmp.path().join("nexus_free"))?;
    indexer.add_json_documents(DOCS.iter().copied())?;
    drop(indexer);

    let engine = TantivyEngine::new(tmp.path().to_path_buf());
    let config = default_index_configs("http://localhost/data").remove(0);
    assert!(!engine.is_registered("nexus_free"));
    engine.register(&config).await?;
    assert!(engine.is_registered("nexus_free"));

    let outputs = engine.search(&build_request("cooking", &SearchOptions::page(1), &BackendProfile::nexus_free())).await?;
    assert_eq!(outputs[1].count(), Some(1));

    let missing = engine.search(&build_request("", &SearchOptions::page(1), &BackendProfile::nexus_media())).await;
    assert!(matches!(missing, Err(Error::NotFound(_))));
    Ok(())
}

#[test]
fn blocking_search_runs_on_calling_thread() {
    let (_tmp, engine) = engine();
    let request = build_request("cast iron", &SearchOptions::page(1), &BackendProfile::nexus_science());
    let (ids, _, count) = split(&engine.search_blocking(&request).unwrap());
    assert_eq!(count, 1);
    assert_eq!(ids, ["4"]);

    let other = build_request("", &SearchOptions::page(1), &BackendProfile::nexus_media());
    assert!(matches!(engine.search_blocking(&other), Err(Error::NotFound(_))));
}
