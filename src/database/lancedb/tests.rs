use super::*;

fn point(id: &str, source: &str, text: &str, distance: f32) -> ScoredPoint {
    ScoredPoint {
        id: id.to_string(),
        payload: PointPayload {
            source: source.to_string(),
            text: text.to_string(),
        },
        distance,
        score: 1.0 - distance,
    }
}

#[test]
fn search_result_deduplicates_sources() {
    let points = vec![
        point("1", "a.txt", "The cat sat.", 0.1),
        point("2", "b.pdf", "The dog ran.", 0.2),
        point("3", "a.txt", "The bird flew.", 0.3),
    ];

    let result = SearchResult::from_points(&points);
    assert_eq!(
        result.contexts,
        ["The cat sat.", "The dog ran.", "The bird flew."]
    );
    assert_eq!(result.sources, ["a.txt", "b.pdf"]);
}

#[test]
fn search_result_skips_empty_text() {
    let points = vec![point("1", "empty.txt", "", 0.1), point("2", "a.txt", "text", 0.2)];

    let result = SearchResult::from_points(&points);
    assert_eq!(result.contexts, ["text"]);
    assert_eq!(result.sources, ["a.txt"]);
}

#[test]
fn empty_search_result() {
    let result = SearchResult::from_points(&[]);
    assert!(result.contexts.is_empty());
    assert!(result.sources.is_empty());
}

#[test]
fn distance_names() {
    assert_eq!(Distance::default(), Distance::Cosine);
    assert_eq!(Distance::Cosine.to_string(), "cosine");
    let parsed: Distance = serde_json::from_str("\"l2\"").expect("should parse");
    assert_eq!(parsed, Distance::L2);
}
