use serde_json::{json, Value};
use stc_core::query::CollectorOutput;

fn text_field<'a>(document: &'a Value, name: &str) -> Option<&'a str> {
    match &document[name] {
        Value::String(s) => Some(s),
        Value::Array(items) => items.first().and_then(Value::as_str),
        _ => None,
    }
}

fn headline(document: &Value) -> String {
    let title = text_field(document, "title").unwrap_or("(untitled)");
    match text_field(document, "doi").or_else(|| text_field(document, "id")) {
        Some(id) => format!("{title}  [{id}]"),
        None => title.to_string(),
    }
}

pub fn render(query: &str, outputs: &[CollectorOutput], as_json: bool) -> String {
    if as_json {
        return serde_json::to_string_pretty(&json!({ "query": query, "collector_outputs": outputs }))
            .unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"));
    }

    let total = outputs.iter().find_map(CollectorOutput::count);
    let mut lines = Vec::new();
    for output in outputs {
        match output {
            CollectorOutput::Documents(docs) => {
                match total {
                    Some(total) => lines.push(format!("Found {total} documents for \"{query}\"")),
                    None => lines.push(format!("Results for \"{query}\"")),
                }
                for doc in &docs.scored_documents {
                    lines.push(format!("\n  {}. {:.4}  {}", doc.position + 1, doc.score, headline(&doc.document)));
                    for (field, snippet) in &doc.snippets {
                        lines.push(format!("     {field}: {snippet}"));
                    }
                }
                if docs.has_next {
                    lines.push("\n  (more results on the next page)".to_string());
                }
            }
            CollectorOutput::ReservoirSampling(sample) => {
                lines.push(format!("Random sample of {} documents", sample.documents.len()));
                for doc in &sample.documents {
                    lines.push(format!("  - {}", headline(&doc.document)));
                }
            }
            CollectorOutput::Count(_) => {}
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use stc_core::query::{CountOutput, DocumentsOutput, ScoredDocument};

    #[test]
    fn human_output_lists_hits_with_total() {
        let doc = ScoredDocument {
            index_alias: "nexus_science".into(),
            document: json!({"title": "Black hole thermodynamics", "doi": "10.1/bh"}),
            score: 1.5,
            position: 0,
            snippets: Default::default(),
        };
        let outputs = vec![
            CollectorOutput::Documents(DocumentsOutput { scored_documents: vec![doc], has_next: true }),
            CollectorOutput::Count(CountOutput { count: 11 }),
        ];
        let text = render("black hole", &outputs, false);
        assert!(text.starts_with("Found 11 documents"));
        assert!(text.contains("1. 1.5000  Black hole thermodynamics  [10.1/bh]"));
        assert!(text.contains("next page"));
    }
}
