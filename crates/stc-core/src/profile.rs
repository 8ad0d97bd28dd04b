//! Per-collection backend profiles, ranking formulas and the default collections.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::Utc;

use crate::types::{
    ExactMatchesPromoter, IndexConfig, IndexProperties, QueryParserConfig, Seed,
    TermFieldMapperConfig,
};

const MIB: u64 = 1024 * 1024;

/// Named ranking expressions understood by the engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingFormula {
    /// `score * decay(|now - t|)` with a 3-day half-scale sigmoid.
    TemporalDecay,
    /// Temporal decay further weighted by page-rank authority.
    AuthorityTemporalDecay,
}

const AUTHORITY_FACTOR: &str = " * 1.96 * fastsigm(iqpr(quantized_page_rank), 0.15)";

impl RankingFormula {
    pub fn expression(self, temporal_field: &str) -> String {
        let temporal = format!(
            "original_score * custom_score * fastsigm(abs(now - {temporal_field}) / (86400 * 3) + 5, -1)"
        );
        match self {
            RankingFormula::TemporalDecay => temporal,
            RankingFormula::AuthorityTemporalDecay => temporal + AUTHORITY_FACTOR,
        }
    }

    /// Inverse of [`RankingFormula::expression`]: recovers the formula and its temporal field.
    pub fn recognize(expr: &str) -> Option<(RankingFormula, String)> {
        let start = expr.find("abs(now - ")? + "abs(now - ".len();
        let len = expr[start..].find(')')?;
        let field = expr[start..start + len].trim().to_string();
        [RankingFormula::TemporalDecay, RankingFormula::AuthorityTemporalDecay]
            .into_iter()
            .find(|f| f.expression(&field) == expr)
            .map(|f| (f, field))
    }
}

/// Document categories that expand into several underlying `type` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Books,
}

const CATEGORY_TYPES: &[(Category, &[&str])] = &[(
    Category::Books,
    &["book", "edited-book", "monograph", "reference-book"],
)];

impl Category {
    pub fn type_values(self) -> &'static [&'static str] {
        CATEGORY_TYPES
            .iter()
            .find(|(c, _)| *c == self)
            .map(|(_, values)| *values)
            .unwrap_or(&[])
    }

    pub fn all() -> impl Iterator<Item = Category> {
        CATEGORY_TYPES.iter().map(|(c, _)| *c)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Books => write!(f, "books"),
        }
    }
}

impl FromStr for Category {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::all()
            .find(|c| c.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| crate::Error::InvalidQuery(format!("unknown category '{s}'")))
    }
}

/// Language codes accepted by the language filter, with display names.
pub const SUPPORTED_LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("ar", "Arabic"),
    ("zh", "Chinese"),
    ("am", "Ethiopian"),
    ("fa", "Farsi"),
    ("de", "German"),
    ("hi", "Hindi"),
    ("id", "Indonesian"),
    ("it", "Italian"),
    ("ja", "Japanese"),
    ("ms", "Malay"),
    ("pt", "Portuguese"),
    ("ru", "Russian"),
    ("es", "Spanish"),
    ("tg", "Tajik"),
    ("uk", "Ukrainian"),
    ("uz", "Uzbek"),
];

pub fn is_supported_language(code: &str) -> bool {
    SUPPORTED_LANGUAGES.iter().any(|(c, _)| *c == code)
}

/// Field layout, scoring toggles and parser settings for one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendProfile {
    pub index_alias: String,
    pub default_page_size: usize,
    pub snippet_configs: BTreeMap<String, usize>,
    pub temporal_field: String,
    pub language_field: String,
    pub type_field: String,
    /// Attached as an `eval_expr` scorer when set and date sorting is off.
    pub ranking_formula: Option<RankingFormula>,
    pub is_fieldnorms_scoring_enabled: bool,
    pub query_parser_config: Option<QueryParserConfig>,
}

fn snippets(pairs: &[(&str, usize)]) -> BTreeMap<String, usize> {
    pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
}

fn aliases(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
}

fn boosts(pairs: &[(&str, f32)]) -> BTreeMap<String, f32> {
    pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
}

fn term_mappers(pairs: &[(&str, &[&str])]) -> BTreeMap<String, TermFieldMapperConfig> {
    pairs
        .iter()
        .map(|(k, fields)| {
            let fields = fields.iter().map(|f| (*f).to_string()).collect();
            ((*k).to_string(), TermFieldMapperConfig { fields })
        })
        .collect()
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

impl BackendProfile {
    fn base(index_alias: &str, temporal_field: &str) -> Self {
        Self {
            index_alias: index_alias.to_string(),
            default_page_size: 10,
            snippet_configs: snippets(&[("abstract", 400), ("title", 180)]),
            temporal_field: temporal_field.to_string(),
            language_field: "languages".to_string(),
            type_field: "type".to_string(),
            ranking_formula: None,
            is_fieldnorms_scoring_enabled: false,
            query_parser_config: None,
        }
    }

    pub fn nexus_science() -> Self {
        Self { query_parser_config: Some(science_parser_config()), ..Self::base("nexus_science", "issued_at") }
    }

    pub fn nexus_free() -> Self {
        Self { query_parser_config: Some(free_parser_config()), ..Self::base("nexus_free", "issued_at") }
    }

    pub fn nexus_media() -> Self {
        Self {
            snippet_configs: snippets(&[("title", 340)]),
            query_parser_config: Some(media_parser_config()),
            ..Self::base("nexus_media", "registered_at")
        }
    }

    pub fn for_alias(index_alias: &str) -> Option<Self> {
        match index_alias {
            "nexus_science" => Some(Self::nexus_science()),
            "nexus_free" => Some(Self::nexus_free()),
            "nexus_media" => Some(Self::nexus_media()),
            _ => None,
        }
    }

    /// Profile for a stored collection: known layouts are reused, scoring toggles
    /// and parser settings come from the config.
    pub fn for_index(config: &IndexConfig) -> Self {
        let mut profile = Self::for_alias(&config.index_name)
            .unwrap_or_else(|| Self::base(&config.index_name, "issued_at"));
        let props = config.index_properties;
        profile.is_fieldnorms_scoring_enabled = props.is_fieldnorms_scoring_enabled;
        profile.query_parser_config = Some(config.query_parser_config.clone());
        profile.ranking_formula = props.is_temporal_scoring_enabled.then(|| {
            if config.index_name == "nexus_science" {
                RankingFormula::AuthorityTemporalDecay
            } else {
                RankingFormula::TemporalDecay
            }
        });
        profile
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.default_page_size = page_size;
        self
    }

    pub fn with_ranking_formula(mut self, formula: RankingFormula) -> Self {
        self.ranking_formula = Some(formula);
        self
    }
}

fn science_parser_config() -> QueryParserConfig {
    QueryParserConfig {
        field_aliases: aliases(&[
            ("ark_id", "id.ark_ids"),
            ("author", "authors.family"),
            ("authors", "authors.family"),
            ("cid", "links.cid"),
            ("doi", "id.dois"),
            ("extension", "links.extension"),
            ("format", "links.extension"),
            ("isbn", "metadata.isbns"),
            ("isbns", "metadata.isbns"),
            ("issns", "metadata.issns"),
            ("lang", "languages"),
            ("ev", "metadata.event.name"),
            ("nexus_id", "id.nexus_id"),
            ("pmid", "id.pubmed_id"),
            ("pub", "metadata.publisher"),
            ("pubmed_id", "id.pubmed_id"),
            ("rd", "references.doi"),
            ("ser", "metadata.series"),
        ]),
        field_boosts: boosts(&[("authors", 2.7), ("title", 2.0)]),
        term_field_mapper_configs: term_mappers(&[
            ("doi", &["id.dois"]),
            ("doi_isbn", &["metadata.isbns"]),
            ("isbn", &["metadata.isbns"]),
        ]),
        term_limit: 10,
        default_fields: strings(&["abstract", "content", "title"]),
        exact_matches_promoter: Some(ExactMatchesPromoter { slop: 1, boost: 1.5, fields: strings(&["title"]) }),
        removed_fields: Vec::new(),
    }
}

fn free_parser_config() -> QueryParserConfig {
    QueryParserConfig {
        field_aliases: aliases(&[
            ("author", "authors.name"),
            ("authors", "authors.name"),
            ("cid", "links.cid"),
            ("extension", "links.extension"),
            ("format", "links.extension"),
            ("isbns", "id.isbns"),
            ("issns", "metadata.issns"),
            ("lang", "language"),
            ("pub", "metadata.publisher"),
            ("ser", "metadata.series"),
        ]),
        field_boosts: boosts(&[("title", 1.3)]),
        term_field_mapper_configs: term_mappers(&[("doi_isbn", &["id.isbns"]), ("isbn", &["id.isbns"])]),
        term_limit: 10,
        default_fields: strings(&["abstract", "content", "title"]),
        exact_matches_promoter: Some(ExactMatchesPromoter { slop: 0, boost: 1.5, fields: strings(&["title"]) }),
        removed_fields: strings(&["concepts", "doi", "ev", "rd"]),
    }
}

fn media_parser_config() -> QueryParserConfig {
    QueryParserConfig {
        field_aliases: aliases(&[("lang", "language")]),
        field_boosts: boosts(&[("title", 1.3)]),
        term_field_mapper_configs: BTreeMap::new(),
        term_limit: 10,
        default_fields: strings(&["title"]),
        exact_matches_promoter: Some(ExactMatchesPromoter { slop: 0, boost: 1.5, fields: strings(&["title"]) }),
        removed_fields: Vec::new(),
    }
}

fn stored_science_parser_config() -> QueryParserConfig {
    QueryParserConfig {
        field_aliases: aliases(&[
            ("author", "authors.family"),
            ("authors", "authors.family"),
            ("cid", "links.cid"),
            ("extension", "links.extension"),
            ("format", "links.extension"),
            ("isbns", "id.isbns"),
            ("issns", "metadata.issns"),
            ("lang", "language"),
            ("ev", "metadata.event.name"),
            ("pub", "metadata.publisher"),
            ("ser", "metadata.series"),
        ]),
        field_boosts: boosts(&[("title", 1.3)]),
        term_field_mapper_configs: term_mappers(&[
            ("doi", &["doi"]),
            ("doi_isbn", &["metadata.isbns"]),
            ("isbn", &["metadata.isbns"]),
        ]),
        term_limit: 10,
        default_fields: strings(&["abstract", "content", "title"]),
        exact_matches_promoter: Some(ExactMatchesPromoter { slop: 0, boost: 1.5, fields: strings(&["title"]) }),
        removed_fields: strings(&["id"]),
    }
}

/// The collections installed into an empty metadata store.
///
/// `data_base_url` is the directory holding one sub-directory per collection.
pub fn default_index_configs(data_base_url: &str) -> Vec<IndexConfig> {
    let base = data_base_url.trim_end_matches('/');
    let now = Utc::now();
    let entry = |name: &str, cache_mib: u64, is_enabled: bool, is_exact_matches_promoted: bool, qpc: QueryParserConfig| {
        IndexConfig {
            index_name: name.to_string(),
            remote_engine_config: Seed::new(format!("{base}/{name}"), cache_mib * MIB).remote_engine_config(),
            query_parser_config: qpc,
            index_properties: IndexProperties {
                is_enabled,
                is_fieldnorms_scoring_enabled: false,
                is_temporal_scoring_enabled: false,
                is_exact_matches_promoted,
            },
            created_at: now,
        }
    };
    vec![
        entry("nexus_free", 128, true, true, free_parser_config()),
        entry("nexus_media", 128, false, false, media_parser_config()),
        entry("nexus_science", 512, true, false, stored_science_parser_config()),
    ]
}
