//! Segment manifest (`meta.json`) of a distributed collection.

use serde::{Deserialize, Serialize};

use crate::error::SearchError;

pub const MANIFEST_FILE: &str = "meta.json";

/// Per-segment component files written by the engine on commit.
pub const SEGMENT_COMPONENTS: [&str; 6] = ["idx", "pos", "term", "store", "fast", "fieldnorm"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteMeta {
    pub opstamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub segment_id: String,
    #[serde(default)]
    pub deletes: Option<DeleteMeta>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentManifest {
    pub opstamp: u64,
    pub segments: Vec<SegmentMeta>,
}

impl SegmentMeta {
    fn file_stem(&self) -> String {
        self.segment_id.replace('-', "")
    }
}

impl SegmentManifest {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SearchError> {
        serde_json::from_slice(bytes).map_err(|e| SearchError::Manifest(e.to_string()))
    }

    pub fn hotcache_file(&self) -> String {
        format!("hotcache.{}.bin", self.opstamp)
    }

    /// Every component file of every segment, in manifest order.
    pub fn segment_files(&self) -> Vec<String> {
        self.segments
            .iter()
            .flat_map(|segment| {
                let id = segment.file_stem();
                SEGMENT_COMPONENTS.into_iter().map(move |ext| format!("{id}.{ext}"))
            })
            .collect()
    }

    /// Everything a local replica needs besides `meta.json` itself.
    pub fn replica_files(&self) -> Vec<String> {
        let mut files = self.segment_files();
        files.extend(self.required_files());
        files
    }

    /// One deletion log per segment that has deletes, then the shared hot cache.
    pub fn required_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self
            .segments
            .iter()
            .filter_map(|segment| {
                let deletes = segment.deletes.as_ref()?;
                Some(format!("{}.{}.del", segment.file_stem(), deletes.opstamp))
            })
            .collect();
        files.push(self.hotcache_file());
        files
    }
}
