use crate::config::ChunkingConfig;
use crate::error::{Error, Result};
use crate::types::{ChildChunk, Document, ParentChunk, ParentGroup};

/// Share of U+FFFD characters above which a document counts as undecodable.
const MAX_REPLACEMENT_RATIO: f32 = 0.1;

/// Splits documents into parent windows and child windows inside them.
///
/// Output depends only on the document and the config, so ids are stable
/// across runs and can be used as upsert keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    pub fn chunk(&self, doc: &Document) -> Result<Vec<ParentGroup>> {
        check_readable(doc)?;
        let words: Vec<&str> = doc.raw_text.split_whitespace().collect();

        let parent_windows = if self.config.parent_words == 0 {
            vec![(0, words.len())]
        } else {
            windows(words.len(), self.config.parent_words, self.config.parent_overlap)
        };

        let mut groups = Vec::with_capacity(parent_windows.len());
        for (p_idx, (p_start, p_end)) in parent_windows.into_iter().enumerate() {
            let parent_words = &words[p_start..p_end];
            let parent_id = format!("{}#p{:04}", doc.id, p_idx);
            let children = windows(parent_words.len(), self.config.child_words, self.config.child_overlap)
                .into_iter()
                .enumerate()
                .map(|(c_idx, (c_start, c_end))| ChildChunk {
                    id: format!("{}/c{:04}", parent_id, c_idx),
                    parent_id: parent_id.clone(),
                    text: parent_words[c_start..c_end].join(" "),
                    vector: None,
                })
                .collect();
            let parent = ParentChunk {
                id: parent_id,
                document_id: doc.id.clone(),
                text: parent_words.join(" "),
                summary: None,
                summary_vector: None,
            };
            groups.push(ParentGroup { parent, children });
        }
        Ok(groups)
    }
}

fn check_readable(doc: &Document) -> Result<()> {
    let text = doc.raw_text.as_str();
    if text.trim().is_empty() {
        return Err(Error::malformed(&doc.id, "document text is empty"));
    }
    if text.contains('\0') {
        return Err(Error::malformed(&doc.id, "document contains binary data"));
    }
    let total = text.chars().filter(|c| !c.is_whitespace()).count();
    let replaced = text.chars().filter(|&c| c == char::REPLACEMENT_CHARACTER).count();
    if total > 0 && replaced as f32 / total as f32 > MAX_REPLACEMENT_RATIO {
        return Err(Error::malformed(&doc.id, "document text could not be decoded"));
    }
    Ok(())
}

/// Half-open `[start, end)` windows of `size` items overlapping by `overlap`.
/// Requires `overlap < size`; always yields at least one window when `len > 0`.
fn windows(len: usize, size: usize, overlap: usize) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut start = 0;
    while start < len {
        let end = (start + size).min(len);
        out.push((start, end));
        if end >= len {
            break;
        }
        start = end - overlap;
    }
    out
}
