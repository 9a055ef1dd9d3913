use unicode_segmentation::UnicodeSegmentation;

pub const DEFAULT_CHUNK_SENTENCES: usize = 200;
pub const DEFAULT_OVERLAP_RATIO: f32 = 0.2;

/// Splits `text` into windows of `chunk_size` sentences, consecutive windows
/// sharing `overlap_ratio * chunk_size` sentences.
pub fn chunk_text(text: &str, chunk_size: usize, overlap_ratio: f32) -> Vec<String> {
    let sentences: Vec<&str> = text
        .unicode_sentences()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if sentences.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let overlap = (chunk_size as f32 * overlap_ratio.clamp(0.0, 1.0)) as usize;
    let step = chunk_size.saturating_sub(overlap).max(1);

    (0..sentences.len())
        .step_by(step)
        .map(|start| {
            let end = (start + chunk_size).min(sentences.len());
            sentences[start..end].join(" ")
        })
        .collect()
}
