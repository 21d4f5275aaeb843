use std::collections::HashSet;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "have", "in", "is", "it", "its", "of", "on",
    "or", "that", "the", "this", "to", "was", "were", "will", "with", "what", "which", "who", "how", "why", "when",
    "does", "do", "did", "can", "should", "would", "there", "their", "they", "you", "your", "into", "about", "than",
];

/// Lowercased alphanumeric words minus stopwords and single characters.
pub fn content_words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 1)
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na * nb <= f32::EPSILON {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// Similarity of the question and the generated answer, in [0, 1].
pub fn answer_relevancy(question_vec: &[f32], answer_vec: &[f32]) -> f32 {
    cosine(question_vec, answer_vec).clamp(0.0, 1.0)
}

/// Share of the ground truth's content words found in the retrieved
/// contexts. A ground truth with no content words scores 0.
pub fn context_recall(ground_truth: &str, contexts: &[String]) -> f32 {
    let wanted = content_words(ground_truth);
    if wanted.is_empty() {
        return 0.0;
    }
    let available: HashSet<String> = contexts.iter().flat_map(|c| content_words(c)).collect();
    wanted.iter().filter(|w| available.contains(*w)).count() as f32 / wanted.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recall_counts_covered_words() {
        let contexts = vec!["Clean the filter monthly".to_string(), "tank overflow pipe".to_string()];
        assert_eq!(context_recall("Clean the filter every month", &contexts), 0.5);
        assert_eq!(context_recall("filter tank", &contexts), 1.0);
        assert_eq!(context_recall("the a", &contexts), 0.0);
        assert_eq!(context_recall("goats", &[]), 0.0);
    }

    #[test]
    fn relevancy_is_clamped() {
        assert_eq!(answer_relevancy(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
        assert!((answer_relevancy(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
        assert_eq!(answer_relevancy(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
