use regex::Regex;
use std::sync::Arc;

use crate::feed::CandidateItem;
use crate::storage::{Category, CategorySnapshot, Tag};

/// Name of the category used when no tag matches.
pub const FALLBACK_CATEGORY: &str = "General";

/// Tag hits for one category against one item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryScore {
    /// Distinct tags with at least one whole-word occurrence.
    pub word_matches: usize,
    /// Occurrences summed over the matching tags.
    pub total_matches: usize,
}

impl CategoryScore {
    /// Strictly more distinct tags wins; on a tie, strictly more occurrences.
    fn beats(&self, best: &CategoryScore) -> bool {
        self.word_matches > best.word_matches
            || (self.word_matches == best.word_matches && self.total_matches > best.total_matches)
    }
}

struct TagMatcher {
    tag: Tag,
    pattern: Regex,
}

struct CategoryMatcher {
    category: Arc<Category>,
    tags: Vec<TagMatcher>,
}

/// Scores items against a category snapshot using whole-word tag matches.
///
/// Tag patterns are compiled once per snapshot.
pub struct Categorizer {
    matchers: Vec<CategoryMatcher>,
    fallback: Option<Arc<Category>>,
}

impl Categorizer {
    pub fn new(snapshot: &CategorySnapshot) -> Self {
        let matchers = snapshot
            .iter()
            .map(|category| CategoryMatcher {
                category: Arc::clone(category),
                tags: category.tags.iter().filter_map(compile_tag).collect(),
            })
            .collect();

        let fallback = snapshot
            .iter()
            .find(|c| c.name == FALLBACK_CATEGORY)
            .cloned();

        Self { matchers, fallback }
    }

    /// Assign the best-scoring category and record every matched tag.
    ///
    /// Tags matched by any category are added to the item, not only the
    /// winner's. Categories are visited in snapshot order and an equal score
    /// never displaces an earlier winner. With no match at all the item goes
    /// to "General" when that category exists, and stays uncategorised
    /// otherwise.
    pub fn categorize(&self, item: &mut CandidateItem) {
        let text = format!(
            "{} {}",
            item.title.to_lowercase(),
            item.description.to_lowercase()
        );

        let mut best: Option<&Arc<Category>> = None;
        let mut best_score = CategoryScore::default();

        for matcher in &self.matchers {
            let (score, matched) = score_matcher(matcher, &text);
            item.tags.extend(matched.into_iter().cloned());

            if score.beats(&best_score) {
                best = Some(&matcher.category);
                best_score = score;
            }
        }

        item.category = best.or(self.fallback.as_ref()).cloned();

        tracing::debug!(
            url = %item.content_url,
            category = item.category_name().unwrap_or("-"),
            word_matches = best_score.word_matches,
            total_matches = best_score.total_matches,
            "Categorised item"
        );
    }

    /// Score a single category against free text, for diagnostics and tests.
    pub fn score(&self, category_id: i64, text: &str) -> Option<CategoryScore> {
        let matcher = self
            .matchers
            .iter()
            .find(|m| m.category.id == category_id)?;
        Some(score_matcher(matcher, &text.to_lowercase()).0)
    }
}

/// Score one category against lowercased `text`, returning the tags that hit.
fn score_matcher<'m>(matcher: &'m CategoryMatcher, text: &str) -> (CategoryScore, Vec<&'m Tag>) {
    let mut score = CategoryScore::default();
    let mut matched = Vec::new();
    for tag in &matcher.tags {
        let hits = tag.pattern.find_iter(text).count();
        if hits > 0 {
            score.word_matches += 1;
            score.total_matches += hits;
            matched.push(&tag.tag);
        }
    }
    (score, matched)
}

fn compile_tag(tag: &Tag) -> Option<TagMatcher> {
    let name = tag.name.trim();
    if name.is_empty() {
        return None;
    }

    let source = format!(r"(?i)\b{}\b", regex::escape(name));
    match Regex::new(&source) {
        Ok(pattern) => Some(TagMatcher {
            tag: tag.clone(),
            pattern,
        }),
        Err(e) => {
            tracing::warn!(tag = %tag.name, error = %e, "Skipping tag that cannot be matched");
            None
        }
    }
}
