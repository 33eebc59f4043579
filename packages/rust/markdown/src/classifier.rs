//! Content Classifier: scores a span of markdown against weighted pattern
//! tables and structural signals, returning one [`ContentType`] with a
//! confidence in `[0, 1]`.
//!
//! Tables are plain data ([`PatternSpec`]) so ordering and weights can be
//! inspected and tested independently of the scoring loop.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use notefold_shared::ContentType;

use crate::fence::FenceTracker;

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// A pattern and the weight each match contributes.
#[derive(Debug, Clone, Copy)]
pub struct PatternSpec {
    pub pattern: &'static str,
    pub weight: f64,
}

const fn p(pattern: &'static str, weight: f64) -> PatternSpec {
    PatternSpec { pattern, weight }
}

pub const SUMMARY_PATTERNS: &[PatternSpec] = &[
    p(r"(?i)\b(summary|overview|tl;?dr|key (points|takeaways|decisions?))\b", 2.0),
    p(r"(?i)\b(in (short|summary|conclusion)|to summari[sz]e|overall|bottom line)\b", 1.5),
    p(r"(?i)\b(decided|decisions?|agreed|conclusions?|outcomes?|action items?)\b", 1.0),
    p(r"(?i)\b(goals?|objectives?|highlights?|recap)\b", 1.0),
];

pub const TECHNICAL_PATTERNS: &[PatternSpec] = &[
    p(
        r"(?i)\b(function|class|struct|method|api|endpoint|schema|database|query|config(uration)?|deploy(ment)?|server|compiler?|runtime|algorithm)\b",
        1.0,
    ),
    p(r"`[^`\n]+`", 1.0),
    p(r"(?i)\b(error|exception|stack ?trace|bug|regression|patch|v\d+\.\d+)\b", 0.8),
    p(r"\b[A-Za-z_][A-Za-z0-9_]*\([^()\n]*\)", 0.8),
    p(r"(?m)^\s*(\$ |>>> |npm |cargo |git |pip |docker |kubectl )", 1.2),
];

pub const REFERENCE_PATTERNS: &[PatternSpec] = &[
    p(r"https?://[^\s)>\]]+", 1.5),
    p(r"(?i)\b(see also|refer to|references?|sources?|citations?|documentation|bibliography)\b", 1.0),
    p(r"(?:^|[^!\]])\[[^\]\n]+\]\([^)\n]+\)", 1.0),
    p(r"(?i)\bdoi:\s*\S+|\bisbn[\s:-]*[\d-]{10,}", 1.5),
];

pub const ATTACHMENT_PATTERNS: &[PatternSpec] = &[
    p(
        r"(?i)\b(attach(ed|ment|ments)?|enclosed|screenshots?|diagrams?|figures?|photos?|images?)\b",
        1.0,
    ),
    p(
        r"(?i)\.(png|jpe?g|gif|heic|heif|webp|svg|pdf|docx?|xlsx?|pptx?)\b",
        1.5,
    ),
    p(r"--==ATTACHMENT_BLOCK", 2.5),
];

/// Weight of fenced-code membership (technical, per line).
pub const CODE_FENCE_WEIGHT: f64 = 1.5;
/// Weight of a heading (summary).
pub const HEADING_WEIGHT: f64 = 1.5;
/// Weight of a blockquote or key-point marker (summary). Highest per-match weight.
pub const KEY_POINT_WEIGHT: f64 = 3.0;
/// Weight of image syntax or a document-type link (attachment).
pub const ATTACHMENT_LINK_WEIGHT: f64 = 2.5;
/// Weight of a reference-style link or "See also" header (reference).
pub const REFERENCE_LINK_WEIGHT: f64 = 2.0;

static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}#{1,6}\s").expect("valid regex"));
static BLOCKQUOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}>").expect("valid regex"));
static KEY_POINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\*\*\s*(summary|tl;?dr|key (points?|takeaways?)|bottom line|conclusion|important)\s*:?\s*\*\*")
        .expect("valid regex")
});
static IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!\[[^\]\n]*\]\([^)\n]+\)|!\[\[[^\]\n]+\]\]").expect("valid regex")
});
static DOCUMENT_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^!])\[[^\]\n]*\]\(\s*<?[^)\s>]+\.(pdf|docx?|xlsx?|pptx?|odt|ods|odp|rtf)>?\s*\)")
        .expect("valid regex")
});
static REFERENCE_DEF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {0,3}\[[^\]\n]+\]:\s*\S+|\[[^\]\n]+\]\[[^\]\n]*\]").expect("valid regex")
});
static SEE_ALSO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^ {0,3}(#{1,6}\s*|\*\*)?see also\b").expect("valid regex")
});

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Per-category totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub content_type: ContentType,
    /// Sum of match weights.
    pub weighted: f64,
    /// Number of matches.
    pub matches: usize,
    /// Lines with at least one match.
    pub lines: usize,
    /// Whether a structural signal fired for this category.
    pub structural: bool,
}

/// Observations gathered while classifying a span.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Characteristics {
    pub line_count: usize,
    pub non_empty_lines: usize,
    pub code_lines: usize,
    pub headings: usize,
    pub key_points: usize,
    pub images: usize,
    pub document_links: usize,
    pub reference_links: usize,
    pub scores: Vec<CategoryScore>,
}

/// Outcome of [`Classifier::classify`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub content_type: ContentType,
    pub confidence: f64,
    pub characteristics: Characteristics,
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

struct CompiledPattern {
    regex: Regex,
    weight: f64,
}

#[derive(Default, Clone, Copy)]
struct Tally {
    weighted: f64,
    matches: usize,
    lines: usize,
    structural: bool,
}

impl Tally {
    fn add(&mut self, count: usize, weight: f64) {
        self.weighted += count as f64 * weight;
        self.matches += count;
    }
}

/// Compiled pattern tables.
pub struct Classifier {
    tables: [Vec<CompiledPattern>; 4],
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

fn compile(specs: &[PatternSpec]) -> Vec<CompiledPattern> {
    specs
        .iter()
        .map(|spec| CompiledPattern {
            regex: Regex::new(spec.pattern).expect("valid regex"),
            weight: spec.weight,
        })
        .collect()
}

/// Index of a scored category in [`ContentType::SCORED`].
fn slot(content_type: ContentType) -> usize {
    match content_type {
        ContentType::Summary => 0,
        ContentType::Technical => 1,
        ContentType::Reference => 2,
        _ => 3,
    }
}

impl Classifier {
    pub fn new() -> Self {
        Self {
            tables: [
                compile(SUMMARY_PATTERNS),
                compile(TECHNICAL_PATTERNS),
                compile(REFERENCE_PATTERNS),
                compile(ATTACHMENT_PATTERNS),
            ],
        }
    }

    /// Classify a span of markdown.
    pub fn classify(&self, span: &str) -> ClassificationResult {
        let mut chars = Characteristics::default();
        let mut tallies = [Tally::default(); 4];
        let mut fence = FenceTracker::new();

        for line in span.lines() {
            chars.line_count += 1;
            if line.trim().is_empty() {
                fence.observe(line);
                continue;
            }
            chars.non_empty_lines += 1;

            if fence.observe(line) {
                chars.code_lines += 1;
                let technical = slot(ContentType::Technical);
                tallies[technical].add(1, CODE_FENCE_WEIGHT);
                tallies[technical].structural = true;
                self.score_table(technical, line, &mut tallies);
                tallies[technical].lines += 1;
                continue;
            }

            let before: [usize; 4] = std::array::from_fn(|i| tallies[i].matches);
            for index in 0..4 {
                self.score_table(index, line, &mut tallies);
            }
            self.score_structure(line, &mut tallies, &mut chars);
            for (tally, matches_before) in tallies.iter_mut().zip(before) {
                if tally.matches > matches_before {
                    tally.lines += 1;
                }
            }
        }

        chars.scores = ContentType::SCORED
            .iter()
            .map(|&content_type| {
                let t = tallies[slot(content_type)];
                CategoryScore {
                    content_type,
                    weighted: t.weighted,
                    matches: t.matches,
                    lines: t.lines,
                    structural: t.structural,
                }
            })
            .collect();

        let (content_type, confidence) = decide(&tallies, chars.non_empty_lines);
        ClassificationResult {
            content_type,
            confidence,
            characteristics: chars,
        }
    }

    fn score_table(&self, index: usize, line: &str, tallies: &mut [Tally; 4]) {
        for pattern in &self.tables[index] {
            let count = pattern.regex.find_iter(line).count();
            if count > 0 {
                tallies[index].add(count, pattern.weight);
            }
        }
    }

    fn score_structure(&self, line: &str, tallies: &mut [Tally; 4], chars: &mut Characteristics) {
        let summary = slot(ContentType::Summary);
        let reference = slot(ContentType::Reference);
        let attachment = slot(ContentType::Attachment);

        if HEADING_RE.is_match(line) {
            chars.headings += 1;
            tallies[summary].add(1, HEADING_WEIGHT);
            tallies[summary].structural = true;
        }

        let key_points = KEY_POINT_RE.find_iter(line).count()
            + usize::from(BLOCKQUOTE_RE.is_match(line));
        if key_points > 0 {
            chars.key_points += key_points;
            tallies[summary].add(key_points, KEY_POINT_WEIGHT);
            tallies[summary].structural = true;
        }

        let images = IMAGE_RE.find_iter(line).count();
        let documents = DOCUMENT_LINK_RE.find_iter(line).count();
        if images + documents > 0 {
            chars.images += images;
            chars.document_links += documents;
            tallies[attachment].add(images + documents, ATTACHMENT_LINK_WEIGHT);
            tallies[attachment].structural = true;
        }

        let references =
            REFERENCE_DEF_RE.find_iter(line).count() + usize::from(SEE_ALSO_RE.is_match(line));
        if references > 0 {
            chars.reference_links += references;
            tallies[reference].add(references, REFERENCE_LINK_WEIGHT);
            tallies[reference].structural = true;
        }
    }
}

/// Pick the winner and compute its confidence.
fn decide(tallies: &[Tally; 4], non_empty_lines: usize) -> (ContentType, f64) {
    if non_empty_lines == 0 {
        return (ContentType::RawNote, 1.0);
    }

    let total_weighted: f64 = tallies.iter().map(|t| t.weighted).sum();
    let total_matches: usize = tallies.iter().map(|t| t.matches).sum();
    if total_weighted <= 0.0 {
        return (ContentType::RawNote, 0.5);
    }

    // Strict comparison keeps the earlier category on ties.
    let mut best = 0;
    for index in 1..4 {
        if tallies[index].weighted > tallies[best].weighted {
            best = index;
        }
    }
    let winner = tallies[best];

    let weighted_share = winner.weighted / total_weighted;
    let unweighted_share = if total_matches == 0 {
        0.0
    } else {
        winner.matches as f64 / total_matches as f64
    };
    let density = winner.lines as f64 / non_empty_lines as f64;

    let mut confidence = 0.5 * weighted_share + 0.3 * unweighted_share + 0.2 * density;
    if winner.structural {
        confidence *= 1.2;
    }
    if tallies.iter().filter(|t| t.weighted > 0.0).count() > 1 {
        confidence *= 0.8;
    }

    (ContentType::SCORED[best], confidence.clamp(0.0, 1.0))
}

static DEFAULT_CLASSIFIER: LazyLock<Classifier> = LazyLock::new(Classifier::new);

/// Classify with the default tables.
pub fn classify(span: &str) -> ClassificationResult {
    DEFAULT_CLASSIFIER.classify(span)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_span_is_raw_note_with_full_confidence() {
        let result = classify("");
        assert_eq!(result.content_type, ContentType::RawNote);
        assert_eq!(result.confidence, 1.0);

        let result = classify("  \n\n ");
        assert_eq!(result.content_type, ContentType::RawNote);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn plain_prose_without_signals_is_raw_note() {
        let result = classify("went for a walk, it rained");
        assert_eq!(result.content_type, ContentType::RawNote);
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn summary_heading_and_key_points() {
        let result = classify("# Summary\n\n**TL;DR** we decided to ship.\n> Key decision made.");
        assert_eq!(result.content_type, ContentType::Summary);
        assert!(result.confidence > 0.5, "confidence {}", result.confidence);
    }

    #[test]
    fn fenced_code_is_technical() {
        let result = classify("```rust\nfn main() {\n    println!(\"summary\");\n}\n```");
        assert_eq!(result.content_type, ContentType::Technical);
        assert_eq!(result.characteristics.code_lines, 5);
        let summary = &result.characteristics.scores[0];
        assert_eq!(summary.weighted, 0.0, "summary patterns are not scored inside code");
    }

    #[test]
    fn images_are_attachments() {
        let result = classify("![whiteboard](assets/photo.png)\n![[scan.heic]]");
        assert_eq!(result.content_type, ContentType::Attachment);
        assert!(result.characteristics.scores[3].structural);
    }

    #[test]
    fn links_are_references() {
        let result = classify("See also:\n[1]: https://example.com/paper\n[docs](https://docs.rs)");
        assert_eq!(result.content_type, ContentType::Reference);
    }

    #[test]
    fn ties_follow_enumeration_order() {
        let tallies = [
            Tally { weighted: 2.0, matches: 1, lines: 1, structural: false },
            Tally { weighted: 2.0, matches: 1, lines: 1, structural: false },
            Tally::default(),
            Tally::default(),
        ];
        let (winner, _) = decide(&tallies, 1);
        assert_eq!(winner, ContentType::Summary);
    }

    #[test]
    fn confidence_formula() {
        let tallies = [
            Tally { weighted: 3.0, matches: 1, lines: 1, structural: false },
            Tally::default(),
            Tally::default(),
            Tally::default(),
        ];
        let (_, confidence) = decide(&tallies, 2);
        assert!((confidence - 0.9).abs() < 1e-9);

        let tallies = [
            Tally { weighted: 3.0, matches: 1, lines: 1, structural: true },
            Tally { weighted: 1.0, matches: 1, lines: 1, structural: false },
            Tally::default(),
            Tally::default(),
        ];
        let (_, confidence) = decide(&tallies, 1);
        // (0.5 * 0.75 + 0.3 * 0.5 + 0.2 * 1.0) * 1.2 * 0.8
        assert!((confidence - 0.696).abs() < 1e-9);
    }

    #[test]
    fn confidence_is_bounded() {
        let samples = [
            "# Summary\n> **Summary** overview recap\n> key points",
            "```\ncode\n```",
            "[a](b.pdf) ![c](d.png) https://x.y see also",
            "random",
        ];
        for sample in samples {
            let c = classify(sample).confidence;
            assert!((0.0..=1.0).contains(&c), "{sample}: {c}");
        }
    }

    #[test]
    fn key_point_weight_is_highest() {
        let tables = [SUMMARY_PATTERNS, TECHNICAL_PATTERNS, REFERENCE_PATTERNS, ATTACHMENT_PATTERNS];
        for table in tables {
            for spec in table {
                assert!(spec.weight < KEY_POINT_WEIGHT, "{}", spec.pattern);
            }
        }
        for weight in [CODE_FENCE_WEIGHT, HEADING_WEIGHT, ATTACHMENT_LINK_WEIGHT, REFERENCE_LINK_WEIGHT] {
            assert!(weight < KEY_POINT_WEIGHT);
        }
    }
}
