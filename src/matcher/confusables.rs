use std::collections::BTreeSet;

/// Character pairs OCR swaps in both directions.
const SYMMETRIC_PAIRS: &[(&str, &str)] = &[
    ("0", "O"),
    ("1", "I"),
    ("5", "S"),
    ("8", "B"),
    ("6", "9"),
    ("6", "G"),
    ("D", "B"),
    ("Q", "O"),
    ("Z", "2"),
];

/// Multi-character misreads observed on label scans. One-way only.
const FRAGMENTS: &[(&str, &str)] = &[
    ("9HB", "6H"),
    ("9H", "6H"),
    ("9B", "6"),
    ("5KWDS", "8KWD"),
];

pub const DEFAULT_MAX_VARIANTS: usize = 256;

/// Generates corrected spellings of an OCR string, one substitution rule at a time.
#[derive(Debug, Clone)]
pub struct Confusables {
    rules: Vec<(&'static str, &'static str)>,
    max_variants: usize,
}

impl Default for Confusables {
    fn default() -> Self {
        Self::with_limit(DEFAULT_MAX_VARIANTS)
    }
}

impl Confusables {
    pub fn with_limit(max_variants: usize) -> Self {
        let mut rules = FRAGMENTS.to_vec();
        for &(left, right) in SYMMETRIC_PAIRS {
            rules.push((left, right));
            rules.push((right, left));
        }

        Self {
            rules,
            max_variants,
        }
    }

    /// Every variant reachable by applying one rule, either at a single
    /// occurrence or across the whole string. The input itself is never included.
    pub fn candidates(&self, input: &str) -> BTreeSet<String> {
        let mut variants = BTreeSet::new();

        for &(wrong, right) in &self.rules {
            if !input.contains(wrong) {
                continue;
            }

            for (offset, _) in input.match_indices(wrong) {
                if variants.len() >= self.max_variants {
                    return variants;
                }
                let mut variant = String::with_capacity(input.len() + right.len());
                variant.push_str(&input[..offset]);
                variant.push_str(right);
                variant.push_str(&input[offset + wrong.len()..]);
                variants.insert(variant);
            }

            if variants.len() >= self.max_variants {
                return variants;
            }
            variants.insert(input.replace(wrong, right));
        }

        variants.remove(input);
        variants
    }

    pub fn corrects_to(&self, candidate: &str, reference: &str) -> bool {
        self.candidates(candidate).contains(reference)
    }
}
