//! Maps free-text or URL-derived names onto a canonical candidate.
//!
//! Matching runs on normalized strings (see [`normalize`]). An exact normalized match always wins;
//! otherwise the best similarity score is accepted when it clears the [`MatchPolicy`] threshold.
//! An unresolved name is not an error: callers fall back to [`ResolvedName::display_name`].

use serde::Serialize;

const KNOWN_SUFFIXES: [&str; 1] = [".csv"];
const MIN_TOKEN_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchPolicy {
    pub name: &'static str,
    pub threshold: f64,
}

impl MatchPolicy {
    /// Theme names coming from rank rows or links.
    pub const LOOSE_DISPLAY_NAME: MatchPolicy = MatchPolicy {
        name: "loose_display_name",
        threshold: 0.70,
    };

    /// Dataset file stems.
    pub const STRICT_FILENAME: MatchPolicy = MatchPolicy {
        name: "strict_filename",
        threshold: 0.80,
    };

    pub fn with_threshold(self, threshold: f64) -> anyhow::Result<Self> {
        anyhow::ensure!(
            (0.0..=1.0).contains(&threshold),
            "match threshold for {} must be between 0 and 1 (got {threshold})",
            self.name
        );
        Ok(Self { threshold, ..self })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchConfidence {
    Exact,
    Fuzzy,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedName {
    pub query: String,
    pub canonical: Option<String>,
    pub confidence: MatchConfidence,
    pub score: f64,
}

impl ResolvedName {
    pub fn unresolved(query: &str) -> Self {
        Self {
            query: query.to_string(),
            canonical: None,
            confidence: MatchConfidence::None,
            score: 0.0,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.canonical.is_some()
    }

    /// Canonical name when resolved, otherwise the title-cased raw input.
    pub fn display_name(&self) -> String {
        match &self.canonical {
            Some(c) => c.clone(),
            None => title_case(&self.query),
        }
    }
}

pub fn normalize(s: &str) -> String {
    let mut s = s.trim().to_lowercase();
    for suffix in KNOWN_SUFFIXES {
        if let Some(stripped) = s.strip_suffix(suffix) {
            s = stripped.to_string();
        }
    }

    let cleaned: String = s
        .chars()
        .map(|c| if c == '_' || c == '-' { ' ' } else { c })
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn title_case(raw: &str) -> String {
    normalize(raw)
        .split(' ')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Best candidate for `query` under `policy`. Ties keep the first candidate encountered.
pub fn resolve<'a, I>(query: &str, candidates: I, policy: MatchPolicy) -> ResolvedName
where
    I: IntoIterator<Item = &'a str>,
{
    let q = normalize(query);
    if q.is_empty() {
        return ResolvedName::unresolved(query);
    }

    let mut best: Option<(&'a str, f64)> = None;
    for candidate in candidates {
        let c = normalize(candidate);
        if c == q {
            return ResolvedName {
                query: query.to_string(),
                canonical: Some(candidate.to_string()),
                confidence: MatchConfidence::Exact,
                score: 1.0,
            };
        }

        let score = similarity(&q, &c);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((candidate, score));
        }
    }

    match best {
        Some((candidate, score)) if score >= policy.threshold => ResolvedName {
            query: query.to_string(),
            canonical: Some(candidate.to_string()),
            confidence: MatchConfidence::Fuzzy,
            score,
        },
        _ => ResolvedName::unresolved(query),
    }
}

/// Word-overlap heuristic for raw file listings: every query token of at least three characters
/// must be contained in, or contain, some candidate token of at least three characters.
pub fn tokens_overlap(query: &str, candidate: &str) -> bool {
    let q = normalize(query);
    let c = normalize(candidate);
    let query_tokens: Vec<&str> = q.split(' ').filter(|t| t.len() >= MIN_TOKEN_LEN).collect();
    if query_tokens.is_empty() {
        return false;
    }
    let candidate_tokens: Vec<&str> = c.split(' ').filter(|t| t.len() >= MIN_TOKEN_LEN).collect();

    query_tokens.iter().all(|qt| {
        candidate_tokens
            .iter()
            .any(|ct| ct.contains(qt) || qt.contains(ct))
    })
}

/// First candidate passing [`tokens_overlap`].
pub fn find_by_tokens<'a, I>(query: &str, candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    candidates.into_iter().find(|c| tokens_overlap(query, c))
}

/// Ratcliff/Obershelp similarity in `[0, 1]`: twice the matched character count over the
/// combined length.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matched = matched_chars(&a, &b);
    2.0 * matched as f64 / total as f64
}

fn matched_chars(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut stack = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = stack.pop() {
        let (i, j, k) = longest_match(a, b, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            stack.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            stack.push((i + k, ahi, j + k, bhi));
        }
    }
    matched
}

// Longest common block in a[alo..ahi] x b[blo..bhi]; earliest in `a`, then in `b`, on ties.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_k) = (alo, blo, 0);
    let width = bhi - blo;
    let mut prev = vec![0usize; width + 1];
    let mut cur = vec![0usize; width + 1];

    for i in alo..ahi {
        for j in blo..bhi {
            let col = j - blo + 1;
            if a[i] == b[j] {
                let k = prev[col - 1] + 1;
                cur[col] = k;
                if k > best_k {
                    best_i = i + 1 - k;
                    best_j = j + 1 - k;
                    best_k = k;
                }
            } else {
                cur[col] = 0;
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    (best_i, best_j, best_k)
}
