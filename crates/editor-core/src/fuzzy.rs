//! Case-insensitive subsequence scoring for palette titles.

const MATCH: i64 = 16;
const PREFIX_BONUS: i64 = 32;
const WORD_START_BONUS: i64 = 24;
const CONSECUTIVE_BONUS: i64 = 24;
const GAP_PENALTY: i64 = 3;
const LEADING_PENALTY: i64 = 2;
const LENGTH_PENALTY: i64 = 1;

/// Scores at or below this are discarded.
pub const MIN_SCORE: i64 = 0;

fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

fn is_word_start(hay: &[char], ix: usize) -> bool {
    if ix == 0 {
        return true;
    }
    let prev = hay[ix - 1];
    !prev.is_alphanumeric() || (prev.is_lowercase() && hay[ix].is_uppercase())
}

/// Scores `candidate` against `query`, or `None` when the query characters
/// do not all appear in order. Whitespace in the query is ignored.
pub fn score(query: &str, candidate: &str) -> Option<i64> {
    let needle: Vec<char> = query
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(fold)
        .collect();
    let hay: Vec<char> = candidate.chars().collect();
    if needle.is_empty() {
        return Some(MIN_SCORE);
    }

    (0..hay.len())
        .filter(|&start| fold(hay[start]) == needle[0])
        .filter_map(|start| score_from(&needle, &hay, start))
        .max()
}

fn score_from(needle: &[char], hay: &[char], start: usize) -> Option<i64> {
    let mut total = MATCH - LEADING_PENALTY * start as i64;
    total += if start == 0 {
        PREFIX_BONUS
    } else if is_word_start(hay, start) {
        WORD_START_BONUS
    } else {
        0
    };

    let mut prev = start;
    for &wanted in &needle[1..] {
        let ix = (prev + 1..hay.len()).find(|&ix| fold(hay[ix]) == wanted)?;
        total += MATCH;
        if ix == prev + 1 {
            total += CONSECUTIVE_BONUS;
        } else {
            total -= GAP_PENALTY * (ix - prev - 1) as i64;
            if is_word_start(hay, ix) {
                total += WORD_START_BONUS;
            }
        }
        prev = ix;
    }

    total -= LENGTH_PENALTY * hay.len().saturating_sub(needle.len()) as i64;
    Some(total)
}

/// Items whose key scores above [`MIN_SCORE`], best first. Equal scores keep
/// their input order. An empty query keeps everything.
pub fn filter<T: Clone>(query: &str, items: &[T], key: impl Fn(&T) -> &str) -> Vec<T> {
    if query.trim().is_empty() {
        return items.to_vec();
    }
    let mut scored: Vec<(i64, &T)> = items
        .iter()
        .filter_map(|item| score(query, key(item)).map(|s| (s, item)))
        .filter(|(s, _)| *s > MIN_SCORE)
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().map(|(_, item)| item.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_subsequences() {
        assert_eq!(score("head", "Bullet List"), None);
        assert_eq!(score("xyz", "Heading 1"), None);
    }

    #[test]
    fn prefix_and_consecutive_runs_beat_scattered_matches() {
        let prefix = score("head", "Heading 1").unwrap();
        let scattered = score("hd", "Heading 1").unwrap();
        assert!(prefix > scattered);
        assert!(score("list", "Bullet List").unwrap() > score("lst", "Bullet List").unwrap());
    }

    #[test]
    fn is_case_insensitive_and_ignores_query_whitespace() {
        assert_eq!(score("HEAD", "heading 1"), score("head", "Heading 1"));
        assert_eq!(score("bul list", "Bullet List"), score("bullist", "Bullet List"));
    }

    #[test]
    fn filter_orders_by_score_and_keeps_ties_in_order() {
        let items = ["Heading 1", "Heading 2", "Bullet List"];
        let hits = filter("head", &items, |s| *s);
        assert_eq!(hits, ["Heading 1", "Heading 2"]);
        assert_eq!(filter("", &items, |s| *s), items);
    }
}
