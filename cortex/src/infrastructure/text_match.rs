// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Token-overlap scoring shared by the in-process stores.

use std::collections::HashSet;

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(str::to_lowercase)
        .collect()
}

/// Fraction of query tokens present in `text`, in `[0, 1]`.
pub fn overlap_score(query: &str, text: &str) -> f32 {
    let query_tokens = tokens(query);
    if query_tokens.is_empty() {
        return 0.0;
    }
    let text_tokens = tokens(text);
    let hits = query_tokens.iter().filter(|t| text_tokens.contains(*t)).count();
    hits as f32 / query_tokens.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap_score() {
        assert_eq!(overlap_score("hook opening", "Open with a strong hook"), 0.5);
        assert_eq!(overlap_score("hook", "HOOK first"), 1.0);
        assert_eq!(overlap_score("", "anything"), 0.0);
        assert_eq!(overlap_score("cta", "no match here"), 0.0);
    }
}
