// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Writing-domain synonym expansion.
//!
//! Short queries like "hook" or "cta" rarely share words with the stored
//! memory text. Appending a few related terms widens recall without an
//! external call.

use std::collections::HashMap;
use std::sync::OnceLock;

fn synonym_map() -> &'static HashMap<&'static str, &'static [&'static str]> {
    static MAP: OnceLock<HashMap<&'static str, &'static [&'static str]>> = OnceLock::new();
    MAP.get_or_init(|| {
        let mut m: HashMap<&'static str, &'static [&'static str]> = HashMap::new();
        m.insert("hook", &["opening", "lede", "intro"]);
        m.insert("intro", &["opening", "hook", "lede"]);
        m.insert("opening", &["hook", "intro"]);
        m.insert("cta", &["call-to-action", "ask", "conversion"]);
        m.insert("headline", &["title", "subject", "heading"]);
        m.insert("title", &["headline", "heading"]);
        m.insert("subject", &["headline", "subject-line"]);
        m.insert("tone", &["voice", "style", "register"]);
        m.insert("voice", &["tone", "style"]);
        m.insert("structure", &["outline", "format", "flow"]);
        m.insert("ending", &["conclusion", "closer", "outro"]);
        m.insert("conclusion", &["ending", "closer"]);
        m.insert("story", &["anecdote", "narrative", "example"]);
        m.insert("engagement", &["replies", "comments", "shares"]);
        m.insert("thread", &["tweetstorm", "series"]);
        m.insert("newsletter", &["issue", "email", "digest"]);
        m.insert("audience", &["readers", "subscribers"]);
        m.insert("length", &["word-count", "brevity"]);
        m
    })
}

/// Append up to `max_per_token` synonyms for each known token that are not
/// already in the query. Token matching ignores case; the query itself is
/// returned unchanged when nothing matches.
pub fn expand_query(query: &str, max_per_token: usize) -> String {
    if max_per_token == 0 {
        return query.to_string();
    }

    let map = synonym_map();
    let words: Vec<String> = query
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '-').to_lowercase())
        .filter(|w| !w.is_empty())
        .collect();
    let mut expansions: Vec<&str> = Vec::new();

    for word in &words {
        let Some(synonyms) = map.get(word.as_str()) else {
            continue;
        };
        let fresh = synonyms
            .iter()
            .filter(|syn| !words.iter().any(|w| w == *syn) && !expansions.contains(syn))
            .take(max_per_token)
            .copied()
            .collect::<Vec<_>>();
        expansions.extend(fresh);
    }

    if expansions.is_empty() {
        return query.to_string();
    }
    format!("{} {}", query, expansions.join(" "))
}
