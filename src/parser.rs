//! Tolerant parser: raw text in, typed [`FeedSet`] out.
//!
//! ## Guarantees
//! - Never fails: any substring that does not match a token pattern is simply
//!   not extracted. Wrong field arity, unknown tags and unparseable ranks are
//!   skipped silently.
//! - Deterministic: repeated parses of the same text produce identical sets,
//!   including the synthetic ordering timestamps.
//! - Order-preserving: tokens are visited strictly left to right, which the
//!   `RANKITEM` attachment rule depends on.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::grammar::{
    self, COMMENT_TS_BASE, POST_TS_BASE, SYNTH_TS_STEP, TAG_COMMENT, TAG_FANS, TAG_HOT,
    TAG_POST, TAG_RANKITEM, TAG_RANKLIST, TAG_REPLY,
};
use crate::model::{Comment, FeedSet, FollowerStats, HotSearchItem, Post, RankingItem, RankingList};

/// Matches one bracketed token: an uppercase tag followed by `|`-delimited
/// fields, none of which may contain `[`, `]` or a nested token.
static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([A-Z]+)\|([^\[\]]*)\]").expect("token pattern compiles"));

/// Parse `text` into a typed entity set.
///
/// Previously persisted blocks carry no real per-token instants, so each
/// entity kind gets synthetic timestamps assigned in token-scan order (fixed
/// base per kind, fixed step per token), strictly decreasing: persisted
/// blocks list entities newest first, so an earlier token is the more recent
/// one. Relative ordering among previously persisted entities is therefore
/// stable across repeated parses and across parse/serialize round trips.
pub fn parse(text: &str) -> FeedSet {
    let mut set = FeedSet::default();
    let mut post_seq: u64 = 0;
    let mut comment_seq: u64 = 0;
    // Single mutable cursor: RANKITEM tokens attach to whichever RANKLIST
    // header was most recently opened. There is no list identity in the
    // grammar to key on.
    let mut current_list: Option<usize> = None;

    for caps in TOKEN_RE.captures_iter(text) {
        let tag = &caps[1];
        let fields: Vec<&str> = caps[2].split('|').collect();
        let Some(arity) = grammar::field_arity(tag) else {
            continue; // unknown tag
        };
        if fields.len() != arity {
            continue; // wrong shape, tolerated
        }

        match tag {
            TAG_POST => {
                let ts = POST_TS_BASE - post_seq * SYNTH_TS_STEP;
                post_seq += 1;
                set.posts.push(Post {
                    author: fields[0].to_string(),
                    id: fields[1].to_string(),
                    content: fields[2].to_string(),
                    timestamp: String::new(),
                    latest_activity_ms: ts,
                });
            }
            // REPLY carries the same field layout as COMMENT; the semantic
            // distinction is not retained past parsing.
            TAG_COMMENT | TAG_REPLY => {
                let ts = COMMENT_TS_BASE - comment_seq * SYNTH_TS_STEP;
                let id = format!("c-{comment_seq}");
                comment_seq += 1;
                set.comments.push(Comment {
                    id,
                    author: fields[0].to_string(),
                    post_id: fields[1].to_string(),
                    content: fields[2].to_string(),
                    timestamp: String::new(),
                    sort_ms: ts,
                    replies: Vec::new(),
                });
            }
            TAG_HOT => {
                let Ok(rank) = fields[0].trim().parse::<u32>() else {
                    continue;
                };
                set.hot_searches.push(HotSearchItem {
                    rank,
                    title: fields[1].to_string(),
                    heat: fields[2].to_string(),
                });
            }
            TAG_RANKLIST => {
                set.ranking_lists.push(RankingList {
                    title: fields[0].to_string(),
                    list_type: fields[1].to_string(),
                    items: Vec::new(),
                });
                current_list = Some(set.ranking_lists.len() - 1);
            }
            TAG_RANKITEM => {
                let Ok(rank) = fields[0].trim().parse::<u32>() else {
                    continue;
                };
                // Items before any header have nowhere to attach.
                if let Some(idx) = current_list {
                    set.ranking_lists[idx].items.push(RankingItem {
                        rank,
                        name: fields[1].to_string(),
                        heat: fields[2].to_string(),
                    });
                }
            }
            TAG_FANS => {
                // Only the first match in the text is kept.
                if set.follower_stats.is_none() {
                    set.follower_stats = Some(FollowerStats {
                        main_fans: fields[0].to_string(),
                        alias_fans: fields[1].to_string(),
                        following: 0,
                        post_count: 0,
                    });
                }
            }
            _ => unreachable!("arity table and match arms cover the same tags"),
        }
    }

    set
}
