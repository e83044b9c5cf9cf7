//! # Merge Engine
//!
//! Combines a previously persisted entity set with a freshly generated one
//! under per-entity-kind policies:
//!
//! ```text
//! non-ranking posts   accumulate, keyed by id; existing is authoritative
//! ranking posts       whole batch replaced when incoming carries any
//! comments            append unless a fuzzy duplicate; orphans drop (logged)
//! hot searches        replace-on-presence
//! ranking lists       replace-on-presence
//! follower stats      replace-on-presence
//! ```
//!
//! ## Guarantees
//! - Deterministic and side-effect-free: inputs are never mutated, a new set
//!   is returned, and the clock arrives as an explicit `now_ms` argument so
//!   callers (and tests) control it.
//! - `merge(existing, ∅) == existing` structurally.
//! - Non-panicking in any production path.

use tracing::warn;

use crate::model::{Comment, FeedSet, Post};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunables for the merge engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConfig {
    /// Number of leading characters compared by the fuzzy comment-duplicate
    /// test. The heuristic can both under- and over-merge; 20–30 is the
    /// practical range. Default: 20.
    pub dedup_prefix_chars: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        MergeConfig { dedup_prefix_chars: 20 }
    }
}

// ---------------------------------------------------------------------------
// Merge entry point
// ---------------------------------------------------------------------------

/// Merge `incoming` into `existing`, stamping newly accepted entities with
/// `now_ms`. Returns a new set; neither input is modified.
pub fn merge(existing: &FeedSet, incoming: &FeedSet, now_ms: u64, cfg: &MergeConfig) -> FeedSet {
    let mut merged = FeedSet::default();

    merge_posts(existing, incoming, now_ms, &mut merged);
    merge_comments(existing, incoming, now_ms, cfg, &mut merged);

    // Replace-on-presence kinds.
    merged.hot_searches = if incoming.hot_searches.is_empty() {
        existing.hot_searches.clone()
    } else {
        incoming.hot_searches.clone()
    };
    merged.ranking_lists = if incoming.ranking_lists.is_empty() {
        existing.ranking_lists.clone()
    } else {
        incoming.ranking_lists.clone()
    };
    merged.follower_stats = incoming
        .follower_stats
        .clone()
        .or_else(|| existing.follower_stats.clone());

    merged
}

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

fn merge_posts(existing: &FeedSet, incoming: &FeedSet, now_ms: u64, merged: &mut FeedSet) {
    // Ranking posts are a single replaceable batch: any incoming ranking post
    // discards the whole existing batch.
    let replace_rankings = incoming.posts.iter().any(Post::is_ranking);

    for post in &existing.posts {
        if post.is_ranking() && replace_rankings {
            continue;
        }
        merged.posts.push(post.clone());
    }

    for post in &incoming.posts {
        if post.is_ranking() {
            if replace_rankings {
                merged.posts.push(stamp_post(post, now_ms));
            }
            continue;
        }
        // Existing content is authoritative from first parse; an incoming
        // post with a known id never overwrites it.
        if merged.post(&post.id).is_some() {
            continue;
        }
        merged.posts.push(stamp_post(post, now_ms));
    }
}

/// Promote an incoming post into the merged set: the current instant becomes
/// both its display timestamp and its initial activity time.
fn stamp_post(post: &Post, now_ms: u64) -> Post {
    Post {
        id: post.id.clone(),
        author: post.author.clone(),
        content: post.content.clone(),
        timestamp: display_time(now_ms),
        latest_activity_ms: now_ms,
    }
}

// ---------------------------------------------------------------------------
// Comments
// ---------------------------------------------------------------------------

fn merge_comments(
    existing: &FeedSet,
    incoming: &FeedSet,
    now_ms: u64,
    cfg: &MergeConfig,
    merged: &mut FeedSet,
) {
    // Existing comments survive unless this merge removed their post (a
    // ranking-batch replacement can orphan them). A comment that was already
    // orphaned at parse time is kept verbatim so that merging an empty
    // incoming set is a strict identity; it never serializes under any post,
    // and omission is deletion.
    for comment in &existing.comments {
        let orphaned_now =
            existing.post(&comment.post_id).is_some() && merged.post(&comment.post_id).is_none();
        if orphaned_now {
            warn!(
                comment_id = %comment.id,
                post_id = %comment.post_id,
                "dropping comment: target post removed from merged set"
            );
            continue;
        }
        merged.comments.push(comment.clone());
    }

    // Incoming comments may target posts that exist only in `existing`; those
    // still merge in. Orphans are dropped, duplicates skipped.
    let mut accepted: u64 = 0;
    for comment in &incoming.comments {
        if merged.post(&comment.post_id).is_none() {
            warn!(
                author = %comment.author,
                post_id = %comment.post_id,
                "dropping incoming comment: unknown post id"
            );
            continue;
        }
        let duplicate = merged
            .comments
            .iter()
            .filter(|c| c.post_id == comment.post_id)
            .any(|c| is_duplicate(c, comment, cfg.dedup_prefix_chars));
        if duplicate {
            continue;
        }

        // Per-comment step keeps intra-cycle ordering distinct. Generated
        // text lists entities newest first, same as parse order, so later
        // tokens in the batch get earlier instants.
        let stamp_ms = now_ms.saturating_sub(accepted);
        accepted += 1;
        merged.comments.push(Comment {
            id: comment.id.clone(),
            post_id: comment.post_id.clone(),
            author: comment.author.clone(),
            content: comment.content.clone(),
            timestamp: display_time(stamp_ms),
            sort_ms: stamp_ms,
            replies: comment.replies.clone(),
        });

        // A fresh comment makes the conversation the most recently active.
        if let Some(post) = merged.posts.iter_mut().find(|p| p.id == comment.post_id) {
            post.latest_activity_ms = post.latest_activity_ms.max(stamp_ms);
        }
    }
}

/// Fuzzy duplicate test: same author AND a content-prefix match in either
/// direction (the first `prefix_chars` characters of one appear as a
/// substring of the other).
fn is_duplicate(a: &Comment, b: &Comment, prefix_chars: usize) -> bool {
    if a.author != b.author {
        return false;
    }
    let a_prefix: String = a.content.chars().take(prefix_chars).collect();
    let b_prefix: String = b.content.chars().take(prefix_chars).collect();
    b.content.contains(&a_prefix) || a.content.contains(&b_prefix)
}

// ---------------------------------------------------------------------------
// Timestamp display
// ---------------------------------------------------------------------------

/// Render an epoch-ms instant as the feed's display string (`MM-DD HH:MM`).
pub fn display_time(ms: u64) -> String {
    use chrono::TimeZone;
    chrono::Utc
        .timestamp_millis_opt(ms as i64)
        .single()
        .map(|dt| dt.format("%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
