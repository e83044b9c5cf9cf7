//! Typed entity records for the feed content model.
//!
//! All entities are immutable-until-merged value records: the parser is the
//! only component that creates them from text, and the merge engine is the
//! only component that constructs merged copies. Instants
//! (`latest_activity_ms`, `sort_ms`) are Unix-epoch milliseconds; `timestamp`
//! is a display string and never participates in ordering.

use serde::{Deserialize, Serialize};

use crate::grammar::RANKING_POST_PREFIX;

/// A feed post. Ids beginning with [`RANKING_POST_PREFIX`] denote ranking
/// posts, which merge as a whole batch instead of accumulating per id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Unique within a merged set. Non-ranking ids are never reassigned once
    /// merged in.
    pub id: String,
    pub author: String,
    pub content: String,
    /// Display string only.
    pub timestamp: String,
    /// Bumped whenever a comment attaches to this post.
    pub latest_activity_ms: u64,
}

impl Post {
    pub fn is_ranking(&self) -> bool {
        self.id.starts_with(RANKING_POST_PREFIX)
    }
}

/// A comment or reply, normalized to one shape. The reply/comment distinction
/// is not retained past parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    /// Synthetic, assigned by the parser in scan order.
    pub id: String,
    /// Must reference a post in the merged set; orphans are merge-dropped.
    pub post_id: String,
    pub author: String,
    pub content: String,
    /// Display string only.
    pub timestamp: String,
    /// Ordering instant. Newest-first under each post.
    pub sort_ms: u64,
    /// Child replies in insertion order. Not independently sortable.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<Comment>,
}

/// One trending-topic entry. Member of a single implicit list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotSearchItem {
    pub rank: u32,
    pub title: String,
    /// Opaque heat figure, kept verbatim.
    pub heat: String,
}

/// One entry of a ranking list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingItem {
    pub rank: u32,
    pub name: String,
    pub heat: String,
}

/// A ranking board: a header plus its items in parse order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingList {
    pub title: String,
    pub list_type: String,
    pub items: Vec<RankingItem>,
}

/// Follower counters. At most one instance exists in any set. Only the two
/// fan counters persist through the token grammar; `following` and
/// `post_count` exist for UI consumers and default to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowerStats {
    pub main_fans: String,
    pub alias_fans: String,
    #[serde(default)]
    pub following: u32,
    #[serde(default)]
    pub post_count: u32,
}

/// The full entity set produced by one parse or one merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedSet {
    pub posts: Vec<Post>,
    /// Flat, in insertion order; grouped by `post_id` at serialization time.
    pub comments: Vec<Comment>,
    pub hot_searches: Vec<HotSearchItem>,
    pub ranking_lists: Vec<RankingList>,
    pub follower_stats: Option<FollowerStats>,
}

impl FeedSet {
    /// True when the set holds no entity of any kind. Defines "trivial" for
    /// the orchestrator and the merge-identity law.
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
            && self.comments.is_empty()
            && self.hot_searches.is_empty()
            && self.ranking_lists.is_empty()
            && self.follower_stats.is_none()
    }

    /// Look up a post by id.
    pub fn post(&self, id: &str) -> Option<&Post> {
        self.posts.iter().find(|p| p.id == id)
    }

    /// All comments attached to `post_id`, in stored order.
    pub fn comments_for(&self, post_id: &str) -> Vec<&Comment> {
        self.comments.iter().filter(|c| c.post_id == post_id).collect()
    }

    /// Posts whose id carries the ranking prefix, in stored order.
    pub fn ranking_posts(&self) -> Vec<&Post> {
        self.posts.iter().filter(|p| p.is_ranking()).collect()
    }

    /// Total number of entities of every kind (replies included).
    pub fn entity_count(&self) -> usize {
        fn count_comment(c: &Comment) -> usize {
            1 + c.replies.iter().map(count_comment).sum::<usize>()
        }
        self.posts.len()
            + self.comments.iter().map(count_comment).sum::<usize>()
            + self.hot_searches.len()
            + self.ranking_lists.iter().map(|l| 1 + l.items.len()).sum::<usize>()
            + usize::from(self.follower_stats.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_post(id: &str) -> Post {
        Post {
            id: id.to_string(),
            author: "alice".to_string(),
            content: "hello".to_string(),
            timestamp: "01-01 09:00".to_string(),
            latest_activity_ms: 1_000,
        }
    }

    fn make_comment(post_id: &str, author: &str) -> Comment {
        Comment {
            id: "c-0".to_string(),
            post_id: post_id.to_string(),
            author: author.to_string(),
            content: "hi".to_string(),
            timestamp: "01-01 09:01".to_string(),
            sort_ms: 2_000,
            replies: Vec::new(),
        }
    }

    #[test]
    fn test_empty_set_is_empty() {
        assert!(FeedSet::default().is_empty());
    }

    #[test]
    fn test_set_with_post_not_empty() {
        let set = FeedSet { posts: vec![make_post("p1")], ..FeedSet::default() };
        assert!(!set.is_empty());
    }

    #[test]
    fn test_set_with_only_fans_not_empty() {
        let set = FeedSet {
            follower_stats: Some(FollowerStats {
                main_fans: "10k".to_string(),
                alias_fans: "5".to_string(),
                following: 0,
                post_count: 0,
            }),
            ..FeedSet::default()
        };
        assert!(!set.is_empty());
    }

    #[test]
    fn test_post_lookup_by_id() {
        let set = FeedSet {
            posts: vec![make_post("p1"), make_post("p2")],
            ..FeedSet::default()
        };
        assert!(set.post("p2").is_some());
        assert!(set.post("p3").is_none());
    }

    #[test]
    fn test_is_ranking_prefix() {
        assert!(make_post("rank_weekly").is_ranking());
        assert!(!make_post("p1").is_ranking());
    }

    #[test]
    fn test_comments_for_filters_by_post() {
        let set = FeedSet {
            posts: vec![make_post("p1")],
            comments: vec![
                make_comment("p1", "bob"),
                make_comment("p2", "carol"),
                make_comment("p1", "dave"),
            ],
            ..FeedSet::default()
        };
        let for_p1 = set.comments_for("p1");
        assert_eq!(for_p1.len(), 2);
        assert_eq!(for_p1[0].author, "bob");
        assert_eq!(for_p1[1].author, "dave");
    }

    #[test]
    fn test_ranking_posts_partition() {
        let set = FeedSet {
            posts: vec![make_post("p1"), make_post("rank_a"), make_post("rank_b")],
            ..FeedSet::default()
        };
        assert_eq!(set.ranking_posts().len(), 2);
    }

    #[test]
    fn test_entity_count_includes_nested_replies() {
        let mut parent = make_comment("p1", "bob");
        parent.replies.push(make_comment("p1", "carol"));
        let set = FeedSet {
            posts: vec![make_post("p1")],
            comments: vec![parent],
            ..FeedSet::default()
        };
        // 1 post + 1 comment + 1 reply
        assert_eq!(set.entity_count(), 3);
    }

    #[test]
    fn test_feed_set_serde_round_trip() {
        let set = FeedSet {
            posts: vec![make_post("p1")],
            comments: vec![make_comment("p1", "bob")],
            hot_searches: vec![HotSearchItem {
                rank: 1,
                title: "topicA".to_string(),
                heat: "999".to_string(),
            }],
            ranking_lists: vec![RankingList {
                title: "weekly".to_string(),
                list_type: "songs".to_string(),
                items: vec![RankingItem { rank: 1, name: "x".to_string(), heat: "7".to_string() }],
            }],
            follower_stats: Some(FollowerStats {
                main_fans: "10k".to_string(),
                alias_fans: "3".to_string(),
                following: 12,
                post_count: 4,
            }),
        };
        let json = serde_json::to_string(&set).expect("serialize");
        let back: FeedSet = serde_json::from_str(&json).expect("parse");
        assert_eq!(back, set);
    }
}
