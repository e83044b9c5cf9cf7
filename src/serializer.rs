//! Renders a merged entity set back into canonical markup text.
//!
//! Output is deterministic given the same set contents and activity
//! timestamps, one token per line:
//!
//! 1. Hot-search items, ascending by rank.
//! 2. Ranking lists in stored order, each header followed by its items.
//! 3. All posts (ranking and non-ranking pooled), most recently active first.
//! 4. Under each post, comments newest-first, each followed by its replies in
//!    insertion order.
//! 5. Follower stats, last, at most one line.
//!
//! Comments whose post id matches no post in the set are not emitted;
//! omission is deletion.

use crate::grammar::{
    render_token, TAG_COMMENT, TAG_FANS, TAG_HOT, TAG_POST, TAG_RANKITEM, TAG_RANKLIST, TAG_REPLY,
};
use crate::model::{Comment, FeedSet};

/// Serialize `set` into the bracket markup.
pub fn serialize(set: &FeedSet) -> String {
    let mut lines: Vec<String> = Vec::with_capacity(set.entity_count());

    // 1. Hot searches, ascending rank. Stable: equal ranks keep stored order.
    let mut hot: Vec<_> = set.hot_searches.iter().collect();
    hot.sort_by_key(|h| h.rank);
    for item in hot {
        lines.push(render_token(
            TAG_HOT,
            &[&item.rank.to_string(), &item.title, &item.heat],
        ));
    }

    // 2. Ranking lists in stored order.
    for list in &set.ranking_lists {
        lines.push(render_token(TAG_RANKLIST, &[&list.title, &list.list_type]));
        for item in &list.items {
            lines.push(render_token(
                TAG_RANKITEM,
                &[&item.rank.to_string(), &item.name, &item.heat],
            ));
        }
    }

    // 3. Posts pooled, most recently active conversation first. Stable sort:
    //    stored order breaks activity ties.
    let mut posts: Vec<_> = set.posts.iter().collect();
    posts.sort_by_key(|p| std::cmp::Reverse(p.latest_activity_ms));
    for post in posts {
        lines.push(render_token(TAG_POST, &[&post.author, &post.id, &post.content]));

        // 4. Comments newest-first, replies trailing their parent.
        let mut comments: Vec<_> = set.comments_for(&post.id);
        comments.sort_by_key(|c| std::cmp::Reverse(c.sort_ms));
        for comment in comments {
            lines.push(render_token(
                TAG_COMMENT,
                &[&comment.author, &comment.post_id, &comment.content],
            ));
            emit_replies(comment, &mut lines);
        }
    }

    // 5. Follower stats, rendered last.
    if let Some(stats) = &set.follower_stats {
        lines.push(render_token(TAG_FANS, &[&stats.main_fans, &stats.alias_fans]));
    }

    lines.join("\n")
}

/// Replies keep their original insertion order, depth-first.
fn emit_replies(comment: &Comment, lines: &mut Vec<String>) {
    for reply in &comment.replies {
        lines.push(render_token(
            TAG_REPLY,
            &[&reply.author, &reply.post_id, &reply.content],
        ));
        emit_replies(reply, lines);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::{merge, MergeConfig};
    use crate::parser::parse;

    #[test]
    fn test_serialize_empty_set_is_empty_string() {
        assert_eq!(serialize(&FeedSet::default()), "");
    }

    #[test]
    fn test_hot_items_sorted_ascending_by_rank() {
        let set = parse("[HOT|3|c|1][HOT|1|a|3][HOT|2|b|2]");
        let out = serialize(&set);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "[HOT|1|a|3]");
        assert_eq!(lines[1], "[HOT|2|b|2]");
        assert_eq!(lines[2], "[HOT|3|c|1]");
    }

    #[test]
    fn test_ranklist_header_immediately_followed_by_items() {
        let set = parse("[RANKLIST|weekly|songs][RANKITEM|1|a|9][RANKITEM|2|b|8]");
        let out = serialize(&set);
        assert_eq!(
            out,
            "[RANKLIST|weekly|songs]\n[RANKITEM|1|a|9]\n[RANKITEM|2|b|8]"
        );
    }

    #[test]
    fn test_posts_ordered_by_descending_activity() {
        let mut set = parse("[POST|a|p1|first][POST|b|p2|second]");
        // p1 parsed first so it has the lower synthetic activity time.
        set.posts[0].latest_activity_ms = 100;
        set.posts[1].latest_activity_ms = 200;
        let out = serialize(&set);
        let p1_pos = out.find("p1|first").expect("p1");
        let p2_pos = out.find("p2|second").expect("p2");
        assert!(p2_pos < p1_pos, "more recently active post must come first");
    }

    #[test]
    fn test_comments_under_post_newest_first() {
        let mut set = parse("[POST|a|p1|hello][COMMENT|b|p1|older note][COMMENT|c|p1|newer note]");
        set.comments[0].sort_ms = 100;
        set.comments[1].sort_ms = 200;
        let out = serialize(&set);
        let newer = out.find("newer note").expect("newer");
        let older = out.find("older note").expect("older");
        assert!(newer < older);
    }

    #[test]
    fn test_replies_trail_their_parent_in_insertion_order() {
        let mut set = parse("[POST|a|p1|hello][COMMENT|b|p1|question]");
        set.comments[0].replies = vec![
            crate::model::Comment {
                id: "r-1".to_string(),
                post_id: "p1".to_string(),
                author: "c".to_string(),
                content: "first reply".to_string(),
                timestamp: String::new(),
                sort_ms: 999,
                replies: Vec::new(),
            },
            crate::model::Comment {
                id: "r-2".to_string(),
                post_id: "p1".to_string(),
                author: "d".to_string(),
                content: "second reply".to_string(),
                timestamp: String::new(),
                sort_ms: 1,
                replies: Vec::new(),
            },
        ];
        let out = serialize(&set);
        let parent = out.find("question").expect("parent");
        let r1 = out.find("first reply").expect("r1");
        let r2 = out.find("second reply").expect("r2");
        // Insertion order, not sort_ms order.
        assert!(parent < r1 && r1 < r2);
    }

    #[test]
    fn test_fans_rendered_last() {
        let set = parse("[FANS|100|2][POST|a|p1|x][HOT|1|t|9]");
        let out = serialize(&set);
        let last = out.lines().last().expect("non-empty");
        assert_eq!(last, "[FANS|100|2]");
    }

    #[test]
    fn test_orphan_comment_not_emitted() {
        let set = parse("[POST|a|p1|x][COMMENT|b|ghost|stray]");
        let out = serialize(&set);
        assert!(!out.contains("stray"));
    }

    #[test]
    fn test_structural_chars_in_content_sanitized() {
        let mut set = parse("[POST|a|p1|x]");
        set.posts[0].content = "with|pipe and ]bracket".to_string();
        let out = serialize(&set);
        // The emitted line must itself be a valid token.
        let back = parse(&out);
        assert_eq!(back.posts.len(), 1);
        assert_eq!(back.posts[0].content, "with pipe and  bracket");
    }

    // -- round-trip law --

    #[test]
    fn test_round_trip_preserves_identities_and_order() {
        let text = "\
[HOT|1|topicA|999]\n\
[HOT|2|topicB|450]\n\
[RANKLIST|weekly|songs]\n\
[RANKITEM|1|song a|500]\n\
[POST|alice|p1|first post]\n\
[COMMENT|bob|p1|nice]\n\
[POST|rank_bot|rank_1|roundup]\n\
[FANS|12000|4]";
        let original = parse(text);
        let round = parse(&serialize(&original));

        let ids: Vec<&str> = original.posts.iter().map(|p| p.id.as_str()).collect();
        let round_ids: Vec<&str> = round.posts.iter().map(|p| p.id.as_str()).collect();
        // Parse order equals serialized order; the parser re-synthesizes
        // timestamps but relative ordering survives.
        assert_eq!(ids, round_ids);
        assert_eq!(round.comments.len(), original.comments.len());
        assert_eq!(round.hot_searches, original.hot_searches);
        assert_eq!(round.ranking_lists, original.ranking_lists);
        assert_eq!(round.follower_stats, original.follower_stats);
    }

    #[test]
    fn test_round_trip_after_merge() {
        let existing = parse("[POST|A|1|hello][HOT|1|old|1]");
        let incoming = parse("[COMMENT|B|1|hi there][HOT|1|new|2]");
        let merged = merge(&existing, &incoming, 1_700_000_000_000, &MergeConfig::default());
        let round = parse(&serialize(&merged));
        assert_eq!(round.posts.len(), 1);
        assert_eq!(round.comments_for("1").len(), 1);
        assert_eq!(round.hot_searches[0].title, "new");
    }

    #[test]
    fn test_serialize_is_deterministic() {
        let set = parse("[POST|a|p1|x][POST|b|p2|y][COMMENT|c|p1|z][HOT|2|t|1][HOT|1|u|2]");
        assert_eq!(serialize(&set), serialize(&set));
    }
}
