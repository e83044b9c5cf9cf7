//! Token grammar for the persisted feed markup.
//!
//! Every entity is written as a bracketed, pipe-delimited tuple:
//!
//! ```text
//! [POST|author|id|content]
//! [COMMENT|author|postId|content]
//! [REPLY|author|postId|content]
//! [HOT|rank|title|heat]
//! [RANKLIST|title|type]
//! [RANKITEM|rank|name|heat]
//! [FANS|mainFans|aliasFans]
//! ```
//!
//! Fields are plain text and must not contain `|` or `]`. This module is the
//! shared contract between the parser and the serializer; it defines no
//! runtime behavior beyond field sanitization.

/// Tag for a feed post token.
pub const TAG_POST: &str = "POST";
/// Tag for a comment token.
pub const TAG_COMMENT: &str = "COMMENT";
/// Tag for a reply token. Parses into the same shape as [`TAG_COMMENT`].
pub const TAG_REPLY: &str = "REPLY";
/// Tag for a trending-topic ("hot search") item.
pub const TAG_HOT: &str = "HOT";
/// Tag for a ranking-list header.
pub const TAG_RANKLIST: &str = "RANKLIST";
/// Tag for a ranking-list item. Attaches to the most recently opened header.
pub const TAG_RANKITEM: &str = "RANKITEM";
/// Tag for the follower-counter singleton.
pub const TAG_FANS: &str = "FANS";

/// Number of `|`-separated fields after the tag, per tag.
pub fn field_arity(tag: &str) -> Option<usize> {
    match tag {
        TAG_POST | TAG_COMMENT | TAG_REPLY | TAG_HOT | TAG_RANKITEM => Some(3),
        TAG_RANKLIST | TAG_FANS => Some(2),
        _ => None,
    }
}

/// Post ids carrying this prefix denote "ranking posts", which merge as a
/// single replaceable batch instead of accumulating per id.
pub const RANKING_POST_PREFIX: &str = "rank_";

/// Opening sentinel of the managed block inside the floor message.
/// Must be matched byte-exactly.
pub const BLOCK_START: &str = "<!-- BLOCK_START -->";
/// Closing sentinel of the managed block.
pub const BLOCK_END: &str = "<!-- BLOCK_END -->";
/// Fixed decoration line emitted at the top of every managed block.
pub const BLOCK_HEADER: &str = "<!-- feed data: do not edit by hand -->";

// Synthetic timestamp bases, one per entity kind. Previously persisted text
// carries no real per-token instants, so the parser assigns strictly
// decreasing values from these bases in token-scan order: canonical blocks
// list entities newest first, so an earlier token is the more recent one.
// Repeated parses of the same text reproduce the same relative ordering, and
// a parse/serialize round trip preserves it.
pub const POST_TS_BASE: u64 = 1_000_000_000;
pub const COMMENT_TS_BASE: u64 = 2_000_000_000;
/// Milliseconds between consecutive tokens of one kind within a single parse.
pub const SYNTH_TS_STEP: u64 = 1_000;

/// Strip the grammar's structural characters from a field value so an emitted
/// token can always be re-parsed. Newlines collapse to spaces for the same
/// reason: a token occupies exactly one line.
pub fn sanitize_field(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '|' | '[' | ']' => ' ',
            '\n' | '\r' => ' ',
            other => other,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Render one token from a tag and its fields, sanitizing every field.
pub fn render_token(tag: &str, fields: &[&str]) -> String {
    let mut out = String::with_capacity(16 + fields.iter().map(|f| f.len() + 1).sum::<usize>());
    out.push('[');
    out.push_str(tag);
    for field in fields {
        out.push('|');
        out.push_str(&sanitize_field(field));
    }
    out.push(']');
    out
}
