use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use sea_orm::sea_query::{Expr, ExprTrait, Func};
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter};

use crate::entity::prelude::*;
use crate::ids::UserId;

static MENTION_RE: OnceLock<Regex> = OnceLock::new();

// `@` followed by letters, digits, underscore, hyphen, dot
fn mention_re() -> &'static Regex {
    MENTION_RE.get_or_init(|| Regex::new(r"@([A-Za-z0-9_.\-]+)").expect("valid regex"))
}

/// Candidate mention tokens in `text`, leading `@` stripped, deduplicated
/// case-insensitively. The first spelling seen is the one kept.
pub fn extract_mentions(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut tokens = Vec::new();

    for caps in mention_re().captures_iter(text) {
        let token = &caps[1];
        if seen.insert(token.to_lowercase()) {
            tokens.push(token.to_string());
        }
    }

    tokens
}

/// Resolve tokens against the user directory with a case-insensitive exact
/// match on username. Tokens matching nobody are silently dropped; usernames
/// are display names, so one token may resolve to several users.
pub async fn resolve<C>(conn: &C, tokens: &[String]) -> Result<HashSet<UserId>, DbErr>
where
    C: ConnectionTrait,
{
    if tokens.is_empty() {
        return Ok(HashSet::new());
    }

    let lowered: Vec<String> = tokens.iter().map(|t| t.to_lowercase()).collect();

    let users = DirectoryUser::find()
        .filter(
            Expr::expr(Func::lower(Expr::col(DirectoryUserColumn::Username))).is_in(lowered),
        )
        .all(conn)
        .await?;

    Ok(users.into_iter().map(|u| u.id).collect())
}
