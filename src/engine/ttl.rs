use chrono::{DateTime, Utc};

/// Decide whether a channel's cached entries are due for a refresh.
///
/// A missing TTL or a channel that was never refreshed is always stale.
/// Otherwise the channel is stale once more than `ttl` whole seconds have
/// elapsed; an elapsed time equal to `ttl` still counts as fresh.
pub fn is_stale(ttl: Option<u32>, last_refresh: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    let (Some(ttl), Some(last_refresh)) = (ttl, last_refresh) else {
        return true;
    };

    let elapsed = now.signed_duration_since(last_refresh).num_seconds();
    elapsed > i64::from(ttl)
}
