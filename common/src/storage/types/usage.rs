use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};
use chrono::Timelike;

stored_object!(UsageCounter, "usage_counter", {
    tenant_id: String,
    user_id: String,
    kind: String,
    window_start: String,
    count: i64
});

impl UsageCounter {
    /// One counter per `(tenant, user, kind, hour window)`.
    fn key(tenant_id: &str, user_id: &str, kind: &str, window_start: &str) -> String {
        format!("{tenant_id}:{user_id}:{kind}:{window_start}")
    }

    fn current_window() -> String {
        let now = Utc::now();
        format!("{}", now.format("%Y-%m-%dT%H:00:00Z"))
    }

    /// Increment the caller's counter for this hour and return the new
    /// total; callers compare against their own limits.
    pub async fn increment(
        db: &SurrealDbClient,
        tenant_id: &str,
        user_id: &str,
        kind: &str,
    ) -> Result<i64, AppError> {
        let window_start = Self::current_window();
        let id = Self::key(tenant_id, user_id, kind, &window_start);

        let updated: Option<Self> = db
            .client
            .query(
                "UPSERT type::thing('usage_counter', $id) SET \
                 tenant_id = $tenant_id, \
                 user_id = $user_id, \
                 kind = $kind, \
                 window_start = $window_start, \
                 count = IF count != NONE THEN count + 1 ELSE 1 END, \
                 created_at = IF created_at != NONE THEN created_at ELSE time::now() END, \
                 updated_at = time::now() \
                 RETURN AFTER",
            )
            .bind(("id", id))
            .bind(("tenant_id", tenant_id.to_owned()))
            .bind(("user_id", user_id.to_owned()))
            .bind(("kind", kind.to_owned()))
            .bind(("window_start", window_start))
            .await?
            .take(0)?;

        Ok(updated.map(|u| u.count).unwrap_or(1))
    }

    pub async fn current(
        db: &SurrealDbClient,
        tenant_id: &str,
        user_id: &str,
        kind: &str,
    ) -> Result<i64, AppError> {
        let window_start = Self::current_window();
        let counter: Option<Self> = db
            .get_item(&Self::key(tenant_id, user_id, kind, &window_start))
            .await?;
        Ok(counter.map(|c| c.count).unwrap_or(0))
    }

    /// Seconds until the current window rolls over; for retry-after hints.
    pub fn seconds_until_reset() -> u32 {
        let now = Utc::now();
        3600 - (now.minute() * 60 + now.second())
    }
}
