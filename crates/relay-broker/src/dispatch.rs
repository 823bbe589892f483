//! Weighted-fair dispatch across tenants.
//!
//! Fairness and claiming are decoupled: eligibility reasons about *tenants*
//! (backlog present, below `max_inflight`), while contention is resolved at
//! the *row* by the skip-locked lease engine. Weighted random selection
//! needs no shared state between dispatcher instances.

use chrono::Utc;
use rand::Rng;
use tracing::debug;

use crate::broker::JobBroker;
use crate::error::BrokerResult;
use crate::lease::LeasedJob;

/// A tenant eligible for shared-mode dispatch.
#[derive(Debug, Clone, sqlx::FromRow)]
struct TenantCandidate {
    id: String,
    weight: i32,
}

impl JobBroker {
    /// Serve one worker poll.
    ///
    /// Pinned mode (`tenant_id` given) delegates directly to the lease
    /// engine. Shared mode draws a tenant by weighted random sampling over
    /// the active set, retrying a bounded number of times when the fairness
    /// step and the claim step race.
    pub async fn dispatch(
        &self,
        worker_id: &str,
        tenant_id: Option<&str>,
        lease_duration_seconds: Option<i64>,
    ) -> BrokerResult<Option<LeasedJob>> {
        let now = Utc::now();

        if self.live_lease_count(now).await? >= self.config().global_concurrency_cap {
            debug!(worker_id, "global concurrency cap reached, rejecting poll");
            return Ok(None);
        }

        if let Some(tenant) = tenant_id {
            return self.lease(worker_id, Some(tenant), lease_duration_seconds).await;
        }

        let mut candidates = self.active_tenants().await?;
        let mut redraws_left = self.config().dispatch_retry_limit;

        while !candidates.is_empty() {
            let idx = match weighted_pick(&mut rand::rng(), &candidates) {
                Some(idx) => idx,
                None => return Ok(None),
            };
            let picked = candidates.swap_remove(idx);

            if let Some(leased) = self
                .lease(worker_id, Some(&picked.id), lease_duration_seconds)
                .await?
            {
                return Ok(Some(leased));
            }

            // Another dispatcher took the tenant's last eligible row between
            // the fairness step and the claim.
            if redraws_left == 0 {
                break;
            }
            redraws_left -= 1;
        }

        Ok(None)
    }

    /// Tenants with claimable backlog and headroom under their inflight cap.
    async fn active_tenants(&self) -> Result<Vec<TenantCandidate>, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as::<_, TenantCandidate>(
            r#"
            SELECT t.id, t.weight FROM tenants t
            WHERE EXISTS (
                SELECT 1 FROM jobs j
                WHERE j.tenant_id = t.id
                  AND j.status = 'pending'
                  AND j.available_at <= $1
            )
            AND (
                SELECT COUNT(*)
                FROM job_leases l
                JOIN jobs j2 ON j2.id = l.job_id
                WHERE j2.tenant_id = t.id AND l.expires_at > $1
            ) < t.max_inflight
            "#,
        )
        .bind(now)
        .fetch_all(self.pool())
        .await
    }
}

/// Draw an index from `candidates` with probability proportional to weight.
/// Non-positive weights count as 1 so a misconfigured tenant is never
/// silently unreachable.
fn weighted_pick<R: Rng>(rng: &mut R, candidates: &[TenantCandidate]) -> Option<usize> {
    let total: i64 = candidates
        .iter()
        .map(|c| i64::from(c.weight.max(1)))
        .sum();
    if total <= 0 {
        return None;
    }

    let mut roll = rng.random_range(0..total);
    for (idx, candidate) in candidates.iter().enumerate() {
        roll -= i64::from(candidate.weight.max(1));
        if roll < 0 {
            return Some(idx);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn candidate(id: &str, weight: i32) -> TenantCandidate {
        TenantCandidate {
            id: id.to_string(),
            weight,
        }
    }

    #[test]
    fn empty_pool_yields_nothing() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(weighted_pick(&mut rng, &[]), None);
    }

    #[test]
    fn single_candidate_always_wins() {
        let mut rng = StdRng::seed_from_u64(7);
        let pool = vec![candidate("only", 1)];
        for _ in 0..100 {
            assert_eq!(weighted_pick(&mut rng, &pool), Some(0));
        }
    }

    #[test]
    fn equal_weights_split_evenly() {
        let mut rng = StdRng::seed_from_u64(42);
        let pool = vec![candidate("a", 1), candidate("b", 1)];
        let mut hits = [0u32; 2];
        for _ in 0..10_000 {
            hits[weighted_pick(&mut rng, &pool).unwrap()] += 1;
        }
        // Binomial(10_000, 0.5): anything past ±4 sigma would be a bug.
        assert!((4_800..=5_200).contains(&hits[0]), "hits = {hits:?}");
    }

    #[test]
    fn triple_weight_wins_three_times_as_often() {
        let mut rng = StdRng::seed_from_u64(42);
        let pool = vec![candidate("heavy", 3), candidate("light", 1)];
        let mut heavy = 0u32;
        for _ in 0..10_000 {
            if weighted_pick(&mut rng, &pool).unwrap() == 0 {
                heavy += 1;
            }
        }
        assert!((7_200..=7_800).contains(&heavy), "heavy = {heavy}");
    }

    #[test]
    fn non_positive_weight_is_clamped_to_one() {
        let mut rng = StdRng::seed_from_u64(9);
        let pool = vec![candidate("zero", 0), candidate("neg", -5)];
        let mut hits = [0u32; 2];
        for _ in 0..1_000 {
            hits[weighted_pick(&mut rng, &pool).unwrap()] += 1;
        }
        assert!(hits[0] > 0 && hits[1] > 0);
    }
}
