use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info, instrument};

use crate::domain::{
    Fixture, FixtureId, FixtureStatus, FixtureUpsert, Outcome, PoolSide, Pools, Wager,
    WagerSettlement, WagerStatus,
};
use crate::error::{LedgerError, Result};
use crate::ledger::{ensure_open, CommitOutcome, LedgerResult, PoolStore};

const FIXTURE_COLUMNS: &str = r#"
    id, gameweek, home_team_id, away_team_id, home_team_name, away_team_name,
    kickoff_time, status, home_score, away_score,
    pool_win, pool_win_count, pool_draw, pool_draw_count, pool_lose, pool_lose_count,
    winning_outcome, is_payout_processed
"#;

/// PostgreSQL-backed [`PoolStore`]
#[derive(Clone)]
pub struct PostgresPoolStore {
    pool: PgPool,
}

impl PostgresPoolStore {
    /// Connect to PostgreSQL
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Column pair holding one outcome's pool
fn pool_columns(outcome: Outcome) -> (&'static str, &'static str) {
    match outcome {
        Outcome::Win => ("pool_win", "pool_win_count"),
        Outcome::Draw => ("pool_draw", "pool_draw_count"),
        Outcome::Lose => ("pool_lose", "pool_lose_count"),
    }
}

fn fixture_id_param(id: FixtureId) -> i64 {
    i64::from(id)
}

fn decode<T: std::str::FromStr<Err = String>>(raw: &str) -> LedgerResult<T> {
    raw.parse::<T>().map_err(LedgerError::Storage)
}

fn score(raw: Option<i16>) -> Option<u8> {
    raw.and_then(|s| u8::try_from(s).ok())
}

fn count(raw: i32) -> u32 {
    u32::try_from(raw).unwrap_or(0)
}

fn fixture_from_row(row: &PgRow) -> LedgerResult<Fixture> {
    let id: i64 = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let winning: Option<String> = row.try_get("winning_outcome")?;

    Ok(Fixture {
        id: FixtureId::try_from(id).map_err(|e| LedgerError::Storage(e.to_string()))?,
        gameweek: count(row.try_get("gameweek")?),
        home_team_id: count(row.try_get("home_team_id")?),
        away_team_id: count(row.try_get("away_team_id")?),
        home_team_name: row.try_get("home_team_name")?,
        away_team_name: row.try_get("away_team_name")?,
        kickoff_time: row.try_get("kickoff_time")?,
        status: decode::<FixtureStatus>(&status)?,
        home_score: score(row.try_get("home_score")?),
        away_score: score(row.try_get("away_score")?),
        pools: Pools {
            win: PoolSide {
                total: row.try_get("pool_win")?,
                bet_count: count(row.try_get("pool_win_count")?),
            },
            draw: PoolSide {
                total: row.try_get("pool_draw")?,
                bet_count: count(row.try_get("pool_draw_count")?),
            },
            lose: PoolSide {
                total: row.try_get("pool_lose")?,
                bet_count: count(row.try_get("pool_lose_count")?),
            },
        },
        winning_outcome: winning.as_deref().map(decode::<Outcome>).transpose()?,
        is_payout_processed: row.try_get("is_payout_processed")?,
    })
}

fn wager_from_row(row: &PgRow) -> LedgerResult<Wager> {
    let fixture_id: i64 = row.try_get("fixture_id")?;
    let outcome: String = row.try_get("outcome")?;
    let status: String = row.try_get("status")?;

    Ok(Wager {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        fixture_id: FixtureId::try_from(fixture_id).map_err(|e| LedgerError::Storage(e.to_string()))?,
        outcome: decode::<Outcome>(&outcome)?,
        amount: row.try_get("amount")?,
        status: decode::<WagerStatus>(&status)?,
        payout: row.try_get("payout")?,
        placed_at: row.try_get("placed_at")?,
        settled_at: row.try_get("settled_at")?,
    })
}

#[async_trait]
impl PoolStore for PostgresPoolStore {
    #[instrument(skip(self, upsert), fields(fixture_id = upsert.id))]
    async fn upsert_fixture(&self, upsert: &FixtureUpsert) -> LedgerResult<Fixture> {
        // Finished fixtures keep their status
        let query = format!(
            r#"
            INSERT INTO fixtures (id, gameweek, home_team_id, away_team_id,
                                  home_team_name, away_team_name, kickoff_time, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                gameweek = EXCLUDED.gameweek,
                home_team_id = EXCLUDED.home_team_id,
                away_team_id = EXCLUDED.away_team_id,
                home_team_name = EXCLUDED.home_team_name,
                away_team_name = EXCLUDED.away_team_name,
                kickoff_time = EXCLUDED.kickoff_time,
                status = CASE WHEN fixtures.status = 'finished'
                              THEN fixtures.status ELSE EXCLUDED.status END,
                updated_at = NOW()
            RETURNING {}
            "#,
            FIXTURE_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(fixture_id_param(upsert.id))
            .bind(upsert.gameweek as i32)
            .bind(upsert.home_team_id as i32)
            .bind(upsert.away_team_id as i32)
            .bind(&upsert.home_team_name)
            .bind(&upsert.away_team_name)
            .bind(upsert.kickoff_time)
            .bind(upsert.status.as_str())
            .fetch_one(&self.pool)
            .await?;

        fixture_from_row(&row)
    }

    async fn get_fixture(&self, fixture_id: FixtureId) -> LedgerResult<Option<Fixture>> {
        let query = format!("SELECT {} FROM fixtures WHERE id = $1", FIXTURE_COLUMNS);
        let row = sqlx::query(&query)
            .bind(fixture_id_param(fixture_id))
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(fixture_from_row).transpose()
    }

    #[instrument(skip(self, wager), fields(wager_id = %wager.id, fixture_id = wager.fixture_id))]
    async fn insert_wager(&self, wager: &Wager) -> LedgerResult<Fixture> {
        let mut tx = self.pool.begin().await?;

        let lock = format!("SELECT {} FROM fixtures WHERE id = $1 FOR UPDATE", FIXTURE_COLUMNS);
        let row = sqlx::query(&lock)
            .bind(fixture_id_param(wager.fixture_id))
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(LedgerError::FixtureNotFound(wager.fixture_id))?;
        ensure_open(&fixture_from_row(&row)?)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO wagers (id, user_id, fixture_id, outcome, amount, status, payout, placed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id, fixture_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(wager.id)
        .bind(&wager.user_id)
        .bind(fixture_id_param(wager.fixture_id))
        .bind(wager.outcome.as_str())
        .bind(wager.amount)
        .bind(wager.status.as_str())
        .bind(wager.payout)
        .bind(wager.placed_at)
        .fetch_optional(&mut *tx)
        .await?;

        if inserted.is_none() {
            tx.rollback().await?;
            return Err(LedgerError::DuplicateWager {
                user_id: wager.user_id.clone(),
                fixture_id: wager.fixture_id,
            });
        }

        let (total_col, count_col) = pool_columns(wager.outcome);
        let update = format!(
            r#"
            UPDATE fixtures
            SET {total} = {total} + $2, {count} = {count} + 1, updated_at = NOW()
            WHERE id = $1
            RETURNING {columns}
            "#,
            total = total_col,
            count = count_col,
            columns = FIXTURE_COLUMNS
        );
        let row = sqlx::query(&update)
            .bind(fixture_id_param(wager.fixture_id))
            .bind(wager.amount)
            .fetch_one(&mut *tx)
            .await?;
        let fixture = fixture_from_row(&row)?;

        tx.commit().await?;
        debug!("Wager {} stored", wager.id);
        Ok(fixture)
    }

    async fn list_wagers(&self, fixture_id: FixtureId) -> LedgerResult<Vec<Wager>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, fixture_id, outcome, amount, status, payout, placed_at, settled_at
            FROM wagers
            WHERE fixture_id = $1
            ORDER BY placed_at, id
            "#,
        )
        .bind(fixture_id_param(fixture_id))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(wager_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn record_result(
        &self,
        fixture_id: FixtureId,
        home_score: u8,
        away_score: u8,
    ) -> LedgerResult<Fixture> {
        let mut tx = self.pool.begin().await?;

        let processed: Option<bool> =
            sqlx::query("SELECT is_payout_processed FROM fixtures WHERE id = $1 FOR UPDATE")
                .bind(fixture_id_param(fixture_id))
                .fetch_optional(&mut *tx)
                .await?
                .map(|row| row.try_get("is_payout_processed"))
                .transpose()?;

        match processed {
            None => return Err(LedgerError::FixtureNotFound(fixture_id)),
            Some(true) => return Err(LedgerError::AlreadyProcessed(fixture_id)),
            Some(false) => {}
        }

        let update = format!(
            r#"
            UPDATE fixtures
            SET home_score = $2, away_score = $3, status = 'finished',
                winning_outcome = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            FIXTURE_COLUMNS
        );
        let row = sqlx::query(&update)
            .bind(fixture_id_param(fixture_id))
            .bind(i16::from(home_score))
            .bind(i16::from(away_score))
            .bind(Outcome::from_scores(home_score, away_score).as_str())
            .fetch_one(&mut *tx)
            .await?;
        let fixture = fixture_from_row(&row)?;

        tx.commit().await?;
        Ok(fixture)
    }

    #[instrument(skip(self, settlements), fields(count = settlements.len()))]
    async fn commit_payout(
        &self,
        fixture_id: FixtureId,
        expected: Outcome,
        settlements: &[WagerSettlement],
    ) -> LedgerResult<CommitOutcome> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT is_payout_processed, winning_outcome FROM fixtures WHERE id = $1 FOR UPDATE",
        )
        .bind(fixture_id_param(fixture_id))
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(LedgerError::FixtureNotFound(fixture_id))?;

        let processed: bool = row.try_get("is_payout_processed")?;
        let winning: Option<String> = row.try_get("winning_outcome")?;
        if processed {
            tx.rollback().await?;
            return Ok(CommitOutcome::AlreadyProcessed);
        }
        if winning.as_deref() != Some(expected.as_str()) {
            tx.rollback().await?;
            return Ok(CommitOutcome::ResultChanged);
        }

        sqlx::query(
            r#"
            UPDATE fixtures
            SET is_payout_processed = TRUE, updated_at = NOW()
            WHERE id = $1 AND NOT is_payout_processed AND winning_outcome = $2
            "#,
        )
        .bind(fixture_id_param(fixture_id))
        .bind(expected.as_str())
        .execute(&mut *tx)
        .await?;

        let now = Utc::now();
        for settlement in settlements {
            sqlx::query(
                r#"
                UPDATE wagers
                SET status = $2, payout = $3, settled_at = $4
                WHERE id = $1 AND status = 'pending'
                "#,
            )
            .bind(settlement.wager_id)
            .bind(settlement.status.as_str())
            .bind(settlement.payout)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Committed {} wager settlements for fixture {}", settlements.len(), fixture_id);
        Ok(CommitOutcome::Committed)
    }

    async fn pending_payout_fixtures(&self) -> LedgerResult<Vec<Fixture>> {
        let query = format!(
            r#"
            SELECT {} FROM fixtures f
            WHERE NOT f.is_payout_processed
              AND EXISTS (SELECT 1 FROM wagers w WHERE w.fixture_id = f.id)
            ORDER BY f.id
            "#,
            FIXTURE_COLUMNS
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(fixture_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_columns_cover_every_outcome() {
        let columns: Vec<_> = Outcome::ALL.iter().map(|o| pool_columns(*o).0).collect();
        assert_eq!(columns, vec!["pool_win", "pool_draw", "pool_lose"]);
    }

    #[test]
    fn test_scores_outside_u8_are_dropped() {
        assert_eq!(score(Some(3)), Some(3));
        assert_eq!(score(Some(-1)), None);
        assert_eq!(score(None), None);
    }

    #[test]
    fn test_decode_reports_bad_enum_text_as_storage_error() {
        let err = decode::<Outcome>("home").unwrap_err();
        assert!(matches!(err, LedgerError::Storage(_)));
    }
}
