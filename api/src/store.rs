//! PostgreSQL implementation of the core `HealthStore` contract.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use chrono_tz::Tz;
use healthmate_core::UserId;
use healthmate_core::collaborators::{HealthStore, StoreError};
use healthmate_core::domain::{
    ActivityLevel, Challenge, ChallengeMetric, DailySummary, DailyTargets, Gender, Goal,
    MealRecord, PlanKind, PlanPreferences, Profile, Recipient,
};
use healthmate_core::flows::challenge::local_midnight_utc;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

/// Split driver errors into "the database answered no" and "the database is not there".
pub fn classify(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Unreachable(err.to_string()),
        other => StoreError::Rejected(other.to_string()),
    }
}

fn to_u32(field: &str, value: i64) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Rejected(format!("{field} out of range: {value}")))
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    user_id: i64,
    chat_id: i64,
    name: String,
    gender: String,
    age: i64,
    height_cm: f64,
    weight_kg: f64,
    goal: String,
    activity_level: String,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = StoreError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        let bad = |field: &str, value: &str| StoreError::Rejected(format!("unknown {field} '{value}'"));
        Ok(Profile {
            user_id: row.user_id,
            chat_id: row.chat_id,
            gender: Gender::parse(&row.gender).ok_or_else(|| bad("gender", &row.gender))?,
            age: to_u32("age", row.age)?,
            height_cm: row.height_cm,
            weight_kg: row.weight_kg,
            goal: Goal::parse(&row.goal).ok_or_else(|| bad("goal", &row.goal))?,
            activity_level: ActivityLevel::parse(&row.activity_level)
                .ok_or_else(|| bad("activity_level", &row.activity_level))?,
            name: row.name,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TargetsRow {
    calories: i64,
    protein_g: i64,
    fat_g: i64,
    carbs_g: i64,
    water_ml: i64,
    steps: i64,
}

impl TryFrom<TargetsRow> for DailyTargets {
    type Error = StoreError;

    fn try_from(row: TargetsRow) -> Result<Self, Self::Error> {
        Ok(DailyTargets {
            calories: to_u32("calories", row.calories)?,
            protein_g: to_u32("protein_g", row.protein_g)?,
            fat_g: to_u32("fat_g", row.fat_g)?,
            carbs_g: to_u32("carbs_g", row.carbs_g)?,
            water_ml: to_u32("water_ml", row.water_ml)?,
            steps: to_u32("steps", row.steps)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    meals: i64,
    calories: f64,
    protein: f64,
    fat: f64,
    carbs: f64,
    water_ml: i64,
    steps: i64,
}

#[derive(sqlx::FromRow)]
struct ChallengeRow {
    id: Uuid,
    title: String,
    description: String,
    metric: String,
    target: i64,
    week_start: NaiveDate,
}

impl TryFrom<ChallengeRow> for Challenge {
    type Error = StoreError;

    fn try_from(row: ChallengeRow) -> Result<Self, Self::Error> {
        Ok(Challenge {
            id: row.id,
            metric: ChallengeMetric::parse(&row.metric)
                .ok_or_else(|| StoreError::Rejected(format!("unknown metric '{}'", row.metric)))?,
            target: to_u32("target", row.target)?,
            title: row.title,
            description: row.description,
            week_start: row.week_start,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RecipientRow {
    user_id: i64,
    chat_id: i64,
}

impl From<RecipientRow> for Recipient {
    fn from(row: RecipientRow) -> Self {
        Recipient {
            user_id: row.user_id,
            chat_id: row.chat_id,
        }
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HealthStore for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| ())
            .map_err(classify)
    }

    async fn get_profile(&self, user_id: UserId) -> Result<Option<Profile>, StoreError> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r#"
            SELECT user_id, chat_id, name, gender, age, height_cm, weight_kg, goal, activity_level
            FROM profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;
        row.map(Profile::try_from).transpose()
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO profiles
                (user_id, chat_id, name, gender, age, height_cm, weight_kg, goal, activity_level)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (user_id) DO UPDATE SET
                chat_id = EXCLUDED.chat_id,
                name = EXCLUDED.name,
                gender = EXCLUDED.gender,
                age = EXCLUDED.age,
                height_cm = EXCLUDED.height_cm,
                weight_kg = EXCLUDED.weight_kg,
                goal = EXCLUDED.goal,
                activity_level = EXCLUDED.activity_level,
                updated_at = now()
            "#,
        )
        .bind(profile.user_id)
        .bind(profile.chat_id)
        .bind(&profile.name)
        .bind(profile.gender.as_str())
        .bind(i64::from(profile.age))
        .bind(profile.height_cm)
        .bind(profile.weight_kg)
        .bind(profile.goal.as_str())
        .bind(profile.activity_level.as_str())
        .execute(&self.pool)
        .await
        .map(|_| ())
        .map_err(classify)
    }

    async fn get_daily_targets(&self, user_id: UserId) -> Result<Option<DailyTargets>, StoreError> {
        let row = sqlx::query_as::<_, TargetsRow>(
            r#"
            SELECT calories, protein_g, fat_g, carbs_g, water_ml, steps
            FROM daily_targets
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;
        row.map(DailyTargets::try_from).transpose()
    }

    async fn save_daily_targets(
        &self,
        user_id: UserId,
        targets: &DailyTargets,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO daily_targets (user_id, calories, protein_g, fat_g, carbs_g, water_ml, steps)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id) DO UPDATE SET
                calories = EXCLUDED.calories,
                protein_g = EXCLUDED.protein_g,
                fat_g = EXCLUDED.fat_g,
                carbs_g = EXCLUDED.carbs_g,
                water_ml = EXCLUDED.water_ml,
                steps = EXCLUDED.steps,
                updated_at = now()
            "#,
        )
        .bind(user_id)
        .bind(i64::from(targets.calories))
        .bind(i64::from(targets.protein_g))
        .bind(i64::from(targets.fat_g))
        .bind(i64::from(targets.carbs_g))
        .bind(i64::from(targets.water_ml))
        .bind(i64::from(targets.steps))
        .execute(&self.pool)
        .await
        .map(|_| ())
        .map_err(classify)
    }

    async fn list_recipients(&self) -> Result<Vec<Recipient>, StoreError> {
        let rows = sqlx::query_as::<_, RecipientRow>(
            "SELECT user_id, chat_id FROM profiles ORDER BY user_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        Ok(rows.into_iter().map(Recipient::from).collect())
    }

    async fn insert_meal(&self, meal: &MealRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO meals
                (id, user_id, description, name, calories, protein, fat, carbs, source, eaten_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(meal.id)
        .bind(meal.user_id)
        .bind(&meal.description)
        .bind(&meal.estimate.name)
        .bind(meal.estimate.calories)
        .bind(meal.estimate.protein)
        .bind(meal.estimate.fat)
        .bind(meal.estimate.carbs)
        .bind(meal.source.as_str())
        .bind(meal.eaten_at)
        .execute(&self.pool)
        .await
        .map(|_| ())
        .map_err(classify)
    }

    async fn add_water(&self, user_id: UserId, ml: u32, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO water_log (user_id, ml, logged_at) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(i64::from(ml))
            .bind(at)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(classify)
    }

    async fn add_steps(
        &self,
        user_id: UserId,
        steps: u32,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO steps_log (user_id, steps, logged_at) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(i64::from(steps))
            .bind(at)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(classify)
    }

    async fn daily_summary(
        &self,
        user_id: UserId,
        date: NaiveDate,
        timezone: Tz,
    ) -> Result<DailySummary, StoreError> {
        let from = local_midnight_utc(date, timezone);
        let until = local_midnight_utc(date + ChronoDuration::days(1), timezone);
        let row = sqlx::query_as::<_, SummaryRow>(
            r#"
            WITH day_meals AS (
                SELECT calories, protein, fat, carbs FROM meals
                WHERE user_id = $1 AND eaten_at >= $2 AND eaten_at < $3
            )
            SELECT
                (SELECT COUNT(*) FROM day_meals) AS meals,
                (SELECT COALESCE(SUM(calories), 0) FROM day_meals) AS calories,
                (SELECT COALESCE(SUM(protein), 0) FROM day_meals) AS protein,
                (SELECT COALESCE(SUM(fat), 0) FROM day_meals) AS fat,
                (SELECT COALESCE(SUM(carbs), 0) FROM day_meals) AS carbs,
                (SELECT COALESCE(SUM(ml), 0)::BIGINT FROM water_log
                    WHERE user_id = $1 AND logged_at >= $2 AND logged_at < $3) AS water_ml,
                (SELECT COALESCE(SUM(steps), 0)::BIGINT FROM steps_log
                    WHERE user_id = $1 AND logged_at >= $2 AND logged_at < $3) AS steps
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(until)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;

        Ok(DailySummary {
            date: Some(date),
            meals: to_u32("meals", row.meals)?,
            calories: row.calories,
            protein_g: row.protein,
            fat_g: row.fat,
            carbs_g: row.carbs,
            water_ml: to_u32("water_ml", row.water_ml)?,
            steps: to_u32("steps", row.steps)?,
        })
    }

    async fn get_plan_preferences(
        &self,
        user_id: UserId,
        kind: PlanKind,
    ) -> Result<Option<PlanPreferences>, StoreError> {
        let answers = sqlx::query_scalar::<_, Json<BTreeMap<String, String>>>(
            "SELECT answers FROM plan_preferences WHERE user_id = $1 AND kind = $2",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;
        Ok(answers.map(|Json(answers)| PlanPreferences {
            user_id,
            kind,
            answers,
        }))
    }

    async fn save_plan_preferences(&self, preferences: &PlanPreferences) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO plan_preferences (user_id, kind, answers)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, kind) DO UPDATE SET
                answers = EXCLUDED.answers,
                updated_at = now()
            "#,
        )
        .bind(preferences.user_id)
        .bind(preferences.kind.as_str())
        .bind(Json(&preferences.answers))
        .execute(&self.pool)
        .await
        .map(|_| ())
        .map_err(classify)
    }

    async fn delete_plan_preferences(
        &self,
        user_id: UserId,
        kind: PlanKind,
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM plan_preferences WHERE user_id = $1 AND kind = $2")
            .bind(user_id)
            .bind(kind.as_str())
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(classify)
    }

    async fn create_challenge(&self, challenge: &Challenge) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO challenges (id, title, description, metric, target, week_start)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(challenge.id)
        .bind(&challenge.title)
        .bind(&challenge.description)
        .bind(challenge.metric.as_str())
        .bind(i64::from(challenge.target))
        .bind(challenge.week_start)
        .execute(&self.pool)
        .await
        .map(|_| ())
        .map_err(classify)
    }

    async fn current_challenge(&self, today: NaiveDate) -> Result<Option<Challenge>, StoreError> {
        let row = sqlx::query_as::<_, ChallengeRow>(
            r#"
            SELECT id, title, description, metric, target, week_start
            FROM challenges
            WHERE week_start <= $1 AND week_start > $1 - 7
            ORDER BY week_start DESC
            LIMIT 1
            "#,
        )
        .bind(today)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;
        row.map(Challenge::try_from).transpose()
    }

    async fn join_challenge(&self, challenge_id: Uuid, user_id: UserId) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO challenge_participants (challenge_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (challenge_id, user_id) DO NOTHING
            "#,
        )
        .bind(challenge_id)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(result.rows_affected() == 1)
    }

    async fn challenge_participants(
        &self,
        challenge_id: Uuid,
    ) -> Result<Vec<Recipient>, StoreError> {
        let rows = sqlx::query_as::<_, RecipientRow>(
            r#"
            SELECT p.user_id, p.chat_id
            FROM challenge_participants cp
            JOIN profiles p ON p.user_id = cp.user_id
            WHERE cp.challenge_id = $1
            ORDER BY p.user_id
            "#,
        )
        .bind(challenge_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        Ok(rows.into_iter().map(Recipient::from).collect())
    }

    async fn metric_total(
        &self,
        user_id: UserId,
        metric: ChallengeMetric,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let sql = match metric {
            ChallengeMetric::Steps => {
                "SELECT COALESCE(SUM(steps), 0)::BIGINT FROM steps_log WHERE user_id = $1 AND logged_at >= $2"
            }
            ChallengeMetric::WaterMl => {
                "SELECT COALESCE(SUM(ml), 0)::BIGINT FROM water_log WHERE user_id = $1 AND logged_at >= $2"
            }
        };
        let total = sqlx::query_scalar::<_, i64>(sql)
            .bind(user_id)
            .bind(since)
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;
        u64::try_from(total).map_err(|_| StoreError::Rejected(format!("negative total {total}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outages_and_rejections_are_told_apart() {
        assert!(matches!(classify(sqlx::Error::PoolTimedOut), StoreError::Unreachable(_)));
        assert!(matches!(classify(sqlx::Error::PoolClosed), StoreError::Unreachable(_)));
        assert!(matches!(classify(sqlx::Error::RowNotFound), StoreError::Rejected(_)));
    }

    #[test]
    fn profile_rows_with_unknown_enums_are_rejected() {
        let row = ProfileRow {
            user_id: 1,
            chat_id: 1,
            name: "Ann".into(),
            gender: "female".into(),
            age: 30,
            height_cm: 168.0,
            weight_kg: 60.0,
            goal: "levitate".into(),
            activity_level: "moderate".into(),
        };
        let err = Profile::try_from(row).unwrap_err();
        assert!(matches!(err, StoreError::Rejected(detail) if detail.contains("levitate")));
    }

    #[test]
    fn negative_counts_do_not_wrap() {
        assert!(to_u32("steps", -1).is_err());
        assert_eq!(to_u32("steps", 12_000).unwrap(), 12_000);
    }
}
