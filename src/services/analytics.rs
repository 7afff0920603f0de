use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::notification;
use super::plan;
use super::{new_id, now, today, ServiceResult};

/// Cached analytics older than this are recomputed on read.
pub const STALE_AFTER_SECS: i64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "high" => Self::High,
            "medium" => Self::Medium,
            _ => Self::Low,
        }
    }

    pub fn from_score(score: u32) -> Self {
        if score >= 4 {
            Self::High
        } else if score >= 2 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyticsScope {
    Overall,
    ForPlan(String),
}

impl AnalyticsScope {
    fn key(&self) -> &str {
        match self {
            Self::Overall => "",
            Self::ForPlan(plan_id) => plan_id,
        }
    }

    fn plan_id(&self) -> Option<&str> {
        match self {
            Self::Overall => None,
            Self::ForPlan(plan_id) => Some(plan_id),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LearnerAnalytics {
    pub id: String,
    pub user_id: String,
    pub plan_id: Option<String>,
    pub study_streak: i64,
    pub longest_streak: i64,
    pub mastery_rate: f64,
    pub review_frequency: f64,
    pub risk_level: RiskLevel,
    pub risk_factors: Vec<String>,
    pub risk_factors_display: Vec<String>,
    pub last_study_date: Option<NaiveDate>,
    pub total_words_mastered: i64,
    pub total_practice_sessions: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Streaks {
    pub current: i64,
    pub longest: i64,
}

/// Longest run of calendar-consecutive dates.
pub fn longest_run(dates: &BTreeSet<NaiveDate>) -> i64 {
    let mut longest = 0;
    let mut run = 0;
    let mut prev: Option<NaiveDate> = None;
    for &date in dates {
        run = match prev {
            Some(p) if date - p == Duration::days(1) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        prev = Some(date);
    }
    longest
}

/// The current streak counts back from today, or from yesterday when today
/// has no activity yet. Anything older breaks it.
pub fn compute_streaks(dates: &BTreeSet<NaiveDate>, today: NaiveDate) -> Streaks {
    if dates.is_empty() {
        return Streaks { current: 0, longest: 0 };
    }

    let yesterday = today - Duration::days(1);
    let anchor = if dates.contains(&today) {
        Some(today)
    } else if dates.contains(&yesterday) {
        Some(yesterday)
    } else {
        None
    };

    let mut current = 0;
    if let Some(mut day) = anchor {
        while dates.contains(&day) {
            current += 1;
            day -= Duration::days(1);
        }
    }

    Streaks {
        current,
        longest: current.max(longest_run(dates)),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskInputs {
    pub streak: i64,
    pub mastery_rate: f64,
    pub last_study_date: Option<NaiveDate>,
    pub total_words: i64,
    pub review_required: i64,
    pub today: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub factors: Vec<String>,
    pub score: u32,
}

pub fn assess_risk(inputs: &RiskInputs) -> RiskAssessment {
    let mut factors = Vec::new();
    let mut score = 0;

    if let Some(last) = inputs.last_study_date {
        let days_missed = (inputs.today - last).num_days();
        let weight = match days_missed {
            d if d >= 7 => 3,
            d if d >= 3 => 2,
            d if d >= 1 => 1,
            _ => 0,
        };
        if weight > 0 {
            factors.push(format!("missed_{days_missed}_days"));
            score += weight;
        }
    }

    if inputs.streak == 0 {
        factors.push("no_current_streak".to_string());
        score += 1;
    }

    if inputs.mastery_rate < 20.0 {
        factors.push("low_mastery_rate".to_string());
        score += 2;
    } else if inputs.mastery_rate < 40.0 {
        factors.push("moderate_mastery_rate".to_string());
        score += 1;
    }

    if inputs.total_words > 0 {
        let ratio = inputs.review_required as f64 / inputs.total_words as f64;
        if ratio > 0.5 {
            factors.push("high_review_ratio".to_string());
            score += 2;
        } else if ratio > 0.3 {
            factors.push("moderate_review_ratio".to_string());
            score += 1;
        }
    }

    RiskAssessment {
        level: RiskLevel::from_score(score),
        factors,
        score,
    }
}

const FACTOR_MESSAGES: [(&str, &str); 7] = [
    ("missed", "You have missed study days recently"),
    ("no_current_streak", "You don't have an active study streak"),
    ("low_mastery", "Your mastery rate is below target"),
    ("moderate_mastery", "Your mastery rate could be higher"),
    ("high_review", "Many words need review"),
    ("moderate_review", "Several words need review"),
    ("no_practice", "No practice sessions recently"),
];

/// Human-readable text for each factor code; unknown codes pass through.
pub fn risk_factors_display(factors: &[String]) -> Vec<String> {
    factors
        .iter()
        .map(|factor| {
            FACTOR_MESSAGES
                .iter()
                .find(|(needle, _)| factor.contains(needle))
                .map(|(_, message)| (*message).to_string())
                .unwrap_or_else(|| factor.clone())
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    StudyReminder,
    PracticeSuggestion,
    ReviewSuggestion,
    Encouragement,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub kind: RecommendationKind,
    pub message: String,
    pub action: Option<String>,
}

impl Recommendation {
    fn new(kind: RecommendationKind, message: impl Into<String>, action: Option<&str>) -> Self {
        Self {
            kind,
            message: message.into(),
            action: action.map(str::to_string),
        }
    }
}

pub fn get_recommendations(analytics: &LearnerAnalytics) -> Vec<Recommendation> {
    let has = |needle: &str| analytics.risk_factors.iter().any(|f| f.contains(needle));
    let mut recommendations = Vec::new();

    if has("missed") {
        recommendations.push(Recommendation::new(
            RecommendationKind::StudyReminder,
            "Try to study at least a few words every day to maintain your streak.",
            Some("Start a quick study session"),
        ));
    }
    if has("low_mastery") || has("moderate_mastery") {
        recommendations.push(Recommendation::new(
            RecommendationKind::PracticeSuggestion,
            "Practice more to improve your mastery rate.",
            Some("Start a practice session"),
        ));
    }
    if has("review") {
        recommendations.push(Recommendation::new(
            RecommendationKind::ReviewSuggestion,
            "You have words that need review. Focus on these to solidify your learning.",
            Some("Review flagged words"),
        ));
    }
    if analytics.study_streak >= 7 {
        recommendations.push(Recommendation::new(
            RecommendationKind::Encouragement,
            format!(
                "Great job! You have a {}-day streak. Keep it up!",
                analytics.study_streak
            ),
            None,
        ));
    }
    if recommendations.is_empty() {
        recommendations.push(Recommendation::new(
            RecommendationKind::Encouragement,
            "You're doing well! Keep up the consistent practice.",
            None,
        ));
    }
    recommendations
}

/// Returns the cached record for `scope`, recomputing it first when it is
/// missing or stale.
pub async fn get_or_create_analytics(
    pool: &SqlitePool,
    user_id: &str,
    scope: &AnalyticsScope,
) -> ServiceResult<LearnerAnalytics> {
    let cached = load(pool, user_id, scope).await?;
    if let Some(cached) = &cached {
        if (now() - cached.updated_at).num_seconds() <= STALE_AFTER_SECS {
            return Ok(cached.clone());
        }
    }
    calculate_analytics(pool, user_id, scope, cached, today()).await
}

pub async fn calculate_analytics(
    pool: &SqlitePool,
    user_id: &str,
    scope: &AnalyticsScope,
    previous: Option<LearnerAnalytics>,
    today: NaiveDate,
) -> ServiceResult<LearnerAnalytics> {
    let plan_id = scope.plan_id();

    let dates: Vec<NaiveDate> = sqlx::query_scalar(
        r#"SELECT DISTINCT "date" FROM "learning_progress"
           WHERE "userId" = ?1 AND "wordsStudied" > 0 AND (?2 IS NULL OR "planId" = ?2)"#,
    )
    .bind(user_id)
    .bind(plan_id)
    .fetch_all(pool)
    .await?;
    let dates: BTreeSet<NaiveDate> = dates.into_iter().collect();
    let streaks = compute_streaks(&dates, today);
    let last_study_date = dates.iter().next_back().copied();

    let totals = sqlx::query(
        r#"SELECT COUNT(*) AS "total",
                  COALESCE(SUM(CASE WHEN pv."status" = 'mastered' THEN 1 ELSE 0 END), 0) AS "mastered",
                  COALESCE(SUM(CASE WHEN pv."status" = 'review_required' THEN 1 ELSE 0 END), 0) AS "reviewRequired",
                  COALESCE(SUM(pv."reviewCount"), 0) AS "reviews"
           FROM "learning_plan_vocabulary" pv
           JOIN "learning_plans" p ON p."id" = pv."planId"
           WHERE p."userId" = ?1 AND (?2 IS NULL OR pv."planId" = ?2)"#,
    )
    .bind(user_id)
    .bind(plan_id)
    .fetch_one(pool)
    .await?;
    let total: i64 = totals.try_get("total")?;
    let mastered: i64 = totals.try_get("mastered")?;
    let review_required: i64 = totals.try_get("reviewRequired")?;
    let reviews: i64 = totals.try_get("reviews")?;

    let total_practice_sessions: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM "practice_sessions" WHERE "userId" = ?1 AND (?2 IS NULL OR "planId" = ?2)"#,
    )
    .bind(user_id)
    .bind(plan_id)
    .fetch_one(pool)
    .await?;

    let mastery_rate = if total > 0 { mastered as f64 / total as f64 * 100.0 } else { 0.0 };
    let review_frequency = if total > 0 { reviews as f64 / total as f64 } else { 0.0 };

    let risk = assess_risk(&RiskInputs {
        streak: streaks.current,
        mastery_rate,
        last_study_date,
        total_words: total,
        review_required,
        today,
    });

    let previous_streak = previous.as_ref().map(|p| p.study_streak).unwrap_or(0);
    let longest_streak = streaks
        .longest
        .max(previous.as_ref().map(|p| p.longest_streak).unwrap_or(0));

    sqlx::query(
        r#"INSERT INTO "learner_analytics"
           ("id","userId","planId","scopeKey","studyStreak","longestStreak","masteryRate","reviewFrequency",
            "riskLevel","riskFactors","lastStudyDate","totalWordsMastered","totalPracticeSessions","updatedAt")
           VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?)
           ON CONFLICT ("userId","scopeKey") DO UPDATE SET
             "studyStreak" = excluded."studyStreak",
             "longestStreak" = excluded."longestStreak",
             "masteryRate" = excluded."masteryRate",
             "reviewFrequency" = excluded."reviewFrequency",
             "riskLevel" = excluded."riskLevel",
             "riskFactors" = excluded."riskFactors",
             "lastStudyDate" = excluded."lastStudyDate",
             "totalWordsMastered" = excluded."totalWordsMastered",
             "totalPracticeSessions" = excluded."totalPracticeSessions",
             "updatedAt" = excluded."updatedAt""#,
    )
    .bind(new_id())
    .bind(user_id)
    .bind(plan_id)
    .bind(scope.key())
    .bind(streaks.current)
    .bind(longest_streak)
    .bind(mastery_rate)
    .bind(review_frequency)
    .bind(risk.level.as_str())
    .bind(serde_json::to_string(&risk.factors)?)
    .bind(last_study_date)
    .bind(mastered)
    .bind(total_practice_sessions)
    .bind(now())
    .execute(pool)
    .await?;

    let analytics = load(pool, user_id, scope)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;

    tracing::debug!(
        user_id,
        plan_id = plan_id.unwrap_or("-"),
        streak = analytics.study_streak,
        risk_level = analytics.risk_level.as_str(),
        score = risk.score,
        "analytics recalculated"
    );

    if analytics.risk_level != RiskLevel::Low {
        notification::maybe_create_risk_notification(
            pool,
            user_id,
            plan_id,
            analytics.risk_level,
            &analytics.risk_factors,
            today,
        )
        .await?;
    }
    if *scope == AnalyticsScope::Overall && analytics.study_streak != previous_streak {
        notification::create_streak_notification(pool, user_id, analytics.study_streak, today).await?;
    }

    Ok(analytics)
}

async fn load(pool: &SqlitePool, user_id: &str, scope: &AnalyticsScope) -> ServiceResult<Option<LearnerAnalytics>> {
    let row = sqlx::query(
        r#"SELECT "id","userId","planId","studyStreak","longestStreak","masteryRate","reviewFrequency",
                  "riskLevel","riskFactors","lastStudyDate","totalWordsMastered","totalPracticeSessions","updatedAt"
           FROM "learner_analytics" WHERE "userId" = ? AND "scopeKey" = ?"#,
    )
    .bind(user_id)
    .bind(scope.key())
    .fetch_optional(pool)
    .await?;
    row.map(|row| map_analytics_row(&row)).transpose()
}

#[derive(Debug, Clone, Serialize)]
pub struct OverallSummary {
    pub active_plans: i64,
    pub total_words: i64,
    pub mastered_words: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverallAnalytics {
    pub analytics: LearnerAnalytics,
    pub summary: OverallSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct VocabularyStats {
    pub total: i64,
    pub by_status: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanAnalytics {
    pub analytics: LearnerAnalytics,
    pub vocabulary_stats: VocabularyStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreakView {
    pub current_streak: i64,
    pub longest_streak: i64,
    pub last_study_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskView {
    pub risk_level: RiskLevel,
    pub risk_factors: Vec<String>,
    pub recommendations: Vec<Recommendation>,
}

pub async fn overall_summary(pool: &SqlitePool, user_id: &str) -> ServiceResult<OverallAnalytics> {
    let analytics = get_or_create_analytics(pool, user_id, &AnalyticsScope::Overall).await?;

    let active_plans: i64 =
        sqlx::query_scalar(r#"SELECT COUNT(*) FROM "learning_plans" WHERE "userId" = ? AND "status" = 'active'"#)
            .bind(user_id)
            .fetch_one(pool)
            .await?;
    let row = sqlx::query(
        r#"SELECT COUNT(*) AS "total",
                  COALESCE(SUM(CASE WHEN pv."status" = 'mastered' THEN 1 ELSE 0 END), 0) AS "mastered"
           FROM "learning_plan_vocabulary" pv
           JOIN "learning_plans" p ON p."id" = pv."planId"
           WHERE p."userId" = ?"#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(OverallAnalytics {
        analytics,
        summary: OverallSummary {
            active_plans,
            total_words: row.try_get("total")?,
            mastered_words: row.try_get("mastered")?,
        },
    })
}

pub async fn plan_analytics(pool: &SqlitePool, user_id: &str, plan_id: &str) -> ServiceResult<PlanAnalytics> {
    let plan = plan::get_plan(pool, user_id, plan_id).await?;
    let analytics = get_or_create_analytics(pool, user_id, &AnalyticsScope::ForPlan(plan.id.clone())).await?;
    Ok(PlanAnalytics {
        analytics,
        vocabulary_stats: VocabularyStats {
            total: plan::snapshot_count(pool, &plan.id).await?,
            by_status: plan::status_counts(pool, &plan.id).await?,
        },
    })
}

pub async fn streak(pool: &SqlitePool, user_id: &str) -> ServiceResult<StreakView> {
    let analytics = get_or_create_analytics(pool, user_id, &AnalyticsScope::Overall).await?;
    Ok(StreakView {
        current_streak: analytics.study_streak,
        longest_streak: analytics.longest_streak,
        last_study_date: analytics.last_study_date,
    })
}

pub async fn risk(pool: &SqlitePool, user_id: &str) -> ServiceResult<RiskView> {
    let analytics = get_or_create_analytics(pool, user_id, &AnalyticsScope::Overall).await?;
    let recommendations = get_recommendations(&analytics);
    Ok(RiskView {
        risk_level: analytics.risk_level,
        risk_factors: analytics.risk_factors,
        recommendations,
    })
}

fn map_analytics_row(row: &SqliteRow) -> ServiceResult<LearnerAnalytics> {
    let risk_level: String = row.try_get("riskLevel")?;
    let raw_factors: String = row.try_get("riskFactors")?;
    let risk_factors: Vec<String> = serde_json::from_str(&raw_factors)?;
    Ok(LearnerAnalytics {
        id: row.try_get("id")?,
        user_id: row.try_get("userId")?,
        plan_id: row.try_get("planId")?,
        study_streak: row.try_get("studyStreak")?,
        longest_streak: row.try_get("longestStreak")?,
        mastery_rate: row.try_get("masteryRate")?,
        review_frequency: row.try_get("reviewFrequency")?,
        risk_level: RiskLevel::from_str(&risk_level),
        risk_factors_display: risk_factors_display(&risk_factors),
        risk_factors,
        last_study_date: row.try_get("lastStudyDate")?,
        total_words_mastered: row.try_get("totalWordsMastered")?,
        total_practice_sessions: row.try_get("totalPracticeSessions")?,
        updated_at: row.try_get("updatedAt")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn set(days: &[&str]) -> BTreeSet<NaiveDate> {
        days.iter().map(|s| d(s)).collect()
    }

    fn inputs() -> RiskInputs {
        RiskInputs {
            streak: 3,
            mastery_rate: 50.0,
            last_study_date: Some(d("2024-06-10")),
            total_words: 10,
            review_required: 0,
            today: d("2024-06-10"),
        }
    }

    #[test]
    fn streak_counts_back_from_yesterday() {
        let dates = set(&["2024-06-07", "2024-06-08", "2024-06-09"]);
        let streaks = compute_streaks(&dates, d("2024-06-10"));
        assert_eq!(streaks, Streaks { current: 3, longest: 3 });
    }

    #[test]
    fn streak_breaks_after_a_gap() {
        let dates = set(&["2024-06-01", "2024-06-02", "2024-06-03", "2024-06-04", "2024-06-08"]);
        let streaks = compute_streaks(&dates, d("2024-06-10"));
        assert_eq!(streaks, Streaks { current: 0, longest: 4 });
    }

    #[test]
    fn empty_history_has_no_streak() {
        assert_eq!(compute_streaks(&BTreeSet::new(), d("2024-06-10")), Streaks { current: 0, longest: 0 });
        assert_eq!(longest_run(&BTreeSet::new()), 0);
    }

    #[test]
    fn healthy_learner_is_low_risk() {
        let risk = assess_risk(&inputs());
        assert_eq!(risk.level, RiskLevel::Low);
        assert!(risk.factors.is_empty());
    }

    #[test]
    fn week_of_absence_is_high_risk() {
        let risk = assess_risk(&RiskInputs {
            streak: 0,
            last_study_date: Some(d("2024-06-01")),
            ..inputs()
        });
        assert_eq!(risk.factors, vec!["missed_9_days", "no_current_streak"]);
        assert_eq!(risk.score, 4);
        assert_eq!(risk.level, RiskLevel::High);
    }

    #[test]
    fn mastery_and_review_thresholds() {
        let risk = assess_risk(&RiskInputs {
            mastery_rate: 30.0,
            review_required: 4,
            ..inputs()
        });
        assert_eq!(risk.factors, vec!["moderate_mastery_rate", "moderate_review_ratio"]);
        assert_eq!(risk.level, RiskLevel::Medium);

        let risk = assess_risk(&RiskInputs {
            mastery_rate: 10.0,
            review_required: 6,
            ..inputs()
        });
        assert_eq!(risk.factors, vec!["low_mastery_rate", "high_review_ratio"]);
        assert_eq!(risk.level, RiskLevel::High);
    }

    #[test]
    fn thresholds_are_exclusive_at_their_boundaries() {
        let risk = assess_risk(&RiskInputs {
            mastery_rate: 40.0,
            review_required: 3,
            ..inputs()
        });
        assert!(risk.factors.is_empty());
        assert_eq!(risk.score, 0);

        let risk = assess_risk(&RiskInputs {
            mastery_rate: 20.0,
            review_required: 5,
            ..inputs()
        });
        assert_eq!(risk.factors, vec!["moderate_mastery_rate", "moderate_review_ratio"]);
        assert_eq!(risk.score, 2);
    }

    #[test]
    fn review_ratio_ignored_without_words() {
        let risk = assess_risk(&RiskInputs {
            total_words: 0,
            review_required: 0,
            ..inputs()
        });
        assert!(!risk.factors.iter().any(|f| f.contains("review")));
    }

    #[test]
    fn display_maps_known_codes_and_passes_through_unknown() {
        let shown = risk_factors_display(&["missed_4_days".to_string(), "mystery".to_string()]);
        assert_eq!(shown, vec!["You have missed study days recently", "mystery"]);
    }

    fn analytics(factors: &[&str], streak: i64) -> LearnerAnalytics {
        let factors: Vec<String> = factors.iter().map(|s| s.to_string()).collect();
        LearnerAnalytics {
            id: "a".into(),
            user_id: "u".into(),
            plan_id: None,
            study_streak: streak,
            longest_streak: streak,
            mastery_rate: 0.0,
            review_frequency: 0.0,
            risk_level: RiskLevel::Low,
            risk_factors_display: risk_factors_display(&factors),
            risk_factors: factors,
            last_study_date: None,
            total_words_mastered: 0,
            total_practice_sessions: 0,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn recommendations_follow_factors() {
        let recs = get_recommendations(&analytics(&["missed_2_days", "low_mastery_rate", "high_review_ratio"], 0));
        let kinds: Vec<_> = recs.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                RecommendationKind::StudyReminder,
                RecommendationKind::PracticeSuggestion,
                RecommendationKind::ReviewSuggestion
            ]
        );
    }

    #[test]
    fn long_streak_is_celebrated_and_fallback_exists() {
        let recs = get_recommendations(&analytics(&[], 9));
        assert_eq!(recs.len(), 1);
        assert!(recs[0].message.contains("9-day streak"));

        let recs = get_recommendations(&analytics(&[], 2));
        assert_eq!(recs[0].message, "You're doing well! Keep up the consistent practice.");
    }
}
