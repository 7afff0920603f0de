mod common;

use common::{days_from_today, setup, today, travel_plan};
use vocab_planner::services::analytics::RiskLevel;
use vocab_planner::services::notification::{self, NotificationType};
use vocab_planner::services::ServiceError;

#[tokio::test]
async fn low_risk_never_notifies() {
    let fx = setup().await;
    let created = notification::maybe_create_risk_notification(fx.pool(), &fx.learner.id, None, RiskLevel::Low, &[], today())
        .await
        .unwrap();
    assert!(created.is_none());
    assert_eq!(notification::unread_count(fx.pool(), &fx.learner.id).await.unwrap().count, 0);
}

#[tokio::test]
async fn risk_alerts_deduplicate_per_plan_and_day() {
    let fx = setup().await;
    let pool = fx.pool();
    let detail = travel_plan(&fx).await;
    let factors = vec!["no_current_streak".to_string()];

    let first = notification::maybe_create_risk_notification(pool, &fx.learner.id, None, RiskLevel::High, &factors, today())
        .await
        .unwrap();
    assert!(first.is_some());
    let again = notification::maybe_create_risk_notification(pool, &fx.learner.id, None, RiskLevel::Medium, &factors, today())
        .await
        .unwrap();
    assert!(again.is_none());

    let for_plan = notification::maybe_create_risk_notification(
        pool,
        &fx.learner.id,
        Some(&detail.plan.id),
        RiskLevel::Medium,
        &factors,
        today(),
    )
    .await
    .unwrap();
    assert!(for_plan.is_some());

    let next_day = notification::maybe_create_risk_notification(pool, &fx.learner.id, None, RiskLevel::High, &factors, days_from_today(1))
        .await
        .unwrap();
    assert!(next_day.is_some());

    assert_eq!(notification::list_notifications(pool, &fx.learner.id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn streak_notifications_only_fire_on_milestones() {
    let fx = setup().await;
    let pool = fx.pool();

    for streak in [1, 6, 8, 13] {
        let created = notification::create_streak_notification(pool, &fx.learner.id, streak, today())
            .await
            .unwrap();
        assert!(created.is_none(), "streak {streak} should not notify");
    }
    for streak in [14, 30] {
        notification::create_streak_notification(pool, &fx.learner.id, streak, today())
            .await
            .unwrap()
            .unwrap();
    }

    let notes = notification::list_notifications(pool, &fx.learner.id).await.unwrap();
    assert_eq!(notes.len(), 2);
    assert!(notes.iter().all(|n| n.notification_type == NotificationType::StreakAchievement));
    let mut titles: Vec<_> = notes.iter().map(|n| n.title.as_str()).collect();
    titles.sort_unstable();
    assert_eq!(titles, vec!["14-Day Streak!", "30-Day Streak!"]);
}

#[tokio::test]
async fn marking_read_is_scoped_to_the_owner() {
    let fx = setup().await;
    let pool = fx.pool();

    let mine = notification::create_streak_notification(pool, &fx.learner.id, 7, today())
        .await
        .unwrap()
        .unwrap();
    notification::create_streak_notification(pool, &fx.learner.id, 14, today())
        .await
        .unwrap();
    notification::create_streak_notification(pool, &fx.other.id, 7, today())
        .await
        .unwrap();

    assert_eq!(notification::unread_count(pool, &fx.learner.id).await.unwrap().count, 2);

    let err = notification::mark_read(pool, &fx.other.id, &mine).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    let read = notification::mark_read(pool, &fx.learner.id, &mine).await.unwrap();
    assert!(read.is_read);
    assert_eq!(notification::unread_count(pool, &fx.learner.id).await.unwrap().count, 1);

    assert_eq!(notification::mark_all_read(pool, &fx.learner.id).await.unwrap(), 1);
    assert_eq!(notification::mark_all_read(pool, &fx.learner.id).await.unwrap(), 0);
    assert_eq!(notification::unread_count(pool, &fx.learner.id).await.unwrap().count, 0);
    assert_eq!(notification::unread_count(pool, &fx.other.id).await.unwrap().count, 1);
}
