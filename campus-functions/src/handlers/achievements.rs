//! Achievement threshold checks.
//!
//! The caller reports what just happened. The event is counted first, then
//! the new totals are checked against fixed thresholds. Already-earned
//! achievements are skipped, and the store's uniqueness key catches
//! concurrent duplicates that slip past the pre-check. A completed course
//! that names its course id also gets its certificate, once per user.

use campus_realtime::ChangeKind;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::FunctionError;
use crate::notify::{announce_notification, ChangeNotifier};
use crate::store::{
    AchievementRecord, ActivityCounts, ActivityKind, CertificateRecord, InsertOutcome,
    NotificationKind, NotificationRecord, Store,
};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ActivityEvent {
    QuizCompleted {
        percentage: f64,
    },
    LessonCompleted,
    CourseCompleted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        course_id: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckAchievementsResponse {
    pub new_achievements: Vec<AchievementRecord>,
    /// Set for `course_completed` events that carry a course id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<CertificateRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Threshold {
    Lessons(u32),
    Courses(u32),
    Quizzes(u32),
    PerfectScore,
}

/// A fixed achievement and the condition that unlocks it.
#[derive(Debug, Clone, Copy)]
pub struct AchievementDef {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    threshold: Threshold,
}

pub const ACHIEVEMENTS: &[AchievementDef] = &[
    AchievementDef {
        id: "first_lesson",
        title: "First Steps",
        description: "Completed your first lesson",
        threshold: Threshold::Lessons(1),
    },
    AchievementDef {
        id: "dedicated_learner",
        title: "Dedicated Learner",
        description: "Completed 10 lessons",
        threshold: Threshold::Lessons(10),
    },
    AchievementDef {
        id: "first_course",
        title: "Course Graduate",
        description: "Completed your first course",
        threshold: Threshold::Courses(1),
    },
    AchievementDef {
        id: "course_collector",
        title: "Course Collector",
        description: "Completed 5 courses",
        threshold: Threshold::Courses(5),
    },
    AchievementDef {
        id: "first_perfect_score",
        title: "Perfectionist",
        description: "Scored 100% on a quiz",
        threshold: Threshold::PerfectScore,
    },
    AchievementDef {
        id: "quiz_master",
        title: "Quiz Master",
        description: "Completed 10 quizzes",
        threshold: Threshold::Quizzes(10),
    },
];

impl ActivityEvent {
    fn validate(&self) -> Result<(), FunctionError> {
        match self {
            ActivityEvent::QuizCompleted { percentage } if !(0.0..=100.0).contains(percentage) => {
                Err(FunctionError::validation("percentage must be between 0 and 100"))
            }
            ActivityEvent::CourseCompleted { course_id: Some(id) } if id.trim().is_empty() => {
                Err(FunctionError::validation("course_id must not be empty"))
            }
            _ => Ok(()),
        }
    }

    /// The counter this event advances.
    pub fn kind(&self) -> ActivityKind {
        match self {
            ActivityEvent::QuizCompleted { .. } => ActivityKind::Quiz,
            ActivityEvent::LessonCompleted => ActivityKind::Lesson,
            ActivityEvent::CourseCompleted { .. } => ActivityKind::Course,
        }
    }

    /// Achievements this event can unlock given the current counts.
    pub fn qualifying(&self, counts: &ActivityCounts) -> Vec<&'static AchievementDef> {
        ACHIEVEMENTS
            .iter()
            .filter(|def| match (self, def.threshold) {
                (ActivityEvent::LessonCompleted, Threshold::Lessons(n)) => {
                    counts.lessons_completed >= n
                }
                (ActivityEvent::CourseCompleted { .. }, Threshold::Courses(n)) => {
                    counts.courses_completed >= n
                }
                (ActivityEvent::QuizCompleted { .. }, Threshold::Quizzes(n)) => {
                    counts.quizzes_completed >= n
                }
                (ActivityEvent::QuizCompleted { percentage }, Threshold::PerfectScore) => {
                    *percentage >= 100.0
                }
                _ => false,
            })
            .collect()
    }
}

pub async fn check_achievements(
    store: &dyn Store,
    notifier: &Arc<dyn ChangeNotifier>,
    user: &AuthUser,
    event: ActivityEvent,
) -> Result<CheckAchievementsResponse, FunctionError> {
    event.validate()?;

    let counts = store.record_activity(&user.user_id, event.kind()).await?;
    let earned: HashSet<String> = store
        .list_achievements(&user.user_id)
        .await?
        .into_iter()
        .map(|a| a.achievement_id)
        .collect();

    let mut new_achievements = Vec::new();
    for def in event.qualifying(&counts) {
        if earned.contains(def.id) {
            continue;
        }

        let record = AchievementRecord {
            id: Uuid::new_v4(),
            user_id: user.user_id.clone(),
            achievement_id: def.id.to_string(),
            title: def.title.to_string(),
            description: def.description.to_string(),
            earned_at: Utc::now(),
        };
        if store.insert_achievement(&record).await? == InsertOutcome::AlreadyExists {
            log::debug!("{} already holds {} (concurrent check)", user.user_id, def.id);
            continue;
        }
        log::info!("{} unlocked {}", user.user_id, def.id);
        notify_unlocked(store, notifier, &user.user_id, def).await;
        new_achievements.push(record);
    }

    let certificate = match &event {
        ActivityEvent::CourseCompleted {
            course_id: Some(course_id),
        } => Some(issue_certificate(store, &user.user_id, course_id).await?),
        _ => None,
    };

    Ok(CheckAchievementsResponse {
        new_achievements,
        certificate,
    })
}

/// The achievement row is already written, so a failed notification is
/// logged and the award still reported.
async fn notify_unlocked(
    store: &dyn Store,
    notifier: &Arc<dyn ChangeNotifier>,
    user_id: &str,
    def: &AchievementDef,
) {
    let notification = NotificationRecord::new(
        user_id,
        format!("Achievement unlocked: {}", def.title),
        def.description,
        NotificationKind::Achievement,
    )
    .with_link("/achievements");

    match store.insert_notification(&notification).await {
        Ok(()) => announce_notification(notifier, ChangeKind::Insert, &notification).await,
        Err(e) => log::error!("Failed to store {} notification for {user_id}: {e}", def.id),
    }
}

async fn issue_certificate(
    store: &dyn Store,
    user_id: &str,
    course_id: &str,
) -> Result<CertificateRecord, FunctionError> {
    let candidate = CertificateRecord::new(user_id, course_id, verification_code());
    let certificate = store.issue_certificate(&candidate).await?;
    if certificate.id == candidate.id {
        log::info!("Issued certificate {} to {user_id} for {course_id}", certificate.id);
    }
    Ok(certificate)
}

/// `CERT-` plus twelve uppercase hex digits.
fn verification_code() -> String {
    let digits: String = Uuid::new_v4().simple().to_string().chars().take(12).collect();
    format!("CERT-{}", digits.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;
    use crate::store::{MemoryStore, StoreError};
    use async_trait::async_trait;
    use chrono::DateTime;

    /// Delegates to a memory store but cannot write notifications.
    struct NotificationsDown(MemoryStore);

    #[async_trait]
    impl Store for NotificationsDown {
        async fn insert_notification(&self, _record: &NotificationRecord) -> Result<(), StoreError> {
            Err(StoreError::Database("notifications unavailable".into()))
        }

        async fn list_notifications(&self, user_id: &str) -> Result<Vec<NotificationRecord>, StoreError> {
            self.0.list_notifications(user_id).await
        }

        async fn mark_notification_read(
            &self,
            user_id: &str,
            id: Uuid,
        ) -> Result<Option<NotificationRecord>, StoreError> {
            self.0.mark_notification_read(user_id, id).await
        }

        async fn list_achievements(&self, user_id: &str) -> Result<Vec<AchievementRecord>, StoreError> {
            self.0.list_achievements(user_id).await
        }

        async fn insert_achievement(&self, record: &AchievementRecord) -> Result<InsertOutcome, StoreError> {
            self.0.insert_achievement(record).await
        }

        async fn activity_counts(&self, user_id: &str) -> Result<ActivityCounts, StoreError> {
            self.0.activity_counts(user_id).await
        }

        async fn record_activity(&self, user_id: &str, kind: ActivityKind) -> Result<ActivityCounts, StoreError> {
            self.0.record_activity(user_id, kind).await
        }

        async fn issue_certificate(&self, record: &CertificateRecord) -> Result<CertificateRecord, StoreError> {
            self.0.issue_certificate(record).await
        }

        async fn get_certificate(&self, id: Uuid) -> Result<Option<CertificateRecord>, StoreError> {
            self.0.get_certificate(id).await
        }

        async fn set_certificate_fingerprint(
            &self,
            id: Uuid,
            hash: &str,
            at: DateTime<Utc>,
        ) -> Result<Option<CertificateRecord>, StoreError> {
            self.0.set_certificate_fingerprint(id, hash, at).await
        }
    }

    fn user() -> AuthUser {
        AuthUser {
            user_id: "u1".into(),
        }
    }

    fn setup() -> (MemoryStore, Arc<RecordingNotifier>, Arc<dyn ChangeNotifier>) {
        let recorder = Arc::new(RecordingNotifier::new());
        let notifier: Arc<dyn ChangeNotifier> = recorder.clone();
        (MemoryStore::new(), recorder, notifier)
    }

    fn course(course_id: Option<&str>) -> ActivityEvent {
        ActivityEvent::CourseCompleted {
            course_id: course_id.map(str::to_string),
        }
    }

    fn ids(response: &CheckAchievementsResponse) -> Vec<&str> {
        response
            .new_achievements
            .iter()
            .map(|a| a.achievement_id.as_str())
            .collect()
    }

    #[tokio::test]
    async fn test_perfect_score_once() {
        let (store, recorder, notifier) = setup();
        let event = ActivityEvent::QuizCompleted { percentage: 100.0 };

        let first = check_achievements(&store, &notifier, &user(), event.clone()).await.unwrap();
        assert_eq!(ids(&first), vec!["first_perfect_score"]);

        let second = check_achievements(&store, &notifier, &user(), event).await.unwrap();
        assert!(second.new_achievements.is_empty());

        assert_eq!(store.list_achievements("u1").await.unwrap().len(), 1);
        let notifications = store.list_notifications("u1").await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, NotificationKind::Achievement);
        assert_eq!(recorder.published().len(), 1);
        assert_eq!(recorder.published()[0].0, "notifications:u1");
    }

    #[tokio::test]
    async fn test_events_are_counted() {
        let (store, _recorder, notifier) = setup();
        let first = check_achievements(&store, &notifier, &user(), ActivityEvent::LessonCompleted)
            .await
            .unwrap();
        assert_eq!(ids(&first), vec!["first_lesson"]);

        for _ in 0..8 {
            let response = check_achievements(&store, &notifier, &user(), ActivityEvent::LessonCompleted)
                .await
                .unwrap();
            assert!(response.new_achievements.is_empty());
        }
        let tenth = check_achievements(&store, &notifier, &user(), ActivityEvent::LessonCompleted)
            .await
            .unwrap();
        assert_eq!(ids(&tenth), vec!["dedicated_learner"]);
        assert_eq!(store.activity_counts("u1").await.unwrap().lessons_completed, 10);
    }

    #[tokio::test]
    async fn test_event_only_checks_its_own_thresholds() {
        let (store, _recorder, notifier) = setup();
        let response = check_achievements(&store, &notifier, &user(), course(None))
            .await
            .unwrap();
        assert_eq!(ids(&response), vec!["first_course"]);
        assert!(response.certificate.is_none());

        // A lesson event does not award course achievements
        let response = check_achievements(&store, &notifier, &user(), ActivityEvent::LessonCompleted)
            .await
            .unwrap();
        assert_eq!(ids(&response), vec!["first_lesson"]);
    }

    #[tokio::test]
    async fn test_quiz_master_needs_ten_quizzes() {
        let (store, _recorder, notifier) = setup();
        let event = ActivityEvent::QuizCompleted { percentage: 80.0 };
        for _ in 0..9 {
            assert!(check_achievements(&store, &notifier, &user(), event.clone())
                .await
                .unwrap()
                .new_achievements
                .is_empty());
        }

        let response = check_achievements(&store, &notifier, &user(), event).await.unwrap();
        assert_eq!(ids(&response), vec!["quiz_master"]);
    }

    #[tokio::test]
    async fn test_course_completion_issues_one_certificate() {
        let (store, _recorder, notifier) = setup();
        let first = check_achievements(&store, &notifier, &user(), course(Some("rust-101")))
            .await
            .unwrap()
            .certificate
            .unwrap();
        assert_eq!(first.user_id, "u1");
        assert_eq!(first.course_id, "rust-101");
        assert!(first.verification_code.starts_with("CERT-"));
        assert_eq!(first.verification_code.len(), 17);

        let again = check_achievements(&store, &notifier, &user(), course(Some("rust-101")))
            .await
            .unwrap()
            .certificate
            .unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(store.get_certificate(first.id).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_blank_course_id_rejected() {
        let (store, _recorder, notifier) = setup();
        let result = check_achievements(&store, &notifier, &user(), course(Some("  "))).await;
        assert!(matches!(result, Err(FunctionError::Validation(_))));
        assert_eq!(store.activity_counts("u1").await.unwrap(), ActivityCounts::default());
    }

    #[tokio::test]
    async fn test_failed_notification_still_reports_award() {
        let (_store, recorder, notifier) = setup();
        let store = NotificationsDown(MemoryStore::new());

        let response = check_achievements(&store, &notifier, &user(), ActivityEvent::LessonCompleted)
            .await
            .unwrap();
        assert_eq!(ids(&response), vec!["first_lesson"]);
        assert_eq!(store.0.list_achievements("u1").await.unwrap().len(), 1);
        assert!(recorder.published().is_empty());
    }

    #[tokio::test]
    async fn test_percentage_out_of_range() {
        let (store, _recorder, notifier) = setup();
        let result = check_achievements(
            &store,
            &notifier,
            &user(),
            ActivityEvent::QuizCompleted { percentage: 101.0 },
        )
        .await;
        assert!(matches!(result, Err(FunctionError::Validation(_))));
    }

    #[test]
    fn test_event_wire_format() {
        let event: ActivityEvent =
            serde_json::from_str(r#"{"event":"quiz_completed","percentage":100}"#).unwrap();
        assert_eq!(event, ActivityEvent::QuizCompleted { percentage: 100.0 });
        let event: ActivityEvent = serde_json::from_str(r#"{"event":"lesson_completed"}"#).unwrap();
        assert_eq!(event, ActivityEvent::LessonCompleted);
        let event: ActivityEvent = serde_json::from_str(r#"{"event":"course_completed"}"#).unwrap();
        assert_eq!(event, ActivityEvent::CourseCompleted { course_id: None });
    }
}
