use super::*;
use crate::queue::store::contract::entry;
use shared::models::NotificationType;

#[tokio::test]
async fn test_expiration_sweep() {
    let h = harness().await;
    let now = now_millis();
    let mut stale = entry("r1", "stale", 1, QueueStatus::Waiting);
    stale.joined_at = now - 121 * MINUTE_MILLIS;
    let mut called = entry("r1", "called", 2, QueueStatus::Called);
    called.joined_at = now - 200 * MINUTE_MILLIS;
    called.called_at = Some(now - MINUTE_MILLIS);
    let mut fresh = entry("r1", "fresh", 3, QueueStatus::Waiting);
    fresh.joined_at = now - 10 * MINUTE_MILLIS;
    h.seed(vec![stale, called, fresh]).await;

    let mut feed = h.broadcaster.subscribe_restaurant("r1");
    let expired = h.manager.expire_due("r1").await.unwrap();
    assert_eq!(expired, vec!["stale".to_string()]);

    let stored = h.store().get_entry("stale").await.unwrap().unwrap();
    assert_eq!(stored.status, QueueStatus::Expired);
    assert!(stored.expired_at.is_some());
    // CALLED entries never expire
    assert_eq!(
        h.active_positions("r1").await,
        vec![("guest-called".to_string(), 1), ("guest-fresh".to_string(), 2)]
    );

    let event = next_event_of(&mut feed, QueueEventType::Expired).await;
    assert_eq!(event.queue_entry_id.as_deref(), Some("stale"));

    // Second sweep finds nothing
    assert!(h.manager.expire_due("r1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reminder_sent_once() {
    let h = harness().await;
    let now = now_millis();
    let mut late = entry("r1", "late", 1, QueueStatus::Called);
    late.called_at = Some(now - 6 * MINUTE_MILLIS);
    late.phone_number = Some("+100".into());
    late.notify.sms = true;
    h.seed(vec![late]).await;

    assert_eq!(h.manager.remind_due("r1").await.unwrap(), vec!["late".to_string()]);
    assert!(h.manager.remind_due("r1").await.unwrap().is_empty());

    let records = h.manager.list_notifications("late").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].notification_type, NotificationType::Reminder);
}

#[tokio::test]
async fn test_notifications_follow_lifecycle() {
    let mut h = harness().await;
    let a = h
        .manager
        .join_queue("r1", sms_guest("Ana", "+34600111222"))
        .await
        .unwrap();
    let b = h
        .manager
        .join_queue("r1", sms_guest("Ben", "+34600333444"))
        .await
        .unwrap();
    // Opted out of every channel: no records
    let c = h.manager.join_queue("r1", guest("Cy", 2)).await.unwrap();

    h.manager.call_next("r1", None).await.unwrap();
    h.manager.mark_seated(&a.queue_entry.id, None).await.unwrap();
    h.manager.leave_queue(&b.queue_entry.id, None).await.unwrap();

    let types = |records: Vec<QueueNotification>| -> Vec<NotificationType> {
        records.into_iter().map(|r| r.notification_type).collect()
    };
    assert_eq!(
        types(h.manager.list_notifications(&a.queue_entry.id).await.unwrap()),
        vec![NotificationType::Joined, NotificationType::Ready]
    );
    assert_eq!(
        types(h.manager.list_notifications(&b.queue_entry.id).await.unwrap()),
        vec![
            NotificationType::Joined,
            NotificationType::PositionUpdate,
            NotificationType::Cancelled
        ]
    );
    assert!(
        h.manager
            .list_notifications(&c.queue_entry.id)
            .await
            .unwrap()
            .is_empty()
    );

    // Records were handed to the dispatcher after commit
    let first = h.channels.notification_rx.recv().await.unwrap();
    assert_eq!(first.queue_entry_id, a.queue_entry.id);
    assert_eq!(first.delivery_status, DeliveryStatus::Pending);

    let err = h.manager.list_notifications("missing").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::QueueEntryNotFound);
}

#[tokio::test]
async fn test_almost_ready_fires_on_crossing() {
    let h = harness().await;
    let mut ids = Vec::new();
    for i in 0..5 {
        let resp = h
            .manager
            .join_queue("r1", sms_guest(&format!("g{i}"), &format!("+1000{i}")))
            .await
            .unwrap();
        ids.push(resp.queue_entry.id);
    }

    // g3 moves 4 -> 3 (crosses), g4 moves 5 -> 4 (does not)
    h.manager.leave_queue(&ids[0], None).await.unwrap();

    let g3 = h.manager.list_notifications(&ids[3]).await.unwrap();
    assert!(
        g3.iter()
            .any(|r| r.notification_type == NotificationType::AlmostReady)
    );
    let g4 = h.manager.list_notifications(&ids[4]).await.unwrap();
    assert!(
        !g4.iter()
            .any(|r| r.notification_type == NotificationType::AlmostReady)
    );

    // g3 moves 3 -> 2: already inside the window, no second notice
    h.manager.leave_queue(&ids[1], None).await.unwrap();
    let almost = h
        .manager
        .list_notifications(&ids[3])
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.notification_type == NotificationType::AlmostReady)
        .count();
    assert_eq!(almost, 1);
}

#[tokio::test]
async fn test_notification_status_callback() {
    let h = harness().await;
    let a = h
        .manager
        .join_queue("r1", sms_guest("Ana", "+1555"))
        .await
        .unwrap();
    let record = h
        .manager
        .list_notifications(&a.queue_entry.id)
        .await
        .unwrap()
        .remove(0);

    let delivered = h
        .manager
        .update_notification_status(&record.id, DeliveryStatus::Delivered, None)
        .await
        .unwrap();
    assert_eq!(delivered.delivery_status, DeliveryStatus::Delivered);
    assert!(delivered.delivered_at.is_some());
    assert!(delivered.sent_at.is_some());

    let err = h
        .manager
        .update_notification_status(&record.id, DeliveryStatus::Failed, Some("bounced".into()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidRequest);

    let err = h
        .manager
        .update_notification_status("missing", DeliveryStatus::Sent, None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotificationNotFound);
}

#[tokio::test]
async fn test_settings_update_refreshes_estimates() {
    let h = harness().await;
    h.manager.join_queue("r1", guest("a", 2)).await.unwrap();
    let b = h.manager.join_queue("r1", guest("b", 2)).await.unwrap();
    assert_eq!(b.estimated_wait_minutes, 15);

    let mut feed = h.broadcaster.subscribe_restaurant("r1");
    let settings = h
        .manager
        .update_queue_settings(
            "r1",
            QueueSettingsUpdate {
                avg_wait_per_party: Some(10),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(settings.avg_wait_per_party, 10);
    assert!(settings.updated_at > 0);

    let status = h.manager.get_queue_status(&b.queue_entry.id).await.unwrap();
    assert_eq!(status.estimated_wait_minutes, 10);
    let event = next_event_of(&mut feed, QueueEventType::PositionUpdate).await;
    assert_eq!(event.data["estimated_wait_minutes"], 10);

    let err = h
        .manager
        .update_queue_settings(
            "r1",
            QueueSettingsUpdate {
                max_queue_size: Some(0),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationFailed);
    assert_eq!(h.manager.get_settings("r1").await.unwrap().max_queue_size, 50);
}

#[tokio::test]
async fn test_settings_created_on_first_update() {
    let h = harness().await;
    assert!(h.manager.get_settings("r2").await.is_err());
    let settings = h
        .manager
        .update_queue_settings(
            "r2",
            QueueSettingsUpdate {
                auto_call_enabled: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(settings.auto_call_enabled);
    assert_eq!(settings.max_queue_size, 50);
    h.manager.join_queue("r2", guest("a", 2)).await.unwrap();
}

#[tokio::test]
async fn test_settings_cannot_shrink_below_active_queue() {
    let h = harness().await;
    for name in ["a", "b", "c"] {
        h.manager.join_queue("r1", guest(name, 2)).await.unwrap();
    }
    let version = h.store().queue_version("r1").await.unwrap();

    let err = h
        .manager
        .update_queue_settings(
            "r1",
            QueueSettingsUpdate {
                max_queue_size: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationFailed);
    assert_eq!(h.manager.get_settings("r1").await.unwrap().max_queue_size, 50);
    assert_eq!(h.store().queue_version("r1").await.unwrap(), version);

    let settings = h
        .manager
        .update_queue_settings(
            "r1",
            QueueSettingsUpdate {
                max_queue_size: Some(3),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(settings.max_queue_size, 3);
    let err = h.manager.join_queue("r1", guest("d", 2)).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::QueueFull);
}

#[tokio::test]
async fn test_settings_update_gets_its_own_sequence() {
    let h = harness().await;
    h.manager.join_queue("r1", guest("a", 2)).await.unwrap();
    let before = h.store().queue_version("r1").await.unwrap();

    let mut feed = h.broadcaster.subscribe_restaurant("r1");
    // Estimates are unchanged, so only the settings themselves are written
    h.manager
        .update_queue_settings(
            "r1",
            QueueSettingsUpdate {
                auto_call_enabled: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let event = next_event_of(&mut feed, QueueEventType::QueueUpdate).await;
    assert_eq!(event.data["settings"]["auto_call_enabled"], true);
    assert_eq!(event.data["current_queue_size"], 1);
    assert_eq!(event.sequence, before + 1);
    assert_eq!(h.store().queue_version("r1").await.unwrap(), before + 1);
}

#[tokio::test]
async fn test_restaurant_queue_view() {
    let h = harness().await;
    let a = h.manager.join_queue("r1", guest("a", 2)).await.unwrap();
    h.manager.join_queue("r1", guest("b", 2)).await.unwrap();
    h.manager.join_queue("r1", guest("c", 2)).await.unwrap();
    h.manager.call_next("r1", None).await.unwrap();
    h.manager.leave_queue(&a.queue_entry.id, None).await.ok();

    let view = h.manager.get_restaurant_queue("r1", None).await.unwrap();
    assert_eq!(view.queue_entries.len(), 2);
    assert_eq!(view.total_waiting, 2);
    assert_eq!(view.total_called, 0);
    // Estimates 0 and 15
    assert!((view.avg_wait_time - 7.5).abs() < 1e-9);

    let cancelled = h
        .manager
        .get_restaurant_queue("r1", Some("cancelled"))
        .await
        .unwrap();
    assert_eq!(cancelled.queue_entries.len(), 1);
    assert_eq!(cancelled.total_waiting, 2);

    let err = h
        .manager
        .get_restaurant_queue("r1", Some("WAITING,LATE"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidRequest);
}

#[tokio::test]
async fn test_analytics_from_history() {
    let h = harness().await;
    let a = h.manager.join_queue("r1", guest("a", 2)).await.unwrap();
    let b = h.manager.join_queue("r1", guest("b", 2)).await.unwrap();
    h.manager.join_queue("r1", guest("c", 2)).await.unwrap();

    h.manager.call_next("r1", Some(2)).await.unwrap();
    h.manager.mark_seated(&a.queue_entry.id, None).await.unwrap();
    h.manager.mark_no_show(&b.queue_entry.id).await.unwrap();

    let report = h.manager.get_analytics("r1", None, None).await.unwrap();
    assert_eq!(report.total_entries, 2);
    assert_eq!(report.seated_count, 1);
    assert_eq!(report.no_show_count, 1);
    assert!((report.no_show_rate - 0.5).abs() < 1e-9);
    assert_eq!(report.peak_queue_size, 2);

    let err = h
        .manager
        .get_analytics("r1", Some(10), Some(5))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidRequest);
}

#[tokio::test]
async fn test_status_of_terminal_entry() {
    let h = harness().await;
    let a = h.manager.join_queue("r1", guest("a", 2)).await.unwrap();
    h.manager.call_next("r1", None).await.unwrap();
    let called = h.manager.get_queue_status(&a.queue_entry.id).await.unwrap();
    assert!(called.is_ready);
    assert_eq!(called.current_position, 1);

    h.manager.mark_seated(&a.queue_entry.id, None).await.unwrap();
    let done = h.manager.get_queue_status(&a.queue_entry.id).await.unwrap();
    assert!(!done.is_ready);
    assert_eq!(done.current_position, 0);
    assert_eq!(done.queue_entry.position, 1);
}
