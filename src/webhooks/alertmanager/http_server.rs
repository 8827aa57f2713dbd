use super::AlertDispatcher;
use crate::observability::METRICS;
use actix_web::{web, HttpResponse, Responder};
use promwatch::models::WebhookPayload;

/// Receives an Alertmanager webhook notification. The body is parsed and
/// acknowledged right away; delivery to Telegram happens in the background.
pub async fn handle_alertmanager_webhook(
    body: web::Bytes,
    dispatcher: web::Data<AlertDispatcher>,
) -> impl Responder {
    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!("Rejected Alertmanager payload: {}", e);
            return HttpResponse::BadRequest().body(format!("invalid payload: {}", e));
        }
    };

    tracing::info!(
        receiver = payload.receiver.as_deref().unwrap_or("-"),
        status = %payload.status,
        "Received {} alert(s) from Alertmanager",
        payload.alerts.len()
    );
    METRICS.add_alerts_received(payload.alerts.len() as u64);

    dispatcher.into_inner().accept(payload.alerts);

    HttpResponse::Ok().body("OK")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::notifier::testing::RecordingNotifier;
    use actix_web::http::{header::ContentType, StatusCode};
    use actix_web::{test, App};
    use promwatch::UserRegistry;
    use std::sync::Arc;
    use std::time::Duration;

    const TWO_ALERTS: &str = r#"{
        "version": "4",
        "status": "firing",
        "receiver": "telegram",
        "alerts": [
            {"status": "firing", "labels": {"alertname": "HighCPU", "severity": "critical"}, "annotations": {}},
            {"status": "resolved", "labels": {"alertname": "DiskFull"}, "annotations": {}}
        ]
    }"#;

    fn app_state(users: &[i64], notifier: Arc<RecordingNotifier>) -> web::Data<AlertDispatcher> {
        let registry = Arc::new(UserRegistry::new(users.iter().copied()));
        web::Data::new(AlertDispatcher::new(registry, notifier, None))
    }

    #[actix_web::test]
    async fn test_valid_payload_is_accepted_and_fanned_out() {
        let notifier = Arc::new(RecordingNotifier::failing_for(&[20]));
        let app = test::init_service(
            App::new()
                .app_data(app_state(&[10, 20, 30], notifier.clone()))
                .route("/alerts", web::post().to(handle_alertmanager_webhook)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/alerts")
            .insert_header(ContentType::json())
            .set_payload(TWO_ALERTS)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(notifier.calls().len(), 6);
    }

    #[actix_web::test]
    async fn test_malformed_payload_is_rejected() {
        let notifier = Arc::new(RecordingNotifier::default());
        let app = test::init_service(
            App::new()
                .app_data(app_state(&[10], notifier.clone()))
                .route("/alerts", web::post().to(handle_alertmanager_webhook)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/alerts")
            .set_payload("{not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(notifier.calls().is_empty());
    }

    #[actix_web::test]
    async fn test_empty_alert_list_is_ok() {
        let notifier = Arc::new(RecordingNotifier::default());
        let app = test::init_service(
            App::new()
                .app_data(app_state(&[10], notifier.clone()))
                .route("/alerts", web::post().to(handle_alertmanager_webhook)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/alerts")
            .set_payload(r#"{"status":"resolved","alerts":[]}"#)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(notifier.calls().is_empty());
    }
}
