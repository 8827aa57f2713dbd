use crate::observability::METRICS;
use crate::webhooks::alertmanager::http_server::handle_alertmanager_webhook;
use crate::webhooks::alertmanager::AlertDispatcher;
use actix_web::{get, middleware, web, App, HttpResponse, HttpServer, Responder};

pub async fn run_http_server(
    port: u16,
    webhook_path: String,
    dispatcher: web::Data<AlertDispatcher>,
) -> std::io::Result<()> {
    tracing::info!(
        "Starting HTTP server on port {}, Alertmanager webhook at {}",
        port,
        webhook_path
    );

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(dispatcher.clone())
            .service(health)
            .service(stats)
            .service(
                web::resource(webhook_path.as_str())
                    .route(web::post().to(handle_alertmanager_webhook)),
            )
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

#[get("/health")]
async fn health() -> impl Responder {
    tracing::debug!("Health check");
    "I'm ok"
}

#[get("/stats")]
async fn stats() -> impl Responder {
    HttpResponse::Ok().json(METRICS.snapshot())
}
