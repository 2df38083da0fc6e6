use crate::{
    config::AppConfig,
    error::ImagenioError,
    handler::{generate_captioned_images, resolve_request},
    logger,
    providers::ModelClients,
};
use actix_web::{
    http::{header, Method, StatusCode},
    web, App, HttpRequest, HttpResponse, HttpServer,
};
use serde_json::Value;
use std::collections::HashMap;

fn preflight() -> HttpResponse {
    HttpResponse::NoContent()
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .insert_header((header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST"))
        .insert_header((header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"))
        .insert_header((header::ACCESS_CONTROL_MAX_AGE, "3600"))
        .finish()
}

fn error_response(err: &ImagenioError) -> HttpResponse {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    HttpResponse::build(status)
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .content_type("text/plain; charset=utf-8")
        .body(err.public_message())
}

fn parse_query(req: &HttpRequest) -> HashMap<String, String> {
    web::Query::<HashMap<String, String>>::from_query(req.query_string())
        .map(|q| q.into_inner())
        .unwrap_or_default()
}

/// Body JSON is optional; anything that is not valid JSON is ignored.
fn parse_body(body: &[u8]) -> Option<Value> {
    if body.is_empty() {
        return None;
    }
    serde_json::from_slice(body).ok()
}

async fn generate(req: &HttpRequest, body: &[u8], clients: &ModelClients) -> HttpResponse {
    let _timer = logger::timer(&format!("{} {}", req.method(), req.path()));

    let query = parse_query(req);
    let body = parse_body(body);

    let request = match resolve_request(body.as_ref(), &query, clients.limits().max_image_count) {
        Ok(request) => request,
        Err(err) => {
            log::warn!("Rejected request: {}", err);
            return error_response(&err);
        }
    };

    log::info!(
        "Generating {} image(s) for prompt {:?}",
        request.image_count,
        request.image_prompt
    );

    match generate_captioned_images(clients, &request).await {
        Ok(items) => HttpResponse::Ok()
            .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
            .json(items),
        Err(err) => {
            if err.status_code() >= 500 {
                log::error!("Request failed: {}", err);
            } else {
                log::warn!("Rejected request: {}", err);
            }
            error_response(&err)
        }
    }
}

/// Single entry point for every path and method.
pub async fn dispatch(
    req: HttpRequest,
    body: web::Bytes,
    clients: web::Data<ModelClients>,
) -> HttpResponse {
    let method = req.method().clone();
    if method == Method::OPTIONS {
        return preflight();
    }
    if method != Method::GET && method != Method::POST {
        return HttpResponse::MethodNotAllowed()
            .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
            .insert_header((header::ALLOW, "GET, POST, OPTIONS"))
            .finish();
    }

    logger::with_request_id(logger::new_request_id(), async {
        generate(&req, &body, &clients).await
    })
    .await
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.default_service(web::to(dispatch));
}

pub async fn run(config: &AppConfig, clients: ModelClients) -> std::io::Result<()> {
    let clients = web::Data::new(clients);

    HttpServer::new(move || App::new().app_data(clients.clone()).configure(configure))
        .bind((config.host.as_str(), config.port))?
        .run()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::GenerationLimits,
        providers::{MockCaptionProvider, MockImageProvider},
    };
    use actix_web::{body::to_bytes, test};
    use std::sync::Arc;

    fn clients(image: Arc<MockImageProvider>, caption: Arc<MockCaptionProvider>) -> web::Data<ModelClients> {
        web::Data::new(ModelClients::from_providers(
            image,
            caption,
            GenerationLimits::default(),
        ))
    }

    #[actix_web::test]
    async fn test_options_preflight() {
        let image = Arc::new(MockImageProvider::new());
        let app = test::init_service(
            App::new()
                .app_data(clients(image.clone(), Arc::new(MockCaptionProvider::new())))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::default()
            .method(Method::OPTIONS)
            .uri("/?image_count=9")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        let headers = resp.headers();
        assert_eq!(headers.get("Access-Control-Allow-Origin").unwrap(), "*");
        assert_eq!(headers.get("Access-Control-Allow-Methods").unwrap(), "GET, POST");
        assert_eq!(headers.get("Access-Control-Allow-Headers").unwrap(), "Content-Type");
        assert_eq!(headers.get("Access-Control-Max-Age").unwrap(), "3600");
        let body = to_bytes(resp.into_body()).await.unwrap();
        assert!(body.is_empty());
        assert_eq!(image.calls(), 0);
    }

    #[actix_web::test]
    async fn test_too_many_images_is_406_without_provider_calls() {
        let image = Arc::new(MockImageProvider::new());
        let caption = Arc::new(MockCaptionProvider::new());
        let app = test::init_service(
            App::new()
                .app_data(clients(image.clone(), caption.clone()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/?image_count=6").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::NOT_ACCEPTABLE);
        let body = to_bytes(resp.into_body()).await.unwrap();
        assert_eq!(body, "Invalid image_count. Maximum image count is 5.");
        assert_eq!(image.calls(), 0);
        assert!(caption.calls().is_empty());
    }

    #[actix_web::test]
    async fn test_post_json_end_to_end() {
        let image = Arc::new(MockImageProvider::new());
        let caption = Arc::new(MockCaptionProvider::with_reply(
            "```json\n[{\"title\":\"Balloon\",\"info\":\"A red balloon.\"},{\"title\":\"Sky\",\"info\":\"It floats away.\"}]\n```",
        ));
        let app = test::init_service(
            App::new()
                .app_data(clients(image.clone(), caption.clone()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/")
            .set_json(serde_json::json!({"image_prompt": "a red balloon", "image_count": 2}))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("Access-Control-Allow-Origin").unwrap(),
            "*"
        );
        let items: Vec<Value> = test::read_body_json(resp).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["title"], "Balloon");
        assert_eq!(items[0]["caption"], "A red balloon.");
        assert_eq!(items[1]["title"], "Sky");
        for item in &items {
            assert!(!item["image"].as_str().unwrap().is_empty());
        }
        assert_eq!(image.requests(), vec![2]);
    }

    #[actix_web::test]
    async fn test_caption_garbage_is_generic_500() {
        let app = test::init_service(
            App::new()
                .app_data(clients(
                    Arc::new(MockImageProvider::new()),
                    Arc::new(MockCaptionProvider::with_reply("not json")),
                ))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(resp.into_body()).await.unwrap();
        assert_eq!(body, "Internal server error");
    }

    #[actix_web::test]
    async fn test_provider_failure_does_not_leak_details() {
        let app = test::init_service(
            App::new()
                .app_data(clients(
                    Arc::new(MockImageProvider::failing("quota exceeded for project imagenio")),
                    Arc::new(MockCaptionProvider::new()),
                ))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/?image_count=2").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(resp.into_body()).await.unwrap();
        assert!(!String::from_utf8_lossy(&body).contains("quota"));
    }

    #[actix_web::test]
    async fn test_unsupported_method() {
        let app = test::init_service(
            App::new()
                .app_data(clients(
                    Arc::new(MockImageProvider::new()),
                    Arc::new(MockCaptionProvider::new()),
                ))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::delete().uri("/").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            resp.headers().get("Access-Control-Allow-Origin").unwrap(),
            "*"
        );
    }

    #[actix_web::test]
    async fn test_caption_failure_does_not_leak_details() {
        let image = Arc::new(MockImageProvider::new());
        let caption = Arc::new(MockCaptionProvider::failing("safety block: internal detail"));
        let app = test::init_service(
            App::new()
                .app_data(clients(image.clone(), caption.clone()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/?image_count=2").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(resp.into_body()).await.unwrap();
        assert_eq!(body, "Internal server error");
        assert!(!String::from_utf8_lossy(&body).contains("internal detail"));
        assert_eq!(image.requests(), vec![2]);
        assert_eq!(caption.calls().len(), 1);
    }
}
