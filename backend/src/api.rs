use actix_cors::Cors;
use actix_web::{
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    get,
    http::{
        header::{self, ContentType, HeaderName},
        Method, StatusCode,
    },
    middleware::{from_fn, Logger, Next},
    post, route,
    web::{self, Data},
    App, Error, HttpRequest, HttpResponse, HttpServer, Responder,
};
use chrono::Utc;
use common::req::{ErrorResponse, IngestResponse};
use log::info;

use crate::{
    config::Config,
    error::ApiError,
    ingest::{self, IngestSettings, Submission},
    req::{form_fields, header_api_key, peer_ip, Params},
    state,
    store::Store,
};

const INDEX: &str = "medbot telemetry\n\
    POST /receive        ingest a reading (t, h, device, rssi, brand, api_key)\n\
    GET  /?json=1        latest reading\n\
    GET  /?log=1&after=N event log from byte offset N\n\
    GET  /state          shared flags\n\
    POST /state          update mode / reset_finish\n";

/// Byte offset from the `after` parameter, read like an integer prefix:
/// `12abc` is 12, garbage and negatives are 0 and values too large for a
/// `u64` saturate.
fn parse_offset(after: Option<&str>) -> u64 {
    let after = after.unwrap_or_default().trim();
    let (negative, rest) = match after.as_bytes().first() {
        Some(b'-') => (true, &after[1..]),
        Some(b'+') => (false, &after[1..]),
        _ => (false, after),
    };
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if negative || digits == 0 {
        return 0;
    }
    rest[..digits].parse().unwrap_or(u64::MAX)
}

#[get("/")]
async fn dashboard(req: HttpRequest, store: Data<Store>) -> Result<HttpResponse, ApiError> {
    // repeated keys resolve to the last value instead of rejecting the request
    let query = form_fields(req.query_string());

    if query.contains_key("json") {
        let res = match store.latest.load_raw().map_err(ApiError::ReadFailed)? {
            Some(bytes) => HttpResponse::Ok()
                .content_type(ContentType::json())
                .body(bytes),
            None => HttpResponse::Ok().json(ErrorResponse::new("no data yet")),
        };
        return Ok(res);
    }

    if query.contains_key("log") {
        let chunk = store
            .log
            .tail(parse_offset(query.get("after").and_then(|v| v.as_str())))
            .map_err(ApiError::ReadFailed)?;
        return Ok(HttpResponse::Ok().json(chunk));
    }

    Ok(HttpResponse::Ok()
        .content_type(ContentType::plaintext())
        .body(INDEX))
}

#[route("/receive", method = "GET", method = "POST")]
async fn receive(
    req: HttpRequest,
    body: web::Bytes,
    store: Data<Store>,
    settings: Data<IngestSettings>,
) -> Result<impl Responder, ApiError> {
    let params = Params::from_request(&req, &body);
    let peer = peer_ip(&req);
    let submission = Submission {
        header_key: header_api_key(&req),
        params: &params,
        peer: &peer,
    };

    let saved = ingest::accept(&store, &settings, &submission, Utc::now())?;
    Ok(web::Json(IngestResponse { ok: true, saved }))
}

#[get("/state")]
async fn state_get(store: Data<Store>) -> impl Responder {
    web::Json(state::observe(&store, Utc::now()))
}

#[post("/state")]
async fn state_post(
    req: HttpRequest,
    body: web::Bytes,
    store: Data<Store>,
) -> Result<impl Responder, ApiError> {
    let params = Params::from_body(&body);
    let state = state::update(&store, &params, &peer_ip(&req), Utc::now())?;
    Ok(web::Json(state))
}

/// Plain `OPTIONS` requests get an empty 204. CORS preflights are answered
/// by [`cors`] with a 200, rewritten to 204 here.
async fn options_no_content(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    if req.method() != Method::OPTIONS {
        return next.call(req).await.map(|res| res.map_into_left_body());
    }
    if !req.headers().contains_key(header::ACCESS_CONTROL_REQUEST_METHOD) {
        let res = req.into_response(HttpResponse::NoContent().finish());
        return Ok(res.map_into_right_body());
    }

    let mut res = next.call(req).await?;
    if res.status() == StatusCode::OK {
        *res.response_mut().status_mut() = StatusCode::NO_CONTENT;
    }
    Ok(res.map_into_left_body())
}

pub fn cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .send_wildcard()
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![header::CONTENT_TYPE, HeaderName::from_static("x-api-key")])
        .max_age(3600)
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(dashboard)
        .service(receive)
        .service(state_get)
        .service(state_post);
}

pub async fn new_http_server(config: Config, store: Store) -> std::io::Result<()> {
    let store = Data::new(store);
    let settings = Data::new(config.ingest.clone());

    info!("Listening on http://{}", config.bind);
    HttpServer::new(move || {
        App::new()
            .app_data(store.clone())
            .app_data(settings.clone())
            .configure(routes)
            .wrap(cors())
            .wrap(from_fn(options_no_content))
            .wrap(Logger::default())
    })
    .bind(config.bind.as_str())?
    .run()
    .await
}
