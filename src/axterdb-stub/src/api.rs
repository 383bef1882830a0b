use actix_web::{web, HttpRequest, HttpResponse};
use axterdb_core::{
    Envelope, KeyData, KeyDetail, MeData, MeDetail, MessageDetail, Row, RowsDetail, TableSchema,
    TablesDetail,
};
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::state::StubState;
use crate::StubError;

type ApiResult = Result<HttpResponse, StubError>;

#[derive(Deserialize)]
pub struct TableQuery {
    pub table: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateKeyQuery {
    pub name: String,
    #[serde(default)]
    pub admin: Option<String>,
}

#[derive(Deserialize)]
pub struct DeleteKeyQuery {
    pub key: String,
}

fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|value| value.to_str().ok())
}

fn api_key(req: &HttpRequest) -> Result<&str, StubError> {
    header(req, "key").ok_or(StubError::Unauthorized)
}

fn table_header(req: &HttpRequest) -> Result<String, StubError> {
    header(req, "table")
        .filter(|table| !table.is_empty())
        .map(str::to_owned)
        .ok_or(StubError::MissingTable)
}

/// Count the request and apply any status forced for its path
fn intercept(state: &StubState, req: &HttpRequest) -> Result<(), StubError> {
    match state.record_request(req.path()) {
        Some(status) => Err(StubError::Forced(status)),
        None => Ok(()),
    }
}

/// Rows and filters travel as JSON bodies; an empty body is an empty row
fn parse_row(body: &[u8]) -> Result<Row, StubError> {
    if body.is_empty() {
        return Ok(Row::new());
    }
    serde_json::from_slice(body).map_err(|_| StubError::MissingRows)
}

/// Instance probe
/// GET /
pub async fn root(req: HttpRequest, state: web::Data<StubState>) -> ApiResult {
    intercept(&state, &req)?;
    Ok(HttpResponse::Ok().json(MessageDetail::envelope("AxterDB stub instance")))
}

/// Identity of the calling key
/// GET /me
pub async fn me(req: HttpRequest, state: web::Data<StubState>) -> ApiResult {
    intercept(&state, &req)?;
    let record = state.identify(api_key(&req)?)?;

    Ok(HttpResponse::Ok().json(Envelope::new(MeDetail {
        data: MeData {
            databases: record.databases,
            admin: Some(record.admin),
        },
    })))
}

/// Create a table
/// POST /database/{name}/create?table={table}
#[tracing::instrument(skip(path, query, body, req, state))]
pub async fn create_table(
    path: web::Path<String>,
    query: web::Query<TableQuery>,
    body: web::Bytes,
    req: HttpRequest,
    state: web::Data<StubState>,
) -> ApiResult {
    intercept(&state, &req)?;
    let db = path.into_inner();
    state.authorize(api_key(&req)?, &db)?;

    let table = query
        .into_inner()
        .table
        .filter(|table| !table.is_empty())
        .ok_or(StubError::MissingTable)?;
    let columns: BTreeMap<String, String> = serde_json::from_slice(&body).unwrap_or_default();
    if columns.is_empty() {
        return Err(StubError::MissingRows);
    }

    let schema = TableSchema::from_tags(columns)?;
    tracing::debug!(db = %db, table = %table, columns = schema.len(), "Creating table");
    state.create_table(&db, &table, schema)?;

    Ok(HttpResponse::Ok().json(MessageDetail::envelope(format!("{table} created"))))
}

/// Select rows matching the body's filters
/// GET /database/{name}/select
pub async fn select(
    path: web::Path<String>,
    body: web::Bytes,
    req: HttpRequest,
    state: web::Data<StubState>,
) -> ApiResult {
    intercept(&state, &req)?;
    let db = path.into_inner();
    state.authorize(api_key(&req)?, &db)?;

    let table = table_header(&req)?;
    let amount = header(&req, "amount").and_then(|amount| amount.parse::<usize>().ok());
    let filters = parse_row(&body)?;
    let rows = state.select(&db, &table, &filters, amount)?;

    Ok(HttpResponse::Ok().json(Envelope::new(RowsDetail { rows })))
}

/// Insert the body as a row
/// GET /database/{name}/insert
pub async fn insert(
    path: web::Path<String>,
    body: web::Bytes,
    req: HttpRequest,
    state: web::Data<StubState>,
) -> ApiResult {
    intercept(&state, &req)?;
    let db = path.into_inner();
    state.authorize(api_key(&req)?, &db)?;

    let table = table_header(&req)?;
    let row = parse_row(&body)?;
    if row.is_empty() {
        return Err(StubError::MissingRows);
    }
    state.insert(&db, &table, row)?;

    Ok(HttpResponse::Ok().json(MessageDetail::envelope("row inserted")))
}

/// Delete rows matching the body's filters
/// GET /database/{name}/delete
pub async fn delete(
    path: web::Path<String>,
    body: web::Bytes,
    req: HttpRequest,
    state: web::Data<StubState>,
) -> ApiResult {
    intercept(&state, &req)?;
    let db = path.into_inner();
    state.authorize(api_key(&req)?, &db)?;

    let table = table_header(&req)?;
    let filters = parse_row(&body)?;
    let removed = state.delete(&db, &table, &filters)?;

    Ok(HttpResponse::Ok().json(MessageDetail::envelope(format!("{removed} rows deleted"))))
}

/// Drop a table
/// GET /database/{name}/delete_table
pub async fn delete_table(
    path: web::Path<String>,
    req: HttpRequest,
    state: web::Data<StubState>,
) -> ApiResult {
    intercept(&state, &req)?;
    let db = path.into_inner();
    state.authorize(api_key(&req)?, &db)?;

    let table = table_header(&req)?;
    state.delete_table(&db, &table)?;

    Ok(HttpResponse::Ok().json(MessageDetail::envelope(format!("{table} deleted"))))
}

/// List tables, or check a single one when `?table=` is given
/// GET /database/{name}/get
pub async fn get_tables(
    path: web::Path<String>,
    query: web::Query<TableQuery>,
    req: HttpRequest,
    state: web::Data<StubState>,
) -> ApiResult {
    intercept(&state, &req)?;
    let db = path.into_inner();
    state.authorize(api_key(&req)?, &db)?;

    match query.into_inner().table {
        Some(table) if state.table_exists(&db, &table) => {
            Ok(HttpResponse::Ok().json(MessageDetail::envelope(format!("{table} exists"))))
        }
        Some(table) => Err(StubError::TableNotFound(table)),
        None => Ok(HttpResponse::Ok().json(Envelope::new(TablesDetail {
            tables: state.list_tables(&db),
        }))),
    }
}

/// Generate a key for a new user
/// POST /admin/keys/create?name={name}&admin={0|1}
pub async fn create_key(
    query: web::Query<CreateKeyQuery>,
    req: HttpRequest,
    state: web::Data<StubState>,
) -> ApiResult {
    intercept(&state, &req)?;
    let creator = state.authorize_admin(api_key(&req)?)?;

    let query = query.into_inner();
    let admin = query.admin.as_deref() == Some("1");
    let key = state.create_key(&creator, &query.name, admin);
    tracing::info!(user = %query.name, admin, "Key created");

    Ok(HttpResponse::Ok().json(Envelope::new(KeyDetail {
        data: KeyData { key },
    })))
}

/// Revoke a key
/// POST /admin/keys/delete?key={key}
pub async fn delete_key(
    query: web::Query<DeleteKeyQuery>,
    req: HttpRequest,
    state: web::Data<StubState>,
) -> ApiResult {
    intercept(&state, &req)?;
    state.authorize_admin(api_key(&req)?)?;
    state.delete_key(&query.key)?;

    Ok(HttpResponse::Ok().json(MessageDetail::envelope("key deleted")))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(root))
        .route("/me", web::get().to(me))
        .service(
            web::scope("/database/{name}")
                .route("/create", web::post().to(create_table))
                .route("/select", web::get().to(select))
                .route("/insert", web::get().to(insert))
                .route("/delete", web::get().to(delete))
                .route("/delete_table", web::get().to(delete_table))
                .route("/get", web::get().to(get_tables)),
        )
        .service(
            web::scope("/admin/keys")
                .route("/create", web::post().to(create_key))
                .route("/delete", web::post().to(delete_key)),
        );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyRecord;
    use actix_web::{test, App};
    use serde_json::{json, Value};

    fn stub_state() -> web::Data<StubState> {
        web::Data::new(StubState::new().with_key(
            "root",
            KeyRecord {
                name: "root".to_string(),
                admin: true,
                databases: vec!["main".to_string()],
            },
        ))
    }

    #[actix_web::test]
    async fn test_me_reports_databases() {
        let state = stub_state();
        let app =
            test::init_service(App::new().app_data(state.clone()).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri("/me")
            .insert_header(("KEY", "root"))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!({"detail": {"data": {"Databases": ["main"], "Admin": true}}}));

        let req = test::TestRequest::get()
            .uri("/me")
            .insert_header(("KEY", "wrong"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
        assert_eq!(state.request_count(), 2);
    }

    #[actix_web::test]
    async fn test_create_table_validation_messages() {
        let app = test::init_service(App::new().app_data(stub_state()).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/database/main/create")
            .insert_header(("KEY", "root"))
            .set_json(json!({"c1": "TEXT"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 422);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["detail"]["message"], "table is required");

        let req = test::TestRequest::post()
            .uri("/database/main/create?table=t")
            .insert_header(("KEY", "root"))
            .set_json(json!({}))
            .to_request();
        let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
        assert_eq!(body["detail"]["message"], "rows are required");
    }

    #[actix_web::test]
    async fn test_insert_unknown_column_uses_flat_detail() {
        let app = test::init_service(App::new().app_data(stub_state()).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/database/main/create?table=t")
            .insert_header(("KEY", "root"))
            .set_json(json!({"c1": "TEXT"}))
            .to_request();
        assert!(test::call_service(&app, req).await.status().is_success());

        let req = test::TestRequest::get()
            .uri("/database/main/insert")
            .insert_header(("KEY", "root"))
            .insert_header(("table", "t"))
            .set_json(json!({"colour": "red"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 422);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["detail"], "colour is not a column in the table");
    }
}
