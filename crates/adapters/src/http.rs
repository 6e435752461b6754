use std::collections::HashSet;

use async_trait::async_trait;
use dbscope_core::catalog::{
    CatalogError, ColumnMetadata, DataSourceContext, SampleDataset, SchemaCatalogClient, TableRef,
};
use dbscope_core::settings::{Settings, TokenSource, TOKEN_ENV_VAR};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct HttpCatalogClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpCatalogClient {
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, token: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            token,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()?;
        let token = resolve_token(settings);
        if token.is_none() {
            warn!("no API token configured, requests will be sent unauthenticated");
        }
        Ok(Self::new(http, settings.base_url.clone(), token))
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(
        &self,
        context: &DataSourceContext,
        endpoint: Endpoint<'_>,
    ) -> Result<Value, CatalogError> {
        let url = endpoint.url(&self.base_url, context);
        debug!(url = url.as_str(), "catalog request");

        let mut request = self.http.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|error| CatalogError::Network(error.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| CatalogError::Network(error.to_string()))?;

        decode_envelope(status, &body)
    }
}

#[async_trait]
impl SchemaCatalogClient for HttpCatalogClient {
    async fn list_databases(
        &self,
        context: &DataSourceContext,
        search: &str,
    ) -> Result<Vec<String>, CatalogError> {
        let data = self.get(context, Endpoint::Databases { search }).await?;
        decode_names(data)
    }

    async fn list_tables(
        &self,
        context: &DataSourceContext,
        database: &str,
        search: &str,
    ) -> Result<Vec<String>, CatalogError> {
        let data = self
            .get(context, Endpoint::Tables { database, search })
            .await?;
        decode_names(data)
    }

    async fn table_structure(
        &self,
        context: &DataSourceContext,
        table: &TableRef,
    ) -> Result<Vec<ColumnMetadata>, CatalogError> {
        let data = self.get(context, Endpoint::Structure(table)).await?;
        decode_columns(data)
    }

    async fn sample_data(
        &self,
        context: &DataSourceContext,
        table: &TableRef,
        limit: usize,
    ) -> Result<SampleDataset, CatalogError> {
        let data = self
            .get(context, Endpoint::SampleData { table, limit })
            .await?;
        decode_sample(data)
    }

    async fn create_statement(
        &self,
        context: &DataSourceContext,
        table: &TableRef,
    ) -> Result<String, CatalogError> {
        let data = self.get(context, Endpoint::CreateStatement(table)).await?;
        decode_statement(data)
    }
}

#[derive(Debug, Clone, Copy)]
enum Endpoint<'a> {
    Databases { search: &'a str },
    Tables { database: &'a str, search: &'a str },
    Structure(&'a TableRef),
    SampleData { table: &'a TableRef, limit: usize },
    CreateStatement(&'a TableRef),
}

impl Endpoint<'_> {
    fn url(&self, base_url: &str, context: &DataSourceContext) -> String {
        let root = format!(
            "{base_url}/api/datasources/{}/databases",
            context.datasource_id
        );
        match *self {
            Self::Databases { search } => with_search(root, search),
            Self::Tables { database, search } => {
                with_search(format!("{root}/{}/tables", encode(database)), search)
            }
            Self::Structure(table) => format!("{}/structure", table_url(&root, table)),
            Self::SampleData { table, limit } => {
                format!("{}/sample-data?limit={limit}", table_url(&root, table))
            }
            Self::CreateStatement(table) => {
                format!("{}/create-statement", table_url(&root, table))
            }
        }
    }
}

fn encode(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

fn table_url(root: &str, table: &TableRef) -> String {
    format!(
        "{root}/{}/tables/{}",
        encode(&table.database),
        encode(&table.name)
    )
}

fn with_search(url: String, search: &str) -> String {
    if search.is_empty() {
        url
    } else {
        format!("{url}?search={}", encode(search))
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

fn decode_envelope(status: StatusCode, body: &str) -> Result<Value, CatalogError> {
    let envelope = match serde_json::from_str::<Envelope>(body) {
        Ok(envelope) => envelope,
        Err(_) if !status.is_success() => {
            return Err(CatalogError::Network(format!("HTTP {status}")));
        }
        Err(error) => return Err(CatalogError::Protocol(error.to_string())),
    };

    let message = envelope
        .message
        .filter(|message| !message.trim().is_empty());
    if !status.is_success() {
        return Err(match message {
            Some(message) => CatalogError::Application(message),
            None => CatalogError::Network(format!("HTTP {status}")),
        });
    }
    if !envelope.success {
        return Err(CatalogError::Application(
            message.unwrap_or_else(|| "request was rejected by the server".to_string()),
        ));
    }

    Ok(envelope.data.unwrap_or(Value::Null))
}

fn decode_names(data: Value) -> Result<Vec<String>, CatalogError> {
    if data.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(data)
        .map_err(|error| CatalogError::Protocol(format!("expected a list of names: {error}")))
}

fn decode_columns(data: Value) -> Result<Vec<ColumnMetadata>, CatalogError> {
    let rows = match data {
        Value::Null => return Ok(Vec::new()),
        Value::Array(rows) => rows,
        other => {
            return Err(CatalogError::Protocol(format!(
                "expected a list of columns, got {}",
                json_kind(&other)
            )))
        }
    };

    Ok(rows
        .iter()
        .enumerate()
        .filter_map(|(index, row)| {
            let Some(fields) = row.as_object() else {
                warn!(index, "skipping structure row that is not an object");
                return None;
            };
            Some(column_from_fields(fields))
        })
        .collect())
}

fn column_from_fields(fields: &Map<String, Value>) -> ColumnMetadata {
    ColumnMetadata {
        name: lenient_string(fields.get("name")).unwrap_or_default(),
        data_type: lenient_string(fields.get("type")).unwrap_or_default(),
        size: lenient_size(fields.get("size")),
        nullable: lenient_bool(fields.get("nullable")),
        primary_key: lenient_bool(fields.get("primaryKey")),
        auto_increment: lenient_bool(fields.get("autoIncrement")),
        default_value: lenient_string(fields.get("defaultValue")).filter(|v| !v.is_empty()),
        comment: lenient_string(fields.get("comment")).filter(|v| !v.is_empty()),
    }
}

fn lenient_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn lenient_bool(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(text)) => matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "y" | "1"
        ),
        _ => false,
    }
}

fn lenient_size(value: Option<&Value>) -> Option<u64> {
    let size = match value? {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }?;
    (size > 0).then_some(size)
}

fn decode_sample(data: Value) -> Result<SampleDataset, CatalogError> {
    let Value::Object(mut fields) = data else {
        return Err(CatalogError::Protocol(format!(
            "expected a sample-data object, got {}",
            json_kind(&data)
        )));
    };

    let rows = match fields.remove("data") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(rows)) => rows,
        Some(other) => {
            return Err(CatalogError::Protocol(format!(
                "expected sample rows to be a list, got {}",
                json_kind(&other)
            )))
        }
    };

    let columns = match fields.get("columns") {
        Some(Value::Array(columns)) => normalize_columns(columns),
        _ => Vec::new(),
    };
    let count = fields
        .get("count")
        .and_then(Value::as_u64)
        .unwrap_or(rows.len() as u64);
    let execution_time_ms = fields.get("executionTime").and_then(Value::as_u64);

    Ok(SampleDataset {
        columns,
        rows,
        count,
        execution_time_ms,
    })
}

/// Accepts plain names and `{ "name": .. }` objects; anything else is
/// skipped, as are repeated names.
fn normalize_columns(raw: &[Value]) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.iter()
        .enumerate()
        .filter_map(|(index, column)| {
            let name = match column {
                Value::String(name) => Some(name.as_str()),
                Value::Object(fields) => fields.get("name").and_then(Value::as_str),
                _ => None,
            };
            if name.is_none() {
                warn!(index, "skipping malformed sample column");
            }
            name
        })
        .filter(|name| seen.insert(*name))
        .map(str::to_string)
        .collect()
}

fn decode_statement(data: Value) -> Result<String, CatalogError> {
    match data {
        Value::Null => Ok(String::new()),
        Value::String(sql) => Ok(sql),
        other => Err(CatalogError::Protocol(format!(
            "expected a create statement string, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

fn resolve_token(settings: &Settings) -> Option<String> {
    let env_token = std::env::var(TOKEN_ENV_VAR)
        .ok()
        .filter(|token| !token.is_empty());

    match settings.token_source {
        TokenSource::EnvVar => env_token,
        TokenSource::Keyring => {
            if let Some(token) = load_keyring_token(settings) {
                return Some(token);
            }

            if let Some(token) = env_token {
                store_keyring_token(settings, &token);
                return Some(token);
            }

            None
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
fn load_keyring_token(settings: &Settings) -> Option<String> {
    let entry = keyring_entry(settings)?;
    entry.get_password().ok().filter(|token| !token.is_empty())
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn load_keyring_token(_settings: &Settings) -> Option<String> {
    None
}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
fn store_keyring_token(settings: &Settings, token: &str) {
    if let Some(entry) = keyring_entry(settings) {
        if let Err(error) = entry.set_password(token) {
            warn!(%error, "failed to store API token in keyring");
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn store_keyring_token(_settings: &Settings, _token: &str) {}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
fn keyring_entry(settings: &Settings) -> Option<keyring::Entry> {
    keyring::Entry::new(settings.keyring_service(), settings.keyring_account()).ok()
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpListener};
    use std::thread::{self, JoinHandle};

    use dbscope_core::catalog::{CatalogError, DataSourceContext, SchemaCatalogClient, TableRef};
    use dbscope_core::settings::Settings;
    use reqwest::StatusCode;
    use serde_json::json;

    use super::{
        decode_columns, decode_envelope, decode_names, decode_sample, decode_statement, Endpoint,
        HttpCatalogClient,
    };

    const BASE: &str = "http://localhost:8080";

    fn context() -> DataSourceContext {
        DataSourceContext::new(42, "warehouse")
    }

    // Answers a single request with `body` and hands back the raw request head.
    fn serve_once(body: &'static str) -> (SocketAddr, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind loopback listener");
        let addr = listener.local_addr().expect("listener address");
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("failed to accept connection");
            let mut head = Vec::new();
            let mut buf = [0_u8; 1024];
            while !head.windows(4).any(|window| window == b"\r\n\r\n") {
                let read = stream.read(&mut buf).expect("failed to read request");
                if read == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..read]);
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream
                .write_all(response.as_bytes())
                .expect("failed to write response");
            String::from_utf8_lossy(&head).to_lowercase()
        });
        (addr, handle)
    }

    fn loopback_client(addr: SocketAddr, token: Option<&str>) -> HttpCatalogClient {
        let http = reqwest::Client::builder()
            .no_proxy()
            .build()
            .expect("client should build");
        HttpCatalogClient::new(http, format!("http://{addr}"), token.map(str::to_string))
    }

    #[tokio::test]
    async fn get_sends_bearer_token_and_unwraps_envelope() {
        let (addr, server) = serve_once(r#"{"success":true,"data":["a"]}"#);
        let client = loopback_client(addr, Some("t0k"));

        let databases = client
            .list_databases(&DataSourceContext::new(1, "primary"), "")
            .await;
        let request = server.join().expect("server thread panicked");

        assert_eq!(databases, Ok(vec!["a".to_string()]));
        assert!(request.starts_with("get /api/datasources/1/databases "));
        assert!(request.contains("authorization: bearer t0k"));
    }

    #[tokio::test]
    async fn get_without_token_omits_authorization_header() {
        let (addr, server) = serve_once(r#"{"success":false,"message":"denied"}"#);
        let client = loopback_client(addr, None);

        let tables = client
            .list_tables(&DataSourceContext::new(3, "reporting"), "app", "")
            .await;
        let request = server.join().expect("server thread panicked");

        assert_eq!(tables, Err(CatalogError::Application("denied".to_string())));
        assert!(request.starts_with("get /api/datasources/3/databases/app/tables "));
        assert!(!request.contains("authorization:"));
    }

    #[test]
    fn client_trims_trailing_slash_from_base_url() {
        let client = HttpCatalogClient::new(reqwest::Client::new(), "http://api.local/", None);
        assert_eq!(client.base_url(), "http://api.local");

        let client =
            HttpCatalogClient::from_settings(&Settings::default()).expect("client should build");
        assert_eq!(client.base_url(), BASE);
    }

    #[test]
    fn listing_urls_omit_empty_search() {
        assert_eq!(
            Endpoint::Databases { search: "" }.url(BASE, &context()),
            "http://localhost:8080/api/datasources/42/databases"
        );
        assert_eq!(
            Endpoint::Tables {
                database: "autoapi",
                search: "ord er"
            }
            .url(BASE, &context()),
            "http://localhost:8080/api/datasources/42/databases/autoapi/tables?search=ord%20er"
        );
    }

    #[test]
    fn table_urls_percent_encode_path_segments() {
        let table = TableRef::new("sales/eu", "order items");
        assert_eq!(
            Endpoint::Structure(&table).url(BASE, &context()),
            "http://localhost:8080/api/datasources/42/databases/sales%2Feu/tables/order%20items/structure"
        );
        assert_eq!(
            Endpoint::SampleData {
                table: &table,
                limit: 20
            }
            .url(BASE, &context()),
            "http://localhost:8080/api/datasources/42/databases/sales%2Feu/tables/order%20items/sample-data?limit=20"
        );
        assert!(Endpoint::CreateStatement(&table)
            .url(BASE, &context())
            .ends_with("/tables/order%20items/create-statement"));
    }

    #[test]
    fn envelope_errors_map_to_the_taxonomy() {
        assert!(matches!(
            decode_envelope(StatusCode::OK, "<html>"),
            Err(CatalogError::Protocol(_))
        ));
        assert_eq!(
            decode_envelope(StatusCode::BAD_GATEWAY, "<html>"),
            Err(CatalogError::Network("HTTP 502 Bad Gateway".to_string()))
        );
        assert_eq!(
            decode_envelope(
                StatusCode::FORBIDDEN,
                r#"{"success":false,"message":"token expired"}"#
            ),
            Err(CatalogError::Application("token expired".to_string()))
        );
        assert_eq!(
            decode_envelope(
                StatusCode::OK,
                r#"{"success":false,"message":"unknown database"}"#
            ),
            Err(CatalogError::Application("unknown database".to_string()))
        );
        assert_eq!(
            decode_envelope(StatusCode::OK, r#"{"success":true,"data":["a"]}"#),
            Ok(json!(["a"]))
        );
        assert_eq!(
            decode_envelope(StatusCode::OK, r#"{"success":true}"#),
            Ok(serde_json::Value::Null)
        );
    }

    #[test]
    fn names_must_be_a_list_of_strings() {
        assert_eq!(
            decode_names(json!(["autoapi", "billing"])),
            Ok(vec!["autoapi".to_string(), "billing".to_string()])
        );
        assert_eq!(decode_names(serde_json::Value::Null), Ok(Vec::new()));
        assert!(matches!(
            decode_names(json!({ "names": [] })),
            Err(CatalogError::Protocol(_))
        ));
    }

    #[test]
    fn structure_rows_are_decoded_leniently() {
        let columns = decode_columns(json!([
            {
                "name": "id",
                "type": "INT",
                "size": 11,
                "nullable": false,
                "primaryKey": true,
                "autoIncrement": true
            },
            {
                "name": "email",
                "type": "VARCHAR",
                "size": "255",
                "nullable": "YES",
                "defaultValue": "",
                "comment": "login"
            },
            "garbage",
            { "type": "TEXT", "size": 0, "primaryKey": 1 }
        ]))
        .expect("columns should decode");

        assert_eq!(columns.len(), 3);
        assert!(columns[0].primary_key && columns[0].auto_increment && !columns[0].nullable);
        assert_eq!(columns[0].size, Some(11));
        assert_eq!(columns[1].size, Some(255));
        assert!(columns[1].nullable);
        assert_eq!(columns[1].default_value, None);
        assert_eq!(columns[1].comment.as_deref(), Some("login"));
        assert_eq!(columns[2].name, "");
        assert_eq!(columns[2].size, None);
        assert!(columns[2].primary_key);
    }

    #[test]
    fn sample_columns_are_normalized() {
        let dataset = decode_sample(json!({
            "data": [{ "id": 1, "name": "ada" }, { "id": 2, "name": null }],
            "columns": ["id", { "name": "name" }, 7, "id", { "label": "x" }],
            "executionTime": 12
        }))
        .expect("sample should decode");

        assert_eq!(dataset.columns, vec!["id".to_string(), "name".to_string()]);
        assert_eq!(dataset.rows.len(), 2);
        assert_eq!(dataset.count, 2);
        assert_eq!(dataset.execution_time_ms, Some(12));
    }

    #[test]
    fn sample_requires_object_with_row_list() {
        assert!(matches!(
            decode_sample(json!([])),
            Err(CatalogError::Protocol(_))
        ));
        assert!(matches!(
            decode_sample(json!({ "data": "rows" })),
            Err(CatalogError::Protocol(_))
        ));

        let empty = decode_sample(json!({ "count": 0 })).expect("empty sample");
        assert!(empty.rows.is_empty() && empty.columns.is_empty());
    }

    #[test]
    fn statement_accepts_string_or_null() {
        assert_eq!(
            decode_statement(json!("CREATE TABLE t (id INT)")),
            Ok("CREATE TABLE t (id INT)".to_string())
        );
        assert_eq!(decode_statement(serde_json::Value::Null), Ok(String::new()));
        assert!(matches!(
            decode_statement(json!({ "sql": "x" })),
            Err(CatalogError::Protocol(_))
        ));
    }
}
