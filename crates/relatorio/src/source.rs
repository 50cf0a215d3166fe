//! Where raw records come from.
//!
//! The remote source is a SharePoint list read through the REST API. Items
//! arrive keyed by internal field names (`Unidades_x0020_Fiscalizadas`), so
//! the client fetches the list's field schema first and re-keys every item
//! by display title, which is what the field schema's source labels use.
//!
//! Lookup and person fields are expanded in the item query and re-encoded
//! into the `;#` strings the coercers read:
//!
//! | Field type    | REST value                        | Encoded as                  |
//! |---------------|-----------------------------------|-----------------------------|
//! | `Lookup`      | `{"Id": 12, "Title": "A"}`        | `"12;#A"`                   |
//! | `LookupMulti` | `[{"Id": 1, ..}, {"Id": 2, ..}]`  | `"1;#A;#2;#B"`              |
//! | `User`        | `{"Id": 7, "Title": "Ana"}`       | `["7;#Ana"]`                |
//! | `UserMulti`   | `[{"Id": 7, ..}, {"Id": 8, ..}]`  | `["7;#Ana", "8;#Bruno"]`    |
//! | `MultiChoice` | `["A", "B"]`                      | `";#A;#B;#"`                |

use crate::prelude::*;
use relatorio_core::record::{RawRecord, RawValue, COMPOSITE_SEPARATOR};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Equality predicate on one field, addressed by display title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: String,
    pub value: String,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// The record id filter used for report jobs.
    pub fn id(record_id: &str) -> Self {
        Self::eq("ID", record_id)
    }

    pub fn matches(&self, record: &RawRecord) -> bool {
        record
            .get(&self.field)
            .is_some_and(|value| value.to_plain_string() == self.value)
    }
}

/// A source of raw records.
#[derive(Debug, Clone)]
pub enum RecordSource {
    SharePoint(SharePointClient),
    File(FileSource),
}

impl RecordSource {
    /// The file source when `records_file` is set, SharePoint otherwise.
    pub fn from_options(records_file: Option<&Path>) -> Result<Self> {
        match records_file {
            Some(path) => Ok(RecordSource::File(FileSource::new(path))),
            None => Ok(RecordSource::SharePoint(SharePointClient::new(
                SharePointConfig::from_env()?,
            )?)),
        }
    }

    pub async fn fetch(&self, list: &str, filter: Option<&Filter>) -> Result<Vec<RawRecord>, Error> {
        match self {
            RecordSource::SharePoint(client) => client.fetch(list, filter).await,
            RecordSource::File(file) => file.fetch(filter),
        }
    }

    /// The single record with `record_id`.
    pub async fn fetch_record(&self, list: &str, record_id: &str) -> Result<RawRecord, Error> {
        self.fetch(list, Some(&Filter::id(record_id)))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::SourceFetch(format!("registro {record_id} não encontrado")))
    }
}

/// SharePoint configuration from environment variables
#[derive(Debug, Clone)]
pub struct SharePointConfig {
    pub site_url: String,
    pub token: String,
}

impl SharePointConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            site_url: std::env::var("SHAREPOINT_SITE_URL")
                .map_err(|_| eyre!("SHAREPOINT_SITE_URL environment variable not set"))?,
            token: std::env::var("SHAREPOINT_TOKEN")
                .map_err(|_| eyre!("SHAREPOINT_TOKEN environment variable not set"))?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SharePointClient {
    client: reqwest::Client,
    site_url: String,
}

#[derive(Debug, Deserialize)]
struct ODataPage<T> {
    value: Vec<T>,
    #[serde(rename = "odata.nextLink", default)]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListField {
    #[serde(rename = "InternalName")]
    internal_name: String,
    #[serde(rename = "Title")]
    title: String,
    #[serde(rename = "TypeAsString", default)]
    type_as_string: String,
    #[serde(rename = "LookupField", default)]
    lookup_field: Option<String>,
}

/// How a field's REST value is re-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FieldKind {
    Plain,
    Lookup { show: String },
    LookupMulti { show: String },
    User,
    UserMulti,
    MultiChoice,
}

impl FieldKind {
    fn of(field: &ListField) -> Self {
        let show = || {
            field
                .lookup_field
                .clone()
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| "Title".to_string())
        };
        match field.type_as_string.as_str() {
            "Lookup" => FieldKind::Lookup { show: show() },
            "LookupMulti" => FieldKind::LookupMulti { show: show() },
            "User" => FieldKind::User,
            "UserMulti" => FieldKind::UserMulti,
            "MultiChoice" => FieldKind::MultiChoice,
            _ => FieldKind::Plain,
        }
    }

    /// The expanded property read from lookup and person values.
    fn show_field(&self) -> Option<&str> {
        match self {
            FieldKind::Lookup { show } | FieldKind::LookupMulti { show } => Some(show.as_str()),
            FieldKind::User | FieldKind::UserMulti => Some("Title"),
            FieldKind::Plain | FieldKind::MultiChoice => None,
        }
    }
}

#[derive(Debug, Clone)]
struct FieldInfo {
    title: String,
    kind: FieldKind,
}

/// Visible fields of a list, by internal name.
#[derive(Debug, Clone, Default)]
struct ListSchema {
    fields: BTreeMap<String, FieldInfo>,
}

impl ListSchema {
    fn from_fields(fields: Vec<ListField>) -> Self {
        Self {
            fields: fields
                .into_iter()
                .map(|field| {
                    let kind = FieldKind::of(&field);
                    (
                        field.internal_name,
                        FieldInfo {
                            title: field.title,
                            kind,
                        },
                    )
                })
                .collect(),
        }
    }

    fn internal_name<'a>(&'a self, title: &'a str) -> &'a str {
        self.fields
            .iter()
            .find(|(_, info)| info.title == title)
            .map(|(internal, _)| internal.as_str())
            .unwrap_or(title)
    }

    /// `$select` and `$expand` clauses that pull the display value of every
    /// lookup and person field.
    fn item_query(&self) -> String {
        let mut select = vec!["*".to_string()];
        let mut expand = Vec::new();
        for (internal, info) in &self.fields {
            if let Some(show) = info.kind.show_field() {
                select.push(format!("{internal}/Id"));
                select.push(format!("{internal}/{show}"));
                expand.push(internal.clone());
            }
        }
        if expand.is_empty() {
            return format!("$select={}", select.join(","));
        }
        format!("$select={}&$expand={}", select.join(","), expand.join(","))
    }
}

impl SharePointClient {
    pub fn new(config: SharePointConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", config.token))
                .map_err(|e| eyre!("Invalid header value: {}", e))?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json;odata=nometadata"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            site_url: config.site_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn fetch(&self, list: &str, filter: Option<&Filter>) -> Result<Vec<RawRecord>, Error> {
        let schema = self.list_schema(list).await?;

        let mut url = format!(
            "{}/items?$top=5000&{}",
            list_api_url(&self.site_url, list),
            schema.item_query()
        );
        if let Some(filter) = filter {
            let field = schema.internal_name(&filter.field);
            url.push_str(&format!(
                "&$filter={}",
                urlencoding::encode(&odata_filter(field, &filter.value))
            ));
        }

        let mut records = Vec::new();
        let mut next = Some(url);
        while let Some(url) = next.take() {
            log::debug!("GET {url}");
            let page: ODataPage<serde_json::Map<String, serde_json::Value>> =
                self.get_json(&url).await?;
            records.extend(page.value.into_iter().map(|item| rekey(item, &schema)));
            next = page.next_link;
        }

        log::info!("Fetched {} record(s) from list '{}'", records.len(), list);
        Ok(records)
    }

    async fn list_schema(&self, list: &str) -> Result<ListSchema, Error> {
        let url = format!(
            "{}/fields?$select=InternalName,Title,TypeAsString,LookupField&$filter=Hidden%20eq%20false",
            list_api_url(&self.site_url, list)
        );
        let page: ODataPage<ListField> = self.get_json(&url).await?;
        Ok(ListSchema::from_fields(page.value))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, Error> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::SourceFetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::SourceFetch(format!("HTTP {status}: {body}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| Error::SourceFetch(format!("resposta inválida: {e}")))
    }
}

/// REST endpoint of a list addressed by title.
fn list_api_url(site_url: &str, list: &str) -> String {
    format!(
        "{}/_api/web/lists/getbytitle('{}')",
        site_url,
        urlencoding::encode(&list.replace('\'', "''"))
    )
}

/// OData equality clause; numeric values are left unquoted.
fn odata_filter(field: &str, value: &str) -> String {
    if !value.is_empty() && value.parse::<f64>().is_ok() {
        format!("{field} eq {value}")
    } else {
        format!("{field} eq '{}'", value.replace('\'', "''"))
    }
}

/// Re-key an item by field display title, re-encoding multi-value fields.
/// Unknown keys are kept as they are.
fn rekey(item: serde_json::Map<String, serde_json::Value>, schema: &ListSchema) -> RawRecord {
    item.into_iter()
        .map(|(key, value)| match schema.fields.get(&key) {
            Some(info) => (info.title.clone(), encode(&info.kind, value)),
            None => (key, RawValue::from(value)),
        })
        .collect()
}

fn encode(kind: &FieldKind, value: serde_json::Value) -> RawValue {
    use serde_json::Value;

    if value.is_null() {
        return RawValue::Null;
    }
    match kind {
        FieldKind::Plain => RawValue::from(value),
        FieldKind::Lookup { show } => RawValue::Text(lookup_pair(&value, show).unwrap_or_default()),
        FieldKind::LookupMulti { show } => RawValue::Text(
            multi_values(value)
                .iter()
                .filter_map(|item| lookup_pair(item, show))
                .collect::<Vec<_>>()
                .join(COMPOSITE_SEPARATOR),
        ),
        FieldKind::User => RawValue::List(lookup_pair(&value, "Title").into_iter().collect()),
        FieldKind::UserMulti => RawValue::List(
            multi_values(value)
                .iter()
                .filter_map(|item| lookup_pair(item, "Title"))
                .collect(),
        ),
        FieldKind::MultiChoice => {
            let choices: Vec<String> = multi_values(value)
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect();
            if choices.is_empty() {
                return RawValue::Text(String::new());
            }
            RawValue::Text(format!(
                "{sep}{}{sep}",
                choices.join(COMPOSITE_SEPARATOR),
                sep = COMPOSITE_SEPARATOR
            ))
        }
    }
}

/// `id;#value` from an expanded lookup or person object.
fn lookup_pair(value: &serde_json::Value, show: &str) -> Option<String> {
    let object = value.as_object()?;
    let id = object.get("Id").map(json_scalar).unwrap_or_default();
    let shown = object.get(show).map(json_scalar).unwrap_or_default();
    if id.is_empty() && shown.is_empty() {
        return None;
    }
    Some(format!("{id}{}{shown}", COMPOSITE_SEPARATOR))
}

/// Elements of a multi-value field, with or without the verbose `results` wrapper.
fn multi_values(value: serde_json::Value) -> Vec<serde_json::Value> {
    match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut object) => match object.remove("results") {
            Some(serde_json::Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn json_scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Records read from a JSON array on disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn fetch(&self, filter: Option<&Filter>) -> Result<Vec<RawRecord>, Error> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| {
            Error::SourceFetch(format!("{}: {e}", self.path.display()))
        })?;
        let items: Vec<serde_json::Value> = serde_json::from_str(&text).map_err(|e| {
            Error::SourceFetch(format!("{}: {e}", self.path.display()))
        })?;

        Ok(items
            .into_iter()
            .map(RawRecord::from_json)
            .filter(|record| filter.is_none_or(|f| f.matches(record)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn list_field(internal: &str, title: &str, kind: &str, lookup: Option<&str>) -> ListField {
        ListField {
            internal_name: internal.to_string(),
            title: title.to_string(),
            type_as_string: kind.to_string(),
            lookup_field: lookup.map(str::to_string),
        }
    }

    fn schema() -> ListSchema {
        ListSchema::from_fields(vec![
            list_field("ID", "ID", "Counter", None),
            list_field("Unidades_x0020_Fiscalizadas", "Unidades Fiscalizadas", "Text", None),
            list_field("Title", "Título", "Text", None),
        ])
    }

    fn rest_schema() -> ListSchema {
        ListSchema::from_fields(vec![
            list_field("ID", "ID", "Counter", None),
            list_field("Unidades", "Unidades Fiscalizadas", "Lookup", Some("Nome")),
            list_field("Municipios", "Municípios visitados in loco", "LookupMulti", None),
            list_field("Author", "Criado por", "User", Some("ImnName")),
            list_field("Equipe", "Equipe de Fiscalização", "UserMulti", None),
            list_field("Tecnicas", "Técnicas Aplicadas", "MultiChoice", None),
        ])
    }

    fn object(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        let serde_json::Value::Object(item) = value else {
            unreachable!()
        };
        item
    }

    #[test]
    fn test_list_api_url_escapes_title() {
        assert_eq!(
            list_api_url("https://x.sharepoint.com/sites/s", "Cadastro d'Ação"),
            "https://x.sharepoint.com/sites/s/_api/web/lists/getbytitle('Cadastro%20d%27%27A%C3%A7%C3%A3o')"
        );
    }

    #[test]
    fn test_odata_filter() {
        assert_eq!(odata_filter("ID", "3868"), "ID eq 3868");
        assert_eq!(odata_filter("Title", "O'Neil"), "Title eq 'O''Neil'");
        assert_eq!(odata_filter("Title", ""), "Title eq ''");
    }

    #[test]
    fn test_internal_name_lookup() {
        let schema = schema();
        assert_eq!(
            schema.internal_name("Unidades Fiscalizadas"),
            "Unidades_x0020_Fiscalizadas"
        );
        assert_eq!(schema.internal_name("Sem campo"), "Sem campo");
    }

    #[test]
    fn test_rekey_by_title() {
        // Arrange
        let item = object(json!({
            "ID": 7,
            "Unidades_x0020_Fiscalizadas": "x;#Town A",
            "OData__UIVersionString": "1.0"
        }));

        // Act
        let record = rekey(item, &schema());

        // Assert
        assert_eq!(record.value("ID"), &RawValue::Number(7.0));
        assert_eq!(
            record.value("Unidades Fiscalizadas"),
            &RawValue::Text("x;#Town A".to_string())
        );
        assert!(record.get("OData__UIVersionString").is_some());
    }

    #[test]
    fn test_item_query_expands_lookup_and_person_fields() {
        let query = rest_schema().item_query();

        assert_eq!(
            query,
            "$select=*,Author/Id,Author/Title,Equipe/Id,Equipe/Title,Municipios/Id,Municipios/Title,Unidades/Id,Unidades/Nome\
             &$expand=Author,Equipe,Municipios,Unidades"
        );
        assert_eq!(schema().item_query(), "$select=*");
    }

    #[test]
    fn test_rekey_encodes_rest_multi_value_fields() {
        // Arrange
        let item = object(json!({
            "ID": 3868,
            "Unidades": {"Id": 12, "Nome": "Prefeitura de Town A"},
            "UnidadesId": 12,
            "Municipios": [{"Id": 1, "Title": "Town A"}, {"Id": 2, "Title": "Town B"}],
            "Author": {"Id": 7, "Title": "MARIA DA SILVA"},
            "AuthorId": 7,
            "Equipe": [{"Id": 7, "Title": "Ana"}, {"Id": 8, "Title": "Bruno"}],
            "Tecnicas": ["Entrevista", "Inspeção física"]
        }));

        // Act
        let record = rekey(item, &rest_schema());

        // Assert
        assert_eq!(
            record.value("Unidades Fiscalizadas"),
            &RawValue::Text("12;#Prefeitura de Town A".to_string())
        );
        assert_eq!(
            record.value("Municípios visitados in loco"),
            &RawValue::Text("1;#Town A;#2;#Town B".to_string())
        );
        assert_eq!(
            record.value("Criado por"),
            &RawValue::from(vec!["7;#MARIA DA SILVA"])
        );
        assert_eq!(
            record.value("Equipe de Fiscalização"),
            &RawValue::from(vec!["7;#Ana", "8;#Bruno"])
        );
        assert_eq!(
            record.value("Técnicas Aplicadas"),
            &RawValue::Text(";#Entrevista;#Inspeção física;#".to_string())
        );
    }

    #[test]
    fn test_rekey_rest_item_normalizes() {
        // Arrange
        let item = object(json!({
            "Unidades": {"Id": 12, "Nome": "Town A"},
            "Municipios": {"results": [{"Id": 1, "Title": "Town A"}]},
            "Author": {"Id": 7, "Title": "MARIA DA SILVA"},
            "Equipe": [{"Id": 7, "Title": "Ana"}, {"Id": 8, "Title": "Bruno"}],
            "Tecnicas": ["Entrevista", "Inspeção física"]
        }));
        let normalizer = relatorio_core::normalize::Normalizer::new(
            relatorio_core::lookups::OrgLookups::default(),
            relatorio_core::coerce::JoinSeparator::Comma,
        );

        // Act
        let normalized = normalizer.normalize(&rekey(item, &rest_schema()));

        // Assert
        let text = |key: &str| normalized.get(key).map(|v| v.render()).unwrap_or_default();
        assert_eq!(text("unidades_fiscalizadas"), "Town A");
        assert_eq!(text("municipios_visitados_in_loco"), "Town A");
        assert_eq!(text("criado_por"), "Maria da Silva");
        assert_eq!(text("equipe_fiscalizacao"), "Ana, Bruno");
        assert_eq!(text("tecnicas_aplicadas"), "Entrevista, Inspeção física");
    }

    #[test]
    fn test_rekey_null_lookup_stays_null() {
        let item = object(json!({"Author": null, "Tecnicas": []}));

        let record = rekey(item, &rest_schema());

        assert_eq!(record.value("Criado por"), &RawValue::Null);
        assert_eq!(record.value("Técnicas Aplicadas"), &RawValue::Text(String::new()));
    }

    #[test]
    fn test_filter_matches_numeric_ids() {
        let record = RawRecord::new().with("ID", 3868.0);
        assert!(Filter::id("3868").matches(&record));
        assert!(!Filter::id("3869").matches(&record));
        assert!(!Filter::eq("Outro", "3868").matches(&record));
    }

    #[test]
    fn test_file_source_filters() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registros.json");
        std::fs::write(
            &path,
            json!([
                {"ID": 1, "Unidades Fiscalizadas": "1;#Town A"},
                {"ID": 2, "Unidades Fiscalizadas": "2;#Town B"}
            ])
            .to_string(),
        )
        .unwrap();
        let source = FileSource::new(&path);

        // Act
        let all = source.fetch(None).unwrap();
        let one = source.fetch(Some(&Filter::id("2"))).unwrap();

        // Assert
        assert_eq!(all.len(), 2);
        assert_eq!(one.len(), 1);
        assert_eq!(
            one[0].value("Unidades Fiscalizadas").to_plain_string(),
            "2;#Town B"
        );
    }

    #[test]
    fn test_file_source_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registros.json");
        std::fs::write(&path, "{not json").unwrap();

        let result = FileSource::new(&path).fetch(None);

        assert!(matches!(result, Err(Error::SourceFetch(_))));
    }

    #[tokio::test]
    async fn test_fetch_record_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registros.json");
        std::fs::write(&path, "[]").unwrap();
        let source = RecordSource::File(FileSource::new(&path));

        let result = source.fetch_record("Lista", "1").await;

        assert!(matches!(result, Err(Error::SourceFetch(_))));
    }
}
