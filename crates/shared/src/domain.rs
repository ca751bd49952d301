use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::warn;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(CaseId);
id_newtype!(UserId);
id_newtype!(EvidenceId);

/// Display label used when a responsible party cannot be resolved.
pub const NOT_INFORMED: &str = "Não informado";

/// Case type suggestions offered by the registration form and list filters.
pub const CASE_TYPE_SUGGESTIONS: [&str; 6] = [
    "Odontologia Forense",
    "Identificação Humana",
    "Exame Criminal",
    "Trauma",
    "Estimativa de Idade",
    "Outro",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CaseStatus {
    InProgress,
    Completed,
    Archived,
}

impl CaseStatus {
    pub const ALL: [CaseStatus; 3] = [
        CaseStatus::InProgress,
        CaseStatus::Completed,
        CaseStatus::Archived,
    ];

    /// Label the backend stores and the UI displays.
    pub fn label(self) -> &'static str {
        match self {
            CaseStatus::InProgress => "Em andamento",
            CaseStatus::Completed => "Finalizado",
            CaseStatus::Archived => "Arquivado",
        }
    }

    /// Accepts backend labels regardless of case and surrounding whitespace,
    /// plus the English names.
    pub fn parse(raw: &str) -> Result<Self, UnknownStatus> {
        let normalized = raw.trim().to_lowercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "em andamento" | "in progress" | "inprogress" => Ok(CaseStatus::InProgress),
            "finalizado" | "completed" | "done" => Ok(CaseStatus::Completed),
            "arquivado" | "archived" => Ok(CaseStatus::Archived),
            _ => Err(UnknownStatus(raw.to_string())),
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl TryFrom<String> for CaseStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CaseStatus> for String {
    fn from(value: CaseStatus) -> Self {
        value.label().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown case status '{0}'")]
pub struct UnknownStatus(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub role: String,
}

/// Identity of the authenticated user, handed to each screen explicitly.
pub type CurrentUser = User;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndividualData {
    #[serde(rename = "nome", default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(rename = "idadeEstimado", default, deserialize_with = "null_as_default")]
    pub estimated_age: String,
    #[serde(rename = "sexo", default, deserialize_with = "null_as_default")]
    pub sex: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseContext {
    #[serde(rename = "tipoCaso", default, deserialize_with = "null_as_default")]
    pub case_type: String,
    #[serde(rename = "origemDemanda", default, deserialize_with = "null_as_default")]
    pub demand_origin: String,
    #[serde(rename = "descricao", default, deserialize_with = "null_as_default")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lng")]
    pub longitude: f64,
    #[serde(rename = "enderecoCompleto", default)]
    pub formatted_address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    #[serde(rename = "_id")]
    pub id: CaseId,
    #[serde(rename = "numeroCaso", default, deserialize_with = "null_as_default")]
    pub case_number: String,
    #[serde(rename = "titulo", default, deserialize_with = "null_as_default")]
    pub title: String,
    pub status: CaseStatus,
    #[serde(rename = "contexto", default, deserialize_with = "null_as_default")]
    pub context: CaseContext,
    #[serde(rename = "responsavel", default, skip_serializing_if = "Option::is_none")]
    pub responsible: Option<UserId>,
    #[serde(rename = "peritoResponsavel", default, skip_serializing_if = "Option::is_none")]
    pub expert_responsible: Option<String>,
    #[serde(rename = "dadosIndividuo", default, deserialize_with = "null_as_default")]
    pub individual: IndividualData,
    #[serde(
        rename = "dataAbertura",
        default,
        with = "date_or_datetime",
        skip_serializing_if = "Option::is_none"
    )]
    pub opened_at: Option<NaiveDate>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(
        rename = "localizacao",
        default,
        deserialize_with = "location_or_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub location: Option<Location>,
}

impl Case {
    pub fn case_type(&self) -> &str {
        &self.context.case_type
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn location_or_none<'de, D>(deserializer: D) -> Result<Option<Location>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<serde_json::Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    match serde_json::from_value::<Location>(raw) {
        Ok(location) => Ok(Some(location)),
        Err(err) => {
            warn!(error = %err, "ignoring malformed case location");
            Ok(None)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    #[serde(rename = "_id")]
    pub id: UserId,
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRef {
    #[serde(rename = "_id")]
    pub id: CaseId,
    #[serde(rename = "numeroCaso", default)]
    pub case_number: String,
    #[serde(rename = "titulo", default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(rename = "_id")]
    pub id: EvidenceId,
    #[serde(rename = "tipo", default)]
    pub kind: String,
    #[serde(rename = "descricao", default)]
    pub description: String,
    #[serde(
        rename = "dataColeta",
        default,
        with = "date_or_datetime",
        skip_serializing_if = "Option::is_none"
    )]
    pub collected_on: Option<NaiveDate>,
    #[serde(rename = "responsavelColeta", default, skip_serializing_if = "Option::is_none")]
    pub collected_by: Option<String>,
    #[serde(rename = "registradoPor", default, skip_serializing_if = "Option::is_none")]
    pub registered_by: Option<UserRef>,
    #[serde(rename = "caso", default, skip_serializing_if = "Option::is_none")]
    pub case: Option<CaseRef>,
    #[serde(rename = "arquivo", default, skip_serializing_if = "Option::is_none")]
    pub file: Option<StoredFile>,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Backend dates arrive either as `YYYY-MM-DD` or as a full RFC 3339
/// timestamp. Anything else decodes as `None` rather than failing the record.
pub mod date_or_datetime {
    use chrono::{DateTime, NaiveDate};
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;
    use tracing::warn;

    pub fn parse(raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
    }

    pub fn serialize<S>(value: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(date) => serializer.serialize_str(&date.format("%Y-%m-%d").to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::String(text)) => text,
            Some(other) => other.to_string(),
        };
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        let parsed = parse(raw);
        if parsed.is_none() {
            warn!(value = raw, "ignoring unparseable date");
        }
        Ok(parsed)
    }
}
