use serde::{Deserialize, Serialize};

use crate::domain::{CaseContext, CaseStatus, IndividualData, Location, User};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user: User,
}

/// Body of `POST /casos`. Free-text fields are carried exactly as typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCaseRequest {
    #[serde(rename = "numeroCaso")]
    pub case_number: String,
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "dataAbertura")]
    pub opened_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CaseStatus>,
    #[serde(rename = "peritoResponsavel")]
    pub expert_responsible: String,
    #[serde(rename = "dadosIndividuo")]
    pub individual: IndividualData,
    #[serde(rename = "contexto")]
    pub context: CaseContext,
    #[serde(rename = "localizacao")]
    pub location: Location,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserListQuery {
    pub limit: u32,
}

/// List responses come back either as a bare array or wrapped as `{ "data": [...] }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ResponseEnvelope<T> {
    Bare(Vec<T>),
    Wrapped { data: Vec<T> },
}

impl<T> ResponseEnvelope<T> {
    pub fn into_inner(self) -> Vec<T> {
        match self {
            ResponseEnvelope::Bare(items) => items,
            ResponseEnvelope::Wrapped { data } => data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_accepts_both_shapes() {
        let bare: ResponseEnvelope<u32> = serde_json::from_str("[1, 2]").expect("bare");
        let wrapped: ResponseEnvelope<u32> =
            serde_json::from_str(r#"{"data": [1, 2], "total": 2}"#).expect("wrapped");
        assert_eq!(bare.into_inner(), vec![1, 2]);
        assert_eq!(wrapped.into_inner(), vec![1, 2]);
    }

    #[test]
    fn new_case_request_omits_missing_status() {
        let request = NewCaseRequest {
            case_number: "1".into(),
            title: "t".into(),
            opened_at: "2024-01-01".into(),
            status: None,
            expert_responsible: "ana".into(),
            individual: IndividualData::default(),
            context: CaseContext::default(),
            location: Location {
                latitude: -8.05,
                longitude: -34.9,
                formatted_address: String::new(),
            },
        };
        let value = serde_json::to_value(&request).expect("encode");
        assert!(value.get("status").is_none());
        assert_eq!(value["localizacao"]["lat"], serde_json::json!(-8.05));
        assert_eq!(value["peritoResponsavel"], "ana");
    }
}
