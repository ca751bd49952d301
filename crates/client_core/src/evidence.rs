use chrono::{NaiveDate, Utc};
use reqwest::multipart::{Form, Part};
use shared::domain::{CaseId, CurrentUser, Evidence, User, UserId};

use crate::error::{CoreError, CoreResult};

/// Roles allowed to collect, edit and delete evidence.
pub const COLLECTOR_ROLES: [&str; 2] = ["admin", "assistente"];

fn has_collector_role(user: &User) -> bool {
    COLLECTOR_ROLES.contains(&user.role.as_str())
}

pub fn collector_candidates(users: &[User]) -> Vec<&User> {
    users.iter().filter(|user| has_collector_role(user)).collect()
}

pub fn can_edit_evidence(user: &CurrentUser) -> bool {
    has_collector_role(user)
}

/// Photos go out as `image/png` or `image/jpeg`; every other file is an
/// opaque `application/octet-stream` upload.
pub fn mime_type_for(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first()
        .filter(|mime| matches!(mime.essence_str(), "image/png" | "image/jpeg"))
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceAttachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl EvidenceAttachment {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    pub fn mime_type(&self) -> String {
        mime_type_for(&self.filename)
    }

    fn into_part(self) -> CoreResult<Part> {
        let mime = self.mime_type();
        Ok(Part::bytes(self.bytes)
            .file_name(self.filename)
            .mime_str(&mime)?)
    }
}

fn multipart_form(
    fields: Vec<(&'static str, String)>,
    attachment: Option<EvidenceAttachment>,
) -> CoreResult<Form> {
    let mut form = Form::new();
    for (name, value) in fields {
        form = form.text(name, value);
    }
    if let Some(attachment) = attachment {
        form = form.part("arquivo", attachment.into_part()?);
    }
    Ok(form)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceDraft {
    pub case_id: CaseId,
    pub kind: String,
    pub description: String,
    pub collected_by: String,
    pub collected_on: String,
    pub registered_by: UserId,
    pub attachment: Option<EvidenceAttachment>,
}

impl EvidenceDraft {
    pub fn new(case_id: CaseId, current_user: &CurrentUser) -> Self {
        Self::with_collection_date(case_id, current_user, Utc::now().date_naive())
    }

    pub fn with_collection_date(
        case_id: CaseId,
        current_user: &CurrentUser,
        collected_on: NaiveDate,
    ) -> Self {
        Self {
            case_id,
            kind: String::new(),
            description: String::new(),
            collected_by: current_user.username.clone(),
            collected_on: collected_on.format("%Y-%m-%d").to_string(),
            registered_by: current_user.id.clone(),
            attachment: None,
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.case_id.as_str().trim().is_empty() {
            return Err(CoreError::validation("case", "select a case"));
        }
        Ok(())
    }

    /// Text parts of the upload. The case id goes out under both `caso`
    /// and `casoId`; backend versions disagree on the name.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("caso", self.case_id.to_string()),
            ("casoId", self.case_id.to_string()),
            ("tipo", self.kind.clone()),
            ("descricao", self.description.clone()),
            ("responsavelColeta", self.collected_by.clone()),
            ("dataColeta", self.collected_on.clone()),
            ("registradoPor", self.registered_by.to_string()),
        ]
    }

    pub fn into_multipart(self) -> CoreResult<Form> {
        let fields = self.form_fields();
        multipart_form(fields, self.attachment)
    }
}

/// Editable subset of a stored evidence. The file is only replaced when
/// `attachment` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceEdit {
    pub kind: String,
    pub description: String,
    pub collected_by: String,
    pub collected_on: String,
    pub attachment: Option<EvidenceAttachment>,
}

impl EvidenceEdit {
    pub fn from_evidence(evidence: &Evidence) -> Self {
        Self {
            kind: evidence.kind.clone(),
            description: evidence.description.clone(),
            collected_by: evidence.collected_by.clone().unwrap_or_default(),
            collected_on: evidence
                .collected_on
                .map(|date| date.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            attachment: None,
        }
    }

    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("descricao", self.description.clone()),
            ("tipo", self.kind.clone()),
            ("responsavelColeta", self.collected_by.clone()),
            ("dataColeta", self.collected_on.clone()),
        ]
    }

    pub fn into_multipart(self) -> CoreResult<Form> {
        let fields = self.form_fields();
        multipart_form(fields, self.attachment)
    }
}

#[cfg(test)]
#[path = "tests/evidence_tests.rs"]
mod tests;
