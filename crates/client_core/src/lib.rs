use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use shared::{
    domain::{Case, CurrentUser, Evidence, EvidenceId, User, UserId},
    error::ApiError,
    protocol::{LoginRequest, LoginResponse, NewCaseRequest, ResponseEnvelope, UserListQuery},
};
use tokio::sync::RwLock;
use tracing::{info, warn};
use url::Url;

pub mod case_filter;
pub mod dashboard;
pub mod error;
pub mod evidence;
pub mod wizard;

pub use case_filter::{CaseListFilter, StatusFilter, TypeFilter};
pub use dashboard::{Dashboard, DashboardSummary};
pub use error::{CoreError, CoreResult};
pub use evidence::{can_edit_evidence, EvidenceAttachment, EvidenceDraft, EvidenceEdit};
pub use wizard::{CaseWizard, WizardField, WizardSession, WizardStep};

pub const DEFAULT_API_BASE_URL: &str = "https://backend-dentefier.onrender.com/api";

/// Backend operations the case screens depend on.
#[async_trait]
pub trait CaseBackend: Send + Sync {
    async fn list_cases(&self) -> CoreResult<Vec<Case>>;
    async fn create_case(&self, request: &NewCaseRequest) -> CoreResult<()>;
    async fn get_user(&self, user_id: &UserId) -> CoreResult<User>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Best-effort reverse geocoding result; any component may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeocodedPlace {
    pub postal_code: Option<String>,
    pub street: Option<String>,
    pub subregion: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
}

#[async_trait]
pub trait Geolocator: Send + Sync {
    async fn request_permission(&self) -> CoreResult<PermissionStatus>;
    async fn current_position(&self) -> CoreResult<Coordinates>;
    async fn reverse_geocode(&self, coordinates: Coordinates) -> CoreResult<Vec<GeocodedPlace>>;
}

pub struct MissingGeolocator;

#[async_trait]
impl Geolocator for MissingGeolocator {
    async fn request_permission(&self) -> CoreResult<PermissionStatus> {
        Err(CoreError::Geolocation(
            "geolocation backend is unavailable".into(),
        ))
    }

    async fn current_position(&self) -> CoreResult<Coordinates> {
        Err(CoreError::Geolocation(
            "geolocation backend is unavailable".into(),
        ))
    }

    async fn reverse_geocode(&self, _coordinates: Coordinates) -> CoreResult<Vec<GeocodedPlace>> {
        Err(CoreError::Geolocation(
            "geolocation backend is unavailable".into(),
        ))
    }
}

/// Reports every request as failed; used where no backend is configured.
pub struct MissingCaseBackend;

#[async_trait]
impl CaseBackend for MissingCaseBackend {
    async fn list_cases(&self) -> CoreResult<Vec<Case>> {
        Err(CoreError::network(None, "case backend is unavailable"))
    }

    async fn create_case(&self, _request: &NewCaseRequest) -> CoreResult<()> {
        Err(CoreError::network(None, "case backend is unavailable"))
    }

    async fn get_user(&self, user_id: &UserId) -> CoreResult<User> {
        Err(CoreError::NotFound(format!("user {user_id}")))
    }
}

#[derive(Debug, Deserialize)]
struct DeletedResponse {
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for the Dentefier REST API. The session cookie set by
/// `login` is replayed on every later request.
pub struct DentefierClient {
    http: Client,
    base_url: Url,
    current_user: RwLock<Option<CurrentUser>>,
}

impl DentefierClient {
    pub fn new(base_url: &str) -> CoreResult<Self> {
        let http = Client::builder().cookie_store(true).build()?;
        Ok(Self {
            http,
            base_url: normalize_base_url(base_url)?,
            current_user: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> CoreResult<Url> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    pub async fn current_user(&self) -> Option<CurrentUser> {
        self.current_user.read().await.clone()
    }

    pub async fn login(&self, username: &str, password: &str) -> CoreResult<CurrentUser> {
        let res = self
            .http
            .post(self.endpoint("auth/login")?)
            .json(&LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        let body: LoginResponse = ensure_success(res, "Erro ao logar").await?.json().await?;
        info!(user = %body.user.username, "logged in");
        *self.current_user.write().await = Some(body.user.clone());
        Ok(body.user)
    }

    /// Fetches the authenticated identity from `/auth/me` and caches it.
    pub async fn me(&self) -> CoreResult<CurrentUser> {
        let res = self.http.get(self.endpoint("auth/me")?).send().await?;
        let user: User = ensure_success(res, "Usuário não autenticado")
            .await?
            .json()
            .await?;
        *self.current_user.write().await = Some(user.clone());
        Ok(user)
    }

    pub async fn list_cases(&self) -> CoreResult<Vec<Case>> {
        let res = self.http.get(self.endpoint("casos")?).send().await?;
        let envelope: ResponseEnvelope<serde_json::Value> =
            ensure_success(res, "Erro ao buscar casos").await?.json().await?;
        Ok(decode_records(envelope.into_inner(), "case"))
    }

    pub async fn create_case(&self, request: &NewCaseRequest) -> CoreResult<()> {
        let res = self
            .http
            .post(self.endpoint("casos")?)
            .json(request)
            .send()
            .await?;
        ensure_success(res, "Falha ao salvar caso").await?;
        info!(case_number = %request.case_number, "case registered");
        Ok(())
    }

    pub async fn get_user(&self, user_id: &UserId) -> CoreResult<User> {
        let res = self
            .http
            .get(self.endpoint(&format!("users/{}", user_id.as_str()))?)
            .send()
            .await?;
        if res.status() == StatusCode::NOT_FOUND {
            return Err(CoreError::NotFound(format!("user {user_id}")));
        }
        Ok(ensure_success(res, "Usuário não encontrado")
            .await?
            .json()
            .await?)
    }

    pub async fn list_users(&self, limit: u32) -> CoreResult<Vec<User>> {
        let res = self
            .http
            .get(self.endpoint("users")?)
            .query(&UserListQuery { limit })
            .send()
            .await?;
        let envelope: ResponseEnvelope<serde_json::Value> =
            ensure_success(res, "Erro ao buscar usuários")
                .await?
                .json()
                .await?;
        Ok(decode_records(envelope.into_inner(), "user"))
    }

    pub async fn list_evidences(&self) -> CoreResult<Vec<Evidence>> {
        let res = self.http.get(self.endpoint("evidencias")?).send().await?;
        let envelope: ResponseEnvelope<serde_json::Value> =
            ensure_success(res, "Falha ao buscar evidências")
                .await?
                .json()
                .await?;
        Ok(decode_records(envelope.into_inner(), "evidence"))
    }

    pub async fn create_evidence(&self, draft: EvidenceDraft) -> CoreResult<()> {
        draft.validate()?;
        let case_id = draft.case_id.clone();
        let form = draft.into_multipart()?;
        let res = self
            .http
            .post(self.endpoint("evidencias")?)
            .multipart(form)
            .send()
            .await?;
        ensure_success(res, "Falha ao criar evidência").await?;
        info!(case_id = %case_id, "evidence registered");
        Ok(())
    }

    pub async fn update_evidence(
        &self,
        evidence_id: &EvidenceId,
        edit: EvidenceEdit,
    ) -> CoreResult<()> {
        self.ensure_can_edit_evidence("edit evidence").await?;
        let form = edit.into_multipart()?;
        let res = self
            .http
            .put(self.endpoint(&format!("evidencias/{}", evidence_id.as_str()))?)
            .multipart(form)
            .send()
            .await?;
        ensure_success(res, "Falha ao atualizar evidência").await?;
        info!(evidence_id = %evidence_id, "evidence updated");
        Ok(())
    }

    pub async fn delete_evidence(&self, evidence_id: &EvidenceId) -> CoreResult<()> {
        self.ensure_can_edit_evidence("delete evidence").await?;
        let res = self
            .http
            .delete(self.endpoint(&format!("evidencias/{}", evidence_id.as_str()))?)
            .send()
            .await?;
        let res = ensure_success(res, "Falha ao excluir evidência").await?;
        if let Ok(body) = res.json::<DeletedResponse>().await {
            if let Some(message) = body.message {
                info!(evidence_id = %evidence_id, %message, "evidence deleted");
            }
        }
        Ok(())
    }

    pub fn evidence_file_url(&self, evidence_id: &EvidenceId) -> CoreResult<Url> {
        self.endpoint(&format!("evidencias/{}/arquivo", evidence_id.as_str()))
    }

    pub async fn download_evidence_file(&self, evidence_id: &EvidenceId) -> CoreResult<Vec<u8>> {
        let res = self
            .http
            .get(self.evidence_file_url(evidence_id)?)
            .send()
            .await?;
        let bytes = ensure_success(res, "Arquivo não encontrado")
            .await?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }

    async fn ensure_can_edit_evidence(&self, action: &'static str) -> CoreResult<()> {
        match self.current_user.read().await.as_ref() {
            Some(user) if can_edit_evidence(user) => Ok(()),
            _ => Err(CoreError::Forbidden(action)),
        }
    }
}

#[async_trait]
impl CaseBackend for DentefierClient {
    async fn list_cases(&self) -> CoreResult<Vec<Case>> {
        DentefierClient::list_cases(self).await
    }

    async fn create_case(&self, request: &NewCaseRequest) -> CoreResult<()> {
        DentefierClient::create_case(self, request).await
    }

    async fn get_user(&self, user_id: &UserId) -> CoreResult<User> {
        DentefierClient::get_user(self, user_id).await
    }
}

/// Trims the configured URL and guarantees a trailing slash so relative
/// joins append to the API prefix instead of replacing its last segment.
pub fn normalize_base_url(raw: &str) -> CoreResult<Url> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(CoreError::validation("api base url", "must not be empty"));
    }
    Ok(Url::parse(&format!("{trimmed}/"))?)
}

async fn ensure_success(res: Response, fallback: &str) -> CoreResult<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.json::<ApiError>().await.unwrap_or_default();
    let message = body.message_or(fallback);
    warn!(status = status.as_u16(), %message, "backend request failed");
    Err(CoreError::network(Some(status.as_u16()), message))
}

/// Decodes list items one by one, skipping records that do not fit the
/// expected shape instead of failing the whole list.
fn decode_records<T: DeserializeOwned>(records: Vec<serde_json::Value>, kind: &str) -> Vec<T> {
    records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| match serde_json::from_value::<T>(record) {
            Ok(item) => Some(item),
            Err(err) => {
                warn!(kind, index, error = %err, "skipping malformed record");
                None
            }
        })
        .collect()
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
