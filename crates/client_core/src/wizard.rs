use std::{
    collections::HashSet,
    fmt,
    sync::{Arc, Mutex as StdMutex},
};

use chrono::{NaiveDate, Utc};
use shared::{
    domain::{CaseContext, CaseStatus, CurrentUser, IndividualData, Location},
    protocol::NewCaseRequest,
};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::{
    error::{CoreError, CoreResult},
    CaseBackend, Coordinates, GeocodedPlace, Geolocator, PermissionStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum WizardStep {
    #[default]
    Identification,
    CaseContext,
    Location,
}

impl WizardStep {
    pub const ALL: [WizardStep; 3] = [
        WizardStep::Identification,
        WizardStep::CaseContext,
        WizardStep::Location,
    ];

    pub fn index(self) -> usize {
        match self {
            WizardStep::Identification => 0,
            WizardStep::CaseContext => 1,
            WizardStep::Location => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            WizardStep::Identification => "Identificação",
            WizardStep::CaseContext => "Dados Caso",
            WizardStep::Location => "Localização",
        }
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}. {}", self.index() + 1, self.label())
    }
}

/// Free-text fields of the form. Status goes through [`CaseWizard::set_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WizardField {
    CaseNumber,
    Title,
    OpenedAt,
    IndividualName,
    IndividualEstimatedAge,
    IndividualSex,
    CaseType,
    DemandOrigin,
    Description,
    Latitude,
    Longitude,
    FullAddress,
}

impl WizardField {
    pub fn section(self) -> WizardStep {
        match self {
            WizardField::CaseNumber
            | WizardField::Title
            | WizardField::OpenedAt
            | WizardField::IndividualName
            | WizardField::IndividualEstimatedAge
            | WizardField::IndividualSex => WizardStep::Identification,
            WizardField::CaseType | WizardField::DemandOrigin | WizardField::Description => {
                WizardStep::CaseContext
            }
            WizardField::Latitude | WizardField::Longitude | WizardField::FullAddress => {
                WizardStep::Location
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentificationFields {
    pub case_number: String,
    pub title: String,
    pub opened_at: String,
    pub status: Option<CaseStatus>,
    pub expert_responsible: String,
    pub individual: IndividualData,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationFields {
    pub latitude: String,
    pub longitude: String,
    pub full_address: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WizardFormState {
    pub step: WizardStep,
    pub identification: IdentificationFields,
    pub context: CaseContext,
    pub location: LocationFields,
}

#[derive(Debug, Clone)]
pub struct CaseWizard {
    current_user: CurrentUser,
    opened_on: NaiveDate,
    form: WizardFormState,
}

impl CaseWizard {
    pub fn new(current_user: CurrentUser) -> Self {
        Self::with_opening_date(current_user, Utc::now().date_naive())
    }

    pub fn with_opening_date(current_user: CurrentUser, opened_on: NaiveDate) -> Self {
        let form = blank_form(&current_user, opened_on);
        Self {
            current_user,
            opened_on,
            form,
        }
    }

    pub fn current_user(&self) -> &CurrentUser {
        &self.current_user
    }

    pub fn form(&self) -> &WizardFormState {
        &self.form
    }

    pub fn step(&self) -> WizardStep {
        self.form.step
    }

    pub fn field(&self, field: WizardField) -> &str {
        let form = &self.form;
        match field {
            WizardField::CaseNumber => &form.identification.case_number,
            WizardField::Title => &form.identification.title,
            WizardField::OpenedAt => &form.identification.opened_at,
            WizardField::IndividualName => &form.identification.individual.name,
            WizardField::IndividualEstimatedAge => &form.identification.individual.estimated_age,
            WizardField::IndividualSex => &form.identification.individual.sex,
            WizardField::CaseType => &form.context.case_type,
            WizardField::DemandOrigin => &form.context.demand_origin,
            WizardField::Description => &form.context.description,
            WizardField::Latitude => &form.location.latitude,
            WizardField::Longitude => &form.location.longitude,
            WizardField::FullAddress => &form.location.full_address,
        }
    }

    pub fn set_field(&mut self, field: WizardField, value: impl Into<String>) {
        let form = &mut self.form;
        let slot = match field {
            WizardField::CaseNumber => &mut form.identification.case_number,
            WizardField::Title => &mut form.identification.title,
            WizardField::OpenedAt => &mut form.identification.opened_at,
            WizardField::IndividualName => &mut form.identification.individual.name,
            WizardField::IndividualEstimatedAge => {
                &mut form.identification.individual.estimated_age
            }
            WizardField::IndividualSex => &mut form.identification.individual.sex,
            WizardField::CaseType => &mut form.context.case_type,
            WizardField::DemandOrigin => &mut form.context.demand_origin,
            WizardField::Description => &mut form.context.description,
            WizardField::Latitude => &mut form.location.latitude,
            WizardField::Longitude => &mut form.location.longitude,
            WizardField::FullAddress => &mut form.location.full_address,
        };
        *slot = value.into();
    }

    pub fn set_status(&mut self, status: CaseStatus) {
        self.form.identification.status = Some(status);
    }

    pub fn clear_status(&mut self) {
        self.form.identification.status = None;
    }

    pub fn go_next(&mut self) -> WizardStep {
        let next = (self.form.step.index() + 1).min(2);
        self.form.step = WizardStep::ALL[next];
        self.form.step
    }

    pub fn go_back(&mut self) -> WizardStep {
        let previous = self.form.step.index().saturating_sub(1);
        self.form.step = WizardStep::ALL[previous];
        self.form.step
    }

    pub fn jump_to(&mut self, index: usize) -> CoreResult<WizardStep> {
        let step = WizardStep::from_index(index).ok_or_else(|| {
            CoreError::validation("step", format!("{index} is outside 0..=2"))
        })?;
        self.form.step = step;
        Ok(step)
    }

    pub fn apply_location(&mut self, coordinates: Coordinates, place: &GeocodedPlace) {
        self.set_location(coordinates, format_address(place));
    }

    fn set_location(&mut self, coordinates: Coordinates, full_address: String) {
        self.form.location = LocationFields {
            latitude: coordinates.latitude.to_string(),
            longitude: coordinates.longitude.to_string(),
            full_address,
        };
    }

    /// Only valid on the location step; coordinates must parse as finite numbers.
    pub fn submission_payload(&self) -> CoreResult<NewCaseRequest> {
        if self.form.step != WizardStep::Location {
            return Err(CoreError::validation(
                "step",
                format!("cannot submit from step {}", self.form.step),
            ));
        }
        let latitude = parse_coordinate("latitude", &self.form.location.latitude)?;
        let longitude = parse_coordinate("longitude", &self.form.location.longitude)?;
        let identification = &self.form.identification;
        Ok(NewCaseRequest {
            case_number: identification.case_number.clone(),
            title: identification.title.clone(),
            opened_at: identification.opened_at.clone(),
            status: identification.status,
            expert_responsible: identification.expert_responsible.clone(),
            individual: identification.individual.clone(),
            context: self.form.context.clone(),
            location: Location {
                latitude,
                longitude,
                formatted_address: self.form.location.full_address.clone(),
            },
        })
    }

    pub fn reset(&mut self) {
        self.form = blank_form(&self.current_user, self.opened_on);
    }
}

fn blank_form(current_user: &CurrentUser, opened_on: NaiveDate) -> WizardFormState {
    WizardFormState {
        identification: IdentificationFields {
            opened_at: opened_on.format("%Y-%m-%d").to_string(),
            expert_responsible: current_user.username.clone(),
            ..IdentificationFields::default()
        },
        ..WizardFormState::default()
    }
}

fn parse_coordinate(field: &'static str, raw: &str) -> CoreResult<f64> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| CoreError::validation(field, format!("'{raw}' is not a number")))?;
    if !value.is_finite() {
        return Err(CoreError::validation(field, format!("'{raw}' is not finite")));
    }
    Ok(value)
}

/// `"{postal} {street}, {subregion|city}, {region}, {country}"`
pub fn format_address(place: &GeocodedPlace) -> String {
    let part = |value: &Option<String>| value.clone().unwrap_or_default();
    let area = place
        .subregion
        .as_ref()
        .filter(|value| !value.is_empty())
        .or(place.city.as_ref());
    format!(
        "{} {}, {}, {}, {}",
        part(&place.postal_code),
        part(&place.street),
        area.cloned().unwrap_or_default(),
        part(&place.region),
        part(&place.country),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WizardOp {
    ResolveLocation,
    Submit,
}

impl WizardOp {
    fn label(self) -> &'static str {
        match self {
            WizardOp::ResolveLocation => "location lookup",
            WizardOp::Submit => "case submission",
        }
    }
}

struct InFlightGuard<'a> {
    in_flight: &'a StdMutex<HashSet<WizardOp>>,
    op: WizardOp,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        in_flight.remove(&self.op);
    }
}

pub struct WizardSession {
    wizard: Mutex<CaseWizard>,
    in_flight: StdMutex<HashSet<WizardOp>>,
    backend: Arc<dyn CaseBackend>,
    geolocator: Arc<dyn Geolocator>,
}

impl WizardSession {
    pub fn new(
        wizard: CaseWizard,
        backend: Arc<dyn CaseBackend>,
        geolocator: Arc<dyn Geolocator>,
    ) -> Arc<Self> {
        Arc::new(Self {
            wizard: Mutex::new(wizard),
            in_flight: StdMutex::new(HashSet::new()),
            backend,
            geolocator,
        })
    }

    pub async fn with_wizard<R>(&self, edit: impl FnOnce(&mut CaseWizard) -> R) -> R {
        let mut wizard = self.wizard.lock().await;
        edit(&mut wizard)
    }

    pub async fn form(&self) -> WizardFormState {
        self.wizard.lock().await.form().clone()
    }

    pub fn is_in_flight(&self, op: WizardOp) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&op)
    }

    fn begin(&self, op: WizardOp) -> CoreResult<InFlightGuard<'_>> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !in_flight.insert(op) {
            return Err(CoreError::Busy(op.label()));
        }
        Ok(InFlightGuard {
            in_flight: &self.in_flight,
            op,
        })
    }

    /// On any failure the location fields keep their previous values.
    pub async fn resolve_current_location(&self) -> CoreResult<()> {
        let _guard = self.begin(WizardOp::ResolveLocation)?;
        let (coordinates, place) = match locate(self.geolocator.as_ref()).await {
            Ok(found) => found,
            Err(err) => {
                warn!(error = %err, "could not resolve current location");
                return Err(err);
            }
        };
        self.wizard
            .lock()
            .await
            .apply_location(coordinates, &place);
        Ok(())
    }

    /// Map tap: the tapped coordinates always stick, the address falls back
    /// to empty when reverse geocoding fails or finds nothing.
    pub async fn pick_location(&self, coordinates: Coordinates) -> CoreResult<()> {
        let _guard = self.begin(WizardOp::ResolveLocation)?;
        let address = match self.geolocator.reverse_geocode(coordinates).await {
            Ok(places) => places.first().map(format_address).unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "reverse geocoding failed for picked location");
                String::new()
            }
        };
        self.wizard
            .lock()
            .await
            .set_location(coordinates, address);
        Ok(())
    }

    pub async fn submit(&self) -> CoreResult<()> {
        let _guard = self.begin(WizardOp::Submit)?;
        let payload = self.wizard.lock().await.submission_payload()?;
        match self.backend.create_case(&payload).await {
            Ok(()) => {
                info!(case_number = %payload.case_number, "case submitted");
                self.wizard.lock().await.reset();
                Ok(())
            }
            Err(err) => {
                warn!(case_number = %payload.case_number, error = %err, "case submission failed");
                Err(err)
            }
        }
    }
}

async fn locate(geolocator: &dyn Geolocator) -> CoreResult<(Coordinates, GeocodedPlace)> {
    if geolocator.request_permission().await? == PermissionStatus::Denied {
        return Err(CoreError::PermissionDenied);
    }
    let coordinates = geolocator.current_position().await?;
    let place = geolocator
        .reverse_geocode(coordinates)
        .await?
        .into_iter()
        .next()
        .unwrap_or_default();
    Ok((coordinates, place))
}

#[cfg(test)]
#[path = "tests/wizard_tests.rs"]
mod tests;
